use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rollcall_core::{Embedding, Enrollment, SessionKey};
use rollcall_store::AttendanceDb;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance administration")]
struct Cli {
    /// Path to the SQLite database file (defaults to $ROLLCALL_DB_PATH,
    /// then the daemon's data dir).
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a subject from a precomputed embedding file
    Enroll {
        /// Subject identifier (e.g., a student id)
        subject: String,
        /// JSON file holding the embedding as an array of numbers
        #[arg(short, long)]
        embedding: PathBuf,
        /// Reference to the enrollment photo
        #[arg(short, long)]
        photo: Option<String>,
    },
    /// List enrolled subjects
    List,
    /// Remove an enrolled subject
    Remove {
        /// Subject identifier
        subject: String,
    },
    /// Show attendance records
    Attendance {
        /// Restrict to one session key (e.g., 2024-03-15)
        #[arg(short, long)]
        session: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli
        .db
        .or_else(|| std::env::var("ROLLCALL_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(default_db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = AttendanceDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    match cli.command {
        Commands::Enroll {
            subject,
            embedding,
            photo,
        } => {
            let raw = std::fs::read_to_string(&embedding)
                .with_context(|| format!("failed to read {}", embedding.display()))?;
            let values: Vec<f32> = serde_json::from_str(&raw)
                .context("embedding file must be a JSON array of numbers")?;
            let dim = values.len();

            db.enroll(&Enrollment {
                subject_id: subject.clone(),
                embedding: Embedding::new(values),
                reference_image: photo,
                enrolled_at: Utc::now(),
            })?;
            println!("Enrolled {subject} ({dim}-d embedding)");
        }
        Commands::List => {
            let enrollments = db.list_enrollments()?;
            if enrollments.is_empty() {
                println!("No subjects enrolled");
            }
            for e in enrollments {
                println!(
                    "{}  {}-d  enrolled {}",
                    e.subject_id,
                    e.embedding.dim(),
                    e.enrolled_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::Remove { subject } => {
            if db.remove_enrollment(&subject)? {
                println!("Removed {subject}");
            } else {
                println!("{subject} is not enrolled");
            }
        }
        Commands::Attendance { session } => {
            let key = session.map(SessionKey::new);
            let records = db.list_attendance(key.as_ref())?;
            if records.is_empty() {
                println!("No attendance records");
            }
            for r in records {
                let snapshot = r.snapshot.as_deref().unwrap_or("-");
                println!(
                    "{}  {}  session={}  camera={}  snapshot={}",
                    r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    r.subject_id,
                    r.session_key,
                    r.camera_id,
                    snapshot
                );
            }
        }
    }

    Ok(())
}

/// Same resolution order as the daemon: explicit env/flag, then
/// XDG data dir.
fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("attendance.db")
}
