use rollcall_core::SessionWindow;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Video source descriptor (device path or stream URI). Treated as
    /// opaque; never logged without redaction.
    pub source: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Camera identifier written into attendance records.
    pub camera_id: String,
    /// Euclidean distance below which a face matches an enrollment.
    /// Deployments have run 0.55–0.6; a distance equal to the
    /// threshold never matches.
    pub match_threshold: f32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_backoff: Duration,
    /// Frames wider than this are downscaled before detection.
    pub max_frame_width: u32,
    /// How timestamps map to attendance sessions.
    pub session_window: SessionWindow,
    /// Interval between periodic status lines.
    pub status_interval: Duration,
    /// Directory for commit snapshots; no snapshots when unset.
    pub snapshot_dir: Option<PathBuf>,
    /// Detection/encoding backend name.
    pub encoder_backend: String,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let session_window = std::env::var("ROLLCALL_SESSION_WINDOW")
            .ok()
            .and_then(|raw| match raw.parse() {
                Ok(window) => Some(window),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring ROLLCALL_SESSION_WINDOW");
                    None
                }
            })
            .unwrap_or(SessionWindow::Daily);

        Self {
            source: std::env::var("ROLLCALL_SOURCE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            db_path,
            camera_id: std::env::var("ROLLCALL_CAMERA_ID")
                .unwrap_or_else(|_| "classroom-0".to_string()),
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", 0.55),
            reconnect_backoff: Duration::from_millis(env_u64(
                "ROLLCALL_RECONNECT_BACKOFF_MS",
                1000,
            )),
            max_frame_width: env_u32("ROLLCALL_MAX_FRAME_WIDTH", 640),
            session_window,
            status_interval: Duration::from_secs(env_u64("ROLLCALL_STATUS_INTERVAL_SECS", 5)),
            snapshot_dir: std::env::var("ROLLCALL_SNAPSHOT_DIR").ok().map(PathBuf::from),
            encoder_backend: std::env::var("ROLLCALL_ENCODER")
                .unwrap_or_else(|_| "null".to_string()),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
