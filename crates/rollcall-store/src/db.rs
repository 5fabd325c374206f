//! SQLite database for enrollments and attendance records.

use crate::codec::{decode_embedding, encode_embedding, CodecError};
use chrono::{DateTime, Utc};
use rollcall_core::{
    AttendanceRecord, AttendanceStore, Enrollment, Gallery, PersistenceError, SessionKey,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("embedding dimension mismatch: gallery holds {expected}-d embeddings, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("corrupt row for subject '{subject}': {reason}")]
    Corrupt { subject: String, reason: String },
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS enrollments (
    subject_id      TEXT PRIMARY KEY,
    embedding       BLOB NOT NULL,
    dim             INTEGER NOT NULL,
    reference_image TEXT,
    enrolled_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id          TEXT PRIMARY KEY,
    subject_id  TEXT NOT NULL,
    session_key TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    camera_id   TEXT NOT NULL,
    recognized  INTEGER NOT NULL DEFAULT 1,
    snapshot    TEXT,
    UNIQUE (subject_id, session_key)
);

CREATE INDEX IF NOT EXISTS idx_attendance_session ON attendance(session_key);
";

/// Handle to the rollcall database. One connection per pipeline or
/// tool; cross-process writers are serialized by SQLite itself.
pub struct AttendanceDb {
    conn: Connection,
}

impl AttendanceDb {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Add or replace an enrollment.
    ///
    /// Re-enrollment replaces the stored embedding but keeps the
    /// subject's original insertion position, so the matcher tie-break
    /// stays stable. A dimension differing from the other enrollments
    /// fails fast rather than corrupting distance computation.
    pub fn enroll(&self, enrollment: &Enrollment) -> Result<(), StoreError> {
        let dim = enrollment.embedding.dim();

        let existing_dim: Option<usize> = self
            .conn
            .query_row(
                "SELECT dim FROM enrollments WHERE subject_id != ?1 LIMIT 1",
                params![enrollment.subject_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(|d| d as usize);

        if let Some(expected) = existing_dim {
            if dim != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: dim,
                });
            }
        }

        self.conn.execute(
            "INSERT INTO enrollments (subject_id, embedding, dim, reference_image, enrolled_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(subject_id) DO UPDATE SET
               embedding = excluded.embedding,
               dim = excluded.dim,
               reference_image = excluded.reference_image,
               enrolled_at = excluded.enrolled_at",
            params![
                enrollment.subject_id,
                encode_embedding(&enrollment.embedding),
                dim as i64,
                enrollment.reference_image,
                enrollment.enrolled_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Remove an enrollment. Returns false when the subject was not
    /// enrolled.
    pub fn remove_enrollment(&self, subject_id: &str) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "DELETE FROM enrollments WHERE subject_id = ?1",
            params![subject_id],
        )?;
        Ok(changed > 0)
    }

    /// All enrollments in insertion order (rowid order).
    pub fn list_enrollments(&self) -> Result<Vec<Enrollment>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, embedding, reference_image, enrolled_at
             FROM enrollments ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut enrollments = Vec::new();
        for row in rows {
            let (subject_id, blob, reference_image, enrolled_at) = row?;
            let embedding = decode_embedding(&blob).map_err(|e| StoreError::Corrupt {
                subject: subject_id.clone(),
                reason: e.to_string(),
            })?;
            let enrolled_at = parse_timestamp(&enrolled_at, &subject_id)?;
            enrollments.push(Enrollment {
                subject_id,
                embedding,
                reference_image,
                enrolled_at,
            });
        }
        Ok(enrollments)
    }

    /// Build the matching gallery from the enrollment table.
    ///
    /// A row whose dimension disagrees with the rest of the gallery is
    /// skipped with a warning; one corrupt enrollment must not take
    /// the pipeline down.
    pub fn load_gallery(&self) -> Result<Gallery, StoreError> {
        let mut gallery = Gallery::new();
        for enrollment in self.list_enrollments()? {
            let subject_id = enrollment.subject_id.clone();
            if let Err(err) = gallery.insert(enrollment) {
                tracing::warn!(
                    subject = %subject_id,
                    expected = err.expected,
                    actual = err.actual,
                    "skipping enrollment with mismatched dimension"
                );
            }
        }
        Ok(gallery)
    }

    /// Attendance rows, newest first, optionally restricted to one
    /// session window.
    pub fn list_attendance(
        &self,
        session: Option<&SessionKey>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let (sql, filter) = match session {
            Some(key) => (
                "SELECT id, subject_id, session_key, timestamp, camera_id, recognized, snapshot
                 FROM attendance WHERE session_key = ?1 ORDER BY timestamp DESC",
                Some(key.as_str().to_string()),
            ),
            None => (
                "SELECT id, subject_id, session_key, timestamp, camera_id, recognized, snapshot
                 FROM attendance ORDER BY timestamp DESC",
                None,
            ),
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows: Vec<_> = match &filter {
            Some(key) => stmt
                .query_map(params![key], attendance_row)?
                .collect::<Result<_, _>>()?,
            None => stmt
                .query_map([], attendance_row)?
                .collect::<Result<_, _>>()?,
        };

        let mut records = Vec::new();
        for (id, subject_id, session_key, timestamp, camera_id, recognized, snapshot) in rows {
            let timestamp = parse_timestamp(&timestamp, &subject_id)?;
            records.push(AttendanceRecord {
                id,
                subject_id,
                session_key: SessionKey::new(session_key),
                timestamp,
                camera_id,
                recognized,
                snapshot,
            });
        }
        Ok(records)
    }
}

type AttendanceRow = (String, String, String, String, String, bool, Option<String>);

fn attendance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn parse_timestamp(raw: &str, subject: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            subject: subject.to_string(),
            reason: format!("bad timestamp '{raw}': {e}"),
        })
}

impl AttendanceStore for AttendanceDb {
    fn exists(&self, subject_id: &str, session_key: &SessionKey) -> Result<bool, PersistenceError> {
        self.conn
            .query_row(
                "SELECT EXISTS(
                   SELECT 1 FROM attendance WHERE subject_id = ?1 AND session_key = ?2
                 )",
                params![subject_id, session_key.as_str()],
                |row| row.get::<_, bool>(0),
            )
            .map_err(|e| PersistenceError(e.to_string()))
    }

    /// Single conditional insert: the `UNIQUE(subject_id, session_key)`
    /// constraint makes the check-and-write atomic even across
    /// concurrent camera processes.
    fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, PersistenceError> {
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO attendance
                   (id, subject_id, session_key, timestamp, camera_id, recognized, snapshot)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.subject_id,
                    record.session_key.as_str(),
                    record.timestamp.to_rfc3339(),
                    record.camera_id,
                    record.recognized,
                    record.snapshot,
                ],
            )
            .map_err(|e| PersistenceError(e.to_string()))?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::Embedding;
    use tempfile::TempDir;

    fn open_db(dir: &TempDir) -> AttendanceDb {
        AttendanceDb::open(&dir.path().join("rollcall.db")).unwrap()
    }

    fn enrollment(subject_id: &str, values: Vec<f32>) -> Enrollment {
        Enrollment {
            subject_id: subject_id.to_string(),
            embedding: Embedding::new(values),
            reference_image: None,
            enrolled_at: Utc::now(),
        }
    }

    fn record(subject_id: &str, session: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            session_key: SessionKey::new(session),
            timestamp: Utc::now(),
            camera_id: "cam-1".to_string(),
            recognized: true,
            snapshot: None,
        }
    }

    #[test]
    fn enroll_then_load_gallery_preserves_order() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        db.enroll(&enrollment("alice", vec![1.0, 2.0])).unwrap();
        db.enroll(&enrollment("bob", vec![3.0, 4.0])).unwrap();
        db.enroll(&enrollment("carol", vec![5.0, 6.0])).unwrap();

        let gallery = db.load_gallery().unwrap();
        let subjects: Vec<_> = gallery.iter().map(|e| e.subject_id.as_str()).collect();
        assert_eq!(subjects, vec!["alice", "bob", "carol"]);
        assert_eq!(gallery.dim(), Some(2));
    }

    #[test]
    fn reenrollment_replaces_and_keeps_position() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        db.enroll(&enrollment("alice", vec![1.0, 2.0])).unwrap();
        db.enroll(&enrollment("bob", vec![3.0, 4.0])).unwrap();
        db.enroll(&enrollment("alice", vec![9.0, 9.0])).unwrap();

        let enrollments = db.list_enrollments().unwrap();
        assert_eq!(enrollments.len(), 2);
        assert_eq!(enrollments[0].subject_id, "alice");
        assert_eq!(enrollments[0].embedding.values, vec![9.0, 9.0]);
        assert_eq!(enrollments[1].subject_id, "bob");
    }

    #[test]
    fn enroll_rejects_mismatched_dimension() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        db.enroll(&enrollment("alice", vec![1.0, 2.0])).unwrap();
        let err = db.enroll(&enrollment("bob", vec![1.0])).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn reenrolling_sole_subject_may_change_dimension() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        db.enroll(&enrollment("alice", vec![1.0, 2.0])).unwrap();
        // Only alice is enrolled; replacing her embedding wholesale is fine.
        db.enroll(&enrollment("alice", vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(db.load_gallery().unwrap().dim(), Some(3));
    }

    #[test]
    fn remove_enrollment_reports_presence() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        db.enroll(&enrollment("alice", vec![1.0])).unwrap();
        assert!(db.remove_enrollment("alice").unwrap());
        assert!(!db.remove_enrollment("alice").unwrap());
        assert!(db.load_gallery().unwrap().is_empty());
    }

    #[test]
    fn insert_if_absent_writes_once_per_session() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);
        let session = SessionKey::new("2024-03-15");

        assert!(db.insert_if_absent(&record("alice", "2024-03-15")).unwrap());
        assert!(db.exists("alice", &session).unwrap());
        // Second insert for the same (subject, session): ignored.
        assert!(!db.insert_if_absent(&record("alice", "2024-03-15")).unwrap());

        assert_eq!(db.list_attendance(Some(&session)).unwrap().len(), 1);
    }

    #[test]
    fn new_session_key_opens_new_slot() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        assert!(db.insert_if_absent(&record("alice", "2024-03-15")).unwrap());
        assert!(db.insert_if_absent(&record("alice", "2024-03-16")).unwrap());
        assert_eq!(db.list_attendance(None).unwrap().len(), 2);
    }

    #[test]
    fn concurrent_connections_agree_on_single_winner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rollcall.db");
        let a = AttendanceDb::open(&path).unwrap();
        let b = AttendanceDb::open(&path).unwrap();

        let first = a.insert_if_absent(&record("alice", "2024-03-15")).unwrap();
        let second = b.insert_if_absent(&record("alice", "2024-03-15")).unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(a.list_attendance(None).unwrap().len(), 1);
    }

    #[test]
    fn list_attendance_filters_by_session() {
        let dir = TempDir::new().unwrap();
        let db = open_db(&dir);

        db.insert_if_absent(&record("alice", "2024-03-15")).unwrap();
        db.insert_if_absent(&record("bob", "2024-03-15")).unwrap();
        db.insert_if_absent(&record("alice", "2024-03-16")).unwrap();

        let day_one = db
            .list_attendance(Some(&SessionKey::new("2024-03-15")))
            .unwrap();
        assert_eq!(day_one.len(), 2);
        let all = db.list_attendance(None).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn gallery_skips_row_with_divergent_dimension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rollcall.db");
        let db = AttendanceDb::open(&path).unwrap();

        db.enroll(&enrollment("alice", vec![1.0, 2.0])).unwrap();
        db.enroll(&enrollment("bob", vec![3.0, 4.0])).unwrap();

        // Corrupt bob's row behind the store's back.
        let raw = Connection::open(&path).unwrap();
        raw.execute(
            "UPDATE enrollments SET embedding = ?1, dim = 1 WHERE subject_id = 'bob'",
            params![encode_embedding(&Embedding::new(vec![7.0]))],
        )
        .unwrap();

        let gallery = db.load_gallery().unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.iter().next().unwrap().subject_id, "alice");
    }
}
