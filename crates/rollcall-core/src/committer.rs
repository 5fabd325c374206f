//! Attendance commitment.
//!
//! Converts identity decisions into durable attendance records while
//! guaranteeing at most one record per subject per session. The
//! guarantee rests entirely on the store's atomic conditional insert:
//! the committer never does a separate read followed by a write, so two
//! pipelines observing the same subject in the same window cannot both
//! commit.

use crate::session::SessionKey;
use crate::types::IdentityDecision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Durable record of a subject being recognized within one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub subject_id: String,
    pub session_key: SessionKey,
    /// When the face was seen, not when the row was written.
    pub timestamp: DateTime<Utc>,
    pub camera_id: String,
    pub recognized: bool,
    /// Reference to a stored snapshot image, when one was captured.
    pub snapshot: Option<String>,
}

#[derive(Debug, Error)]
#[error("attendance store failure: {0}")]
pub struct PersistenceError(pub String);

/// Narrow write contract to the attendance store.
pub trait AttendanceStore {
    /// Whether a record already exists for `(subject_id, session_key)`.
    fn exists(&self, subject_id: &str, session_key: &SessionKey) -> Result<bool, PersistenceError>;

    /// Insert the record unless one already exists for its
    /// `(subject_id, session_key)`. Must be a single atomic conditional
    /// insert. Returns `true` when a row was written.
    fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, PersistenceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// A new attendance record was written.
    Committed { timestamp: DateTime<Utc> },
    /// Nothing written: the subject already has a record in this
    /// session, or the decision was unmatched.
    Skipped,
}

/// Commits identity decisions for one camera.
pub struct Committer<S> {
    store: S,
    camera_id: String,
}

impl<S: AttendanceStore> Committer<S> {
    pub fn new(store: S, camera_id: impl Into<String>) -> Self {
        Self {
            store,
            camera_id: camera_id.into(),
        }
    }

    /// Fast-path read used to avoid side work (snapshot encoding) for
    /// subjects already committed this session. Advisory only: the
    /// at-most-once guarantee still comes from the conditional insert.
    pub fn already_committed(
        &self,
        subject_id: &str,
        session_key: &SessionKey,
    ) -> Result<bool, PersistenceError> {
        self.store.exists(subject_id, session_key)
    }

    /// Commit a decision into the given session window.
    ///
    /// Unmatched decisions are never written and return `Skipped`.
    /// Store failures propagate to the caller; retrying the same
    /// decision is safe because the write is idempotent per session.
    pub fn commit(
        &self,
        decision: &IdentityDecision,
        session_key: &SessionKey,
        snapshot: Option<String>,
    ) -> Result<CommitOutcome, PersistenceError> {
        let Some(subject_id) = &decision.subject_id else {
            return Ok(CommitOutcome::Skipped);
        };

        let record = AttendanceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.clone(),
            session_key: session_key.clone(),
            timestamp: decision.frame_timestamp,
            camera_id: self.camera_id.clone(),
            recognized: true,
            snapshot,
        };

        if self.store.insert_if_absent(&record)? {
            Ok(CommitOutcome::Committed {
                timestamp: record.timestamp,
            })
        } else {
            Ok(CommitOutcome::Skipped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<AttendanceRecord>>,
    }

    impl MemoryStore {
        fn records(&self) -> Vec<AttendanceRecord> {
            self.rows.lock().unwrap().clone()
        }
    }

    impl AttendanceStore for MemoryStore {
        fn exists(
            &self,
            subject_id: &str,
            session_key: &SessionKey,
        ) -> Result<bool, PersistenceError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .any(|r| r.subject_id == subject_id && &r.session_key == session_key))
        }

        fn insert_if_absent(&self, record: &AttendanceRecord) -> Result<bool, PersistenceError> {
            let mut rows = self.rows.lock().unwrap();
            if rows
                .iter()
                .any(|r| r.subject_id == record.subject_id && r.session_key == record.session_key)
            {
                return Ok(false);
            }
            rows.push(record.clone());
            Ok(true)
        }
    }

    struct FailingStore;

    impl AttendanceStore for FailingStore {
        fn exists(&self, _: &str, _: &SessionKey) -> Result<bool, PersistenceError> {
            Err(PersistenceError("store offline".into()))
        }

        fn insert_if_absent(&self, _: &AttendanceRecord) -> Result<bool, PersistenceError> {
            Err(PersistenceError("store offline".into()))
        }
    }

    fn matched(subject: &str) -> IdentityDecision {
        IdentityDecision {
            subject_id: Some(subject.to_string()),
            distance: Some(0.3),
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            frame_timestamp: Utc::now(),
        }
    }

    fn unmatched() -> IdentityDecision {
        IdentityDecision {
            subject_id: None,
            distance: Some(0.7),
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            frame_timestamp: Utc::now(),
        }
    }

    #[test]
    fn first_commit_writes_second_skips() {
        let committer = Committer::new(MemoryStore::default(), "cam-1");
        let session = SessionKey::new("2024-03-15");
        let decision = matched("alice");

        let first = committer.commit(&decision, &session, None).unwrap();
        assert!(matches!(first, CommitOutcome::Committed { .. }));

        let second = committer.commit(&decision, &session, None).unwrap();
        assert_eq!(second, CommitOutcome::Skipped);

        assert_eq!(committer.store.records().len(), 1);
    }

    #[test]
    fn new_session_opens_new_write_slot() {
        let committer = Committer::new(MemoryStore::default(), "cam-1");
        let decision = matched("alice");

        let monday = SessionKey::new("2024-03-18");
        let tuesday = SessionKey::new("2024-03-19");

        assert!(matches!(
            committer.commit(&decision, &monday, None).unwrap(),
            CommitOutcome::Committed { .. }
        ));
        assert!(matches!(
            committer.commit(&decision, &tuesday, None).unwrap(),
            CommitOutcome::Committed { .. }
        ));
        assert_eq!(committer.store.records().len(), 2);
    }

    #[test]
    fn unmatched_decision_is_never_written() {
        let committer = Committer::new(MemoryStore::default(), "cam-1");
        let session = SessionKey::new("2024-03-15");

        let outcome = committer.commit(&unmatched(), &session, None).unwrap();
        assert_eq!(outcome, CommitOutcome::Skipped);
        assert!(committer.store.records().is_empty());
    }

    #[test]
    fn committed_timestamp_is_frame_timestamp() {
        let committer = Committer::new(MemoryStore::default(), "cam-1");
        let session = SessionKey::new("2024-03-15");
        let decision = matched("alice");

        match committer.commit(&decision, &session, None).unwrap() {
            CommitOutcome::Committed { timestamp } => {
                assert_eq!(timestamp, decision.frame_timestamp);
            }
            other => panic!("expected Committed, got {other:?}"),
        }
    }

    #[test]
    fn record_carries_camera_and_snapshot() {
        let committer = Committer::new(MemoryStore::default(), "room-204");
        let session = SessionKey::new("2024-03-15");
        committer
            .commit(&matched("alice"), &session, Some("snaps/alice.png".into()))
            .unwrap();

        let records = committer.store.records();
        assert_eq!(records[0].camera_id, "room-204");
        assert_eq!(records[0].snapshot.as_deref(), Some("snaps/alice.png"));
        assert!(records[0].recognized);
    }

    #[test]
    fn already_committed_tracks_session_state() {
        let committer = Committer::new(MemoryStore::default(), "cam-1");
        let session = SessionKey::new("2024-03-15");

        assert!(!committer.already_committed("alice", &session).unwrap());
        committer.commit(&matched("alice"), &session, None).unwrap();
        assert!(committer.already_committed("alice", &session).unwrap());
        assert!(!committer
            .already_committed("alice", &SessionKey::new("2024-03-16"))
            .unwrap());
    }

    #[test]
    fn store_failure_surfaces_to_caller() {
        let committer = Committer::new(FailingStore, "cam-1");
        let session = SessionKey::new("2024-03-15");
        let err = committer.commit(&matched("alice"), &session, None);
        assert!(err.is_err());
    }

    #[test]
    fn distinct_subjects_both_commit_in_one_session() {
        let committer = Committer::new(MemoryStore::default(), "cam-1");
        let session = SessionKey::new("2024-03-15");

        assert!(matches!(
            committer.commit(&matched("alice"), &session, None).unwrap(),
            CommitOutcome::Committed { .. }
        ));
        assert!(matches!(
            committer.commit(&matched("bob"), &session, None).unwrap(),
            CommitOutcome::Committed { .. }
        ));
        assert_eq!(committer.store.records().len(), 2);
    }
}
