//! rollcall-store — SQLite persistence for enrollments and attendance.
//!
//! Holds the enrollment gallery (read back in insertion order so the
//! matcher's tie-break is stable across restarts) and the attendance
//! table whose `UNIQUE(subject_id, session_key)` constraint backs the
//! at-most-once commit guarantee.

mod codec;
mod db;

pub use codec::{decode_embedding, encode_embedding, CodecError};
pub use db::{AttendanceDb, StoreError};
