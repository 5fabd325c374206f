//! rollcall-core — streaming identity-matching and attendance engine.
//!
//! Takes frames from a camera source, matches detected face embeddings
//! against an enrollment gallery, and commits at most one attendance
//! record per subject per session. Face detection and embedding
//! extraction are an external capability behind [`encoder::FaceEncoder`].

pub mod committer;
pub mod encoder;
pub mod frame;
pub mod matcher;
pub mod preprocess;
pub mod session;
pub mod types;

pub use committer::{
    AttendanceRecord, AttendanceStore, CommitOutcome, Committer, PersistenceError,
};
pub use encoder::{EncoderError, FaceEncoder, NullEncoder};
pub use frame::{ColorOrder, Frame, FrameError, NormalizedFrame, PixelLayout};
pub use matcher::Gallery;
pub use preprocess::{normalize, FormatError, NormalizeParams};
pub use session::{SessionKey, SessionWindow};
pub use types::{
    BoundingBox, Detection, DimensionMismatchError, Embedding, Enrollment, IdentityDecision,
};
