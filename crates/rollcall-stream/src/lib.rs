//! rollcall-stream — frame acquisition for the attendance pipeline.
//!
//! Provides the `FrameSource`/`FrameConnection` seam over live video
//! connections, a V4L2 implementation, and the resilient wrapper that
//! owns the reconnect-forever policy.

pub mod camera;
pub mod resilient;
pub mod source;

pub use camera::V4l2Source;
pub use resilient::{ResilientSource, RetryPolicy, StopFlag, StreamState};
pub use source::{redact_descriptor, FrameConnection, FrameSource, SourceError};
