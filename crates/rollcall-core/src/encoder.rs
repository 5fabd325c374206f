//! Detection/encoding port.
//!
//! Face detection and embedding extraction are an external capability:
//! the engine only requires that, given a normalized 3-channel frame,
//! the backend returns zero or more (bounding box, embedding) pairs in
//! its reporting order, deterministically for a fixed frame and
//! configuration. Downstream stages preserve that order.

use crate::frame::NormalizedFrame;
use crate::types::Detection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder backend failure: {0}")]
    Backend(String),
}

/// A face detection and embedding backend.
pub trait FaceEncoder {
    fn detect_and_encode(
        &mut self,
        frame: &NormalizedFrame,
    ) -> Result<Vec<Detection>, EncoderError>;
}

impl<T: FaceEncoder + ?Sized> FaceEncoder for Box<T> {
    fn detect_and_encode(
        &mut self,
        frame: &NormalizedFrame,
    ) -> Result<Vec<Detection>, EncoderError> {
        (**self).detect_and_encode(frame)
    }
}

/// Backend that reports no faces in any frame.
///
/// Used to soak-test the capture/reconnect path of a new camera install
/// before a real encoder backend is wired in.
pub struct NullEncoder;

impl FaceEncoder for NullEncoder {
    fn detect_and_encode(
        &mut self,
        _frame: &NormalizedFrame,
    ) -> Result<Vec<Detection>, EncoderError> {
        Ok(Vec::new())
    }
}
