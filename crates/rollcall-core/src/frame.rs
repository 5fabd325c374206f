//! Frame model shared by the capture and recognition stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pixel layout of a raw frame as delivered by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelLayout {
    /// Single-channel 8-bit grayscale.
    Gray8,
    /// 3-channel 8-bit, blue-green-red byte order.
    Bgr8,
    /// 3-channel 8-bit, red-green-blue byte order.
    Rgb8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Bgr8 | PixelLayout::Rgb8 => 3,
        }
    }
}

/// Channel order required by a detection backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOrder {
    Rgb,
    Bgr,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("zero-sized frame: {width}x{height}")]
    ZeroSized { width: u32, height: u32 },
    #[error("frame buffer holds {actual} bytes, {width}x{height} {layout:?} needs {expected}")]
    LengthMismatch {
        width: u32,
        height: u32,
        layout: PixelLayout,
        expected: usize,
        actual: usize,
    },
}

/// A raw frame captured from a video source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    /// Wall-clock time the frame was read from the source.
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    /// Check the frame is non-empty and its buffer matches its declared
    /// dimensions and layout. Frames failing this are never forwarded
    /// to detection.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 || self.data.is_empty() {
            return Err(FrameError::ZeroSized {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.width as usize * self.height as usize * self.layout.bytes_per_pixel();
        if self.data.len() != expected {
            return Err(FrameError::LengthMismatch {
                width: self.width,
                height: self.height,
                layout: self.layout,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// A frame normalized for detection: always 3-channel 8-bit in a
/// known channel order. Produced only by [`crate::preprocess::normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ColorOrder,
}
