//! V4L2 camera source via the `v4l` crate.

use crate::source::{FrameConnection, FrameSource, SourceError};
use chrono::Utc;
use rollcall_core::{Frame, PixelLayout};
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Requested capture size; the driver may negotiate something else.
const REQUESTED_WIDTH: u32 = 1280;
const REQUESTED_HEIGHT: u32 = 720;

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

/// Frame source over a `/dev/videoN` device.
pub struct V4l2Source {
    device_path: String,
}

impl V4l2Source {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }
}

impl FrameSource for V4l2Source {
    type Conn = V4l2Connection;

    fn connect(&self) -> Result<V4l2Connection, SourceError> {
        V4l2Connection::open(&self.device_path)
    }
}

/// An open V4L2 capture connection.
pub struct V4l2Connection {
    device: Device,
    width: u32,
    height: u32,
    format: CaptureFormat,
}

impl V4l2Connection {
    fn open(device_path: &str) -> Result<Self, SourceError> {
        if !Path::new(device_path).exists() {
            return Err(SourceError::Connection(format!(
                "device not found: {device_path}"
            )));
        }

        let device = Device::with_path(device_path)
            .map_err(|e| SourceError::Connection(format!("{device_path}: {e}")))?;

        let caps = device
            .query_caps()
            .map_err(|e| SourceError::Connection(format!("query capabilities: {e}")))?;
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(SourceError::Connection(format!(
                "{device_path} does not support video capture"
            )));
        }

        let mut fmt = device
            .format()
            .map_err(|e| SourceError::Connection(format!("get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| SourceError::Connection(format!("set format: {e}")))?;

        let format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            CaptureFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            CaptureFormat::Grey
        } else if negotiated.fourcc == FourCC::new(b"Y16 ")
            || negotiated.fourcc == FourCC::new(b"Y16\0")
        {
            CaptureFormat::Y16
        } else {
            return Err(SourceError::Connection(format!(
                "unsupported pixel format {:?} (need YUYV, GREY, or Y16)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "camera connected"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            format,
        })
    }

    fn buf_to_gray(&self, buf: &[u8]) -> Result<Vec<u8>, SourceError> {
        let pixels = (self.width * self.height) as usize;
        match self.format {
            CaptureFormat::Grey => {
                if buf.len() < pixels {
                    return Err(SourceError::BadFrame(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                Ok(buf[..pixels].to_vec())
            }
            CaptureFormat::Y16 => y16_to_gray(buf, pixels),
            CaptureFormat::Yuyv => yuyv_to_gray(buf, pixels),
        }
    }
}

impl FrameConnection for V4l2Connection {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| SourceError::Connection(format!("create mmap stream: {e}")))?;

        let (buf, _meta) = stream
            .next()
            .map_err(|e| SourceError::Connection(format!("dequeue buffer: {e}")))?;

        if buf.is_empty() {
            return Err(SourceError::EmptyFrame);
        }

        let gray = self.buf_to_gray(buf)?;

        Ok(Frame {
            data: gray,
            width: self.width,
            height: self.height,
            layout: PixelLayout::Gray8,
            timestamp: Utc::now(),
        })
    }
}

/// Extract the Y channel from packed YUYV 4:2:2 data.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; the luma values
/// sit at every even byte offset.
fn yuyv_to_gray(yuyv: &[u8], pixels: usize) -> Result<Vec<u8>, SourceError> {
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(SourceError::BadFrame(format!(
            "YUYV buffer too short: expected {expected}, got {}",
            yuyv.len()
        )));
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian grayscale to 8-bit.
fn y16_to_gray(buf: &[u8], pixels: usize) -> Result<Vec<u8>, SourceError> {
    let expected = pixels * 2;
    if buf.len() < expected {
        return Err(SourceError::BadFrame(format!(
            "Y16 buffer too short: expected {expected}, got {}",
            buf.len()
        )));
    }
    let mut gray = Vec::with_capacity(pixels);
    for chunk in buf[..expected].chunks_exact(2) {
        let value = u16::from_le_bytes([chunk[0], chunk[1]]);
        gray.push((value >> 8) as u8);
    }
    Ok(gray)
}
