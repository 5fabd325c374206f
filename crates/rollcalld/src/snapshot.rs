//! Commit snapshot writer.
//!
//! Saves the raw frame a subject was recognized in as a PNG next to
//! the attendance record. Snapshot failures are never allowed to block
//! a commit; the caller logs and proceeds without a reference.

use chrono::{DateTime, Utc};
use rollcall_core::{Frame, PixelLayout, SessionKey};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encoding: {0}")]
    Image(#[from] image::ImageError),
    #[error("frame buffer does not match its dimensions")]
    BadFrame,
}

/// Write `frame` as a PNG under `dir`, returning the stored path.
pub fn save_frame(
    dir: &Path,
    subject_id: &str,
    session_key: &SessionKey,
    frame: &Frame,
) -> Result<String, SnapshotError> {
    std::fs::create_dir_all(dir)?;
    let path = snapshot_path(dir, subject_id, session_key, &frame.timestamp);

    match frame.layout {
        PixelLayout::Gray8 => {
            let img = image::GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
                .ok_or(SnapshotError::BadFrame)?;
            img.save(&path)?;
        }
        PixelLayout::Rgb8 => {
            let img = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
                .ok_or(SnapshotError::BadFrame)?;
            img.save(&path)?;
        }
        PixelLayout::Bgr8 => {
            let mut rgb = frame.data.clone();
            for px in rgb.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            let img = image::RgbImage::from_raw(frame.width, frame.height, rgb)
                .ok_or(SnapshotError::BadFrame)?;
            img.save(&path)?;
        }
    }

    Ok(path.to_string_lossy().into_owned())
}

fn snapshot_path(
    dir: &Path,
    subject_id: &str,
    session_key: &SessionKey,
    timestamp: &DateTime<Utc>,
) -> PathBuf {
    let name = format!(
        "{}-{}-{}.png",
        sanitize(subject_id),
        sanitize(session_key.as_str()),
        timestamp.format("%Y%m%dT%H%M%S%3fZ")
    );
    dir.join(name)
}

/// Keep file names shell- and filesystem-safe regardless of what the
/// subject id contains.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
