//! Frame normalization for detection.
//!
//! Pure and deterministic: bounds the frame width (detection cost grows
//! with pixel count), coerces to 3-channel color in the order the
//! encoder expects, and promotes grayscale rather than rejecting it.
//! Applying `normalize` twice with the same parameters yields the same
//! dimensions and color order.

use crate::frame::{ColorOrder, Frame, FrameError, NormalizedFrame, PixelLayout};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bad frame: {0}")]
    BadFrame(#[from] FrameError),
    #[error("max_width must be non-zero")]
    ZeroTarget,
}

/// Parameters for [`normalize`].
#[derive(Debug, Clone, Copy)]
pub struct NormalizeParams {
    /// Frames wider than this are downscaled (aspect ratio preserved);
    /// frames at or below it pass through at full size.
    pub max_width: u32,
    pub order: ColorOrder,
}

/// Normalize a raw frame for the detection/encoding port.
pub fn normalize(frame: &Frame, params: &NormalizeParams) -> Result<NormalizedFrame, FormatError> {
    frame.validate()?;
    if params.max_width == 0 {
        return Err(FormatError::ZeroTarget);
    }

    let (out_w, out_h) = if frame.width > params.max_width {
        let scale = params.max_width as f32 / frame.width as f32;
        let h = ((frame.height as f32 * scale).round() as u32).max(1);
        (params.max_width, h)
    } else {
        (frame.width, frame.height)
    };

    let channels = frame.layout.bytes_per_pixel();
    let resized = if (out_w, out_h) == (frame.width, frame.height) {
        frame.data.clone()
    } else {
        resize_bilinear(
            &frame.data,
            frame.width as usize,
            frame.height as usize,
            channels,
            out_w as usize,
            out_h as usize,
        )
    };

    let data = to_color_order(&resized, frame.layout, params.order);

    Ok(NormalizedFrame {
        data,
        width: out_w,
        height: out_h,
        order: params.order,
    })
}

/// Bilinear downscale of interleaved 8-bit pixel data.
fn resize_bilinear(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    channels: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let scale_x = src_w as f32 / dst_w as f32;
    let scale_y = src_h as f32 / dst_h as f32;

    let mut dst = vec![0u8; dst_w * dst_h * channels];
    for y in 0..dst_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i64).clamp(0, src_h as i64 - 1) as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dst_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i64).clamp(0, src_w as i64 - 1) as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..channels {
                let tl = src[(y0 * src_w + x0) * channels + c] as f32;
                let tr = src[(y0 * src_w + x1) * channels + c] as f32;
                let bl = src[(y1 * src_w + x0) * channels + c] as f32;
                let br = src[(y1 * src_w + x1) * channels + c] as f32;

                let top = tl * (1.0 - fx) + tr * fx;
                let bot = bl * (1.0 - fx) + br * fx;
                let val = top * (1.0 - fy) + bot * fy;

                dst[(y * dst_w + x) * channels + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    dst
}

/// Coerce pixel data to 3-channel in the requested order.
fn to_color_order(data: &[u8], layout: PixelLayout, order: ColorOrder) -> Vec<u8> {
    match layout {
        // Grayscale promoted by replication; channel order is moot.
        PixelLayout::Gray8 => {
            let mut out = Vec::with_capacity(data.len() * 3);
            for &y in data {
                out.extend_from_slice(&[y, y, y]);
            }
            out
        }
        PixelLayout::Rgb8 => match order {
            ColorOrder::Rgb => data.to_vec(),
            ColorOrder::Bgr => swap_first_and_third(data),
        },
        PixelLayout::Bgr8 => match order {
            ColorOrder::Bgr => data.to_vec(),
            ColorOrder::Rgb => swap_first_and_third(data),
        },
    }
}

fn swap_first_and_third(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    for px in out.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    out
}
