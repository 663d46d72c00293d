/// Frame source abstraction.
///
/// A capture source is opened and warmed up once before the bridge starts
/// listening, then reused unchanged for every session and cycle.
use image::RgbImage;

use crate::error::Result;

/// One captured frame, 8-bit RGB at the configured resolution
pub type Frame = RgbImage;

/// Camera configuration, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    /// Analogue gain
    pub gain: i64,
    pub auto_exposure: bool,
}

pub trait CaptureSource {
    /// Capture one complete frame. May block for exposure.
    fn capture_frame(&mut self) -> Result<Frame>;
}

impl<C: CaptureSource + ?Sized> CaptureSource for &mut C {
    fn capture_frame(&mut self) -> Result<Frame> {
        (**self).capture_frame()
    }
}

/// Convert a packed YUYV (YUV 4:2:2) buffer to RGB.
///
/// Returns None if the buffer is shorter than `width * height * 2` bytes or
/// the width is odd.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<Frame> {
    if width % 2 != 0 {
        return None;
    }
    let pixels = (width as usize) * (height as usize);
    if data.len() < pixels * 2 {
        return None;
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in data[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_pixel(y0, u, v));
        rgb.extend_from_slice(&yuv_pixel(y1, u, v));
    }
    RgbImage::from_raw(width, height, rgb)
}

// BT.601 limited range
fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}
