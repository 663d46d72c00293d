//! V4L2 capture source.
//!
//! The device is opened, configured and warmed up once. Every later capture
//! dequeues the next buffer from the same mmap stream, so the resolution,
//! gain and exposure mode never change while the bridge runs.

use std::thread;
use std::time::Duration;

use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use loracam::capture::{yuyv_to_rgb, CaptureSettings, CaptureSource, Frame};
use loracam::{Error, Result};

const BUFFER_COUNT: u32 = 4;
const WARMUP: Duration = Duration::from_millis(200);

/// V4L2 `V4L2_EXPOSURE_AUTO` and `V4L2_EXPOSURE_APERTURE_PRIORITY`
const AUTO_EXPOSURE_MODES: [i64; 2] = [0, 3];
const MANUAL_EXPOSURE_MODE: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    Rgb24,
    Yuyv,
}

pub struct V4l2Camera {
    // Dropped before the device
    stream: Stream<'static>,
    _device: Device,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

impl V4l2Camera {
    pub fn open(index: usize, settings: &CaptureSettings) -> Result<Self> {
        let device = Device::new(index).map_err(|e| Error::hardware_init("camera", e))?;

        let mut fmt = device
            .format()
            .map_err(|e| Error::hardware_init("camera", e))?;
        fmt.width = settings.width;
        fmt.height = settings.height;
        fmt.fourcc = FourCC::new(b"RGB3");
        let mut fmt = device
            .set_format(&fmt)
            .map_err(|e| Error::hardware_init("camera", e))?;

        if fmt.fourcc != FourCC::new(b"RGB3") {
            fmt.fourcc = FourCC::new(b"YUYV");
            fmt.width = settings.width;
            fmt.height = settings.height;
            fmt = device
                .set_format(&fmt)
                .map_err(|e| Error::hardware_init("camera", e))?;
        }

        let format = if fmt.fourcc == FourCC::new(b"RGB3") {
            PixelFormat::Rgb24
        } else if fmt.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else {
            return Err(Error::hardware_init(
                "camera",
                format!("no RGB24 or YUYV support (driver offered {})", fmt.fourcc),
            ));
        };
        if (fmt.width, fmt.height) != (settings.width, settings.height) {
            log::warn!(
                "Camera gave {}x{} instead of {}x{}",
                fmt.width,
                fmt.height,
                settings.width,
                settings.height
            );
        }

        apply_controls(&device, settings);

        let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| Error::hardware_init("camera", e))?;

        let bytes_per_pixel = match format {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Yuyv => 2,
        };
        let stride = (fmt.stride as usize).max(fmt.width as usize * bytes_per_pixel);

        let mut camera = V4l2Camera {
            stream,
            _device: device,
            width: fmt.width,
            height: fmt.height,
            stride,
            format,
        };

        // Let auto-exposure settle, then throw away the first frame
        thread::sleep(WARMUP);
        camera
            .capture_frame()
            .map_err(|e| Error::hardware_init("camera", e.to_string()))?;

        log::info!(
            "Camera /dev/video{} ready: {}x{} {:?}",
            index,
            camera.width,
            camera.height,
            camera.format
        );
        Ok(camera)
    }
}

impl CaptureSource for V4l2Camera {
    fn capture_frame(&mut self) -> Result<Frame> {
        let (width, height, stride, format) = (self.width, self.height, self.stride, self.format);
        let (buf, _meta) = self.stream.next().map_err(Error::capture)?;

        let row_bytes = match format {
            PixelFormat::Rgb24 => width as usize * 3,
            PixelFormat::Yuyv => width as usize * 2,
        };
        if buf.len() < stride * (height as usize - 1) + row_bytes {
            return Err(Error::capture(format!(
                "short frame: {} bytes for {}x{}",
                buf.len(),
                width,
                height
            )));
        }

        let mut packed = Vec::with_capacity(row_bytes * height as usize);
        for row in buf.chunks(stride).take(height as usize) {
            packed.extend_from_slice(&row[..row_bytes]);
        }

        let frame = match format {
            PixelFormat::Rgb24 => Frame::from_raw(width, height, packed),
            PixelFormat::Yuyv => yuyv_to_rgb(&packed, width, height),
        };
        frame.ok_or_else(|| Error::capture("frame conversion failed"))
    }
}

/// Gain and exposure are best effort: names and ranges vary by driver.
fn apply_controls(device: &Device, settings: &CaptureSettings) {
    let controls = match device.query_controls() {
        Ok(c) => c,
        Err(e) => {
            log::warn!("Camera controls unavailable: {}", e);
            return;
        }
    };
    let find = |needle: &str| {
        controls
            .iter()
            .find(|c| c.name.to_ascii_lowercase().contains(needle))
            .map(|c| c.id)
    };

    match find("gain") {
        Some(id) => {
            if let Err(e) = device.set_control(Control {
                id,
                value: Value::Integer(settings.gain),
            }) {
                log::warn!("Setting gain failed: {}", e);
            }
        }
        None => log::warn!("Camera has no gain control"),
    }

    let Some(id) = find("auto exposure") else {
        log::warn!("Camera has no auto exposure control");
        return;
    };
    let modes: &[i64] = if settings.auto_exposure {
        &AUTO_EXPOSURE_MODES
    } else {
        &[MANUAL_EXPOSURE_MODE]
    };
    let applied = modes.iter().any(|&mode| {
        device
            .set_control(Control {
                id,
                value: Value::Integer(mode),
            })
            .is_ok()
    });
    if !applied {
        log::warn!("Setting exposure mode failed");
    }
}
