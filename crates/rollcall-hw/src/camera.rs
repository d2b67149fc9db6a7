//! Webcam access through V4L2.

use crate::frame::{self, Frame, PixelLayout};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Linux `EBUSY`: another process holds the device.
const EBUSY: i32 = 16;

/// Highest `/dev/videoN` index scanned by [`Camera::list_devices`].
const MAX_VIDEO_NODES: u32 = 16;

/// Buffers queued per capture stream.
const STREAM_BUFFERS: u32 = 4;

/// Frames thrown away after the stream starts while auto-exposure settles.
const WARMUP_FRAMES: usize = 2;

/// Dark frames skipped past warm-up before the last one read is kept anyway.
const MAX_DARK_SKIPS: usize = 3;

/// Share of near-black pixels above which a frame counts as dark.
const DARK_THRESHOLD: f32 = 0.95;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("not a video capture device: {0}")]
    NotCaptureDevice(String),
    #[error("camera released")]
    Released,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel formats the sampler can turn into RGB, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, 2 bytes/pixel.
    Yuyv,
    /// Motion JPEG, one compressed image per buffer.
    Mjpg,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    const PREFERENCE: [PixelFormat; 3] = [PixelFormat::Yuyv, PixelFormat::Mjpg, PixelFormat::Grey];

    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Mjpg => FourCC::new(b"MJPG"),
            PixelFormat::Grey => FourCC::new(b"GREY"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|f| f.fourcc() == fourcc)
    }
}

/// Anything that can hand out the current video frame on demand.
pub trait FrameSource {
    /// Native frame size, if known yet.
    fn native_size(&self) -> Option<(u32, u32)>;

    fn capture(&mut self) -> Result<Frame, CameraError>;
}

/// An opened webcam. Dropping it releases the device.
pub struct Camera {
    device: Device,
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCC,
    format: PixelFormat,
}

impl Camera {
    /// Open `device_path` and negotiate `width`x`height`.
    ///
    /// Drivers are free to pick a nearby size or another pixel format; whatever
    /// they settle on is kept as long as it is one of [`PixelFormat`].
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;
        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("query capabilities: {e}")))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCaptureDevice(device_path.to_string()));
        }

        let (format, negotiated) = negotiate(&device, width, height)?;
        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            format = ?format,
            "camera opened"
        );

        Ok(Self {
            device,
            device_path: device_path.to_string(),
            width: negotiated.width,
            height: negotiated.height,
            fourcc: negotiated.fourcc,
            format,
        })
    }

    /// Grab the frame currently on the sensor.
    ///
    /// Each call starts a fresh stream, so the warm-up frames are discarded and
    /// dark frames are skipped before one is handed back.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("start stream: {e}")))?;

        for _ in 0..WARMUP_FRAMES {
            let (_, meta) = stream.next().map_err(dequeue_error)?;
            tracing::trace!(seq = meta.sequence, "warm-up frame discarded");
        }

        first_lit(MAX_DARK_SKIPS, || {
            let (buf, meta) = stream.next().map_err(dequeue_error)?;
            let used = match meta.bytesused as usize {
                0 => buf.len(),
                n => n.min(buf.len()),
            };
            let (data, width, height, layout) = self.decode(&buf[..used])?;
            Ok(Frame {
                data,
                width,
                height,
                layout,
                sequence: meta.sequence,
            })
        })
    }

    fn decode(&self, buf: &[u8]) -> Result<(Vec<u8>, u32, u32, PixelLayout), CameraError> {
        let failed = |e: frame::FrameError| CameraError::CaptureFailed(format!("{:?} frame: {e}", self.format));
        match self.format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map(|rgb| (rgb, self.width, self.height, PixelLayout::Rgb8))
                .map_err(failed),
            PixelFormat::Mjpg => frame::mjpeg_to_rgb(buf)
                .map(|(rgb, w, h)| (rgb, w, h, PixelLayout::Rgb8))
                .map_err(failed),
            PixelFormat::Grey => {
                let pixels = self.width as usize * self.height as usize;
                if buf.len() < pixels {
                    return Err(failed(frame::FrameError::InvalidLength {
                        expected: pixels,
                        actual: buf.len(),
                    }));
                }
                Ok((buf[..pixels].to_vec(), self.width, self.height, PixelLayout::Luma8))
            }
        }
    }

    /// Video capture nodes present on this machine.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_VIDEO_NODES)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

/// Read frames from `grab` until one is not dark. After `max_skips` dark frames the
/// last one is returned: a dark room is still the current view.
fn first_lit(
    max_skips: usize,
    mut grab: impl FnMut() -> Result<Frame, CameraError>,
) -> Result<Frame, CameraError> {
    let mut frame = grab()?;
    for _ in 0..max_skips {
        if !frame.is_dark(DARK_THRESHOLD) {
            break;
        }
        tracing::debug!(seq = frame.sequence, "skipping dark frame");
        frame = grab()?;
    }
    Ok(frame)
}

fn dequeue_error(e: io::Error) -> CameraError {
    CameraError::CaptureFailed(format!("dequeue buffer: {e}"))
}

fn open_error(path: &str, e: io::Error) -> CameraError {
    if e.raw_os_error() == Some(EBUSY) {
        CameraError::DeviceBusy
    } else {
        CameraError::DeviceNotFound(format!("{path}: {e}"))
    }
}

/// Try each supported format at the requested size until the driver accepts one.
fn negotiate(device: &Device, width: u32, height: u32) -> Result<(PixelFormat, v4l::Format), CameraError> {
    let mut fmt = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("get format: {e}")))?;
    fmt.width = width;
    fmt.height = height;

    for wanted in PixelFormat::PREFERENCE {
        fmt.fourcc = wanted.fourcc();
        let applied = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("set format: {e}")))?;
        if let Some(format) = PixelFormat::from_fourcc(applied.fourcc) {
            if format != wanted {
                tracing::debug!(?wanted, got = ?format, "driver substituted pixel format");
            }
            return Ok((format, applied));
        }
    }
    Err(CameraError::FormatNegotiationFailed(
        "no YUYV, MJPG or GREY mode".to_string(),
    ))
}

impl FrameSource for Camera {
    fn native_size(&self) -> Option<(u32, u32)> {
        (self.width > 0 && self.height > 0).then_some((self.width, self.height))
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        self.capture_frame()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_path, "camera released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn frame(level: u8, sequence: u32) -> Frame {
        Frame {
            data: vec![level; 4 * 4],
            width: 4,
            height: 4,
            layout: PixelLayout::Luma8,
            sequence,
        }
    }

    fn feed(levels: &[u8]) -> (impl FnMut() -> Result<Frame, CameraError>, std::rc::Rc<std::cell::Cell<usize>>) {
        let mut frames: VecDeque<Frame> = levels
            .iter()
            .enumerate()
            .map(|(i, &level)| frame(level, i as u32))
            .collect();
        let grabs = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = std::rc::Rc::clone(&grabs);
        let grab = move || {
            counter.set(counter.get() + 1);
            frames
                .pop_front()
                .ok_or_else(|| CameraError::CaptureFailed("stream ended".into()))
        };
        (grab, grabs)
    }

    #[test]
    fn test_dark_frames_are_skipped() {
        let (grab, grabs) = feed(&[0, 4, 120, 130]);
        let frame = first_lit(MAX_DARK_SKIPS, grab).unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(grabs.get(), 3);
    }

    #[test]
    fn test_lit_first_frame_is_kept() {
        let (grab, grabs) = feed(&[100, 0]);
        assert_eq!(first_lit(MAX_DARK_SKIPS, grab).unwrap().sequence, 0);
        assert_eq!(grabs.get(), 1);
    }

    #[test]
    fn test_dark_scene_returns_last_frame() {
        let (grab, grabs) = feed(&[0, 0, 0, 0, 0, 200]);
        let frame = first_lit(MAX_DARK_SKIPS, grab).unwrap();
        assert_eq!(frame.sequence, MAX_DARK_SKIPS as u32);
        assert_eq!(grabs.get(), MAX_DARK_SKIPS + 1);
    }

    #[test]
    fn test_stream_error_propagates() {
        let (grab, _) = feed(&[0]);
        assert!(matches!(
            first_lit(MAX_DARK_SKIPS, grab),
            Err(CameraError::CaptureFailed(_))
        ));
    }

    #[test]
    fn test_fourcc_mapping() {
        for format in PixelFormat::PREFERENCE {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), None);
    }

    #[test]
    fn test_busy_is_distinguished() {
        let busy = open_error("/dev/video0", io::Error::from_raw_os_error(EBUSY));
        assert!(matches!(busy, CameraError::DeviceBusy));
        let gone = open_error("/dev/video9", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(gone, CameraError::DeviceNotFound(_)));
    }

    #[test]
    fn test_missing_device() {
        assert!(matches!(
            Camera::open("/dev/rollcall-does-not-exist", 640, 480),
            Err(CameraError::DeviceNotFound(_))
        ));
    }
}
