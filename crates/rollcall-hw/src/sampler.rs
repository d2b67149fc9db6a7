//! Frame sampler: draws the current frame onto a raster surface and encodes it as JPEG.

use crate::camera::{CameraError, FrameSource};
use crate::frame::{Frame, PixelLayout};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, GrayImage, RgbImage};
use thiserror::Error;

/// Surface size used while the source has not reported its dimensions.
pub const FALLBACK_SIZE: (u32, u32) = (640, 480);

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("frame holds no pixels")]
    EmptyFrame,
    #[error("jpeg encode failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("encoder produced an empty payload")]
    EmptyPayload,
}

#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    quality: u8,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameSampler {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Grab the current frame from `source` and return it JPEG-encoded.
    pub fn sample<S: FrameSource + ?Sized>(&self, source: &mut S) -> Result<Vec<u8>, SampleError> {
        let surface = source.native_size().unwrap_or(FALLBACK_SIZE);
        let frame = source.capture()?;
        self.encode(&frame, surface)
    }

    /// Draw `frame` onto a `surface`-sized RGB raster and encode it.
    pub fn encode(&self, frame: &Frame, surface: (u32, u32)) -> Result<Vec<u8>, SampleError> {
        let raster = render(frame, surface)?;
        let mut payload = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut payload, self.quality);
        encoder.encode(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgb8,
        )?;
        if payload.is_empty() {
            return Err(SampleError::EmptyPayload);
        }
        tracing::trace!(
            seq = frame.sequence,
            width = raster.width(),
            height = raster.height(),
            bytes = payload.len(),
            "frame encoded"
        );
        Ok(payload)
    }
}

fn render(frame: &Frame, (width, height): (u32, u32)) -> Result<RgbImage, SampleError> {
    if frame.is_empty() || width == 0 || height == 0 {
        return Err(SampleError::EmptyFrame);
    }
    let len = frame.width as usize * frame.height as usize * frame.layout.bytes_per_pixel();
    let pixels = frame.data[..len].to_vec();

    let image = match frame.layout {
        PixelLayout::Rgb8 => RgbImage::from_raw(frame.width, frame.height, pixels),
        PixelLayout::Luma8 => GrayImage::from_raw(frame.width, frame.height, pixels)
            .map(|gray| DynamicImage::ImageLuma8(gray).to_rgb8()),
    }
    .ok_or(SampleError::EmptyFrame)?;

    if image.dimensions() == (width, height) {
        Ok(image)
    } else {
        Ok(imageops::resize(&image, width, height, FilterType::Triangle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StillSource {
        native: Option<(u32, u32)>,
        frame: Frame,
    }

    impl FrameSource for StillSource {
        fn native_size(&self) -> Option<(u32, u32)> {
            self.native
        }

        fn capture(&mut self) -> Result<Frame, CameraError> {
            Ok(self.frame.clone())
        }
    }

    struct DeadSource;

    impl FrameSource for DeadSource {
        fn native_size(&self) -> Option<(u32, u32)> {
            None
        }

        fn capture(&mut self) -> Result<Frame, CameraError> {
            Err(CameraError::CaptureFailed("no buffer".into()))
        }
    }

    fn frame(width: u32, height: u32, layout: PixelLayout) -> Frame {
        Frame {
            data: vec![128; (width * height) as usize * layout.bytes_per_pixel()],
            width,
            height,
            layout,
            sequence: 1,
        }
    }

    #[test]
    fn test_native_size_surface() {
        let mut source = StillSource {
            native: Some((32, 24)),
            frame: frame(32, 24, PixelLayout::Rgb8),
        };
        let jpeg = FrameSampler::default().sample(&mut source).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_unknown_size_falls_back() {
        let mut source = StillSource {
            native: None,
            frame: frame(16, 12, PixelLayout::Luma8),
        };
        let jpeg = FrameSampler::new(85).sample(&mut source).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), FALLBACK_SIZE);
    }

    #[test]
    fn test_empty_frame_is_dropped() {
        let mut empty = frame(4, 4, PixelLayout::Rgb8);
        empty.data.clear();
        let mut source = StillSource {
            native: Some((4, 4)),
            frame: empty,
        };
        assert!(matches!(
            FrameSampler::default().sample(&mut source),
            Err(SampleError::EmptyFrame)
        ));
    }

    #[test]
    fn test_camera_error_propagates() {
        assert!(matches!(
            FrameSampler::default().sample(&mut DeadSource),
            Err(SampleError::Camera(_))
        ));
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(FrameSampler::new(0).quality(), 1);
        assert_eq!(FrameSampler::new(250).quality(), 100);
    }
}
