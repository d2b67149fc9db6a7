//! Frame type and pixel conversion: YUYV and MJPG to RGB, grayscale passthrough.

/// Pixel layout of [`Frame::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 3 bytes/pixel, R G B.
    Rgb8,
    /// 1 byte/pixel luminance (monochrome sensors).
    Luma8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgb8 => 3,
            PixelLayout::Luma8 => 1,
        }
    }
}

/// A captured camera frame.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    /// Driver sequence number of the buffer this frame came from.
    pub sequence: u32,
}

/// Luma below which a pixel counts as near-black.
const DARK_LUMA: u8 = 32;

impl Frame {
    /// True when the buffer holds no pixels or is shorter than its dimensions claim.
    pub fn is_empty(&self) -> bool {
        let expected = self.width as usize * self.height as usize * self.layout.bytes_per_pixel();
        expected == 0 || self.data.len() < expected
    }

    /// True when more than `threshold_pct` of the pixels are near-black, as in the
    /// first frames after a stream starts while auto-exposure settles.
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        if self.is_empty() {
            return true;
        }
        let pixels = self.width as usize * self.height as usize;
        let data = &self.data[..pixels * self.layout.bytes_per_pixel()];
        let dark = match self.layout {
            PixelLayout::Luma8 => data.iter().filter(|&&y| y < DARK_LUMA).count(),
            PixelLayout::Rgb8 => data
                .chunks_exact(3)
                .filter(|px| luma(px[0], px[1], px[2]) < DARK_LUMA)
                .count(),
        };
        (dark as f32 / pixels as f32) > threshold_pct
    }
}

/// BT.601 luma, integer approximation.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let c = 1.164 * (y as f32 - 16.0);
            rgb.push((c + 1.596 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((c - 0.392 * u - 0.813 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((c + 2.017 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

/// Decode one motion-JPEG buffer to RGB. Returns the pixels and the decoded size.
///
/// Webcams may pad the buffer past the end-of-image marker; the decoder ignores the tail.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    if buf.is_empty() {
        return Err(FrameError::InvalidLength {
            expected: 1,
            actual: 0,
        });
    }
    let rgb = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok((rgb.into_raw(), width, height))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}
