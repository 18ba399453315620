//! Captured frame container.
//!
//! Frames carry a student card in view, so their pixels are treated as
//! sensitive:
//!
//! - `Frame`: owns RGB8 pixels. Bytes are private and zeroized on drop.
//! - The only path out is `Frame::encode_jpeg`, which produces the upload
//!   body for the recognition endpoint.
//!
//! There is no `Clone`, no `AsRef<[u8]>` and no `Serialize` on `Frame`.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use zeroize::Zeroize;

/// Width and height of a camera frame in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A size is usable once both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub(crate) fn rgb_len(&self) -> Result<usize> {
        self.width
            .checked_mul(self.height)
            .and_then(|v| v.checked_mul(3))
            .map(|v| v as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

/// One rasterized camera frame (RGB8, row-major).
pub struct Frame {
    /// Private pixel data. MUST NOT be exposed via any public API.
    pixels: Vec<u8>,
    size: FrameSize,
}

impl Frame {
    /// Wrap RGB8 pixels. Called by capture backends.
    pub(crate) fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let size = FrameSize::new(width, height);
        if !size.is_valid() {
            return Err(anyhow!("frame has empty dimensions {}x{}", width, height));
        }
        let expected = size.rgb_len()?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self { pixels, size })
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Compress the frame to JPEG at `quality` (1..=100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let quality = quality.clamp(1, 100);
        let mut out = Vec::with_capacity(self.pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(
                &self.pixels,
                self.size.width,
                self.size.height,
                ExtendedColorType::Rgb8,
            )
            .context("encode frame as jpeg")?;
        Ok(out)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.pixels.zeroize();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.size.width)
            .field("height", &self.size.height)
            .finish_non_exhaustive()
    }
}
