//! Synthetic camera (`stub://`).
//!
//! Produces a moving gradient at the preferred resolution. Frame size is
//! withheld until `warmup` has elapsed since `connect`, the same way a real
//! device only reports dimensions after its first buffers arrive.

use anyhow::{anyhow, Result};
use std::time::Instant;

use super::CaptureSource;
use crate::config::CameraSettings;
use crate::frame::{Frame, FrameSize};

pub struct SyntheticCamera {
    settings: CameraSettings,
    connected_at: Option<Instant>,
    frame_count: u64,
    released: bool,
}

impl SyntheticCamera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            connected_at: None,
            frame_count: 0,
            released: false,
        }
    }

    /// Synthetic sources are always "connected".
    pub fn connect(&mut self) -> Result<()> {
        self.connected_at = Some(Instant::now());
        self.released = false;
        log::info!(
            "SyntheticCamera: connected to {} ({}x{}, warm-up {}ms)",
            self.settings.uri,
            self.settings.width,
            self.settings.height,
            self.settings.warmup.as_millis()
        );
        Ok(())
    }

    fn generate_pixels(&self, size: FrameSize) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; size.rgb_len()?];
        let shift = self.frame_count;
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + shift) % 256) as u8;
        }
        Ok(pixels)
    }
}

impl CaptureSource for SyntheticCamera {
    fn describe(&self) -> String {
        self.settings.uri.clone()
    }

    fn frame_size(&self) -> Option<FrameSize> {
        if self.released {
            return None;
        }
        let connected_at = self.connected_at?;
        if connected_at.elapsed() < self.settings.warmup {
            return None;
        }
        let size = FrameSize::new(self.settings.width, self.settings.height);
        size.is_valid().then_some(size)
    }

    fn capture(&mut self) -> Result<Frame> {
        let size = self
            .frame_size()
            .ok_or_else(|| anyhow!("synthetic camera {} not ready", self.settings.uri))?;
        self.frame_count += 1;
        let pixels = self.generate_pixels(size)?;
        Frame::from_rgb(pixels, size.width, size.height)
    }

    fn release(&mut self) {
        self.released = true;
        log::info!("SyntheticCamera: released {}", self.settings.uri);
    }
}
