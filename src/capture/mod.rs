//! Camera capture sources.
//!
//! This module provides the sources a kiosk can scan from:
//! - Synthetic camera (`stub://`, testing and demos)
//! - Network cameras serving MJPEG or JPEG snapshots over HTTP
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! All sources produce `Frame` instances for the scan loop.
//! A source is responsible for:
//! - Requesting the preferred resolution (advisory only)
//! - Reporting the negotiated frame size once the device has delivered it
//! - Rasterizing exactly one frame per `capture` call
//!
//! A source MUST NOT:
//! - Store frames to disk
//! - Retain frames beyond handoff to the caller

use anyhow::{anyhow, Result};

use crate::config::CameraSettings;
use crate::frame::{Frame, FrameSize};

pub mod http;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use http::HttpCamera;
pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

/// A live camera the scan loop can pull frames from.
pub trait CaptureSource: Send {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Negotiated frame size, `None` while the camera is still warming up.
    fn frame_size(&self) -> Option<FrameSize>;

    /// Rasterize the most recent frame. Called on the event loop, so
    /// implementations must not wait on the network.
    fn capture(&mut self) -> Result<Frame>;

    /// Release the underlying device. Further captures fail.
    fn release(&mut self) {}
}

/// Open the camera named by `settings.uri`.
///
/// - `stub://...` selects the synthetic camera
/// - `http://` / `https://` selects a network camera
/// - anything else is treated as a V4L2 device path
pub fn open_camera(settings: &CameraSettings) -> Result<Box<dyn CaptureSource>> {
    let uri = settings.uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("camera uri is empty"));
    }

    if uri.starts_with("stub://") {
        let mut camera = SyntheticCamera::new(settings.clone());
        camera.connect()?;
        return Ok(Box::new(camera));
    }

    if uri.starts_with("http://") || uri.starts_with("https://") {
        let mut camera = HttpCamera::new(settings.clone())?;
        camera.connect()?;
        return Ok(Box::new(camera));
    }

    open_device(settings)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(settings: &CameraSettings) -> Result<Box<dyn CaptureSource>> {
    let mut camera = V4l2Camera::new(settings.clone());
    camera.connect()?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(settings: &CameraSettings) -> Result<Box<dyn CaptureSource>> {
    Err(anyhow!(
        "camera '{}' is a local device; rebuild with the ingest-v4l2 feature",
        settings.uri
    ))
}

/// Decode an in-memory JPEG into RGB8 pixels.
pub(crate) fn decode_jpeg(bytes: &[u8]) -> Result<Frame> {
    use anyhow::Context;

    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::from_rgb(rgb.into_raw(), width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stub_uri_opens_synthetic_camera() -> Result<()> {
        let settings = CameraSettings {
            uri: "stub://desk".to_string(),
            warmup: Duration::ZERO,
            ..CameraSettings::default()
        };
        let camera = open_camera(&settings)?;
        assert_eq!(camera.describe(), "stub://desk");
        assert_eq!(camera.frame_size(), Some(FrameSize::new(1280, 720)));
        Ok(())
    }

    #[test]
    fn empty_uri_is_rejected() {
        let settings = CameraSettings {
            uri: "  ".to_string(),
            ..CameraSettings::default()
        };
        assert!(open_camera(&settings).is_err());
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_path_requires_v4l2_feature() {
        let settings = CameraSettings {
            uri: "/dev/video0".to_string(),
            ..CameraSettings::default()
        };
        let err = open_camera(&settings).err().map(|e| e.to_string());
        assert!(err.unwrap_or_default().contains("ingest-v4l2"));
    }
}
