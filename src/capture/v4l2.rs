//! V4L2 camera source.
//!
//! This module provides `V4l2Camera` for local USB/built-in cameras
//! (e.g. /dev/video0).
//!
//! The V4L2 camera is responsible for:
//! - Requesting the preferred resolution (1280x720 by default)
//! - Adopting whatever format the driver actually negotiates
//! - Capturing frames in-memory as RGB8

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::{decode_jpeg, CaptureSource};
use crate::config::CameraSettings;
use crate::frame::{Frame, FrameSize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelFormat {
    Rgb24,
    Mjpeg,
}

pub struct V4l2Camera {
    settings: CameraSettings,
    state: Option<V4l2State>,
    format: PixelFormat,
    active: Option<FrameSize>,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            state: None,
            format: PixelFormat::Rgb24,
            active: None,
            frame_count: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.settings.uri)
            .with_context(|| format!("open v4l2 device {}", self.settings.uri))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.settings.width;
        format.height = self.settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    self.settings.uri,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"MJPG" => PixelFormat::Mjpeg,
            other => {
                return Err(anyhow!(
                    "v4l2 device {} negotiated unsupported format {}",
                    self.settings.uri,
                    String::from_utf8_lossy(other)
                ))
            }
        };

        if format.width != self.settings.width || format.height != self.settings.height {
            log::info!(
                "V4l2Camera: requested {}x{}, driver gave {}x{}",
                self.settings.width,
                self.settings.height,
                format.width,
                format.height
            );
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);
        self.active = Some(FrameSize::new(format.width, format.height));

        log::info!(
            "V4l2Camera: connected to {} ({}x{} {:?})",
            self.settings.uri,
            format.width,
            format.height,
            self.format
        );
        Ok(())
    }
}

impl CaptureSource for V4l2Camera {
    fn describe(&self) -> String {
        self.settings.uri.clone()
    }

    fn frame_size(&self) -> Option<FrameSize> {
        self.state.as_ref()?;
        self.active.filter(FrameSize::is_valid)
    }

    fn capture(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let size = self.frame_size().context("v4l2 device not connected")?;
        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let format = self.format;
        let frame = state.with_mut(|fields| -> Result<Frame> {
            let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
            let used = (meta.bytesused as usize).min(buf.len());
            match format {
                PixelFormat::Rgb24 => {
                    let expected = size.rgb_len()?;
                    if used < expected {
                        return Err(anyhow!(
                            "short v4l2 frame: expected {}, got {}",
                            expected,
                            used
                        ));
                    }
                    Frame::from_rgb(buf[..expected].to_vec(), size.width, size.height)
                }
                PixelFormat::Mjpeg => decode_jpeg(&buf[..used]),
            }
        })?;
        self.frame_count += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Camera: released {} after {} frames",
                self.settings.uri,
                self.frame_count
            );
        }
    }
}
