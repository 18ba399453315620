//! Network camera source.
//!
//! This module provides `HttpCamera` for IP cameras and phone webcam apps
//! that serve either an MJPEG multipart stream or single JPEG snapshots.
//!
//! The HTTP camera is responsible for:
//! - Connecting to the stream (or probing the snapshot URL)
//! - Reading it on a background thread that keeps only the newest JPEG
//! - Decoding frames in-memory when the scan loop asks for one
//! - Learning the true frame size from the first decoded frame
//!
//! `capture` never touches the network; it hands over whatever the reader
//! thread last received.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{decode_jpeg, CaptureSource};
use crate::config::CameraSettings;
use crate::frame::{Frame, FrameSize};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const SNAPSHOT_PERIOD: Duration = Duration::from_millis(200);
const FIRST_FRAME_WAIT: Duration = Duration::from_secs(10);

pub struct HttpCamera {
    settings: CameraSettings,
    reader: Option<FrameReader>,
    size: Option<FrameSize>,
    connected_at: Option<Instant>,
    frame_count: u64,
}

impl HttpCamera {
    pub fn new(settings: CameraSettings) -> Result<Self> {
        url::Url::parse(&settings.uri).context("parse camera url")?;
        Ok(Self {
            settings,
            reader: None,
            size: None,
            connected_at: None,
            frame_count: 0,
        })
    }

    /// Connect, start the reader thread and decode one frame to learn the size.
    pub fn connect(&mut self) -> Result<()> {
        let uri = self.settings.uri.clone();
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        let response = agent
            .get(&uri)
            .call()
            .with_context(|| format!("connect to camera {}", uri))?;
        let content_type = response.header("Content-Type").unwrap_or("");
        let reader = if content_type.to_lowercase().contains("multipart") {
            FrameReader::mjpeg(response.into_reader(), &uri)?
        } else {
            FrameReader::snapshots(agent, &uri)?
        };

        let jpeg = reader.wait_for_frame(FIRST_FRAME_WAIT)?;
        let size = decode_jpeg(&jpeg)?.size();
        self.reader = Some(reader);
        self.size = Some(size);
        self.connected_at = Some(Instant::now());
        log::info!(
            "HttpCamera: connected to {} ({}x{})",
            uri,
            size.width,
            size.height
        );
        Ok(())
    }
}

impl CaptureSource for HttpCamera {
    fn describe(&self) -> String {
        self.settings.uri.clone()
    }

    fn frame_size(&self) -> Option<FrameSize> {
        self.reader.as_ref()?;
        self.size
    }

    fn capture(&mut self) -> Result<Frame> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| anyhow!("http camera not connected; call connect() first"))?;
        let jpeg = reader
            .take_latest()?
            .ok_or_else(|| anyhow!("no new frame from {} yet", self.settings.uri))?;
        let frame = decode_jpeg(&jpeg)?;
        self.frame_count += 1;
        self.size = Some(frame.size());
        Ok(frame)
    }

    fn release(&mut self) {
        self.reader = None;
        if let Some(connected_at) = self.connected_at.take() {
            log::info!(
                "HttpCamera: released {} after {}s, {} frames",
                self.settings.uri,
                connected_at.elapsed().as_secs(),
                self.frame_count
            );
        }
    }
}

#[derive(Default)]
struct LatestFrame {
    jpeg: Option<Vec<u8>>,
    failure: Option<String>,
}

/// Background reader holding only the newest JPEG. Dropping it asks the
/// thread to stop after its current read.
struct FrameReader {
    latest: Arc<Mutex<LatestFrame>>,
    stop: Arc<AtomicBool>,
}

impl FrameReader {
    fn mjpeg(reader: Box<dyn Read + Send>, uri: &str) -> Result<Self> {
        let mut stream = MjpegStream::new(reader);
        Self::spawn(uri, move || stream.read_latest_jpeg())
    }

    fn snapshots(agent: ureq::Agent, uri: &str) -> Result<Self> {
        let url = uri.to_string();
        let mut first = true;
        Self::spawn(uri, move || {
            if !std::mem::take(&mut first) {
                std::thread::sleep(SNAPSHOT_PERIOD);
            }
            fetch_snapshot(&agent, &url)
        })
    }

    fn spawn<F>(uri: &str, mut next: F) -> Result<Self>
    where
        F: FnMut() -> Result<Vec<u8>> + Send + 'static,
    {
        let latest = Arc::new(Mutex::new(LatestFrame::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let (slot, stopped) = (Arc::clone(&latest), Arc::clone(&stop));
        let uri = uri.to_string();
        std::thread::Builder::new()
            .name("ktm-camera".to_string())
            .spawn(move || {
                while !stopped.load(Ordering::Relaxed) {
                    let result = next();
                    let Ok(mut latest) = slot.lock() else {
                        break;
                    };
                    match result {
                        Ok(jpeg) => latest.jpeg = Some(jpeg),
                        Err(err) => {
                            log::warn!("HttpCamera: reader for {} stopped: {:#}", uri, err);
                            latest.failure = Some(format!("{:#}", err));
                            break;
                        }
                    }
                }
            })
            .context("start camera reader thread")?;
        Ok(Self { latest, stop })
    }

    /// Newest frame not yet handed out, `None` if nothing new arrived.
    fn take_latest(&self) -> Result<Option<Vec<u8>>> {
        let mut slot = self
            .latest
            .lock()
            .map_err(|_| anyhow!("camera reader state poisoned"))?;
        if let Some(jpeg) = slot.jpeg.take() {
            return Ok(Some(jpeg));
        }
        match &slot.failure {
            Some(failure) => Err(anyhow!("camera stream failed: {}", failure)),
            None => Ok(None),
        }
    }

    fn wait_for_frame(&self, limit: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(jpeg) = self.take_latest()? {
                return Ok(jpeg);
            }
            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "no camera frame within {}s",
                    limit.as_secs()
                ));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Read until at least one complete JPEG is buffered, then return the
    /// newest one and discard the older ones.
    fn read_latest_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some(jpeg) = self.take_newest() {
                return Ok(jpeg);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }

    fn take_newest(&mut self) -> Option<Vec<u8>> {
        let mut newest = None;
        let mut consumed = 0;
        while let Some((start, end)) = find_jpeg_bounds(&self.buffer[consumed..]) {
            newest = Some((consumed + start, consumed + end));
            consumed += end;
        }
        let (start, end) = newest?;
        let jpeg = self.buffer[start..end].to_vec();
        self.buffer.drain(..end);
        Some(jpeg)
    }
}

fn fetch_snapshot(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

/// Locate the first complete SOI..EOI span in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    /// Stream body fed chunk by chunk; blocks until the test sends more.
    struct ChunkFeed {
        chunks: mpsc::Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl Read for ChunkFeed {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pending.is_empty() {
                match self.chunks.recv() {
                    Ok(chunk) => self.pending = chunk,
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    fn mjpeg_body(markers: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        for marker in markers {
            body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            body.extend_from_slice(&[0xFF, 0xD8, *marker, 0xFF, 0xD9]);
            body.extend_from_slice(b"\r\n");
        }
        body
    }

    #[test]
    fn finds_jpeg_between_multipart_headers() {
        let mut buffer = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        let header_len = buffer.len();
        buffer.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        buffer.extend_from_slice(b"\r\n--frame");

        let (start, end) = find_jpeg_bounds(&buffer).expect("jpeg bounds");
        assert_eq!(start, header_len);
        assert_eq!(&buffer[start..end], &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
    }

    #[test]
    fn incomplete_jpeg_has_no_bounds() {
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 1, 2, 3]), None);
        assert_eq!(find_jpeg_bounds(&[1, 2, 3]), None);
    }

    #[test]
    fn newest_buffered_frame_wins() -> Result<()> {
        let body = mjpeg_body(&[0xAA, 0xBB, 0xCC]);
        let mut stream = MjpegStream::new(Box::new(std::io::Cursor::new(body)));

        assert_eq!(stream.read_latest_jpeg()?[2], 0xCC);
        assert!(stream.read_latest_jpeg().is_err());
        Ok(())
    }

    #[test]
    fn partial_frame_is_kept_for_the_next_read() -> Result<()> {
        let mut body = mjpeg_body(&[0xAA]);
        body.extend_from_slice(&[0xFF, 0xD8, 0xBB]);
        let mut stream = MjpegStream::new(Box::new(std::io::Cursor::new(body)));

        assert_eq!(stream.read_latest_jpeg()?[2], 0xAA);
        assert_eq!(stream.buffer, vec![b'\r', b'\n', 0xFF, 0xD8, 0xBB]);
        Ok(())
    }

    #[test]
    fn stalled_stream_does_not_block_frame_requests() -> Result<()> {
        let (feed, chunks) = mpsc::channel();
        let reader = FrameReader::mjpeg(
            Box::new(ChunkFeed {
                chunks,
                pending: Vec::new(),
            }),
            "http://camera.local/stream",
        )?;

        let asked = Instant::now();
        assert!(reader.take_latest()?.is_none());
        assert!(asked.elapsed() < Duration::from_secs(1));

        feed.send(mjpeg_body(&[1, 2, 3]))?;
        let jpeg = reader.wait_for_frame(Duration::from_secs(5))?;
        assert_eq!(jpeg[2], 3);

        drop(feed);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut failed = false;
        while !failed && Instant::now() < deadline {
            failed = reader.take_latest().is_err();
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(failed, "ended stream is reported");
        Ok(())
    }

    #[test]
    fn rejects_malformed_url() {
        let settings = CameraSettings {
            uri: "http://".to_string(),
            ..CameraSettings::default()
        };
        assert!(HttpCamera::new(settings).is_err());
    }
}
