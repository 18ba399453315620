//! Scan session: the kiosk's control loop.
//!
//! The session owns every piece of mutable state (scan state, overlay,
//! confirmation form) and runs on a single thread. Work that may block
//! (JPEG encoding, HTTP calls, reading an uploaded file) runs on worker
//! threads that post an `Event` back to the session's channel.
//!
//! # Staleness
//!
//! Every Idle <-> Scanning transition bumps the session epoch. Scan jobs
//! carry the epoch they were dispatched under, and a reply is applied only
//! if that epoch is still the active Scanning epoch. In-flight HTTP calls
//! are never cancelled; their results are dropped on arrival.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::{Recognizer, SubmitOutcome, SubmitReply, Submitter, Upload};
use crate::capture::CaptureSource;
use crate::config::KioskConfig;
use crate::detect::{Detection, ScanReply};
use crate::form::{ConfirmationForm, ConfirmationRecord, FormField};
use crate::frame::FrameSize;
use crate::gate::ConfirmationGate;
use crate::overlay::OverlayRenderer;
use crate::presenter::Presenter;

pub const CAMERA_UNAVAILABLE: &str = "Could not access camera.";
pub const RENTAL_ACCEPTED: &str = "Rental Successful! Enjoy your session.";

/// Inputs to the control loop: operator actions, timer ticks, and
/// completions posted by worker threads.
#[derive(Debug)]
pub enum Event {
    ToggleScanning,
    Tick,
    ScanCompleted {
        epoch: u64,
        seq: u64,
        result: Result<ScanReply>,
    },
    ManualUpload(PathBuf),
    UploadCompleted(Result<ScanReply>),
    Edit(FormField, String),
    Submit,
    SubmitCompleted(Result<SubmitReply>),
    Cancel,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning { epoch: u64, next_tick: Instant },
}

/// Where blocking jobs run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// One short-lived worker thread per job.
    Threaded,
    /// Run on the caller's thread; the completion is queued for the next
    /// `process_pending`.
    Inline,
}

pub struct Session<P: Presenter> {
    camera: Option<Box<dyn CaptureSource>>,
    recognizer: Arc<dyn Recognizer>,
    submitter: Arc<dyn Submitter>,
    presenter: P,
    overlay: OverlayRenderer,
    gate: ConfirmationGate,
    form: Option<ConfirmationForm>,
    state: ScanState,
    epoch: u64,
    scans_dispatched: u64,
    upload_in_flight: bool,
    interval: Duration,
    jpeg_quality: u8,
    stations: Vec<String>,
    dispatch: Dispatch,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
}

impl<P: Presenter> Session<P> {
    /// Build a session. `camera` is `None` when acquisition failed; the
    /// session then stays Idle but still accepts manual uploads.
    pub fn new(
        config: &KioskConfig,
        camera: Option<Box<dyn CaptureSource>>,
        recognizer: Arc<dyn Recognizer>,
        submitter: Arc<dyn Submitter>,
        presenter: P,
    ) -> Self {
        let size = camera
            .as_ref()
            .and_then(|camera| camera.frame_size())
            .unwrap_or_else(|| FrameSize::new(config.camera.width, config.camera.height));
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            camera,
            recognizer,
            submitter,
            presenter,
            overlay: OverlayRenderer::new(size),
            gate: ConfirmationGate::new(config.scan.confidence_threshold),
            form: None,
            state: ScanState::Idle,
            epoch: 0,
            scans_dispatched: 0,
            upload_in_flight: false,
            interval: config.scan.interval,
            jpeg_quality: config.scan.jpeg_quality,
            stations: config.stations.clone(),
            dispatch: Dispatch::Threaded,
            events_tx,
            events_rx,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Handle for front-ends to feed operator actions into the loop.
    pub fn sender(&self) -> Sender<Event> {
        self.events_tx.clone()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning { .. })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn form(&self) -> Option<&ConfirmationForm> {
        self.form.as_ref()
    }

    pub fn overlay(&self) -> &OverlayRenderer {
        &self.overlay
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// When the next periodic tick is due; `None` while Idle.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            ScanState::Scanning { next_tick, .. } => Some(next_tick),
            ScanState::Idle => None,
        }
    }

    /// Run the event loop until `Event::Shutdown`.
    pub fn run(mut self) {
        loop {
            let event = match self.next_deadline() {
                Some(deadline) if Instant::now() >= deadline => Event::Tick,
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match self.events_rx.recv_timeout(wait) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => Event::Tick,
                        Err(RecvTimeoutError::Disconnected) => Event::Shutdown,
                    }
                }
                None => self.events_rx.recv().unwrap_or(Event::Shutdown),
            };
            if !self.handle(event) {
                break;
            }
        }
    }

    /// Handle every queued event without waiting. Returns how many ran.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            handled += 1;
            if !self.handle(event) {
                break;
            }
        }
        handled
    }

    /// Apply one event. Returns `false` once the session has shut down.
    pub fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::ToggleScanning => {
                if self.is_scanning() {
                    self.stop_scanning();
                } else {
                    self.start_scanning();
                }
            }
            Event::Tick => self.on_tick(),
            Event::ScanCompleted { epoch, seq, result } => {
                self.on_scan_completed(epoch, seq, result)
            }
            Event::ManualUpload(path) => self.on_manual_upload(path),
            Event::UploadCompleted(result) => self.on_upload_completed(result),
            Event::Edit(field, value) => self.on_edit(field, &value),
            Event::Submit => self.on_submit(),
            Event::SubmitCompleted(result) => self.on_submit_completed(result),
            Event::Cancel => self.on_cancel(),
            Event::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn start_scanning(&mut self) {
        if self.form.is_some() {
            self.presenter
                .alert("Finish or cancel the open confirmation before scanning again.");
            return;
        }
        if self.upload_in_flight {
            self.presenter
                .alert("Wait for the card image upload to finish before scanning.");
            return;
        }
        if self.camera.is_none() {
            self.presenter.alert(CAMERA_UNAVAILABLE);
            return;
        }
        self.epoch += 1;
        self.state = ScanState::Scanning {
            epoch: self.epoch,
            next_tick: Instant::now() + self.interval,
        };
        log::info!(
            "auto-scan started (epoch {}, every {}ms)",
            self.epoch,
            self.interval.as_millis()
        );
        self.presenter.scanning_changed(true);
    }

    fn stop_scanning(&mut self) {
        if !self.is_scanning() {
            return;
        }
        self.epoch += 1;
        self.state = ScanState::Idle;
        self.overlay.clear();
        log::info!("auto-scan stopped (epoch {})", self.epoch);
        self.presenter.overlay_updated(&self.overlay);
        self.presenter.scanning_changed(false);
    }

    /// Advance the timer; missed ticks are dropped rather than queued.
    fn advance_timer(&mut self) -> Option<u64> {
        let interval = self.interval;
        let ScanState::Scanning { epoch, next_tick } = &mut self.state else {
            return None;
        };
        let now = Instant::now();
        *next_tick += interval;
        if *next_tick <= now {
            *next_tick = now + interval;
        }
        Some(*epoch)
    }

    fn on_tick(&mut self) {
        let Some(epoch) = self.advance_timer() else {
            return;
        };
        let Some(camera) = self.camera.as_mut() else {
            return;
        };
        let Some(size) = camera.frame_size() else {
            log::debug!("camera {} warming up; tick skipped", camera.describe());
            return;
        };
        let frame = match camera.capture() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("capture failed: {:#}", err);
                return;
            }
        };
        self.overlay.resize(size);

        self.scans_dispatched += 1;
        let seq = self.scans_dispatched;
        let quality = self.jpeg_quality;
        let recognizer = Arc::clone(&self.recognizer);
        let spawned = self.spawn(move || {
            let result = frame
                .encode_jpeg(quality)
                .and_then(|jpeg| recognizer.scan(&Upload::frame_jpeg(jpeg)));
            drop(frame);
            Event::ScanCompleted { epoch, seq, result }
        });
        if let Err(err) = spawned {
            log::error!("scan #{} not started: {}", seq, err);
        }
    }

    fn on_scan_completed(&mut self, epoch: u64, seq: u64, result: Result<ScanReply>) {
        let active = match self.state {
            ScanState::Scanning { epoch: current, .. } => current == epoch,
            ScanState::Idle => false,
        };
        if !active {
            log::debug!("scan #{} from epoch {} discarded as stale", seq, epoch);
            return;
        }
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                log::warn!("scan #{} failed: {:#}", seq, err);
                return;
            }
        };
        let Some(detection) = Detection::from_reply(&reply) else {
            log::debug!("scan #{}: no detection (status '{}')", seq, reply.status);
            return;
        };

        self.overlay.render(&detection);
        self.presenter.overlay_updated(&self.overlay);

        if let Some(record) = self.gate.evaluate(&detection) {
            log::info!(
                "scan #{}: confident read ({}% > {}%), asking for confirmation",
                seq,
                detection.confidence,
                self.gate.threshold()
            );
            self.stop_scanning();
            self.open_form(record);
        }
    }

    fn on_manual_upload(&mut self, path: PathBuf) {
        if self.form.is_some() {
            self.presenter
                .alert("Finish or cancel the open confirmation before uploading.");
            return;
        }
        if self.upload_in_flight {
            log::warn!("upload of {} ignored; another upload is running", path.display());
            return;
        }
        if self.is_scanning() {
            log::info!("pausing auto-scan for manual upload");
            self.stop_scanning();
        }

        self.upload_in_flight = true;
        self.presenter.busy("Reading card image");
        let recognizer = Arc::clone(&self.recognizer);
        let spawned = self.spawn(move || {
            let result = read_upload(&path).and_then(|upload| recognizer.scan(&upload));
            Event::UploadCompleted(result)
        });
        if let Err(err) = spawned {
            self.upload_not_started(err);
        }
    }

    fn upload_not_started(&mut self, err: std::io::Error) {
        self.upload_in_flight = false;
        self.presenter.idle(false);
        self.presenter
            .alert(&format!("Upload failed: worker not started: {}", err));
    }

    fn on_upload_completed(&mut self, result: Result<ScanReply>) {
        self.upload_in_flight = false;

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.presenter.idle(false);
                self.presenter.alert(&format!("Upload failed: {:#}", err));
                return;
            }
        };
        match &reply.data {
            Some(data) => {
                self.presenter.idle(true);
                let record = ConfirmationRecord::prefilled(
                    data.nim.as_deref().unwrap_or_default(),
                    data.name.as_deref().unwrap_or_default(),
                );
                self.stop_scanning();
                self.open_form(record);
            }
            None => {
                self.presenter.idle(false);
                let message = match &reply.detail {
                    Some(serde_json::Value::String(detail)) => format!("Upload failed: {}", detail),
                    Some(detail) => format!("Upload failed: {}", detail),
                    None => "No card data found in the uploaded image.".to_string(),
                };
                self.presenter.alert(&message);
            }
        }
    }

    /// Open the confirmation form. Refused while another record is open.
    fn open_form(&mut self, record: ConfirmationRecord) {
        if self.form.is_some() {
            log::warn!(
                "confirmation for NIM '{}' dropped; another is already open",
                record.nim
            );
            return;
        }
        self.presenter.confirmation_opened(&record);
        self.form = Some(ConfirmationForm::open(record));
    }

    fn on_edit(&mut self, field: FormField, value: &str) {
        let Some(form) = self.form.as_mut() else {
            log::warn!("no confirmation open; {} edit ignored", field.label());
            return;
        };
        if form.is_submitting() {
            log::warn!("submission in progress; {} edit ignored", field.label());
            return;
        }
        form.set(field, value);
        self.presenter.confirmation_updated(form.record());
    }

    fn on_submit(&mut self) {
        let Some(form) = self.form.as_mut() else {
            log::warn!("submit ignored; no confirmation open");
            return;
        };
        if form.is_submitting() {
            log::debug!("submit ignored; already submitting");
            return;
        }
        if let Err(err) = form.validate(&self.stations) {
            self.presenter.alert(&err.to_string());
            return;
        }

        form.set_submitting(true);
        let record = form.record().clone();
        self.presenter.busy("Submitting rental");
        let submitter = Arc::clone(&self.submitter);
        let spawned = self.spawn(move || Event::SubmitCompleted(submitter.submit(&record)));
        if let Err(err) = spawned {
            self.submit_not_started(err);
        }
    }

    fn submit_not_started(&mut self, err: std::io::Error) {
        if let Some(form) = self.form.as_mut() {
            form.set_submitting(false);
        }
        self.presenter.idle(false);
        self.presenter
            .alert(&format!("Submission failed: worker not started: {}", err));
    }

    fn on_submit_completed(&mut self, result: Result<SubmitReply>) {
        let outcome = result.map(SubmitOutcome::from);
        let accepted = matches!(outcome, Ok(SubmitOutcome::Accepted { .. }));
        self.presenter.idle(accepted);
        let Some(form) = self.form.as_mut() else {
            match outcome {
                Ok(outcome) => log::info!("submission finished after the form closed: {:?}", outcome),
                Err(err) => log::warn!("submission failed after the form closed: {:#}", err),
            }
            return;
        };
        form.set_submitting(false);

        match outcome {
            Ok(SubmitOutcome::Accepted { message }) => {
                log::info!(
                    "rental recorded{}",
                    message.map(|m| format!(": {}", m)).unwrap_or_default()
                );
                self.presenter.alert(RENTAL_ACCEPTED);
                form.reset();
                self.form = None;
                self.presenter.confirmation_closed();
            }
            Ok(SubmitOutcome::Rejected { detail }) => {
                self.presenter.alert(&format!("Error: {}", detail));
            }
            Err(err) => {
                self.presenter
                    .alert(&format!("Submission failed: {:#}", err));
            }
        }
    }

    fn on_cancel(&mut self) {
        if self.form.take().is_some() {
            log::info!("confirmation cancelled; auto-scan stays off");
            self.presenter.confirmation_closed();
        }
    }

    fn shutdown(&mut self) {
        self.stop_scanning();
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
        log::info!("session closed after {} scans", self.scans_dispatched);
    }

    fn spawn<F>(&self, job: F) -> std::io::Result<()>
    where
        F: FnOnce() -> Event + Send + 'static,
    {
        let events = self.events_tx.clone();
        match self.dispatch {
            Dispatch::Inline => {
                let _ = events.send(job());
                Ok(())
            }
            Dispatch::Threaded => std::thread::Builder::new()
                .name("ktm-worker".to_string())
                .spawn(move || {
                    let _ = events.send(job());
                })
                .map(|_| ()),
        }
    }
}

impl<P: Presenter> Drop for Session<P> {
    fn drop(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
    }
}

fn read_upload(path: &Path) -> Result<Upload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image file {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Upload::file(&filename, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unscripted;

    impl Recognizer for Unscripted {
        fn scan(&self, _upload: &Upload) -> Result<ScanReply> {
            Ok(ScanReply::default())
        }
    }

    impl Submitter for Unscripted {
        fn submit(&self, _record: &ConfirmationRecord) -> Result<SubmitReply> {
            Ok(SubmitReply::default())
        }
    }

    #[derive(Default)]
    struct Notices {
        alerts: Vec<String>,
        showing_busy: bool,
    }

    impl Presenter for Notices {
        fn alert(&mut self, message: &str) {
            self.alerts.push(message.to_string());
        }
        fn scanning_changed(&mut self, _scanning: bool) {}
        fn overlay_updated(&mut self, _overlay: &OverlayRenderer) {}
        fn confirmation_opened(&mut self, _record: &ConfirmationRecord) {}
        fn confirmation_closed(&mut self) {}
        fn busy(&mut self, _activity: &str) {
            self.showing_busy = true;
        }
        fn idle(&mut self, _succeeded: bool) {
            self.showing_busy = false;
        }
    }

    fn session() -> Session<Notices> {
        Session::new(
            &KioskConfig::default(),
            None,
            Arc::new(Unscripted),
            Arc::new(Unscripted),
            Notices::default(),
        )
        .with_dispatch(Dispatch::Inline)
    }

    fn thread_limit() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::WouldBlock, "thread limit reached")
    }

    #[test]
    fn unstarted_upload_frees_the_upload_slot() {
        let mut session = session();
        session.upload_in_flight = true;
        session.presenter.busy("Reading card image");

        session.upload_not_started(thread_limit());
        assert!(!session.upload_in_flight);
        assert!(!session.presenter.showing_busy);
        assert!(session.presenter.alerts[0].contains("thread limit reached"));

        session.handle(Event::ManualUpload("missing-card.jpg".into()));
        session.process_pending();
        assert_eq!(session.presenter.alerts.len(), 2);
        assert!(session.presenter.alerts[1].starts_with("Upload failed: read image file"));
    }

    #[test]
    fn unstarted_submit_allows_another_attempt() {
        let mut session = session();
        let mut form = ConfirmationForm::open(ConfirmationRecord::prefilled("2201", "Alice"));
        form.set(FormField::Lab, "LabA");
        form.set(FormField::ComputerNo, "5");
        form.set_submitting(true);
        session.form = Some(form);

        session.submit_not_started(thread_limit());
        assert!(session.form().map(|f| !f.is_submitting()).unwrap_or(false));
        assert!(session.presenter.alerts[0].starts_with("Submission failed:"));

        session.handle(Event::Submit);
        session.process_pending();
        assert_eq!(
            session.presenter.alerts.last().map(String::as_str),
            Some("Error: unknown error")
        );
        assert!(session.form().is_some());
    }
}
