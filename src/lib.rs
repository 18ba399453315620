//! KTM scan kiosk
//!
//! This crate implements a kiosk client that reads student ID cards (KTM)
//! from a camera and records lab computer rentals.
//!
//! # Architecture
//!
//! All recognition happens in an external service. The kiosk:
//!
//! 1. **Captures** frames from a camera (`capture`, `frame`).
//! 2. **Scans** one frame every interval while auto-scan is on, posting it
//!    to the recognition endpoint (`session`, `api::scan`).
//! 3. **Overlays** the returned bounding box and fields (`overlay`).
//! 4. **Gates** on confidence: a confident read stops scanning and opens a
//!    confirmation form (`gate`, `form`).
//! 5. **Submits** the confirmed record to the rental endpoint
//!    (`api::submit`).
//!
//! # Module Structure
//!
//! - `capture`: camera sources (synthetic, HTTP MJPEG/snapshot, V4L2)
//! - `session`: the single-threaded control loop and its events
//! - `presenter` / `ui` / `console`: operator-facing surface
//! - `config`: file + environment configuration

pub mod api;
pub mod capture;
pub mod config;
pub mod console;
pub mod detect;
pub mod form;
pub mod frame;
pub mod gate;
pub mod overlay;
pub mod presenter;
pub mod session;
pub mod ui;

pub use api::{HttpRecognizer, HttpSubmitter, Recognizer, SubmitOutcome, Submitter, Upload};
pub use capture::{open_camera, CaptureSource, HttpCamera, SyntheticCamera};
#[cfg(feature = "ingest-v4l2")]
pub use capture::V4l2Camera;
pub use config::{ApiSettings, CameraSettings, ConfigOverrides, KioskConfig, ScanSettings};
pub use detect::{BoundingBox, Detection, IdentityFields, ScanReply};
pub use form::{ConfirmationForm, ConfirmationRecord, FormField};
pub use frame::{Frame, FrameSize};
pub use gate::ConfirmationGate;
pub use overlay::{OverlayRenderer, OverlayScene, Shape};
pub use presenter::Presenter;
pub use session::{Dispatch, Event, ScanState, Session};
