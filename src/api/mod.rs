//! HTTP clients for the two kiosk endpoints.
//!
//! - `scan`: posts a frame (or a user-selected image) to the recognition service
//! - `submit`: posts the confirmed rental record
//!
//! Both sit behind traits so the session can run against fakes in tests.
//! Neither client retries; every failure goes back to the caller.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::config::ApiSettings;

pub mod multipart;
pub mod scan;
pub mod submit;

pub use multipart::Upload;
pub use scan::{HttpRecognizer, Recognizer};
pub use submit::{HttpSubmitter, SubmitOutcome, SubmitReply, Submitter};

/// Shared agent honoring the configured timeout.
pub fn build_agent(settings: &ApiSettings) -> ureq::Agent {
    let mut builder = ureq::AgentBuilder::new();
    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Decode a JSON reply, including the bodies of 4xx/5xx responses.
///
/// The services answer errors with a JSON `detail`, so an HTTP error status
/// is still a reply. Only transport failures and undecodable bodies are `Err`.
pub(crate) fn read_json_reply<T: DeserializeOwned>(
    result: std::result::Result<ureq::Response, ureq::Error>,
    endpoint: &str,
) -> Result<T> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            log::debug!("{} answered HTTP {}", endpoint, code);
            response
        }
        Err(err) => {
            return Err(anyhow::Error::new(err).context(format!("request to {} failed", endpoint)))
        }
    };
    let body = response
        .into_string()
        .with_context(|| format!("read reply from {}", endpoint))?;
    serde_json::from_str(&body).with_context(|| format!("decode reply from {}", endpoint))
}
