use anyhow::Result;

use super::multipart::{self, Upload};
use super::read_json_reply;
use crate::config::ApiSettings;
use crate::detect::ScanReply;

/// Recognition service client.
///
/// Implementations are called from worker threads and must not keep the
/// uploaded bytes beyond the call.
pub trait Recognizer: Send + Sync {
    fn scan(&self, upload: &Upload) -> Result<ScanReply>;
}

pub struct HttpRecognizer {
    agent: ureq::Agent,
    url: String,
}

impl HttpRecognizer {
    pub fn new(settings: &ApiSettings) -> Self {
        Self {
            agent: super::build_agent(settings),
            url: settings.scan_url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Recognizer for HttpRecognizer {
    fn scan(&self, upload: &Upload) -> Result<ScanReply> {
        let body = multipart::encode(upload);
        let result = self
            .agent
            .post(&self.url)
            .set("Content-Type", &body.content_type)
            .send_bytes(&body.bytes);
        let reply: ScanReply = read_json_reply(result, &self.url)?;
        log_extraction(&reply);
        Ok(reply)
    }
}

fn log_extraction(reply: &ScanReply) {
    if let Some(data) = &reply.data {
        if let Some(faculty) = &data.faculty_code {
            log::debug!("scan faculty code: {}", faculty);
        }
        if let Some(lines) = &data.raw_text {
            log::debug!("scan text lines: {}", lines.join(" | "));
        }
    }
    if let Some(raw) = &reply.debug_raw_text {
        log::debug!("scan raw text: {}", raw);
    }
}
