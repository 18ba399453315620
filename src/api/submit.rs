use anyhow::{Context, Result};
use serde::Deserialize;

use super::read_json_reply;
use crate::config::ApiSettings;
use crate::form::ConfirmationRecord;

/// Rental submission client.
pub trait Submitter: Send + Sync {
    fn submit(&self, record: &ConfirmationRecord) -> Result<SubmitReply>;
}

/// JSON body returned by the submission endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubmitReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { message: Option<String> },
    Rejected { detail: String },
}

impl From<SubmitReply> for SubmitOutcome {
    fn from(reply: SubmitReply) -> Self {
        if reply.status == "success" {
            return SubmitOutcome::Accepted {
                message: reply.message,
            };
        }
        let detail = match reply.detail {
            Some(serde_json::Value::String(detail)) => detail,
            Some(serde_json::Value::Null) | None => "unknown error".to_string(),
            Some(other) => other.to_string(),
        };
        SubmitOutcome::Rejected { detail }
    }
}

pub struct HttpSubmitter {
    agent: ureq::Agent,
    url: String,
}

impl HttpSubmitter {
    pub fn new(settings: &ApiSettings) -> Self {
        Self {
            agent: super::build_agent(settings),
            url: settings.submit_url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Submitter for HttpSubmitter {
    fn submit(&self, record: &ConfirmationRecord) -> Result<SubmitReply> {
        let body = serde_json::to_string(record).context("encode rental record")?;
        let result = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body);
        read_json_reply(result, &self.url)
    }
}
