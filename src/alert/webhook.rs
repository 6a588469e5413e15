//! HTTP webhook notifier.
//!
//! Notes are POSTed as JSON `{"type":"note","title":..,"body":..}`. Artifacts
//! are POSTed as `application/octet-stream` with the metadata JSON in the
//! `X-Artifact-Metadata` header.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::error::DeliveryError;

use super::job::ArtifactMetadata;
use super::notify::Notifier;

#[derive(Serialize)]
struct NotePayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    body: &'a str,
}

pub struct WebhookNotifier {
    url: url::Url,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str) -> Result<Self> {
        let url = url::Url::parse(endpoint)
            .map_err(|e| anyhow!("invalid webhook url {}: {}", endpoint, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("webhook url must be http or https"));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(30))
            .build();
        Ok(Self { url, agent })
    }
}

fn map_error(err: ureq::Error) -> DeliveryError {
    match err {
        ureq::Error::Status(status, _) => DeliveryError::Rejected { status },
        ureq::Error::Transport(t) => DeliveryError::Transport(t.to_string()),
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn notify(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(&NotePayload {
            kind: "note",
            title,
            body,
        })
        .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        self.agent
            .post(self.url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&payload)
            .map_err(map_error)?;
        Ok(())
    }

    fn deliver(&self, artifact: &Path, metadata: &ArtifactMetadata) -> Result<(), DeliveryError> {
        let file = File::open(artifact)?;
        let meta = serde_json::to_string(metadata)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        self.agent
            .post(self.url.as_str())
            .set("Content-Type", "application/octet-stream")
            .set("X-Artifact-Name", &metadata.name)
            .set("X-Artifact-Metadata", &meta)
            .send(file)
            .map_err(map_error)?;
        Ok(())
    }
}
