use serde::Deserialize;
use serde_json::Value;

use super::error::{Result, WebhookError};

/// The subset of a GitHub push event payload the translator needs. Only
/// `ref` and `repository.full_name` are required by the contract (spec §6);
/// everything else is carried opaquely into `Job.payload`.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: Repository,
    #[serde(default)]
    pub head_commit: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

/// Parses a push event body. Only the `push` event type produces jobs;
/// every other `X-GitHub-Event` value is acknowledged by the caller without
/// reaching this function.
pub fn parse_push_event(body: &[u8]) -> Result<PushEvent> {
    serde_json::from_slice(body).map_err(|err| WebhookError::MalformedPayload(err.to_string()))
}
