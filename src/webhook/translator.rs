use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Job, JobStatus, RepoBinding};
use crate::queue::Queue;
use crate::store::Store;

use super::error::Result;
use super::github::parse_push_event;
use super::signature::verify_signature;

/// Expands a verified push event into jobs via repo→hosts config (spec
/// §4.5). Holds no config of its own — callers pass the current binding
/// snapshot in, keeping `ingest` a pure function of (body, signature,
/// config snapshot) as the testable properties require.
pub struct WebhookTranslator {
    store: Arc<Store>,
    queue: Arc<Queue>,
}

impl WebhookTranslator {
    pub fn new(store: Arc<Store>, queue: Arc<Queue>) -> Self {
        Self { store, queue }
    }

    /// Returns the ids of jobs actually created. Duplicate (idempotency
    /// collision) fan-out targets are silently skipped, not errors.
    pub fn ingest(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        event_type: &str,
        secret: &[u8],
        bindings: &[RepoBinding],
    ) -> Result<Vec<String>> {
        verify_signature(secret, raw_body, signature_header)?;

        if event_type != "push" {
            return Ok(Vec::new());
        }

        let event = parse_push_event(raw_body)?;
        let branch = event.git_ref.strip_prefix("refs/heads/").unwrap_or(&event.git_ref);

        let mut hosts = BTreeSet::new();
        for binding in bindings {
            if binding.deploy_on_push
                && binding.matches_repo(&event.repository.full_name)
                && binding.matches_branch(branch)
            {
                hosts.extend(binding.hosts.iter().cloned());
            }
        }

        let payload = event.head_commit.clone().unwrap_or_else(|| json!({}));
        let mut created = Vec::new();

        for host in hosts {
            let job = Job {
                id: Uuid::now_v7().to_string(),
                repo: event.repository.full_name.clone(),
                git_ref: event.git_ref.clone(),
                host,
                payload: payload.clone(),
                status: JobStatus::Pending,
                assigned_agent_id: None,
                created_at: chrono::Utc::now(),
                assigned_at: None,
                completed_at: None,
                result: None,
                error: None,
            };
            if let Some(inserted) = self.queue.enqueue(&self.store, job)? {
                info!(job_id = %inserted.id, repo = %inserted.repo, host = %inserted.host, "job created from push event");
                created.push(inserted.id);
            }
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tempfile::TempDir;

    fn sign(secret: &[u8], body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn translator() -> (WebhookTranslator, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("store")).unwrap());
        let queue = Arc::new(Queue::new());
        (WebhookTranslator::new(store, queue), dir)
    }

    fn binding() -> RepoBinding {
        RepoBinding {
            repository: "myorg/web".into(),
            hosts: vec!["web-01".into(), "web-02".into()],
            deploy_on_push: true,
            branches: vec!["main".into()],
        }
    }

    #[test]
    fn push_to_matching_branch_fans_out_one_job_per_host() {
        let (translator, _dir) = translator();
        let secret = b"s3cr3t";
        let body = br#"{"ref":"refs/heads/main","repository":{"full_name":"myorg/web"}}"#;
        let header = sign(secret, body);

        let created = translator.ingest(body, &header, "push", secret, &[binding()]).unwrap();
        assert_eq!(created.len(), 2);
    }

    #[test]
    fn repeat_push_is_silently_deduplicated() {
        let (translator, _dir) = translator();
        let secret = b"s3cr3t";
        let body = br#"{"ref":"refs/heads/main","repository":{"full_name":"myorg/web"}}"#;
        let header = sign(secret, body);

        let first = translator.ingest(body, &header, "push", secret, &[binding()]).unwrap();
        assert_eq!(first.len(), 2);

        let second = translator.ingest(body, &header, "push", secret, &[binding()]).unwrap();
        assert_eq!(second.len(), 0);
    }

    #[test]
    fn non_matching_branch_produces_no_jobs() {
        let (translator, _dir) = translator();
        let secret = b"s3cr3t";
        let body = br#"{"ref":"refs/heads/feature-x","repository":{"full_name":"myorg/web"}}"#;
        let header = sign(secret, body);

        let created = translator.ingest(body, &header, "push", secret, &[binding()]).unwrap();
        assert!(created.is_empty());
    }

    #[test]
    fn non_push_events_are_dropped() {
        let (translator, _dir) = translator();
        let secret = b"s3cr3t";
        let body = br#"{"zen":"keep it logically awesome"}"#;
        let header = sign(secret, body);

        let created = translator.ingest(body, &header, "ping", secret, &[binding()]).unwrap();
        assert!(created.is_empty());
    }

    #[test]
    fn tampered_body_is_rejected_before_any_job_creation() {
        let (translator, _dir) = translator();
        let secret = b"s3cr3t";
        let body = br#"{"ref":"refs/heads/main","repository":{"full_name":"myorg/web"}}"#;
        let header = sign(secret, body);
        let tampered = br#"{"ref":"refs/heads/main","repository":{"full_name":"myorg/evil"}}"#;

        let err = translator.ingest(tampered, &header, "push", secret, &[binding()]);
        assert!(err.is_err());
    }
}
