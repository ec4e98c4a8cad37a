//! Durable entity types shared across Store, Queue, AgentRegistry, Dispatcher,
//! WebhookTranslator and LogBroker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Agent-reported liveness bucket, derived from `last_heartbeat_at` on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Stale,
    Offline,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Online => write!(f, "online"),
            AgentStatus::Stale => write!(f, "stale"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A registered worker process. `hostname` is the match key for job
/// assignment; uniqueness is advisory (the latest registration for a
/// hostname owns new assignments, per spec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub hostname: String,
    #[serde(default)]
    pub capabilities: Value,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub last_heartbeat_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub token: Option<String>,
}

impl Agent {
    pub fn status(&self, now: chrono::DateTime<chrono::Utc>, t_stale_secs: i64, t_offline_secs: i64) -> AgentStatus {
        let age = (now - self.last_heartbeat_at).num_seconds();
        if age < t_stale_secs {
            AgentStatus::Online
        } else if age < t_offline_secs {
            AgentStatus::Stale
        } else {
            AgentStatus::Offline
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// The triple identifying what to deploy where. At most one non-terminal
/// job may exist per idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub repo: String,
    pub git_ref: String,
    pub host: String,
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.repo, self.git_ref, self.host)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub repo: String,
    pub git_ref: String,
    pub host: String,
    /// Deployment parameters, opaque to the core.
    #[serde(default)]
    pub payload: Value,
    pub status: JobStatus,
    pub assigned_agent_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub assigned_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Job {
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey {
            repo: self.repo.clone(),
            git_ref: self.git_ref.clone(),
            host: self.host.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogChunk {
    pub job_id: String,
    pub sequence: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub stream: LogStream,
    pub bytes: Vec<u8>,
}

/// A repository -> hosts mapping entry from the (reloadable) config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoBinding {
    /// Glob or exact-match pattern against `repository.full_name`.
    pub repository: String,
    pub hosts: Vec<String>,
    #[serde(default = "default_true")]
    pub deploy_on_push: bool,
    /// Empty list matches every branch.
    #[serde(default)]
    pub branches: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl RepoBinding {
    pub fn matches_repo(&self, repo_full_name: &str) -> bool {
        glob_match(&self.repository, repo_full_name)
    }

    pub fn matches_branch(&self, branch: &str) -> bool {
        self.branches.is_empty() || self.branches.iter().any(|b| glob_match(b, branch))
    }
}

/// Minimal `*`-wildcard glob matcher (no `?`, no character classes) — enough
/// for repository-pattern and branch-pattern matching against a flat string.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == candidate;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !candidate[pos..].starts_with(part) {
                return false;
            }
            pos += part.len();
        } else if i == parts.len() - 1 {
            return candidate[pos..].ends_with(part);
        } else {
            match candidate[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
    }
    true
}
