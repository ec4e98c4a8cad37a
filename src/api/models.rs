//! Wire types for the `/v1/*` HTTP surface (spec §6). Internal [`Job`] and
//! [`Agent`] are never serialized directly — these views control exactly
//! what crosses the HTTP boundary and under what field names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::{Agent, AgentStatus, Job, JobStatus};

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub hostname: String,
    #[serde(default)]
    pub capabilities: Value,
}

#[derive(Debug, Serialize)]
pub struct RegisterAgentResponse {
    pub agent_id: String,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub status_report: Value,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub job: Option<JobView>,
}

#[derive(Debug, Deserialize)]
pub struct AckJobRequest {
    pub status: AckStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Success,
    Failed,
}

impl From<AckStatus> for JobStatus {
    fn from(value: AckStatus) -> Self {
        match value {
            AckStatus::Success => JobStatus::Success,
            AckStatus::Failed => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub host: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub host: String,
    pub payload: Value,
    pub status: JobStatus,
    pub assigned_agent_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub assigned_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            repo: job.repo,
            git_ref: job.git_ref,
            host: job.host,
            payload: job.payload,
            status: job.status,
            assigned_agent_id: job.assigned_agent_id,
            created_at: job.created_at,
            assigned_at: job.assigned_at,
            completed_at: job.completed_at,
            result: job.result,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgentView {
    pub id: String,
    pub hostname: String,
    pub status: AgentStatus,
    pub capabilities: Value,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub last_heartbeat_at: chrono::DateTime<chrono::Utc>,
}

impl AgentView {
    pub fn from_agent(agent: Agent, t_stale_secs: i64, t_offline_secs: i64) -> Self {
        let status = agent.status(chrono::Utc::now(), t_stale_secs, t_offline_secs);
        Self {
            id: agent.id,
            hostname: agent.hostname,
            status,
            capabilities: agent.capabilities,
            registered_at: agent.registered_at,
            last_heartbeat_at: agent.last_heartbeat_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HostsResponse {
    pub agents: Vec<AgentView>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job: JobView,
}

#[derive(Debug, Serialize)]
pub struct WebhookIngestResponse {
    pub job_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: HashMap<String, String>,
}
