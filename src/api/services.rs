//! Handler functions for the `/v1/*` surface (spec §6). Each is thin:
//! extract, delegate to Store/Queue/Dispatcher/AgentRegistry/LogBroker/
//! WebhookTranslator, map the result into a wire view.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, warn};

use crate::domain::{JobStatus, LogChunk, LogStream};
use crate::logs::LogEvent;

use super::error::ApiError;
use super::models::{
    AckJobRequest, CreateJobRequest, CreateJobResponse, HealthResponse, HeartbeatRequest, HeartbeatResponse,
    HostsResponse, JobView, RegisterAgentRequest, RegisterAgentResponse, WebhookIngestResponse,
};
use super::state::AppState;

pub async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state.agents.register(req.hostname, req.capabilities)?;
    Ok(Json(RegisterAgentResponse { agent_id: agent.id, token: agent.token }))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let deadline = std::time::Duration::from_secs(state.config.current().server.limits.heartbeat_deadline_secs);
    let agents = state.agents.clone();
    let agent_id_for_task = agent_id.clone();

    let outcome = match tokio::time::timeout(
        deadline,
        tokio::task::spawn_blocking(move || agents.heartbeat(&agent_id_for_task, req.status_report)),
    )
    .await
    {
        Ok(join_result) => {
            join_result.map_err(|err| ApiError::Internal(format!("heartbeat task panicked: {err}")))??
        }
        Err(_) => {
            warn!(agent_id, "heartbeat exceeded deadline, responding with no job");
            return Ok(Json(HeartbeatResponse { job: None }));
        }
    };

    if outcome.job.is_some() {
        state.metrics.job_dispatched();
    }
    Ok(Json(HeartbeatResponse { job: outcome.job.map(JobView::from) }))
}

pub async fn ack_job(
    State(state): State<AppState>,
    Path((agent_id, job_id)): Path<(String, String)>,
    Json(req): Json<AckJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match state.agents.complete(&agent_id, &job_id, JobStatus::from(req.status), req.result, req.error) {
        Ok(job) => {
            match job.status {
                JobStatus::Success => state.metrics.job_succeeded(),
                JobStatus::Failed => state.metrics.job_failed(),
                _ => {}
            }
            Ok(Json(JobView::from(job)))
        }
        Err(crate::agents::AgentError::Dispatch(crate::dispatch::DispatchError::AlreadyTerminal)) => {
            let job = state.store.get_job(&job_id)?.ok_or_else(|| ApiError::NotFound(job_id.clone()))?;
            Ok(Json(JobView::from(job)))
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct LogChunkInput {
    pub sequence: u64,
    #[serde(default)]
    pub stream: LogStreamInput,
    pub text: String,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogStreamInput {
    #[default]
    Stdout,
    Stderr,
    Event,
}

impl From<LogStreamInput> for LogStream {
    fn from(value: LogStreamInput) -> Self {
        match value {
            LogStreamInput::Stdout => LogStream::Stdout,
            LogStreamInput::Stderr => LogStream::Stderr,
            LogStreamInput::Event => LogStream::Event,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostLogsRequest {
    pub chunks: Vec<LogChunkInput>,
}

pub async fn post_logs(
    State(state): State<AppState>,
    Path((_agent_id, job_id)): Path<(String, String)>,
    Json(req): Json<PostLogsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = chrono::Utc::now();
    let chunks: Vec<LogChunk> = req
        .chunks
        .into_iter()
        .map(|c| LogChunk {
            job_id: job_id.clone(),
            sequence: c.sequence,
            timestamp: now,
            stream: c.stream.into(),
            bytes: c.text.into_bytes(),
        })
        .collect();

    state.log_broker.publish(&job_id, &chunks)?;
    for _ in &chunks {
        state.metrics.log_chunk_published();
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = crate::domain::Job {
        id: uuid::Uuid::now_v7().to_string(),
        repo: req.repo,
        git_ref: req.git_ref,
        host: req.host,
        payload: req.payload,
        status: JobStatus::Pending,
        assigned_agent_id: None,
        created_at: chrono::Utc::now(),
        assigned_at: None,
        completed_at: None,
        result: None,
        error: None,
    };

    match state.queue.enqueue(&state.store, job)? {
        Some(inserted) => {
            state.metrics.job_created();
            Ok((StatusCode::CREATED, Json(CreateJobResponse { job: inserted.into() })))
        }
        None => Err(ApiError::DuplicateIdempotency),
    }
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let job = state.store.get_job(&job_id)?.ok_or(ApiError::NotFound(job_id))?;
    Ok(Json(JobView::from(job)))
}

pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let job = state.dispatcher.cancel(&job_id)?;
    state.metrics.job_cancelled();
    Ok(Json(JobView::from(job)))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub from_sequence: u64,
}

pub async fn stream_logs(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get_job(&job_id)?.is_none() {
        return Err(ApiError::NotFound(job_id));
    }

    let rx = state.log_broker.subscribe(&job_id, query.from_sequence)?;
    let stream = ReceiverStream::new(rx).map(log_event_to_sse);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn log_event_to_sse(event: LogEvent) -> Result<Event, std::convert::Infallible> {
    match event {
        LogEvent::Chunk(chunk) => {
            let data = serde_json::json!({
                "sequence": chunk.sequence,
                "stream": chunk.stream,
                "text": String::from_utf8_lossy(&chunk.bytes),
            });
            Ok(Event::default().event("chunk").data(data.to_string()))
        }
        LogEvent::Closed => Ok(Event::default().event("closed").data("{}")),
        LogEvent::Dropped => Ok(Event::default().event("dropped").data("{}")),
    }
}

pub async fn list_hosts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let (t_stale, t_offline) = state.agents.thresholds();
    let agents = state
        .agents
        .list_agents()?
        .into_iter()
        .map(|a| super::models::AgentView::from_agent(a, t_stale, t_offline))
        .collect();
    Ok(Json(HostsResponse { agents }))
}

pub async fn webhook_github(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::SignatureInvalid)?;
    let event_type = headers.get("X-GitHub-Event").and_then(|v| v.to_str().ok()).unwrap_or("");

    let config = state.config.current();
    super::utils::validate_body_size(&body, config.server.limits.max_body_bytes.as_u64() as usize)?;

    let secret = config.webhook.secret.as_deref().unwrap_or("").as_bytes();
    let job_ids = state.webhook.ingest(&body, signature, event_type, secret, &config.repo_bindings)?;
    for _ in &job_ids {
        state.metrics.job_created();
    }

    Ok(Json(WebhookIngestResponse { job_ids }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    let status = match state.store.stats() {
        Ok(stats) => {
            components.insert("store".to_string(), format!("ok ({} jobs)", stats.job_count));
            "ok"
        }
        Err(err) => {
            error!(error = %err, "health check store probe failed");
            components.insert("store".to_string(), "error".to_string());
            "degraded"
        }
    };

    Json(HealthResponse { status, components })
}
