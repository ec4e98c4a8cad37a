use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::RepoBinding;
use crate::humanize::ByteSize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Repository → hosts fan-out table. Reloaded on file change by
    /// [`crate::config::ConfigHandle`]; no persistence obligation.
    #[serde(default)]
    pub repo_bindings: Vec<RepoBinding>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub limits: ApiLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            store_path: default_store_path(),
            limits: ApiLimits::default(),
        }
    }
}

/// Request size and concurrency limits enforced at the HTTP boundary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
    #[serde(default = "default_heartbeat_deadline_secs")]
    pub heartbeat_deadline_secs: u64,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            heartbeat_deadline_secs: default_heartbeat_deadline_secs(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/store")
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(10 * 1024 * 1024) // 10 MB, generous for chunked log POSTs
}

fn default_heartbeat_deadline_secs() -> u64 {
    15
}

/// Shared-secret webhook verification (spec §4.5, §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// HMAC-SHA256 shared secret. Loaded from environment, never from the
    /// TOML file, so it never lands on disk next to the rest of config.
    #[serde(skip)]
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { secret: None }
    }
}

/// Heartbeat liveness thresholds and orphan-reclaim tuning (spec §4.1, §4.3).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    #[serde(default = "default_t_stale_secs")]
    pub t_stale_secs: i64,
    #[serde(default = "default_t_offline_secs")]
    pub t_offline_secs: i64,
    #[serde(default = "default_liveness_sweep_interval_secs")]
    pub liveness_sweep_interval_secs: u64,
    #[serde(default = "default_running_job_orphan_timeout_secs")]
    pub running_job_orphan_timeout_secs: i64,
    #[serde(default = "default_reclaim_sweep_interval_secs")]
    pub reclaim_sweep_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            t_stale_secs: default_t_stale_secs(),
            t_offline_secs: default_t_offline_secs(),
            liveness_sweep_interval_secs: default_liveness_sweep_interval_secs(),
            running_job_orphan_timeout_secs: default_running_job_orphan_timeout_secs(),
            reclaim_sweep_interval_secs: default_reclaim_sweep_interval_secs(),
        }
    }
}

fn default_t_stale_secs() -> i64 {
    crate::agents::DEFAULT_T_STALE_SECS
}

fn default_t_offline_secs() -> i64 {
    crate::agents::DEFAULT_T_OFFLINE_SECS
}

fn default_liveness_sweep_interval_secs() -> u64 {
    crate::agents::DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_running_job_orphan_timeout_secs() -> i64 {
    crate::dispatch::DEFAULT_RUNNING_JOB_ORPHAN_TIMEOUT_SECS
}

fn default_reclaim_sweep_interval_secs() -> u64 {
    crate::dispatch::DEFAULT_RECLAIM_SWEEP_INTERVAL_SECS
}

/// Log ring buffer and subscriber backpressure tuning (spec §4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogsConfig {
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    #[serde(default = "default_subscriber_backpressure_limit")]
    pub subscriber_backpressure_limit: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
            subscriber_backpressure_limit: default_subscriber_backpressure_limit(),
        }
    }
}

fn default_ring_capacity() -> usize {
    crate::logs::DEFAULT_RING_CAPACITY
}

fn default_subscriber_backpressure_limit() -> usize {
    crate::logs::DEFAULT_SUBSCRIBER_BACKPRESSURE_LIMIT
}

/// How long terminal jobs and their logs remain in Store before pruning
/// (open question resolved in DESIGN.md: logs persist for the job's full
/// lifetime, then age out with it).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_job_ttl_days")]
    pub job_ttl_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { job_ttl_days: default_job_ttl_days() }
    }
}

fn default_job_ttl_days() -> u32 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { metrics_addr: default_metrics_addr() }
    }
}

fn default_metrics_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}
