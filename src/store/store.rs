use std::path::Path;
use std::sync::Mutex;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info, warn};

use crate::domain::{Agent, AgentStatus, IdempotencyKey, Job, JobStatus, LogChunk};

use super::error::{Result, StoreError};
use super::keys::{encode_agent_key, encode_idem_key, encode_job_key, encode_log_key, encode_log_prefix, encode_meta_key};

/// Durable persistence for agents, jobs, logs and the idempotency index.
///
/// Job-mutating operations (`insert_job`, `claim_job`, `complete_job`,
/// `cancel_job`) take an internal lock so that the read-check-write sequence
/// each performs against Fjall is linearized; Fjall itself guarantees
/// per-partition-operation atomicity but not cross-operation compare-and-swap.
#[derive(Clone)]
pub struct Store {
    keyspace: Keyspace,
    agents: PartitionHandle,
    jobs: PartitionHandle,
    idempotency: PartitionHandle,
    logs: PartitionHandle,
    metadata: PartitionHandle,
    job_lock: std::sync::Arc<Mutex<()>>,
}

/// Result of the startup recovery scan (spec §4.1).
#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub requeued_pending: Vec<Job>,
    pub reclaimed_orphans: Vec<Job>,
    pub still_running: Vec<Job>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let agents = keyspace.open_partition("agents", PartitionCreateOptions::default())?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let idempotency = keyspace.open_partition("idempotency", PartitionCreateOptions::default())?;
        let logs = keyspace.open_partition("logs", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("store opened");
        Ok(Self {
            keyspace,
            agents,
            jobs,
            idempotency,
            logs,
            metadata,
            job_lock: std::sync::Arc::new(Mutex::new(())),
        })
    }

    // ---- Agents -----------------------------------------------------

    pub fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        let key = encode_agent_key(&agent.id);
        let value = serde_json::to_vec(agent)?;
        self.agents.insert(key, value)?;
        Ok(())
    }

    pub fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        match self.agents.get(encode_agent_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Updates `last_heartbeat_at` for an existing agent; `AgentUnknown` if
    /// the agent was never registered (or Store was wiped).
    pub fn touch_heartbeat(&self, id: &str, ts: chrono::DateTime<chrono::Utc>) -> Result<Agent> {
        let mut agent = self
            .get_agent(id)?
            .ok_or_else(|| StoreError::AgentUnknown(id.to_string()))?;
        agent.last_heartbeat_at = ts;
        self.upsert_agent(&agent)?;
        Ok(agent)
    }

    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let mut out = Vec::new();
        for item in self.agents.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    // ---- Jobs ---------------------------------------------------------

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        match self.jobs.get(encode_job_key(job_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_job(&self, job: &Job) -> Result<()> {
        let key = encode_job_key(&job.id);
        let value = serde_json::to_vec(job)?;
        self.jobs.insert(key, value)?;
        Ok(())
    }

    fn idem_owner(&self, key: &IdempotencyKey) -> Result<Option<String>> {
        match self.idempotency.get(encode_idem_key(key))? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
            None => Ok(None),
        }
    }

    fn set_idem_owner(&self, key: &IdempotencyKey, job_id: &str) -> Result<()> {
        self.idempotency.insert(encode_idem_key(key), job_id.as_bytes())?;
        Ok(())
    }

    fn clear_idem_owner(&self, key: &IdempotencyKey) -> Result<()> {
        self.idempotency.remove(encode_idem_key(key))?;
        Ok(())
    }

    /// Inserts a new job. Fails with `DuplicateIdempotency` if a non-terminal
    /// job already owns this (repo, ref, host) triple.
    pub fn insert_job(&self, job: Job) -> Result<Job> {
        let _guard = self.job_lock.lock().unwrap();
        let key = job.idempotency_key();

        if let Some(owner_id) = self.idem_owner(&key)? {
            if let Some(owner) = self.get_job(&owner_id)? {
                if !owner.status.is_terminal() {
                    return Err(StoreError::DuplicateIdempotency);
                }
            }
        }

        self.set_idem_owner(&key, &job.id)?;
        self.put_job(&job)?;
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        debug!(job_id = %job.id, repo = %job.repo, host = %job.host, "job inserted");
        Ok(job)
    }

    /// Conditionally transitions `pending` -> `running`, assigning the agent.
    pub fn claim_job(&self, job_id: &str, agent_id: &str, ts: chrono::DateTime<chrono::Utc>) -> Result<Job> {
        let _guard = self.job_lock.lock().unwrap();
        let mut job = self
            .get_job(job_id)?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Pending {
            return Err(StoreError::NotClaimable);
        }

        job.status = JobStatus::Running;
        job.assigned_agent_id = Some(agent_id.to_string());
        job.assigned_at = Some(ts);
        self.put_job(&job)?;
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        debug!(job_id, agent_id, "job claimed");
        Ok(job)
    }

    /// Conditional on `status = running` and `assigned_agent_id = agent_id`.
    /// Idempotent for an identical re-ack of an already-terminal job; any
    /// other terminal mismatch returns `AlreadyTerminal`.
    pub fn complete_job(
        &self,
        job_id: &str,
        agent_id: &str,
        terminal_status: JobStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> Result<Job> {
        debug_assert!(terminal_status.is_terminal());
        let _guard = self.job_lock.lock().unwrap();
        let mut job = self
            .get_job(job_id)?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal);
        }

        if job.assigned_agent_id.as_deref() != Some(agent_id) {
            return Err(StoreError::NotAssignedToYou);
        }

        job.status = terminal_status;
        job.result = result;
        job.error = error;
        job.completed_at = Some(ts);
        self.put_job(&job)?;
        self.clear_idem_owner(&job.idempotency_key())?;
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        debug!(job_id, agent_id, status = %terminal_status, "job completed");
        Ok(job)
    }

    /// Admin cancel. Allowed from pending or running; `AlreadyTerminal` if
    /// the job is already in a terminal state (idempotent no-op for callers
    /// that retry a cancel).
    pub fn cancel_job(&self, job_id: &str) -> Result<Job> {
        let _guard = self.job_lock.lock().unwrap();
        let mut job = self
            .get_job(job_id)?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal);
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(chrono::Utc::now());
        self.put_job(&job)?;
        self.clear_idem_owner(&job.idempotency_key())?;
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        debug!(job_id, "job cancelled");
        Ok(job)
    }

    pub fn list_non_terminal_jobs(&self) -> Result<Vec<Job>> {
        let mut out = Vec::new();
        for item in self.jobs.iter() {
            let (_, value) = item?;
            let job: Job = serde_json::from_slice(&value)?;
            if !job.status.is_terminal() {
                out.push(job);
            }
        }
        out.sort_by_key(|j| j.created_at);
        Ok(out)
    }

    /// Scans running jobs only and resets any whose `assigned_at` exceeds
    /// `orphan_timeout` **and** whose assigned agent is offline back to
    /// pending with a cleared assignment (spec §5: the timeout alone never
    /// reclaims a job from an agent that is still heartbeating — only from
    /// one presumed dead). A job whose agent record is missing entirely
    /// (e.g. the agent was never re-registered after a restart) is treated
    /// as offline. Used by the runtime orphan-reclaim sweep (as opposed to
    /// [`Store::recover`], which also re-surfaces already-queued pending
    /// jobs and is meant for startup only).
    pub fn reclaim_orphans(&self, orphan_timeout: chrono::Duration, t_stale_secs: i64, t_offline_secs: i64) -> Result<Vec<Job>> {
        let _guard = self.job_lock.lock().unwrap();
        let now = chrono::Utc::now();
        let mut reclaimed = Vec::new();

        for item in self.jobs.iter() {
            let (_, value) = item?;
            let mut job: Job = serde_json::from_slice(&value)?;
            if job.status != JobStatus::Running {
                continue;
            }
            let assigned_at = job.assigned_at.unwrap_or(job.created_at);
            if now - assigned_at <= orphan_timeout {
                continue;
            }
            if !self.assigned_agent_is_offline(&job, now, t_stale_secs, t_offline_secs)? {
                continue;
            }
            warn!(job_id = %job.id, "reclaiming orphaned running job");
            job.status = JobStatus::Pending;
            job.assigned_agent_id = None;
            job.assigned_at = None;
            self.put_job(&job)?;
            reclaimed.push(job);
        }

        if !reclaimed.is_empty() {
            self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        }
        Ok(reclaimed)
    }

    fn assigned_agent_is_offline(
        &self,
        job: &Job,
        now: chrono::DateTime<chrono::Utc>,
        t_stale_secs: i64,
        t_offline_secs: i64,
    ) -> Result<bool> {
        let Some(agent_id) = &job.assigned_agent_id else { return Ok(true) };
        match self.get_agent(agent_id)? {
            Some(agent) => Ok(agent.status(now, t_stale_secs, t_offline_secs) == AgentStatus::Offline),
            None => Ok(true),
        }
    }

    /// Startup recovery: requeue pending jobs (preserving `created_at`
    /// order) and reclaim running jobs whose `assigned_at` exceeds
    /// `orphan_timeout` **and** whose assigned agent is offline (spec §5;
    /// see [`Store::reclaim_orphans`] for the same rule applied at
    /// runtime). At startup every agent is, practically speaking, offline
    /// (no process has heartbeated yet this run) unless `t_offline_secs`
    /// is unusually large relative to how long the process was down, so
    /// this still behaves like a plain timeout sweep in the common case.
    pub fn recover(&self, orphan_timeout: chrono::Duration, t_stale_secs: i64, t_offline_secs: i64) -> Result<RecoveryReport> {
        let _guard = self.job_lock.lock().unwrap();
        let now = chrono::Utc::now();
        let mut report = RecoveryReport::default();

        let mut non_terminal = Vec::new();
        for item in self.jobs.iter() {
            let (_, value) = item?;
            let job: Job = serde_json::from_slice(&value)?;
            if !job.status.is_terminal() {
                non_terminal.push(job);
            }
        }
        non_terminal.sort_by_key(|j| j.created_at);

        for mut job in non_terminal {
            match job.status {
                JobStatus::Pending => {
                    report.requeued_pending.push(job);
                }
                JobStatus::Running => {
                    let assigned_at = job.assigned_at.unwrap_or(job.created_at);
                    let timed_out = now - assigned_at > orphan_timeout;
                    let agent_offline = self.assigned_agent_is_offline(&job, now, t_stale_secs, t_offline_secs)?;
                    if timed_out && agent_offline {
                        warn!(job_id = %job.id, "reclaiming orphaned running job");
                        job.status = JobStatus::Pending;
                        job.assigned_agent_id = None;
                        job.assigned_at = None;
                        self.put_job(&job)?;
                        report.reclaimed_orphans.push(job);
                    } else {
                        report.still_running.push(job);
                    }
                }
                _ => unreachable!("non_terminal filter excludes terminal states"),
            }
        }

        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        info!(
            requeued = report.requeued_pending.len(),
            reclaimed = report.reclaimed_orphans.len(),
            still_running = report.still_running.len(),
            "recovery complete"
        );
        Ok(report)
    }

    // ---- Logs -----------------------------------------------------------

    pub fn append_log(&self, chunk: &LogChunk) -> Result<()> {
        let key = encode_log_key(&chunk.job_id, chunk.sequence);
        let value = serde_json::to_vec(chunk)?;
        self.logs.insert(key, value)?;
        Ok(())
    }

    pub fn read_logs(&self, job_id: &str, from_sequence: u64) -> Result<Vec<LogChunk>> {
        let prefix = encode_log_prefix(job_id);
        let mut out = Vec::new();
        for item in self.logs.prefix(&prefix) {
            let (_, value) = item?;
            let chunk: LogChunk = serde_json::from_slice(&value)?;
            if chunk.sequence >= from_sequence {
                out.push(chunk);
            }
        }
        out.sort_by_key(|c| c.sequence);
        Ok(out)
    }

    // ---- Misc -------------------------------------------------------------

    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            agent_count: self.agents.iter().count(),
            job_count: self.jobs.iter().count(),
            log_count: self.logs.iter().count(),
        })
    }

    #[allow(dead_code)]
    pub(crate) fn metadata_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.metadata.get(encode_meta_key(key))?.map(|v| v.to_vec()))
    }

    #[allow(dead_code)]
    pub(crate) fn metadata_put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.metadata.insert(encode_meta_key(key), value)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub agent_count: usize,
    pub job_count: usize,
    pub log_count: usize,
}
