use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Agent, Job};
use crate::dispatch::Dispatcher;
use crate::store::Store;

use super::error::{AgentError, Result};

/// Default liveness thresholds (spec §3): online below `t_stale`, stale
/// below `t_offline`, offline beyond.
pub const DEFAULT_T_STALE_SECS: i64 = 30;
pub const DEFAULT_T_OFFLINE_SECS: i64 = 120;

pub struct HeartbeatOutcome {
    pub agent: Agent,
    pub job: Option<Job>,
}

/// Agent lifecycle: registration and heartbeat bookkeeping. Holds no
/// liveness state of its own — [`Agent::status`] derives it from
/// `last_heartbeat_at` on every read, so the registry never writes more
/// than a heartbeat already persists.
pub struct AgentRegistry {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher>,
    t_stale_secs: i64,
    t_offline_secs: i64,
}

impl AgentRegistry {
    pub fn new(store: Arc<Store>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            t_stale_secs: DEFAULT_T_STALE_SECS,
            t_offline_secs: DEFAULT_T_OFFLINE_SECS,
        }
    }

    pub fn with_thresholds(mut self, t_stale_secs: i64, t_offline_secs: i64) -> Self {
        self.t_stale_secs = t_stale_secs;
        self.t_offline_secs = t_offline_secs;
        self
    }

    /// Always accepts. Older agents sharing the hostname are left alone;
    /// their `last_heartbeat_at` simply ages out.
    pub fn register(&self, hostname: String, capabilities: Value) -> Result<Agent> {
        let now = chrono::Utc::now();
        let agent = Agent {
            id: Uuid::now_v7().to_string(),
            hostname: hostname.clone(),
            capabilities,
            registered_at: now,
            last_heartbeat_at: now,
            token: None,
        };
        self.store.upsert_agent(&agent)?;
        info!(agent_id = %agent.id, hostname = %hostname, "agent registered");
        Ok(agent)
    }

    /// Updates liveness, then offers at most one job via the dispatcher.
    /// `AgentUnknown` tells the worker to re-register (e.g. after a Store
    /// wipe).
    pub fn heartbeat(&self, agent_id: &str, _status_report: Value) -> Result<HeartbeatOutcome> {
        let now = chrono::Utc::now();
        let agent = self
            .store
            .touch_heartbeat(agent_id, now)
            .map_err(|_| AgentError::AgentUnknown(agent_id.to_string()))?;

        let job = self.dispatcher.offer(&agent.hostname, agent_id)?;
        Ok(HeartbeatOutcome { agent, job })
    }

    pub fn complete(
        &self,
        agent_id: &str,
        job_id: &str,
        terminal_status: crate::domain::JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Job> {
        Ok(self.dispatcher.on_complete(agent_id, job_id, terminal_status, result, error)?)
    }

    pub fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        Ok(self.store.get_agent(id)?)
    }

    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.store.list_agents()?)
    }

    pub fn thresholds(&self) -> (i64, i64) {
        (self.t_stale_secs, self.t_offline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, JobStatus};
    use crate::logs::LogBroker;
    use crate::queue::Queue;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (AgentRegistry, Arc<Queue>, Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("store")).unwrap());
        let queue = Arc::new(Queue::new());
        let log_broker = Arc::new(LogBroker::new(store.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue.clone(), log_broker));
        let registry = AgentRegistry::new(store.clone(), dispatcher);
        (registry, queue, store, dir)
    }

    fn job(repo: &str, git_ref: &str, host: &str) -> Job {
        Job {
            id: Uuid::now_v7().to_string(),
            repo: repo.to_string(),
            git_ref: git_ref.to_string(),
            host: host.to_string(),
            payload: json!({}),
            status: JobStatus::Pending,
            assigned_agent_id: None,
            created_at: chrono::Utc::now(),
            assigned_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    #[test]
    fn register_persists_agent_and_heartbeat_with_no_pending_job_returns_none() {
        let (registry, _queue, _store, _dir) = setup();
        let agent = registry.register("web-01".to_string(), json!({})).unwrap();

        let outcome = registry.heartbeat(&agent.id, json!({})).unwrap();
        assert!(outcome.job.is_none());
        assert_eq!(outcome.agent.id, agent.id);
    }

    #[test]
    fn heartbeat_claims_a_pending_job_for_the_agents_host() {
        let (registry, queue, store, _dir) = setup();
        let agent = registry.register("web-01".to_string(), json!({})).unwrap();
        queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap();

        let outcome = registry.heartbeat(&agent.id, json!({})).unwrap();
        let claimed = outcome.job.expect("pending job for this host should be claimed");
        assert_eq!(claimed.assigned_agent_id.as_deref(), Some(agent.id.as_str()));
    }

    #[test]
    fn heartbeat_for_unknown_agent_is_rejected() {
        let (registry, _queue, _store, _dir) = setup();
        let err = registry.heartbeat("no-such-agent", json!({})).unwrap_err();
        assert!(matches!(err, AgentError::AgentUnknown(id) if id == "no-such-agent"));
    }

    #[test]
    fn complete_delegates_to_dispatcher_and_frees_the_job() {
        let (registry, queue, store, _dir) = setup();
        let agent = registry.register("web-01".to_string(), json!({})).unwrap();
        let inserted = queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap().unwrap();
        registry.heartbeat(&agent.id, json!({})).unwrap();

        let completed = registry.complete(&agent.id, &inserted.id, JobStatus::Success, None, None).unwrap();
        assert_eq!(completed.status, JobStatus::Success);
    }
}
