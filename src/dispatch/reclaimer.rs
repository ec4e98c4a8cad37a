use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::observability::Metrics;
use crate::queue::Queue;
use crate::store::Store;

/// Default **RunningJobOrphanTimeout** (spec §4.1): how long a running job
/// may go without a worker ack before it is presumed abandoned.
pub const DEFAULT_RUNNING_JOB_ORPHAN_TIMEOUT_SECS: i64 = 3600;

pub const DEFAULT_RECLAIM_SWEEP_INTERVAL_SECS: u64 = 30;

/// Background sweep that returns running jobs whose worker is presumed
/// dead back to pending, so a subsequent heartbeat can pick them up.
pub struct OrphanReclaimer {
    store: Arc<Store>,
    queue: Arc<Queue>,
    interval: Duration,
    orphan_timeout: chrono::Duration,
    t_stale_secs: i64,
    t_offline_secs: i64,
    metrics: Option<Arc<Metrics>>,
}

impl OrphanReclaimer {
    /// `t_stale_secs`/`t_offline_secs` are the same liveness thresholds
    /// `AgentRegistry` derives agent status from (spec §5: a job is only
    /// reclaimed once its timeout has elapsed **and** its assigned agent
    /// is offline).
    pub fn new(
        store: Arc<Store>,
        queue: Arc<Queue>,
        interval: Duration,
        orphan_timeout: chrono::Duration,
        t_stale_secs: i64,
        t_offline_secs: i64,
    ) -> Self {
        Self { store, queue, interval, orphan_timeout, t_stale_secs, t_offline_secs, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                match self.store.reclaim_orphans(self.orphan_timeout, self.t_stale_secs, self.t_offline_secs) {
                    Ok(reclaimed) => {
                        for job in &reclaimed {
                            self.queue.requeue(&job.host, &job.id);
                            if let Some(metrics) = &self.metrics {
                                metrics.job_reclaimed();
                            }
                        }
                        if !reclaimed.is_empty() {
                            info!(count = reclaimed.len(), "reclaimed orphaned running jobs");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "orphan reclaim sweep failed, retrying next tick");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::domain::{Agent, Job, JobStatus};
    use crate::logs::LogBroker;
    use serde_json::json;
    use tempfile::TempDir;

    fn job(repo: &str, git_ref: &str, host: &str) -> Job {
        Job {
            id: uuid::Uuid::now_v7().to_string(),
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

    /// Spec §8 Scenario C: an orphaned running job is reclaimed to pending
    /// and a subsequent heartbeat from a different agent picks it up.
    #[test]
    fn orphaned_job_is_reclaimed_and_then_claimed_by_a_new_agent() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("store")).unwrap());
        let queue = Arc::new(Queue::new());

        let inserted = queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap().unwrap();
        let claimed_at = chrono::Utc::now() - chrono::Duration::hours(2);
        store.claim_job(&inserted.id, "agent-dead", claimed_at).unwrap();

        let reclaimed = store.reclaim_orphans(chrono::Duration::minutes(15), 30, 120).unwrap();
        assert_eq!(reclaimed.len(), 1);
        for job in &reclaimed {
            queue.requeue(&job.host, &job.id);
        }

        let log_broker = Arc::new(LogBroker::new(store.clone()));
        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), log_broker);
        let picked_up = dispatcher.offer("web-01", "agent-new").unwrap().unwrap();
        assert_eq!(picked_up.id, inserted.id);
        assert_eq!(picked_up.assigned_agent_id.as_deref(), Some("agent-new"));
    }

    #[test]
    fn reclaim_sweep_leaves_job_running_while_its_agent_is_online() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("store")).unwrap());
        let queue = Arc::new(Queue::new());

        let inserted = queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap().unwrap();
        let claimed_at = chrono::Utc::now() - chrono::Duration::hours(2);
        store.claim_job(&inserted.id, "agent-1", claimed_at).unwrap();
        store
            .upsert_agent(&Agent {
                id: "agent-1".to_string(),
                hostname: "web-01".to_string(),
                capabilities: json!({}),
                registered_at: claimed_at,
                last_heartbeat_at: chrono::Utc::now(),
                token: None,
            })
            .unwrap();

        let reclaimed = store.reclaim_orphans(chrono::Duration::minutes(15), 30, 120).unwrap();
        assert!(reclaimed.is_empty());
    }
}
