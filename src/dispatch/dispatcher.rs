use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::domain::{Job, JobStatus};
use crate::logs::LogBroker;
use crate::queue::Queue;
use crate::store::{Store, StoreError};

use super::error::{DispatchError, Result};

/// Wires Queue, Store and LogBroker into the job state machine (spec §4.4):
/// matches heartbeats to pending jobs, drives `pending -> running ->
/// {success,failed,cancelled}`, and releases dependent state on every
/// terminal transition.
pub struct Dispatcher {
    store: Arc<Store>,
    queue: Arc<Queue>,
    log_broker: Arc<LogBroker>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, queue: Arc<Queue>, log_broker: Arc<LogBroker>) -> Self {
        Self { store, queue, log_broker }
    }

    /// Called once per heartbeat. Delivers at most one job.
    pub fn offer(&self, hostname: &str, agent_id: &str) -> Result<Option<Job>> {
        Ok(self.queue.try_claim(&self.store, hostname, agent_id)?)
    }

    /// Worker ack of a terminal outcome. `NotAssignedToYou` if the job is
    /// running under a different agent; `AlreadyTerminal` is a harmless
    /// no-op for a job that was admin-cancelled out from under the worker.
    pub fn on_complete(
        &self,
        agent_id: &str,
        job_id: &str,
        terminal_status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Job> {
        match self
            .store
            .complete_job(job_id, agent_id, terminal_status, result, error, chrono::Utc::now())
        {
            Ok(job) => {
                self.queue.on_terminal(&job.idempotency_key());
                self.log_broker.close(&job.id);
                info!(job_id, agent_id, status = %job.status, "job completed by worker");
                Ok(job)
            }
            Err(StoreError::JobNotFound(id)) => Err(DispatchError::JobNotFound(id)),
            Err(StoreError::NotAssignedToYou) => Err(DispatchError::NotAssignedToYou),
            Err(StoreError::AlreadyTerminal) => Err(DispatchError::AlreadyTerminal),
            Err(other) => Err(other.into()),
        }
    }

    /// Admin path: terminalizes regardless of current assignment. The
    /// worker discovers this on its own ack, which returns `AlreadyTerminal`
    /// but is otherwise harmless.
    pub fn cancel(&self, job_id: &str) -> Result<Job> {
        match self.store.cancel_job(job_id) {
            Ok(job) => {
                self.queue.remove_pending(&job.host, &job.id);
                self.queue.on_terminal(&job.idempotency_key());
                self.log_broker.close(&job.id);
                info!(job_id, "job cancelled by admin");
                Ok(job)
            }
            Err(StoreError::JobNotFound(id)) => Err(DispatchError::JobNotFound(id)),
            Err(StoreError::AlreadyTerminal) => Err(DispatchError::AlreadyTerminal),
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (Arc<Dispatcher>, Arc<Queue>, Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("store")).unwrap());
        let queue = Arc::new(Queue::new());
        let log_broker = Arc::new(LogBroker::new(store.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue.clone(), log_broker));
        (dispatcher, queue, store, dir)
    }

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

    #[test]
    fn offer_dispatches_pending_job_at_most_once() {
        let (dispatcher, queue, store, _dir) = setup();
        queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap();

        assert!(dispatcher.offer("web-01", "agent-1").unwrap().is_some());
        assert!(dispatcher.offer("web-01", "agent-1").unwrap().is_none());
    }

    /// Spec §8 Scenario B: two heartbeats racing for the same single
    /// pending job must never both receive it.
    #[test]
    fn concurrent_heartbeats_claim_the_same_pending_job_exactly_once() {
        let (dispatcher, queue, store, _dir) = setup();
        queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap();

        let d1 = dispatcher.clone();
        let d2 = dispatcher.clone();
        let t1 = std::thread::spawn(move || d1.offer("web-01", "agent-1").unwrap());
        let t2 = std::thread::spawn(move || d2.offer("web-01", "agent-2").unwrap());

        let results = [t1.join().unwrap(), t2.join().unwrap()];
        let claimed = results.into_iter().flatten().count();
        assert_eq!(claimed, 1, "exactly one heartbeat should win the race for the single pending job");
    }

    #[test]
    fn on_complete_closes_log_broker_and_frees_idempotency_key() {
        let (dispatcher, queue, store, _dir) = setup();
        let inserted = queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap().unwrap();
        dispatcher.offer("web-01", "agent-1").unwrap();

        let completed = dispatcher.on_complete("agent-1", &inserted.id, JobStatus::Success, None, None).unwrap();
        assert_eq!(completed.status, JobStatus::Success);

        let re_enqueued = queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap();
        assert!(re_enqueued.is_some(), "idempotency key must be freed once the job is terminal");
    }

    #[test]
    fn on_complete_by_wrong_agent_is_rejected() {
        let (dispatcher, queue, store, _dir) = setup();
        let inserted = queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap().unwrap();
        dispatcher.offer("web-01", "agent-1").unwrap();

        let err = dispatcher.on_complete("agent-2", &inserted.id, JobStatus::Success, None, None).unwrap_err();
        assert!(matches!(err, DispatchError::NotAssignedToYou));
    }

    #[test]
    fn cancel_removes_job_from_pending_queue() {
        let (dispatcher, queue, store, _dir) = setup();
        let inserted = queue.enqueue(&store, job("myorg/web", "refs/heads/main", "web-01")).unwrap().unwrap();

        let cancelled = dispatcher.cancel(&inserted.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(dispatcher.offer("web-01", "agent-1").unwrap().is_none());
    }
}
