use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::LogChunk;
use crate::observability::Metrics;
use crate::store::Store;

use super::error::Result;

/// Default ring buffer depth per active job (spec §4.6).
pub const DEFAULT_RING_CAPACITY: usize = 4096;
/// Default per-subscriber queued-chunk limit before it is dropped.
pub const DEFAULT_SUBSCRIBER_BACKPRESSURE_LIMIT: usize = 1024;

/// Event delivered to a log subscriber.
#[derive(Debug, Clone)]
pub enum LogEvent {
    Chunk(LogChunk),
    /// Sent once when the job reaches a terminal state or the broker is
    /// force-closed; the subscriber should end its stream after this.
    Closed,
    /// Sent (best-effort) to a subscriber that fell behind past the
    /// backpressure limit, immediately before it is dropped.
    Dropped,
}

struct JobState {
    ring: VecDeque<LogChunk>,
    subscribers: Vec<mpsc::Sender<LogEvent>>,
}

impl JobState {
    fn new() -> Self {
        Self { ring: VecDeque::new(), subscribers: Vec::new() }
    }
}

/// Ingests log chunks per job, buffers recent history in a bounded ring,
/// and fans out to live subscribers. Persisted history lives in
/// [`Store`]; the ring and subscriber list are purely in-memory and are
/// dropped when a job closes.
pub struct LogBroker {
    store: Arc<Store>,
    jobs: Mutex<HashMap<String, JobState>>,
    ring_capacity: usize,
    backpressure_limit: usize,
    metrics: Option<Arc<Metrics>>,
}

impl LogBroker {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            jobs: Mutex::new(HashMap::new()),
            ring_capacity: DEFAULT_RING_CAPACITY,
            backpressure_limit: DEFAULT_SUBSCRIBER_BACKPRESSURE_LIMIT,
            metrics: None,
        }
    }

    pub fn with_limits(mut self, ring_capacity: usize, backpressure_limit: usize) -> Self {
        self.ring_capacity = ring_capacity;
        self.backpressure_limit = backpressure_limit;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Persists `chunks` and fans them out to live subscribers of `job_id`.
    /// Chunks must already carry monotonic, gap-free sequence numbers for
    /// this job.
    pub fn publish(&self, job_id: &str, chunks: &[LogChunk]) -> Result<()> {
        for chunk in chunks {
            self.store.append_log(chunk)?;
        }

        let mut jobs = self.jobs.lock().unwrap();
        let state = jobs.entry(job_id.to_string()).or_insert_with(JobState::new);

        for chunk in chunks {
            state.ring.push_back(chunk.clone());
            while state.ring.len() > self.ring_capacity {
                state.ring.pop_front();
            }
        }

        state.subscribers.retain_mut(|tx| {
            for chunk in chunks {
                match tx.try_send(LogEvent::Chunk(chunk.clone())) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(job_id, "subscriber exceeded backpressure limit, dropping");
                        let _ = tx.try_send(LogEvent::Dropped);
                        if let Some(metrics) = &self.metrics {
                            metrics.log_subscriber_dropped();
                        }
                        return false;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return false,
                }
            }
            true
        });

        Ok(())
    }

    /// Returns a receiver that yields persisted chunks from `from_sequence`
    /// followed by live chunks as they arrive, until the job closes. A
    /// job that is already terminal gets its full backlog plus an
    /// immediate `Closed` sentinel rather than a subscriber registration
    /// that nothing will ever close.
    pub fn subscribe(&self, job_id: &str, from_sequence: u64) -> Result<mpsc::Receiver<LogEvent>> {
        let (tx, rx) = mpsc::channel(self.backpressure_limit);

        let ring_tail = {
            let jobs = self.jobs.lock().unwrap();
            jobs.get(job_id).and_then(|state| state.ring.front().map(|c| c.sequence))
        };

        // Falling back to Store happens outside the jobs lock: it is the
        // only suspension point here and must not be held across I/O. An
        // empty/missing ring (nothing published in-process since startup,
        // or the job already closed and its JobState was evicted) must
        // also fall back, or a subscriber to a completed job's history
        // gets no backlog at all.
        let needs_store = match ring_tail {
            Some(tail) => from_sequence < tail,
            None => true,
        };
        let from_store = if needs_store { Some(self.store.read_logs(job_id, from_sequence)?) } else { None };
        let job = self.store.get_job(job_id)?;

        let mut jobs = self.jobs.lock().unwrap();
        let state = jobs.entry(job_id.to_string()).or_insert_with(JobState::new);

        let backlog: Vec<LogChunk> = match from_store {
            Some(persisted) => persisted,
            None => state.ring.iter().filter(|c| c.sequence >= from_sequence).cloned().collect(),
        };

        for chunk in backlog {
            let _ = tx.try_send(LogEvent::Chunk(chunk));
        }

        if job.is_some_and(|j| j.status.is_terminal()) {
            let _ = tx.try_send(LogEvent::Closed);
            debug!(job_id, from_sequence, "subscriber registered to already-closed job");
            return Ok(rx);
        }

        state.subscribers.push(tx.clone());

        debug!(job_id, from_sequence, "subscriber registered");
        Ok(rx)
    }

    /// Emits a close sentinel to every live subscriber and frees the ring.
    /// Persisted log history is untouched.
    pub fn close(&self, job_id: &str) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(state) = jobs.remove(job_id) {
            for tx in &state.subscribers {
                let _ = tx.try_send(LogEvent::Closed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogStream;
    use tempfile::TempDir;

    fn store() -> (Arc<Store>, TempDir) {
        let dir = TempDir::new().unwrap();
        (Arc::new(Store::open(dir.path().join("store")).unwrap()), dir)
    }

    fn chunk(job_id: &str, seq: u64) -> LogChunk {
        LogChunk {
            job_id: job_id.to_string(),
            sequence: seq,
            timestamp: chrono::Utc::now(),
            stream: LogStream::Stdout,
            bytes: format!("line {seq}").into_bytes(),
        }
    }

    #[tokio::test]
    async fn subscribe_receives_live_chunks() {
        let (store, _dir) = store();
        let broker = LogBroker::new(store);

        let mut rx = broker.subscribe("job-1", 0).unwrap();
        broker.publish("job-1", &[chunk("job-1", 0), chunk("job-1", 1)]).unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, LogEvent::Chunk(c) if c.sequence == 0));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, LogEvent::Chunk(c) if c.sequence == 1));
    }

    #[tokio::test]
    async fn subscribe_replays_persisted_backlog_when_older_than_ring() {
        let (store, _dir) = store();
        let broker = LogBroker::new(store).with_limits(2, 1024);

        broker.publish("job-1", &[chunk("job-1", 0), chunk("job-1", 1), chunk("job-1", 2)]).unwrap();

        let mut rx = broker.subscribe("job-1", 0).unwrap();
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, LogEvent::Chunk(c) if c.sequence == 0));
    }

    #[tokio::test]
    async fn close_emits_sentinel() {
        let (store, _dir) = store();
        let broker = LogBroker::new(store);

        let mut rx = broker.subscribe("job-1", 0).unwrap();
        broker.close("job-1");

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, LogEvent::Closed));
    }
}
