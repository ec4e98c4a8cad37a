//! In-process counters surfaced over `/health` and, eventually, a metrics
//! exporter at `telemetry.metrics_addr`. Tracing spans/events carry the
//! detailed signal; these are the aggregate numbers an operator skims first.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    jobs_created: AtomicU64,
    jobs_dispatched: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    jobs_reclaimed: AtomicU64,
    log_chunks_published: AtomicU64,
    log_subscribers_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_created(&self) {
        self.jobs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_succeeded(&self) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_reclaimed(&self) {
        self.jobs_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_chunk_published(&self) {
        self.log_chunks_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_subscriber_dropped(&self) {
        self.log_subscribers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            jobs_reclaimed: self.jobs_reclaimed.load(Ordering::Relaxed),
            log_chunks_published: self.log_chunks_published.load(Ordering::Relaxed),
            log_subscribers_dropped: self.log_subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_dispatched: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub jobs_reclaimed: u64,
    pub log_chunks_published: u64,
    pub log_subscribers_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let metrics = Metrics::new();
        metrics.job_created();
        metrics.job_created();
        metrics.job_succeeded();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_created, 2);
        assert_eq!(snapshot.jobs_succeeded, 1);
        assert_eq!(snapshot.jobs_failed, 0);
    }
}
