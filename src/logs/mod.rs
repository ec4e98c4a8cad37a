//! Per-job log ingest and fan-out (spec §4.6): a bounded in-memory ring per
//! active job, backed by `Store` for history, multiplexed to subscribers
//! with independent backpressure.

pub mod broker;
pub mod error;

pub use broker::{LogBroker, LogEvent, DEFAULT_RING_CAPACITY, DEFAULT_SUBSCRIBER_BACKPRESSURE_LIMIT};
pub use error::{LogBrokerError, Result};
