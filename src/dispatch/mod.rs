//! Matches heartbeats to pending jobs and drives the job state machine
//! (spec §4.4): `pending -> running -> {success, failed, cancelled}`.

pub mod dispatcher;
pub mod error;
pub mod reclaimer;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result};
pub use reclaimer::{OrphanReclaimer, DEFAULT_RECLAIM_SWEEP_INTERVAL_SECS, DEFAULT_RUNNING_JOB_ORPHAN_TIMEOUT_SECS};
