//! Durable persistence for agents, jobs, logs, and the idempotency index.
//!
//! Backed by Fjall, an embedded LSM key-value store, running in the same
//! process as the HTTP API. There is no separate event stream or updater
//! process: API handlers, the dispatcher and the liveness sweeper all call
//! through this module directly, and every mutation is fsynced
//! (`PersistMode::SyncAll`) before the call returns.
//!
//! The in-memory [`crate::queue::Queue`] is rebuilt from
//! [`Store::list_non_terminal_jobs`] on startup; the Store, not the Queue, is
//! the durable source of truth for jobs and their idempotency keys.

pub mod error;
pub mod keys;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{RecoveryReport, Store, StoreStats};
