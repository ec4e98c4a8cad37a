//! Agent lifecycle: registration, heartbeat bookkeeping, and a background
//! liveness sweeper. Status is always derived from timestamps on read
//! ([`crate::domain::Agent::status`]); nothing here stores a state machine.

pub mod error;
pub mod registry;
pub mod sweeper;

pub use error::{AgentError, Result};
pub use registry::{AgentRegistry, HeartbeatOutcome, DEFAULT_T_OFFLINE_SECS, DEFAULT_T_STALE_SECS};
pub use sweeper::{LivenessSweeper, DEFAULT_SWEEP_INTERVAL_SECS};
