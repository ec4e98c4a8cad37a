//! In-memory, per-host FIFO of pending jobs plus a rebuildable idempotency
//! index. Fully derived from [`crate::store::Store`] on startup — see
//! [`Queue::rebuild_from`].

pub mod error;
pub mod queue;

pub use error::{QueueError, Result};
pub use queue::Queue;
