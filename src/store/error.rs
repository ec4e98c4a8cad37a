use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("agent not found: {0}")]
    AgentUnknown(String),

    #[error("a non-terminal job already exists for this repo/ref/host")]
    DuplicateIdempotency,

    #[error("job is not in pending state")]
    NotClaimable,

    #[error("job is not assigned to this agent")]
    NotAssignedToYou,

    #[error("job is already in a terminal state")]
    AlreadyTerminal,
}

pub type Result<T> = std::result::Result<T, StoreError>;
