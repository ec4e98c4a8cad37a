use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job is not assigned to this agent")]
    NotAssignedToYou,

    #[error("job is already in a terminal state")]
    AlreadyTerminal,

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Queue(#[from] crate::queue::QueueError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
