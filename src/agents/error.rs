use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent {0} is unknown; the worker must re-register")]
    AgentUnknown(String),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Dispatch(#[from] crate::dispatch::DispatchError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
