use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogBrokerError {
    #[error("job {0} not found")]
    JobNotFound(String),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

pub type Result<T> = std::result::Result<T, LogBrokerError>;
