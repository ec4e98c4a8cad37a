use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("missing or malformed signature header")]
    MalformedSignature,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Queue(#[from] crate::queue::QueueError),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
