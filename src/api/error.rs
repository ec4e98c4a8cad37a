use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use thiserror::Error;

use crate::agents::AgentError;
use crate::dispatch::DispatchError;
use crate::logs::LogBrokerError;
use crate::queue::QueueError;
use crate::store::StoreError;
use crate::webhook::WebhookError;

use super::models::ErrorResponse;

/// HTTP-facing error taxonomy (spec §7): each variant maps to one status
/// code and a stable machine-readable `code`, so workers can take specific
/// recovery actions instead of branching on a generic 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request body invalid: {0}")]
    InvalidPayload(String),

    #[error("request body too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("a non-terminal job already exists for this repo/ref/host")]
    DuplicateIdempotency,

    #[error("job is not in pending state")]
    NotClaimable,

    #[error("job is not assigned to this agent")]
    NotAssignedToYou,

    #[error("job is already in a terminal state")]
    AlreadyTerminal,

    #[error("agent {0} is unknown; re-register")]
    AgentUnknown(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage is temporarily unavailable")]
    StoreTransient,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            ApiError::DuplicateIdempotency => StatusCode::CONFLICT,
            ApiError::NotClaimable => StatusCode::CONFLICT,
            ApiError::NotAssignedToYou => StatusCode::CONFLICT,
            ApiError::AlreadyTerminal => StatusCode::OK,
            ApiError::AgentUnknown(_) => StatusCode::NOT_FOUND,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StoreTransient => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::SignatureInvalid => "SIGNATURE_INVALID",
            ApiError::DuplicateIdempotency => "DUPLICATE_IDEMPOTENCY",
            ApiError::NotClaimable => "NOT_CLAIMABLE",
            ApiError::NotAssignedToYou => "NOT_ASSIGNED_TO_YOU",
            ApiError::AlreadyTerminal => "ALREADY_TERMINAL",
            ApiError::AgentUnknown(_) => "AGENT_UNKNOWN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::StoreTransient => "STORE_TRANSIENT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse { code: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::JobNotFound(id) => ApiError::NotFound(id),
            StoreError::AgentUnknown(id) => ApiError::AgentUnknown(id),
            StoreError::DuplicateIdempotency => ApiError::DuplicateIdempotency,
            StoreError::NotClaimable => ApiError::NotClaimable,
            StoreError::NotAssignedToYou => ApiError::NotAssignedToYou,
            StoreError::AlreadyTerminal => ApiError::AlreadyTerminal,
            StoreError::Fjall(_) | StoreError::Io(_) => ApiError::StoreTransient,
            StoreError::Serialization(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::Store(err) => err.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::JobNotFound(id) => ApiError::NotFound(id),
            DispatchError::NotAssignedToYou => ApiError::NotAssignedToYou,
            DispatchError::AlreadyTerminal => ApiError::AlreadyTerminal,
            DispatchError::Store(err) => err.into(),
            DispatchError::Queue(err) => err.into(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(value: AgentError) -> Self {
        match value {
            AgentError::AgentUnknown(id) => ApiError::AgentUnknown(id),
            AgentError::Store(err) => err.into(),
            AgentError::Dispatch(err) => err.into(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(value: WebhookError) -> Self {
        match value {
            WebhookError::SignatureInvalid | WebhookError::MalformedSignature => ApiError::SignatureInvalid,
            WebhookError::MalformedPayload(msg) => ApiError::InvalidPayload(msg),
            WebhookError::Queue(err) => err.into(),
        }
    }
}

impl From<LogBrokerError> for ApiError {
    fn from(value: LogBrokerError) -> Self {
        match value {
            LogBrokerError::JobNotFound(id) => ApiError::NotFound(id),
            LogBrokerError::Store(err) => err.into(),
        }
    }
}
