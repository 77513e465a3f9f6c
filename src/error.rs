use axum::http::StatusCode;
use thiserror::Error;

/// Errors surfaced by the index service.
///
/// Everything except `ConsistencyFault` is recoverable at the request
/// boundary. A consistency fault means the vector count and the record count
/// disagreed after a write or on load; the engine stops accepting writes until
/// it is reset or reloaded.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("consistency fault: {vectors} vectors vs {records} records")]
    ConsistencyFault { vectors: usize, records: usize },

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Embedding(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Index(_) | ServiceError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::ConsistencyFault { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<ServiceError> for (StatusCode, String) {
    fn from(err: ServiceError) -> Self {
        (err.status_code(), err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Persistence(err.to_string())
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
