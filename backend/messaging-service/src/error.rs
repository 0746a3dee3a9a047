use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Why an attachment was refused before it reached the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooLarge { size: u64, limit: u64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::TooLarge { size, limit } => {
                write!(f, "file too large ({size} bytes, limit {limit} bytes)")
            }
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("rejected: {0}")]
    Rejected(RejectReason),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("forbidden")]
    Forbidden,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("storage operation timed out after {0:?}")]
    StorageTimeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }

    /// Only a timed-out blob write is worth retrying; everything else is a
    /// caller or data problem.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StorageTimeout(_))
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Forbidden => 403,
            AppError::NotFound { .. } => 404,
            AppError::Rejected(RejectReason::TooLarge { .. }) => 413,
            AppError::Storage(_) => 502,
            AppError::StorageTimeout(_) => 504,
            AppError::Config(_) | AppError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Validation(format!("malformed json: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::validation("x").status_code(), 400);
        assert_eq!(AppError::not_found("message", "m1").status_code(), 404);
        assert_eq!(
            AppError::Rejected(RejectReason::TooLarge { size: 2, limit: 1 }).status_code(),
            413
        );
        assert_eq!(AppError::Forbidden.status_code(), 403);
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        assert!(AppError::StorageTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!AppError::Storage("disk full".into()).is_retryable());
        assert!(!AppError::validation("empty").is_retryable());
    }

    #[test]
    fn test_not_found_display() {
        let err = AppError::not_found("conversation", "abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "conversation not found: abc");
    }
}
