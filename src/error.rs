use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Sync checkpoint not found for user '{0}'")]
    CheckpointNotFound(String),

    #[error("Sync checkpoint already exists for user '{0}'")]
    CheckpointExists(String),

    #[error("Queue item '{0}' not found")]
    QueueItemNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Checkpoint regression: {0}")]
    CheckpointRegression(String),

    #[error("Invalid checkpoint token: {0}")]
    InvalidToken(String),

    #[error("Sync deadline exceeded: {0}")]
    Timeout(String),

    #[error("Invalid queue transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

impl From<rocksdb::Error> for SyncError {
    fn from(err: rocksdb::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            SyncError::UserNotFound(_)
            | SyncError::CheckpointNotFound(_)
            | SyncError::QueueItemNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            SyncError::InvalidArgument(_) | SyncError::InvalidToken(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            SyncError::CheckpointExists(_)
            | SyncError::CheckpointRegression(_)
            | SyncError::InvalidTransition(_) => (StatusCode::CONFLICT, self.to_string()),
            SyncError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            // Storage / serialization faults default to 500
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SyncError::UserNotFound("u1".to_string());
        assert_eq!(err.to_string(), "User 'u1' not found");

        let err = SyncError::CheckpointNotFound("u1".to_string());
        assert_eq!(err.to_string(), "Sync checkpoint not found for user 'u1'");

        let err = SyncError::InvalidArgument("chunk_size must be > 0".to_string());
        assert_eq!(err.to_string(), "Invalid argument: chunk_size must be > 0");

        let err = SyncError::Timeout("delta scan".to_string());
        assert_eq!(err.to_string(), "Sync deadline exceeded: delta scan");
    }

    #[test]
    fn test_error_debug() {
        let err = SyncError::QueueItemNotFound("q1".to_string());
        let debug = format!("{:?}", err);
        assert!(debug.contains("QueueItemNotFound"));
    }

    #[test]
    fn test_sync_result_type() {
        let ok_result: SyncResult<i32> = Ok(7);
        assert_eq!(ok_result.unwrap(), 7);

        let err_result: SyncResult<i32> = Err(SyncError::Storage("down".to_string()));
        assert!(err_result.is_err());
    }
}
