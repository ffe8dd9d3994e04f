use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum MaestroError {
    #[error("Failed to spawn session for slot '{slot_id}': {message}")]
    SessionSpawnFailed { slot_id: String, message: String },

    #[error("Access to '{path}' has not been granted")]
    PermissionDenied { path: String },

    #[error("Branch '{branch}' is already checked out at {existing_path}")]
    WorktreeConflict {
        branch: String,
        existing_path: String,
    },

    #[error("Worktree not found at path: {path}")]
    WorktreeNotFound { path: String },

    #[error("Git operation '{operation}' failed: {message}")]
    GitOperationFailed { operation: String, message: String },

    #[error("No free port in range {start}-{end}")]
    NoPortAvailable { start: u16, end: u16 },

    #[error("I/O error during '{operation}' on '{path}': {message}")]
    IoError {
        operation: String,
        path: String,
        message: String,
    },

    #[error("Configuration error for key '{key}': {message}")]
    ConfigError { key: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MaestroError {
    pub fn git(operation: &str, error: impl ToString) -> Self {
        MaestroError::GitOperationFailed {
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    pub fn io(operation: &str, path: impl ToString, error: impl ToString) -> Self {
        MaestroError::IoError {
            operation: operation.to_string(),
            path: path.to_string(),
            message: error.to_string(),
        }
    }

    pub fn spawn(slot_id: impl ToString, error: impl ToString) -> Self {
        MaestroError::SessionSpawnFailed {
            slot_id: slot_id.to_string(),
            message: error.to_string(),
        }
    }

    pub fn config(key: &str, message: impl ToString) -> Self {
        MaestroError::ConfigError {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn internal(message: impl ToString) -> Self {
        MaestroError::Internal {
            message: message.to_string(),
        }
    }

    /// Whether a fresh user-initiated call may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            MaestroError::ConfigError { .. } | MaestroError::Internal { .. }
        )
    }
}

impl From<MaestroError> for String {
    fn from(error: MaestroError) -> Self {
        error.to_string()
    }
}

impl From<tokio::task::JoinError> for MaestroError {
    fn from(error: tokio::task::JoinError) -> Self {
        MaestroError::internal(format!("background task failed: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, MaestroError>;
