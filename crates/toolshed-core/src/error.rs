//! Error types for the toolshed category hierarchy.

use thiserror::Error;

use crate::path::PathError;

#[derive(Debug, Error)]
pub enum ToolshedError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Parent category not found: {id}")]
    ParentNotFound { id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Invalid move: {reason}")]
    InvalidMove { reason: String },

    #[error("Category {id} still has {count} child categories")]
    HasChildren { id: String, count: u64 },

    #[error("Category {id} is still referenced by {count} products")]
    HasProducts { id: String, count: u64 },

    #[error("Concurrent modification: {reason}")]
    Conflict { reason: String },

    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("Path encoding error: {0}")]
    Encoding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolshedError {
    /// Whether the caller may retry the whole operation from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolshedError::Conflict { .. })
    }

    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_move<T: Into<String>>(reason: T) -> Self {
        Self::InvalidMove {
            reason: reason.into(),
        }
    }

    pub fn invariant<T: Into<String>>(message: T) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }
}

impl From<PathError> for ToolshedError {
    fn from(err: PathError) -> Self {
        ToolshedError::Encoding(err.to_string())
    }
}

pub type ToolshedResult<T> = Result<T, ToolshedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(
            ToolshedError::Conflict {
                reason: "stale".into()
            }
            .is_retryable()
        );
        assert!(!ToolshedError::validation("empty name").is_retryable());
        assert!(!ToolshedError::invariant("missing ancestor").is_retryable());
    }

    #[test]
    fn path_errors_become_encoding_errors() {
        let err: ToolshedError = PathError::Empty.into();
        assert!(matches!(err, ToolshedError::Encoding(_)));
    }
}
