//! Database-specific error types and conversions.

use toolshed_core::error::ToolshedError;

/// Marker embedded in every guard failure thrown from a write batch.
pub(crate) const CONFLICT_MARKER: &str = "category_conflict";

/// Marker thrown when a claimed sibling name is already taken.
pub(crate) const DUPLICATE_MARKER: &str = "category_duplicate";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl DbError {
    /// Classify a failure raised while committing a write batch.
    ///
    /// `message` holds every statement error of the batch. Guard failures
    /// surface either with our marker or, for statements cancelled
    /// alongside them, as a failed transaction. Storage-level commit
    /// collisions are reported as retryable by SurrealDB.
    pub(crate) fn from_write(message: String) -> Self {
        if message.contains(DUPLICATE_MARKER) {
            return DbError::Duplicate(message);
        }
        let lowered = message.to_lowercase();
        if message.contains(CONFLICT_MARKER)
            || lowered.contains("failed transaction")
            || lowered.contains("can be retried")
            || lowered.contains("conflict")
        {
            DbError::Conflict(message)
        } else {
            DbError::Query(message)
        }
    }
}

impl From<DbError> for ToolshedError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ToolshedError::NotFound { entity, id },
            DbError::Conflict(reason) => ToolshedError::Conflict { reason },
            DbError::Duplicate(entity) => ToolshedError::AlreadyExists { entity },
            other => ToolshedError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thrown_guard_is_a_conflict() {
        let err = DbError::from_write(format!(
            "An error occurred: {CONFLICT_MARKER}: version mismatch"
        ));
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn cancelled_statement_is_a_conflict() {
        let err = DbError::from_write(
            "The query was not executed due to a failed transaction".into(),
        );
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn taken_name_wins_over_cancelled_statements() {
        let err = DbError::from_write(format!(
            "The query was not executed due to a failed transaction; \
             An error occurred: {DUPLICATE_MARKER}: name taken"
        ));
        assert!(matches!(err, DbError::Duplicate(_)));
        let core: ToolshedError = err.into();
        assert!(matches!(core, ToolshedError::AlreadyExists { .. }));
    }

    #[test]
    fn other_failures_stay_query_errors() {
        let err = DbError::from_write("Parse error: unexpected token".into());
        assert!(matches!(err, DbError::Query(_)));
        let core: ToolshedError = err.into();
        assert!(matches!(core, ToolshedError::Database(_)));
    }
}
