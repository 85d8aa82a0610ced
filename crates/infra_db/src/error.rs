//! Database error types
//!
//! This module defines the error types that can occur during data access,
//! including the tenant-isolation failures introduced by the scoping layer.

use thiserror::Error;

/// Errors that can occur during data-access operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A tenant-scoped operation was attempted without a tenant in context
    #[error("No tenant in context for scoped entity '{0}'")]
    MissingTenant(&'static str),

    /// A caller-supplied tenant predicate disagrees with the context tenant
    #[error("Tenant conflict on '{entity}': filter has {supplied}, context has {context}")]
    TenantConflict {
        entity: &'static str,
        supplied: String,
        context: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Checks if this error was raised by the tenant-isolation layer
    pub fn is_tenant_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::MissingTenant(_) | DatabaseError::TenantConflict { .. }
        )
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// Analyzes the SQLx error and maps it to the appropriate variant based on
/// the PostgreSQL error code.
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                // PostgreSQL error codes
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateEntry(db_err.message().to_string()),
                        "23503" => {
                            DatabaseError::ForeignKeyViolation(db_err.message().to_string())
                        }
                        "23514" => {
                            DatabaseError::ConstraintViolation(db_err.message().to_string())
                        }
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

/// Owned-error path used by `?` in the engines; same classification.
impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::from(&error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_violation_classification() {
        let missing = DatabaseError::MissingTenant("student");
        assert!(missing.is_tenant_violation());
        assert!(!missing.is_not_found());

        let conflict = DatabaseError::TenantConflict {
            entity: "student",
            supplied: "SCH-a".to_string(),
            context: "SCH-b".to_string(),
        };
        assert!(conflict.is_tenant_violation());
        assert!(conflict.to_string().contains("student"));
    }

    #[test]
    fn test_not_found_helper() {
        let error = DatabaseError::not_found("Student", "s1");
        assert!(error.is_not_found());
        assert!(error.to_string().contains("Student"));
    }

    /// Stand-in for a driver error carrying a PostgreSQL error code.
    #[derive(Debug)]
    struct PgCodeError {
        code: &'static str,
        message: &'static str,
    }

    impl std::fmt::Display for PgCodeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for PgCodeError {}

    impl sqlx::error::DatabaseError for PgCodeError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(self.code))
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    fn db_error(code: &'static str, message: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(PgCodeError { code, message }))
    }

    #[test]
    fn test_duplicate_key_maps_to_duplicate_entry() {
        let mapped: DatabaseError =
            db_error("23505", "duplicate key value violates unique constraint").into();
        assert!(matches!(mapped, DatabaseError::DuplicateEntry(_)));
        assert!(mapped.is_constraint_violation());
    }

    #[test]
    fn test_constraint_codes_classify() {
        let fk: DatabaseError = db_error("23503", "violates foreign key constraint").into();
        assert!(matches!(fk, DatabaseError::ForeignKeyViolation(_)));

        let check: DatabaseError = db_error("23514", "violates check constraint").into();
        assert!(matches!(check, DatabaseError::ConstraintViolation(_)));

        let other: DatabaseError = db_error("42P01", "relation does not exist").into();
        assert!(matches!(other, DatabaseError::QueryFailed(_)));
        assert!(!other.is_constraint_violation());
    }

    #[test]
    fn test_driver_errors_classify() {
        let missing: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(missing.is_not_found());

        let exhausted: DatabaseError = sqlx::Error::PoolTimedOut.into();
        assert!(exhausted.is_connection_error());
    }
}
