use thiserror::Error;

use crate::driver::DriverError;

/// Which step of a transaction failed.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Disabling auto-commit on the borrowed connection failed.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] DriverError),

    /// The body succeeded but the commit did not.
    #[error("commit failed: {0}")]
    Commit(#[source] DriverError),

    /// Rolling back after a failed body did not succeed.
    ///
    /// Only surfaced through logs; the caller always receives the body's error.
    #[error("rollback failed: {0}")]
    Rollback(#[source] DriverError),

    /// The body panicked before completing.
    #[error("transaction body panicked: {0}")]
    BodyPanicked(String),
}

#[derive(Debug, Error)]
pub enum SqlPoolError {
    #[error("query execution is disabled: maintenance mode is active")]
    MaintenanceMode,

    #[error("connection pool is not initialized")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to initialize connection pool: {message}")]
    PoolInitialization {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("failed to acquire a pooled connection: {0}")]
    Pool(String),

    #[error("failed to prepare statement: {0}")]
    StatementPreparation(#[source] DriverError),

    #[error("failed to bind parameter {position}: {source}")]
    ParameterBinding {
        position: usize,
        #[source]
        source: DriverError,
    },

    #[error("invalid parameter type '{tag}' at position {position}")]
    InvalidParameterType { position: usize, tag: String },

    #[error("SQL execution error: {0}")]
    Execution(#[source] DriverError),

    #[error("failed to read result set: {0}")]
    ResultSet(#[source] DriverError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("failed to release resource: {0}")]
    ResourceRelease(#[source] DriverError),
}

impl SqlPoolError {
    pub(crate) fn pool_initialization(message: impl Into<String>, source: Option<DriverError>) -> Self {
        Self::PoolInitialization {
            message: message.into(),
            source,
        }
    }

    /// Transient categories a caller may reasonably retry.
    ///
    /// Maintenance mode is an administrative state and is not included.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::PoolInitialization { .. })
    }

    /// SQLSTATE reported by the driver, when the failure carries one.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        let driver = match self {
            Self::StatementPreparation(e)
            | Self::Execution(e)
            | Self::ResultSet(e)
            | Self::ResourceRelease(e)
            | Self::ParameterBinding { source: e, .. }
            | Self::Transaction(
                TransactionError::Begin(e)
                | TransactionError::Commit(e)
                | TransactionError::Rollback(e),
            ) => e,
            Self::PoolInitialization {
                source: Some(e), ..
            } => e,
            _ => return None,
        };
        driver.sql_state.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_error_names_position() {
        let err = SqlPoolError::ParameterBinding {
            position: 3,
            source: DriverError::new("type mismatch"),
        };
        assert_eq!(err.to_string(), "failed to bind parameter 3: type mismatch");
    }

    #[test]
    fn sql_state_is_exposed_from_driver_cause() {
        let err = SqlPoolError::Execution(DriverError::with_sql_state("no such table", "42704"));
        assert_eq!(err.sql_state(), Some("42704"));
        assert_eq!(SqlPoolError::NotInitialized.sql_state(), None);
    }

    #[test]
    fn transaction_errors_are_distinguishable() {
        let commit: SqlPoolError = TransactionError::Commit(DriverError::new("x")).into();
        assert!(matches!(
            commit,
            SqlPoolError::Transaction(TransactionError::Commit(_))
        ));
        assert!(commit.to_string().starts_with("commit failed"));
    }

    #[test]
    fn retryable_categories() {
        assert!(SqlPoolError::Pool("timeout".into()).is_retryable());
        assert!(!SqlPoolError::NotInitialized.is_retryable());
        assert!(!SqlPoolError::MaintenanceMode.is_retryable());
        assert!(
            !SqlPoolError::InvalidParameterType {
                position: 1,
                tag: "inout".into()
            }
            .is_retryable()
        );
    }
}
