use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use crate::driver::{Driver, DriverConnection};
use crate::error::{SqlPoolError, TransactionError};
use crate::executor::{checkout, query_in_place, update_on};
use crate::maintenance::MaintenanceGate;
use crate::pool::{BorrowedConnection, ConnectionPoolManager};
use crate::results::RowRecord;
use crate::types::RowValues;

/// Exclusive handle on the connection a transaction body runs against.
///
/// Statements issued through it share one manual-commit connection; the
/// coordinator decides commit or rollback once the body returns.
pub struct Transaction<'a, D: Driver> {
    conn: &'a mut BorrowedConnection<D>,
    gate: &'a MaintenanceGate,
    verbose: bool,
}

impl<D: Driver> Transaction<'_, D> {
    /// Run an update inside the transaction.
    ///
    /// # Errors
    /// `MaintenanceMode`, `StatementPreparation`, `ParameterBinding` or `Execution`.
    pub async fn execute_update(&mut self, sql: &str, params: &[RowValues]) -> Result<(), SqlPoolError> {
        self.gate.check()?;
        update_on(self.conn, sql, params, self.verbose)
            .await
            .map(|_| ())
    }

    /// Run a query inside the transaction, seeing its uncommitted writes.
    ///
    /// # Errors
    /// As [`execute_update`](Self::execute_update), plus `ResultSet`.
    pub async fn execute_query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Vec<RowRecord>, SqlPoolError> {
        self.gate.check()?;
        query_in_place(self.conn, sql, params, self.verbose).await
    }

    /// The borrowed connection, for statements issued through
    /// [`PooledDatabase::execute_update_statement_in_transaction`](crate::PooledDatabase::execute_update_statement_in_transaction).
    pub fn connection(&mut self) -> &mut BorrowedConnection<D> {
        self.conn
    }
}

/// Runs a caller-supplied body on one manual-commit connection.
pub struct TransactionCoordinator<'a, D: Driver> {
    pool: &'a ConnectionPoolManager<D>,
    gate: &'a MaintenanceGate,
}

impl<'a, D: Driver> TransactionCoordinator<'a, D> {
    #[must_use]
    pub fn new(pool: &'a ConnectionPoolManager<D>, gate: &'a MaintenanceGate) -> Self {
        Self { pool, gate }
    }

    /// Acquire, disable auto-commit, run `body`, then commit or roll back.
    ///
    /// An `Err` from the body is rolled back and returned unchanged even when
    /// the rollback itself fails. A panicking body is rolled back and reported
    /// as [`TransactionError::BodyPanicked`].
    ///
    /// # Errors
    /// Gate, readiness and acquisition failures, `TransactionError::Begin`,
    /// `TransactionError::Commit`, or whatever the body returned.
    pub async fn run<T, F>(&self, body: F) -> Result<T, SqlPoolError>
    where
        F: for<'t> FnOnce(&'t mut Transaction<'_, D>) -> BoxFuture<'t, Result<T, SqlPoolError>>,
    {
        let mut conn = checkout(self.pool, self.gate).await?;
        if let Err(e) = conn.set_auto_commit(false).await {
            conn.release().await;
            return Err(TransactionError::Begin(e).into());
        }
        debug!("transaction started");

        let outcome = {
            let mut tx = Transaction {
                conn: &mut conn,
                gate: self.gate,
                verbose: self.pool.debug(),
            };
            AssertUnwindSafe(async { body(&mut tx).await })
                .catch_unwind()
                .await
        };

        let result = match outcome {
            Ok(Ok(value)) => match conn.commit().await {
                Ok(()) => {
                    debug!("transaction committed");
                    restore_auto_commit(&mut conn).await;
                    Ok(value)
                }
                Err(e) => {
                    warn!(error = %e, "commit failed");
                    Err(TransactionError::Commit(e).into())
                }
            },
            Ok(Err(err)) => {
                rollback(&mut conn).await;
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(panic = %message, "transaction body panicked");
                rollback(&mut conn).await;
                Err(TransactionError::BodyPanicked(message).into())
            }
        };
        conn.release().await;
        result
    }
}

async fn rollback<D: Driver>(conn: &mut BorrowedConnection<D>) {
    match conn.rollback().await {
        Ok(()) => {
            debug!("transaction rolled back");
            restore_auto_commit(conn).await;
        }
        Err(e) => {
            warn!(error = %TransactionError::Rollback(e), "returning the body's error");
        }
    }
}

// A failure here leaves auto-commit off, so release rolls back and retries.
async fn restore_auto_commit<D: Driver>(conn: &mut BorrowedConnection<D>) {
    if let Err(e) = conn.set_auto_commit(true).await {
        warn!(error = %e, "failed to restore auto-commit");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
