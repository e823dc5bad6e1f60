use tracing::{debug, info, warn};

use crate::driver::{CallableStatement, Driver, DriverConnection, PreparedStatement};
use crate::error::SqlPoolError;
use crate::maintenance::MaintenanceGate;
use crate::params::bind_params;
use crate::pool::{BorrowedConnection, ConnectionPoolManager};
use crate::results::{RowRecord, marshal_rows};
use crate::types::RowValues;

/// Emit the per-statement log line, at `info` when debug mode is on.
pub(crate) fn log_statement(verbose: bool, operation: &'static str, sql: &str) {
    if verbose {
        info!(operation, sql, "executing statement");
    } else {
        debug!(operation, "executing statement");
    }
}

/// Gate check, readiness check, then borrow one connection.
pub(crate) async fn checkout<D: Driver>(
    pool: &ConnectionPoolManager<D>,
    gate: &MaintenanceGate,
) -> Result<BorrowedConnection<D>, SqlPoolError> {
    gate.check()?;
    if !pool.is_ready() {
        return Err(SqlPoolError::NotInitialized);
    }
    pool.acquire().await
}

pub(crate) async fn close_statement(mut stmt: Box<dyn PreparedStatement + '_>) {
    if let Err(e) = stmt.close().await {
        warn!(error = %SqlPoolError::ResourceRelease(e), "failed to close statement");
    }
}

pub(crate) async fn close_callable(mut stmt: Box<dyn CallableStatement + '_>) {
    if let Err(e) = stmt.close().await {
        warn!(error = %SqlPoolError::ResourceRelease(e), "failed to close callable statement");
    }
}

/// Runs single statements, one borrowed connection per call.
///
/// Every exit path closes the statement and then releases the connection;
/// close and release failures are logged and never replace the result.
pub struct StatementExecutor<'a, D: Driver> {
    pool: &'a ConnectionPoolManager<D>,
    gate: &'a MaintenanceGate,
}

impl<'a, D: Driver> StatementExecutor<'a, D> {
    #[must_use]
    pub fn new(pool: &'a ConnectionPoolManager<D>, gate: &'a MaintenanceGate) -> Self {
        Self { pool, gate }
    }

    /// Run a query in auto-commit mode and marshal its rows.
    ///
    /// # Errors
    /// Gate, readiness and acquisition failures, then
    /// `StatementPreparation`, `ParameterBinding`, `Execution` or `ResultSet`.
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Vec<RowRecord>, SqlPoolError> {
        let mut conn = checkout(self.pool, self.gate).await?;
        let outcome = query_on(&mut conn, sql, params, self.pool.debug()).await;
        conn.release().await;
        outcome
    }

    /// Run an update in auto-commit mode; the affected row count is dropped.
    ///
    /// # Errors
    /// Same as [`execute_query`](Self::execute_query) minus `ResultSet`.
    pub async fn execute_update(&self, sql: &str, params: &[RowValues]) -> Result<(), SqlPoolError> {
        let mut conn = checkout(self.pool, self.gate).await?;
        let outcome = match conn.set_auto_commit(true).await {
            Ok(()) => update_on(&mut conn, sql, params, self.pool.debug()).await,
            Err(e) => Err(SqlPoolError::Execution(e)),
        };
        conn.release().await;
        outcome.map(|_| ())
    }

    /// Run an update on a connection the caller already holds.
    ///
    /// Neither acquires, releases nor touches auto-commit; that belongs to
    /// whoever owns the connection.
    ///
    /// # Errors
    /// `MaintenanceMode`, `StatementPreparation`, `ParameterBinding` or `Execution`.
    pub async fn execute_update_in_transaction(
        &self,
        conn: &mut BorrowedConnection<D>,
        sql: &str,
        params: &[RowValues],
    ) -> Result<(), SqlPoolError> {
        self.gate.check()?;
        update_on(conn, sql, params, self.pool.debug())
            .await
            .map(|_| ())
    }
}

pub(crate) async fn query_on<D: Driver>(
    conn: &mut BorrowedConnection<D>,
    sql: &str,
    params: &[RowValues],
    verbose: bool,
) -> Result<Vec<RowRecord>, SqlPoolError> {
    conn.set_auto_commit(true)
        .await
        .map_err(SqlPoolError::Execution)?;
    query_in_place(conn, sql, params, verbose).await
}

/// Query without changing the connection's commit mode.
pub(crate) async fn query_in_place<D: Driver>(
    conn: &mut BorrowedConnection<D>,
    sql: &str,
    params: &[RowValues],
    verbose: bool,
) -> Result<Vec<RowRecord>, SqlPoolError> {
    log_statement(verbose, "query", sql);
    let mut stmt = conn
        .prepare(sql)
        .await
        .map_err(SqlPoolError::StatementPreparation)?;
    let outcome = run_query(stmt.as_mut(), params).await;
    close_statement(stmt).await;
    outcome
}

async fn run_query(
    stmt: &mut (dyn PreparedStatement + '_),
    params: &[RowValues],
) -> Result<Vec<RowRecord>, SqlPoolError> {
    bind_params(stmt, params).await?;
    let mut cursor = stmt.execute_query().await.map_err(SqlPoolError::Execution)?;
    marshal_rows(cursor.as_deref_mut()).await
}

pub(crate) async fn update_on<D: Driver>(
    conn: &mut BorrowedConnection<D>,
    sql: &str,
    params: &[RowValues],
    verbose: bool,
) -> Result<u64, SqlPoolError> {
    log_statement(verbose, "update", sql);
    let mut stmt = conn
        .prepare(sql)
        .await
        .map_err(SqlPoolError::StatementPreparation)?;
    let outcome = run_update(stmt.as_mut(), params).await;
    close_statement(stmt).await;
    if let Ok(rows) = &outcome {
        debug!(rows = *rows, "update applied");
    }
    outcome
}

async fn run_update(
    stmt: &mut (dyn PreparedStatement + '_),
    params: &[RowValues],
) -> Result<u64, SqlPoolError> {
    bind_params(stmt, params).await?;
    stmt.execute_update().await.map_err(SqlPoolError::Execution)
}
