use tracing::debug;

use crate::driver::{CallableStatement, Driver, DriverConnection};
use crate::error::SqlPoolError;
use crate::executor::{checkout, close_callable, log_statement};
use crate::maintenance::MaintenanceGate;
use crate::params::{ProcedureParameter, bind_procedure_params};
use crate::pool::{BorrowedConnection, ConnectionPoolManager};
use crate::results::{ProcedureResult, marshal_rows};

/// Calls stored procedures with mixed input/output parameters.
pub struct StoredProcedureInvoker<'a, D: Driver> {
    pool: &'a ConnectionPoolManager<D>,
    gate: &'a MaintenanceGate,
}

impl<'a, D: Driver> StoredProcedureInvoker<'a, D> {
    #[must_use]
    pub fn new(pool: &'a ConnectionPoolManager<D>, gate: &'a MaintenanceGate) -> Self {
        Self { pool, gate }
    }

    /// Bind, execute, read outputs back, then drain every result set.
    ///
    /// Outputs land under their declared field names; `result_sets` is only
    /// populated when the call produced at least one cursor.
    ///
    /// # Errors
    /// Gate, readiness and acquisition failures, then
    /// `StatementPreparation`, `ParameterBinding`, `Execution` or `ResultSet`.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[ProcedureParameter],
    ) -> Result<ProcedureResult, SqlPoolError> {
        let mut conn = checkout(self.pool, self.gate).await?;
        let outcome = call_on(&mut conn, sql, params, self.pool.debug()).await;
        conn.release().await;
        outcome
    }
}

async fn call_on<D: Driver>(
    conn: &mut BorrowedConnection<D>,
    sql: &str,
    params: &[ProcedureParameter],
    verbose: bool,
) -> Result<ProcedureResult, SqlPoolError> {
    conn.set_auto_commit(true)
        .await
        .map_err(SqlPoolError::Execution)?;
    log_statement(verbose, "call", sql);
    let mut stmt = conn
        .prepare_call(sql)
        .await
        .map_err(SqlPoolError::StatementPreparation)?;
    let outcome = run_call(stmt.as_mut(), params).await;
    close_callable(stmt).await;
    outcome
}

async fn run_call(
    stmt: &mut (dyn CallableStatement + '_),
    params: &[ProcedureParameter],
) -> Result<ProcedureResult, SqlPoolError> {
    let outputs = bind_procedure_params(stmt, params).await?;
    stmt.execute().await.map_err(SqlPoolError::Execution)?;

    let mut result = ProcedureResult::new();
    for slot in &outputs {
        let value = stmt
            .get_output(slot.position)
            .await
            .map_err(SqlPoolError::Execution)?;
        result.insert_output(slot.field_name, value);
    }

    loop {
        let rows = {
            let Some(mut cursor) = stmt.result_set().await.map_err(SqlPoolError::ResultSet)? else {
                break;
            };
            marshal_rows(Some(cursor.as_mut())).await?
        };
        debug!(rows = rows.len(), "drained procedure result set");
        result.push_result_set(rows);
        if !stmt.more_results().await.map_err(SqlPoolError::ResultSet)? {
            break;
        }
    }
    Ok(result)
}
