use std::fmt;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use tracing::{Instrument, Span, debug, info};

use crate::driver::Driver;
use crate::error::SqlPoolError;
use crate::executor::StatementExecutor;
use crate::maintenance::MaintenanceGate;
use crate::params::ProcedureParameter;
use crate::pool::{BorrowedConnection, ConnectionPoolManager, PoolConfig, PoolStatus};
use crate::procedure::StoredProcedureInvoker;
use crate::results::{ProcedureResult, RowRecord};
use crate::transaction::{Transaction, TransactionCoordinator};
use crate::types::{RowValues, SqlDataType};

/// Pooled access to one database through driver `D`.
///
/// Cloning is cheap; clones share the pool, the maintenance gate, debug
/// mode and the logger.
///
/// ```rust,no_run
/// use sql_pool_middleware::prelude::*;
/// use sql_pool_middleware::sqlite::SqliteDriver;
///
/// # async fn demo() -> Result<(), SqlPoolError> {
/// let db = PooledDatabase::new(SqliteDriver::new());
/// db.initialize(PoolConfig::new("app.db", "main", "app", "secret")).await?;
///
/// let rows = db
///     .execute_prepared_statement("SELECT name FROM items WHERE id = ?", &[RowValues::Int(7)])
///     .await?;
/// for row in &rows {
///     println!("{} -> {:?}", row.index(), row.get_str("name"));
/// }
/// db.close_all().await?;
/// # Ok(())
/// # }
/// ```
pub struct PooledDatabase<D: Driver> {
    pool: Arc<ConnectionPoolManager<D>>,
    gate: Arc<MaintenanceGate>,
    default_config: Option<PoolConfig>,
    logger: Arc<RwLock<Span>>,
}

impl<D: Driver> Clone for PooledDatabase<D> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            gate: Arc::clone(&self.gate),
            default_config: self.default_config.clone(),
            logger: Arc::clone(&self.logger),
        }
    }
}

impl<D: Driver> fmt::Debug for PooledDatabase<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledDatabase")
            .field("pool", &self.pool)
            .field("prevent_queries", &self.gate.prevent_queries())
            .field("debug_mode", &self.pool.debug())
            .finish_non_exhaustive()
    }
}

impl<D: Driver> PooledDatabase<D> {
    /// A database with its own maintenance gate and no pool yet.
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self::from_parts(
            Arc::new(ConnectionPoolManager::new(driver)),
            Arc::new(MaintenanceGate::new()),
        )
    }

    /// Like [`new`](Self::new), remembering `config` so
    /// [`execute_sql_string`](Self::execute_sql_string) can initialize lazily.
    #[must_use]
    pub fn with_config(driver: D, config: PoolConfig) -> Self {
        let mut db = Self::new(driver);
        db.default_config = Some(config);
        db
    }

    #[must_use]
    pub fn from_parts(pool: Arc<ConnectionPoolManager<D>>, gate: Arc<MaintenanceGate>) -> Self {
        Self {
            pool,
            gate,
            default_config: None,
            logger: Arc::new(RwLock::new(Span::none())),
        }
    }

    /// Swap in a shared gate, e.g. [`MaintenanceGate::global`].
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<MaintenanceGate>) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPoolManager<D> {
        &self.pool
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<MaintenanceGate> {
        &self.gate
    }

    /// The span every operation runs inside.
    #[must_use]
    pub fn logger(&self) -> Span {
        match self.logger.read() {
            Ok(span) => span.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_logger(&self, span: Span) {
        match self.logger.write() {
            Ok(mut slot) => *slot = span,
            Err(poisoned) => *poisoned.into_inner() = span,
        }
        debug!("logger replaced");
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.pool.set_debug(enabled);
        info!(debug_mode = enabled, "debug mode set");
    }

    #[must_use]
    pub fn debug_mode(&self) -> bool {
        self.pool.debug()
    }

    pub fn set_prevent_queries(&self, prevent: bool) {
        self.gate.set_prevent_queries(prevent);
    }

    #[must_use]
    pub fn prevent_queries(&self) -> bool {
        self.gate.prevent_queries()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.pool.is_ready()
    }

    #[must_use]
    pub fn status(&self) -> Option<PoolStatus> {
        self.pool.status()
    }

    /// Build and fill the pool; a no-op when one is already live.
    ///
    /// # Errors
    /// `SqlPoolError::Config` or `SqlPoolError::PoolInitialization`.
    pub async fn initialize(&self, config: PoolConfig) -> Result<(), SqlPoolError> {
        self.pool.initialize(config).instrument(self.logger()).await
    }

    /// Close the live pool and build a new one from `config`.
    ///
    /// # Errors
    /// As [`initialize`](Self::initialize).
    pub async fn reinitialize(&self, config: PoolConfig) -> Result<(), SqlPoolError> {
        self.pool.reinitialize(config).instrument(self.logger()).await
    }

    /// Close every pooled connection.
    ///
    /// # Errors
    /// Individual close failures are logged, not returned.
    pub async fn close_all(&self) -> Result<(), SqlPoolError> {
        self.pool.close().instrument(self.logger()).await
    }

    /// Tear the pool down without closing idle connections one by one.
    pub async fn kill(&self) {
        self.pool.kill().instrument(self.logger()).await;
    }

    /// Run plain SQL without parameters.
    ///
    /// When the pool is not ready and a config was given to
    /// [`with_config`](Self::with_config), the pool is initialized first.
    ///
    /// # Errors
    /// As [`execute_prepared_statement`](Self::execute_prepared_statement),
    /// plus initialization failures.
    pub async fn execute_sql_string(&self, sql: &str) -> Result<Vec<RowRecord>, SqlPoolError> {
        async {
            self.gate.check()?;
            if let Some(config) = self.default_config.as_ref().filter(|_| !self.pool.is_ready()) {
                debug!("initializing pool on first use");
                self.pool.initialize(config.clone()).await?;
            }
            self.executor().execute_query(sql, &[]).await
        }
        .instrument(self.logger())
        .await
    }

    /// # Errors
    /// `MaintenanceMode`, `NotInitialized`, `Pool`, `StatementPreparation`,
    /// `ParameterBinding`, `Execution` or `ResultSet`.
    pub async fn execute_prepared_statement(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Vec<RowRecord>, SqlPoolError> {
        self.executor()
            .execute_query(sql, params)
            .instrument(self.logger())
            .await
    }

    /// # Errors
    /// `MaintenanceMode`, `NotInitialized`, `Pool`, `StatementPreparation`,
    /// `ParameterBinding` or `Execution`.
    pub async fn execute_update_prepared_statement(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<(), SqlPoolError> {
        self.executor()
            .execute_update(sql, params)
            .instrument(self.logger())
            .await
    }

    /// Run an update on a connection that belongs to a running transaction.
    ///
    /// # Errors
    /// `MaintenanceMode`, `StatementPreparation`, `ParameterBinding` or `Execution`.
    pub async fn execute_update_statement_in_transaction(
        &self,
        conn: &mut BorrowedConnection<D>,
        sql: &str,
        params: &[RowValues],
    ) -> Result<(), SqlPoolError> {
        self.executor()
            .execute_update_in_transaction(conn, sql, params)
            .instrument(self.logger())
            .await
    }

    /// # Errors
    /// `MaintenanceMode`, `NotInitialized`, `Pool`, `StatementPreparation`,
    /// `ParameterBinding`, `Execution` or `ResultSet`.
    pub async fn execute_stored_procedure(
        &self,
        sql: &str,
        params: &[ProcedureParameter],
    ) -> Result<ProcedureResult, SqlPoolError> {
        StoredProcedureInvoker::new(&self.pool, &self.gate)
            .execute(sql, params)
            .instrument(self.logger())
            .await
    }

    /// Run `body` on one connection with auto-commit off, committing when it
    /// returns `Ok` and rolling back otherwise.
    ///
    /// ```rust,no_run
    /// # use sql_pool_middleware::prelude::*;
    /// # async fn demo(db: PooledDatabase<sql_pool_middleware::sqlite::SqliteDriver>) -> Result<(), SqlPoolError> {
    /// db.run_transaction(|tx| {
    ///     Box::pin(async move {
    ///         tx.execute_update("UPDATE stock SET qty = qty - 1 WHERE id = ?", &[RowValues::Int(1)]).await?;
    ///         tx.execute_update("INSERT INTO moves (item) VALUES (?)", &[RowValues::Int(1)]).await
    ///     })
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Gate, readiness and acquisition failures, `SqlPoolError::Transaction`
    /// for begin/commit failures or a panicking body, or the body's own error.
    pub async fn run_transaction<T, F>(&self, body: F) -> Result<T, SqlPoolError>
    where
        F: for<'t> FnOnce(&'t mut Transaction<'_, D>) -> BoxFuture<'t, Result<T, SqlPoolError>>,
    {
        TransactionCoordinator::new(&self.pool, &self.gate)
            .run(body)
            .instrument(self.logger())
            .await
    }

    #[must_use]
    pub fn create_sp_input_parameter(value: impl Into<RowValues>) -> ProcedureParameter {
        ProcedureParameter::input(value)
    }

    #[must_use]
    pub fn create_sp_output_parameter(
        data_type: SqlDataType,
        field_name: impl Into<String>,
    ) -> ProcedureParameter {
        ProcedureParameter::output(data_type, field_name)
    }

    fn executor(&self) -> StatementExecutor<'_, D> {
        StatementExecutor::new(&self.pool, &self.gate)
    }
}
