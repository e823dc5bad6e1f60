//! Narrow interfaces onto the underlying database driver.
//!
//! The middleware never speaks a wire protocol itself. A backend implements
//! [`Driver`] to open physical connections and the remaining traits to run
//! statements on them. Statements borrow their connection mutably and cursors
//! borrow their statement, so nothing can outlive the connection it came from.

use std::fmt;

use async_trait::async_trait;

use crate::pool::PoolConfig;
use crate::types::{RowValues, SqlDataType};

/// Error reported by a driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub message: String,
    /// e.g. "42704" for an undefined object
    pub sql_state: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
        }
    }

    pub fn with_sql_state(message: impl Into<String>, sql_state: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: Some(sql_state.into()),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "{} (SQLSTATE: {state})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DriverError {}

pub type DriverResult<T> = Result<T, DriverError>;

/// Opens physical connections for the pool.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Connection: DriverConnection;

    /// Short backend name used in log fields.
    fn name(&self) -> &'static str;

    /// Open one physical connection, applying library scoping and transport
    /// security from `config`.
    async fn connect(&self, config: &PoolConfig) -> DriverResult<Self::Connection>;
}

/// A physical connection owned by the pool.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    async fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()>;

    async fn prepare<'c>(&'c mut self, sql: &str)
    -> DriverResult<Box<dyn PreparedStatement + 'c>>;

    async fn prepare_call<'c>(
        &'c mut self,
        sql: &str,
    ) -> DriverResult<Box<dyn CallableStatement + 'c>>;

    async fn commit(&mut self) -> DriverResult<()>;

    async fn rollback(&mut self) -> DriverResult<()>;

    /// Cheap liveness check run when the pool recycles a connection.
    async fn is_valid(&mut self) -> bool;

    /// Physically close the connection.
    async fn close(&mut self) -> DriverResult<()>;

    /// Toggle driver-level tracing for this connection.
    fn set_debug(&mut self, _enabled: bool) {}
}

/// A prepared query or update bound to one borrowed connection.
#[async_trait]
pub trait PreparedStatement: Send {
    /// Bind `value` at the 1-based `position`.
    async fn bind(&mut self, position: usize, value: &RowValues) -> DriverResult<()>;

    /// Run as a query. `None` means the statement produced no cursor.
    async fn execute_query<'s>(&'s mut self) -> DriverResult<Option<Box<dyn ResultCursor + 's>>>;

    /// Run as an update and return the affected row count.
    async fn execute_update(&mut self) -> DriverResult<u64>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// A stored-procedure call bound to one borrowed connection.
#[async_trait]
pub trait CallableStatement: Send {
    async fn set_input(&mut self, position: usize, value: &RowValues) -> DriverResult<()>;

    async fn register_output(&mut self, position: usize, data_type: SqlDataType)
    -> DriverResult<()>;

    async fn execute(&mut self) -> DriverResult<()>;

    async fn get_output(&mut self, position: usize) -> DriverResult<RowValues>;

    /// The cursor for the current result, if the current result is a result set.
    async fn result_set<'s>(&'s mut self) -> DriverResult<Option<Box<dyn ResultCursor + 's>>>;

    /// Advance to the next result; `true` when it is another result set.
    async fn more_results(&mut self) -> DriverResult<bool>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// Forward-only cursor over one result set.
#[async_trait]
pub trait ResultCursor: Send {
    /// Column labels in select-list order.
    fn columns(&self) -> &[String];

    async fn next_row(&mut self) -> DriverResult<Option<Vec<RowValues>>>;
}

/// Cursor over rows already held in memory.
///
/// Backends that materialize results eagerly hand this out from
/// `execute_query`/`result_set`.
#[derive(Debug, Clone, Default)]
pub struct BufferedCursor {
    columns: Vec<String>,
    rows: std::collections::VecDeque<Vec<RowValues>>,
}

impl BufferedCursor {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<RowValues>>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }
}

#[async_trait]
impl ResultCursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> DriverResult<Option<Vec<RowValues>>> {
        Ok(self.rows.pop_front())
    }
}
