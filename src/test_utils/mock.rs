use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::driver::{
    BufferedCursor, CallableStatement, Driver, DriverConnection, DriverError, DriverResult,
    PreparedStatement, ResultCursor,
};
use crate::pool::PoolConfig;
use crate::types::{RowValues, SqlDataType};

/// A driver call observed by [`MockDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Connect { host: String, libraries: Vec<String>, secure: bool },
    SetAutoCommit(bool),
    SetDebug(bool),
    Prepare(String),
    PrepareCall(String),
    Bind(usize, RowValues),
    SetInput(usize, RowValues),
    RegisterOutput(usize, SqlDataType),
    ExecuteQuery,
    ExecuteUpdate,
    ExecuteCall,
    GetOutput(usize),
    MoreResults,
    CloseStatement,
    Commit,
    Rollback,
    CloseConnection,
}

/// Driver steps that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Connect,
    SetAutoCommit,
    Prepare,
    PrepareCall,
    Bind,
    Execute,
    GetOutput,
    ReadRow,
    Commit,
    Rollback,
    CloseStatement,
    CloseConnection,
    Validate,
}

#[derive(Debug, Clone, Default)]
struct ScriptedSet {
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
}

#[derive(Debug, Clone, Default)]
struct ScriptedCall {
    outputs: HashMap<usize, RowValues>,
    result_sets: Vec<ScriptedSet>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Mutex<Vec<MockCall>>,
    failures: Mutex<HashSet<FailPoint>>,
    queries: Mutex<HashMap<String, ScriptedSet>>,
    procedures: Mutex<HashMap<String, ScriptedCall>>,
    update_counts: Mutex<HashMap<String, u64>>,
    connects: AtomicUsize,
    open: AtomicUsize,
    connect_limit: Mutex<Option<usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockState {
    fn record(&self, call: MockCall) {
        lock(&self.calls).push(call);
    }

    fn check(&self, point: FailPoint) -> DriverResult<()> {
        if lock(&self.failures).contains(&point) {
            Err(DriverError::with_sql_state(
                format!("injected {point:?} failure"),
                "58000",
            ))
        } else {
            Ok(())
        }
    }
}

/// Scripted in-memory driver that records every call.
///
/// Clones share state, so keep one handle for assertions and hand another
/// to the pool.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by every query whose SQL text equals `sql`.
    pub fn script_query(&self, sql: &str, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        lock(&self.state.queries).insert(
            sql.to_string(),
            ScriptedSet {
                columns: columns.iter().map(ToString::to_string).collect(),
                rows,
            },
        );
    }

    pub fn script_update(&self, sql: &str, affected: u64) {
        lock(&self.state.update_counts).insert(sql.to_string(), affected);
    }

    /// Output value a call to `sql` reports at `position`.
    pub fn script_output(&self, sql: &str, position: usize, value: RowValues) {
        lock(&self.state.procedures)
            .entry(sql.to_string())
            .or_default()
            .outputs
            .insert(position, value);
    }

    /// Append one result set to those a call to `sql` produces.
    pub fn script_result_set(&self, sql: &str, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        lock(&self.state.procedures)
            .entry(sql.to_string())
            .or_default()
            .result_sets
            .push(ScriptedSet {
                columns: columns.iter().map(ToString::to_string).collect(),
                rows,
            });
    }

    pub fn fail(&self, point: FailPoint) {
        lock(&self.state.failures).insert(point);
    }

    pub fn heal(&self, point: FailPoint) {
        lock(&self.state.failures).remove(&point);
    }

    /// Refuse every connect once `successful` connections have been opened in total.
    pub fn fail_connects_after(&self, successful: usize) {
        *lock(&self.state.connect_limit) = Some(successful);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.state.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }

    /// How many times `call` was recorded.
    #[must_use]
    pub fn count(&self, call: &MockCall) -> usize {
        lock(&self.state.calls).iter().filter(|c| *c == call).count()
    }

    /// Successful `connect` calls so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::Acquire)
    }

    /// Physical connections currently alive, pooled or on loan.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Connection = MockConnection;

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, config: &PoolConfig) -> DriverResult<MockConnection> {
        self.state.record(MockCall::Connect {
            host: config.host.clone(),
            libraries: config.library_list().into_iter().map(str::to_string).collect(),
            secure: config.secure,
        });
        self.state.check(FailPoint::Connect)?;
        let limit = *lock(&self.state.connect_limit);
        if let Some(limit) = limit {
            if self.state.connects.load(Ordering::Acquire) >= limit {
                return Err(DriverError::with_sql_state(
                    format!("connection limit of {limit} reached"),
                    "58000",
                ));
            }
        }
        self.state.connects.fetch_add(1, Ordering::AcqRel);
        self.state.open.fetch_add(1, Ordering::AcqRel);
        Ok(MockConnection {
            state: Arc::clone(&self.state),
            closed: false,
        })
    }
}

#[derive(Debug)]
pub struct MockConnection {
    state: Arc<MockState>,
    closed: bool,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()> {
        self.state.record(MockCall::SetAutoCommit(enabled));
        self.state.check(FailPoint::SetAutoCommit)
    }

    async fn prepare<'c>(
        &'c mut self,
        sql: &str,
    ) -> DriverResult<Box<dyn PreparedStatement + 'c>> {
        self.state.record(MockCall::Prepare(sql.to_string()));
        self.state.check(FailPoint::Prepare)?;
        Ok(Box::new(MockStatement {
            state: Arc::clone(&self.state),
            sql: sql.to_string(),
        }))
    }

    async fn prepare_call<'c>(
        &'c mut self,
        sql: &str,
    ) -> DriverResult<Box<dyn CallableStatement + 'c>> {
        self.state.record(MockCall::PrepareCall(sql.to_string()));
        self.state.check(FailPoint::PrepareCall)?;
        Ok(Box::new(MockCallable {
            state: Arc::clone(&self.state),
            sql: sql.to_string(),
            pending: VecDeque::new(),
            current: None,
        }))
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.state.record(MockCall::Commit);
        self.state.check(FailPoint::Commit)
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.state.record(MockCall::Rollback);
        self.state.check(FailPoint::Rollback)
    }

    async fn is_valid(&mut self) -> bool {
        !self.closed && self.state.check(FailPoint::Validate).is_ok()
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.state.record(MockCall::CloseConnection);
        self.closed = true;
        self.state.check(FailPoint::CloseConnection)
    }

    fn set_debug(&mut self, enabled: bool) {
        self.state.record(MockCall::SetDebug(enabled));
    }
}

struct MockStatement {
    state: Arc<MockState>,
    sql: String,
}

#[async_trait]
impl PreparedStatement for MockStatement {
    async fn bind(&mut self, position: usize, value: &RowValues) -> DriverResult<()> {
        self.state.record(MockCall::Bind(position, value.clone()));
        self.state.check(FailPoint::Bind)
    }

    async fn execute_query<'s>(&'s mut self) -> DriverResult<Option<Box<dyn ResultCursor + 's>>> {
        self.state.record(MockCall::ExecuteQuery);
        self.state.check(FailPoint::Execute)?;
        let scripted = lock(&self.state.queries).get(&self.sql).cloned();
        Ok(scripted.map(|set| -> Box<dyn ResultCursor + 's> {
            Box::new(MockCursor {
                state: Arc::clone(&self.state),
                inner: BufferedCursor::new(set.columns, set.rows),
            })
        }))
    }

    async fn execute_update(&mut self) -> DriverResult<u64> {
        self.state.record(MockCall::ExecuteUpdate);
        self.state.check(FailPoint::Execute)?;
        Ok(lock(&self.state.update_counts)
            .get(&self.sql)
            .copied()
            .unwrap_or(1))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.state.record(MockCall::CloseStatement);
        self.state.check(FailPoint::CloseStatement)
    }
}

struct MockCallable {
    state: Arc<MockState>,
    sql: String,
    pending: VecDeque<ScriptedSet>,
    current: Option<ScriptedSet>,
}

#[async_trait]
impl CallableStatement for MockCallable {
    async fn set_input(&mut self, position: usize, value: &RowValues) -> DriverResult<()> {
        self.state.record(MockCall::SetInput(position, value.clone()));
        self.state.check(FailPoint::Bind)
    }

    async fn register_output(
        &mut self,
        position: usize,
        data_type: SqlDataType,
    ) -> DriverResult<()> {
        self.state.record(MockCall::RegisterOutput(position, data_type));
        self.state.check(FailPoint::Bind)
    }

    async fn execute(&mut self) -> DriverResult<()> {
        self.state.record(MockCall::ExecuteCall);
        self.state.check(FailPoint::Execute)?;
        let script = lock(&self.state.procedures)
            .get(&self.sql)
            .cloned()
            .unwrap_or_default();
        self.pending = script.result_sets.into();
        self.current = self.pending.pop_front();
        Ok(())
    }

    async fn get_output(&mut self, position: usize) -> DriverResult<RowValues> {
        self.state.record(MockCall::GetOutput(position));
        self.state.check(FailPoint::GetOutput)?;
        Ok(lock(&self.state.procedures)
            .get(&self.sql)
            .and_then(|script| script.outputs.get(&position).cloned())
            .unwrap_or(RowValues::Null))
    }

    async fn result_set<'s>(&'s mut self) -> DriverResult<Option<Box<dyn ResultCursor + 's>>> {
        let state = Arc::clone(&self.state);
        Ok(self.current.take().map(|set| -> Box<dyn ResultCursor + 's> {
            Box::new(MockCursor {
                state,
                inner: BufferedCursor::new(set.columns, set.rows),
            })
        }))
    }

    async fn more_results(&mut self) -> DriverResult<bool> {
        self.state.record(MockCall::MoreResults);
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.state.record(MockCall::CloseStatement);
        self.state.check(FailPoint::CloseStatement)
    }
}

struct MockCursor {
    state: Arc<MockState>,
    inner: BufferedCursor,
}

#[async_trait]
impl ResultCursor for MockCursor {
    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    async fn next_row(&mut self) -> DriverResult<Option<Vec<RowValues>>> {
        self.state.check(FailPoint::ReadRow)?;
        self.inner.next_row().await
    }
}
