use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value;
use tracing::{debug, warn};

use super::params::set_positional;
use super::query::build_cursor;
use crate::driver::{
    CallableStatement, DriverConnection, DriverError, DriverResult, PreparedStatement,
    ResultCursor,
};
use crate::types::RowValues;

pub(crate) fn sqlite_error(err: rusqlite::Error) -> DriverError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _) => {
            DriverError::with_sql_state(err.to_string(), code.extended_code.to_string())
        }
        _ => DriverError::new(err.to_string()),
    }
}

type SharedConnection = Arc<Mutex<rusqlite::Connection>>;

/// Run blocking rusqlite work off the async executor.
async fn run_blocking<F, R>(conn: &SharedConnection, func: F) -> DriverResult<R>
where
    F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = match conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        func(&mut guard)
    })
    .await
    .map_err(|e| DriverError::new(format!("sqlite worker task failed: {e}")))?
    .map_err(sqlite_error)
}

/// One pooled `SQLite` connection.
///
/// Manual-commit mode is an explicit `BEGIN`. `commit`/`rollback` end the
/// open transaction and try to start the next one; when that `BEGIN` fails
/// the next statement opens it instead. Switching auto-commit back on
/// commits whatever is pending.
pub struct SqliteConnection {
    conn: SharedConnection,
    manual_commit: bool,
    closed: bool,
    debug: bool,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("manual_commit", &self.manual_commit)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    pub(crate) fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            manual_commit: false,
            closed: false,
            debug: false,
        }
    }

    /// Run `sql` only when rusqlite reports an open transaction.
    async fn end_transaction(&self, sql: &'static str) -> DriverResult<()> {
        if self.debug {
            debug!(sql, "sqlite batch");
        }
        run_blocking(&self.conn, move |conn| {
            if conn.is_autocommit() {
                Ok(())
            } else {
                conn.execute_batch(sql)
            }
        })
        .await
    }

    async fn begin_if_idle(&self) -> DriverResult<()> {
        if self.debug {
            debug!(sql = "BEGIN", "sqlite batch");
        }
        run_blocking(&self.conn, |conn| {
            if conn.is_autocommit() {
                conn.execute_batch("BEGIN")
            } else {
                Ok(())
            }
        })
        .await
    }

    /// Reopen the manual transaction after it ended; the outcome of the
    /// finished transaction is already settled, so failure is only logged.
    async fn reopen(&self) {
        if let Err(e) = self.begin_if_idle().await {
            warn!(error = %e, "could not begin next sqlite transaction; retrying on next statement");
        }
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::new("sqlite connection is closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    async fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()> {
        self.ensure_open()?;
        match (self.manual_commit, enabled) {
            (false, false) => self.begin_if_idle().await?,
            (true, true) => self.end_transaction("COMMIT").await?,
            _ => {}
        }
        self.manual_commit = !enabled;
        Ok(())
    }

    async fn prepare<'c>(
        &'c mut self,
        sql: &str,
    ) -> DriverResult<Box<dyn PreparedStatement + 'c>> {
        self.ensure_open()?;
        if self.manual_commit {
            self.begin_if_idle().await?;
        }
        if self.debug {
            debug!(sql, "sqlite prepare");
        }
        let text = sql.to_string();
        let checked = text.clone();
        // Surface syntax errors at prepare time and warm the statement cache.
        run_blocking(&self.conn, move |conn| conn.prepare_cached(&checked).map(|_| ())).await?;
        Ok(Box::new(SqliteStatement {
            conn: Arc::clone(&self.conn),
            sql: text,
            params: Vec::new(),
        }))
    }

    async fn prepare_call<'c>(
        &'c mut self,
        _sql: &str,
    ) -> DriverResult<Box<dyn CallableStatement + 'c>> {
        Err(DriverError::new(
            "stored procedures are not supported by the sqlite driver",
        ))
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        if self.manual_commit {
            self.end_transaction("COMMIT").await?;
            self.reopen().await;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        if self.manual_commit {
            self.end_transaction("ROLLBACK").await?;
            self.reopen().await;
        }
        Ok(())
    }

    async fn is_valid(&mut self) -> bool {
        if self.closed {
            return false;
        }
        run_blocking(&self.conn, |conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .is_ok()
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.manual_commit = false;
        run_blocking(&self.conn, |conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
            }
            conn.flush_prepared_statement_cache();
            Ok(())
        })
        .await
    }

    fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }
}

struct SqliteStatement {
    conn: SharedConnection,
    sql: String,
    params: Vec<Value>,
}

#[async_trait]
impl PreparedStatement for SqliteStatement {
    async fn bind(&mut self, position: usize, value: &RowValues) -> DriverResult<()> {
        if position == 0 {
            return Err(DriverError::new("parameter positions start at 1"));
        }
        set_positional(&mut self.params, position, value);
        Ok(())
    }

    async fn execute_query<'s>(&'s mut self) -> DriverResult<Option<Box<dyn ResultCursor + 's>>> {
        let sql = self.sql.clone();
        let params = self.params.clone();
        let cursor = run_blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            if stmt.column_count() == 0 {
                stmt.execute(rusqlite::params_from_iter(params.iter()))?;
                return Ok(None);
            }
            build_cursor(&mut stmt, &params).map(Some)
        })
        .await?;
        Ok(cursor.map(|c| Box::new(c) as Box<dyn ResultCursor + 's>))
    }

    async fn execute_update(&mut self) -> DriverResult<u64> {
        let sql = self.sql.clone();
        let params = self.params.clone();
        let affected = run_blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.execute(rusqlite::params_from_iter(params.iter()))
        })
        .await?;
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.params.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn count(conn: &mut SqliteConnection) -> i64 {
        let mut stmt = conn.prepare("SELECT count(*) FROM t").await.unwrap();
        let mut cursor = stmt.execute_query().await.unwrap().unwrap();
        cursor.next_row().await.unwrap().unwrap()[0].as_int().unwrap()
    }

    async fn insert(conn: &mut SqliteConnection, value: i64) {
        let mut stmt = conn.prepare("INSERT INTO t VALUES (?)").await.unwrap();
        stmt.bind(1, &RowValues::Int(value)).await.unwrap();
        assert_eq!(stmt.execute_update().await.unwrap(), 1);
    }

    fn open_pair(dir: &tempfile::TempDir) -> (SqliteConnection, SqliteConnection) {
        let path = dir.path().join("tx.db");
        let first = rusqlite::Connection::open(&path).unwrap();
        first.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        let second = rusqlite::Connection::open(&path).unwrap();
        (SqliteConnection::new(first), SqliteConnection::new(second))
    }

    #[tokio::test]
    async fn commit_is_durable_and_next_transaction_is_independent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, mut reader) = open_pair(&dir);

        writer.set_auto_commit(false).await.unwrap();
        insert(&mut writer, 1).await;
        writer.commit().await.unwrap();
        assert_eq!(count(&mut reader).await, 1);

        insert(&mut writer, 2).await;
        writer.rollback().await.unwrap();
        assert_eq!(count(&mut reader).await, 1);

        writer.set_auto_commit(true).await.unwrap();
        assert_eq!(count(&mut writer).await, 1);
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn commit_tolerates_a_transaction_ended_by_a_statement() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, mut reader) = open_pair(&dir);

        writer.set_auto_commit(false).await.unwrap();
        insert(&mut writer, 1).await;
        {
            let mut stmt = writer.prepare("COMMIT").await.unwrap();
            stmt.execute_update().await.unwrap();
        }
        // No transaction is open now; commit and rollback leave the data alone.
        writer.commit().await.unwrap();
        writer.rollback().await.unwrap();
        assert_eq!(count(&mut reader).await, 1);

        // The next statement runs inside a fresh manual transaction.
        insert(&mut writer, 2).await;
        assert_eq!(count(&mut reader).await, 1);
        writer.close().await.unwrap();
        assert_eq!(count(&mut reader).await, 1);
    }
}
