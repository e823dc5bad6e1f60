use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::connection::{SqliteConnection, sqlite_error};
use crate::driver::{Driver, DriverError, DriverResult};
use crate::pool::PoolConfig;

static SCHEMA_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("schema name pattern is valid")
});

/// Schemas every `SQLite` connection already has.
const BUILTIN_SCHEMAS: [&str; 2] = ["main", "temp"];

/// Opens `SQLite` databases for the pool.
///
/// `PoolConfig::host` is the database path. Every library other than
/// `main`/`temp` is attached read-only from `<library>.db` beside it.
/// Credentials and `secure` have no meaning for a local file and are ignored.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    wal: bool,
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self { wal: true }
    }
}

impl SqliteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch new connections to WAL journaling (on by default).
    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn connect(&self, config: &PoolConfig) -> DriverResult<SqliteConnection> {
        let path = config.host.clone();
        let wal = self.wal;
        let attachments = attachments_for(config)?;
        if config.secure {
            debug!("secure transport has no effect on sqlite");
        }

        let conn = tokio::task::spawn_blocking(move || -> DriverResult<rusqlite::Connection> {
            let conn = rusqlite::Connection::open(&path).map_err(sqlite_error)?;
            if wal {
                conn.execute_batch("PRAGMA journal_mode = WAL;")
                    .map_err(sqlite_error)?;
            }
            let dir = Path::new(&path).parent().unwrap_or_else(|| Path::new(""));
            for schema in &attachments {
                let file = dir.join(format!("{schema}.db"));
                let uri = format!("file:{}?mode=ro", file.display());
                conn.execute(&format!("ATTACH DATABASE ?1 AS \"{schema}\""), [uri])
                    .map_err(sqlite_error)?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| DriverError::new(format!("sqlite open task failed: {e}")))??;

        debug!(path = %config.host, "opened sqlite connection");
        Ok(SqliteConnection::new(conn))
    }
}

fn attachments_for(config: &PoolConfig) -> DriverResult<Vec<String>> {
    config
        .library_list()
        .into_iter()
        .filter(|lib| !BUILTIN_SCHEMAS.iter().any(|b| b.eq_ignore_ascii_case(lib)))
        .map(|lib| {
            if SCHEMA_NAME.is_match(lib) {
                Ok(lib.to_string())
            } else {
                Err(DriverError::new(format!("invalid sqlite schema name: {lib}")))
            }
        })
        .collect()
}
