//! Pooled statement, stored-procedure and transaction orchestration over
//! pluggable async SQL drivers.
//!
//! A [`PooledDatabase`] owns one connection pool per driver and runs every
//! operation as acquire, bind, execute, marshal, release. Statements and
//! connections are handed back on every exit path, including failed binds,
//! failed executions and panicking transaction bodies.
//!
//! Backends plug in through the traits in [`driver`]; the `sqlite` feature
//! ships one built on `rusqlite`, and the `test-utils` feature a scripted
//! [`MockDriver`](test_utils::MockDriver).

pub mod prelude;

pub mod driver;
pub mod error;
pub mod executor;
pub mod maintenance;
pub mod middleware;
pub mod params;
pub mod pool;
pub mod procedure;
pub mod results;
pub mod transaction;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use driver::{Driver, DriverConnection, DriverError};
pub use error::{SqlPoolError, TransactionError};
pub use maintenance::MaintenanceGate;
pub use middleware::PooledDatabase;
pub use params::ProcedureParameter;
pub use pool::{BorrowedConnection, ConnectionPoolManager, PoolConfig, PoolStatus};
pub use results::{ProcedureResult, RowRecord};
pub use transaction::Transaction;
pub use types::{RowValues, SqlDataType};
