//! Convenient imports for common functionality.
//!
//! This module re-exports the types most callers need to run statements,
//! procedures and transactions.

pub use crate::driver::{Driver, DriverConnection, DriverError};
pub use crate::error::{SqlPoolError, TransactionError};
pub use crate::maintenance::MaintenanceGate;
pub use crate::middleware::PooledDatabase;
pub use crate::params::ProcedureParameter;
pub use crate::pool::{PoolConfig, PoolStatus};
pub use crate::results::{ProcedureResult, RowRecord};
pub use crate::transaction::Transaction;
pub use crate::types::{RowValues, SqlDataType};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
