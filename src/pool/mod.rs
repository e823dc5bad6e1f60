pub mod config;
pub mod connection;
pub mod manager;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use connection::BorrowedConnection;
pub use manager::{ConnectionPoolManager, DriverManager, DriverPool, PoolStatus};
