// SQLite backend - a real driver behind the orchestration layer
//
// - config: opening and scoping physical connections
// - params: middleware values to SQLite values
// - query: materializing rows
// - connection: the connection and statement handles

pub mod config;
pub mod connection;
pub mod params;
mod query;

pub use config::SqliteDriver;
pub use connection::SqliteConnection;
