//! Test doubles for exercising the orchestration layer without a database.
//!
//! Enabled for the crate's own unit tests and, for downstream crates and the
//! integration suite, through the `test-utils` feature.

mod mock;

pub use mock::{FailPoint, MockCall, MockConnection, MockDriver};

use crate::pool::PoolConfig;

/// A complete config for the mock backend.
#[must_use]
pub fn mock_config(initial_pool_count: u32) -> PoolConfig {
    PoolConfig::builder("mock-host", "tester", "secret")
        .libraries("APPLIB, QGPL")
        .initial_pool_count(initial_pool_count)
        .finish()
}
