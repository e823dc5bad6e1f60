use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use tracing::info;

use crate::error::SqlPoolError;

static GLOBAL_GATE: LazyLock<Arc<MaintenanceGate>> =
    LazyLock::new(|| Arc::new(MaintenanceGate::new()));

/// Administrative switch that rejects all query traffic.
///
/// Each [`PooledDatabase`](crate::PooledDatabase) holds an `Arc` to a gate;
/// share one gate between databases to flip them together, or use
/// [`MaintenanceGate::global`] for a process-wide switch.
#[derive(Debug, Default)]
pub struct MaintenanceGate {
    prevent_queries: AtomicBool,
}

impl MaintenanceGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prevent_queries: AtomicBool::new(false),
        }
    }

    /// The process-wide gate.
    #[must_use]
    pub fn global() -> Arc<MaintenanceGate> {
        Arc::clone(&GLOBAL_GATE)
    }

    pub fn set_prevent_queries(&self, prevent: bool) {
        let previous = self.prevent_queries.swap(prevent, Ordering::AcqRel);
        if previous != prevent {
            info!(prevent_queries = prevent, "maintenance mode changed");
        }
    }

    #[must_use]
    pub fn prevent_queries(&self) -> bool {
        self.prevent_queries.load(Ordering::Acquire)
    }

    /// Fail fast while maintenance mode is on.
    ///
    /// # Errors
    /// Returns `SqlPoolError::MaintenanceMode` when queries are prevented.
    pub fn check(&self) -> Result<(), SqlPoolError> {
        if self.prevent_queries() {
            Err(SqlPoolError::MaintenanceMode)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_open() {
        let gate = MaintenanceGate::new();
        assert!(!gate.prevent_queries());
        assert!(gate.check().is_ok());
    }

    #[test]
    fn closed_gate_rejects() {
        let gate = MaintenanceGate::new();
        gate.set_prevent_queries(true);
        assert!(matches!(gate.check(), Err(SqlPoolError::MaintenanceMode)));
        gate.set_prevent_queries(false);
        assert!(gate.check().is_ok());
    }

    #[test]
    fn global_gate_is_shared() {
        assert!(Arc::ptr_eq(&MaintenanceGate::global(), &MaintenanceGate::global()));
    }
}
