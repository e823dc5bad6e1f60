use std::fmt;
use std::ops::{Deref, DerefMut};

use deadpool::managed::Object;
use tracing::{debug, warn};

use super::manager::DriverManager;
use crate::driver::{Driver, DriverConnection};
use crate::error::SqlPoolError;

/// A connection on loan from the pool for one logical operation.
///
/// Hand it back with [`release`](BorrowedConnection::release). A connection
/// dropped while auto-commit is off (for example when a transaction body
/// panics) is detached from the pool instead of being reused.
pub struct BorrowedConnection<D: Driver> {
    object: Option<Object<DriverManager<D>>>,
    auto_commit: Option<bool>,
}

impl<D: Driver> fmt::Debug for BorrowedConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BorrowedConnection")
            .field("released", &self.object.is_none())
            .field("auto_commit", &self.auto_commit)
            .finish()
    }
}

impl<D: Driver> BorrowedConnection<D> {
    pub(crate) fn new(object: Object<DriverManager<D>>) -> Self {
        Self {
            object: Some(object),
            auto_commit: None,
        }
    }

    fn conn(&mut self) -> &mut D::Connection {
        // `object` is only vacated by `release`/`drop`, both of which consume.
        match self.object.as_deref_mut() {
            Some(conn) => conn,
            None => unreachable!("borrowed connection used after release"),
        }
    }

    /// Toggle auto-commit and remember the setting for release.
    ///
    /// # Errors
    /// Returns the driver failure unchanged.
    pub async fn set_auto_commit(
        &mut self,
        enabled: bool,
    ) -> Result<(), crate::driver::DriverError> {
        self.conn().set_auto_commit(enabled).await?;
        self.auto_commit = Some(enabled);
        Ok(())
    }

    /// Whether auto-commit was last switched on, if it was ever set.
    #[must_use]
    pub fn auto_commit(&self) -> Option<bool> {
        self.auto_commit
    }

    /// Return the connection to the pool.
    ///
    /// A connection still in manual-commit mode is rolled back and switched
    /// back to auto-commit first; if that fails it is detached and closed.
    /// Failures are logged and never returned.
    pub async fn release(mut self) {
        let Some(mut object) = self.object.take() else {
            return;
        };
        if self.auto_commit == Some(false) {
            let restored = match object.rollback().await {
                Ok(()) => object.set_auto_commit(true).await,
                Err(e) => Err(e),
            };
            if let Err(e) = restored {
                warn!(error = %SqlPoolError::ResourceRelease(e), "discarding connection left in a transaction");
                let mut conn = Object::take(object);
                if let Err(e) = conn.close().await {
                    warn!(error = %e, "failed to close discarded connection");
                }
                return;
            }
        }
        debug!("returning connection to pool");
        drop(object);
    }
}

impl<D: Driver> Deref for BorrowedConnection<D> {
    type Target = D::Connection;

    fn deref(&self) -> &Self::Target {
        match self.object.as_deref() {
            Some(conn) => conn,
            None => unreachable!("borrowed connection used after release"),
        }
    }
}

impl<D: Driver> DerefMut for BorrowedConnection<D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn()
    }
}

impl<D: Driver> Drop for BorrowedConnection<D> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            if self.auto_commit == Some(false) {
                warn!("borrowed connection dropped mid-transaction; detaching from pool");
                drop(Object::take(object));
            } else {
                debug!("borrowed connection dropped without release; returning to pool");
            }
        }
    }
}
