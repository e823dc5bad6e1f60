use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use deadpool::managed::{Manager, Metrics, Object, Pool, PoolError, RecycleError, RecycleResult};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::config::PoolConfig;
use super::connection::BorrowedConnection;
use crate::driver::{Driver, DriverConnection, DriverError};
use crate::error::SqlPoolError;

/// deadpool manager that opens connections through a [`Driver`].
pub struct DriverManager<D: Driver> {
    driver: Arc<D>,
    config: PoolConfig,
}

impl<D: Driver> fmt::Debug for DriverManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverManager")
            .field("driver", &self.driver.name())
            .field("host", &self.config.host)
            .finish()
    }
}

impl<D: Driver> Manager for DriverManager<D> {
    type Type = D::Connection;
    type Error = DriverError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        debug!(driver = self.driver.name(), host = %self.config.host, "opening pooled connection");
        self.driver.connect(&self.config).await
    }

    async fn recycle(&self, conn: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Self::Error> {
        if conn.is_valid().await {
            Ok(())
        } else {
            Err(RecycleError::Backend(DriverError::new(
                "pooled connection failed validation",
            )))
        }
    }
}

pub type DriverPool<D> = Pool<DriverManager<D>>;

/// Connection accounting for a live pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Physical connections currently owned by the pool.
    pub size: usize,
    /// Idle connections ready for checkout.
    pub available: usize,
    /// Connections on loan to operations.
    pub in_use: usize,
}

struct LivePool<D: Driver> {
    config: PoolConfig,
    pool: DriverPool<D>,
}

/// Owns the single live pool and its lifecycle.
///
/// `initialize`, `reinitialize`, `close` and `kill` are serialized by an
/// internal async lock. Operations only clone the pool handle, so a
/// re-initialization never waits on in-flight statements; their connections
/// are discarded by the closed pool when they come back.
pub struct ConnectionPoolManager<D: Driver> {
    driver: Arc<D>,
    live: RwLock<Option<LivePool<D>>>,
    lifecycle: Mutex<()>,
    generation: AtomicU64,
    debug: AtomicBool,
}

impl<D: Driver> fmt::Debug for ConnectionPoolManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPoolManager")
            .field("driver", &self.driver.name())
            .field("ready", &self.is_ready())
            .field("generation", &self.pool_generation())
            .finish()
    }
}

impl<D: Driver> ConnectionPoolManager<D> {
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self::from_shared(Arc::new(driver))
    }

    #[must_use]
    pub fn from_shared(driver: Arc<D>) -> Self {
        Self {
            driver,
            live: RwLock::new(None),
            lifecycle: Mutex::new(()),
            generation: AtomicU64::new(0),
            debug: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn read_live(&self) -> RwLockReadGuard<'_, Option<LivePool<D>>> {
        match self.live.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_live(&self) -> RwLockWriteGuard<'_, Option<LivePool<D>>> {
        match self.live.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// True when a config has been applied and its pool is open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.read_live()
            .as_ref()
            .is_some_and(|live| !live.pool.is_closed())
    }

    /// Number of pools successfully built by this manager.
    #[must_use]
    pub fn pool_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Config of the live pool, if any.
    #[must_use]
    pub fn config(&self) -> Option<PoolConfig> {
        self.read_live().as_ref().map(|live| live.config.clone())
    }

    #[must_use]
    pub fn status(&self) -> Option<PoolStatus> {
        self.read_live().as_ref().map(|live| {
            let status = live.pool.status();
            PoolStatus {
                max_size: status.max_size,
                size: status.size,
                available: status.available,
                in_use: status.size.saturating_sub(status.available),
            }
        })
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Release);
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Acquire)
    }

    /// Build and fill a pool for `config` unless one is already live.
    ///
    /// # Errors
    /// Returns `SqlPoolError::Config` for an incomplete config and
    /// `SqlPoolError::PoolInitialization` when construction or fill fails;
    /// in both cases the manager stays uninitialized.
    pub async fn initialize(&self, config: PoolConfig) -> Result<(), SqlPoolError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_ready() {
            debug!("connection pool already initialized");
            return Ok(());
        }
        self.build(config).await
    }

    /// Close the live pool, logging close failures, then build a new one.
    ///
    /// # Errors
    /// Same as [`initialize`](Self::initialize).
    pub async fn reinitialize(&self, config: PoolConfig) -> Result<(), SqlPoolError> {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.write_live().take();
        if let Some(previous) = previous {
            info!(host = %previous.config.host, "re-initializing connection pool");
            Self::shutdown(previous, true).await;
        }
        self.build(config).await
    }

    /// Close every pooled connection and return to the uninitialized state.
    ///
    /// # Errors
    /// Never fails today; close failures of individual connections are logged.
    pub async fn close(&self) -> Result<(), SqlPoolError> {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.write_live().take();
        if let Some(previous) = previous {
            Self::shutdown(previous, true).await;
        }
        Ok(())
    }

    /// Drop the live pool without closing idle connections first.
    pub async fn kill(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.write_live().take();
        if let Some(previous) = previous {
            warn!(host = %previous.config.host, "killing connection pool");
            Self::shutdown(previous, false).await;
        }
    }

    /// Borrow one connection from the live pool.
    ///
    /// # Errors
    /// `SqlPoolError::NotInitialized` without a live pool, `SqlPoolError::Pool`
    /// when the pool cannot hand out a connection.
    pub async fn acquire(&self) -> Result<BorrowedConnection<D>, SqlPoolError> {
        let pool = self
            .read_live()
            .as_ref()
            .map(|live| live.pool.clone())
            .ok_or(SqlPoolError::NotInitialized)?;

        let mut object = pool.get().await.map_err(|e| match e {
            PoolError::Closed => SqlPoolError::NotInitialized,
            other => SqlPoolError::Pool(other.to_string()),
        })?;
        object.set_debug(self.debug());
        Ok(BorrowedConnection::new(object))
    }

    async fn build(&self, config: PoolConfig) -> Result<(), SqlPoolError> {
        config.validate()?;

        let initial = config.effective_initial_count();
        let max_size = config.effective_max_size();
        info!(
            driver = self.driver.name(),
            host = %config.host,
            libraries = %config.libraries,
            secure = config.secure,
            initial,
            max_size,
            "initializing connection pool"
        );

        let manager = DriverManager {
            driver: Arc::clone(&self.driver),
            config: config.clone(),
        };
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| {
                error!(error = %e, "failed to build connection pool");
                SqlPoolError::pool_initialization(format!("failed to build pool: {e}"), None)
            })?;

        if let Err(err) = Self::fill(&pool, initial).await {
            error!(error = %err, "failed to fill connection pool");
            pool.close();
            return Err(err);
        }

        *self.write_live() = Some(LivePool { config, pool });
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(generation, "connection pool ready");
        Ok(())
    }

    async fn fill(pool: &DriverPool<D>, count: usize) -> Result<(), SqlPoolError> {
        let mut opened: Vec<Object<DriverManager<D>>> = Vec::with_capacity(count);
        for _ in 0..count {
            match pool.get().await {
                Ok(object) => opened.push(object),
                Err(e) => {
                    // Connections opened so far are closed, not parked in a pool about to be dropped.
                    for object in opened {
                        let mut conn = Object::take(object);
                        if let Err(close_err) = conn.close().await {
                            warn!(error = %close_err, "failed to close connection from partial fill");
                        }
                    }
                    return Err(match e {
                        PoolError::Backend(source) => SqlPoolError::pool_initialization(
                            format!("failed to open connection: {source}"),
                            Some(source),
                        ),
                        other => SqlPoolError::pool_initialization(other.to_string(), None),
                    });
                }
            }
        }
        // Dropping the objects parks them as idle connections.
        drop(opened);
        Ok(())
    }

    async fn shutdown(live: LivePool<D>, graceful: bool) {
        if graceful {
            // Idle connections leave without a recycle check, so teardown never connects.
            let idle = live.pool.retain(|_, _| false).removed;
            debug!(idle = idle.len(), "closing idle pooled connections");
            for mut conn in idle {
                if let Err(e) = conn.close().await {
                    warn!(error = %e, "failed to close pooled connection");
                }
            }
        }
        live.pool.close();
        info!(host = %live.config.host, "connection pool closed");
    }
}
