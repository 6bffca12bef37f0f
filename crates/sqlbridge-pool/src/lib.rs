//! Connection pooling for sqlbridge.
//!
//! The pool is driver-agnostic: it is built from a *generator* that opens a
//! new connection (returning `None` when opening fails) and a *releaser* that
//! closes one. Idle connections are reused in LIFO order; when every
//! connection is checked out and the pool is at capacity, `acquire` waits
//! until one is returned or the acquire timeout elapses.
//!
//! The pool is an explicit object. Clone it to share it; clones refer to the
//! same set of connections.

use serde::Deserialize;
use sqlbridge_core::error::{PoolError, PoolErrorKind};
use sqlbridge_core::{Error, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of connections opened when the pool is created
    pub min_connections: usize,
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Maximum time to wait for a connection in milliseconds
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 0,
            max_connections: 10,
            acquire_timeout_ms: 30_000, // 30 seconds
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Set minimum connections.
    pub fn min_connections(mut self, n: usize) -> Self {
        self.min_connections = n;
        self
    }

    /// Set acquire timeout.
    pub fn acquire_timeout(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(sqlbridge_core::ConfigError {
                message: "max_connections must be at least 1".to_string(),
                source: None,
            }));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(sqlbridge_core::ConfigError {
                message: format!(
                    "min_connections ({}) exceeds max_connections ({})",
                    self.min_connections, self.max_connections
                ),
                source: None,
            }));
        }
        Ok(())
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of active connections
    pub active_connections: usize,
    /// Number of threads waiting in `acquire`
    pub pending_requests: usize,
}

type Generator<C> = dyn Fn() -> Option<C> + Send + Sync;
type Releaser<C> = dyn Fn(C) + Send + Sync;

struct PoolState<C> {
    idle: Vec<C>,
    total: usize,
    waiting: usize,
    closed: bool,
}

struct PoolInner<C> {
    config: PoolConfig,
    generator: Box<Generator<C>>,
    releaser: Box<Releaser<C>>,
    state: Mutex<PoolState<C>>,
    available: Condvar,
}

impl<C> PoolInner<C> {
    fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn give_back(&self, conn: C) {
        let mut state = self.lock();
        if state.closed {
            state.total -= 1;
            drop(state);
            (self.releaser)(conn);
            return;
        }
        state.idle.push(conn);
        drop(state);
        self.available.notify_one();
    }

    fn forget_one(&self) {
        let mut state = self.lock();
        state.total -= 1;
        drop(state);
        self.available.notify_one();
    }
}

/// A pool of connections produced by a generator callback.
pub struct Pool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<C> Pool<C> {
    /// Create a new connection pool.
    ///
    /// Opens `min_connections` connections up front; generator failures during
    /// warm-up are logged and leave the pool smaller.
    pub fn new<G, R>(config: PoolConfig, generator: G, releaser: R) -> Result<Self>
    where
        G: Fn() -> Option<C> + Send + Sync + 'static,
        R: Fn(C) + Send + Sync + 'static,
    {
        config.validate()?;
        let mut idle = Vec::with_capacity(config.min_connections);
        for _ in 0..config.min_connections {
            match generator() {
                Some(conn) => idle.push(conn),
                None => {
                    tracing::warn!(opened = idle.len(), "pool warm-up could not open a connection");
                    break;
                }
            }
        }
        tracing::debug!(
            warm = idle.len(),
            max = config.max_connections,
            "connection pool created"
        );
        let total = idle.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                generator: Box::new(generator),
                releaser: Box::new(releaser),
                state: Mutex::new(PoolState {
                    idle,
                    total,
                    waiting: 0,
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            total_connections: state.total,
            idle_connections: state.idle.len(),
            active_connections: state.total - state.idle.len(),
            pending_requests: state.waiting,
        }
    }

    /// Check if the pool is at capacity.
    pub fn at_capacity(&self) -> bool {
        self.inner.lock().total >= self.inner.config.max_connections
    }

    /// Check out a connection without waiting.
    ///
    /// Returns a `Timeout` pool error when the pool is at capacity with no
    /// idle connection.
    pub fn try_acquire(&self) -> Result<PooledConnection<C>> {
        self.acquire_until(None)
    }

    /// Check out a connection, waiting up to the configured acquire timeout.
    ///
    /// This blocks the calling thread while waiting.
    pub fn acquire(&self) -> Result<PooledConnection<C>> {
        let deadline = Instant::now() + Duration::from_millis(self.inner.config.acquire_timeout_ms);
        self.acquire_until(Some(deadline))
    }

    fn acquire_until(&self, deadline: Option<Instant>) -> Result<PooledConnection<C>> {
        let mut state = self.inner.lock();
        loop {
            if state.closed {
                return Err(pool_error(PoolErrorKind::Closed, "pool is closed"));
            }
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(conn, Arc::clone(&self.inner)));
            }
            if state.total < self.inner.config.max_connections {
                // Reserve the slot, then open outside the lock.
                state.total += 1;
                drop(state);
                return match (self.inner.generator)() {
                    Some(conn) => {
                        tracing::debug!("pool opened a new connection");
                        Ok(PooledConnection::new(conn, Arc::clone(&self.inner)))
                    }
                    None => {
                        self.inner.forget_one();
                        Err(pool_error(
                            PoolErrorKind::Exhausted,
                            "connection generator failed to open a connection",
                        ))
                    }
                };
            }

            let Some(deadline) = deadline else {
                return Err(pool_error(PoolErrorKind::Timeout, "no idle connection available"));
            };
            let now = Instant::now();
            if now >= deadline {
                return Err(pool_error(
                    PoolErrorKind::Timeout,
                    format!(
                        "timed out after {} ms waiting for a connection",
                        self.inner.config.acquire_timeout_ms
                    ),
                ));
            }
            state.waiting += 1;
            let (guard, _) = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            state.waiting -= 1;
        }
    }

    /// Close the pool: release idle connections and refuse new checkouts.
    ///
    /// Connections checked out at this point are released when returned.
    pub fn close(&self) {
        let idle = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.total -= state.idle.len();
            std::mem::take(&mut state.idle)
        };
        tracing::debug!(released = idle.len(), "connection pool closed");
        for conn in idle {
            (self.inner.releaser)(conn);
        }
        self.inner.available.notify_all();
    }

    /// Check if the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

fn pool_error(kind: PoolErrorKind, message: impl Into<String>) -> Error {
    Error::Pool(PoolError {
        kind,
        message: message.into(),
    })
}

impl<C> Drop for PoolInner<C> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for conn in state.idle.drain(..) {
            (self.releaser)(conn);
        }
    }
}

/// A connection borrowed from the pool.
///
/// Returned to the pool's idle list when dropped.
pub struct PooledConnection<C> {
    conn: Option<C>,
    pool: Arc<PoolInner<C>>,
}

impl<C> PooledConnection<C> {
    fn new(conn: C, pool: Arc<PoolInner<C>>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// Take the connection out of the pool for good.
    ///
    /// The pool forgets it and may open a replacement; the caller becomes
    /// responsible for closing it.
    pub fn detach(mut self) -> Option<C> {
        let conn = self.conn.take();
        if conn.is_some() {
            self.pool.forget_one();
        }
        conn
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl<C> std::ops::Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection accessed after detach"),
        }
    }
}

impl<C> std::ops::DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection accessed after detach"),
        }
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}
