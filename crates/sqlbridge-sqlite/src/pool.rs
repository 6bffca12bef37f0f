//! Pooled SQLite connections.

use crate::config::SqliteConfig;
use crate::connection::SqliteConnection;
use crate::worker::WorkerPool;
use sqlbridge_core::{Connection, Result};
use sqlbridge_pool::{Pool, PoolConfig};

/// Build a pool of connections to the database described by `config`.
///
/// New connections are opened on demand with [`SqliteConnection::open`]; a
/// failed open is logged and reported to the pool as no connection. Retired
/// connections are closed. All connections share `workers`.
///
/// Each in-memory connection has its own private database, so pools are
/// normally used with file locations.
///
/// Opening blocks the acquiring thread, so the pool must not be used from a
/// thread owned by a tokio runtime; opens attempted there fail and surface as
/// an exhausted pool.
pub fn create_pool(
    config: SqliteConfig,
    workers: WorkerPool,
    pool_config: PoolConfig,
) -> Result<Pool<SqliteConnection>> {
    let generator = move || match SqliteConnection::open(config.clone(), workers.clone()) {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::warn!(location = ?config.location, error = %e, "failed to open pooled SQLite connection");
            None
        }
    };
    let releaser = |conn: SqliteConnection| conn.close_connection();
    Pool::new(pool_config, generator, releaser)
}
