//! Async-safe connection pool for Diesel PostgreSQL connections.
//!
//! Wraps `diesel-async` and `bb8`. Checkout is non-blocking and respects the
//! configured timeout; errors are mapped to the domain store error before
//! they cross the port boundary.

use std::time::Duration;

use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

use crate::domain::ports::StoreError;

/// Shared PostgreSQL pool handle.
pub type DbPool = Pool<AsyncPgConnection>;

/// A connection owned for the life of a transaction.
pub type DbConn = PooledConnection<'static, AsyncPgConnection>;

/// Pool sizing and checkout limits.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub database_url: String,
    pub max_size: u32,
    pub connection_timeout: Duration,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_size: 10,
            connection_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }
}

/// Build the connection pool.
///
/// # Errors
///
/// Returns a connection error when the pool cannot be constructed.
pub async fn build_pool(config: &PoolConfig) -> Result<DbPool, StoreError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
    Pool::builder()
        .max_size(config.max_size)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .await
        .map_err(|err| StoreError::connection(err.to_string()))
}

/// Map a checkout failure onto the store error taxonomy.
pub fn map_checkout_error(error: impl std::fmt::Display) -> StoreError {
    StoreError::connection(error.to_string())
}
