//! PostgreSQL persistence adapter.

mod diesel_store;
mod models;
mod pool;
pub mod schema;

pub use diesel_store::DieselStore;
pub use pool::{build_pool, DbConn, DbPool, PoolConfig};
