//! Driven adapters: chain RPC client, PostgreSQL store, Redis cache.

pub mod cache;
pub mod chain;
pub mod persistence;
