//! Test utilities shared by unit tests (in `src/`) and integration tests
//! (in `tests/`).
//!
//! [`MemoryStore`] is a full in-memory implementation of the storage ports
//! with real transaction semantics (buffered writes, commit swaps state,
//! rollback discards), so block-processor scenarios can exercise atomicity
//! and idempotency without PostgreSQL. [`FixtureChainSource`] serves canned
//! blocks for sync-controller tests.

mod chain_fixture;
mod memory_store;

pub use chain_fixture::FixtureChainSource;
pub use memory_store::{MemoryStore, MemoryTx};
