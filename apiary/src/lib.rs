//! Apiary library modules.
//!
//! The crate splits along ports-and-adapters lines: `domain` owns entities,
//! ports, and the indexing services; `outbound` owns driven adapters (chain
//! RPC, PostgreSQL, Redis); `inbound` owns the JSON-RPC read gateway.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod test_support;
