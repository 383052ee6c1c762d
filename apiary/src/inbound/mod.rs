//! Driving adapters: the JSON-RPC read gateway.

pub mod http;
