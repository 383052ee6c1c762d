//! Upstream chain node adapter.

mod dto;
mod http_source;

pub use http_source::SteemHttpSource;
