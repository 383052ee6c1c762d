//! Reblog records.

use chrono::{DateTime, Utc};

/// A republication of a root post by another account.
///
/// Keyed by `(account, post_id)`; inserts are idempotent. Only root posts may
/// be reblogged — the indexer drops attempts against comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reblog {
    pub account: String,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}
