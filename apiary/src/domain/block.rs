//! Persisted block records.

use chrono::{DateTime, Utc};

/// A processed block as recorded in the projection.
///
/// Block numbers are dense and strictly increasing from the genesis cursor;
/// the sync controller never skips a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub num: i64,
    /// 40-hex block id.
    pub hash: String,
    /// 40-hex id of the preceding block.
    pub prev: Option<String>,
    pub txs: i16,
    pub ops: i16,
    pub created_at: DateTime<Utc>,
}
