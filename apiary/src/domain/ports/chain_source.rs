//! Driven port for the upstream chain node.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::define_port_error;

/// Upper bound accepted by `get_accounts`.
pub const GET_ACCOUNTS_MAX: usize = 1000;

/// Chain timestamps carry no zone and are interpreted as UTC.
pub const BLOCK_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

define_port_error! {
    /// Errors raised by the chain source adapter.
    pub enum ChainSourceError {
        /// The node was unreachable or timed out; retryable.
        Transport { message: String } =>
            "chain transport failed: {message}",
        /// The node answered with an RPC-level or HTTP-level rejection.
        Rejected { message: String } =>
            "chain request rejected: {message}",
        /// The response body did not match the expected shape.
        Decode { message: String } =>
            "chain response decode failed: {message}",
    }
}

impl ChainSourceError {
    /// Transport failures are transient by definition; the sync controller
    /// retries them after its poll interval.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// A block as delivered by the upstream node.
///
/// Operations stay as `(type_name, body)` tuples until an indexer parses the
/// classes it understands; everything else is ignored without decoding.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BlockPayload {
    /// Not part of the node's block body; the adapter stamps the requested
    /// number onto the payload.
    #[serde(default)]
    pub block_num: i64,
    pub block_id: String,
    #[serde(default)]
    pub previous: String,
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<TransactionPayload>,
    #[serde(default)]
    pub transaction_ids: Vec<String>,
}

/// One transaction inside a block payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionPayload {
    #[serde(default)]
    pub operations: Vec<(String, Value)>,
}

/// An operation located within its block, in decoder order.
#[derive(Debug, Clone, Copy)]
pub struct DecodedOp<'a> {
    pub tx_idx: usize,
    pub op_idx: usize,
    pub kind: &'a str,
    pub body: &'a Value,
}

impl BlockPayload {
    /// Parse the block timestamp (naive, treated as UTC).
    pub fn timestamp_utc(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDateTime::parse_from_str(&self.timestamp, BLOCK_TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
    }

    /// Yield operations in stable order: transactions by index, operations
    /// by position within their transaction.
    pub fn decoded_ops(&self) -> impl Iterator<Item = DecodedOp<'_>> {
        self.transactions
            .iter()
            .enumerate()
            .flat_map(|(tx_idx, transaction)| {
                transaction
                    .operations
                    .iter()
                    .enumerate()
                    .map(move |(op_idx, (kind, body))| DecodedOp {
                        tx_idx,
                        op_idx,
                        kind: kind.as_str(),
                        body,
                    })
            })
    }

    /// Transaction ids zipped with transaction indices; the shorter side
    /// wins when the node returns mismatched arrays.
    pub fn zipped_tx_ids(&self) -> impl Iterator<Item = (usize, &str)> {
        self.transaction_ids
            .iter()
            .take(self.transactions.len())
            .enumerate()
            .map(|(tx_idx, id)| (tx_idx, id.as_str()))
    }

    pub fn tx_count(&self) -> i16 {
        clamp_count(self.transactions.len())
    }

    pub fn op_count(&self) -> i16 {
        clamp_count(self.decoded_ops().count())
    }
}

fn clamp_count(count: usize) -> i16 {
    i16::try_from(count).unwrap_or(i16::MAX)
}

/// Read access to the upstream node.
///
/// Batched fetches are all-or-none: a partial upstream answer surfaces as an
/// error rather than a short vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetch one block; `None` when the node has no block at `num` yet.
    async fn get_block(&self, num: i64) -> Result<Option<BlockPayload>, ChainSourceError>;

    /// Fetch the inclusive range `[from, to]`; `to - from + 1` must respect
    /// the configured batch bound.
    async fn get_blocks_range(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<BlockPayload>, ChainSourceError>;

    /// Number of the last irreversible block.
    async fn last_irreversible(&self) -> Result<i64, ChainSourceError>;

    /// Number of the current (reversible) head block.
    async fn head_block(&self) -> Result<i64, ChainSourceError>;

    /// Raw account objects for up to [`GET_ACCOUNTS_MAX`] names.
    async fn get_accounts(&self, names: &[String]) -> Result<Vec<Value>, ChainSourceError>;

    /// Raw content object for one post.
    async fn get_content(&self, author: &str, permlink: &str)
        -> Result<Value, ChainSourceError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload_with_ops() -> BlockPayload {
        serde_json::from_value(json!({
            "block_num": 100,
            "block_id": "00000064aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "previous": "00000063aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "timestamp": "2019-06-01T12:00:00",
            "transactions": [
                { "operations": [["vote_operation", {"voter": "a"}], ["custom_json_operation", {}]] },
                { "operations": [["comment_operation", {"author": "b"}]] }
            ],
            "transaction_ids": ["aa11", "bb22", "orphan"]
        }))
        .expect("valid payload")
    }

    #[test]
    fn ops_iterate_in_decoder_order() {
        let block = payload_with_ops();
        let kinds: Vec<(usize, usize, &str)> = block
            .decoded_ops()
            .map(|op| (op.tx_idx, op.op_idx, op.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (0, 0, "vote_operation"),
                (0, 1, "custom_json_operation"),
                (1, 0, "comment_operation"),
            ]
        );
        assert_eq!(block.tx_count(), 2);
        assert_eq!(block.op_count(), 3);
    }

    #[test]
    fn tx_id_zip_stops_at_shorter_side() {
        let block = payload_with_ops();
        let ids: Vec<(usize, &str)> = block.zipped_tx_ids().collect();
        assert_eq!(ids, vec![(0, "aa11"), (1, "bb22")]);
    }

    #[test]
    fn timestamp_parses_as_utc() {
        let block = payload_with_ops();
        let when = block.timestamp_utc().expect("valid timestamp");
        assert_eq!(when.to_rfc3339(), "2019-06-01T12:00:00+00:00");
    }

    #[test]
    fn zoneless_timestamp_is_required() {
        let mut block = payload_with_ops();
        block.timestamp = "2019-06-01T12:00:00Z".to_owned();
        assert!(block.timestamp_utc().is_err());
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(ChainSourceError::transport("timeout").is_retryable());
        assert!(!ChainSourceError::rejected("bad params").is_retryable());
        assert!(!ChainSourceError::decode("no block field").is_retryable());
    }
}
