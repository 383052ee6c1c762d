//! Transaction-scoped block application.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::block::BlockRecord;
use crate::domain::error::OpError;
use crate::domain::ops::{
    created_account_name, CommentOp, CustomJsonBody, DeleteCommentOp, TransferOp, VoteOp,
};
use crate::domain::ports::{
    BlockPayload, BlockStore, DecodedOp, IndexStore, Storage, StoreError,
};

use super::accounts::AccountIndexer;
use super::communities::CommunityIndexer;
use super::custom_ops::CustomOpRouter;
use super::follows::FollowCounterDeltas;
use super::payments::PaymentIndexer;
use super::posts::PostIndexer;

/// A block-level failure; always aborts the enclosing transaction.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// The block envelope is malformed; retrying the same payload will not
    /// help, so the sync controller backs off and alerts.
    #[error("block decode failed: {message}")]
    Decode { message: String },
    /// Storage failed; the block is retried after rollback.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BlockError {
    fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// Side effects a committed block hands back to the sync controller.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BlockOutcome {
    pub block_num: i64,
    /// Accounts needing a chain refresh (votes, profile updates).
    pub dirty_accounts: BTreeSet<String>,
    /// Posts needing a post-cache refresh.
    pub dirty_posts: BTreeSet<(String, String)>,
}

/// Per-block accumulator threaded through dispatch.
#[derive(Default)]
struct Scratch {
    new_accounts: BTreeSet<String>,
    json_ops: Vec<CustomJsonBody>,
    dirty_accounts: BTreeSet<String>,
    dirty_posts: BTreeSet<(String, String)>,
}

/// Applies one block inside one storage transaction.
///
/// Operation-level failures are logged and skipped so a single piece of
/// historical junk cannot stall the chain cursor; storage failures roll the
/// whole block back.
pub struct BlockProcessor<S> {
    store: Arc<S>,
    accounts: AccountIndexer<S>,
    posts: PostIndexer<S>,
    payments: PaymentIndexer<S>,
    communities: CommunityIndexer<S>,
    custom_ops: CustomOpRouter<S>,
}

impl<S: IndexStore> BlockProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            accounts: AccountIndexer::new(Arc::clone(&store)),
            posts: PostIndexer::new(Arc::clone(&store)),
            payments: PaymentIndexer::new(Arc::clone(&store)),
            communities: CommunityIndexer::new(Arc::clone(&store)),
            custom_ops: CustomOpRouter::new(Arc::clone(&store)),
            store,
        }
    }

    /// Process one block: all of its effects become visible atomically at
    /// commit, or not at all.
    pub async fn process_block(
        &self,
        block: &BlockPayload,
        is_initial_sync: bool,
    ) -> Result<BlockOutcome, BlockError> {
        let block_date = validate_envelope(block)?;

        let mut tx = self.store.begin().await?;
        match self.apply(&mut tx, block, block_date, is_initial_sync).await {
            Ok(outcome) => {
                self.store.commit(tx).await?;
                Ok(outcome)
            }
            Err(error) => {
                if let Err(rollback_error) = self.store.rollback(tx).await {
                    warn!(%rollback_error, block_num = block.block_num, "rollback failed");
                }
                Err(error)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut S::Tx,
        block: &BlockPayload,
        block_date: DateTime<Utc>,
        is_initial_sync: bool,
    ) -> Result<BlockOutcome, BlockError> {
        self.store
            .create_block(
                tx,
                &BlockRecord {
                    num: block.block_num,
                    hash: block.block_id.clone(),
                    prev: (!block.previous.is_empty()).then(|| block.previous.clone()),
                    txs: 0,
                    ops: 0,
                    created_at: block_date,
                },
            )
            .await?;

        let mut scratch = Scratch::default();
        for op in block.decoded_ops() {
            if let Err(error) = self
                .dispatch(tx, &op, block, block_date, is_initial_sync, &mut scratch)
                .await
            {
                if error.is_fatal() {
                    let OpError::Store(store_error) = error else {
                        unreachable!("fatal op errors are store errors");
                    };
                    return Err(store_error.into());
                }
                warn!(
                    kind = op.kind,
                    block_num = block.block_num,
                    tx_idx = op.tx_idx,
                    op_idx = op.op_idx,
                    %error,
                    "operation skipped"
                );
            }
        }

        self.store
            .update_block_counts(tx, block.block_num, block.tx_count(), block.op_count())
            .await?;

        let mut deltas = FollowCounterDeltas::default();
        self.custom_ops
            .process_ops(
                tx,
                &scratch.json_ops,
                block.block_num,
                block_date,
                is_initial_sync,
                &mut deltas,
            )
            .await?;

        let created = self
            .accounts
            .register(tx, &scratch.new_accounts, block_date)
            .await?;
        if !created.is_empty() {
            self.communities
                .register_new_accounts(tx, &created, block_date)
                .await?;
        }

        deltas.flush(self.store.as_ref(), tx).await?;

        let tx_ids: Vec<(String, i64)> = block
            .zipped_tx_ids()
            .filter(|(_, id)| !id.is_empty())
            .map(|(_, id)| (id.to_owned(), block.block_num))
            .collect();
        self.store.insert_tx_ids(tx, &tx_ids).await?;

        Ok(BlockOutcome {
            block_num: block.block_num,
            dirty_accounts: scratch.dirty_accounts,
            dirty_posts: scratch.dirty_posts,
        })
    }

    async fn dispatch(
        &self,
        tx: &mut S::Tx,
        op: &DecodedOp<'_>,
        block: &BlockPayload,
        block_date: DateTime<Utc>,
        is_initial_sync: bool,
        scratch: &mut Scratch,
    ) -> Result<(), OpError> {
        if let Some(name) = created_account_name(op.kind, op.body) {
            scratch.new_accounts.insert(name);
            return Ok(());
        }

        match op.kind {
            "account_update_operation" | "account_update2_operation" => {
                if !is_initial_sync {
                    if let Some(account) = op.body.get("account").and_then(|v| v.as_str()) {
                        scratch.dirty_accounts.insert(account.to_owned());
                    }
                }
            }
            "comment_operation" => {
                let parsed: CommentOp = parse_body(op.body)?;
                self.posts
                    .process_comment(tx, &parsed, block_date, is_initial_sync)
                    .await?;
                if !is_initial_sync {
                    scratch
                        .dirty_posts
                        .insert((parsed.author, parsed.permlink));
                }
            }
            "delete_comment_operation" => {
                let parsed: DeleteCommentOp = parse_body(op.body)?;
                self.posts.process_delete(tx, &parsed, is_initial_sync).await?;
            }
            "vote_operation" => {
                if !is_initial_sync {
                    let parsed: VoteOp = parse_body(op.body)?;
                    scratch.dirty_accounts.insert(parsed.voter);
                    scratch.dirty_accounts.insert(parsed.author.clone());
                    scratch.dirty_posts.insert((parsed.author, parsed.permlink));
                }
            }
            "transfer_operation" => {
                let parsed: TransferOp = parse_body(op.body)?;
                let tx_idx = i16::try_from(op.tx_idx).unwrap_or(i16::MAX);
                self.payments
                    .process_transfer(tx, &parsed, block.block_num, tx_idx, block_date)
                    .await?;
            }
            "custom_json_operation" => {
                let parsed: CustomJsonBody = parse_body(op.body)?;
                scratch.json_ops.push(parsed);
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &serde_json::Value) -> Result<T, OpError> {
    serde_json::from_value(body.clone())
        .map_err(|err| OpError::payload(format!("bad operation body: {err}")))
}

fn validate_envelope(block: &BlockPayload) -> Result<DateTime<Utc>, BlockError> {
    if block.block_num <= 0 {
        return Err(BlockError::decode(format!(
            "non-positive block number {}",
            block.block_num
        )));
    }
    if !is_hex40(&block.block_id) {
        return Err(BlockError::decode(format!(
            "block id is not 40-hex: {:?}",
            block.block_id
        )));
    }
    if !block.previous.is_empty() && !is_hex40(&block.previous) {
        return Err(BlockError::decode(format!(
            "previous id is not 40-hex: {:?}",
            block.previous
        )));
    }
    block
        .timestamp_utc()
        .map_err(|err| BlockError::decode(format!("bad timestamp {:?}: {err}", block.timestamp)))
}

fn is_hex40(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|byte| byte.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(num: i64, id: &str, timestamp: &str) -> BlockPayload {
        serde_json::from_value(json!({
            "block_num": num,
            "block_id": id,
            "previous": "",
            "timestamp": timestamp,
        }))
        .expect("valid payload")
    }

    #[test]
    fn envelope_validation_rejects_bad_ids_and_timestamps() {
        let good_id = "00000064aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        assert!(validate_envelope(&envelope(100, good_id, "2019-06-01T12:00:00")).is_ok());
        assert!(validate_envelope(&envelope(0, good_id, "2019-06-01T12:00:00")).is_err());
        assert!(validate_envelope(&envelope(100, "short", "2019-06-01T12:00:00")).is_err());
        assert!(validate_envelope(&envelope(100, good_id, "June 1st")).is_err());
    }
}
