//! Promotion transfers to the burn account.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::error::OpError;
use crate::domain::ops::TransferOp;
use crate::domain::payment::{parse_amount, parse_post_memo, NewPayment};
use crate::domain::ports::{IndexStore, PaymentStore, PostStore};

/// Account whose incoming transfers are treated as post promotion.
pub const BURN_ACCOUNT: &str = "null";

/// Indexes `transfer_operation`.
pub struct PaymentIndexer<S> {
    store: Arc<S>,
}

impl<S: IndexStore> PaymentIndexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record a transfer to the burn account and, when the memo names a
    /// post, add the amount to that post's promoted total. Transfers to any
    /// other account are ignored.
    pub async fn process_transfer(
        &self,
        tx: &mut S::Tx,
        op: &TransferOp,
        block_num: i64,
        tx_idx: i16,
        block_date: DateTime<Utc>,
    ) -> Result<(), OpError> {
        if op.to != BURN_ACCOUNT {
            return Ok(());
        }

        let (amount, token) = parse_amount(&op.amount)
            .ok_or_else(|| OpError::payload(format!("unparseable amount {:?}", op.amount)))?;

        let mut post_id = None;
        if let Some((author, permlink)) = parse_post_memo(&op.memo) {
            if let Some(post) = self
                .store
                .post_by_author_permlink(tx, author, permlink)
                .await?
            {
                self.store.add_post_promoted(tx, post.id, amount).await?;
                post_id = Some(post.id);
            }
        }

        self.store
            .create_payment(
                tx,
                NewPayment {
                    block_num,
                    tx_idx,
                    from_account: op.from.clone(),
                    to_account: op.to.clone(),
                    amount,
                    token,
                    memo: op.memo.clone(),
                    post_id,
                    created_at: block_date,
                },
            )
            .await?;

        debug!(from = %op.from, amount, post_id = ?post_id, "recorded promotion payment");
        Ok(())
    }
}
