//! Follow state changes and follower-count bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::error::OpError;
use crate::domain::follow::{Follow, FollowState};
use crate::domain::ops::FollowOp;
use crate::domain::ports::{AccountStore, FollowStore, IndexStore, StoreError};

/// Follower/following count deltas accumulated over a block and applied in
/// one pass inside the block's transaction.
#[derive(Debug, Default)]
pub struct FollowCounterDeltas {
    // account id -> (followers delta, following delta)
    deltas: HashMap<i64, (i64, i64)>,
}

impl FollowCounterDeltas {
    /// Record a blog-bit transition: `follower` gained/lost a following,
    /// `following` gained/lost a follower.
    pub fn record(&mut self, follower_id: i64, following_id: i64, delta: i64) {
        self.deltas.entry(following_id).or_default().0 += delta;
        self.deltas.entry(follower_id).or_default().1 += delta;
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Apply and clear the accumulated deltas.
    pub async fn flush<S: AccountStore>(
        &mut self,
        store: &S,
        tx: &mut S::Tx,
    ) -> Result<(), StoreError> {
        for (account_id, (followers, following)) in self.deltas.drain() {
            if followers == 0 && following == 0 {
                continue;
            }
            store
                .adjust_follow_counts(tx, account_id, followers, following)
                .await?;
        }
        Ok(())
    }
}

/// Indexes follow-state operations.
pub struct FollowIndexer<S> {
    store: Arc<S>,
}

impl<S: IndexStore> FollowIndexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Upsert the `(follower, following)` edge with the state computed from
    /// `what`, recording counter deltas for the block flush.
    pub async fn process_follow(
        &self,
        tx: &mut S::Tx,
        actor: &str,
        op: &FollowOp,
        block_date: DateTime<Utc>,
        deltas: &mut FollowCounterDeltas,
    ) -> Result<(), OpError> {
        if op.follower.is_empty() || op.following.is_empty() {
            return Err(OpError::payload("follow without follower or following"));
        }
        if op.follower != actor {
            return Err(OpError::ActorMismatch {
                claimed: op.follower.clone(),
                actor: actor.to_owned(),
            });
        }
        if op.follower == op.following {
            return Err(OpError::payload("account cannot follow itself"));
        }

        let follower = self
            .store
            .account_by_name(tx, &op.follower)
            .await?
            .ok_or_else(|| OpError::UnknownAccount(op.follower.clone()))?;
        let following = self
            .store
            .account_by_name(tx, &op.following)
            .await?
            .ok_or_else(|| OpError::UnknownAccount(op.following.clone()))?;

        let new_state = FollowState::from_what(&op.what);
        let existing = self.store.follow_between(tx, follower.id, following.id).await?;
        let old_state = existing.as_ref().map(|edge| edge.state).unwrap_or_default();

        self.store
            .upsert_follow(
                tx,
                &Follow {
                    follower_id: follower.id,
                    following_id: following.id,
                    state: new_state,
                    created_at: existing
                        .as_ref()
                        .map(|edge| edge.created_at)
                        .unwrap_or(block_date),
                },
            )
            .await?;

        match (old_state.follows_blog(), new_state.follows_blog()) {
            (false, true) => deltas.record(follower.id, following.id, 1),
            (true, false) => deltas.record(follower.id, following.id, -1),
            _ => {}
        }

        debug!(
            follower = %op.follower,
            following = %op.following,
            state = new_state.0,
            "processed follow"
        );
        Ok(())
    }
}
