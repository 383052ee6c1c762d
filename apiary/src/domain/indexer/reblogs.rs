//! Reblog and un-reblog handling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::error::OpError;
use crate::domain::notification::NotifyKind;
use crate::domain::ops::ReblogOp;
use crate::domain::ports::{AccountStore, FeedCacheStore, IndexStore, PostStore, ReblogStore};
use crate::domain::reblog::Reblog;

use super::notify::{NotificationWriter, NotifyRefs};

/// Indexes reblog payloads carried under the `follow` custom-json id.
pub struct ReblogIndexer<S> {
    store: Arc<S>,
    notify: NotificationWriter<S>,
}

impl<S: IndexStore> ReblogIndexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        let notify = NotificationWriter::new(Arc::clone(&store));
        Self { store, notify }
    }

    /// Apply a reblog or its delete variant.
    ///
    /// Only root posts participate; an attempt against a comment is dropped
    /// without error. Feed-cache writes are suppressed during initial sync
    /// (the rebuild recreates them from the reblog rows).
    pub async fn process_reblog(
        &self,
        tx: &mut S::Tx,
        actor: &str,
        op: &ReblogOp,
        block_date: DateTime<Utc>,
        is_initial_sync: bool,
    ) -> Result<(), OpError> {
        if op.author.is_empty() || op.permlink.is_empty() {
            return Err(OpError::payload("reblog without author or permlink"));
        }

        let post = self
            .store
            .post_by_author_permlink(tx, &op.author, &op.permlink)
            .await?
            .ok_or_else(|| OpError::UnknownPost {
                author: op.author.clone(),
                permlink: op.permlink.clone(),
            })?;
        if !post.is_root() {
            warn!(author = %op.author, permlink = %op.permlink, "reblog of non-root post dropped");
            return Ok(());
        }

        let account = self
            .store
            .account_by_name(tx, actor)
            .await?
            .ok_or_else(|| OpError::UnknownAccount(actor.to_owned()))?;

        if op.is_delete() {
            self.store.delete_reblog(tx, actor, post.id).await?;
            if !is_initial_sync {
                self.store
                    .feed_cache_delete(tx, post.id, Some(account.id))
                    .await?;
            }
            debug!(account = %actor, post_id = post.id, "deleted reblog");
            return Ok(());
        }

        let created = self
            .store
            .create_reblog(
                tx,
                &Reblog {
                    account: actor.to_owned(),
                    post_id: post.id,
                    created_at: block_date,
                },
            )
            .await?;
        if !created {
            // Duplicate reblog; the unique key already holds the row.
            return Ok(());
        }

        if !is_initial_sync {
            self.store
                .feed_cache_insert(tx, post.id, account.id, block_date)
                .await?;
        }

        if let Some(author) = self.store.account_by_name(tx, &op.author).await? {
            if author.id != account.id {
                self.notify
                    .write(
                        tx,
                        NotifyKind::Reblog,
                        block_date,
                        NotifyRefs {
                            src: Some(account.id),
                            dst: Some(author.id),
                            post: Some(post.id),
                            community: None,
                        },
                        None,
                        None,
                    )
                    .await?;
            }
        }

        debug!(account = %actor, post_id = post.id, "created reblog");
        Ok(())
    }
}
