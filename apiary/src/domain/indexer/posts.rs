//! Post lifecycle: creation, edits, resurrection, deletion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::error::OpError;
use crate::domain::notification::NotifyKind;
use crate::domain::ops::{CommentOp, DeleteCommentOp};
use crate::domain::ports::{AccountStore, FeedCacheStore, IndexStore, PostStore};
use crate::domain::post::{normalize_category, NewPost};

use super::notify::{NotificationWriter, NotifyRefs};

/// What a `comment_operation` did to the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentOutcome {
    Created,
    Edited,
    Resurrected,
}

/// Indexes `comment_operation` and `delete_comment_operation`.
pub struct PostIndexer<S> {
    store: Arc<S>,
    notify: NotificationWriter<S>,
}

impl<S: IndexStore> PostIndexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        let notify = NotificationWriter::new(Arc::clone(&store));
        Self { store, notify }
    }

    /// Apply a comment operation.
    ///
    /// An existing deleted row is resurrected with a fresh creation time; an
    /// existing live row is an edit (content refresh flows through the post
    /// cache, not this path). A new root post lands in its author's feed.
    pub async fn process_comment(
        &self,
        tx: &mut S::Tx,
        op: &CommentOp,
        block_date: DateTime<Utc>,
        is_initial_sync: bool,
    ) -> Result<CommentOutcome, OpError> {
        if op.author.is_empty() || op.permlink.is_empty() {
            return Err(OpError::payload("comment without author or permlink"));
        }

        if let Some(existing) = self
            .store
            .post_by_author_permlink(tx, &op.author, &op.permlink)
            .await?
        {
            if !existing.is_deleted {
                return Ok(CommentOutcome::Edited);
            }
            self.store.resurrect_post(tx, existing.id, block_date).await?;
            if existing.is_root() && !is_initial_sync {
                let author_id = self.author_id(tx, &op.author).await?;
                self.store
                    .feed_cache_insert(tx, existing.id, author_id, block_date)
                    .await?;
            }
            debug!(author = %op.author, permlink = %op.permlink, "resurrected post");
            return Ok(CommentOutcome::Resurrected);
        }

        let parent = if op.is_root() {
            None
        } else {
            let parent = self
                .store
                .post_by_author_permlink(tx, &op.parent_author, &op.parent_permlink)
                .await?
                .ok_or_else(|| OpError::UnknownPost {
                    author: op.parent_author.clone(),
                    permlink: op.parent_permlink.clone(),
                })?;
            Some(parent)
        };

        let new_post = match &parent {
            None => NewPost {
                parent_id: None,
                author: op.author.clone(),
                permlink: op.permlink.clone(),
                category: normalize_category(&op.json_metadata),
                community_id: None,
                created_at: block_date,
                depth: 0,
                is_muted: false,
                is_valid: true,
            },
            Some(parent) => NewPost {
                parent_id: Some(parent.id),
                author: op.author.clone(),
                permlink: op.permlink.clone(),
                category: parent.category.clone(),
                community_id: parent.community_id,
                created_at: block_date,
                depth: parent.depth + 1,
                is_muted: parent.is_muted,
                is_valid: parent.is_valid,
            },
        };
        let depth = new_post.depth;
        let post_id = self.store.create_post(tx, new_post).await?;

        if depth == 0 && !is_initial_sync {
            let author_id = self.author_id(tx, &op.author).await?;
            self.store
                .feed_cache_insert(tx, post_id, author_id, block_date)
                .await?;
        }

        if let Some(parent) = parent {
            self.notify_reply(tx, op, &parent.author, parent.depth, post_id, block_date)
                .await?;
        }

        debug!(author = %op.author, permlink = %op.permlink, depth, "created post");
        Ok(CommentOutcome::Created)
    }

    /// Mark a post deleted and drop its feed entries (the author's and every
    /// reblogger's).
    pub async fn process_delete(
        &self,
        tx: &mut S::Tx,
        op: &DeleteCommentOp,
        is_initial_sync: bool,
    ) -> Result<(), OpError> {
        let Some(post) = self
            .store
            .post_by_author_permlink(tx, &op.author, &op.permlink)
            .await?
        else {
            return Ok(());
        };

        self.store.set_post_deleted(tx, post.id).await?;
        if post.is_root() && !is_initial_sync {
            self.store.feed_cache_delete(tx, post.id, None).await?;
        }
        debug!(author = %op.author, permlink = %op.permlink, "deleted post");
        Ok(())
    }

    async fn author_id(&self, tx: &mut S::Tx, author: &str) -> Result<i64, OpError> {
        self.store
            .account_by_name(tx, author)
            .await?
            .map(|account| account.id)
            .ok_or_else(|| OpError::UnknownAccount(author.to_owned()))
    }

    /// A comment on a root post notifies `reply`; a comment on a comment
    /// notifies `reply_comment`. Exactly one fires per new comment, and
    /// self-replies stay silent.
    async fn notify_reply(
        &self,
        tx: &mut S::Tx,
        op: &CommentOp,
        parent_author: &str,
        parent_depth: i16,
        post_id: i64,
        block_date: DateTime<Utc>,
    ) -> Result<(), OpError> {
        if op.author == *parent_author {
            return Ok(());
        }
        let (Some(author), Some(parent_account)) = (
            self.store.account_by_name(tx, &op.author).await?,
            self.store.account_by_name(tx, parent_author).await?,
        ) else {
            return Ok(());
        };

        let kind = if parent_depth == 0 {
            NotifyKind::Reply
        } else {
            NotifyKind::ReplyComment
        };
        self.notify
            .write(
                tx,
                kind,
                block_date,
                NotifyRefs {
                    src: Some(author.id),
                    dst: Some(parent_account.id),
                    post: Some(post_id),
                    community: None,
                },
                None,
                None,
            )
            .await?;
        Ok(())
    }
}
