//! Append-only notification construction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::error::OpError;
use crate::domain::notification::{NewNotification, NotifyKind, DEFAULT_NOTIFY_SCORE};
use crate::domain::ports::NotificationStore;

/// Optional references attached to a notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyRefs {
    pub src: Option<i64>,
    pub dst: Option<i64>,
    pub community: Option<i64>,
    pub post: Option<i64>,
}

impl NotifyRefs {
    fn is_empty(self) -> bool {
        self.src.is_none() && self.dst.is_none() && self.community.is_none() && self.post.is_none()
    }
}

/// Writes notification rows on behalf of the operation indexers.
pub struct NotificationWriter<S> {
    store: Arc<S>,
}

impl<S> Clone for NotificationWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: NotificationStore> NotificationWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append one notification.
    ///
    /// Every notification references an actor or a target, and an account
    /// never notifies itself; both rules are rejected here as payload
    /// errors so a buggy call site cannot corrupt the table.
    pub async fn write(
        &self,
        tx: &mut S::Tx,
        kind: NotifyKind,
        when: DateTime<Utc>,
        refs: NotifyRefs,
        payload: Option<String>,
        score: Option<i16>,
    ) -> Result<i64, OpError> {
        if refs.is_empty() {
            return Err(OpError::payload("notification carries no references"));
        }
        if let (Some(src), Some(dst)) = (refs.src, refs.dst) {
            if src == dst {
                return Err(OpError::payload("notification src equals dst"));
            }
        }

        let score = score.unwrap_or(DEFAULT_NOTIFY_SCORE);
        let id = self
            .store
            .create_notification(
                tx,
                NewNotification {
                    kind,
                    score,
                    created_at: when,
                    src_id: refs.src,
                    dst_id: refs.dst,
                    community_id: refs.community,
                    post_id: refs.post,
                    payload: payload.clone(),
                },
            )
            .await?;

        // High-volume kinds would flood the log at info level.
        if kind.is_high_volume() {
            debug!(kind = kind.as_str(), src = ?refs.src, dst = ?refs.dst, score, "notify");
        } else {
            info!(
                kind = kind.as_str(),
                src = ?refs.src,
                dst = ?refs.dst,
                community = ?refs.community,
                post = ?refs.post,
                payload = payload.as_deref().unwrap_or(""),
                score,
                "notify"
            );
        }

        Ok(id)
    }
}
