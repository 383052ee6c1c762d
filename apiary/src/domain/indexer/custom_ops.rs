//! Routing for `custom_json_operation` payloads.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::domain::community::COMMUNITY_START_BLOCK;
use crate::domain::error::OpError;
use crate::domain::ops::{CommunityAction, CustomJsonBody, FollowDialect, NotifyOp};
use crate::domain::ports::{AccountStore, IndexStore, StoreError, BLOCK_TIMESTAMP_FORMAT};

use super::communities::CommunityIndexer;
use super::follows::{FollowCounterDeltas, FollowIndexer};
use super::reblogs::ReblogIndexer;

/// Custom-json ids the indexer understands; everything else is ignored.
const KNOWN_IDS: [&str; 3] = ["follow", "community", "notify"];

/// Dispatches deferred custom-json operations at end of block.
pub struct CustomOpRouter<S> {
    store: Arc<S>,
    follows: FollowIndexer<S>,
    reblogs: ReblogIndexer<S>,
    communities: CommunityIndexer<S>,
}

impl<S: IndexStore> CustomOpRouter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            follows: FollowIndexer::new(Arc::clone(&store)),
            reblogs: ReblogIndexer::new(Arc::clone(&store)),
            communities: CommunityIndexer::new(Arc::clone(&store)),
            store,
        }
    }

    /// Drain a block's custom-json operations in order.
    ///
    /// Semantic failures are contained per operation; storage failures abort
    /// the block.
    pub async fn process_ops(
        &self,
        tx: &mut S::Tx,
        ops: &[CustomJsonBody],
        block_num: i64,
        block_date: DateTime<Utc>,
        is_initial_sync: bool,
        deltas: &mut FollowCounterDeltas,
    ) -> Result<(), StoreError> {
        for op in ops {
            if !KNOWN_IDS.contains(&op.id.as_str()) {
                continue;
            }
            let Some(actor) = op.actor() else {
                warn!(
                    id = %op.id,
                    auths = op.required_posting_auths.len(),
                    "custom_json with unexpected posting auths dropped"
                );
                continue;
            };
            if op.json.is_empty() {
                continue;
            }

            let result = match op.id.as_str() {
                "follow" => {
                    self.process_follow_id(tx, actor, &op.json, block_date, is_initial_sync, deltas)
                        .await
                }
                "community" if block_num > COMMUNITY_START_BLOCK => {
                    self.process_community_id(tx, actor, &op.json, block_date).await
                }
                "community" => Ok(()),
                "notify" => self.process_notify_id(tx, actor, &op.json, block_date).await,
                _ => Ok(()),
            };

            if let Err(error) = result {
                if error.is_fatal() {
                    let OpError::Store(store_error) = error else {
                        unreachable!("fatal op errors are store errors");
                    };
                    return Err(store_error);
                }
                warn!(id = %op.id, actor = %actor, %error, "custom_json op skipped");
            }
        }
        Ok(())
    }

    async fn process_follow_id(
        &self,
        tx: &mut S::Tx,
        actor: &str,
        json: &str,
        block_date: DateTime<Utc>,
        is_initial_sync: bool,
        deltas: &mut FollowCounterDeltas,
    ) -> Result<(), OpError> {
        match FollowDialect::parse(json)? {
            FollowDialect::Follow(op) => {
                self.follows
                    .process_follow(tx, actor, &op, block_date, deltas)
                    .await
            }
            FollowDialect::Reblog(op) => {
                self.reblogs
                    .process_reblog(tx, actor, &op, block_date, is_initial_sync)
                    .await
            }
        }
    }

    async fn process_community_id(
        &self,
        tx: &mut S::Tx,
        actor: &str,
        json: &str,
        block_date: DateTime<Utc>,
    ) -> Result<(), OpError> {
        let action = CommunityAction::parse(json)?;
        self.communities
            .process_action(tx, actor, &action, block_date)
            .await
    }

    async fn process_notify_id(
        &self,
        tx: &mut S::Tx,
        actor: &str,
        json: &str,
        block_date: DateTime<Utc>,
    ) -> Result<(), OpError> {
        let NotifyOp::SetLastRead { date } = NotifyOp::parse(json)?;
        let read_at = parse_lastread_date(&date)
            .ok_or_else(|| OpError::payload(format!("unparseable setLastRead date {date:?}")))?;
        // A watermark in the future would hide notifications not yet written.
        let read_at = read_at.min(block_date);
        self.store.set_account_lastread(tx, actor, read_at).await?;
        debug!(account = %actor, %read_at, "set last read");
        Ok(())
    }
}

/// Accept both the chain's zoneless timestamps and full RFC 3339.
fn parse_lastread_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, BLOCK_TIMESTAMP_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lastread_accepts_zoneless_and_rfc3339() {
        let naive = parse_lastread_date("2020-01-02T03:04:05").expect("parses");
        assert_eq!(naive.to_rfc3339(), "2020-01-02T03:04:05+00:00");

        let zoned = parse_lastread_date("2020-01-02T03:04:05+02:00").expect("parses");
        assert_eq!(zoned.to_rfc3339(), "2020-01-02T01:04:05+00:00");

        assert!(parse_lastread_date("yesterday").is_none());
    }
}
