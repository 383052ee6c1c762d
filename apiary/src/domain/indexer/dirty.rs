//! Dirty-set flushing: asynchronous refresh of accounts and post caches.
//!
//! Votes and profile updates do not mutate projection rows on the hot path;
//! they mark the touched account/post dirty, and this sidecar refreshes the
//! rows from the chain outside the block transaction. The sync loop never
//! blocks on a flush.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::account::AccountProfile;
use crate::domain::payment::parse_amount;
use crate::domain::ports::{
    AccountStore, ChainSource, IndexStore, PostCacheStore, PostStore, Storage,
    BLOCK_TIMESTAMP_FORMAT, GET_ACCOUNTS_MAX,
};
use crate::domain::post_cache::{ranking_score, PostCacheEntry, HOT_TIMESCALE, TREND_TIMESCALE};

use super::block_processor::BlockOutcome;

/// One entity awaiting refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DirtyItem {
    Account(String),
    Post { author: String, permlink: String },
}

/// Bounded FIFO with membership dedup.
///
/// When full, the oldest entry is evicted: a stale refresh target is worth
/// less than a fresh one, and the next vote on it will re-mark it anyway.
#[derive(Debug)]
pub struct DirtyQueue {
    seen: HashSet<DirtyItem>,
    queue: VecDeque<DirtyItem>,
    capacity: usize,
    evicted: u64,
}

impl DirtyQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    pub fn push(&mut self, item: DirtyItem) {
        if !self.seen.insert(item.clone()) {
            return;
        }
        if self.queue.len() >= self.capacity {
            if let Some(oldest) = self.queue.pop_front() {
                self.seen.remove(&oldest);
                self.evicted += 1;
            }
        }
        self.queue.push_back(item);
    }

    pub fn drain(&mut self, max: usize) -> Vec<DirtyItem> {
        let take = max.min(self.queue.len());
        let drained: Vec<DirtyItem> = self.queue.drain(..take).collect();
        for item in &drained {
            self.seen.remove(item);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Entries dropped because the queue was full.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

/// Sender half handed to the sync controller.
#[derive(Clone)]
pub struct DirtyHandle {
    tx: mpsc::Sender<Vec<DirtyItem>>,
}

impl DirtyHandle {
    /// Submit a committed block's dirty set without blocking; when the
    /// sidecar is saturated the batch is dropped and the next touch
    /// re-marks the rows.
    pub fn submit(&self, outcome: &BlockOutcome) {
        let mut items: Vec<DirtyItem> = Vec::new();
        items.extend(
            outcome
                .dirty_accounts
                .iter()
                .cloned()
                .map(DirtyItem::Account),
        );
        items.extend(outcome.dirty_posts.iter().cloned().map(|(author, permlink)| {
            DirtyItem::Post { author, permlink }
        }));
        if items.is_empty() {
            return;
        }
        if let Err(error) = self.tx.try_send(items) {
            warn!(%error, "dirty flusher saturated, batch dropped");
        }
    }
}

/// Background refresher over the chain source.
pub struct DirtyFlusher<S, C> {
    store: Arc<S>,
    chain: Arc<C>,
    queue: DirtyQueue,
    rx: mpsc::Receiver<Vec<DirtyItem>>,
}

/// Batches drained per flush pass.
const FLUSH_CHUNK: usize = 200;

impl<S, C> DirtyFlusher<S, C>
where
    S: IndexStore + 'static,
    C: ChainSource + 'static,
{
    /// Spawn the sidecar; the handle feeds it, the join handle ends when
    /// every sender is dropped.
    pub fn spawn(store: Arc<S>, chain: Arc<C>, capacity: usize) -> (DirtyHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let flusher = Self {
            store,
            chain,
            queue: DirtyQueue::new(capacity),
            rx,
        };
        let join = tokio::spawn(flusher.run());
        (DirtyHandle { tx }, join)
    }

    async fn run(mut self) {
        while let Some(batch) = self.rx.recv().await {
            for item in batch {
                self.queue.push(item);
            }
            // Opportunistically fold in anything queued while we were busy.
            while let Ok(batch) = self.rx.try_recv() {
                for item in batch {
                    self.queue.push(item);
                }
            }
            self.flush_pass().await;
        }
        // Channel closed: drain what is left before exiting.
        self.flush_pass().await;
        debug!(evicted = self.queue.evicted(), "dirty flusher stopped");
    }

    async fn flush_pass(&mut self) {
        while !self.queue.is_empty() {
            let items = self.queue.drain(FLUSH_CHUNK);
            let mut accounts = Vec::new();
            let mut posts = Vec::new();
            for item in items {
                match item {
                    DirtyItem::Account(name) => accounts.push(name),
                    DirtyItem::Post { author, permlink } => posts.push((author, permlink)),
                }
            }
            if let Err(error) = self.refresh_accounts(&accounts).await {
                warn!(%error, "account refresh pass failed");
            }
            self.refresh_posts(&posts).await;
        }
    }

    async fn refresh_accounts(&self, names: &[String]) -> Result<(), String> {
        if names.is_empty() {
            return Ok(());
        }
        for chunk in names.chunks(GET_ACCOUNTS_MAX) {
            let raw_accounts = self
                .chain
                .get_accounts(chunk)
                .await
                .map_err(|err| err.to_string())?;
            let mut tx = self.store.session().await.map_err(|err| err.to_string())?;
            let refreshed_at = Utc::now();
            for raw in &raw_accounts {
                let Some(name) = raw.get("name").and_then(|v| v.as_str()) else {
                    continue;
                };
                let profile = AccountProfile::from_raw_account(raw);
                if let Err(error) = self
                    .store
                    .update_account_profile(&mut tx, name, &profile, refreshed_at)
                    .await
                {
                    warn!(name, %error, "account profile update failed");
                }
            }
        }
        Ok(())
    }

    async fn refresh_posts(&self, posts: &[(String, String)]) {
        for (author, permlink) in posts {
            let content = match self.chain.get_content(author, permlink).await {
                Ok(content) => content,
                Err(error) => {
                    warn!(author = %author, permlink = %permlink, %error, "content fetch failed");
                    continue;
                }
            };
            let result = async {
                let mut tx = self.store.session().await?;
                let Some(post) = self
                    .store
                    .post_by_author_permlink(&mut tx, author, permlink)
                    .await?
                else {
                    return Ok(());
                };
                if let Some(entry) = post_cache_entry_from_content(post.id, post.depth, &content) {
                    self.store.upsert_post_cache(&mut tx, &entry).await?;
                }
                Ok::<(), crate::domain::ports::StoreError>(())
            }
            .await;
            if let Err(error) = result {
                warn!(author = %author, permlink = %permlink, %error, "post cache refresh failed");
            }
        }
    }
}

/// Build a post-cache row from a raw `get_content` response.
///
/// Returns `None` when the payload lacks the identifying fields; individual
/// numeric fields degrade to zero because the chain serves large integers as
/// strings in some API versions.
pub fn post_cache_entry_from_content(
    post_id: i64,
    depth: i16,
    content: &serde_json::Value,
) -> Option<PostCacheEntry> {
    let text = |key: &str| {
        content
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };

    let author = text("author");
    let permlink = text("permlink");
    if author.is_empty() || permlink.is_empty() {
        return None;
    }

    let created_at = NaiveDateTime::parse_from_str(&text("created"), BLOCK_TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    let rshares = lenient_i64(content.get("net_rshares"));
    let payout = asset_value(content.get("total_payout_value"))
        + asset_value(content.get("curator_payout_value"))
        + asset_value(content.get("pending_payout_value"));
    let body = text("body");
    let json_metadata = text("json_metadata");
    let is_paidout = text("cashout_time").starts_with("1969");

    Some(PostCacheEntry {
        post_id,
        depth,
        title: text("title"),
        preview: body.chars().take(1024).collect(),
        img_url: first_image_url(&json_metadata),
        payout,
        promoted: asset_value(content.get("promoted")),
        rshares,
        votes: votes_csv(content.get("active_votes")),
        children: lenient_i64(content.get("children")) as i32,
        sc_trend: ranking_score(rshares, created_at, TREND_TIMESCALE),
        sc_hot: ranking_score(rshares, created_at, HOT_TIMESCALE),
        is_paidout,
        created_at,
        updated_at: Utc::now(),
        category: text("category"),
        author,
        permlink,
        body,
        json_metadata,
    })
}

/// Steem APIs serve 64-bit counters as either numbers or strings.
fn lenient_i64(value: Option<&serde_json::Value>) -> i64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn asset_value(value: Option<&serde_json::Value>) -> f64 {
    value
        .and_then(serde_json::Value::as_str)
        .and_then(parse_amount)
        .map(|(amount, _)| amount)
        .unwrap_or(0.0)
}

fn first_image_url(json_metadata: &str) -> String {
    serde_json::from_str::<serde_json::Value>(json_metadata)
        .ok()
        .and_then(|meta| {
            meta.get("image")?
                .as_array()?
                .first()?
                .as_str()
                .map(str::to_owned)
        })
        .filter(|url| url.len() <= 1024)
        .unwrap_or_default()
}

/// Serialize active votes as `voter,rshares,percent,reputation` CSV rows.
fn votes_csv(active_votes: Option<&serde_json::Value>) -> String {
    let Some(votes) = active_votes.and_then(serde_json::Value::as_array) else {
        return String::new();
    };
    let mut rows = Vec::with_capacity(votes.len());
    for vote in votes {
        let voter = vote.get("voter").and_then(|v| v.as_str()).unwrap_or("");
        if voter.is_empty() {
            continue;
        }
        rows.push(format!(
            "{voter},{},{},{}",
            lenient_i64(vote.get("rshares")),
            lenient_i64(vote.get("percent")),
            lenient_i64(vote.get("reputation")),
        ));
    }
    rows.join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn queue_dedups_and_preserves_fifo_order() {
        let mut queue = DirtyQueue::new(10);
        queue.push(DirtyItem::Account("alice".into()));
        queue.push(DirtyItem::Account("bob".into()));
        queue.push(DirtyItem::Account("alice".into()));
        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.drain(10),
            vec![
                DirtyItem::Account("alice".into()),
                DirtyItem::Account("bob".into())
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let mut queue = DirtyQueue::new(2);
        queue.push(DirtyItem::Account("a".into()));
        queue.push(DirtyItem::Account("b".into()));
        queue.push(DirtyItem::Account("c".into()));
        assert_eq!(queue.evicted(), 1);
        assert_eq!(
            queue.drain(10),
            vec![DirtyItem::Account("b".into()), DirtyItem::Account("c".into())]
        );
        // The evicted entry may be pushed again.
        queue.push(DirtyItem::Account("a".into()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn content_maps_into_cache_entry() {
        let content = json!({
            "author": "alice",
            "permlink": "p1",
            "category": "steem",
            "title": "hello",
            "body": "world",
            "json_metadata": r#"{"image":["https://img.example/a.png"]}"#,
            "created": "2019-06-01T12:00:00",
            "net_rshares": "5000000000",
            "children": 3,
            "total_payout_value": "1.000 SBD",
            "curator_payout_value": "0.250 SBD",
            "pending_payout_value": "0.000 SBD",
            "promoted": "5.000 SBD",
            "cashout_time": "1969-12-31T23:59:59",
            "active_votes": [
                {"voter": "bob", "rshares": "1000", "percent": 10000, "reputation": "25"}
            ]
        });
        let entry = post_cache_entry_from_content(7, 0, &content).expect("entry");
        assert_eq!(entry.post_id, 7);
        assert_eq!(entry.rshares, 5_000_000_000);
        assert!((entry.payout - 1.25).abs() < 1e-9);
        assert!(entry.is_paidout);
        assert_eq!(entry.img_url, "https://img.example/a.png");
        assert_eq!(entry.votes, "bob,1000,10000,25");
        assert!(entry.sc_trend > 0.0);
    }

    #[test]
    fn content_without_identity_is_rejected() {
        assert!(post_cache_entry_from_content(1, 0, &json!({"title": "x"})).is_none());
    }
}
