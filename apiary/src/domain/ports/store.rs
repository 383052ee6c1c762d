//! Driven ports for the relational projection.
//!
//! Every entity gets a typed store trait; all traits share one transaction
//! handle type through the [`Storage`] supertrait so a block's mutations can
//! span entities inside a single transaction. [`IndexStore`] is the blanket
//! union the indexing services are generic over.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::{Account, AccountProfile, NewAccount};
use crate::domain::block::BlockRecord;
use crate::domain::community::{Community, CommunityProps, Role, Subscription};
use crate::domain::follow::Follow;
use crate::domain::notification::{NewNotification, Notification};
use crate::domain::payment::NewPayment;
use crate::domain::post::{NewPost, Post};
use crate::domain::post_cache::{PostCacheEntry, RankedSort};
use crate::domain::reblog::Reblog;

use super::define_port_error;

/// Current projection schema version, persisted in the state row.
pub const DB_VERSION: i64 = 1;

define_port_error! {
    /// Errors raised by the storage adapters.
    pub enum StoreError {
        /// A connection could not be established or checked out.
        Connection { message: String } =>
            "storage connection failed: {message}",
        /// A query or mutation failed during execution.
        Query { message: String } =>
            "storage query failed: {message}",
        /// A value could not be serialized for or from storage.
        Serialization { message: String } =>
            "storage serialization failed: {message}",
    }
}

/// Singleton state row: sync cursor metadata and cached chain globals.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub block_num: i64,
    pub db_version: i64,
    pub steem_per_mvest: f64,
    pub usd_per_steem: f64,
    pub sbd_per_steem: f64,
    /// Cached dynamic global properties JSON.
    pub dgpo: String,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            block_num: 0,
            db_version: DB_VERSION,
            steem_per_mvest: 0.0,
            usd_per_steem: 0.0,
            sbd_per_steem: 0.0,
            dgpo: "{}".to_owned(),
        }
    }
}

/// Transaction lifecycle shared by every entity store.
///
/// `begin` opens a write transaction whose effects become visible only at
/// `commit`; `session` hands out an autocommit handle for the read path.
#[async_trait]
pub trait Storage: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;
    async fn session(&self) -> Result<Self::Tx, StoreError>;
}

/// Account rows.
#[async_trait]
pub trait AccountStore: Storage {
    async fn account_by_id(&self, tx: &mut Self::Tx, id: i64)
        -> Result<Option<Account>, StoreError>;

    async fn account_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn accounts_by_names(
        &self,
        tx: &mut Self::Tx,
        names: &[String],
    ) -> Result<Vec<Account>, StoreError>;

    /// Insert a new account and return its id.
    async fn create_account(
        &self,
        tx: &mut Self::Tx,
        account: NewAccount,
    ) -> Result<i64, StoreError>;

    /// Overwrite profile columns from a refreshed chain snapshot.
    async fn update_account_profile(
        &self,
        tx: &mut Self::Tx,
        name: &str,
        profile: &AccountProfile,
        cached_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_account_lastread(
        &self,
        tx: &mut Self::Tx,
        name: &str,
        lastread_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Apply follower/following count deltas.
    async fn adjust_follow_counts(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        followers_delta: i64,
        following_delta: i64,
    ) -> Result<(), StoreError>;
}

/// Block rows and the transaction-id index.
#[async_trait]
pub trait BlockStore: Storage {
    /// Highest processed block number, `None` on an empty projection.
    async fn head_block_num(&self, tx: &mut Self::Tx) -> Result<Option<i64>, StoreError>;

    async fn block_by_num(
        &self,
        tx: &mut Self::Tx,
        num: i64,
    ) -> Result<Option<BlockRecord>, StoreError>;

    async fn create_block(&self, tx: &mut Self::Tx, block: &BlockRecord)
        -> Result<(), StoreError>;

    async fn update_block_counts(
        &self,
        tx: &mut Self::Tx,
        num: i64,
        txs: i16,
        ops: i16,
    ) -> Result<(), StoreError>;

    /// Batch-insert `(trx_id, block_num)` pairs, ignoring duplicates.
    async fn insert_tx_ids(
        &self,
        tx: &mut Self::Tx,
        entries: &[(String, i64)],
    ) -> Result<(), StoreError>;

    async fn block_num_for_trx(
        &self,
        tx: &mut Self::Tx,
        trx_id: &str,
    ) -> Result<Option<i64>, StoreError>;
}

/// Post rows.
#[async_trait]
pub trait PostStore: Storage {
    async fn post_by_id(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<Post>, StoreError>;

    async fn post_by_author_permlink(
        &self,
        tx: &mut Self::Tx,
        author: &str,
        permlink: &str,
    ) -> Result<Option<Post>, StoreError>;

    /// Insert a new post and return its id.
    async fn create_post(&self, tx: &mut Self::Tx, post: NewPost) -> Result<i64, StoreError>;

    /// Logical delete.
    async fn set_post_deleted(&self, tx: &mut Self::Tx, id: i64) -> Result<(), StoreError>;

    /// Clear the deleted flag and refresh the creation time.
    async fn resurrect_post(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_post_muted(&self, tx: &mut Self::Tx, id: i64, muted: bool)
        -> Result<(), StoreError>;

    async fn set_post_pinned(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        pinned: bool,
    ) -> Result<(), StoreError>;

    /// Add a promotion amount to the post's running total.
    async fn add_post_promoted(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        amount: f64,
    ) -> Result<(), StoreError>;
}

/// Materialized post-cache rows.
#[async_trait]
pub trait PostCacheStore: Storage {
    async fn post_cache_by_id(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
    ) -> Result<Option<PostCacheEntry>, StoreError>;

    async fn upsert_post_cache(
        &self,
        tx: &mut Self::Tx,
        entry: &PostCacheEntry,
    ) -> Result<(), StoreError>;

    /// Ranked page for the discussion cursors. The cursor is the
    /// `(author, permlink)` of the last entry of the previous page.
    async fn ranked_posts(
        &self,
        tx: &mut Self::Tx,
        sort: RankedSort,
        cursor: Option<(String, String)>,
        limit: u32,
    ) -> Result<Vec<PostCacheEntry>, StoreError>;
}

/// Feed-cache rows (the blog/feed materialization).
#[async_trait]
pub trait FeedCacheStore: Storage {
    /// Conflict-ignoring insert.
    async fn feed_cache_insert(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Remove one `(post, account)` entry, or every entry for the post when
    /// `account_id` is `None` (post deletion).
    async fn feed_cache_delete(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: Option<i64>,
    ) -> Result<(), StoreError>;

    async fn feed_cache_contains(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: i64,
    ) -> Result<bool, StoreError>;

    async fn feed_cache_count(&self, tx: &mut Self::Tx) -> Result<i64, StoreError>;

    /// Atomically repopulate from live root posts and reblogs, optionally
    /// truncating first. Duplicate `(post, account)` pairs are ignored.
    async fn rebuild_feed_cache(&self, tx: &mut Self::Tx, truncate: bool)
        -> Result<(), StoreError>;

    /// Newest-first blog entries for one account.
    async fn blog_entries(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<(i64, DateTime<Utc>)>, StoreError>;
}

/// Follow rows.
#[async_trait]
pub trait FollowStore: Storage {
    async fn follow_between(
        &self,
        tx: &mut Self::Tx,
        follower_id: i64,
        following_id: i64,
    ) -> Result<Option<Follow>, StoreError>;

    async fn upsert_follow(&self, tx: &mut Self::Tx, follow: &Follow) -> Result<(), StoreError>;

    /// Followers of `account_id` whose state carries `state_bit`, ascending
    /// by follower id with an optional seek cursor.
    async fn followers_of(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        state_bit: i16,
        start_after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Follow>, StoreError>;

    async fn following_of(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        state_bit: i16,
        start_after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Follow>, StoreError>;

    /// Recompute every account's follower/following counters from the live
    /// follow rows (full reconciliation of the counter invariant).
    async fn recount_follows(&self, tx: &mut Self::Tx) -> Result<(), StoreError>;
}

/// Reblog rows.
#[async_trait]
pub trait ReblogStore: Storage {
    async fn reblog_get(
        &self,
        tx: &mut Self::Tx,
        account: &str,
        post_id: i64,
    ) -> Result<Option<Reblog>, StoreError>;

    /// Conflict-ignoring insert; returns whether a row was created.
    async fn create_reblog(&self, tx: &mut Self::Tx, reblog: &Reblog)
        -> Result<bool, StoreError>;

    async fn delete_reblog(
        &self,
        tx: &mut Self::Tx,
        account: &str,
        post_id: i64,
    ) -> Result<(), StoreError>;
}

/// Community, role, and subscription rows.
#[async_trait]
pub trait CommunityStore: Storage {
    async fn community_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> Result<Option<Community>, StoreError>;

    async fn community_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> Result<Option<Community>, StoreError>;

    async fn create_community(
        &self,
        tx: &mut Self::Tx,
        community: &Community,
    ) -> Result<(), StoreError>;

    /// Apply an allow-listed partial update.
    async fn update_community_props(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        props: &CommunityProps,
    ) -> Result<(), StoreError>;

    /// Adjust the subscriber counter; decrements floor at zero.
    async fn adjust_subscribers(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        delta: i64,
    ) -> Result<(), StoreError>;

    /// Communities ordered by rank then id, seekable by name.
    async fn list_communities(
        &self,
        tx: &mut Self::Tx,
        start_after: Option<String>,
        limit: u32,
    ) -> Result<Vec<Community>, StoreError>;

    async fn role_get(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<Option<Role>, StoreError>;

    async fn upsert_role(&self, tx: &mut Self::Tx, role: &Role) -> Result<(), StoreError>;

    async fn set_role_title(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
        title: &str,
    ) -> Result<(), StoreError>;

    async fn subscription_get(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Conflict-ignoring insert; returns whether a row was created.
    async fn create_subscription(
        &self,
        tx: &mut Self::Tx,
        subscription: &Subscription,
    ) -> Result<bool, StoreError>;

    /// Returns whether a row was removed.
    async fn delete_subscription(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<bool, StoreError>;
}

/// Notification rows.
#[async_trait]
pub trait NotificationStore: Storage {
    /// Append a notification and return its id.
    async fn create_notification(
        &self,
        tx: &mut Self::Tx,
        notification: NewNotification,
    ) -> Result<i64, StoreError>;

    /// Descending by id; `last_id` seeks strictly below it.
    async fn notifications_by_dst(
        &self,
        tx: &mut Self::Tx,
        dst_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn notifications_by_post(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn notifications_by_community(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError>;

    /// Notifications newer than the account's read watermark at or above
    /// `min_score`.
    async fn count_unread_notifications(
        &self,
        tx: &mut Self::Tx,
        dst_id: i64,
        lastread_at: DateTime<Utc>,
        min_score: i16,
    ) -> Result<i64, StoreError>;
}

/// Payment rows.
#[async_trait]
pub trait PaymentStore: Storage {
    async fn create_payment(
        &self,
        tx: &mut Self::Tx,
        payment: NewPayment,
    ) -> Result<i64, StoreError>;
}

/// The singleton state row.
#[async_trait]
pub trait StateStore: Storage {
    async fn state_get(&self, tx: &mut Self::Tx) -> Result<Option<StateRecord>, StoreError>;

    async fn state_upsert(&self, tx: &mut Self::Tx, state: &StateRecord)
        -> Result<(), StoreError>;
}

/// Union of every entity store; the indexing services are generic over this.
pub trait IndexStore:
    AccountStore
    + BlockStore
    + PostStore
    + PostCacheStore
    + FeedCacheStore
    + FollowStore
    + ReblogStore
    + CommunityStore
    + NotificationStore
    + PaymentStore
    + StateStore
{
}

impl<T> IndexStore for T where
    T: AccountStore
        + BlockStore
        + PostStore
        + PostCacheStore
        + FeedCacheStore
        + FollowStore
        + ReblogStore
        + CommunityStore
        + NotificationStore
        + PaymentStore
        + StateStore
{
}
