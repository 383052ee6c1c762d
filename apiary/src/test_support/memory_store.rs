//! In-memory fixture implementation of the storage ports.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::{Account, AccountProfile, NewAccount};
use crate::domain::block::BlockRecord;
use crate::domain::community::{Community, CommunityProps, Role, Subscription};
use crate::domain::follow::Follow;
use crate::domain::notification::{NewNotification, Notification};
use crate::domain::payment::{NewPayment, Payment};
use crate::domain::ports::{
    AccountStore, BlockStore, CommunityStore, FeedCacheStore, FollowStore, NotificationStore,
    PaymentStore, PostCacheStore, PostStore, ReblogStore, StateRecord, StateStore, Storage,
    StoreError,
};
use crate::domain::post::{NewPost, Post};
use crate::domain::post_cache::{PostCacheEntry, RankedSort};
use crate::domain::reblog::Reblog;

/// The entire projection as plain collections.
#[derive(Debug, Clone, Default)]
struct MemState {
    accounts: BTreeMap<i64, Account>,
    next_account_id: i64,
    blocks: BTreeMap<i64, BlockRecord>,
    tx_ids: BTreeMap<String, i64>,
    posts: BTreeMap<i64, Post>,
    next_post_id: i64,
    post_cache: BTreeMap<i64, PostCacheEntry>,
    feed_cache: BTreeMap<(i64, i64), DateTime<Utc>>,
    follows: BTreeMap<(i64, i64), Follow>,
    reblogs: BTreeMap<(String, i64), Reblog>,
    communities: BTreeMap<i64, Community>,
    roles: BTreeMap<(i64, i64), Role>,
    subscriptions: BTreeMap<(i64, i64), Subscription>,
    notifications: Vec<Notification>,
    next_notification_id: i64,
    payments: Vec<Payment>,
    next_payment_id: i64,
    state: Option<StateRecord>,
}

/// Transaction handle over the in-memory state.
///
/// `Buffered` carries a private copy mutated in place; commit publishes it.
/// `Direct` is the autocommit session handle and operates on the shared
/// state under the store's lock.
#[derive(Debug)]
pub enum MemoryTx {
    Buffered(Box<MemStateHolder>),
    Direct,
}

/// Opaque wrapper so the state type stays private.
#[derive(Debug)]
pub struct MemStateHolder(MemState);

/// In-memory store with transactional semantics good enough for replay and
/// atomicity tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Mutex<MemState>,
}

impl MemoryStore {
    /// Synchronous `begin` for test setup convenience.
    pub fn begin_test(&self) -> MemoryTx {
        MemoryTx::Buffered(Box::new(MemStateHolder(
            self.committed.lock().expect("state lock").clone(),
        )))
    }

    /// Synchronous `commit` counterpart to [`Self::begin_test`].
    pub fn commit_test(&self, tx: MemoryTx) {
        if let MemoryTx::Buffered(holder) = tx {
            *self.committed.lock().expect("state lock") = holder.0;
        }
    }

    fn with_state<R>(&self, tx: &mut MemoryTx, f: impl FnOnce(&mut MemState) -> R) -> R {
        match tx {
            MemoryTx::Buffered(holder) => f(&mut holder.0),
            MemoryTx::Direct => f(&mut self.committed.lock().expect("state lock")),
        }
    }

    /// Row-count snapshot used by idempotency assertions:
    /// `(accounts, posts, feed_cache, follows, reblogs, notifications, payments)`.
    pub fn row_counts(&self) -> (usize, usize, usize, usize, usize, usize, usize) {
        let state = self.committed.lock().expect("state lock");
        (
            state.accounts.len(),
            state.posts.len(),
            state.feed_cache.len(),
            state.follows.len(),
            state.reblogs.len(),
            state.notifications.len(),
            state.payments.len(),
        )
    }

    /// Committed notifications, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.committed.lock().expect("state lock").notifications.clone()
    }

    /// Committed payments, oldest first.
    pub fn payments(&self) -> Vec<Payment> {
        self.committed.lock().expect("state lock").payments.clone()
    }
}

impl MemState {
    fn account_id_by_name(&self, name: &str) -> Option<i64> {
        self.accounts
            .values()
            .find(|account| account.name == name)
            .map(|account| account.id)
    }
}

#[async_trait]
impl Storage for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(self.begin_test())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        self.commit_test(tx);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        drop(tx);
        Ok(())
    }

    async fn session(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTx::Direct)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn account_by_id(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<Account>, StoreError> {
        Ok(self.with_state(tx, |state| state.accounts.get(&id).cloned()))
    }

    async fn account_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state
                .accounts
                .values()
                .find(|account| account.name == name)
                .cloned()
        }))
    }

    async fn accounts_by_names(
        &self,
        tx: &mut Self::Tx,
        names: &[String],
    ) -> Result<Vec<Account>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state
                .accounts
                .values()
                .filter(|account| names.contains(&account.name))
                .cloned()
                .collect()
        }))
    }

    async fn create_account(
        &self,
        tx: &mut Self::Tx,
        account: NewAccount,
    ) -> Result<i64, StoreError> {
        self.with_state(tx, |state| {
            if state.account_id_by_name(&account.name).is_some() {
                return Err(StoreError::query(format!(
                    "duplicate account name {}",
                    account.name
                )));
            }
            state.next_account_id += 1;
            let id = state.next_account_id;
            let epoch = DateTime::<Utc>::UNIX_EPOCH;
            state.accounts.insert(
                id,
                Account {
                    id,
                    name: account.name,
                    created_at: account.created_at,
                    reputation: account.reputation,
                    followers: 0,
                    following: 0,
                    lastread_at: epoch,
                    cached_at: epoch,
                    display_name: None,
                    about: None,
                    location: None,
                    website: None,
                    profile_image: None,
                    cover_image: None,
                },
            );
            Ok(id)
        })
    }

    async fn update_account_profile(
        &self,
        tx: &mut Self::Tx,
        name: &str,
        profile: &AccountProfile,
        cached_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            let Some(id) = state.account_id_by_name(name) else {
                return Ok(());
            };
            let account = state.accounts.get_mut(&id).expect("account exists");
            account.display_name = profile.display_name.clone();
            account.about = profile.about.clone();
            account.location = profile.location.clone();
            account.website = profile.website.clone();
            account.profile_image = profile.profile_image.clone();
            account.cover_image = profile.cover_image.clone();
            account.cached_at = cached_at;
            Ok(())
        })
    }

    async fn set_account_lastread(
        &self,
        tx: &mut Self::Tx,
        name: &str,
        lastread_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(id) = state.account_id_by_name(name) {
                state.accounts.get_mut(&id).expect("account exists").lastread_at = lastread_at;
            }
            Ok(())
        })
    }

    async fn adjust_follow_counts(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        followers_delta: i64,
        following_delta: i64,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(account) = state.accounts.get_mut(&account_id) {
                account.followers += followers_delta;
                account.following += following_delta;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn head_block_num(&self, tx: &mut Self::Tx) -> Result<Option<i64>, StoreError> {
        Ok(self.with_state(tx, |state| state.blocks.keys().next_back().copied()))
    }

    async fn block_by_num(
        &self,
        tx: &mut Self::Tx,
        num: i64,
    ) -> Result<Option<BlockRecord>, StoreError> {
        Ok(self.with_state(tx, |state| state.blocks.get(&num).cloned()))
    }

    async fn create_block(&self, tx: &mut Self::Tx, block: &BlockRecord) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if state.blocks.contains_key(&block.num) {
                return Err(StoreError::query(format!("duplicate block {}", block.num)));
            }
            state.blocks.insert(block.num, block.clone());
            Ok(())
        })
    }

    async fn update_block_counts(
        &self,
        tx: &mut Self::Tx,
        num: i64,
        txs: i16,
        ops: i16,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(block) = state.blocks.get_mut(&num) {
                block.txs = txs;
                block.ops = ops;
            }
            Ok(())
        })
    }

    async fn insert_tx_ids(
        &self,
        tx: &mut Self::Tx,
        entries: &[(String, i64)],
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            for (trx_id, block_num) in entries {
                state.tx_ids.entry(trx_id.clone()).or_insert(*block_num);
            }
            Ok(())
        })
    }

    async fn block_num_for_trx(
        &self,
        tx: &mut Self::Tx,
        trx_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        Ok(self.with_state(tx, |state| state.tx_ids.get(trx_id).copied()))
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn post_by_id(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<Post>, StoreError> {
        Ok(self.with_state(tx, |state| state.posts.get(&id).cloned()))
    }

    async fn post_by_author_permlink(
        &self,
        tx: &mut Self::Tx,
        author: &str,
        permlink: &str,
    ) -> Result<Option<Post>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state
                .posts
                .values()
                .find(|post| post.author == author && post.permlink == permlink)
                .cloned()
        }))
    }

    async fn create_post(&self, tx: &mut Self::Tx, post: NewPost) -> Result<i64, StoreError> {
        self.with_state(tx, |state| {
            state.next_post_id += 1;
            let id = state.next_post_id;
            state.posts.insert(
                id,
                Post {
                    id,
                    parent_id: post.parent_id,
                    author: post.author,
                    permlink: post.permlink,
                    category: post.category,
                    community_id: post.community_id,
                    created_at: post.created_at,
                    depth: post.depth,
                    is_deleted: false,
                    is_pinned: false,
                    is_muted: post.is_muted,
                    is_valid: post.is_valid,
                    promoted: 0.0,
                },
            );
            Ok(id)
        })
    }

    async fn set_post_deleted(&self, tx: &mut Self::Tx, id: i64) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(post) = state.posts.get_mut(&id) {
                post.is_deleted = true;
            }
            Ok(())
        })
    }

    async fn resurrect_post(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(post) = state.posts.get_mut(&id) {
                post.is_deleted = false;
                post.created_at = created_at;
            }
            Ok(())
        })
    }

    async fn set_post_muted(&self, tx: &mut Self::Tx, id: i64, muted: bool) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(post) = state.posts.get_mut(&id) {
                post.is_muted = muted;
            }
            Ok(())
        })
    }

    async fn set_post_pinned(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        pinned: bool,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(post) = state.posts.get_mut(&id) {
                post.is_pinned = pinned;
            }
            Ok(())
        })
    }

    async fn add_post_promoted(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        amount: f64,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(post) = state.posts.get_mut(&id) {
                post.promoted += amount;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl PostCacheStore for MemoryStore {
    async fn post_cache_by_id(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
    ) -> Result<Option<PostCacheEntry>, StoreError> {
        Ok(self.with_state(tx, |state| state.post_cache.get(&post_id).cloned()))
    }

    async fn upsert_post_cache(
        &self,
        tx: &mut Self::Tx,
        entry: &PostCacheEntry,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            state.post_cache.insert(entry.post_id, entry.clone());
            Ok(())
        })
    }

    async fn ranked_posts(
        &self,
        tx: &mut Self::Tx,
        sort: RankedSort,
        cursor: Option<(String, String)>,
        limit: u32,
    ) -> Result<Vec<PostCacheEntry>, StoreError> {
        Ok(self.with_state(tx, |state| {
            let mut entries: Vec<(PostCacheEntry, &Post)> = state
                .post_cache
                .values()
                .filter_map(|entry| {
                    let post = state.posts.get(&entry.post_id)?;
                    if post.is_deleted {
                        return None;
                    }
                    Some((entry.clone(), post))
                })
                .filter(|(entry, post)| match sort {
                    RankedSort::PayoutComments => entry.depth > 0 && !entry.is_paidout,
                    RankedSort::Muted => post.is_muted,
                    RankedSort::Promoted => entry.depth == 0 && post.promoted > 0.0,
                    RankedSort::Payout => entry.depth == 0 && !entry.is_paidout,
                    _ => entry.depth == 0,
                })
                .collect();

            entries.sort_by(|(a, post_a), (b, post_b)| {
                let key = |entry: &PostCacheEntry, post: &Post| match sort {
                    RankedSort::Trending => entry.sc_trend,
                    RankedSort::Hot => entry.sc_hot,
                    RankedSort::Created => entry.created_at.timestamp() as f64,
                    RankedSort::Promoted => post.promoted,
                    RankedSort::Payout | RankedSort::PayoutComments | RankedSort::Muted => {
                        entry.payout
                    }
                };
                key(b, post_b)
                    .partial_cmp(&key(a, post_a))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.post_id.cmp(&b.post_id))
            });

            let skip = cursor
                .and_then(|(author, permlink)| {
                    entries
                        .iter()
                        .position(|(entry, _)| entry.author == author && entry.permlink == permlink)
                        .map(|position| position + 1)
                })
                .unwrap_or(0);

            entries
                .into_iter()
                .skip(skip)
                .take(limit as usize)
                .map(|(entry, _)| entry)
                .collect()
        }))
    }
}

#[async_trait]
impl FeedCacheStore for MemoryStore {
    async fn feed_cache_insert(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            state.feed_cache.entry((post_id, account_id)).or_insert(created_at);
            Ok(())
        })
    }

    async fn feed_cache_delete(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: Option<i64>,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            match account_id {
                Some(account_id) => {
                    state.feed_cache.remove(&(post_id, account_id));
                }
                None => {
                    state.feed_cache.retain(|(post, _), _| *post != post_id);
                }
            }
            Ok(())
        })
    }

    async fn feed_cache_contains(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: i64,
    ) -> Result<bool, StoreError> {
        Ok(self.with_state(tx, |state| {
            state.feed_cache.contains_key(&(post_id, account_id))
        }))
    }

    async fn feed_cache_count(&self, tx: &mut Self::Tx) -> Result<i64, StoreError> {
        Ok(self.with_state(tx, |state| state.feed_cache.len() as i64))
    }

    async fn rebuild_feed_cache(
        &self,
        tx: &mut Self::Tx,
        truncate: bool,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if truncate {
                state.feed_cache.clear();
            }
            let roots: Vec<(i64, i64, DateTime<Utc>)> = state
                .posts
                .values()
                .filter(|post| post.depth == 0 && !post.is_deleted)
                .filter_map(|post| {
                    let account_id = state.account_id_by_name(&post.author)?;
                    Some((post.id, account_id, post.created_at))
                })
                .collect();
            let reblogs: Vec<(i64, i64, DateTime<Utc>)> = state
                .reblogs
                .values()
                .filter_map(|reblog| {
                    let account_id = state.account_id_by_name(&reblog.account)?;
                    Some((reblog.post_id, account_id, reblog.created_at))
                })
                .collect();
            for (post_id, account_id, created_at) in roots.into_iter().chain(reblogs) {
                state.feed_cache.entry((post_id, account_id)).or_insert(created_at);
            }
            Ok(())
        })
    }

    async fn blog_entries(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<(i64, DateTime<Utc>)>, StoreError> {
        Ok(self.with_state(tx, |state| {
            let mut entries: Vec<(i64, DateTime<Utc>)> = state
                .feed_cache
                .iter()
                .filter(|((_, account), _)| *account == account_id)
                .map(|((post, _), created_at)| (*post, *created_at))
                .filter(|(_, created_at)| before.map_or(true, |cutoff| *created_at < cutoff))
                .collect();
            entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
            entries.truncate(limit as usize);
            entries
        }))
    }
}

#[async_trait]
impl FollowStore for MemoryStore {
    async fn follow_between(
        &self,
        tx: &mut Self::Tx,
        follower_id: i64,
        following_id: i64,
    ) -> Result<Option<Follow>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state.follows.get(&(follower_id, following_id)).cloned()
        }))
    }

    async fn upsert_follow(&self, tx: &mut Self::Tx, follow: &Follow) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            state
                .follows
                .insert((follow.follower_id, follow.following_id), follow.clone());
            Ok(())
        })
    }

    async fn followers_of(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        state_bit: i16,
        start_after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Follow>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state
                .follows
                .values()
                .filter(|follow| {
                    follow.following_id == account_id && follow.state.0 & state_bit != 0
                })
                .filter(|follow| start_after.map_or(true, |after| follow.follower_id > after))
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn following_of(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        state_bit: i16,
        start_after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Follow>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state
                .follows
                .values()
                .filter(|follow| {
                    follow.follower_id == account_id && follow.state.0 & state_bit != 0
                })
                .filter(|follow| start_after.map_or(true, |after| follow.following_id > after))
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn recount_follows(&self, tx: &mut Self::Tx) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            let counts: Vec<(i64, i64, i64)> = state
                .accounts
                .keys()
                .map(|id| {
                    let followers = state
                        .follows
                        .values()
                        .filter(|f| f.following_id == *id && f.state.follows_blog())
                        .count() as i64;
                    let following = state
                        .follows
                        .values()
                        .filter(|f| f.follower_id == *id && f.state.follows_blog())
                        .count() as i64;
                    (*id, followers, following)
                })
                .collect();
            for (id, followers, following) in counts {
                let account = state.accounts.get_mut(&id).expect("account exists");
                account.followers = followers;
                account.following = following;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl ReblogStore for MemoryStore {
    async fn reblog_get(
        &self,
        tx: &mut Self::Tx,
        account: &str,
        post_id: i64,
    ) -> Result<Option<Reblog>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state.reblogs.get(&(account.to_owned(), post_id)).cloned()
        }))
    }

    async fn create_reblog(&self, tx: &mut Self::Tx, reblog: &Reblog) -> Result<bool, StoreError> {
        self.with_state(tx, |state| {
            let key = (reblog.account.clone(), reblog.post_id);
            if state.reblogs.contains_key(&key) {
                return Ok(false);
            }
            state.reblogs.insert(key, reblog.clone());
            Ok(true)
        })
    }

    async fn delete_reblog(
        &self,
        tx: &mut Self::Tx,
        account: &str,
        post_id: i64,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            state.reblogs.remove(&(account.to_owned(), post_id));
            Ok(())
        })
    }
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn community_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> Result<Option<Community>, StoreError> {
        Ok(self.with_state(tx, |state| state.communities.get(&id).cloned()))
    }

    async fn community_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> Result<Option<Community>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state
                .communities
                .values()
                .find(|community| community.name == name)
                .cloned()
        }))
    }

    async fn create_community(
        &self,
        tx: &mut Self::Tx,
        community: &Community,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            state.communities.insert(community.id, community.clone());
            Ok(())
        })
    }

    async fn update_community_props(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        props: &CommunityProps,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            let Some(community) = state.communities.get_mut(&id) else {
                return Ok(());
            };
            if let Some(title) = &props.title {
                community.title = title.clone();
            }
            if let Some(about) = &props.about {
                community.about = about.clone();
            }
            if let Some(lang) = &props.lang {
                community.lang = lang.clone();
            }
            if let Some(description) = &props.description {
                community.description = description.clone();
            }
            if let Some(flag_text) = &props.flag_text {
                community.flag_text = flag_text.clone();
            }
            if let Some(is_nsfw) = props.is_nsfw {
                community.is_nsfw = is_nsfw;
            }
            if let Some(settings) = &props.settings {
                community.settings = settings.clone();
            }
            Ok(())
        })
    }

    async fn adjust_subscribers(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        delta: i64,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(community) = state.communities.get_mut(&id) {
                community.subscribers = (community.subscribers + delta).max(0);
            }
            Ok(())
        })
    }

    async fn list_communities(
        &self,
        tx: &mut Self::Tx,
        start_after: Option<String>,
        limit: u32,
    ) -> Result<Vec<Community>, StoreError> {
        Ok(self.with_state(tx, |state| {
            let mut communities: Vec<Community> = state.communities.values().cloned().collect();
            communities.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.id.cmp(&b.id)));
            let skip = start_after
                .and_then(|name| {
                    communities
                        .iter()
                        .position(|community| community.name == name)
                        .map(|position| position + 1)
                })
                .unwrap_or(0);
            communities.into_iter().skip(skip).take(limit as usize).collect()
        }))
    }

    async fn role_get(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<Option<Role>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state.roles.get(&(community_id, account_id)).cloned()
        }))
    }

    async fn upsert_role(&self, tx: &mut Self::Tx, role: &Role) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            let key = (role.community_id, role.account_id);
            match state.roles.get_mut(&key) {
                Some(existing) => {
                    existing.role = role.role;
                }
                None => {
                    state.roles.insert(key, role.clone());
                }
            }
            Ok(())
        })
    }

    async fn set_role_title(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
        title: &str,
    ) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            if let Some(role) = state.roles.get_mut(&(community_id, account_id)) {
                role.title = Some(title.to_owned());
            }
            Ok(())
        })
    }

    async fn subscription_get(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self.with_state(tx, |state| {
            state.subscriptions.get(&(community_id, account_id)).cloned()
        }))
    }

    async fn create_subscription(
        &self,
        tx: &mut Self::Tx,
        subscription: &Subscription,
    ) -> Result<bool, StoreError> {
        self.with_state(tx, |state| {
            let key = (subscription.community_id, subscription.account_id);
            if state.subscriptions.contains_key(&key) {
                return Ok(false);
            }
            state.subscriptions.insert(key, subscription.clone());
            Ok(true)
        })
    }

    async fn delete_subscription(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<bool, StoreError> {
        self.with_state(tx, |state| {
            Ok(state.subscriptions.remove(&(community_id, account_id)).is_some())
        })
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(
        &self,
        tx: &mut Self::Tx,
        notification: NewNotification,
    ) -> Result<i64, StoreError> {
        self.with_state(tx, |state| {
            state.next_notification_id += 1;
            let id = state.next_notification_id;
            state.notifications.push(Notification {
                id,
                kind: notification.kind,
                score: notification.score,
                created_at: notification.created_at,
                src_id: notification.src_id,
                dst_id: notification.dst_id,
                community_id: notification.community_id,
                post_id: notification.post_id,
                payload: notification.payload,
            });
            Ok(id)
        })
    }

    async fn notifications_by_dst(
        &self,
        tx: &mut Self::Tx,
        dst_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(self.filtered_notifications(tx, min_score, last_id, limit, move |n| {
            n.dst_id == Some(dst_id)
        }))
    }

    async fn notifications_by_post(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(self.filtered_notifications(tx, min_score, last_id, limit, move |n| {
            n.post_id == Some(post_id)
        }))
    }

    async fn notifications_by_community(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        Ok(self.filtered_notifications(tx, min_score, last_id, limit, move |n| {
            n.community_id == Some(community_id)
        }))
    }

    async fn count_unread_notifications(
        &self,
        tx: &mut Self::Tx,
        dst_id: i64,
        lastread_at: DateTime<Utc>,
        min_score: i16,
    ) -> Result<i64, StoreError> {
        Ok(self.with_state(tx, |state| {
            state
                .notifications
                .iter()
                .filter(|n| {
                    n.dst_id == Some(dst_id)
                        && n.score >= min_score
                        && n.created_at > lastread_at
                })
                .count() as i64
        }))
    }
}

impl MemoryStore {
    fn filtered_notifications(
        &self,
        tx: &mut MemoryTx,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
        predicate: impl Fn(&Notification) -> bool,
    ) -> Vec<Notification> {
        self.with_state(tx, |state| {
            let mut matched: Vec<Notification> = state
                .notifications
                .iter()
                .filter(|n| predicate(n) && n.score >= min_score)
                .filter(|n| last_id.map_or(true, |last| n.id < last))
                .cloned()
                .collect();
            matched.sort_by(|a, b| b.id.cmp(&a.id));
            matched.truncate(limit as usize);
            matched
        })
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create_payment(
        &self,
        tx: &mut Self::Tx,
        payment: NewPayment,
    ) -> Result<i64, StoreError> {
        self.with_state(tx, |state| {
            state.next_payment_id += 1;
            let id = state.next_payment_id;
            state.payments.push(Payment {
                id,
                block_num: payment.block_num,
                tx_idx: payment.tx_idx,
                from_account: payment.from_account,
                to_account: payment.to_account,
                amount: payment.amount,
                token: payment.token,
                memo: payment.memo,
                post_id: payment.post_id,
                created_at: payment.created_at,
            });
            Ok(id)
        })
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn state_get(&self, tx: &mut Self::Tx) -> Result<Option<StateRecord>, StoreError> {
        Ok(self.with_state(tx, |state| state.state.clone()))
    }

    async fn state_upsert(&self, tx: &mut Self::Tx, record: &StateRecord) -> Result<(), StoreError> {
        self.with_state(tx, |state| {
            state.state = Some(record.clone());
            Ok(())
        })
    }
}
