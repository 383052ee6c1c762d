//! PostgreSQL-backed implementation of the storage ports.
//!
//! One adapter struct implements every entity store; the shared transaction
//! handle is an owned pooled connection driven with explicit
//! `BEGIN`/`COMMIT`, because a block's mutations span many store calls and
//! cannot live inside a single closure-scoped transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel::{sql_query, OptionalExtension};
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};

use crate::domain::account::{Account, AccountProfile, NewAccount};
use crate::domain::block::BlockRecord;
use crate::domain::community::{Community, CommunityProps, Role, Subscription};
use crate::domain::follow::Follow;
use crate::domain::notification::{NewNotification, Notification};
use crate::domain::payment::NewPayment;
use crate::domain::ports::{
    AccountStore, BlockStore, CommunityStore, FeedCacheStore, FollowStore, NotificationStore,
    PaymentStore, PostCacheStore, PostStore, ReblogStore, StateRecord, StateStore, Storage,
    StoreError,
};
use crate::domain::post::{NewPost, Post};
use crate::domain::post_cache::{PostCacheEntry, RankedSort};
use crate::domain::reblog::Reblog;

use super::models::{
    AccountRow, BlockRow, CommunityRow, FeedCacheRow, FollowRow, NewAccountRow,
    NewNotificationRow, NewPaymentRow, NewPostRow, NotificationRow, PostCacheRow, PostRow,
    ReblogRow, RoleRow, StateRow, SubscriptionRow, TrxBlockRow,
};
use super::pool::{map_checkout_error, DbConn, DbPool};
use super::schema::{
    hive_accounts, hive_blocks, hive_communities, hive_feed_cache, hive_follows, hive_notifs,
    hive_payments, hive_posts, hive_posts_cache, hive_reblogs, hive_roles, hive_state,
    hive_subscriptions, hive_trxid_block_num,
};

/// Diesel-backed store over a bb8 pool.
#[derive(Clone)]
pub struct DieselStore {
    pool: DbPool,
}

impl DieselStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_diesel_error(error: diesel::result::Error) -> StoreError {
    StoreError::query(error.to_string())
}

#[async_trait]
impl Storage for DieselStore {
    type Tx = DbConn;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let mut conn = self.pool.get_owned().await.map_err(map_checkout_error)?;
        conn.batch_execute("BEGIN")
            .await
            .map_err(map_diesel_error)?;
        Ok(conn)
    }

    async fn commit(&self, mut tx: Self::Tx) -> Result<(), StoreError> {
        tx.batch_execute("COMMIT").await.map_err(map_diesel_error)
    }

    async fn rollback(&self, mut tx: Self::Tx) -> Result<(), StoreError> {
        tx.batch_execute("ROLLBACK").await.map_err(map_diesel_error)
    }

    async fn session(&self) -> Result<Self::Tx, StoreError> {
        self.pool.get_owned().await.map_err(map_checkout_error)
    }
}

#[async_trait]
impl AccountStore for DieselStore {
    async fn account_by_id(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<Account>, StoreError> {
        hive_accounts::table
            .find(id)
            .select(AccountRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Account::from))
            .map_err(map_diesel_error)
    }

    async fn account_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> Result<Option<Account>, StoreError> {
        hive_accounts::table
            .filter(hive_accounts::name.eq(name))
            .select(AccountRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Account::from))
            .map_err(map_diesel_error)
    }

    async fn accounts_by_names(
        &self,
        tx: &mut Self::Tx,
        names: &[String],
    ) -> Result<Vec<Account>, StoreError> {
        hive_accounts::table
            .filter(hive_accounts::name.eq_any(names))
            .select(AccountRow::as_select())
            .load(tx)
            .await
            .map(|rows| rows.into_iter().map(Account::from).collect())
            .map_err(map_diesel_error)
    }

    async fn create_account(
        &self,
        tx: &mut Self::Tx,
        account: NewAccount,
    ) -> Result<i64, StoreError> {
        diesel::insert_into(hive_accounts::table)
            .values(NewAccountRow {
                name: &account.name,
                created_at: account.created_at,
                reputation: account.reputation,
            })
            .returning(hive_accounts::id)
            .get_result(tx)
            .await
            .map_err(map_diesel_error)
    }

    async fn update_account_profile(
        &self,
        tx: &mut Self::Tx,
        name: &str,
        profile: &AccountProfile,
        cached_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        diesel::update(hive_accounts::table.filter(hive_accounts::name.eq(name)))
            .set((
                hive_accounts::display_name.eq(&profile.display_name),
                hive_accounts::about.eq(&profile.about),
                hive_accounts::location.eq(&profile.location),
                hive_accounts::website.eq(&profile.website),
                hive_accounts::profile_image.eq(&profile.profile_image),
                hive_accounts::cover_image.eq(&profile.cover_image),
                hive_accounts::cached_at.eq(cached_at),
            ))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn set_account_lastread(
        &self,
        tx: &mut Self::Tx,
        name: &str,
        lastread_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        diesel::update(hive_accounts::table.filter(hive_accounts::name.eq(name)))
            .set(hive_accounts::lastread_at.eq(lastread_at))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn adjust_follow_counts(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        followers_delta: i64,
        following_delta: i64,
    ) -> Result<(), StoreError> {
        diesel::update(hive_accounts::table.find(account_id))
            .set((
                hive_accounts::followers.eq(hive_accounts::followers + followers_delta),
                hive_accounts::following.eq(hive_accounts::following + following_delta),
            ))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}

#[async_trait]
impl BlockStore for DieselStore {
    async fn head_block_num(&self, tx: &mut Self::Tx) -> Result<Option<i64>, StoreError> {
        hive_blocks::table
            .select(diesel::dsl::max(hive_blocks::num))
            .first(tx)
            .await
            .map_err(map_diesel_error)
    }

    async fn block_by_num(
        &self,
        tx: &mut Self::Tx,
        num: i64,
    ) -> Result<Option<BlockRecord>, StoreError> {
        hive_blocks::table
            .find(num)
            .select(BlockRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(BlockRecord::from))
            .map_err(map_diesel_error)
    }

    async fn create_block(&self, tx: &mut Self::Tx, block: &BlockRecord) -> Result<(), StoreError> {
        diesel::insert_into(hive_blocks::table)
            .values(BlockRow::from(block))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn update_block_counts(
        &self,
        tx: &mut Self::Tx,
        num: i64,
        txs: i16,
        ops: i16,
    ) -> Result<(), StoreError> {
        diesel::update(hive_blocks::table.find(num))
            .set((hive_blocks::txs.eq(txs), hive_blocks::ops_count.eq(ops)))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn insert_tx_ids(
        &self,
        tx: &mut Self::Tx,
        entries: &[(String, i64)],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let rows: Vec<TrxBlockRow> = entries
            .iter()
            .map(|(trx_id, block_num)| TrxBlockRow {
                trx_id: trx_id.clone(),
                block_num: *block_num,
            })
            .collect();
        diesel::insert_into(hive_trxid_block_num::table)
            .values(&rows)
            .on_conflict_do_nothing()
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn block_num_for_trx(
        &self,
        tx: &mut Self::Tx,
        trx_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        hive_trxid_block_num::table
            .find(trx_id)
            .select(hive_trxid_block_num::block_num)
            .first(tx)
            .await
            .optional()
            .map_err(map_diesel_error)
    }
}

#[async_trait]
impl PostStore for DieselStore {
    async fn post_by_id(&self, tx: &mut Self::Tx, id: i64) -> Result<Option<Post>, StoreError> {
        hive_posts::table
            .find(id)
            .select(PostRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Post::from))
            .map_err(map_diesel_error)
    }

    async fn post_by_author_permlink(
        &self,
        tx: &mut Self::Tx,
        author: &str,
        permlink: &str,
    ) -> Result<Option<Post>, StoreError> {
        hive_posts::table
            .filter(hive_posts::author.eq(author))
            .filter(hive_posts::permlink.eq(permlink))
            .select(PostRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Post::from))
            .map_err(map_diesel_error)
    }

    async fn create_post(&self, tx: &mut Self::Tx, post: NewPost) -> Result<i64, StoreError> {
        diesel::insert_into(hive_posts::table)
            .values(NewPostRow::from(post))
            .returning(hive_posts::id)
            .get_result(tx)
            .await
            .map_err(map_diesel_error)
    }

    async fn set_post_deleted(&self, tx: &mut Self::Tx, id: i64) -> Result<(), StoreError> {
        diesel::update(hive_posts::table.find(id))
            .set(hive_posts::is_deleted.eq(true))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn resurrect_post(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        diesel::update(hive_posts::table.find(id))
            .set((
                hive_posts::is_deleted.eq(false),
                hive_posts::created_at.eq(created_at),
            ))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn set_post_muted(&self, tx: &mut Self::Tx, id: i64, muted: bool) -> Result<(), StoreError> {
        diesel::update(hive_posts::table.find(id))
            .set(hive_posts::is_muted.eq(muted))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn set_post_pinned(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        pinned: bool,
    ) -> Result<(), StoreError> {
        diesel::update(hive_posts::table.find(id))
            .set(hive_posts::is_pinned.eq(pinned))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn add_post_promoted(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        amount: f64,
    ) -> Result<(), StoreError> {
        diesel::update(hive_posts::table.find(id))
            .set(hive_posts::promoted.eq(hive_posts::promoted + amount))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}

#[async_trait]
impl PostCacheStore for DieselStore {
    async fn post_cache_by_id(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
    ) -> Result<Option<PostCacheEntry>, StoreError> {
        hive_posts_cache::table
            .find(post_id)
            .select(PostCacheRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(PostCacheEntry::from))
            .map_err(map_diesel_error)
    }

    async fn upsert_post_cache(
        &self,
        tx: &mut Self::Tx,
        entry: &PostCacheEntry,
    ) -> Result<(), StoreError> {
        let row = PostCacheRow::from(entry);
        diesel::insert_into(hive_posts_cache::table)
            .values(&row)
            .on_conflict(hive_posts_cache::post_id)
            .do_update()
            .set((
                hive_posts_cache::title.eq(&row.title),
                hive_posts_cache::preview.eq(&row.preview),
                hive_posts_cache::body.eq(&row.body),
                hive_posts_cache::img_url.eq(&row.img_url),
                hive_posts_cache::json_metadata.eq(&row.json_metadata),
                hive_posts_cache::category.eq(&row.category),
                hive_posts_cache::payout.eq(row.payout),
                hive_posts_cache::promoted.eq(row.promoted),
                hive_posts_cache::rshares.eq(row.rshares),
                hive_posts_cache::votes.eq(&row.votes),
                hive_posts_cache::children.eq(row.children),
                hive_posts_cache::sc_trend.eq(row.sc_trend),
                hive_posts_cache::sc_hot.eq(row.sc_hot),
                hive_posts_cache::is_paidout.eq(row.is_paidout),
                hive_posts_cache::updated_at.eq(row.updated_at),
            ))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn ranked_posts(
        &self,
        tx: &mut Self::Tx,
        sort: RankedSort,
        cursor: Option<(String, String)>,
        limit: u32,
    ) -> Result<Vec<PostCacheEntry>, StoreError> {
        let pivot = match cursor {
            None => None,
            Some((author, permlink)) => {
                let found: Option<(PostCacheRow, PostRow)> = hive_posts_cache::table
                    .inner_join(hive_posts::table)
                    .filter(hive_posts_cache::author.eq(&author))
                    .filter(hive_posts_cache::permlink.eq(&permlink))
                    .select((PostCacheRow::as_select(), PostRow::as_select()))
                    .first(tx)
                    .await
                    .optional()
                    .map_err(map_diesel_error)?;
                // An unknown cursor degrades to the first page, matching the
                // tolerant behavior of the historical API.
                found
            }
        };

        let base = hive_posts_cache::table
            .inner_join(hive_posts::table)
            .filter(hive_posts::is_deleted.eq(false))
            .select(PostCacheRow::as_select())
            .limit(i64::from(limit))
            .into_boxed();

        let query = match sort {
            RankedSort::Trending => {
                let mut query = base
                    .filter(hive_posts_cache::depth.eq(0))
                    .order((hive_posts_cache::sc_trend.desc(), hive_posts_cache::post_id.asc()));
                if let Some((pc, _)) = &pivot {
                    query = query.filter(
                        hive_posts_cache::sc_trend.lt(pc.sc_trend).or(
                            hive_posts_cache::sc_trend
                                .eq(pc.sc_trend)
                                .and(hive_posts_cache::post_id.gt(pc.post_id)),
                        ),
                    );
                }
                query
            }
            RankedSort::Hot => {
                let mut query = base
                    .filter(hive_posts_cache::depth.eq(0))
                    .order((hive_posts_cache::sc_hot.desc(), hive_posts_cache::post_id.asc()));
                if let Some((pc, _)) = &pivot {
                    query = query.filter(
                        hive_posts_cache::sc_hot.lt(pc.sc_hot).or(hive_posts_cache::sc_hot
                            .eq(pc.sc_hot)
                            .and(hive_posts_cache::post_id.gt(pc.post_id))),
                    );
                }
                query
            }
            RankedSort::Created => {
                let mut query = base.filter(hive_posts_cache::depth.eq(0)).order((
                    hive_posts_cache::created_at.desc(),
                    hive_posts_cache::post_id.asc(),
                ));
                if let Some((pc, _)) = &pivot {
                    query = query.filter(
                        hive_posts_cache::created_at.lt(pc.created_at).or(
                            hive_posts_cache::created_at
                                .eq(pc.created_at)
                                .and(hive_posts_cache::post_id.gt(pc.post_id)),
                        ),
                    );
                }
                query
            }
            RankedSort::Promoted => {
                let mut query = base
                    .filter(hive_posts_cache::depth.eq(0))
                    .filter(hive_posts::promoted.gt(0.0))
                    .order((hive_posts::promoted.desc(), hive_posts_cache::post_id.asc()));
                if let Some((_, post)) = &pivot {
                    query = query.filter(
                        hive_posts::promoted.lt(post.promoted).or(hive_posts::promoted
                            .eq(post.promoted)
                            .and(hive_posts_cache::post_id.gt(post.id))),
                    );
                }
                query
            }
            RankedSort::Payout => {
                let mut query = base
                    .filter(hive_posts_cache::depth.eq(0))
                    .filter(hive_posts_cache::is_paidout.eq(false))
                    .order((hive_posts_cache::payout.desc(), hive_posts_cache::post_id.asc()));
                if let Some((pc, _)) = &pivot {
                    query = query.filter(
                        hive_posts_cache::payout.lt(pc.payout).or(hive_posts_cache::payout
                            .eq(pc.payout)
                            .and(hive_posts_cache::post_id.gt(pc.post_id))),
                    );
                }
                query
            }
            RankedSort::PayoutComments => {
                let mut query = base
                    .filter(hive_posts_cache::depth.gt(0))
                    .filter(hive_posts_cache::is_paidout.eq(false))
                    .order((hive_posts_cache::payout.desc(), hive_posts_cache::post_id.asc()));
                if let Some((pc, _)) = &pivot {
                    query = query.filter(
                        hive_posts_cache::payout.lt(pc.payout).or(hive_posts_cache::payout
                            .eq(pc.payout)
                            .and(hive_posts_cache::post_id.gt(pc.post_id))),
                    );
                }
                query
            }
            RankedSort::Muted => {
                let mut query = base
                    .filter(hive_posts::is_muted.eq(true))
                    .order((hive_posts_cache::payout.desc(), hive_posts_cache::post_id.asc()));
                if let Some((pc, _)) = &pivot {
                    query = query.filter(
                        hive_posts_cache::payout.lt(pc.payout).or(hive_posts_cache::payout
                            .eq(pc.payout)
                            .and(hive_posts_cache::post_id.gt(pc.post_id))),
                    );
                }
                query
            }
        };

        query
            .load::<PostCacheRow>(tx)
            .await
            .map(|rows| rows.into_iter().map(PostCacheEntry::from).collect())
            .map_err(map_diesel_error)
    }
}

#[async_trait]
impl FeedCacheStore for DieselStore {
    async fn feed_cache_insert(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        diesel::insert_into(hive_feed_cache::table)
            .values(FeedCacheRow {
                post_id,
                account_id,
                created_at,
            })
            .on_conflict_do_nothing()
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn feed_cache_delete(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let result = match account_id {
            Some(account_id) => {
                diesel::delete(
                    hive_feed_cache::table
                        .filter(hive_feed_cache::post_id.eq(post_id))
                        .filter(hive_feed_cache::account_id.eq(account_id)),
                )
                .execute(tx)
                .await
            }
            None => {
                diesel::delete(hive_feed_cache::table.filter(hive_feed_cache::post_id.eq(post_id)))
                    .execute(tx)
                    .await
            }
        };
        result.map(|_| ()).map_err(map_diesel_error)
    }

    async fn feed_cache_contains(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        account_id: i64,
    ) -> Result<bool, StoreError> {
        hive_feed_cache::table
            .find((post_id, account_id))
            .select(hive_feed_cache::post_id)
            .first::<i64>(tx)
            .await
            .optional()
            .map(|row| row.is_some())
            .map_err(map_diesel_error)
    }

    async fn feed_cache_count(&self, tx: &mut Self::Tx) -> Result<i64, StoreError> {
        hive_feed_cache::table
            .count()
            .get_result(tx)
            .await
            .map_err(map_diesel_error)
    }

    async fn rebuild_feed_cache(&self, tx: &mut Self::Tx, truncate: bool) -> Result<(), StoreError> {
        if truncate {
            tx.batch_execute("TRUNCATE TABLE hive_feed_cache")
                .await
                .map_err(map_diesel_error)?;
        }
        sql_query(
            "INSERT INTO hive_feed_cache (account_id, post_id, created_at) \
             SELECT hive_accounts.id, hive_posts.id, hive_posts.created_at \
               FROM hive_posts \
               JOIN hive_accounts ON hive_posts.author = hive_accounts.name \
              WHERE hive_posts.depth = 0 AND hive_posts.is_deleted = false \
             ON CONFLICT DO NOTHING",
        )
        .execute(tx)
        .await
        .map_err(map_diesel_error)?;
        sql_query(
            "INSERT INTO hive_feed_cache (account_id, post_id, created_at) \
             SELECT hive_accounts.id, hive_reblogs.post_id, hive_reblogs.created_at \
               FROM hive_reblogs \
               JOIN hive_accounts ON hive_reblogs.account = hive_accounts.name \
             ON CONFLICT DO NOTHING",
        )
        .execute(tx)
        .await
        .map(|_| ())
        .map_err(map_diesel_error)
    }

    async fn blog_entries(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<(i64, DateTime<Utc>)>, StoreError> {
        let mut query = hive_feed_cache::table
            .filter(hive_feed_cache::account_id.eq(account_id))
            .select((hive_feed_cache::post_id, hive_feed_cache::created_at))
            .order((hive_feed_cache::created_at.desc(), hive_feed_cache::post_id.desc()))
            .limit(i64::from(limit))
            .into_boxed();
        if let Some(cutoff) = before {
            query = query.filter(hive_feed_cache::created_at.lt(cutoff));
        }
        query.load(tx).await.map_err(map_diesel_error)
    }
}

#[async_trait]
impl FollowStore for DieselStore {
    async fn follow_between(
        &self,
        tx: &mut Self::Tx,
        follower_id: i64,
        following_id: i64,
    ) -> Result<Option<Follow>, StoreError> {
        hive_follows::table
            .find((follower_id, following_id))
            .select(FollowRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Follow::from))
            .map_err(map_diesel_error)
    }

    async fn upsert_follow(&self, tx: &mut Self::Tx, follow: &Follow) -> Result<(), StoreError> {
        let row = FollowRow::from(follow);
        diesel::insert_into(hive_follows::table)
            .values(&row)
            .on_conflict((hive_follows::follower, hive_follows::following))
            .do_update()
            .set(hive_follows::state.eq(row.state))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn followers_of(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        state_bit: i16,
        start_after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Follow>, StoreError> {
        let mut query = hive_follows::table
            .filter(hive_follows::following.eq(account_id))
            .filter(state_bit_match(state_bit))
            .select(FollowRow::as_select())
            .order(hive_follows::follower.asc())
            .limit(i64::from(limit))
            .into_boxed();
        if let Some(after) = start_after {
            query = query.filter(hive_follows::follower.gt(after));
        }
        query
            .load(tx)
            .await
            .map(|rows| rows.into_iter().map(Follow::from).collect())
            .map_err(map_diesel_error)
    }

    async fn following_of(
        &self,
        tx: &mut Self::Tx,
        account_id: i64,
        state_bit: i16,
        start_after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Follow>, StoreError> {
        let mut query = hive_follows::table
            .filter(hive_follows::follower.eq(account_id))
            .filter(state_bit_match(state_bit))
            .select(FollowRow::as_select())
            .order(hive_follows::following.asc())
            .limit(i64::from(limit))
            .into_boxed();
        if let Some(after) = start_after {
            query = query.filter(hive_follows::following.gt(after));
        }
        query
            .load(tx)
            .await
            .map(|rows| rows.into_iter().map(Follow::from).collect())
            .map_err(map_diesel_error)
    }

    async fn recount_follows(&self, tx: &mut Self::Tx) -> Result<(), StoreError> {
        sql_query(
            "UPDATE hive_accounts SET \
             followers = (SELECT COUNT(*) FROM hive_follows \
                           WHERE following = hive_accounts.id AND state & 1 != 0), \
             following = (SELECT COUNT(*) FROM hive_follows \
                           WHERE follower = hive_accounts.id AND state & 1 != 0)",
        )
        .execute(tx)
        .await
        .map(|_| ())
        .map_err(map_diesel_error)
    }
}

/// `state & bit != 0` as a SQL fragment; the bit comes from the follow-state
/// enum, never from user input.
fn state_bit_match(bit: i16) -> diesel::expression::SqlLiteral<diesel::sql_types::Bool> {
    diesel::dsl::sql::<diesel::sql_types::Bool>(&format!("state & {bit} != 0"))
}

#[async_trait]
impl ReblogStore for DieselStore {
    async fn reblog_get(
        &self,
        tx: &mut Self::Tx,
        account: &str,
        post_id: i64,
    ) -> Result<Option<Reblog>, StoreError> {
        hive_reblogs::table
            .find((account, post_id))
            .select(ReblogRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Reblog::from))
            .map_err(map_diesel_error)
    }

    async fn create_reblog(&self, tx: &mut Self::Tx, reblog: &Reblog) -> Result<bool, StoreError> {
        diesel::insert_into(hive_reblogs::table)
            .values(ReblogRow {
                account: reblog.account.clone(),
                post_id: reblog.post_id,
                created_at: reblog.created_at,
            })
            .on_conflict_do_nothing()
            .execute(tx)
            .await
            .map(|inserted| inserted > 0)
            .map_err(map_diesel_error)
    }

    async fn delete_reblog(
        &self,
        tx: &mut Self::Tx,
        account: &str,
        post_id: i64,
    ) -> Result<(), StoreError> {
        diesel::delete(
            hive_reblogs::table
                .filter(hive_reblogs::account.eq(account))
                .filter(hive_reblogs::post_id.eq(post_id)),
        )
        .execute(tx)
        .await
        .map(|_| ())
        .map_err(map_diesel_error)
    }
}

#[async_trait]
impl CommunityStore for DieselStore {
    async fn community_by_id(
        &self,
        tx: &mut Self::Tx,
        id: i64,
    ) -> Result<Option<Community>, StoreError> {
        hive_communities::table
            .find(id)
            .select(CommunityRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Community::from))
            .map_err(map_diesel_error)
    }

    async fn community_by_name(
        &self,
        tx: &mut Self::Tx,
        name: &str,
    ) -> Result<Option<Community>, StoreError> {
        hive_communities::table
            .filter(hive_communities::name.eq(name))
            .select(CommunityRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Community::from))
            .map_err(map_diesel_error)
    }

    async fn create_community(
        &self,
        tx: &mut Self::Tx,
        community: &Community,
    ) -> Result<(), StoreError> {
        diesel::insert_into(hive_communities::table)
            .values(CommunityRow::from(community))
            .on_conflict_do_nothing()
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn update_community_props(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        props: &CommunityProps,
    ) -> Result<(), StoreError> {
        // Diesel's changeset skips None fields, which is exactly the partial
        // update the props allow-list wants.
        #[derive(AsChangeset)]
        #[diesel(table_name = hive_communities)]
        struct PropsChangeset<'a> {
            title: Option<&'a str>,
            about: Option<&'a str>,
            lang: Option<&'a str>,
            description: Option<&'a str>,
            flag_text: Option<&'a str>,
            is_nsfw: Option<bool>,
            settings: Option<&'a str>,
        }

        if props.is_empty() {
            return Ok(());
        }
        let changeset = PropsChangeset {
            title: props.title.as_deref(),
            about: props.about.as_deref(),
            lang: props.lang.as_deref(),
            description: props.description.as_deref(),
            flag_text: props.flag_text.as_deref(),
            is_nsfw: props.is_nsfw,
            settings: props.settings.as_deref(),
        };
        diesel::update(hive_communities::table.find(id))
            .set(changeset)
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn adjust_subscribers(
        &self,
        tx: &mut Self::Tx,
        id: i64,
        delta: i64,
    ) -> Result<(), StoreError> {
        sql_query(
            "UPDATE hive_communities \
                SET subscribers = GREATEST(0, subscribers + $1) \
              WHERE id = $2",
        )
        .bind::<BigInt, _>(delta)
        .bind::<BigInt, _>(id)
        .execute(tx)
        .await
        .map(|_| ())
        .map_err(map_diesel_error)
    }

    async fn list_communities(
        &self,
        tx: &mut Self::Tx,
        start_after: Option<String>,
        limit: u32,
    ) -> Result<Vec<Community>, StoreError> {
        // Rank ordering with a name seek needs the pivot's rank first.
        let pivot: Option<CommunityRow> = match start_after {
            None => None,
            Some(name) => hive_communities::table
                .filter(hive_communities::name.eq(name))
                .select(CommunityRow::as_select())
                .first(tx)
                .await
                .optional()
                .map_err(map_diesel_error)?,
        };

        let mut query = hive_communities::table
            .select(CommunityRow::as_select())
            .order((hive_communities::rank.desc(), hive_communities::id.asc()))
            .limit(i64::from(limit))
            .into_boxed();
        if let Some(pivot) = pivot {
            query = query.filter(
                hive_communities::rank.lt(pivot.rank).or(hive_communities::rank
                    .eq(pivot.rank)
                    .and(hive_communities::id.gt(pivot.id))),
            );
        }
        query
            .load(tx)
            .await
            .map(|rows| rows.into_iter().map(Community::from).collect())
            .map_err(map_diesel_error)
    }

    async fn role_get(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<Option<Role>, StoreError> {
        hive_roles::table
            .find((community_id, account_id))
            .select(RoleRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Role::from))
            .map_err(map_diesel_error)
    }

    async fn upsert_role(&self, tx: &mut Self::Tx, role: &Role) -> Result<(), StoreError> {
        let row = RoleRow::from(role);
        diesel::insert_into(hive_roles::table)
            .values(&row)
            .on_conflict((hive_roles::community_id, hive_roles::account_id))
            .do_update()
            .set(hive_roles::role_id.eq(row.role_id))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn set_role_title(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
        title: &str,
    ) -> Result<(), StoreError> {
        diesel::update(hive_roles::table.find((community_id, account_id)))
            .set(hive_roles::title.eq(title))
            .execute(tx)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn subscription_get(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<Option<Subscription>, StoreError> {
        hive_subscriptions::table
            .find((community_id, account_id))
            .select(SubscriptionRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(Subscription::from))
            .map_err(map_diesel_error)
    }

    async fn create_subscription(
        &self,
        tx: &mut Self::Tx,
        subscription: &Subscription,
    ) -> Result<bool, StoreError> {
        diesel::insert_into(hive_subscriptions::table)
            .values(SubscriptionRow {
                community_id: subscription.community_id,
                account_id: subscription.account_id,
                created_at: subscription.created_at,
            })
            .on_conflict_do_nothing()
            .execute(tx)
            .await
            .map(|inserted| inserted > 0)
            .map_err(map_diesel_error)
    }

    async fn delete_subscription(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        account_id: i64,
    ) -> Result<bool, StoreError> {
        diesel::delete(hive_subscriptions::table.find((community_id, account_id)))
            .execute(tx)
            .await
            .map(|deleted| deleted > 0)
            .map_err(map_diesel_error)
    }
}

#[async_trait]
impl NotificationStore for DieselStore {
    async fn create_notification(
        &self,
        tx: &mut Self::Tx,
        notification: NewNotification,
    ) -> Result<i64, StoreError> {
        diesel::insert_into(hive_notifs::table)
            .values(NewNotificationRow::from(notification))
            .returning(hive_notifs::id)
            .get_result(tx)
            .await
            .map_err(map_diesel_error)
    }

    async fn notifications_by_dst(
        &self,
        tx: &mut Self::Tx,
        dst_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut query = hive_notifs::table
            .filter(hive_notifs::dst_id.eq(dst_id))
            .filter(hive_notifs::score.ge(min_score))
            .select(NotificationRow::as_select())
            .order(hive_notifs::id.desc())
            .limit(i64::from(limit))
            .into_boxed();
        if let Some(last) = last_id {
            query = query.filter(hive_notifs::id.lt(last));
        }
        collect_notifications(query.load(tx).await)
    }

    async fn notifications_by_post(
        &self,
        tx: &mut Self::Tx,
        post_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut query = hive_notifs::table
            .filter(hive_notifs::post_id.eq(post_id))
            .filter(hive_notifs::score.ge(min_score))
            .select(NotificationRow::as_select())
            .order(hive_notifs::id.desc())
            .limit(i64::from(limit))
            .into_boxed();
        if let Some(last) = last_id {
            query = query.filter(hive_notifs::id.lt(last));
        }
        collect_notifications(query.load(tx).await)
    }

    async fn notifications_by_community(
        &self,
        tx: &mut Self::Tx,
        community_id: i64,
        min_score: i16,
        last_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut query = hive_notifs::table
            .filter(hive_notifs::community_id.eq(community_id))
            .filter(hive_notifs::score.ge(min_score))
            .select(NotificationRow::as_select())
            .order(hive_notifs::id.desc())
            .limit(i64::from(limit))
            .into_boxed();
        if let Some(last) = last_id {
            query = query.filter(hive_notifs::id.lt(last));
        }
        collect_notifications(query.load(tx).await)
    }

    async fn count_unread_notifications(
        &self,
        tx: &mut Self::Tx,
        dst_id: i64,
        lastread_at: DateTime<Utc>,
        min_score: i16,
    ) -> Result<i64, StoreError> {
        hive_notifs::table
            .filter(hive_notifs::dst_id.eq(dst_id))
            .filter(hive_notifs::score.ge(min_score))
            .filter(hive_notifs::created_at.gt(lastread_at))
            .count()
            .get_result(tx)
            .await
            .map_err(map_diesel_error)
    }
}

fn collect_notifications(
    rows: Result<Vec<NotificationRow>, diesel::result::Error>,
) -> Result<Vec<Notification>, StoreError> {
    rows.map_err(map_diesel_error)?
        .into_iter()
        .map(Notification::try_from)
        .collect()
}

#[async_trait]
impl PaymentStore for DieselStore {
    async fn create_payment(
        &self,
        tx: &mut Self::Tx,
        payment: NewPayment,
    ) -> Result<i64, StoreError> {
        diesel::insert_into(hive_payments::table)
            .values(NewPaymentRow::from(payment))
            .returning(hive_payments::id)
            .get_result(tx)
            .await
            .map_err(map_diesel_error)
    }
}

#[async_trait]
impl StateStore for DieselStore {
    async fn state_get(&self, tx: &mut Self::Tx) -> Result<Option<StateRecord>, StoreError> {
        hive_state::table
            .select(StateRow::as_select())
            .first(tx)
            .await
            .optional()
            .map(|row| row.map(StateRecord::from))
            .map_err(map_diesel_error)
    }

    async fn state_upsert(&self, tx: &mut Self::Tx, state: &StateRecord) -> Result<(), StoreError> {
        let row = StateRow::from(state);
        sql_query(
            "INSERT INTO hive_state \
                 (block_num, db_version, steem_per_mvest, usd_per_steem, sbd_per_steem, dgpo) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (block_num) DO UPDATE SET \
                 db_version = EXCLUDED.db_version, \
                 steem_per_mvest = EXCLUDED.steem_per_mvest, \
                 usd_per_steem = EXCLUDED.usd_per_steem, \
                 sbd_per_steem = EXCLUDED.sbd_per_steem, \
                 dgpo = EXCLUDED.dgpo",
        )
        .bind::<BigInt, _>(row.block_num)
        .bind::<BigInt, _>(row.db_version)
        .bind::<diesel::sql_types::Double, _>(row.steem_per_mvest)
        .bind::<diesel::sql_types::Double, _>(row.usd_per_steem)
        .bind::<diesel::sql_types::Double, _>(row.sbd_per_steem)
        .bind::<diesel::sql_types::Text, _>(row.dgpo)
        .execute(tx)
        .await
        .map(|_| ())
        .map_err(map_diesel_error)
    }
}
