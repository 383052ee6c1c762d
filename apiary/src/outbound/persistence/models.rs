//! Diesel row models and their domain conversions.
//!
//! Row structs mirror the schema; conversion into domain types happens at
//! the adapter boundary so Diesel derives never leak into `domain`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::domain::account::Account;
use crate::domain::block::BlockRecord;
use crate::domain::community::{Community, CommunityRole, Role, Subscription};
use crate::domain::follow::{Follow, FollowState};
use crate::domain::notification::{NewNotification, Notification, NotifyKind};
use crate::domain::payment::NewPayment;
use crate::domain::ports::{StateRecord, StoreError};
use crate::domain::post::{NewPost, Post};
use crate::domain::post_cache::PostCacheEntry;
use crate::domain::reblog::Reblog;

use super::schema::{
    hive_accounts, hive_blocks, hive_communities, hive_feed_cache, hive_follows, hive_notifs,
    hive_payments, hive_posts, hive_posts_cache, hive_reblogs, hive_roles, hive_state,
    hive_subscriptions, hive_trxid_block_num,
};

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = hive_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub reputation: f64,
    pub followers: i64,
    pub following: i64,
    pub lastread_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub profile_image: Option<String>,
    pub cover_image: Option<String>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            reputation: row.reputation,
            followers: row.followers,
            following: row.following,
            lastread_at: row.lastread_at,
            cached_at: row.cached_at,
            display_name: row.display_name,
            about: row.about,
            location: row.location,
            website: row.website,
            profile_image: row.profile_image,
            cover_image: row.cover_image,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = hive_accounts)]
pub struct NewAccountRow<'a> {
    pub name: &'a str,
    pub created_at: DateTime<Utc>,
    pub reputation: f64,
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_blocks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BlockRow {
    pub num: i64,
    pub hash: String,
    pub prev: Option<String>,
    pub txs: i16,
    #[diesel(column_name = ops_count)]
    pub ops: i16,
    pub created_at: DateTime<Utc>,
}

impl From<BlockRow> for BlockRecord {
    fn from(row: BlockRow) -> Self {
        Self {
            num: row.num,
            hash: row.hash,
            prev: row.prev,
            txs: row.txs,
            ops: row.ops,
            created_at: row.created_at,
        }
    }
}

impl From<&BlockRecord> for BlockRow {
    fn from(block: &BlockRecord) -> Self {
        Self {
            num: block.num,
            hash: block.hash.clone(),
            prev: block.prev.clone(),
            txs: block.txs,
            ops: block.ops,
            created_at: block.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = hive_posts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PostRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub community_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub depth: i16,
    pub is_deleted: bool,
    pub is_pinned: bool,
    pub is_muted: bool,
    pub is_valid: bool,
    pub promoted: f64,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            parent_id: row.parent_id,
            author: row.author,
            permlink: row.permlink,
            category: row.category,
            community_id: row.community_id,
            created_at: row.created_at,
            depth: row.depth,
            is_deleted: row.is_deleted,
            is_pinned: row.is_pinned,
            is_muted: row.is_muted,
            is_valid: row.is_valid,
            promoted: row.promoted,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = hive_posts)]
pub struct NewPostRow {
    pub parent_id: Option<i64>,
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub community_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub depth: i16,
    pub is_deleted: bool,
    pub is_pinned: bool,
    pub is_muted: bool,
    pub is_valid: bool,
    pub promoted: f64,
}

impl From<NewPost> for NewPostRow {
    fn from(post: NewPost) -> Self {
        Self {
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
        }
    }
}

#[derive(Debug, Queryable, QueryableByName, Selectable, Insertable)]
#[diesel(table_name = hive_posts_cache)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PostCacheRow {
    pub post_id: i64,
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub depth: i16,
    pub title: String,
    pub preview: String,
    pub body: String,
    pub img_url: String,
    pub json_metadata: String,
    pub payout: f64,
    pub promoted: f64,
    pub rshares: i64,
    pub votes: String,
    pub children: i32,
    pub sc_trend: f64,
    pub sc_hot: f64,
    pub is_paidout: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PostCacheRow> for PostCacheEntry {
    fn from(row: PostCacheRow) -> Self {
        Self {
            post_id: row.post_id,
            author: row.author,
            permlink: row.permlink,
            category: row.category,
            depth: row.depth,
            title: row.title,
            preview: row.preview,
            body: row.body,
            img_url: row.img_url,
            json_metadata: row.json_metadata,
            payout: row.payout,
            promoted: row.promoted,
            rshares: row.rshares,
            votes: row.votes,
            children: row.children,
            sc_trend: row.sc_trend,
            sc_hot: row.sc_hot,
            is_paidout: row.is_paidout,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<&PostCacheEntry> for PostCacheRow {
    fn from(entry: &PostCacheEntry) -> Self {
        Self {
            post_id: entry.post_id,
            author: entry.author.clone(),
            permlink: entry.permlink.clone(),
            category: entry.category.clone(),
            depth: entry.depth,
            title: entry.title.clone(),
            preview: entry.preview.clone(),
            body: entry.body.clone(),
            img_url: entry.img_url.clone(),
            json_metadata: entry.json_metadata.clone(),
            payout: entry.payout,
            promoted: entry.promoted,
            rshares: entry.rshares,
            votes: entry.votes.clone(),
            children: entry.children,
            sc_trend: entry.sc_trend,
            sc_hot: entry.sc_hot,
            is_paidout: entry.is_paidout,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_feed_cache)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FeedCacheRow {
    pub post_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_follows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FollowRow {
    pub follower: i64,
    pub following: i64,
    pub state: i16,
    pub created_at: DateTime<Utc>,
}

impl From<FollowRow> for Follow {
    fn from(row: FollowRow) -> Self {
        Self {
            follower_id: row.follower,
            following_id: row.following,
            state: FollowState(row.state),
            created_at: row.created_at,
        }
    }
}

impl From<&Follow> for FollowRow {
    fn from(follow: &Follow) -> Self {
        Self {
            follower: follow.follower_id,
            following: follow.following_id,
            state: follow.state.0,
            created_at: follow.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_reblogs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReblogRow {
    pub account: String,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

impl From<ReblogRow> for Reblog {
    fn from(row: ReblogRow) -> Self {
        Self {
            account: row.account,
            post_id: row.post_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_communities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CommunityRow {
    pub id: i64,
    pub name: String,
    pub type_id: i16,
    pub lang: String,
    pub title: String,
    pub about: String,
    pub description: String,
    pub flag_text: String,
    pub is_nsfw: bool,
    pub subscribers: i64,
    pub rank: i64,
    pub category: String,
    pub settings: String,
    pub created_at: DateTime<Utc>,
}

impl From<CommunityRow> for Community {
    fn from(row: CommunityRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            type_id: row.type_id,
            lang: row.lang,
            title: row.title,
            about: row.about,
            description: row.description,
            flag_text: row.flag_text,
            is_nsfw: row.is_nsfw,
            subscribers: row.subscribers,
            rank: row.rank,
            category: row.category,
            settings: row.settings,
            created_at: row.created_at,
        }
    }
}

impl From<&Community> for CommunityRow {
    fn from(community: &Community) -> Self {
        Self {
            id: community.id,
            name: community.name.clone(),
            type_id: community.type_id,
            lang: community.lang.clone(),
            title: community.title.clone(),
            about: community.about.clone(),
            description: community.description.clone(),
            flag_text: community.flag_text.clone(),
            is_nsfw: community.is_nsfw,
            subscribers: community.subscribers,
            rank: community.rank,
            category: community.category.clone(),
            settings: community.settings.clone(),
            created_at: community.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_roles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RoleRow {
    pub community_id: i64,
    pub account_id: i64,
    pub role_id: i16,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            community_id: row.community_id,
            account_id: row.account_id,
            role: CommunityRole::from_i16(row.role_id),
            title: row.title,
            created_at: row.created_at,
        }
    }
}

impl From<&Role> for RoleRow {
    fn from(role: &Role) -> Self {
        Self {
            community_id: role.community_id,
            account_id: role.account_id,
            role_id: role.role.as_i16(),
            title: role.title.clone(),
            created_at: role.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SubscriptionRow {
    pub community_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            community_id: row.community_id,
            account_id: row.account_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = hive_notifs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationRow {
    pub id: i64,
    pub kind: i16,
    pub score: i16,
    pub created_at: DateTime<Utc>,
    pub src_id: Option<i64>,
    pub dst_id: Option<i64>,
    pub community_id: Option<i64>,
    pub post_id: Option<i64>,
    pub payload: Option<String>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, StoreError> {
        let kind = NotifyKind::from_i16(row.kind).ok_or_else(|| {
            StoreError::serialization(format!("unknown notification kind {}", row.kind))
        })?;
        Ok(Self {
            id: row.id,
            kind,
            score: row.score,
            created_at: row.created_at,
            src_id: row.src_id,
            dst_id: row.dst_id,
            community_id: row.community_id,
            post_id: row.post_id,
            payload: row.payload,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = hive_notifs)]
pub struct NewNotificationRow {
    pub kind: i16,
    pub score: i16,
    pub created_at: DateTime<Utc>,
    pub src_id: Option<i64>,
    pub dst_id: Option<i64>,
    pub community_id: Option<i64>,
    pub post_id: Option<i64>,
    pub payload: Option<String>,
}

impl From<NewNotification> for NewNotificationRow {
    fn from(notification: NewNotification) -> Self {
        Self {
            kind: notification.kind.as_i16(),
            score: notification.score,
            created_at: notification.created_at,
            src_id: notification.src_id,
            dst_id: notification.dst_id,
            community_id: notification.community_id,
            post_id: notification.post_id,
            payload: notification.payload,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = hive_payments)]
pub struct NewPaymentRow {
    pub block_num: i64,
    pub tx_idx: i16,
    pub from_account: String,
    pub to_account: String,
    pub amount: f64,
    pub token: String,
    pub memo: String,
    pub post_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<NewPayment> for NewPaymentRow {
    fn from(payment: NewPayment) -> Self {
        Self {
            block_num: payment.block_num,
            tx_idx: payment.tx_idx,
            from_account: payment.from_account,
            to_account: payment.to_account,
            amount: payment.amount,
            token: payment.token.as_str().to_owned(),
            memo: payment.memo,
            post_id: payment.post_id,
            created_at: payment.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_trxid_block_num)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrxBlockRow {
    pub trx_id: String,
    pub block_num: i64,
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = hive_state)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StateRow {
    pub block_num: i64,
    pub db_version: i64,
    pub steem_per_mvest: f64,
    pub usd_per_steem: f64,
    pub sbd_per_steem: f64,
    pub dgpo: String,
}

impl From<StateRow> for StateRecord {
    fn from(row: StateRow) -> Self {
        Self {
            block_num: row.block_num,
            db_version: row.db_version,
            steem_per_mvest: row.steem_per_mvest,
            usd_per_steem: row.usd_per_steem,
            sbd_per_steem: row.sbd_per_steem,
            dgpo: row.dgpo,
        }
    }
}

impl From<&StateRecord> for StateRow {
    fn from(state: &StateRecord) -> Self {
        Self {
            block_num: state.block_num,
            db_version: state.db_version,
            steem_per_mvest: state.steem_per_mvest,
            usd_per_steem: state.usd_per_steem,
            sbd_per_steem: state.sbd_per_steem,
            dgpo: state.dgpo.clone(),
        }
    }
}
