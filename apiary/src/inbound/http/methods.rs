//! Read-method registry and handlers.
//!
//! Thin shaping over the store queries: every method resolves its
//! parameters, consults the advisory cache where it pays off, and returns a
//! JSON value in the historical API's shape. Record-not-found surfaces as a
//! typed `null` or an empty array, never as an RPC error.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::follow::FollowState;
use crate::domain::notification::Notification;
use crate::domain::ports::{
    AccountStore, BlockStore, CommunityStore, FeedCacheStore, FollowStore, IndexStore,
    NotificationStore, PostCacheStore, Storage,
};
use crate::domain::post_cache::{PostCacheEntry, RankedSort};
use crate::domain::DEFAULT_NOTIFY_SCORE;
use crate::outbound::cache::{method_key, RedisCache};

use super::jsonrpc::{opt_param, param, RpcError};

/// Default and maximum page sizes.
const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

/// TTL for cached ranked/listing responses.
const RANKED_TTL: Duration = Duration::from_secs(30);

/// Shared state handed to every request.
pub struct ApiContext<S> {
    pub store: Arc<S>,
    pub cache: Option<RedisCache>,
}

impl<S> Clone for ApiContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: self.cache.clone(),
        }
    }
}

/// Dispatch one method call.
pub async fn dispatch<S: IndexStore>(
    ctx: &ApiContext<S>,
    method: &str,
    params: &Value,
) -> Result<Value, RpcError> {
    if let Some(suffix) = method.strip_prefix("condenser_api.get_discussions_by_") {
        let Some(sort) = RankedSort::from_method_suffix(suffix) else {
            return Err(RpcError::method_not_found(method));
        };
        return get_discussions(ctx, method, sort, params).await;
    }

    match method {
        "condenser_api.get_follow_count" => get_follow_count(ctx, params).await,
        "condenser_api.get_followers" => get_follow_list(ctx, params, Direction::Followers).await,
        "condenser_api.get_following" => get_follow_list(ctx, params, Direction::Following).await,
        "condenser_api.get_blog" => get_blog(ctx, params).await,
        "hive_api.get_notifications" => get_notifications(ctx, params).await,
        "hive_api.unread_notifications" => unread_notifications(ctx, params).await,
        "hive_api.get_community" => get_community(ctx, params).await,
        "hive_api.list_communities" => list_communities(ctx, method, params).await,
        "hive_api.get_trx_block" => get_trx_block(ctx, params).await,
        "hive_api.db_head_state" => db_head_state(ctx).await,
        _ => Err(RpcError::method_not_found(method)),
    }
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

async fn get_follow_count<S: IndexStore>(
    ctx: &ApiContext<S>,
    params: &Value,
) -> Result<Value, RpcError> {
    let account_name: String = param(params, 0, "account")?;
    let mut tx = ctx.store.session().await?;
    let Some(account) = ctx.store.account_by_name(&mut tx, &account_name).await? else {
        return Ok(Value::Null);
    };
    Ok(json!({
        "account": account.name,
        "follower_count": account.followers,
        "following_count": account.following,
    }))
}

#[derive(Clone, Copy)]
enum Direction {
    Followers,
    Following,
}

async fn get_follow_list<S: IndexStore>(
    ctx: &ApiContext<S>,
    params: &Value,
    direction: Direction,
) -> Result<Value, RpcError> {
    let account_name: String = param(params, 0, "account")?;
    let start: Option<String> = opt_param(params, 1, "start")?;
    let follow_type: Option<String> = opt_param(params, 2, "type")?;
    let limit = clamp_limit(opt_param(params, 3, "limit")?);

    let state_bit = match follow_type.as_deref() {
        None | Some("blog") => FollowState::BLOG.0,
        Some("ignore") => FollowState::IGNORE.0,
        Some(other) => {
            return Err(RpcError::invalid_params(format!(
                "unknown follow type {other:?}"
            )))
        }
    };

    let mut tx = ctx.store.session().await?;
    let Some(account) = ctx.store.account_by_name(&mut tx, &account_name).await? else {
        return Ok(json!([]));
    };
    let start_after = match start {
        None => None,
        Some(name) => ctx
            .store
            .account_by_name(&mut tx, &name)
            .await?
            .map(|account| account.id),
    };

    let follows = match direction {
        Direction::Followers => {
            ctx.store
                .followers_of(&mut tx, account.id, state_bit, start_after, limit)
                .await?
        }
        Direction::Following => {
            ctx.store
                .following_of(&mut tx, account.id, state_bit, start_after, limit)
                .await?
        }
    };

    let what = if state_bit == FollowState::IGNORE.0 {
        "ignore"
    } else {
        "blog"
    };
    let mut entries = Vec::with_capacity(follows.len());
    for follow in follows {
        let other_id = match direction {
            Direction::Followers => follow.follower_id,
            Direction::Following => follow.following_id,
        };
        let Some(other) = ctx.store.account_by_id(&mut tx, other_id).await? else {
            continue;
        };
        let (follower, following) = match direction {
            Direction::Followers => (other.name, account.name.clone()),
            Direction::Following => (account.name.clone(), other.name),
        };
        entries.push(json!({
            "follower": follower,
            "following": following,
            "what": [what],
        }));
    }
    Ok(Value::Array(entries))
}

async fn get_blog<S: IndexStore>(ctx: &ApiContext<S>, params: &Value) -> Result<Value, RpcError> {
    let account_name: String = param(params, 0, "account")?;
    let limit = clamp_limit(opt_param(params, 1, "limit")?);
    let before: Option<chrono::DateTime<chrono::Utc>> = opt_param(params, 2, "before")?;

    let mut tx = ctx.store.session().await?;
    let Some(account) = ctx.store.account_by_name(&mut tx, &account_name).await? else {
        return Ok(json!([]));
    };

    let entries = ctx
        .store
        .blog_entries(&mut tx, account.id, before, limit)
        .await?;
    let mut blog = Vec::with_capacity(entries.len());
    for (post_id, entry_created) in entries {
        let post = ctx
            .store
            .post_cache_by_id(&mut tx, post_id)
            .await?
            .map(|entry| post_json(&entry))
            .unwrap_or(Value::Null);
        blog.push(json!({
            "blog": account.name,
            "entry_created": timestamp_json(entry_created),
            "post_id": post_id,
            "post": post,
        }));
    }
    Ok(Value::Array(blog))
}

#[derive(Debug, Default, Deserialize)]
struct DiscussionQuery {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    start_author: Option<String>,
    #[serde(default)]
    start_permlink: Option<String>,
}

fn discussion_query(params: &Value) -> Result<DiscussionQuery, RpcError> {
    let source = match params {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };
    match source {
        Value::Null => Ok(DiscussionQuery::default()),
        value => serde_json::from_value(value)
            .map_err(|err| RpcError::invalid_params(format!("bad discussion query: {err}"))),
    }
}

async fn get_discussions<S: IndexStore>(
    ctx: &ApiContext<S>,
    method: &str,
    sort: RankedSort,
    params: &Value,
) -> Result<Value, RpcError> {
    if let Some(cache) = &ctx.cache {
        if let Some(cached) = cache.get_json::<Value>(&method_key(method, params)).await {
            return Ok(cached);
        }
    }

    let query = discussion_query(params)?;
    let cursor = match (query.start_author, query.start_permlink) {
        (Some(author), Some(permlink)) => Some((author, permlink)),
        (None, None) => None,
        _ => {
            return Err(RpcError::invalid_params(
                "start_author and start_permlink must be given together",
            ))
        }
    };
    let limit = clamp_limit(query.limit);

    let mut tx = ctx.store.session().await?;
    let posts = ctx.store.ranked_posts(&mut tx, sort, cursor, limit).await?;
    let result = Value::Array(posts.iter().map(post_json).collect());

    if let Some(cache) = &ctx.cache {
        cache
            .set_json(&method_key(method, params), &result, RANKED_TTL)
            .await;
    }
    Ok(result)
}

async fn get_notifications<S: IndexStore>(
    ctx: &ApiContext<S>,
    params: &Value,
) -> Result<Value, RpcError> {
    let account: Option<String> = opt_param(params, 0, "account")?;
    let post_id: Option<i64> = opt_param(params, 1, "post_id")?;
    let community: Option<String> = opt_param(params, 2, "community")?;
    let min_score: i16 = opt_param(params, 3, "min_score")?.unwrap_or(DEFAULT_NOTIFY_SCORE);
    let last_id: Option<i64> = opt_param(params, 4, "last_id")?;
    let limit = clamp_limit(opt_param(params, 5, "limit")?);

    let mut tx = ctx.store.session().await?;
    let notifications = match (account, post_id, community) {
        (Some(account), None, None) => {
            let Some(account) = ctx.store.account_by_name(&mut tx, &account).await? else {
                return Ok(json!([]));
            };
            ctx.store
                .notifications_by_dst(&mut tx, account.id, min_score, last_id, limit)
                .await?
        }
        (None, Some(post_id), None) => {
            ctx.store
                .notifications_by_post(&mut tx, post_id, min_score, last_id, limit)
                .await?
        }
        (None, None, Some(community)) => {
            let Some(community) = ctx.store.community_by_name(&mut tx, &community).await? else {
                return Ok(json!([]));
            };
            ctx.store
                .notifications_by_community(&mut tx, community.id, min_score, last_id, limit)
                .await?
        }
        _ => {
            return Err(RpcError::invalid_params(
                "exactly one of account, post_id, community is required",
            ))
        }
    };

    Ok(Value::Array(
        notifications.iter().map(notification_json).collect(),
    ))
}

async fn unread_notifications<S: IndexStore>(
    ctx: &ApiContext<S>,
    params: &Value,
) -> Result<Value, RpcError> {
    let account_name: String = param(params, 0, "account")?;
    let min_score: i16 = opt_param(params, 1, "min_score")?.unwrap_or(DEFAULT_NOTIFY_SCORE);

    let mut tx = ctx.store.session().await?;
    let Some(account) = ctx.store.account_by_name(&mut tx, &account_name).await? else {
        return Ok(Value::Null);
    };
    let unread = ctx
        .store
        .count_unread_notifications(&mut tx, account.id, account.lastread_at, min_score)
        .await?;
    Ok(json!({
        "lastread": timestamp_json(account.lastread_at),
        "unread": unread,
    }))
}

async fn get_community<S: IndexStore>(
    ctx: &ApiContext<S>,
    params: &Value,
) -> Result<Value, RpcError> {
    let name: String = param(params, 0, "name")?;
    let mut tx = ctx.store.session().await?;
    let community = ctx.store.community_by_name(&mut tx, &name).await?;
    Ok(community.map(|c| community_json(&c)).unwrap_or(Value::Null))
}

async fn list_communities<S: IndexStore>(
    ctx: &ApiContext<S>,
    method: &str,
    params: &Value,
) -> Result<Value, RpcError> {
    if let Some(cache) = &ctx.cache {
        if let Some(cached) = cache.get_json::<Value>(&method_key(method, params)).await {
            return Ok(cached);
        }
    }

    let last: Option<String> = opt_param(params, 0, "last")?;
    let limit = clamp_limit(opt_param(params, 1, "limit")?);
    let mut tx = ctx.store.session().await?;
    let communities = ctx.store.list_communities(&mut tx, last, limit).await?;
    let result = Value::Array(communities.iter().map(community_json).collect());

    if let Some(cache) = &ctx.cache {
        cache
            .set_json(&method_key(method, params), &result, RANKED_TTL)
            .await;
    }
    Ok(result)
}

async fn get_trx_block<S: IndexStore>(
    ctx: &ApiContext<S>,
    params: &Value,
) -> Result<Value, RpcError> {
    let trx_id: String = param(params, 0, "trx_id")?;
    let mut tx = ctx.store.session().await?;
    let block_num = ctx.store.block_num_for_trx(&mut tx, &trx_id).await?;
    Ok(block_num.map(|num| json!(num)).unwrap_or(Value::Null))
}

async fn db_head_state<S: IndexStore>(ctx: &ApiContext<S>) -> Result<Value, RpcError> {
    let mut tx = ctx.store.session().await?;
    let Some(head) = ctx.store.head_block_num(&mut tx).await? else {
        return Ok(json!({ "db_head_block": 0, "db_head_time": Value::Null }));
    };
    let block = ctx.store.block_by_num(&mut tx, head).await?;
    Ok(json!({
        "db_head_block": head,
        "db_head_time": block.map(|b| timestamp_json(b.created_at)).unwrap_or(Value::Null),
    }))
}

fn timestamp_json(when: chrono::DateTime<chrono::Utc>) -> Value {
    json!(when.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn post_json(entry: &PostCacheEntry) -> Value {
    json!({
        "post_id": entry.post_id,
        "author": entry.author,
        "permlink": entry.permlink,
        "category": entry.category,
        "depth": entry.depth,
        "title": entry.title,
        "preview": entry.preview,
        "img_url": entry.img_url,
        "payout": entry.payout,
        "promoted": entry.promoted,
        "net_rshares": entry.rshares,
        "children": entry.children,
        "is_paidout": entry.is_paidout,
        "created": timestamp_json(entry.created_at),
    })
}

fn notification_json(notification: &Notification) -> Value {
    json!({
        "id": notification.id,
        "type": notification.kind.as_str(),
        "score": notification.score,
        "date": timestamp_json(notification.created_at),
        "src_id": notification.src_id,
        "dst_id": notification.dst_id,
        "community_id": notification.community_id,
        "post_id": notification.post_id,
        "payload": notification.payload,
    })
}

fn community_json(community: &crate::domain::Community) -> Value {
    json!({
        "id": community.id,
        "name": community.name,
        "type_id": community.type_id,
        "lang": community.lang,
        "title": community.title,
        "about": community.about,
        "subscribers": community.subscribers,
        "rank": community.rank,
        "is_nsfw": community.is_nsfw,
        "created_at": timestamp_json(community.created_at),
    })
}
