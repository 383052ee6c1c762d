//! Read-method behaviour over an indexed in-memory projection.

use std::sync::Arc;

use serde_json::json;

use apiary::domain::indexer::BlockProcessor;
use apiary::domain::ports::{PostCacheStore, PostStore, Storage};
use apiary::domain::post_cache::{ranking_score, PostCacheEntry, TREND_TIMESCALE};
use apiary::inbound::http::methods::{dispatch, ApiContext};
use apiary::test_support::MemoryStore;

mod common;
use common::{account_create, block, block_time, comment, custom_json};

async fn indexed_context() -> ApiContext<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    let processor = BlockProcessor::new(Arc::clone(&store));

    let blocks = vec![
        block(
            1,
            vec![account_create("alice"), account_create("bob"), account_create("carol")],
        ),
        block(2, vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)]),
        block(3, vec![comment("alice", "p2", None, r#"{"tags":["life"]}"#)]),
        block(
            4,
            vec![
                custom_json(
                    "follow",
                    "bob",
                    r#"{"follower":"bob","following":"alice","what":["blog"]}"#,
                ),
                custom_json(
                    "follow",
                    "carol",
                    r#"{"follower":"carol","following":"alice","what":["blog"]}"#,
                ),
            ],
        ),
        block(
            5,
            vec![custom_json(
                "follow",
                "bob",
                r#"["reblog",{"account":"bob","author":"alice","permlink":"p1"}]"#,
            )],
        ),
    ];
    for payload in &blocks {
        processor
            .process_block(payload, false)
            .await
            .expect("block processes");
    }

    ApiContext { store, cache: None }
}

/// Seed a cache row for an existing post, deriving identity from the post
/// row and the trending score from the given rshares.
async fn seed_cache_entry(store: &MemoryStore, post_id: i64, rshares: i64) {
    let mut tx = store.session().await.expect("session");
    let post = store
        .post_by_id(&mut tx, post_id)
        .await
        .expect("query")
        .expect("post");
    let created_at = block_time(post_id);
    let entry = PostCacheEntry {
        post_id,
        author: post.author,
        permlink: post.permlink,
        category: "steem".into(),
        depth: 0,
        title: format!("post {post_id}"),
        preview: String::new(),
        body: String::new(),
        img_url: String::new(),
        json_metadata: "{}".into(),
        payout: rshares as f64 / 1e9,
        promoted: 0.0,
        rshares,
        votes: String::new(),
        children: 0,
        sc_trend: ranking_score(rshares, created_at, TREND_TIMESCALE),
        sc_hot: 0.0,
        is_paidout: false,
        created_at,
        updated_at: created_at,
    };
    store
        .upsert_post_cache(&mut tx, &entry)
        .await
        .expect("upsert");
}

#[tokio::test]
async fn follow_lists_resolve_names() {
    let ctx = indexed_context().await;

    let followers = dispatch(
        &ctx,
        "condenser_api.get_followers",
        &json!(["alice", null, "blog", 10]),
    )
    .await
    .expect("followers");
    let names: Vec<&str> = followers
        .as_array()
        .expect("array")
        .iter()
        .map(|entry| entry["follower"].as_str().expect("name"))
        .collect();
    assert_eq!(names, vec!["bob", "carol"]);

    let count = dispatch(&ctx, "condenser_api.get_follow_count", &json!(["alice"]))
        .await
        .expect("count");
    assert_eq!(count["follower_count"], 2);
    assert_eq!(count["following_count"], 0);
}

#[tokio::test]
async fn blog_merges_own_posts_and_reblogs() {
    let ctx = indexed_context().await;

    let blog = dispatch(&ctx, "condenser_api.get_blog", &json!(["bob", 10]))
        .await
        .expect("blog");
    let entries = blog.as_array().expect("array");
    // Bob has no posts of his own; his blog is the single reblog of p1.
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["blog"], "bob");

    let alice_blog = dispatch(&ctx, "condenser_api.get_blog", &json!(["alice", 10]))
        .await
        .expect("blog");
    assert_eq!(alice_blog.as_array().expect("array").len(), 2);
}

#[tokio::test]
async fn trending_orders_by_score_with_cursor() {
    let ctx = indexed_context().await;
    seed_cache_entry(&ctx.store, 1, 1_000_000_000).await;
    seed_cache_entry(&ctx.store, 2, 500_000_000_000).await;

    let page = dispatch(
        &ctx,
        "condenser_api.get_discussions_by_trending",
        &json!([{ "limit": 1 }]),
    )
    .await
    .expect("page");
    let first = &page.as_array().expect("array")[0];
    assert_eq!(first["post_id"], 2);

    let next = dispatch(
        &ctx,
        "condenser_api.get_discussions_by_trending",
        &json!([{
            "limit": 1,
            "start_author": first["author"],
            "start_permlink": first["permlink"],
        }]),
    )
    .await
    .expect("next page");
    assert_eq!(next.as_array().expect("array")[0]["post_id"], 1);
}

#[tokio::test]
async fn notifications_page_descending_with_seek() {
    let ctx = indexed_context().await;

    let notifications = dispatch(
        &ctx,
        "hive_api.get_notifications",
        &json!({ "account": "alice", "min_score": 0, "limit": 10 }),
    )
    .await
    .expect("notifications");
    let entries = notifications.as_array().expect("array");
    // The reblog of p1 notified alice.
    assert!(!entries.is_empty());
    assert_eq!(entries[0]["type"], "reblog");

    let first_id = entries[0]["id"].as_i64().expect("id");
    let next = dispatch(
        &ctx,
        "hive_api.get_notifications",
        &json!({ "account": "alice", "min_score": 0, "last_id": first_id, "limit": 10 }),
    )
    .await
    .expect("seek page");
    assert!(next
        .as_array()
        .expect("array")
        .iter()
        .all(|entry| entry["id"].as_i64().expect("id") < first_id));

    let unread = dispatch(
        &ctx,
        "hive_api.unread_notifications",
        &json!({ "account": "alice", "min_score": 0 }),
    )
    .await
    .expect("unread");
    assert!(unread["unread"].as_i64().expect("count") >= 1);
}

#[tokio::test]
async fn head_state_reports_cursor() {
    let ctx = indexed_context().await;
    let state = dispatch(&ctx, "hive_api.db_head_state", &json!([]))
        .await
        .expect("state");
    assert_eq!(state["db_head_block"], 5);
    assert!(state["db_head_time"].is_string());
}
