//! Sync-controller and dirty-flusher behaviour over fixtures.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use apiary::domain::account::NewAccount;
use apiary::domain::indexer::{BlockOutcome, DirtyFlusher, SyncController, SyncSettings};
use apiary::domain::ports::{
    AccountStore, BlockStore, FeedCacheStore, PostCacheStore, PostStore, Storage,
};
use apiary::domain::NewPost;
use apiary::test_support::{FixtureChainSource, MemoryStore};

mod common;
use common::{account_create, block, block_time, comment, custom_json};

fn settings(max_batch: u32, test_max_block: u64) -> SyncSettings {
    SyncSettings {
        max_batch,
        sync_interval: Duration::from_millis(10),
        test_max_block,
    }
}

#[tokio::test]
async fn initial_sync_reconciles_feed_cache() {
    let chain = Arc::new(FixtureChainSource::with_blocks(vec![
        block(1, vec![account_create("alice"), account_create("bob")]),
        block(2, vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)]),
        block(3, vec![comment("alice", "p2", None, r#"{"tags":["steem"]}"#)]),
        block(
            4,
            vec![custom_json(
                "follow",
                "bob",
                r#"["reblog",{"account":"bob","author":"alice","permlink":"p1"}]"#,
            )],
        ),
        block(
            5,
            vec![json!(["delete_comment_operation", { "author": "alice", "permlink": "p2" }])],
        ),
    ]));
    let store = Arc::new(MemoryStore::default());

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller = SyncController::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        settings(2, 5),
        None,
        shutdown_rx,
    );
    controller.run().await.expect("sync completes");

    let mut tx = store.session().await.expect("session");

    // Blocks are dense 1..=5.
    for num in 1..=5 {
        assert!(
            store.block_by_num(&mut tx, num).await.expect("query").is_some(),
            "block {num} present"
        );
    }
    assert_eq!(store.head_block_num(&mut tx).await.expect("query"), Some(5));

    // Feed cache holds exactly the live root post under its author plus the
    // reblog: p1/alice, p1/bob. The deleted p2 contributes nothing.
    let alice = store
        .account_by_name(&mut tx, "alice")
        .await
        .expect("query")
        .expect("alice")
        .id;
    let bob = store
        .account_by_name(&mut tx, "bob")
        .await
        .expect("query")
        .expect("bob")
        .id;
    let p1 = store
        .post_by_author_permlink(&mut tx, "alice", "p1")
        .await
        .expect("query")
        .expect("p1")
        .id;
    assert_eq!(store.feed_cache_count(&mut tx).await.expect("query"), 2);
    assert!(store
        .feed_cache_contains(&mut tx, p1, alice)
        .await
        .expect("query"));
    assert!(store
        .feed_cache_contains(&mut tx, p1, bob)
        .await
        .expect("query"));
}

#[tokio::test]
async fn live_sync_resumes_from_persisted_head() {
    let chain = Arc::new(FixtureChainSource::with_blocks(vec![
        block(1, vec![account_create("alice")]),
        block(2, vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)]),
        block(3, vec![]),
        block(4, vec![]),
    ]));
    let store = Arc::new(MemoryStore::default());

    // First pass: catch up fully.
    let (_tx1, rx1) = watch::channel(false);
    SyncController::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        settings(10, 4),
        None,
        rx1,
    )
    .run()
    .await
    .expect("first sync");

    // Second pass over the same fixture: nothing to do, and nothing breaks.
    let (_tx2, rx2) = watch::channel(false);
    SyncController::new(
        Arc::clone(&store),
        Arc::clone(&chain),
        settings(10, 4),
        None,
        rx2,
    )
    .run()
    .await
    .expect("second sync");

    let mut tx = store.session().await.expect("session");
    assert_eq!(store.head_block_num(&mut tx).await.expect("query"), Some(4));
}

#[tokio::test]
async fn dirty_flusher_refreshes_accounts_and_posts() {
    let store = Arc::new(MemoryStore::default());
    let chain = Arc::new(FixtureChainSource::default());

    let when = block_time(1);
    {
        let mut tx = store.begin().await.expect("begin");
        store
            .create_account(&mut tx, NewAccount::registered("alice", when))
            .await
            .expect("account");
        store
            .create_post(
                &mut tx,
                NewPost {
                    parent_id: None,
                    author: "alice".into(),
                    permlink: "p1".into(),
                    category: "steem".into(),
                    community_id: None,
                    created_at: when,
                    depth: 0,
                    is_muted: false,
                    is_valid: true,
                },
            )
            .await
            .expect("post");
        store.commit(tx).await.expect("commit");
    }

    chain.set_account(
        "alice",
        json!({
            "name": "alice",
            "json_metadata": r#"{"profile":{"name":"Alice","about":"writes"}}"#,
        }),
    );
    chain.set_content(
        "alice",
        "p1",
        json!({
            "author": "alice",
            "permlink": "p1",
            "category": "steem",
            "title": "hello",
            "body": "world",
            "json_metadata": "{}",
            "created": "2019-06-01T12:00:03",
            "net_rshares": "9000000000",
            "children": 0,
            "total_payout_value": "0.000 SBD",
            "curator_payout_value": "0.000 SBD",
            "pending_payout_value": "1.500 SBD",
            "promoted": "0.000 SBD",
            "cashout_time": "2019-06-08T12:00:03",
            "active_votes": [],
        }),
    );

    let (handle, join) = DirtyFlusher::spawn(Arc::clone(&store), Arc::clone(&chain), 100);
    handle.submit(&BlockOutcome {
        block_num: 1,
        dirty_accounts: BTreeSet::from(["alice".to_owned()]),
        dirty_posts: BTreeSet::from([("alice".to_owned(), "p1".to_owned())]),
    });
    drop(handle);
    join.await.expect("flusher exits");

    let mut tx = store.session().await.expect("session");
    let alice = store
        .account_by_name(&mut tx, "alice")
        .await
        .expect("query")
        .expect("alice");
    assert_eq!(alice.display_name.as_deref(), Some("Alice"));
    assert_eq!(alice.about.as_deref(), Some("writes"));

    let post_id = store
        .post_by_author_permlink(&mut tx, "alice", "p1")
        .await
        .expect("query")
        .expect("post")
        .id;
    let cached = store
        .post_cache_by_id(&mut tx, post_id)
        .await
        .expect("query")
        .expect("cache entry");
    assert_eq!(cached.title, "hello");
    assert_eq!(cached.rshares, 9_000_000_000);
    assert!((cached.payout - 1.5).abs() < 1e-9);
    assert!(!cached.is_paidout);
    assert!(cached.sc_trend > 0.0);
}
