//! End-to-end block-processor scenarios over the in-memory store.

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use apiary::domain::indexer::BlockProcessor;
use apiary::domain::ports::{
    AccountStore, BlockPayload, BlockStore, CommunityStore, FeedCacheStore, FollowStore,
    NotificationStore, PostStore, ReblogStore, Storage,
};
use apiary::domain::{CommunityRole, FollowState, NotifyKind};
use apiary::test_support::MemoryStore;

use common::{account_create, base_time, block, comment, custom_json, hex_id};

struct Harness {
    store: Arc<MemoryStore>,
    processor: BlockProcessor<MemoryStore>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let processor = BlockProcessor::new(Arc::clone(&store));
        Self { store, processor }
    }

    async fn process(&self, block: &BlockPayload) {
        self.processor
            .process_block(block, false)
            .await
            .expect("block processes");
    }

    async fn account_id(&self, name: &str) -> i64 {
        let mut tx = self.store.session().await.expect("session");
        self.store
            .account_by_name(&mut tx, name)
            .await
            .expect("query")
            .unwrap_or_else(|| panic!("account {name} exists"))
            .id
    }

    async fn post_id(&self, author: &str, permlink: &str) -> i64 {
        let mut tx = self.store.session().await.expect("session");
        self.store
            .post_by_author_permlink(&mut tx, author, permlink)
            .await
            .expect("query")
            .unwrap_or_else(|| panic!("post @{author}/{permlink} exists"))
            .id
    }

    async fn feed_contains(&self, post_id: i64, account_id: i64) -> bool {
        let mut tx = self.store.session().await.expect("session");
        self.store
            .feed_cache_contains(&mut tx, post_id, account_id)
            .await
            .expect("query")
    }
}

#[tokio::test]
async fn root_post_then_delete() {
    let harness = Harness::new();
    harness.process(&block(99, vec![account_create("alice")])).await;
    harness
        .process(&block(
            100,
            vec![comment("alice", "p1", None, r#"{"tags":["Steem"]}"#)],
        ))
        .await;

    let alice = harness.account_id("alice").await;
    let post = harness.post_id("alice", "p1").await;
    assert!(harness.feed_contains(post, alice).await);

    {
        let mut tx = harness.store.session().await.expect("session");
        let stored = harness
            .store
            .post_by_author_permlink(&mut tx, "alice", "p1")
            .await
            .expect("query")
            .expect("post");
        assert_eq!(stored.category, "steem");
        assert_eq!(stored.depth, 0);
        assert!(!stored.is_deleted);
    }

    harness
        .process(&block(
            101,
            vec![json!(["delete_comment_operation", { "author": "alice", "permlink": "p1" }])],
        ))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    let stored = harness
        .store
        .post_by_author_permlink(&mut tx, "alice", "p1")
        .await
        .expect("query")
        .expect("post");
    assert!(stored.is_deleted);
    assert!(!harness.feed_contains(post, alice).await);
}

#[tokio::test]
async fn reblog_lifecycle() {
    let harness = Harness::new();
    harness
        .process(&block(99, vec![account_create("alice"), account_create("bob")]))
        .await;
    harness
        .process(&block(
            100,
            vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)],
        ))
        .await;

    let reblog_json =
        r#"["reblog",{"account":"bob","author":"alice","permlink":"p1"}]"#;
    harness
        .process(&block(200, vec![custom_json("follow", "bob", reblog_json)]))
        .await;

    let bob = harness.account_id("bob").await;
    let alice = harness.account_id("alice").await;
    let post = harness.post_id("alice", "p1").await;
    assert!(harness.feed_contains(post, bob).await);
    {
        let mut tx = harness.store.session().await.expect("session");
        assert!(harness
            .store
            .reblog_get(&mut tx, "bob", post)
            .await
            .expect("query")
            .is_some());
    }
    // The author hears about the reblog.
    let reblog_notifs: Vec<_> = harness
        .store
        .notifications()
        .into_iter()
        .filter(|n| n.kind == NotifyKind::Reblog)
        .collect();
    assert_eq!(reblog_notifs.len(), 1);
    assert_eq!(reblog_notifs[0].src_id, Some(bob));
    assert_eq!(reblog_notifs[0].dst_id, Some(alice));

    let delete_json =
        r#"{"account":"bob","author":"alice","permlink":"p1","delete":"delete"}"#;
    harness
        .process(&block(201, vec![custom_json("follow", "bob", delete_json)]))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    assert!(harness
        .store
        .reblog_get(&mut tx, "bob", post)
        .await
        .expect("query")
        .is_none());
    drop(tx);
    assert!(!harness.feed_contains(post, bob).await);
}

#[tokio::test]
async fn reblog_of_comment_is_a_no_op() {
    let harness = Harness::new();
    harness
        .process(&block(99, vec![account_create("alice"), account_create("bob")]))
        .await;
    harness
        .process(&block(
            100,
            vec![
                comment("alice", "p1", None, r#"{"tags":["steem"]}"#),
                comment("alice", "c1", Some(("alice", "p1")), ""),
            ],
        ))
        .await;

    let reblog_json = r#"{"account":"bob","author":"alice","permlink":"c1"}"#;
    harness
        .process(&block(101, vec![custom_json("follow", "bob", reblog_json)]))
        .await;

    let comment_id = harness.post_id("alice", "c1").await;
    let bob = harness.account_id("bob").await;
    let mut tx = harness.store.session().await.expect("session");
    assert!(harness
        .store
        .reblog_get(&mut tx, "bob", comment_id)
        .await
        .expect("query")
        .is_none());
    drop(tx);
    assert!(!harness.feed_contains(comment_id, bob).await);
}

#[tokio::test]
async fn follow_state_algebra() {
    let harness = Harness::new();
    harness
        .process(&block(99, vec![account_create("alice"), account_create("bob")]))
        .await;
    let alice = harness.account_id("alice").await;
    let bob = harness.account_id("bob").await;

    let follow = |what: &str| {
        format!(r#"{{"follower":"alice","following":"bob","what":{what}}}"#)
    };

    let expectations = [
        ("[\"blog\"]", FollowState::BLOG),
        ("[]", FollowState::NONE),
        ("[\"ignore\"]", FollowState::IGNORE),
        ("[\"blog\",\"ignore\"]", FollowState(3)),
    ];
    for (round, (what, expected)) in expectations.iter().enumerate() {
        harness
            .process(&block(
                100 + round as i64,
                vec![custom_json("follow", "alice", &follow(what))],
            ))
            .await;
        let mut tx = harness.store.session().await.expect("session");
        let edge = harness
            .store
            .follow_between(&mut tx, alice, bob)
            .await
            .expect("query")
            .expect("edge exists");
        assert_eq!(edge.state, *expected, "what={what}");
    }
}

#[tokio::test]
async fn follow_counters_track_blog_bit() {
    let harness = Harness::new();
    harness
        .process(&block(99, vec![account_create("alice"), account_create("bob")]))
        .await;

    let follow = |what: &str| {
        format!(r#"{{"follower":"alice","following":"bob","what":{what}}}"#)
    };
    harness
        .process(&block(
            100,
            vec![custom_json("follow", "alice", &follow("[\"blog\"]"))],
        ))
        .await;

    let check = |store: &Arc<MemoryStore>| {
        let store = Arc::clone(store);
        async move {
            let mut tx = store.session().await.expect("session");
            let alice = store
                .account_by_name(&mut tx, "alice")
                .await
                .expect("query")
                .expect("alice");
            let bob = store
                .account_by_name(&mut tx, "bob")
                .await
                .expect("query")
                .expect("bob");
            (alice.following, bob.followers)
        }
    };

    assert_eq!(check(&harness.store).await, (1, 1));

    // Re-sending the same state must not double-count.
    harness
        .process(&block(
            101,
            vec![custom_json("follow", "alice", &follow("[\"blog\"]"))],
        ))
        .await;
    assert_eq!(check(&harness.store).await, (1, 1));

    harness
        .process(&block(102, vec![custom_json("follow", "alice", &follow("[]"))]))
        .await;
    assert_eq!(check(&harness.store).await, (0, 0));
}

#[tokio::test]
async fn follow_from_wrong_actor_is_skipped() {
    let harness = Harness::new();
    harness
        .process(&block(99, vec![account_create("alice"), account_create("bob")]))
        .await;
    let alice = harness.account_id("alice").await;
    let bob = harness.account_id("bob").await;

    let inner = r#"{"follower":"alice","following":"bob","what":["blog"]}"#;
    harness
        .process(&block(100, vec![custom_json("follow", "mallory", inner)]))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    assert!(harness
        .store
        .follow_between(&mut tx, alice, bob)
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn community_registration() {
    let harness = Harness::new();
    let num = 37_500_001;
    harness
        .process(&block(num, vec![account_create("hive-123456")]))
        .await;

    let id = harness.account_id("hive-123456").await;
    let mut tx = harness.store.session().await.expect("session");
    let community = harness
        .store
        .community_by_id(&mut tx, id)
        .await
        .expect("query")
        .expect("community row");
    assert_eq!(community.name, "hive-123456");
    assert_eq!(community.type_id, 1);

    let role = harness
        .store
        .role_get(&mut tx, id, id)
        .await
        .expect("query")
        .expect("owner role");
    assert_eq!(role.role, CommunityRole::Owner);
    drop(tx);

    let notifs: Vec<_> = harness
        .store
        .notifications()
        .into_iter()
        .filter(|n| n.kind == NotifyKind::NewCommunity)
        .collect();
    assert_eq!(notifs.len(), 1);
    assert_eq!(notifs[0].community_id, Some(id));
}

#[tokio::test]
async fn ordinary_account_names_produce_no_community() {
    let harness = Harness::new();
    harness
        .process(&block(37_500_001, vec![account_create("hive-212233")]))
        .await;
    let id = harness.account_id("hive-212233").await;
    let mut tx = harness.store.session().await.expect("session");
    assert!(harness
        .store
        .community_by_id(&mut tx, id)
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn community_ops_before_start_block_are_ignored() {
    let harness = Harness::new();
    harness
        .process(&block(37_500_001, vec![account_create("hive-123456"), account_create("bob")]))
        .await;

    // Well below the start block: the op must not take effect even though
    // the community exists.
    let subscribe = r#"{"type":"subscribe","community":"hive-123456"}"#;
    harness
        .process(&block(37_500_000, vec![custom_json("community", "bob", subscribe)]))
        .await;

    let community = harness.account_id("hive-123456").await;
    let bob = harness.account_id("bob").await;
    let mut tx = harness.store.session().await.expect("session");
    assert!(harness
        .store
        .subscription_get(&mut tx, community, bob)
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn subscription_lifecycle_maintains_counter() {
    let harness = Harness::new();
    harness
        .process(&block(
            37_500_001,
            vec![account_create("hive-123456"), account_create("bob")],
        ))
        .await;
    let community = harness.account_id("hive-123456").await;
    let bob = harness.account_id("bob").await;

    let subscribe = r#"{"type":"subscribe","community":"hive-123456"}"#;
    harness
        .process(&block(37_500_002, vec![custom_json("community", "bob", subscribe)]))
        .await;
    // Duplicate subscribe must not double-count.
    harness
        .process(&block(37_500_003, vec![custom_json("community", "bob", subscribe)]))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    assert!(harness
        .store
        .subscription_get(&mut tx, community, bob)
        .await
        .expect("query")
        .is_some());
    let row = harness
        .store
        .community_by_id(&mut tx, community)
        .await
        .expect("query")
        .expect("community");
    assert_eq!(row.subscribers, 1);
    drop(tx);

    let unsubscribe = r#"{"type":"unsubscribe","community":"hive-123456"}"#;
    harness
        .process(&block(37_500_004, vec![custom_json("community", "bob", unsubscribe)]))
        .await;
    harness
        .process(&block(37_500_005, vec![custom_json("community", "bob", unsubscribe)]))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    let row = harness
        .store
        .community_by_id(&mut tx, community)
        .await
        .expect("query")
        .expect("community");
    assert_eq!(row.subscribers, 0);
}

#[tokio::test]
async fn community_moderation_actions() {
    let harness = Harness::new();
    harness
        .process(&block(
            37_500_001,
            vec![account_create("hive-123456"), account_create("alice"), account_create("bob")],
        ))
        .await;
    harness
        .process(&block(
            37_500_002,
            vec![comment("alice", "p1", None, r#"{"tags":["hive-123456"]}"#)],
        ))
        .await;

    let community = harness.account_id("hive-123456").await;
    let bob = harness.account_id("bob").await;
    let post = harness.post_id("alice", "p1").await;

    let ops = vec![
        custom_json(
            "community",
            "hive-123456",
            r#"{"type":"setRole","community":"hive-123456","account":"bob","role":"mod"}"#,
        ),
        custom_json(
            "community",
            "hive-123456",
            r#"{"type":"setUserTitle","community":"hive-123456","account":"bob","title":"keeper"}"#,
        ),
        custom_json(
            "community",
            "hive-123456",
            r#"{"type":"updateProps","community":"hive-123456","props":{"title":"Bees","is_nsfw":false}}"#,
        ),
    ];
    harness.process(&block(37_500_003, ops)).await;

    let pin = custom_json(
        "community",
        "bob",
        r#"{"type":"pinPost","community":"hive-123456","account":"alice","permlink":"p1"}"#,
    );
    let mute = custom_json(
        "community",
        "bob",
        r#"{"type":"mutePost","community":"hive-123456","account":"alice","permlink":"p1","notes":"spam"}"#,
    );
    let flag = custom_json(
        "community",
        "bob",
        r#"{"type":"flagPost","community":"hive-123456","account":"alice","permlink":"p1","notes":"check"}"#,
    );
    harness.process(&block(37_500_004, vec![pin, mute, flag])).await;

    let mut tx = harness.store.session().await.expect("session");
    let role = harness
        .store
        .role_get(&mut tx, community, bob)
        .await
        .expect("query")
        .expect("role row");
    assert_eq!(role.role, CommunityRole::Mod);
    assert_eq!(role.title.as_deref(), Some("keeper"));

    let row = harness
        .store
        .community_by_id(&mut tx, community)
        .await
        .expect("query")
        .expect("community");
    assert_eq!(row.title, "Bees");

    let stored = harness
        .store
        .post_by_id(&mut tx, post)
        .await
        .expect("query")
        .expect("post");
    assert!(stored.is_pinned);
    assert!(stored.is_muted);
    drop(tx);

    let kinds: Vec<NotifyKind> = harness
        .store
        .notifications()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    for expected in [
        NotifyKind::SetRole,
        NotifyKind::SetLabel,
        NotifyKind::SetProps,
        NotifyKind::PinPost,
        NotifyKind::MutePost,
        NotifyKind::FlagPost,
    ] {
        assert!(kinds.contains(&expected), "missing {expected:?}");
    }
    let flag_notif = harness
        .store
        .notifications()
        .into_iter()
        .find(|n| n.kind == NotifyKind::FlagPost)
        .expect("flag notification");
    assert_eq!(flag_notif.payload.as_deref(), Some("check"));
}

#[tokio::test]
async fn promotion_transfer() {
    let harness = Harness::new();
    harness
        .process(&block(99, vec![account_create("alice"), account_create("carol")]))
        .await;
    harness
        .process(&block(
            100,
            vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)],
        ))
        .await;

    harness
        .process(&block(
            101,
            vec![
                json!(["transfer_operation", {
                    "from": "carol", "to": "null",
                    "amount": "5.000 SBD", "memo": "@alice/p1",
                }]),
                // Ordinary transfers are not recorded.
                json!(["transfer_operation", {
                    "from": "carol", "to": "alice",
                    "amount": "9.000 SBD", "memo": "hi",
                }]),
            ],
        ))
        .await;

    let payments = harness.store.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].from_account, "carol");
    assert!((payments[0].amount - 5.0).abs() < 1e-9);

    let mut tx = harness.store.session().await.expect("session");
    let post = harness
        .store
        .post_by_author_permlink(&mut tx, "alice", "p1")
        .await
        .expect("query")
        .expect("post");
    assert!((post.promoted - 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn reply_notifications_split_by_parent_depth() {
    let harness = Harness::new();
    harness
        .process(&block(
            99,
            vec![account_create("alice"), account_create("bob"), account_create("carol")],
        ))
        .await;
    harness
        .process(&block(
            100,
            vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)],
        ))
        .await;
    harness
        .process(&block(101, vec![comment("bob", "c1", Some(("alice", "p1")), "")]))
        .await;
    harness
        .process(&block(102, vec![comment("carol", "c2", Some(("bob", "c1")), "")]))
        .await;
    // A self-reply stays silent.
    harness
        .process(&block(103, vec![comment("alice", "c3", Some(("alice", "p1")), "")]))
        .await;

    let kinds: Vec<NotifyKind> = harness
        .store
        .notifications()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(
        kinds
            .iter()
            .filter(|kind| **kind == NotifyKind::Reply)
            .count(),
        1
    );
    assert_eq!(
        kinds
            .iter()
            .filter(|kind| **kind == NotifyKind::ReplyComment)
            .count(),
        1
    );
}

#[tokio::test]
async fn comment_inherits_parent_moderation() {
    let harness = Harness::new();
    harness
        .process(&block(
            37_500_001,
            vec![account_create("hive-123456"), account_create("alice"), account_create("bob")],
        ))
        .await;
    harness
        .process(&block(
            37_500_002,
            vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)],
        ))
        .await;
    harness
        .process(&block(
            37_500_003,
            vec![custom_json(
                "community",
                "hive-123456",
                r#"{"type":"mutePost","community":"hive-123456","account":"alice","permlink":"p1"}"#,
            )],
        ))
        .await;
    harness
        .process(&block(
            37_500_004,
            vec![comment("bob", "c1", Some(("alice", "p1")), "")],
        ))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    let child = harness
        .store
        .post_by_author_permlink(&mut tx, "bob", "c1")
        .await
        .expect("query")
        .expect("comment");
    assert_eq!(child.depth, 1);
    assert_eq!(child.category, "steem");
    assert!(child.is_muted);
}

#[tokio::test]
async fn resurrection_refreshes_created_at_and_feed() {
    let harness = Harness::new();
    harness.process(&block(99, vec![account_create("alice")])).await;
    harness
        .process(&block(
            100,
            vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)],
        ))
        .await;
    harness
        .process(&block(
            101,
            vec![json!(["delete_comment_operation", { "author": "alice", "permlink": "p1" }])],
        ))
        .await;
    harness
        .process(&block(
            102,
            vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)],
        ))
        .await;

    let alice = harness.account_id("alice").await;
    let post = harness.post_id("alice", "p1").await;
    let mut tx = harness.store.session().await.expect("session");
    let stored = harness
        .store
        .post_by_id(&mut tx, post)
        .await
        .expect("query")
        .expect("post");
    assert!(!stored.is_deleted);
    assert_eq!(stored.created_at, base_time() + Duration::seconds(102 * 3));
    drop(tx);
    assert!(harness.feed_contains(post, alice).await);
}

#[tokio::test]
async fn replaying_a_block_changes_nothing() {
    let harness = Harness::new();
    harness.process(&block(99, vec![account_create("alice")])).await;
    let payload = block(
        100,
        vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)],
    );
    harness.process(&payload).await;

    let before = harness.store.row_counts();
    let notifications_before = harness.store.notifications();

    // The duplicate block number violates the primary key; the whole replay
    // rolls back.
    let result = harness.processor.process_block(&payload, false).await;
    assert!(result.is_err());

    assert_eq!(harness.store.row_counts(), before);
    assert_eq!(harness.store.notifications(), notifications_before);
}

#[tokio::test]
async fn block_counts_and_tx_ids_are_recorded() {
    let harness = Harness::new();
    harness
        .process(&block(99, vec![account_create("alice"), account_create("bob")]))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    let record = harness
        .store
        .block_by_num(&mut tx, 99)
        .await
        .expect("query")
        .expect("block row");
    assert_eq!(record.txs, 2);
    assert_eq!(record.ops, 2);
    assert_eq!(record.hash, hex_id(99));

    let trx_id = format!("{:08x}{:032x}", 99, 0);
    assert_eq!(
        harness
            .store
            .block_num_for_trx(&mut tx, &trx_id)
            .await
            .expect("query"),
        Some(99)
    );
}

#[tokio::test]
async fn set_last_read_clamps_to_block_time() {
    let harness = Harness::new();
    harness.process(&block(99, vec![account_create("alice")])).await;

    let inner = r#"{"type":"setLastRead","date":"2030-01-01T00:00:00"}"#;
    harness
        .process(&block(100, vec![custom_json("notify", "alice", inner)]))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    let alice = harness
        .store
        .account_by_name(&mut tx, "alice")
        .await
        .expect("query")
        .expect("alice");
    assert_eq!(alice.lastread_at, base_time() + Duration::seconds(100 * 3));
}

#[tokio::test]
async fn unread_counts_respect_watermark_and_score() {
    let harness = Harness::new();
    harness
        .process(&block(
            37_500_001,
            vec![account_create("hive-123456"), account_create("bob")],
        ))
        .await;
    let community_account = harness.account_id("hive-123456").await;

    // setRole targets bob, producing a dst-facing notification.
    harness
        .process(&block(
            37_500_002,
            vec![custom_json(
                "community",
                "hive-123456",
                r#"{"type":"setRole","community":"hive-123456","account":"bob","role":"member"}"#,
            )],
        ))
        .await;

    let bob = harness.account_id("bob").await;
    let mut tx = harness.store.session().await.expect("session");
    let stored_bob = harness
        .store
        .account_by_name(&mut tx, "bob")
        .await
        .expect("query")
        .expect("bob");
    let unread = harness
        .store
        .count_unread_notifications(&mut tx, bob, stored_bob.lastread_at, 0)
        .await
        .expect("query");
    assert_eq!(unread, 1);

    // A score floor above the default hides it.
    let filtered = harness
        .store
        .count_unread_notifications(&mut tx, bob, stored_bob.lastread_at, 90)
        .await
        .expect("query");
    assert_eq!(filtered, 0);

    // Community registration notified the community account itself.
    let community_unread = harness
        .store
        .count_unread_notifications(
            &mut tx,
            community_account,
            DateTime::<Utc>::UNIX_EPOCH,
            0,
        )
        .await
        .expect("query");
    assert!(community_unread >= 1);
    drop(tx);

    // Catching up moves the watermark past everything.
    let read_all = format!(
        r#"{{"type":"setLastRead","date":"{}"}}"#,
        (base_time() + Duration::seconds(37_500_003 * 3)).format("%Y-%m-%dT%H:%M:%S")
    );
    harness
        .process(&block(
            37_500_003,
            vec![custom_json("notify", "bob", &read_all)],
        ))
        .await;

    let mut tx = harness.store.session().await.expect("session");
    let stored_bob = harness
        .store
        .account_by_name(&mut tx, "bob")
        .await
        .expect("query")
        .expect("bob");
    let unread = harness
        .store
        .count_unread_notifications(&mut tx, bob, stored_bob.lastread_at, 0)
        .await
        .expect("query");
    assert_eq!(unread, 0);
}

#[tokio::test]
async fn initial_sync_skips_feed_and_vote_side_effects() {
    let harness = Harness::new();
    let blocks = [
        block(1, vec![account_create("alice")]),
        block(2, vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)]),
        block(
            3,
            vec![json!(["vote_operation", {
                "voter": "alice", "author": "alice", "permlink": "p1", "weight": 10000,
            }])],
        ),
    ];
    for payload in &blocks {
        let outcome = harness
            .processor
            .process_block(payload, true)
            .await
            .expect("block processes");
        assert!(outcome.dirty_accounts.is_empty());
        assert!(outcome.dirty_posts.is_empty());
    }

    let alice = harness.account_id("alice").await;
    let post = harness.post_id("alice", "p1").await;
    assert!(!harness.feed_contains(post, alice).await);

    // The post-catch-up rebuild recreates exactly the live-root entries.
    let mut tx = harness.store.begin().await.expect("begin");
    harness
        .store
        .rebuild_feed_cache(&mut tx, true)
        .await
        .expect("rebuild");
    harness.store.commit(tx).await.expect("commit");
    assert!(harness.feed_contains(post, alice).await);
}

#[tokio::test]
async fn live_sync_marks_dirty_entities() {
    let harness = Harness::new();
    harness
        .process(&block(99, vec![account_create("alice"), account_create("bob")]))
        .await;
    harness
        .process(&block(
            100,
            vec![comment("alice", "p1", None, r#"{"tags":["steem"]}"#)],
        ))
        .await;

    let outcome = harness
        .processor
        .process_block(
            &block(
                101,
                vec![json!(["vote_operation", {
                    "voter": "bob", "author": "alice", "permlink": "p1", "weight": 10000,
                }])],
            ),
            false,
        )
        .await
        .expect("block processes");

    assert!(outcome.dirty_accounts.contains("alice"));
    assert!(outcome.dirty_accounts.contains("bob"));
    assert!(outcome
        .dirty_posts
        .contains(&("alice".to_owned(), "p1".to_owned())));
}

#[tokio::test]
async fn junk_operations_do_not_stall_a_block() {
    let harness = Harness::new();
    harness.process(&block(99, vec![account_create("alice")])).await;

    harness
        .process(&block(
            100,
            vec![
                // Unknown type, malformed custom json, dangling references.
                json!(["mystery_operation", { "anything": true }]),
                custom_json("follow", "alice", "{broken json"),
                custom_json(
                    "follow",
                    "alice",
                    r#"{"follower":"alice","following":"ghost","what":["blog"]}"#,
                ),
                comment("alice", "p1", None, r#"{"tags":["steem"]}"#),
            ],
        ))
        .await;

    // The block committed and the valid op inside it took effect.
    let post = harness.post_id("alice", "p1").await;
    assert!(post > 0);
}
