//! Diesel table definitions for the PostgreSQL projection.
//!
//! These definitions must match the migrations exactly; Diesel uses them for
//! compile-time query validation. Schema changes within a db-version are
//! additive only; breaking changes bump `hive_state.db_version`.

diesel::table! {
    /// Chain accounts with profile columns and counter caches.
    hive_accounts (id) {
        id -> BigInt,
        name -> Varchar,
        created_at -> Timestamptz,
        reputation -> Double,
        followers -> BigInt,
        following -> BigInt,
        lastread_at -> Timestamptz,
        cached_at -> Timestamptz,
        display_name -> Nullable<Varchar>,
        about -> Nullable<Varchar>,
        location -> Nullable<Varchar>,
        website -> Nullable<Varchar>,
        profile_image -> Nullable<Varchar>,
        cover_image -> Nullable<Varchar>,
    }
}

diesel::table! {
    /// Processed blocks; `num` is dense and strictly increasing.
    hive_blocks (num) {
        num -> BigInt,
        hash -> Bpchar,
        prev -> Nullable<Bpchar>,
        txs -> SmallInt,
        #[sql_name = "ops"]
        ops_count -> SmallInt,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Posts and comments keyed by synthetic id, unique on (author, permlink).
    hive_posts (id) {
        id -> BigInt,
        parent_id -> Nullable<BigInt>,
        author -> Varchar,
        permlink -> Varchar,
        category -> Varchar,
        community_id -> Nullable<BigInt>,
        created_at -> Timestamptz,
        depth -> SmallInt,
        is_deleted -> Bool,
        is_pinned -> Bool,
        is_muted -> Bool,
        is_valid -> Bool,
        promoted -> Double,
    }
}

diesel::table! {
    /// Materialized per-post presentation and ranking fields.
    hive_posts_cache (post_id) {
        post_id -> BigInt,
        author -> Varchar,
        permlink -> Varchar,
        category -> Varchar,
        depth -> SmallInt,
        title -> Varchar,
        preview -> Varchar,
        body -> Text,
        img_url -> Varchar,
        json_metadata -> Text,
        payout -> Double,
        promoted -> Double,
        rshares -> BigInt,
        votes -> Text,
        children -> Integer,
        sc_trend -> Double,
        sc_hot -> Double,
        is_paidout -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Blog/feed materialization: root posts and reblogs per account.
    hive_feed_cache (post_id, account_id) {
        post_id -> BigInt,
        account_id -> BigInt,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Follow edges; state bit 1 = blog, bit 2 = ignore.
    hive_follows (follower, following) {
        follower -> BigInt,
        following -> BigInt,
        state -> SmallInt,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Reblogs, unique on (account, post_id).
    hive_reblogs (account, post_id) {
        account -> Varchar,
        post_id -> BigInt,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Communities; id is the backing account's id.
    hive_communities (id) {
        id -> BigInt,
        name -> Varchar,
        type_id -> SmallInt,
        lang -> Bpchar,
        title -> Varchar,
        about -> Varchar,
        description -> Varchar,
        flag_text -> Varchar,
        is_nsfw -> Bool,
        subscribers -> BigInt,
        rank -> BigInt,
        category -> Varchar,
        settings -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Community role grants.
    hive_roles (community_id, account_id) {
        community_id -> BigInt,
        account_id -> BigInt,
        role_id -> SmallInt,
        title -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Community subscriptions.
    hive_subscriptions (community_id, account_id) {
        community_id -> BigInt,
        account_id -> BigInt,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only notifications.
    hive_notifs (id) {
        id -> BigInt,
        #[sql_name = "type"]
        kind -> SmallInt,
        score -> SmallInt,
        created_at -> Timestamptz,
        src_id -> Nullable<BigInt>,
        dst_id -> Nullable<BigInt>,
        community_id -> Nullable<BigInt>,
        post_id -> Nullable<BigInt>,
        payload -> Nullable<Varchar>,
    }
}

diesel::table! {
    /// Promotion transfers to the burn account.
    hive_payments (id) {
        id -> BigInt,
        block_num -> BigInt,
        tx_idx -> SmallInt,
        from_account -> Varchar,
        to_account -> Varchar,
        amount -> Double,
        token -> Varchar,
        memo -> Varchar,
        post_id -> Nullable<BigInt>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Transaction id to block number index.
    hive_trxid_block_num (trx_id) {
        trx_id -> Varchar,
        block_num -> BigInt,
    }
}

diesel::table! {
    /// Singleton sync-state row.
    hive_state (block_num) {
        block_num -> BigInt,
        db_version -> BigInt,
        steem_per_mvest -> Double,
        usd_per_steem -> Double,
        sbd_per_steem -> Double,
        dgpo -> Text,
    }
}

diesel::joinable!(hive_posts_cache -> hive_posts (post_id));
diesel::joinable!(hive_feed_cache -> hive_posts (post_id));
diesel::joinable!(hive_feed_cache -> hive_accounts (account_id));
diesel::joinable!(hive_roles -> hive_communities (community_id));
diesel::joinable!(hive_subscriptions -> hive_communities (community_id));

diesel::allow_tables_to_appear_in_same_query!(
    hive_accounts,
    hive_blocks,
    hive_posts,
    hive_posts_cache,
    hive_feed_cache,
    hive_follows,
    hive_reblogs,
    hive_communities,
    hive_roles,
    hive_subscriptions,
    hive_notifs,
    hive_payments,
    hive_trxid_block_num,
    hive_state,
);
