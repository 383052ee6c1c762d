//! Domain entities, ports, and indexing services.
//!
//! Purpose: define the strongly typed projection of the chain's social
//! overlay (accounts, posts, follows, reblogs, communities, notifications)
//! together with the ports the indexer drives. Keep these types free of
//! driver concerns; Diesel rows and RPC DTOs live in `outbound`.

pub mod account;
pub mod block;
pub mod community;
pub mod error;
pub mod follow;
pub mod indexer;
pub mod notification;
pub mod ops;
pub mod payment;
pub mod ports;
pub mod post;
pub mod post_cache;
pub mod reblog;

pub use self::account::{Account, AccountProfile, NewAccount};
pub use self::block::BlockRecord;
pub use self::community::{
    Community, CommunityProps, CommunityRole, NewSubscription, Role, Subscription,
    community_type_id, is_community_name, COMMUNITY_START_BLOCK,
};
pub use self::error::OpError;
pub use self::follow::{Follow, FollowState};
pub use self::notification::{NewNotification, Notification, NotifyKind, DEFAULT_NOTIFY_SCORE};
pub use self::ops::{
    CommentOp, CommunityAction, CustomJsonBody, DeleteCommentOp, FollowDialect, FollowOp,
    NotifyOp, ReblogOp, TransferOp, VoteOp,
};
pub use self::payment::{NewPayment, Payment, PaymentToken};
pub use self::post::{normalize_category, NewPost, Post};
pub use self::post_cache::{ranking_score, PostCacheEntry, RankedSort, HOT_TIMESCALE, TREND_TIMESCALE};
pub use self::reblog::Reblog;
