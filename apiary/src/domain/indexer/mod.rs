//! Indexing services: per-operation state machines, block orchestration,
//! and the sync controller.

mod accounts;
mod block_processor;
mod communities;
mod custom_ops;
mod dirty;
mod follows;
mod notify;
mod payments;
mod posts;
mod reblogs;
mod sync;

pub use accounts::AccountIndexer;
pub use block_processor::{BlockError, BlockOutcome, BlockProcessor};
pub use communities::CommunityIndexer;
pub use custom_ops::CustomOpRouter;
pub use dirty::{
    post_cache_entry_from_content, DirtyFlusher, DirtyHandle, DirtyItem, DirtyQueue,
};
pub use follows::{FollowCounterDeltas, FollowIndexer};
pub use notify::{NotificationWriter, NotifyRefs};
pub use payments::{PaymentIndexer, BURN_ACCOUNT};
pub use posts::{CommentOutcome, PostIndexer};
pub use reblogs::ReblogIndexer;
pub use sync::{SyncController, SyncError, SyncSettings};
