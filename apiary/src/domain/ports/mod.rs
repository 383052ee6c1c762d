//! Driven ports: the capabilities the indexer and gateway depend on.

mod chain_source;
mod macros;
mod store;

pub(crate) use macros::define_port_error;

pub use chain_source::{
    BlockPayload, ChainSource, ChainSourceError, DecodedOp, TransactionPayload,
    BLOCK_TIMESTAMP_FORMAT, GET_ACCOUNTS_MAX,
};
#[cfg(test)]
pub use chain_source::MockChainSource;
pub use store::{
    AccountStore, BlockStore, CommunityStore, FeedCacheStore, FollowStore, IndexStore,
    NotificationStore, PaymentStore, PostCacheStore, PostStore, ReblogStore, StateRecord,
    StateStore, Storage, StoreError, DB_VERSION,
};
