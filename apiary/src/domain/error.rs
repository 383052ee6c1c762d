//! Operation-level error classification for the indexing pipeline.

use crate::domain::ports::StoreError;

/// Failure while applying a single on-chain operation.
///
/// Semantic failures (malformed payloads, dangling references) are contained:
/// the block processor logs them and moves on, because historical chain data
/// includes junk that canonical nodes tolerate. Storage failures abort the
/// whole block so the enclosing transaction can roll back and be retried.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// The operation body did not match its expected shape.
    #[error("malformed operation payload: {0}")]
    Payload(String),
    /// The operation references an account the projection has not seen.
    #[error("unknown account: {0}")]
    UnknownAccount(String),
    /// The operation references a post the projection has not seen.
    #[error("unknown post: @{author}/{permlink}")]
    UnknownPost { author: String, permlink: String },
    /// The operation references an unregistered community.
    #[error("unknown community: {0}")]
    UnknownCommunity(String),
    /// The signing actor does not match the operation's claimed actor.
    #[error("actor mismatch: op claims {claimed}, signed by {actor}")]
    ActorMismatch { claimed: String, actor: String },
    /// Underlying storage failed; aborts the block.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OpError {
    /// Shorthand for payload shape failures.
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload(message.into())
    }

    /// Storage failures must surface through the block transaction; every
    /// other class is skippable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
