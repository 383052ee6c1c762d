//! Sync controller: initial catch-up and the irreversible-only live loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::ports::{
    BlockPayload, BlockStore, ChainSource, ChainSourceError, FeedCacheStore, FollowStore,
    IndexStore, StateRecord, StateStore, Storage, StoreError, DB_VERSION,
};

use super::block_processor::{BlockError, BlockProcessor};
use super::dirty::DirtyHandle;

/// Sync controller configuration distilled from process config.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Blocks fetched per upstream batch call.
    pub max_batch: u32,
    /// Live-loop poll interval.
    pub sync_interval: Duration,
    /// Stop once this block is reached; 0 means unlimited.
    pub test_max_block: u64,
}

/// Fatal sync failures; transient conditions are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The same block keeps failing to decode; operator intervention is
    /// required because skipping blocks would break density.
    #[error("block {block_num} repeatedly failed: {message}")]
    StuckBlock { block_num: i64, message: String },
    /// The persisted projection was built by an incompatible schema version.
    #[error("projection has db_version {found}, this build expects {expected}")]
    SchemaMismatch { found: i64, expected: i64 },
}

/// Attempts per block before declaring the cursor stuck.
const MAX_BLOCK_ATTEMPTS: u32 = 5;

/// Drives the chain source and block processor on a single worker.
///
/// Only irreversible blocks are consumed, so no reorg can invalidate
/// persisted state; the trailing-window live-head strategy remains deferred.
pub struct SyncController<S, C> {
    store: Arc<S>,
    chain: Arc<C>,
    processor: BlockProcessor<S>,
    settings: SyncSettings,
    dirty: Option<DirtyHandle>,
    shutdown: watch::Receiver<bool>,
}

impl<S, C> SyncController<S, C>
where
    S: IndexStore + 'static,
    C: ChainSource + 'static,
{
    pub fn new(
        store: Arc<S>,
        chain: Arc<C>,
        settings: SyncSettings,
        dirty: Option<DirtyHandle>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            processor: BlockProcessor::new(Arc::clone(&store)),
            store,
            chain,
            settings,
            dirty,
            shutdown,
        }
    }

    /// Run until shutdown (or until `test_max_block` is reached).
    pub async fn run(mut self) -> Result<(), SyncError> {
        info!("starting sync");
        self.ensure_state_row().await?;

        if self.needs_initial_sync().await? {
            info!("empty feed cache detected, running initial sync");
            self.initial_sync().await?;
            info!("initial sync complete");
        }

        self.live_sync().await
    }

    /// Seed the singleton state row on a fresh projection and refuse to run
    /// against a schema from a different db-version.
    async fn ensure_state_row(&self) -> Result<(), SyncError> {
        let mut tx = self.store.session().await?;
        match self.store.state_get(&mut tx).await? {
            None => {
                self.store
                    .state_upsert(&mut tx, &StateRecord::default())
                    .await?;
                Ok(())
            }
            Some(state) if state.db_version == DB_VERSION => Ok(()),
            Some(state) => Err(SyncError::SchemaMismatch {
                found: state.db_version,
                expected: DB_VERSION,
            }),
        }
    }

    /// An empty feed cache marks a projection that has never completed
    /// initial sync.
    async fn needs_initial_sync(&self) -> Result<bool, StoreError> {
        let mut tx = self.store.session().await?;
        Ok(self.store.feed_cache_count(&mut tx).await? == 0)
    }

    async fn initial_sync(&mut self) -> Result<(), SyncError> {
        loop {
            if self.is_shutdown() {
                return Ok(());
            }
            let head = self.head_block_num().await?;
            let target = match self.sync_target().await {
                Ok(target) => target,
                Err(error) => {
                    warn!(%error, "irreversible lookup failed, retrying");
                    self.wait().await;
                    continue;
                }
            };
            if head >= target {
                break;
            }
            info!(from = head + 1, to = target, "initial catch-up");
            if let Err(error) = self.sync_range(head + 1, target, true).await {
                match error {
                    SyncError::Store(ref store_error) => {
                        warn!(%store_error, "initial sync batch failed, retrying");
                        self.wait().await;
                    }
                    fatal => return Err(fatal),
                }
            }
        }

        // Catch-up wrote no feed entries; rebuild the cache from the rows
        // and reconcile the follow counters in one transaction.
        let mut tx = self.store.begin().await?;
        let result = async {
            self.store.rebuild_feed_cache(&mut tx, true).await?;
            self.store.recount_follows(&mut tx).await
        }
        .await;
        match result {
            Ok(()) => self.store.commit(tx).await?,
            Err(error) => {
                self.store.rollback(tx).await.ok();
                return Err(error.into());
            }
        }
        Ok(())
    }

    async fn live_sync(&mut self) -> Result<(), SyncError> {
        loop {
            if self.is_shutdown() {
                info!("shutdown requested, stopping sync");
                return Ok(());
            }

            let head = match self.head_block_num().await {
                Ok(head) => head,
                Err(error) => {
                    error!(%error, "head lookup failed");
                    self.wait().await;
                    continue;
                }
            };

            if self.settings.test_max_block > 0 && head >= self.settings.test_max_block as i64 {
                info!(head, "test block cap reached, stopping sync");
                return Ok(());
            }

            let target = match self.sync_target().await {
                Ok(target) => target,
                Err(error) => {
                    error!(%error, "irreversible lookup failed");
                    self.wait().await;
                    continue;
                }
            };

            if head < target {
                match self.sync_range(head + 1, target, false).await {
                    Ok(()) => {
                        debug!(from = head + 1, to = target, "synced");
                    }
                    Err(SyncError::Store(error)) => {
                        error!(%error, "sync batch failed");
                        self.wait().await;
                    }
                    Err(fatal) => return Err(fatal),
                }
            } else {
                debug!(head, irreversible = target, "nothing to sync");
                self.wait().await;
            }
        }
    }

    /// Last irreversible, clamped by the test block cap.
    async fn sync_target(&self) -> Result<i64, ChainSourceError> {
        let irreversible = self.chain.last_irreversible().await?;
        if self.settings.test_max_block > 0 {
            return Ok(irreversible.min(self.settings.test_max_block as i64));
        }
        Ok(irreversible)
    }

    async fn head_block_num(&self) -> Result<i64, StoreError> {
        let mut tx = self.store.session().await?;
        Ok(self.store.head_block_num(&mut tx).await?.unwrap_or(0))
    }

    /// Fetch and process `[from, to]` in batch windows. Each block commits
    /// before the next begins; a block that keeps failing surfaces as a
    /// stuck-cursor error instead of being skipped.
    async fn sync_range(&mut self, from: i64, to: i64, is_initial_sync: bool) -> Result<(), SyncError> {
        let batch = i64::from(self.settings.max_batch.max(1));
        let mut start = from;
        while start <= to {
            let end = (start + batch - 1).min(to);
            let blocks = match self.chain.get_blocks_range(start, end).await {
                Ok(blocks) => blocks,
                Err(error) => {
                    warn!(from = start, to = end, %error, "block fetch failed");
                    self.wait().await;
                    if self.is_shutdown() {
                        return Ok(());
                    }
                    continue;
                }
            };

            for block in &blocks {
                if self.is_shutdown() {
                    return Ok(());
                }
                self.process_with_retry(block, is_initial_sync).await?;
            }
            start = end + 1;
        }
        Ok(())
    }

    async fn process_with_retry(
        &mut self,
        block: &BlockPayload,
        is_initial_sync: bool,
    ) -> Result<(), SyncError> {
        let mut attempts = 0;
        loop {
            match self.processor.process_block(block, is_initial_sync).await {
                Ok(outcome) => {
                    if !is_initial_sync {
                        if let Some(dirty) = &self.dirty {
                            dirty.submit(&outcome);
                        }
                    }
                    return Ok(());
                }
                Err(error) => {
                    attempts += 1;
                    if attempts >= MAX_BLOCK_ATTEMPTS {
                        return Err(SyncError::StuckBlock {
                            block_num: block.block_num,
                            message: error.to_string(),
                        });
                    }
                    match error {
                        BlockError::Decode { message } => {
                            error!(block_num = block.block_num, message, "block decode failed");
                        }
                        BlockError::Store(store_error) => {
                            warn!(block_num = block.block_num, %store_error, "block rolled back");
                        }
                    }
                    self.wait().await;
                    if self.is_shutdown() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep one poll interval, waking early on shutdown.
    async fn wait(&mut self) {
        let interval = self.settings.sync_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = self.shutdown.changed() => {}
        }
    }
}
