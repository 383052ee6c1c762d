//! Canned chain source for sync tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::ports::{BlockPayload, ChainSource, ChainSourceError};

/// Serves a fixed set of blocks and raw objects.
#[derive(Debug, Default)]
pub struct FixtureChainSource {
    blocks: BTreeMap<i64, BlockPayload>,
    irreversible: i64,
    accounts: Mutex<BTreeMap<String, Value>>,
    content: Mutex<BTreeMap<(String, String), Value>>,
}

impl FixtureChainSource {
    /// Build a fixture whose irreversible frontier is the highest block.
    pub fn with_blocks(blocks: impl IntoIterator<Item = BlockPayload>) -> Self {
        let blocks: BTreeMap<i64, BlockPayload> = blocks
            .into_iter()
            .map(|block| (block.block_num, block))
            .collect();
        let irreversible = blocks.keys().next_back().copied().unwrap_or(0);
        Self {
            blocks,
            irreversible,
            accounts: Mutex::default(),
            content: Mutex::default(),
        }
    }

    pub fn set_account(&self, name: &str, raw: Value) {
        self.accounts
            .lock()
            .expect("accounts lock")
            .insert(name.to_owned(), raw);
    }

    pub fn set_content(&self, author: &str, permlink: &str, raw: Value) {
        self.content
            .lock()
            .expect("content lock")
            .insert((author.to_owned(), permlink.to_owned()), raw);
    }
}

#[async_trait]
impl ChainSource for FixtureChainSource {
    async fn get_block(&self, num: i64) -> Result<Option<BlockPayload>, ChainSourceError> {
        Ok(self.blocks.get(&num).cloned())
    }

    async fn get_blocks_range(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<BlockPayload>, ChainSourceError> {
        let mut blocks = Vec::new();
        for num in from..=to {
            let block = self.blocks.get(&num).cloned().ok_or_else(|| {
                ChainSourceError::rejected(format!("fixture has no block {num}"))
            })?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    async fn last_irreversible(&self) -> Result<i64, ChainSourceError> {
        Ok(self.irreversible)
    }

    async fn head_block(&self) -> Result<i64, ChainSourceError> {
        Ok(self.irreversible)
    }

    async fn get_accounts(&self, names: &[String]) -> Result<Vec<Value>, ChainSourceError> {
        let accounts = self.accounts.lock().expect("accounts lock");
        Ok(names
            .iter()
            .filter_map(|name| accounts.get(name).cloned())
            .collect())
    }

    async fn get_content(&self, author: &str, permlink: &str) -> Result<Value, ChainSourceError> {
        let content = self.content.lock().expect("content lock");
        Ok(content
            .get(&(author.to_owned(), permlink.to_owned()))
            .cloned()
            .unwrap_or(Value::Null))
    }
}
