//! Reqwest-backed chain source adapter.
//!
//! This adapter owns transport details only: JSON-RPC envelope construction,
//! timeout and HTTP error mapping, and decoding into block payloads. Batched
//! range fetches ride a single wire request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};

use crate::domain::ports::{
    BlockPayload, ChainSource, ChainSourceError, GET_ACCOUNTS_MAX,
};

use super::dto::{RpcRequest, RpcResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC client for a Steem-family node.
pub struct SteemHttpSource {
    client: Client,
    endpoint: Url,
    max_batch: u32,
}

impl SteemHttpSource {
    /// Build an adapter with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, max_batch: u32) -> Result<Self, reqwest::Error> {
        Self::with_timeout(endpoint, max_batch, DEFAULT_TIMEOUT)
    }

    /// Build an adapter with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_timeout(
        endpoint: Url,
        max_batch: u32,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            max_batch: max_batch.max(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainSourceError> {
        let request = RpcRequest::new(1, method, params);
        let response = self.post(&request).await?;
        let decoded: RpcResponse = serde_json::from_slice(&response)
            .map_err(|err| ChainSourceError::decode(format!("bad rpc envelope: {err}")))?;
        unwrap_response(decoded)
    }

    async fn call_batch(&self, requests: &[RpcRequest]) -> Result<Vec<Value>, ChainSourceError> {
        let response = self.post(&requests).await?;
        let mut decoded: Vec<RpcResponse> = serde_json::from_slice(&response)
            .map_err(|err| ChainSourceError::decode(format!("bad rpc batch envelope: {err}")))?;
        if decoded.len() != requests.len() {
            return Err(ChainSourceError::decode(format!(
                "batch answered {} of {} requests",
                decoded.len(),
                requests.len()
            )));
        }
        // Servers may answer a batch out of order; ids restore it.
        decoded.sort_by_key(|entry| entry.id);
        decoded.into_iter().map(unwrap_response).collect()
    }

    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        body: &B,
    ) -> Result<Vec<u8>, ChainSourceError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status));
        }
        Ok(bytes.to_vec())
    }
}

fn map_transport_error(error: reqwest::Error) -> ChainSourceError {
    ChainSourceError::transport(error.to_string())
}

fn map_status_error(status: StatusCode) -> ChainSourceError {
    if status.is_server_error() {
        ChainSourceError::transport(format!("node answered {status}"))
    } else {
        ChainSourceError::rejected(format!("node answered {status}"))
    }
}

fn unwrap_response(response: RpcResponse) -> Result<Value, ChainSourceError> {
    if let Some(error) = response.error {
        return Err(ChainSourceError::rejected(format!(
            "rpc error {}: {}",
            error.code, error.message
        )));
    }
    response
        .result
        .ok_or_else(|| ChainSourceError::decode("rpc response without result"))
}

fn decode_block(num: i64, result: Value) -> Result<Option<BlockPayload>, ChainSourceError> {
    let Some(block) = result.get("block") else {
        // The node answers `{}` for blocks past its head.
        return Ok(None);
    };
    let mut payload: BlockPayload = serde_json::from_value(block.clone())
        .map_err(|err| ChainSourceError::decode(format!("bad block {num}: {err}")))?;
    payload.block_num = num;
    Ok(Some(payload))
}

fn number_field(props: &Value, field: &str) -> Result<i64, ChainSourceError> {
    props
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| ChainSourceError::decode(format!("missing {field} in global properties")))
}

#[async_trait]
impl ChainSource for SteemHttpSource {
    async fn get_block(&self, num: i64) -> Result<Option<BlockPayload>, ChainSourceError> {
        let result = self
            .call("block_api.get_block", json!({ "block_num": num }))
            .await?;
        decode_block(num, result)
    }

    async fn get_blocks_range(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<BlockPayload>, ChainSourceError> {
        if to < from {
            return Err(ChainSourceError::rejected(format!(
                "invalid range {from}..{to}"
            )));
        }
        let count = to - from + 1;
        if count > i64::from(self.max_batch) {
            return Err(ChainSourceError::rejected(format!(
                "range of {count} exceeds batch bound {}",
                self.max_batch
            )));
        }

        let requests: Vec<RpcRequest> = (from..=to)
            .map(|num| {
                RpcRequest::new(
                    (num - from) as u64,
                    "block_api.get_block",
                    json!({ "block_num": num }),
                )
            })
            .collect();
        let results = self.call_batch(&requests).await?;

        let mut blocks = Vec::with_capacity(results.len());
        for (offset, result) in results.into_iter().enumerate() {
            let num = from + offset as i64;
            let block = decode_block(num, result)?.ok_or_else(|| {
                // All-or-none: a hole inside an irreversible range means the
                // node is unhealthy, not that the block does not exist.
                ChainSourceError::transport(format!("node has no block {num}"))
            })?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    async fn last_irreversible(&self) -> Result<i64, ChainSourceError> {
        let props = self
            .call("database_api.get_dynamic_global_properties", json!({}))
            .await?;
        number_field(&props, "last_irreversible_block_num")
    }

    async fn head_block(&self) -> Result<i64, ChainSourceError> {
        let props = self
            .call("database_api.get_dynamic_global_properties", json!({}))
            .await?;
        number_field(&props, "head_block_number")
    }

    async fn get_accounts(&self, names: &[String]) -> Result<Vec<Value>, ChainSourceError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        if names.len() > GET_ACCOUNTS_MAX {
            return Err(ChainSourceError::rejected(format!(
                "{} account names exceed the {GET_ACCOUNTS_MAX} bound",
                names.len()
            )));
        }
        let result = self
            .call("condenser_api.get_accounts", json!([names]))
            .await?;
        serde_json::from_value(result)
            .map_err(|err| ChainSourceError::decode(format!("bad accounts payload: {err}")))
    }

    async fn get_content(&self, author: &str, permlink: &str) -> Result<Value, ChainSourceError> {
        self.call("condenser_api.get_content", json!([author, permlink]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn block_decoding_stamps_the_requested_number() {
        let result = json!({
            "block": {
                "block_id": "00000064aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "previous": "00000063aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "timestamp": "2019-06-01T12:00:00",
                "transactions": [],
                "transaction_ids": []
            }
        });
        let block = decode_block(100, result).expect("decodes").expect("present");
        assert_eq!(block.block_num, 100);
    }

    #[test]
    fn empty_result_means_no_block() {
        assert_eq!(decode_block(100, json!({})).expect("decodes"), None);
    }

    #[test]
    fn rpc_errors_are_rejections() {
        let response: RpcResponse =
            serde_json::from_value(json!({"id": 1, "error": {"code": -32000, "message": "boom"}}))
                .expect("decodes");
        assert!(matches!(
            unwrap_response(response),
            Err(ChainSourceError::Rejected { .. })
        ));
    }
}
