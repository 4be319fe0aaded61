//! JSON-RPC client for EVM chain nodes
//!
//! Provides a typed, read-only interface to an HTTP JSON-RPC endpoint and
//! normalizes provider-specific failures into the `ClientError` taxonomy.
//! No retries happen here; retry policy belongs to the drivers.

use crate::error::ClientError;
use crate::types::{Block, Log, Receipt};
use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::{json, Value};

/// Read-only block data source consumed by the block processor.
///
/// The HTTP client implements this; tests substitute an in-memory chain.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetch a block with full transaction objects.
    async fn block(&self, number: u64) -> Result<Block, ClientError>;

    /// Fetch all receipts of a block in one call.
    async fn block_receipts(&self, number: u64) -> Result<Vec<Receipt>, ClientError>;

    /// Fetch raw logs for a block, optionally filtered by emitting contract.
    async fn logs(&self, number: u64, address: Option<Address>) -> Result<Vec<Log>, ClientError>;
}

/// JSON-RPC client for one chain endpoint.
#[derive(Clone)]
pub struct ChainClient {
    client: reqwest::Client,
    url: String,
}

impl ChainClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::Connectivity(format!("{} request failed: {}", method, e)))?;

        if response.status().as_u16() == 429 {
            return Err(ClientError::RateLimit(format!("{}: HTTP 429", method)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Connectivity(format!("{} response read failed: {}", method, e)))?;

        if let Some(error) = body.get("error") {
            return Err(normalize_rpc_error(method, error));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| ClientError::Rpc(format!("{}: response missing 'result'", method)))
    }

    /// Get the latest block number (`eth_blockNumber`).
    pub async fn latest_block(&self) -> Result<u64, ClientError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let s = result
            .as_str()
            .ok_or_else(|| ClientError::Rpc("eth_blockNumber: result is not a string".into()))?;
        let s = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(s, 16)
            .map_err(|e| ClientError::Rpc(format!("eth_blockNumber: bad hex {:?}: {}", s, e)))
    }
}

#[async_trait]
impl ChainSource for ChainClient {
    async fn block(&self, number: u64) -> Result<Block, ClientError> {
        let params = json!([format!("0x{:x}", number), true]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            return Err(ClientError::NotFound(number));
        }
        serde_json::from_value(result)
            .map_err(|e| ClientError::Rpc(format!("block {}: deserialize failed: {}", number, e)))
    }

    async fn block_receipts(&self, number: u64) -> Result<Vec<Receipt>, ClientError> {
        let params = json!([format!("0x{:x}", number)]);
        let result = self.call("eth_getBlockReceipts", params).await?;
        if result.is_null() {
            return Err(ClientError::NotFound(number));
        }
        serde_json::from_value(result).map_err(|e| {
            ClientError::Rpc(format!("receipts {}: deserialize failed: {}", number, e))
        })
    }

    async fn logs(&self, number: u64, address: Option<Address>) -> Result<Vec<Log>, ClientError> {
        let block_tag = format!("0x{:x}", number);
        let mut filter = json!({
            "fromBlock": block_tag,
            "toBlock": block_tag,
        });
        if let Some(addr) = address {
            filter["address"] = json!(format!("0x{:x}", addr));
        }
        let result = self.call("eth_getLogs", json!([filter])).await?;
        serde_json::from_value(result)
            .map_err(|e| ClientError::Rpc(format!("logs {}: deserialize failed: {}", number, e)))
    }
}

/// Map a JSON-RPC error object onto the error taxonomy.
///
/// -32005 is the conventional rate-limit code; several providers only
/// signal throttling through the message text.
fn normalize_rpc_error(method: &str, error: &Value) -> ClientError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if code == -32005 || message.to_lowercase().contains("rate") {
        ClientError::RateLimit(format!("{}: {} ({})", method, message, code))
    } else {
        ClientError::Rpc(format!("{}: {} ({})", method, message, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rate_limit_code() {
        let err = json!({"code": -32005, "message": "too many requests"});
        assert!(matches!(
            normalize_rpc_error("eth_getLogs", &err),
            ClientError::RateLimit(_)
        ));
    }

    #[test]
    fn test_normalize_rate_limit_message() {
        let err = json!({"code": -32000, "message": "Rate limit exceeded"});
        assert!(matches!(
            normalize_rpc_error("eth_getLogs", &err),
            ClientError::RateLimit(_)
        ));
    }

    #[test]
    fn test_normalize_plain_rpc_error() {
        let err = json!({"code": -32602, "message": "invalid params"});
        assert!(matches!(
            normalize_rpc_error("eth_getLogs", &err),
            ClientError::Rpc(_)
        ));
    }
}
