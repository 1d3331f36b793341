//! Chain RPC Provider
//!
//! Minimal view of an EVM JSON-RPC node: receipts, raw transactions,
//! read-only calls and wallet-signed sends. One provider per chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::error::ChainError;

/// Unified interface for talking to one chain
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Numeric chain id (e.g. 1, 137)
    fn chain_id(&self) -> u64;

    /// `None` while the node has no receipt for the hash
    async fn get_transaction_receipt(&self, hash: &str)
    -> Result<Option<TxReceipt>, ChainError>;

    /// `None` when the node does not know the hash
    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, ChainError>;

    /// Read-only contract call against the latest block; returns the hex result
    async fn call(&self, to: &str, data: &str) -> Result<String, ChainError>;

    /// Broadcast a transaction signed by the connected wallet; returns its hash
    async fn send_transaction(&self, tx: TxRequest) -> Result<String, ChainError>;
}

/// Receipt fields the bridge cares about
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub transaction_hash: String,
    /// `None` until mined
    pub block_number: Option<u64>,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// Raw transaction as returned by `eth_getTransactionByHash`
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    /// Hex calldata, `0x`-prefixed
    pub input: String,
}

/// Unsigned transaction handed to the wallet for signing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxRequest {
    pub from: String,
    pub to: String,
    pub data: String,
}

// ============================================================================
// JSON-RPC wire types
// ============================================================================

#[derive(Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EthReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    #[serde(default)]
    logs: Vec<Log>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EthTransaction {
    hash: String,
    from: String,
    input: String,
}

#[derive(Serialize)]
struct CallParams<'a> {
    to: &'a str,
    data: &'a str,
}

fn parse_hex_u64(value: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Parse(format!("invalid quantity {}: {}", value, e)))
}

impl TryFrom<EthReceipt> for TxReceipt {
    type Error = ChainError;

    fn try_from(r: EthReceipt) -> Result<Self, Self::Error> {
        let block_number = r.block_number.as_deref().map(parse_hex_u64).transpose()?;
        Ok(TxReceipt {
            transaction_hash: r.transaction_hash,
            block_number,
            logs: r.logs,
        })
    }
}

// ============================================================================
// HTTP provider
// ============================================================================

/// JSON-RPC provider over HTTP
pub struct JsonRpcProvider {
    url: String,
    chain_id: u64,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(url: &str, chain_id: u64, timeout: Duration) -> Result<Self, ChainError> {
        info!(chain_id, url, "Initializing JSON-RPC provider");

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ChainError::RpcConnection(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            url: url.to_string(),
            chain_id,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// JSON-RPC call where a `null` result is a legitimate answer
    async fn rpc_call_optional<T, R>(
        &self,
        method: &'static str,
        params: T,
    ) -> Result<Option<R>, ChainError>
    where
        T: Serialize + Send,
        R: for<'de> Deserialize<'de>,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::RpcConnection(format!("HTTP request failed: {}", e)))?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| ChainError::Parse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = rpc_response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(rpc_response.result)
    }

    async fn rpc_call<T, R>(&self, method: &'static str, params: T) -> Result<R, ChainError>
    where
        T: Serialize + Send,
        R: for<'de> Deserialize<'de>,
    {
        self.rpc_call_optional(method, params)
            .await?
            .ok_or_else(|| ChainError::Parse(format!("No result in {} response", method)))
    }
}

#[async_trait]
impl ChainRpc for JsonRpcProvider {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_transaction_receipt(
        &self,
        hash: &str,
    ) -> Result<Option<TxReceipt>, ChainError> {
        let receipt: Option<EthReceipt> = self
            .rpc_call_optional("eth_getTransactionReceipt", [hash])
            .await?;
        receipt.map(TxReceipt::try_from).transpose()
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, ChainError> {
        let tx: Option<EthTransaction> = self
            .rpc_call_optional("eth_getTransactionByHash", [hash])
            .await?;
        Ok(tx.map(|t| RawTransaction {
            hash: t.hash,
            from: t.from,
            input: t.input,
        }))
    }

    async fn call(&self, to: &str, data: &str) -> Result<String, ChainError> {
        self.rpc_call("eth_call", (CallParams { to, data }, "latest"))
            .await
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<String, ChainError> {
        debug!(chain_id = self.chain_id, to = %tx.to, "Sending transaction");
        self.rpc_call("eth_sendTransaction", [tx]).await
    }
}
