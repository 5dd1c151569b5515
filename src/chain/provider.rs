//! Wallet Provider
//!
//! The EIP-1193 style boundary this crate talks through: a single
//! `request(method, params)` entry point plus an optional stream of
//! `accountsChanged` notifications. Key custody and signing stay on the
//! other side of this trait.
//!
//! `HttpProvider` is the bundled implementation: JSON-RPC 2.0 over HTTP to a
//! node that manages its own unlocked accounts.

use crate::chain::types::{
    parse_hex_data, parse_quantity_u64, to_hex_data, Address, TransactionRequest, TxReceipt,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;

/// JSON-RPC error code for a request the user declined (EIP-1193)
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC error code nodes use for reverted execution
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// Methods that must never be retried
const NON_IDEMPOTENT: &[&str] = &["eth_sendTransaction", "eth_requestAccounts"];

/// Errors that can occur when talking to a wallet provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider unavailable")]
    Unavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// The user declined the request in their wallet
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, ProviderError::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }

    /// The node executed the call and it reverted
    pub fn is_revert(&self) -> bool {
        match self {
            ProviderError::Rpc { code, message } => {
                *code == EXECUTION_REVERTED_CODE || message.to_lowercase().contains("revert")
            }
            _ => false,
        }
    }

    /// Transport-level failure worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Unavailable | ProviderError::Timeout => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// A wallet provider: the injected-wallet equivalent
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Issue a JSON-RPC style request
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Push notifications for `accountsChanged`, if this provider can emit them
    fn account_events(&self) -> Option<broadcast::Receiver<Vec<Address>>> {
        None
    }
}

fn invalid(method: &str, detail: impl std::fmt::Display) -> ProviderError {
    ProviderError::InvalidResponse(format!("{}: {}", method, detail))
}

fn parse_accounts(method: &str, value: Value) -> Result<Vec<Address>, ProviderError> {
    serde_json::from_value(value).map_err(|e| invalid(method, e))
}

/// Typed helpers over `WalletProvider::request`
#[async_trait]
pub trait ProviderExt: WalletProvider {
    /// Ask the wallet for account access (may prompt the user)
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let value = self.request("eth_requestAccounts", json!([])).await?;
        parse_accounts("eth_requestAccounts", value)
    }

    /// Accounts already authorized, without prompting
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let value = self.request("eth_accounts", json!([])).await?;
        parse_accounts("eth_accounts", value)
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let value = self.request("eth_blockNumber", json!([])).await?;
        let text = value
            .as_str()
            .ok_or_else(|| invalid("eth_blockNumber", "expected a hex string"))?;
        parse_quantity_u64(text).map_err(|e| invalid("eth_blockNumber", e))
    }

    /// Timestamp of the latest block, unix seconds
    async fn latest_block_timestamp(&self) -> Result<u64, ProviderError> {
        let block = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let text = block
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("eth_getBlockByNumber", "missing block timestamp"))?;
        parse_quantity_u64(text).map_err(|e| invalid("eth_getBlockByNumber", e))
    }

    /// Read-only contract call against the latest block
    async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let params = json!([{ "to": to.to_string(), "data": to_hex_data(data) }, "latest"]);
        let value = self.request("eth_call", params).await?;
        let text = value
            .as_str()
            .ok_or_else(|| invalid("eth_call", "expected hex data"))?;
        parse_hex_data(text).map_err(|e| invalid("eth_call", e))
    }

    /// Submit a transaction; returns its hash
    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<String, ProviderError> {
        let value = self
            .request("eth_sendTransaction", json!([tx.to_json()]))
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid("eth_sendTransaction", "expected a transaction hash"))
    }

    /// Receipt for a transaction, `None` while it is still pending
    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, ProviderError> {
        let value = self
            .request("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        TxReceipt::from_json(value).map_err(|e| invalid("eth_getTransactionReceipt", e))
    }
}

#[async_trait]
impl<P: WalletProvider + ?Sized> ProviderExt for P {}

// ============================================
// HTTP JSON-RPC provider
// ============================================

/// Configuration for the HTTP provider
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Node endpoint (e.g., "http://localhost:8545")
    pub url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts for idempotent requests
    pub max_retries: u32,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8545".to_string(),
            request_timeout_ms: 10_000,
            max_retries: 3,
        }
    }
}

/// JSON-RPC 2.0 provider over HTTP
pub struct HttpProvider {
    client: Client,
    config: HttpProviderConfig,
    next_id: AtomicU64,
}

impl HttpProvider {
    /// Create a new provider
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &HttpProviderConfig {
        &self.config
    }

    async fn send_once(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: text,
            });
        }

        let reply: JsonRpcResponse = response.json().await.map_err(map_transport_error)?;
        if let Some(error) = reply.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(reply.result.unwrap_or(Value::Null))
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else if e.is_connect() {
        ProviderError::Unavailable
    } else {
        ProviderError::Request(e)
    }
}

#[async_trait]
impl WalletProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        // A node has no approval prompt: the accounts it unlocks are the
        // accounts it authorizes.
        let method = if method == "eth_requestAccounts" {
            "eth_accounts"
        } else {
            method
        };

        let attempts = if NON_IDEMPOTENT.contains(&method) {
            1
        } else {
            self.config.max_retries.max(1)
        };

        let mut last_error = ProviderError::Unavailable;
        for attempt in 0..attempts {
            if attempt > 0 {
                // Quadratic backoff: 250ms, 1s, 2.25s...
                let delay = std::time::Duration::from_millis(250 * (attempt as u64).pow(2));
                tokio::time::sleep(delay).await;
            }

            match self.send_once(method, &params).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    tracing::debug!(method, attempt, error = %e, "Provider request failed, retrying");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }
}

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}
