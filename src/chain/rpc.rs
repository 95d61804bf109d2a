//! JSON-RPC block source.

use super::{BlockSource, ChainError};
use crate::domain::EpochContext;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Reads the latest block over Ethereum-style JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcBlockSource {
    client: Client,
    url: String,
    max_elapsed: Duration,
}

impl RpcBlockSource {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
            max_elapsed: Duration::from_secs(30),
        }
    }

    /// Cap on total retry time.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn call(&self, payload: serde_json::Value) -> Result<serde_json::Value, ChainError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ChainError::NetworkError(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ChainError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ChainError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ChainError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ChainError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl BlockSource for RpcBlockSource {
    async fn latest_block(&self) -> Result<EpochContext, ChainError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBlockByNumber",
            "params": ["latest", false]
        });

        let response = self.call(payload).await?;
        let block = parse_block_response(&response)?;
        debug!(epoch = block.epoch, timestamp = block.timestamp, "latest block");
        Ok(block)
    }
}

/// Extract `{number, timestamp}` from an `eth_getBlockByNumber` reply.
pub fn parse_block_response(response: &serde_json::Value) -> Result<EpochContext, ChainError> {
    if let Some(err) = response.get("error") {
        return Err(ChainError::RpcError {
            code: err.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string(),
        });
    }

    let block = response
        .get("result")
        .filter(|r| !r.is_null())
        .ok_or_else(|| ChainError::ParseError("missing result".to_string()))?;

    let epoch = parse_quantity(block, "number")?;
    let timestamp = parse_quantity(block, "timestamp")?;
    Ok(EpochContext::new(epoch, timestamp))
}

fn parse_quantity(block: &serde_json::Value, field: &str) -> Result<u64, ChainError> {
    let text = block
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ChainError::ParseError(format!("missing {}", field)))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::ParseError(format!("{} is not a hex quantity", field)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::ParseError(format!("{}: {}", field, e)))
}
