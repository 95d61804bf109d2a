//! Epoch source: the host chain's latest block defines the current epoch.

use crate::domain::EpochContext;
use async_trait::async_trait;
use std::fmt;

pub mod mock;
pub mod rpc;

pub use mock::MockBlockSource;
pub use rpc::RpcBlockSource;

/// Reports the block a bundle would execute in.
///
/// Implementations must handle retry/backoff and rate limiting.
#[async_trait]
pub trait BlockSource: Send + Sync + fmt::Debug {
    /// Latest block number (the epoch) and its timestamp in seconds.
    async fn latest_block(&self) -> Result<EpochContext, ChainError>;
}

/// Error type for block source operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 5xx server error)
    HttpError { status: u16, message: String },
    /// Malformed JSON-RPC response
    ParseError(String),
    /// JSON-RPC error object returned by the node
    RpcError { code: i64, message: String },
    RateLimited,
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            ChainError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            ChainError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ChainError::RpcError { code, message } => {
                write!(f, "RPC error {}: {}", code, message)
            }
            ChainError::RateLimited => write!(f, "Rate limited"),
        }
    }
}

impl std::error::Error for ChainError {}
