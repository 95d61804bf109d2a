//! Mock block source for testing without network calls.

use super::{BlockSource, ChainError};
use crate::domain::EpochContext;
use async_trait::async_trait;
use std::sync::Mutex;

/// Returns a scripted block; `advance` moves to the next epoch.
#[derive(Debug)]
pub struct MockBlockSource {
    block: Mutex<EpochContext>,
    failure: Option<ChainError>,
}

impl MockBlockSource {
    pub fn new(epoch: u64, timestamp: u64) -> Self {
        Self {
            block: Mutex::new(EpochContext::new(epoch, timestamp)),
            failure: None,
        }
    }

    /// Make every call fail with `err`.
    pub fn with_failure(mut self, err: ChainError) -> Self {
        self.failure = Some(err);
        self
    }

    pub fn set_block(&self, epoch: u64, timestamp: u64) {
        if let Ok(mut block) = self.block.lock() {
            *block = EpochContext::new(epoch, timestamp);
        }
    }

    /// Step to the next block, twelve seconds later.
    pub fn advance(&self) {
        if let Ok(mut block) = self.block.lock() {
            block.epoch += 1;
            block.timestamp += 12;
        }
    }
}

impl Default for MockBlockSource {
    fn default() -> Self {
        Self::new(1, 1_700_000_000)
    }
}

#[async_trait]
impl BlockSource for MockBlockSource {
    async fn latest_block(&self) -> Result<EpochContext, ChainError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        self.block
            .lock()
            .map(|block| *block)
            .map_err(|e| ChainError::NetworkError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_advance() {
        let source = MockBlockSource::new(10, 1_000);
        assert_eq!(source.latest_block().await.unwrap(), EpochContext::new(10, 1_000));
        source.advance();
        assert_eq!(source.latest_block().await.unwrap(), EpochContext::new(11, 1_012));
        source.set_block(50, 5_000);
        assert_eq!(source.latest_block().await.unwrap().epoch, 50);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let source = MockBlockSource::default().with_failure(ChainError::RateLimited);
        assert_eq!(source.latest_block().await, Err(ChainError::RateLimited));
    }
}
