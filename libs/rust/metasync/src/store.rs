use crate::address::ContentAddress;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("content store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed content store response: {0}")]
    Malformed(String),
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Content-addressed document storage.
///
/// `put` is idempotent: the same document always yields the same address.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Returns `Ok(None)` when the store positively reports that nothing lives
    /// at `address`; transport problems are errors.
    async fn get(&self, address: &ContentAddress) -> Result<Option<Value>, StoreError>;

    async fn put(&self, document: &Value) -> Result<ContentAddress, StoreError>;
}
