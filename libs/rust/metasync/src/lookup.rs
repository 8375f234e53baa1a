use crate::address::ContentAddress;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to publish lookup record: {0}")]
    Publish(String),
}

/// Best-effort distributed "latest value for this key" lookup.
#[async_trait]
pub trait LatestLookup: Send + Sync {
    /// Yields candidate addresses as they arrive. The last one observed before
    /// the stream ends is authoritative.
    fn get(&self, key: &[u8]) -> BoxStream<'static, ContentAddress>;

    async fn put(&self, key: &[u8], address: &ContentAddress) -> Result<(), LookupError>;
}
