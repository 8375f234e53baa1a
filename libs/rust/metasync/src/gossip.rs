use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("failed to publish to topic {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

/// Topic-keyed pub/sub transport carrying opaque payloads.
#[async_trait]
pub trait GossipChannel: Send + Sync {
    fn subscribe(&self, topic: &str) -> BoxStream<'static, Vec<u8>>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GossipError>;
}
