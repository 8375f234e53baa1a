use crate::{
    address::{AddressError, ContentAddress, PointerId},
    store::StoreError,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointerError {
    #[error("contract call failed: {0}")]
    Contract(String),
    #[error("pointer resolved to an invalid content address: {0}")]
    Address(#[from] AddressError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An entity whose current content address can change over time.
#[async_trait]
pub trait Pointer: Send + Sync {
    fn id(&self) -> &PointerId;

    /// Reads the address the pointer resolves to right now.
    async fn current_address(&self) -> Result<ContentAddress, PointerError>;

    /// Yields once every time the resolved address may have changed.
    ///
    /// The upstream registration happens when this is called, so a change
    /// raised right after the call is not lost.
    fn changes(&self) -> BoxStream<'static, ()>;
}
