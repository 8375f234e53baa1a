use crate::{
    address::{ContentAddress, PointerId},
    pointer::{Pointer, PointerError},
};
use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// State-changing events emitted by an Idea contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractEvent {
    ProposalAccepted,
    ProposalRejected,
}

impl ContractEvent {
    pub const fn name(self) -> &'static str {
        match self {
            Self::ProposalAccepted => "ProposalAccepted",
            Self::ProposalRejected => "ProposalRejected",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ProposalAccepted" => Some(Self::ProposalAccepted),
            "ProposalRejected" => Some(Self::ProposalRejected),
            _ => None,
        }
    }
}

impl fmt::Display for ContractEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The on-chain side of an Idea: its metadata address and its event log.
#[async_trait]
pub trait IdeaContract: Send + Sync {
    fn id(&self) -> &PointerId;

    async fn ipfs_addr(&self) -> Result<String, PointerError>;

    /// Streams the requested events in log order, starting from the moment of
    /// the call.
    fn events(&self, kinds: &[ContractEvent]) -> BoxStream<'static, ContractEvent>;
}

/// Metadata document an Idea points at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeaMetadata {
    pub title: String,
    pub description: String,
    pub payload: Vec<ContentAddress>,
}

/// An installable module referenced from [`IdeaMetadata::payload`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeaPayload {
    pub loader: String,
    pub module: Vec<u8>,
}

const META_EVENTS: &[ContractEvent] = &[ContractEvent::ProposalAccepted];

/// Pointer to the metadata stored at an Idea contract. The address only
/// changes when a proposal is accepted.
pub struct IdeaMetaProvider {
    contract: Arc<dyn IdeaContract>,
}

impl IdeaMetaProvider {
    pub fn new(contract: Arc<dyn IdeaContract>) -> Self {
        Self { contract }
    }
}

#[async_trait]
impl Pointer for IdeaMetaProvider {
    fn id(&self) -> &PointerId {
        self.contract.id()
    }

    async fn current_address(&self) -> Result<ContentAddress, PointerError> {
        let raw = self.contract.ipfs_addr().await?;
        Ok(ContentAddress::parse(&raw)?)
    }

    fn changes(&self) -> BoxStream<'static, ()> {
        self.contract.events(META_EVENTS).map(|_| ()).boxed()
    }
}
