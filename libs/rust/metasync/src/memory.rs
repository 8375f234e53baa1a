//! In-process implementations of the capability interfaces.
//!
//! Used by tests and by single-node runs where no peer network is available.

use crate::{
    address::{ContentAddress, PointerId},
    gossip::{GossipChannel, GossipError},
    idea::{ContractEvent, IdeaContract},
    lookup::{LatestLookup, LookupError},
    pointer::PointerError,
    store::{ContentStore, StoreError},
};
use alloy::{hex, primitives::keccak256};
use async_trait::async_trait;
use futures::{
    StreamExt, future,
    stream::{self, BoxStream},
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::warn;

const CHANNEL_CAPACITY: usize = 256;

/// Content store keyed by the keccak-256 of the document's JSON encoding.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ContentAddress, Value>>,
    reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address_of(document: &Value) -> Result<ContentAddress, StoreError> {
        let bytes = serde_json::to_vec(document)?;
        ContentAddress::parse(&hex::encode_prefixed(keccak256(&bytes)))
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    /// Number of `get` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get(&self, address: &ContentAddress) -> Result<Option<Value>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.lock().get(address).cloned())
    }

    async fn put(&self, document: &Value) -> Result<ContentAddress, StoreError> {
        let address = Self::address_of(document)?;
        self.objects
            .lock()
            .insert(address.clone(), document.clone());
        Ok(address)
    }
}

/// Lookup table that keeps every published value; `get` replays them in
/// publication order so the newest one arrives last.
#[derive(Default)]
pub struct MemoryLookup {
    records: Mutex<HashMap<Vec<u8>, Vec<ContentAddress>>>,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, key: &[u8]) -> Option<ContentAddress> {
        self.records
            .lock()
            .get(key)
            .and_then(|values| values.last().cloned())
    }
}

#[async_trait]
impl LatestLookup for MemoryLookup {
    fn get(&self, key: &[u8]) -> BoxStream<'static, ContentAddress> {
        let values = self.records.lock().get(key).cloned().unwrap_or_default();
        stream::iter(values).boxed()
    }

    async fn put(&self, key: &[u8], address: &ContentAddress) -> Result<(), LookupError> {
        self.records
            .lock()
            .entry(key.to_vec())
            .or_default()
            .push(address.clone());
        Ok(())
    }
}

/// Gossip hub delivering every published payload to all current subscribers
/// of the topic, the publisher included.
#[derive(Default)]
pub struct LocalGossip {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl LocalGossip {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl GossipChannel for LocalGossip {
    fn subscribe(&self, topic: &str) -> BoxStream<'static, Vec<u8>> {
        let topic = topic.to_string();
        BroadcastStream::new(self.sender(&topic).subscribe())
            .filter_map(move |message| {
                future::ready(match message {
                    Ok(payload) => Some(payload),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "Gossip subscriber lagged, messages lost");
                        None
                    }
                })
            })
            .boxed()
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GossipError> {
        // No subscribers is not an error for a pub/sub transport.
        let _ = self.sender(topic).send(payload);
        Ok(())
    }
}

/// Idea contract whose metadata address and events are driven by hand.
pub struct MemoryContract {
    id: PointerId,
    ipfs_addr: Mutex<Option<String>>,
    events: broadcast::Sender<ContractEvent>,
    calls: AtomicUsize,
}

impl MemoryContract {
    pub fn new(id: PointerId) -> Self {
        Self {
            id,
            ipfs_addr: Mutex::new(None),
            events: broadcast::channel(CHANNEL_CAPACITY).0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_ipfs_addr(&self, address: impl Into<String>) {
        *self.ipfs_addr.lock() = Some(address.into());
    }

    pub fn emit(&self, event: ContractEvent) {
        let _ = self.events.send(event);
    }

    /// Number of `ipfs_addr` calls made against the contract.
    pub fn ipfs_addr_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdeaContract for MemoryContract {
    fn id(&self) -> &PointerId {
        &self.id
    }

    async fn ipfs_addr(&self) -> Result<String, PointerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ipfs_addr
            .lock()
            .clone()
            .ok_or_else(|| PointerError::Contract("ipfsAddr not set".to_string()))
    }

    fn events(&self, kinds: &[ContractEvent]) -> BoxStream<'static, ContractEvent> {
        let kinds = kinds.to_vec();
        BroadcastStream::new(self.events.subscribe())
            .filter_map(move |event| future::ready(event.ok().filter(|e| kinds.contains(e))))
            .boxed()
    }
}
