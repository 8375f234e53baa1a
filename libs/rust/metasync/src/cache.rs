use crate::{
    address::{ContentAddress, PointerId},
    pointer::Pointer,
    store::ContentStore,
};
use futures::{Stream, StreamExt, stream::BoxStream};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    collections::HashMap,
    num::NonZeroUsize,
    pin::Pin,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};
use thiserror::Error;
use tokio::{sync::OnceCell, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, instrument, warn};

pub type Document = Arc<Value>;

type Listener = Arc<dyn Fn(Document) + Send + Sync>;

#[derive(Debug, Error)]
pub enum CacheConfigError {
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaCacheConfig {
    /// Documents kept in memory. Evicted documents are simply fetched again.
    pub max_documents: usize,
}

impl Default for MetaCacheConfig {
    fn default() -> Self {
        Self {
            max_documents: 4096,
        }
    }
}

/// Outcome of fetching a document by address.
#[derive(Debug, Clone)]
pub enum Fetch {
    Found(Document),
    NotFound,
    Failed(String),
}

impl Fetch {
    pub fn found(self) -> Option<Document> {
        match self {
            Self::Found(document) => Some(document),
            Self::NotFound | Self::Failed(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Shared cache of immutable documents and of the address each pointer
/// currently resolves to.
///
/// Cloning is cheap and every clone sees the same state. Errors never escape:
/// they are logged and surface as an absent value.
#[derive(Clone)]
pub struct MetaCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ContentStore>,
    // A cell per address doubles as the in-flight marker: concurrent fetches
    // of one address wait on the same initialization.
    documents: Mutex<LruCache<ContentAddress, Arc<OnceCell<Document>>>>,
    pointers: Mutex<HashMap<PointerId, PointerState>>,
    next_listener: AtomicU64,
}

struct PointerState {
    address: Arc<OnceCell<ContentAddress>>,
    listeners: Vec<(u64, Listener)>,
    watcher: Option<JoinHandle<()>>,
}

impl PointerState {
    fn new() -> Self {
        Self {
            address: Arc::new(OnceCell::new()),
            listeners: Vec::new(),
            watcher: None,
        }
    }
}

impl MetaCache {
    pub fn new(
        store: Arc<dyn ContentStore>,
        config: &MetaCacheConfig,
    ) -> Result<Self, CacheConfigError> {
        let capacity = NonZeroUsize::new(config.max_documents).ok_or_else(|| {
            CacheConfigError::InvalidConfig("max_documents must be non-zero".to_string())
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                documents: Mutex::new(LruCache::new(capacity)),
                pointers: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
            }),
        })
    }

    /// Returns the document at `address`, or `None` if it is missing or could
    /// not be fetched.
    pub async fn get(&self, address: &ContentAddress) -> Option<Document> {
        self.fetch(address).await.found()
    }

    /// Like [`MetaCache::get`] but keeps "not found" apart from a failed fetch.
    /// Only found documents are cached.
    #[instrument(skip_all, fields(address = %address))]
    pub async fn fetch(&self, address: &ContentAddress) -> Fetch {
        let cell = {
            let mut documents = self.inner.documents.lock();
            documents
                .get_or_insert(address.clone(), || Arc::new(OnceCell::new()))
                .clone()
        };

        if let Some(document) = cell.get() {
            return Fetch::Found(document.clone());
        }

        let fetched = cell
            .get_or_try_init(|| async {
                match self.inner.store.get(address).await {
                    Ok(Some(value)) => Ok(Arc::new(value)),
                    Ok(None) => Err(Fetch::NotFound),
                    Err(e) => Err(Fetch::Failed(e.to_string())),
                }
            })
            .await;

        let miss = match fetched {
            Ok(document) => return Fetch::Found(document.clone()),
            Err(miss) => miss,
        };

        // Misses must not hold a capacity slot.
        {
            let mut documents = self.inner.documents.lock();
            if documents
                .peek(address)
                .is_some_and(|held| Arc::ptr_eq(held, &cell) && held.get().is_none())
            {
                documents.pop(address);
            }
        }

        match miss {
            Fetch::NotFound => {
                warn!("Document not found in content store");
                Fetch::NotFound
            }
            miss => {
                error!(error = ?miss, "Failed to fetch document");
                miss
            }
        }
    }

    pub async fn get_as<T: DeserializeOwned>(&self, address: &ContentAddress) -> Option<T> {
        let document = self.get(address).await?;
        decode(address, &document)
    }

    /// Last known address of `pointer`. The pointer is only queried the first
    /// time; afterwards the address changes only when a change event fires.
    pub async fn resolve_address(&self, pointer: &dyn Pointer) -> Option<ContentAddress> {
        let cell = {
            let mut pointers = self.inner.pointers.lock();
            pointers
                .entry(pointer.id().clone())
                .or_insert_with(PointerState::new)
                .address
                .clone()
        };

        match cell.get_or_try_init(|| pointer.current_address()).await {
            Ok(address) => Some(address.clone()),
            Err(e) => {
                error!(pointer = %pointer.id(), error = %e, "Failed to resolve pointer address");
                None
            }
        }
    }

    pub async fn resolve_document(&self, pointer: &dyn Pointer) -> Option<Document> {
        let address = self.resolve_address(pointer).await?;
        self.get(&address).await
    }

    pub async fn resolve_document_as<T: DeserializeOwned>(&self, pointer: &dyn Pointer) -> Option<T> {
        let address = self.resolve_address(pointer).await?;
        self.get_as(&address).await
    }

    /// Calls `listener` with the freshly resolved document every time the
    /// pointer changes, in registration order relative to other listeners of
    /// the same pointer.
    ///
    /// Only the first subscription for a pointer identity registers upstream.
    /// Dropping the returned [`Subscription`] removes the listener, and the
    /// upstream registration goes away with the last one. Must be called from
    /// within a tokio runtime.
    pub fn subscribe<F>(&self, pointer: Arc<dyn Pointer>, listener: F) -> Subscription
    where
        F: Fn(Document) + Send + Sync + 'static,
    {
        let id = pointer.id().clone();
        let listener_id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);

        let mut pointers = self.inner.pointers.lock();
        let state = pointers.entry(id.clone()).or_insert_with(PointerState::new);
        state.listeners.push((listener_id, Arc::new(listener)));

        if state.watcher.is_none() {
            let changes = pointer.changes();
            let cache = Arc::downgrade(&self.inner);
            state.watcher = Some(tokio::spawn(watch_pointer(cache, pointer, changes)));
            debug!(pointer = %id, "Registered upstream change handler");
        }

        Subscription {
            cache: Arc::downgrade(&self.inner),
            pointer: id,
            listener: listener_id,
        }
    }

    /// Stream of documents produced by future changes of `pointer`.
    pub fn watch(&self, pointer: Arc<dyn Pointer>) -> DocumentStream {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let subscription = self.subscribe(pointer, move |document| {
            let _ = sender.send(document);
        });

        DocumentStream {
            _subscription: subscription,
            documents: UnboundedReceiverStream::new(receiver),
        }
    }

    /// Number of listeners currently registered for `pointer`.
    pub fn listener_count(&self, pointer: &PointerId) -> usize {
        self.inner
            .pointers
            .lock()
            .get(pointer)
            .map_or(0, |state| state.listeners.len())
    }

    fn record_address(&self, pointer: &PointerId, address: ContentAddress) {
        let mut pointers = self.inner.pointers.lock();
        let state = pointers.entry(pointer.clone()).or_insert_with(PointerState::new);
        state.address = Arc::new(OnceCell::new_with(Some(address)));
    }

    #[instrument(skip_all, fields(pointer = %pointer.id()))]
    async fn refresh(&self, pointer: &dyn Pointer) {
        // The event says the address may have moved, so skip the cached one.
        let address = match pointer.current_address().await {
            Ok(address) => address,
            Err(e) => {
                error!(error = %e, "Failed to re-resolve pointer after change");
                return;
            }
        };
        self.record_address(pointer.id(), address.clone());

        let Some(document) = self.get(&address).await else {
            warn!(address = %address, "Changed pointer resolved to no document, keeping last value");
            return;
        };

        let listeners: Vec<Listener> = self
            .inner
            .pointers
            .lock()
            .get(pointer.id())
            .map(|state| state.listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        debug!(address = %address, listeners = listeners.len(), "Notifying listeners");
        for listener in listeners {
            listener(document.clone());
        }
    }
}

async fn watch_pointer(
    cache: Weak<Inner>,
    pointer: Arc<dyn Pointer>,
    mut changes: BoxStream<'static, ()>,
) {
    while changes.next().await.is_some() {
        let Some(inner) = cache.upgrade() else {
            return;
        };
        MetaCache { inner }.refresh(pointer.as_ref()).await;
    }
    debug!(pointer = %pointer.id(), "Pointer change stream ended");
}

fn decode<T: DeserializeOwned>(address: &ContentAddress, document: &Value) -> Option<T> {
    match T::deserialize(document) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(address = %address, error = %e, "Document does not match expected shape");
            None
        }
    }
}

/// Keeps a listener registered with a [`MetaCache`] until dropped.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    cache: Weak<Inner>,
    pointer: PointerId,
    listener: u64,
}

impl Subscription {
    pub fn pointer(&self) -> &PointerId {
        &self.pointer
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.cache.upgrade() else {
            return;
        };
        let mut pointers = inner.pointers.lock();
        let Some(state) = pointers.get_mut(&self.pointer) else {
            return;
        };

        state.listeners.retain(|(id, _)| *id != self.listener);
        if state.listeners.is_empty() {
            if let Some(watcher) = state.watcher.take() {
                watcher.abort();
                debug!(pointer = %self.pointer, "Removed upstream change handler");
            }
        }
    }
}

/// Documents delivered to a [`MetaCache::watch`] listener. Dropping the
/// stream unsubscribes.
pub struct DocumentStream {
    _subscription: Subscription,
    documents: UnboundedReceiverStream<Document>,
}

impl Stream for DocumentStream {
    type Item = Document;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.documents).poll_next(cx)
    }
}
