use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use metasync::{
    ContentAddress, ContentStore, ContractEvent, Fetch, IdeaMetaProvider, IdeaMetadata, MetaCache,
    MetaCacheConfig, Pointer, PointerError, PointerId, StoreError,
    memory::{MemoryContract, MemoryStore},
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(1);

fn idea_id() -> PointerId {
    PointerId::new("0xEfa56061B06aC1481E1B30e30E8617f2E18d0907")
}

fn cache_over(store: Arc<dyn ContentStore>) -> MetaCache {
    MetaCache::new(store, &MetaCacheConfig::default()).unwrap()
}

/// Store that fails the first `failures` reads before delegating.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn get(&self, address: &ContentAddress) -> Result<Option<Value>, StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Malformed("connection reset".to_string()));
        }
        self.inner.get(address).await
    }

    async fn put(&self, document: &Value) -> Result<ContentAddress, StoreError> {
        self.inner.put(document).await
    }
}

/// Pointer wrapper counting how often its change stream is requested.
struct CountingPointer {
    inner: IdeaMetaProvider,
    registrations: Arc<AtomicUsize>,
}

#[async_trait]
impl Pointer for CountingPointer {
    fn id(&self) -> &PointerId {
        self.inner.id()
    }

    async fn current_address(&self) -> Result<ContentAddress, PointerError> {
        self.inner.current_address().await
    }

    fn changes(&self) -> BoxStream<'static, ()> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.inner.changes()
    }
}

#[tokio::test]
async fn test_fetch_is_served_from_cache() {
    let store = Arc::new(MemoryStore::new());
    let address = store.put(&json!({"title": "Beacon"})).await.unwrap();
    let cache = cache_over(store.clone());

    let first = cache.get(&address).await.unwrap();
    let second = cache.get(&address).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.reads(), 1);
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_read() {
    let store = Arc::new(MemoryStore::new());
    let address = store.put(&json!({"title": "Beacon"})).await.unwrap();
    let cache = cache_over(store.clone());

    let (a, b, c) = tokio::join!(cache.get(&address), cache.get(&address), cache.get(&address));

    assert!(a.is_some() && b.is_some() && c.is_some());
    assert_eq!(store.reads(), 1);
}

#[tokio::test]
async fn test_missing_document_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache_over(store.clone());
    let missing = ContentAddress::parse("bafymissing").unwrap();

    assert!(matches!(cache.fetch(&missing).await, Fetch::NotFound));
    assert!(cache.get(&missing).await.is_none());
    assert_eq!(store.reads(), 2);
}

#[tokio::test]
async fn test_misses_do_not_evict_cached_documents() {
    let store = Arc::new(MemoryStore::new());
    let address = store.put(&json!({"title": "Beacon"})).await.unwrap();
    let cache = MetaCache::new(store.clone(), &MetaCacheConfig { max_documents: 1 }).unwrap();

    assert!(cache.get(&address).await.is_some());
    for missing in ["bafymissing1", "bafymissing2", "bafymissing3"] {
        let missing = ContentAddress::parse(missing).unwrap();
        assert!(matches!(cache.fetch(&missing).await, Fetch::NotFound));
    }
    assert!(cache.get(&address).await.is_some());

    // One read for the document plus one per miss.
    assert_eq!(store.reads(), 4);
}

#[tokio::test]
async fn test_failed_fetch_is_retried() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        failures: AtomicUsize::new(1),
    });
    let address = store.put(&json!({"title": "Beacon"})).await.unwrap();
    let cache = cache_over(store);

    assert!(matches!(cache.fetch(&address).await, Fetch::Failed(_)));
    assert_eq!(
        cache.get(&address).await.as_deref(),
        Some(&json!({"title": "Beacon"}))
    );
}

#[tokio::test]
async fn test_address_only_changes_on_change_event() {
    let store = Arc::new(MemoryStore::new());
    let old = store.put(&json!({"title": "Old"})).await.unwrap();
    let new = store.put(&json!({"title": "New"})).await.unwrap();

    let contract = Arc::new(MemoryContract::new(idea_id()));
    contract.set_ipfs_addr(old.as_str());
    let pointer: Arc<dyn Pointer> = Arc::new(IdeaMetaProvider::new(contract.clone()));
    let cache = cache_over(store);

    assert_eq!(cache.resolve_address(pointer.as_ref()).await, Some(old.clone()));
    assert_eq!(contract.ipfs_addr_calls(), 1);

    // The contract moves but no event has been observed yet.
    contract.set_ipfs_addr(new.as_str());
    assert_eq!(cache.resolve_address(pointer.as_ref()).await, Some(old.clone()));
    assert_eq!(contract.ipfs_addr_calls(), 1);

    let mut documents = cache.watch(pointer.clone());
    contract.emit(ContractEvent::ProposalAccepted);

    let document = tokio::time::timeout(WAIT, documents.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*document, json!({"title": "New"}));
    assert_eq!(cache.resolve_address(pointer.as_ref()).await, Some(new));
    assert_eq!(
        cache
            .resolve_document_as::<IdeaMetadata>(pointer.as_ref())
            .await
            .unwrap()
            .title,
        "New"
    );
}

#[tokio::test]
async fn test_listeners_fire_in_registration_order() {
    let store = Arc::new(MemoryStore::new());
    let next = store.put(&json!({"title": "Next"})).await.unwrap();
    let contract = Arc::new(MemoryContract::new(idea_id()));
    contract.set_ipfs_addr("bafyinitial");
    let pointer: Arc<dyn Pointer> = Arc::new(IdeaMetaProvider::new(contract.clone()));
    let cache = cache_over(store);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let first_tx = tx.clone();
    let _first = cache.subscribe(pointer.clone(), move |document| {
        let _ = first_tx.send(("L1", document));
    });
    let _second = cache.subscribe(pointer.clone(), move |document| {
        let _ = tx.send(("L2", document));
    });

    contract.set_ipfs_addr(next.as_str());
    contract.emit(ContractEvent::ProposalAccepted);

    let (first, first_doc) = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let (second, second_doc) = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!((first, second), ("L1", "L2"));
    assert_eq!(first_doc, second_doc);
    assert_eq!(*first_doc, json!({"title": "Next"}));
}

#[tokio::test]
async fn test_one_upstream_registration_per_pointer() {
    let store = Arc::new(MemoryStore::new());
    let contract = Arc::new(MemoryContract::new(idea_id()));
    let registrations = Arc::new(AtomicUsize::new(0));
    let pointer: Arc<dyn Pointer> = Arc::new(CountingPointer {
        inner: IdeaMetaProvider::new(contract),
        registrations: registrations.clone(),
    });
    let cache = cache_over(store);

    let first = cache.subscribe(pointer.clone(), |_| {});
    let second = cache.subscribe(pointer.clone(), |_| {});
    assert_eq!(registrations.load(Ordering::SeqCst), 1);
    assert_eq!(cache.listener_count(pointer.id()), 2);

    drop(first);
    drop(second);
    assert_eq!(cache.listener_count(pointer.id()), 0);

    let _third = cache.subscribe(pointer.clone(), |_| {});
    assert_eq!(registrations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dropped_subscription_stops_refreshes() {
    let store = Arc::new(MemoryStore::new());
    let contract = Arc::new(MemoryContract::new(idea_id()));
    contract.set_ipfs_addr("bafyinitial");
    let pointer: Arc<dyn Pointer> = Arc::new(IdeaMetaProvider::new(contract.clone()));
    let cache = cache_over(store);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let subscription = cache.subscribe(pointer.clone(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(subscription.pointer(), pointer.id());
    drop(subscription);

    contract.emit(ContractEvent::ProposalAccepted);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(contract.ipfs_addr_calls(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_change_to_missing_document_skips_listeners() {
    let store = Arc::new(MemoryStore::new());
    let present = store.put(&json!({"title": "Present"})).await.unwrap();
    let contract = Arc::new(MemoryContract::new(idea_id()));
    contract.set_ipfs_addr(present.as_str());
    let pointer: Arc<dyn Pointer> = Arc::new(IdeaMetaProvider::new(contract.clone()));
    let cache = cache_over(store);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = cache.subscribe(pointer.clone(), move |document| {
        sink.lock().push(document);
    });

    contract.set_ipfs_addr("bafymissing");
    contract.emit(ContractEvent::ProposalAccepted);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(seen.lock().is_empty());

    contract.set_ipfs_addr(present.as_str());
    contract.emit(ContractEvent::ProposalAccepted);
    tokio::time::timeout(WAIT, async {
        while seen.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(*seen.lock()[0], json!({"title": "Present"}));
}

#[tokio::test]
async fn test_unresolvable_pointer_is_absent() {
    let contract = Arc::new(MemoryContract::new(idea_id()));
    let pointer = IdeaMetaProvider::new(contract.clone());
    let cache = cache_over(Arc::new(MemoryStore::new()));

    assert!(cache.resolve_document(&pointer).await.is_none());

    // Failures are not remembered; the next call asks the contract again.
    contract.set_ipfs_addr("bafymissing");
    assert_eq!(
        cache.resolve_address(&pointer).await.map(|a| a.to_string()),
        Some("bafymissing".to_string())
    );
    assert_eq!(contract.ipfs_addr_calls(), 2);
}
