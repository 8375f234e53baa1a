use crate::{
    address::{ContentAddress, PointerId},
    gossip::{GossipChannel, GossipError},
    idea::{ContractEvent, IdeaContract},
    lookup::LatestLookup,
    pointer::{Pointer, PointerError},
    statistics::{Delta, IdeaStatistics, StatisticsMessage},
    store::{ContentStore, StoreError},
};
use async_trait::async_trait;
use futures::{
    StreamExt, future,
    stream::{self, BoxStream},
};
use std::sync::{Arc, Weak};
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, instrument, warn};

const RESOLUTION_EVENTS: &[ContractEvent] = &[
    ContractEvent::ProposalAccepted,
    ContractEvent::ProposalRejected,
];

const NOTIFY_CAPACITY: usize = 64;

const STATS_SUFFIX: &str = "/stats";

/// Pointer to a statistics snapshot computed locally from contract events
/// and peer messages.
///
/// The first resolution commits a default snapshot and then adopts the
/// latest snapshot published by any peer, if one can be found. From then on
/// every delta is folded into the held snapshot, committed to the content
/// store and published under the Idea's lookup key.
///
/// Both upstream sources feed a single queue consumed by one driver task, so
/// deltas are applied one at a time in arrival order.
pub struct StatisticsProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    // Never equal to the contract's id, which the metadata pointer uses.
    id: PointerId,
    contract: Arc<dyn IdeaContract>,
    gossip: Arc<dyn GossipChannel>,
    lookup: Arc<dyn LatestLookup>,
    store: Arc<dyn ContentStore>,
    // `None` until the first resolution. Held across the whole resolution,
    // which is what serializes concurrent first calls.
    state: Mutex<Option<Snapshot>>,
    notify: broadcast::Sender<()>,
    driver: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

struct Snapshot {
    stats: IdeaStatistics,
    address: ContentAddress,
}

impl StatisticsProvider {
    pub fn new(
        contract: Arc<dyn IdeaContract>,
        gossip: Arc<dyn GossipChannel>,
        lookup: Arc<dyn LatestLookup>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                id: PointerId::new(format!("{}{STATS_SUFFIX}", contract.id())),
                contract,
                gossip,
                lookup,
                store,
                state: Mutex::new(None),
                notify: broadcast::channel(NOTIFY_CAPACITY).0,
                driver: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// The statistics held locally, if the provider has resolved.
    pub async fn snapshot(&self) -> Option<IdeaStatistics> {
        self.inner
            .state
            .lock()
            .await
            .as_ref()
            .map(|snapshot| snapshot.stats.clone())
    }

    /// Gossips a delta to every peer following this Idea, this provider
    /// included.
    pub async fn announce(&self, message: &StatisticsMessage) -> Result<(), GossipError> {
        let topic = self.inner.contract.id().as_str();
        let payload = message.encode().map_err(|e| GossipError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        self.inner.gossip.publish(topic, payload).await
    }

    fn start_driver(&self) {
        let mut driver = self.inner.driver.lock();
        if driver.is_some() {
            return;
        }

        let id = self.inner.contract.id().clone();
        let resolutions = self
            .inner
            .contract
            .events(RESOLUTION_EVENTS)
            .map(Delta::Resolution);
        let messages = self
            .inner
            .gossip
            .subscribe(id.as_str())
            .filter_map(move |payload| future::ready(decode_message(&id, &payload)));

        let deltas = stream::select(resolutions, messages).boxed();
        *driver = Some(tokio::spawn(run_driver(Arc::downgrade(&self.inner), deltas)));
    }
}

#[async_trait]
impl Pointer for StatisticsProvider {
    fn id(&self) -> &PointerId {
        &self.inner.id
    }

    async fn current_address(&self) -> Result<ContentAddress, PointerError> {
        let mut state = self.inner.state.lock().await;
        Ok(self.inner.ensure_ready(&mut state).await?.address.clone())
    }

    /// Registers the upstream triggers on first use. The stream yields after
    /// each delta has been committed.
    fn changes(&self) -> BoxStream<'static, ()> {
        let notifications = BroadcastStream::new(self.inner.notify.subscribe());
        self.start_driver();
        // A lagged receiver still learns that something changed.
        notifications.map(|_| ()).boxed()
    }
}

impl ProviderInner {
    async fn ensure_ready<'a>(
        &self,
        state: &'a mut Option<Snapshot>,
    ) -> Result<&'a mut Snapshot, PointerError> {
        let snapshot = match state.take() {
            Some(snapshot) => snapshot,
            None => self.resolve().await?,
        };
        Ok(state.insert(snapshot))
    }

    #[instrument(skip(self), fields(idea = %self.contract.id()))]
    async fn resolve(&self) -> Result<Snapshot, PointerError> {
        let stats = IdeaStatistics::default();
        let address = self.commit(&stats).await?;

        let mut published = None;
        let mut candidates = self.lookup.get(&self.contract.id().lookup_key());
        while let Some(candidate) = candidates.next().await {
            published = Some(candidate);
        }

        let Some(published) = published else {
            info!("No published statistics found, starting from defaults");
            return Ok(Snapshot { stats, address });
        };

        match self.store.get(&published).await {
            Ok(Some(document)) => match serde_json::from_value::<IdeaStatistics>(document) {
                Ok(stats) => {
                    info!(address = %published, "Adopted published statistics snapshot");
                    Ok(Snapshot {
                        stats,
                        address: published,
                    })
                }
                Err(e) => {
                    warn!(address = %published, error = %e, "Published statistics are malformed, using defaults");
                    Ok(Snapshot { stats, address })
                }
            },
            Ok(None) => {
                warn!(address = %published, "Published statistics not found, using defaults");
                Ok(Snapshot { stats, address })
            }
            Err(e) => {
                warn!(address = %published, error = %e, "Failed to load published statistics, using defaults");
                Ok(Snapshot { stats, address })
            }
        }
    }

    async fn commit(&self, stats: &IdeaStatistics) -> Result<ContentAddress, StoreError> {
        let document = serde_json::to_value(stats)?;
        self.store.put(&document).await
    }

    #[instrument(skip(self), fields(idea = %self.contract.id()))]
    async fn apply(&self, delta: Delta) {
        let mut state = self.state.lock().await;
        let snapshot = match self.ensure_ready(&mut state).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Statistics unavailable, dropping delta");
                return;
            }
        };

        snapshot.stats.apply(&delta);

        let address = match self.commit(&snapshot.stats).await {
            Ok(address) => address,
            Err(e) => {
                error!(error = %e, "Failed to commit statistics snapshot");
                return;
            }
        };
        snapshot.address = address.clone();
        drop(state);

        if let Err(e) = self
            .lookup
            .put(&self.contract.id().lookup_key(), &address)
            .await
        {
            warn!(address = %address, error = %e, "Failed to publish statistics address");
        }

        debug!(address = %address, "Committed statistics snapshot");
        let _ = self.notify.send(());
    }
}

impl Drop for ProviderInner {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
    }
}

async fn run_driver(provider: Weak<ProviderInner>, mut deltas: BoxStream<'static, Delta>) {
    while let Some(delta) = deltas.next().await {
        let Some(inner) = provider.upgrade() else {
            return;
        };
        inner.apply(delta).await;
    }
}

fn decode_message(topic: &PointerId, payload: &[u8]) -> Option<Delta> {
    match StatisticsMessage::decode(payload) {
        Ok(message) => Some(Delta::Message(message)),
        Err(e) => {
            warn!(topic = %topic, error = %e, "Dropping malformed statistics message");
            None
        }
    }
}
