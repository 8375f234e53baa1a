pub mod address;
pub mod binding;
pub mod cache;
pub mod chain;
pub mod gossip;
pub mod idea;
pub mod ipfs;
pub mod lookup;
pub mod memory;
pub mod pointer;
pub mod provider;
pub mod statistics;
pub mod store;

pub use address::{AddressError, ContentAddress, PointerId};
pub use binding::{BindingHandle, NullFallback, Reactive, RenderTarget, Visibility};
pub use cache::{CacheConfigError, Document, DocumentStream, Fetch, MetaCache, MetaCacheConfig, Subscription};
pub use chain::{RpcIdeaContract, connect_provider};
pub use gossip::{GossipChannel, GossipError};
pub use idea::{ContractEvent, IdeaContract, IdeaMetaProvider, IdeaMetadata, IdeaPayload};
pub use ipfs::IpfsHttpStore;
pub use lookup::{LatestLookup, LookupError};
pub use pointer::{Pointer, PointerError};
pub use provider::StatisticsProvider;
pub use statistics::{IdeaStatistics, ProposalStatus, StatisticsMessage};
pub use store::{ContentStore, StoreError};
