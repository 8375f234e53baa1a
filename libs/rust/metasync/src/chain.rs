use crate::{
    address::PointerId,
    idea::{ContractEvent, IdeaContract},
    pointer::PointerError,
};
use alloy::{
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Filter, Log},
    sol,
    sol_types::SolEvent,
    transports::http::reqwest::Url,
};
use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, instrument, warn};

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract Idea {
        function ipfsAddr() external view returns (string memory);

        event ProposalAccepted(address proposal);
        event ProposalRejected(address proposal);
    }
);

pub fn connect_provider(rpc_url: &str) -> Result<DynProvider, PointerError> {
    let url: Url = rpc_url
        .parse()
        .map_err(|e| PointerError::Contract(format!("invalid RPC url {rpc_url}: {e}")))?;
    Ok(ProviderBuilder::new().connect_http(url).erased())
}

fn signature(event: ContractEvent) -> B256 {
    match event {
        ContractEvent::ProposalAccepted => Idea::ProposalAccepted::SIGNATURE_HASH,
        ContractEvent::ProposalRejected => Idea::ProposalRejected::SIGNATURE_HASH,
    }
}

fn event_of(log: &Log) -> Option<ContractEvent> {
    let topic = log.topics().first()?;
    [ContractEvent::ProposalAccepted, ContractEvent::ProposalRejected]
        .into_iter()
        .find(|event| signature(*event) == *topic)
}

/// [`IdeaContract`] talking to a deployed Idea over JSON-RPC.
///
/// Events are picked up by polling `eth_getLogs` from the block after the
/// head seen when [`IdeaContract::events`] was called.
#[derive(Clone)]
pub struct RpcIdeaContract {
    address: Address,
    id: PointerId,
    provider: DynProvider,
    poll_interval: Duration,
}

impl RpcIdeaContract {
    pub fn new(address: Address, provider: DynProvider, poll_interval: Duration) -> Self {
        Self {
            address,
            id: PointerId::from(address),
            provider,
            poll_interval,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl IdeaContract for RpcIdeaContract {
    fn id(&self) -> &PointerId {
        &self.id
    }

    #[instrument(skip(self), fields(idea = %self.id))]
    async fn ipfs_addr(&self) -> Result<String, PointerError> {
        Idea::new(self.address, self.provider.clone())
            .ipfsAddr()
            .call()
            .await
            .map_err(|e| PointerError::Contract(e.to_string()))
    }

    fn events(&self, kinds: &[ContractEvent]) -> BoxStream<'static, ContractEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let signatures = kinds.iter().copied().map(signature).collect::<Vec<_>>();
        tokio::spawn(poll_events(self.clone(), signatures, tx));
        UnboundedReceiverStream::new(rx).boxed()
    }
}

#[instrument(skip_all, fields(idea = %contract.id))]
async fn poll_events(
    contract: RpcIdeaContract,
    signatures: Vec<B256>,
    tx: mpsc::UnboundedSender<ContractEvent>,
) {
    let mut next_block = loop {
        match contract.provider.get_block_number().await {
            Ok(head) => break head + 1,
            Err(e) => {
                warn!(error = %e, "Failed to read chain head, retrying");
                tokio::time::sleep(contract.poll_interval).await;
            }
        }
        if tx.is_closed() {
            return;
        }
    };

    let mut interval = tokio::time::interval(contract.poll_interval);
    loop {
        interval.tick().await;
        if tx.is_closed() {
            debug!("Event stream dropped, stopping poller");
            return;
        }

        let head = match contract.provider.get_block_number().await {
            Ok(head) => head,
            Err(e) => {
                warn!(error = %e, "Failed to read chain head");
                continue;
            }
        };
        if head < next_block {
            continue;
        }

        let filter = Filter::new()
            .address(contract.address)
            .event_signature(signatures.clone())
            .from_block(next_block)
            .to_block(head);

        let logs = match contract.provider.get_logs(&filter).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(error = %e, from = next_block, to = head, "Failed to fetch contract logs");
                continue;
            }
        };

        for event in logs.iter().filter_map(event_of) {
            debug!(%event, "Contract event");
            if tx.send(event).is_err() {
                return;
            }
        }
        next_block = head + 1;
    }
}
