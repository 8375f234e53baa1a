#![warn(unused_extern_crates)]
use alloy::{primitives::Address, providers::Provider};
use anyhow::{Context, Result};
use dotenv::dotenv;
use futures::StreamExt;
use metasync::{
    ContentStore, IdeaContract, IdeaMetaProvider, IdeaMetadata, IpfsHttpStore, MetaCache,
    RpcIdeaContract, StatisticsProvider, connect_provider,
    memory::{LocalGossip, MemoryLookup},
};
use networks::{DEFAULT_NETWORK, network_deployed_dao, network_explorer};
use payloads::{PayloadStatus, load_payloads};
use render::SideDrawer;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};
use utils::{errors::*, tracing::run_with_tracing};

mod config;
mod networks;
mod payloads;
mod render;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    run_with_tracing(|| async { run().await }).await
}

async fn run() -> Result<()> {
    config::load().context(CONFIG_LOAD_FAILED)?;
    let config = config::get_config()?;

    let provider = connect_provider(&config.network.rpc_url).context(RPC_CONNECTION_FAILED)?;
    let chain_id = provider.get_chain_id().await.context(CHAIN_ID_FAILED)?;

    let dao = match &config.network.dao_address {
        Some(raw) => raw.parse::<Address>().context(INVALID_DAO_ADDRESS)?,
        None => network_deployed_dao(chain_id).ok_or_else(|| {
            anyhow::anyhow!(
                "{UNSUPPORTED_NETWORK} (chain id {chain_id}). Switch to {} (chain id {}, RPC {}).",
                DEFAULT_NETWORK.chain_name,
                DEFAULT_NETWORK.chain_id,
                DEFAULT_NETWORK.rpc_urls.join(", "),
            )
        })?,
    };
    let explorer = network_explorer(chain_id).unwrap_or(DEFAULT_NETWORK.block_explorer_urls[0]);

    let store: Arc<dyn ContentStore> =
        Arc::new(IpfsHttpStore::new(config.ipfs.api_url.as_str()).context(IPFS_CLIENT_FAILED)?);
    let cache = MetaCache::new(store.clone(), &config.cache).context(META_CACHE_FAILED)?;

    let contract: Arc<dyn IdeaContract> = Arc::new(RpcIdeaContract::new(
        dao,
        provider,
        Duration::from_secs(config.network.poll_interval_secs),
    ));
    let meta = Arc::new(IdeaMetaProvider::new(contract.clone()));
    // No peer network is attached yet, so statistics are shared with this
    // process only.
    let stats = Arc::new(StatisticsProvider::new(
        contract.clone(),
        Arc::new(LocalGossip::new()),
        Arc::new(MemoryLookup::new()),
        store,
    ));

    info!(dao = %contract.id(), chain_id, explorer, "Connected to Idea");

    match cache.resolve_document_as::<IdeaMetadata>(meta.as_ref()).await {
        Some(metadata) => report(load_payloads(&cache, &metadata).await),
        None => warn!(dao = %contract.id(), "{}", IDEA_METADATA_NOT_FOUND),
    }

    let _drawer = SideDrawer::bind(&cache, meta.clone(), stats, explorer, &config.ipfs.gateway_url);

    let mut updates = cache.watch(meta);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(document) = updates.next() => {
                match serde_json::from_value::<IdeaMetadata>((*document).clone()) {
                    Ok(metadata) => {
                        info!(title = %metadata.title, "Idea metadata updated");
                        report(load_payloads(&cache, &metadata).await);
                    }
                    Err(e) => error!(error = %e, "Updated Idea metadata is malformed"),
                }
            }
            result = &mut shutdown => {
                result.context("Failed to listen for shutdown signal")?;
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn report(status: PayloadStatus) {
    match status {
        PayloadStatus::Ready(payloads) => {
            info!(payloads = payloads.len(), "All payloads loaded");
        }
        PayloadStatus::NotFound(address) => {
            error!(address = %address, "Payload not found");
        }
        PayloadStatus::Broken(address, broken) => {
            error!(address = %address, title = broken.title(), "{}", broken.message());
        }
    }
}
