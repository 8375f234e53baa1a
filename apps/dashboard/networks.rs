use alloy::primitives::{Address, address};

/// A chain the DAO is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub chain_id: u64,
    pub dao: Address,
    pub explorer: &'static str,
}

pub const DEPLOYMENTS: &[Deployment] = &[Deployment {
    chain_id: 80001,
    dao: address!("efa56061b06ac1481e1b30e30e8617f2e18d0907"),
    explorer: "https://mumbai.polygonscan.com/",
}];

#[derive(Debug, Clone, Copy)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Parameters of the network users are pointed at when connected to an
/// unsupported chain.
#[derive(Debug, Clone, Copy)]
pub struct NetworkDescriptor {
    pub chain_id: &'static str,
    pub chain_name: &'static str,
    pub native_currency: NativeCurrency,
    pub rpc_urls: &'static [&'static str],
    pub block_explorer_urls: &'static [&'static str],
}

pub const DEFAULT_NETWORK: NetworkDescriptor = NetworkDescriptor {
    chain_id: "0x13881",
    chain_name: "Polygon Testnet",
    native_currency: NativeCurrency {
        name: "Polygon",
        symbol: "MATIC",
        decimals: 18,
    },
    rpc_urls: &["https://matic-mumbai.chainstacklabs.com"],
    block_explorer_urls: &["https://mumbai.polygonscan.com"],
};

pub fn deployment(chain_id: u64) -> Option<&'static Deployment> {
    DEPLOYMENTS.iter().find(|d| d.chain_id == chain_id)
}

pub fn network_deployed_dao(chain_id: u64) -> Option<Address> {
    deployment(chain_id).map(|d| d.dao)
}

pub fn network_explorer(chain_id: u64) -> Option<&'static str> {
    deployment(chain_id).map(|d| d.explorer)
}

/// Explorer page of an account, tolerating explorer URLs with or without a
/// trailing slash.
pub fn explorer_address_url(explorer: &str, account: &str) -> String {
    format!("{}/address/{}", explorer.trim_end_matches('/'), account)
}
