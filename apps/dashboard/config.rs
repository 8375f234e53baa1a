use anyhow::Result;
use metasync::MetaCacheConfig;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs};
use tracing::{info, warn};

pub static CONFIG: OnceCell<DashboardConfig> = OnceCell::new();

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub network: NetworkConfig,
    pub ipfs: IpfsConfig,
    pub cache: MetaCacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub poll_interval_secs: u64,
    /// Overrides the deployment table, for private deployments.
    pub dao_address: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://matic-mumbai.chainstacklabs.com".to_string(),
            poll_interval_secs: 5,
            dao_address: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    pub api_url: String,
    pub gateway_url: String,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001".to_string(),
            gateway_url: "https://ipfs.io".to_string(),
        }
    }
}

pub fn load() -> Result<()> {
    let config = load_config();
    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Dashboard config already initialized"))?;
    Ok(())
}

pub fn get_config() -> Result<&'static DashboardConfig> {
    CONFIG
        .get()
        .ok_or_else(|| anyhow::anyhow!("Dashboard config not initialized"))
}

fn load_config() -> DashboardConfig {
    let path = env::var("DASHBOARD_CONFIG_PATH").unwrap_or_else(|_| "dashboard.yaml".to_string());
    let mut config = load_config_file(&path);

    apply_env_overrides(&mut config);

    info!(
        rpc_url = %config.network.rpc_url,
        ipfs_api = %config.ipfs.api_url,
        max_documents = config.cache.max_documents,
        poll_interval_secs = config.network.poll_interval_secs,
        "Dashboard config loaded"
    );

    config
}

fn load_config_file(path: &str) -> DashboardConfig {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<DashboardConfig>(&contents) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, path = %path, "Failed to parse dashboard config, using defaults");
                DashboardConfig::default()
            }
        },
        Err(err) => {
            warn!(error = %err, path = %path, "Dashboard config not found, using defaults");
            DashboardConfig::default()
        }
    }
}

fn apply_env_overrides(config: &mut DashboardConfig) {
    if let Ok(value) = env::var("ETHEREUM_NODE_URL") {
        config.network.rpc_url = value;
    }

    if let Ok(value) = env::var("IPFS_API_URL") {
        config.ipfs.api_url = value;
    }

    if let Ok(value) = env::var("DASHBOARD_CACHE_CAPACITY") {
        match value.parse::<usize>() {
            Ok(capacity) => {
                config.cache.max_documents = capacity;
            }
            Err(err) => {
                warn!(
                    error = %err,
                    "Failed to parse DASHBOARD_CACHE_CAPACITY override"
                );
            }
        }
    }

    if let Ok(value) = env::var("DASHBOARD_POLL_INTERVAL_SECS") {
        match value.parse::<u64>() {
            Ok(secs) if secs > 0 => {
                config.network.poll_interval_secs = secs;
            }
            Ok(_) => {
                warn!("DASHBOARD_POLL_INTERVAL_SECS must be positive, keeping configured value");
            }
            Err(err) => {
                warn!(
                    error = %err,
                    "Failed to parse DASHBOARD_POLL_INTERVAL_SECS override"
                );
            }
        }
    }
}
