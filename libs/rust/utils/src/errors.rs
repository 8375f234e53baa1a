//config
pub const CONFIG_LOAD_FAILED: &str = "Failed to load dashboard configuration";
pub const INVALID_DAO_ADDRESS: &str = "Invalid DAO address";

//chain
pub const RPC_CONNECTION_FAILED: &str = "Failed to connect to RPC node";
pub const CHAIN_ID_FAILED: &str = "Failed to read chain id";
pub const UNSUPPORTED_NETWORK: &str = "No DAO deployed on this network";

//ipfs
pub const IPFS_CLIENT_FAILED: &str = "Failed to create IPFS client";

//cache
pub const META_CACHE_FAILED: &str = "Failed to create metadata cache";
pub const IDEA_METADATA_NOT_FOUND: &str = "Idea metadata not found";
