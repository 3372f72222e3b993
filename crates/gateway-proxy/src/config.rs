//! Proxy gateway configuration.

use gateway_core::ChunkedRpcConfig;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Node discovery constants.
pub struct DiscoveryConfig;

impl DiscoveryConfig {
    pub const DEPTH: u32 = 5;
    /// OPC UA node classes: Object, Variable.
    pub const NODE_CLASSES: [u32; 2] = [1, 2];
    /// OPC UA attributes: NodeClass, BrowseName, DisplayName, Description, DataType.
    pub const ATTRIBUTES: [u32; 5] = [2, 3, 4, 5, 14];
    /// First page of a browse job.
    pub const FIRST_CONTINUATION_TOKEN: &'static str = "1";
    /// Connect and response timeout for `TestConnection_v1`, in seconds.
    pub const TEST_CONNECTION_TIMEOUT_SECS: u32 = 10;
}

/// Default value of the `wpOpcEndpoint` setting.
pub fn empty_endpoint() -> Value {
    json!({
        "uri": "",
        "securityMode": 0,
        "credentials": {
            "credentialType": 0,
            "username": "",
            "password": ""
        }
    })
}

/// Runtime settings of the proxy service.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Module id of the OPC UA adapter on this device.
    pub adapter_module_id: String,
    /// Directory fetched node files are written to.
    pub storage_root: PathBuf,
    pub rpc: ChunkedRpcConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            adapter_module_id: Self::DEFAULT_ADAPTER_MODULE_ID.to_string(),
            storage_root: PathBuf::from(Self::DEFAULT_STORAGE_ROOT),
            rpc: ChunkedRpcConfig::default(),
        }
    }
}

impl ProxyConfig {
    pub const ADAPTER_MODULE_ID_VAR: &'static str = "ompAdapterModuleId";
    pub const STORAGE_ROOT_VAR: &'static str = "storageRootDirectory";
    pub const DEFAULT_ADAPTER_MODULE_ID: &'static str = "ompadapter";
    pub const DEFAULT_STORAGE_ROOT: &'static str = "/data/storage";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup; missing or empty values keep the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        Self {
            adapter_module_id: get(Self::ADAPTER_MODULE_ID_VAR)
                .unwrap_or(defaults.adapter_module_id),
            storage_root: get(Self::STORAGE_ROOT_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            rpc: defaults.rpc,
        }
    }

    pub fn with_adapter_module_id(mut self, module_id: impl Into<String>) -> Self {
        self.adapter_module_id = module_id.into();
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    pub fn with_rpc_config(mut self, rpc: ChunkedRpcConfig) -> Self {
        self.rpc = rpc;
        self
    }
}
