//! Settings, commands and events of the proxy gateway.

// Events
pub const EV_FETCHED_OPC_NODES_AUTO_DISCOVERY: &str = "evFetchedOpcNodesAutoDiscovery";
pub const EV_FETCHED_OPC_NODES_STARTED: &str = "evFetchedOpcNodesStarted";
pub const EV_FETCHED_OPC_NODES_FINISHED: &str = "evFetchedOpcNodesFinished";
pub const EV_FETCHED_OPC_NODES_ERROR: &str = "evFetchedOpcNodesError";
pub const EV_FETCHED_OPC_NODES_UPLOADED: &str = "evFetchedOpcNodesUploaded";

// Writable properties
pub const WP_OPC_ENDPOINT: &str = "wpOpcEndpoint";
pub const WP_SERVER_NODE_DISCOVERY_ROOT: &str = "wpServerNodeDiscoveryRoot";
pub const WP_BLOB_CONNECTION_STRING: &str = "wpBlobConnectionString";
pub const WP_BLOB_CONTAINER_NAME: &str = "wpBlobContainerName";

// Commands
pub const CM_START_OPC_NODE_DISCOVERY: &str = "cmStartOpcNodeDiscovery";
pub const CM_TEST_CONNECTION: &str = "cmTestConnection";
pub const CM_FETCH_NODES: &str = "cmFetchNodes";
pub const CM_WRITE_VALUES: &str = "cmWriteValues";
pub const CM_READ_VALUES: &str = "cmReadValues";
pub const CM_ADD_OR_UPDATE_ASSETS: &str = "cmAddOrUpdateAssets";
pub const CM_GET_ALL_ASSETS: &str = "cmGetAllAssets";
pub const CM_REMOVE_ASSETS: &str = "cmRemoveAssets";

/// Every command registered when the module becomes ready.
pub const COMMANDS: [&str; 8] = [
    CM_START_OPC_NODE_DISCOVERY,
    CM_TEST_CONNECTION,
    CM_FETCH_NODES,
    CM_WRITE_VALUES,
    CM_READ_VALUES,
    CM_ADD_OR_UPDATE_ASSETS,
    CM_GET_ALL_ASSETS,
    CM_REMOVE_ASSETS,
];

/// Direct methods implemented by the OPC UA adapter module.
pub mod adapter {
    pub const TEST_CONNECTION: &str = "TestConnection_v1";
    pub const BROWSE_NODES: &str = "BrowseNodes_v1";
    pub const FETCH_BROWSED_NODES: &str = "FetchBrowsedNodes_v1";
    pub const WRITE_VALUES: &str = "WriteValues_v1";
    pub const READ_VALUES: &str = "ReadValues_v1";
    pub const ADD_OR_UPDATE_ASSETS: &str = "AddOrUpdateAssets_v1";
    pub const GET_ALL_ASSETS: &str = "GetAllAssets_v1";
    pub const REMOVE_ASSETS: &str = "RemoveAssets_v1";
}
