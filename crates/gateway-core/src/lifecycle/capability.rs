//! Telemetry, property and command names the lifecycle itself owns.

pub const TL_SYSTEM_HEARTBEAT: &str = "tlSystemHeartbeat";
pub const TL_FREE_MEMORY: &str = "tlFreeMemory";
pub const ST_IOT_CENTRAL_CLIENT_STATE: &str = "stIoTCentralClientState";
pub const ST_MODULE_STATE: &str = "stModuleState";
pub const EV_MODULE_STARTED: &str = "evModuleStarted";
pub const EV_MODULE_STOPPED: &str = "evModuleStopped";
pub const EV_MODULE_RESTART: &str = "evModuleRestart";
pub const EV_LARGE_PAYLOAD_STATUS: &str = "evLargePayloadStatus";
pub const WP_DEBUG_TELEMETRY: &str = "wpDebugTelemetry";
pub const CM_RESTART_GATEWAY_MODULE: &str = "cmRestartGatewayModule";
/// Plain direct method name for the same restart command.
pub const DM_RESTART_GATEWAY_MODULE: &str = "restart-gateway-module";

pub const CLIENT_STATE_CONNECTED: &str = "connected";
pub const MODULE_STATE_ACTIVE: &str = "active";
pub const MODULE_STATE_INACTIVE: &str = "inactive";
