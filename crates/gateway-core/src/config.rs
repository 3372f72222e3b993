//! Centralized configuration for the edge gateway.
//!
//! Fixed protocol constants live as associated constants; the knobs a host
//! process may want to change live in plain structs with `Default` values and
//! `with_*` setters.

use std::time::Duration;

/// Transport-level constants shared by every outbound message.
pub struct TransportConfig;

impl TransportConfig {
    /// Output channel name used for all IoT Central telemetry.
    pub const IOTC_OUTPUT_NAME: &'static str = "iotc";
    pub const CONTENT_TYPE_JSON: &'static str = "application/json";
    pub const CONTENT_ENCODING_UTF8: &'static str = "utf-8";
    /// Hard cap on one telemetry message (IoT Hub message budget).
    pub const MAX_MESSAGE_BYTES: usize = 256 * 1024;
}

/// Health evaluation constants.
pub struct HealthConfig;

impl HealthConfig {
    pub const CHECK_INTERVAL: Duration = Duration::from_secs(15);
    pub const DEFAULT_CHECK_RETRIES: u32 = 3;
}

/// Connection and supervision knobs for `ModuleLifecycle`.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Total connect attempts made by `start()`.
    pub connect_attempts: u32,
    /// Delay between failed connect attempts.
    pub connect_backoff: Duration,
    /// Wait after creating the client, before opening it, for dependent modules.
    pub settle_delay: Duration,
    /// Wait between the restart status event and process exit.
    pub restart_grace: Duration,
    /// Consecutive bad health results that trigger a restart.
    pub health_check_retries: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            connect_backoff: Duration::from_secs(5),
            settle_delay: Duration::from_secs(15),
            restart_grace: Duration::from_secs(5),
            health_check_retries: HealthConfig::DEFAULT_CHECK_RETRIES,
        }
    }
}

impl LifecycleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    pub fn with_connect_backoff(mut self, backoff: Duration) -> Self {
        self.connect_backoff = backoff;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_restart_grace(mut self, grace: Duration) -> Self {
        self.restart_grace = grace;
        self
    }

    pub fn with_health_check_retries(mut self, retries: u32) -> Self {
        self.health_check_retries = retries;
        self
    }
}

/// Knobs for the streaming uploader.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Hard cap on one chunk message, envelope included.
    pub max_message_bytes: usize,
    /// Size of one read from the source, and the expected size of the next
    /// compressed unit when deciding whether to flush.
    pub read_unit_bytes: usize,
    /// Output channel the chunks and the status message go to.
    pub output_name: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: TransportConfig::MAX_MESSAGE_BYTES,
            read_unit_bytes: 16 * 1024,
            output_name: TransportConfig::IOTC_OUTPUT_NAME.to_string(),
        }
    }
}

impl UploadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    pub fn with_read_unit_bytes(mut self, bytes: usize) -> Self {
        self.read_unit_bytes = bytes;
        self
    }
}

/// Knobs for the submit-then-poll RPC client.
#[derive(Debug, Clone)]
pub struct ChunkedRpcConfig {
    /// Delay before each poll request.
    pub poll_interval: Duration,
    /// Upper bound on poll requests; `None` polls until a terminal status.
    pub max_polls: Option<u32>,
}

impl Default for ChunkedRpcConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            max_polls: None,
        }
    }
}

impl ChunkedRpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls);
        self
    }
}

/// Identity and runtime settings handed to the module by the edge runtime.
#[derive(Debug, Clone, Default)]
pub struct ModuleEnvironment {
    pub device_id: String,
    pub module_id: String,
    pub workload_uri: String,
    pub module_generation_id: String,
    pub iothub_hostname: String,
    pub auth_scheme: String,
    /// Fail-streak threshold override from `healthCheckRetries`.
    pub health_check_retries: Option<u32>,
}

impl ModuleEnvironment {
    pub const DEVICE_ID_VAR: &'static str = "IOTEDGE_DEVICEID";
    pub const MODULE_ID_VAR: &'static str = "IOTEDGE_MODULEID";
    pub const WORKLOAD_URI_VAR: &'static str = "IOTEDGE_WORKLOADURI";
    pub const GENERATION_ID_VAR: &'static str = "IOTEDGE_MODULEGENERATIONID";
    pub const HOSTNAME_VAR: &'static str = "IOTEDGE_IOTHUBHOSTNAME";
    pub const AUTH_SCHEME_VAR: &'static str = "IOTEDGE_AUTHSCHEME";
    pub const HEALTH_RETRIES_VAR: &'static str = "healthCheckRetries";

    /// Read the environment the edge runtime injects into every module.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup; missing values become empty strings.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).unwrap_or_default();

        Self {
            device_id: get(Self::DEVICE_ID_VAR),
            module_id: get(Self::MODULE_ID_VAR),
            workload_uri: get(Self::WORKLOAD_URI_VAR),
            module_generation_id: get(Self::GENERATION_ID_VAR),
            iothub_hostname: get(Self::HOSTNAME_VAR),
            auth_scheme: get(Self::AUTH_SCHEME_VAR),
            health_check_retries: lookup(Self::HEALTH_RETRIES_VAR)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0),
        }
    }
}
