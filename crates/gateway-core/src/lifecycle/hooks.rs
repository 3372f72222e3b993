//! Extension points a gateway service plugs into the lifecycle.

use super::ModuleLifecycle;
use crate::error::Result;
use crate::health::HealthState;
use crate::transport::Message;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Callbacks supplied by the service that owns a [`ModuleLifecycle`].
///
/// Hooks run on the lifecycle's tasks. Long work belongs in a spawned task,
/// otherwise it holds up the event pump of the current connection.
#[async_trait]
pub trait ModuleHooks: Send + Sync {
    /// First thing `start()` does, before any connection exists. The service
    /// may keep the handle for later calls back into the lifecycle.
    async fn initialize_module(&self, _lifecycle: &Arc<ModuleLifecycle>) -> Result<()> {
        Ok(())
    }

    /// Called once the first desired-properties sync has been handled.
    async fn on_module_ready(&self) -> Result<()>;

    /// Service-specific health. Only consulted while the module is healthy.
    async fn on_health(&self) -> Result<HealthState>;

    /// Apply the settings of a desired-properties patch this service owns.
    ///
    /// Returns the reported-properties acknowledgements for those settings;
    /// the lifecycle merges them with its own and pushes one patch.
    async fn on_handle_module_properties(&self, desired: &Value) -> Map<String, Value>;

    fn on_module_connect(&self) {
        info!("The module received a connect event");
    }

    fn on_module_disconnect(&self) {
        warn!("The module received a disconnect event");
    }

    fn on_module_client_error(&self, error: &str) {
        error!("Module client connection error: {}", error);
    }

    async fn on_handle_downstream_messages(&self, input_name: &str, _message: Message) {
        warn!("Dropping message on unhandled input '{}'", input_name);
    }
}
