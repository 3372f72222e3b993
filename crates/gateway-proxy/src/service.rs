//! The proxy gateway service and its lifecycle hooks.

use crate::archive::{ArchiveOptions, ArchiveStore};
use crate::capability;
use crate::config::{empty_endpoint, ProxyConfig};
use async_trait::async_trait;
use gateway_core::{
    method_handler, AdapterInvoker, ChunkedMethodClient, CommandResponse, GatewayError,
    HealthState, MethodRequest, ModuleHooks, ModuleLifecycle, ModuleSettings, Result,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use tokio::sync::RwLock;
use tracing::{error, info};

/// Forwards OPC UA commands from the cloud to the adapter module.
///
/// Create it with [`ProxyGatewayService::new`] and pass it to
/// `ModuleLifecycle::builder` as the hooks; the lifecycle hands itself back
/// through `initialize_module`.
pub struct ProxyGatewayService {
    config: ProxyConfig,
    this: Weak<ProxyGatewayService>,
    lifecycle: OnceLock<Weak<ModuleLifecycle>>,
    settings: RwLock<ModuleSettings>,
    health: Mutex<HealthState>,
    archive: Option<Arc<dyn ArchiveStore>>,
    archive_ready: AtomicBool,
}

impl ProxyGatewayService {
    pub fn new(config: ProxyConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// Service that also archives fetched node files.
    pub fn with_archive(config: ProxyConfig, archive: Arc<dyn ArchiveStore>) -> Arc<Self> {
        Self::build(config, Some(archive))
    }

    fn build(config: ProxyConfig, archive: Option<Arc<dyn ArchiveStore>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            this: this.clone(),
            lifecycle: OnceLock::new(),
            settings: RwLock::new(default_settings()),
            health: Mutex::new(HealthState::Good),
            archive,
            archive_ready: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Current value of a module setting.
    pub async fn setting(&self, name: &str) -> Option<Value> {
        self.settings.read().await.get(name).cloned()
    }

    pub(crate) async fn setting_str(&self, name: &str) -> String {
        self.settings.read().await.get_str(name).to_string()
    }

    pub(crate) fn lifecycle(&self) -> Result<Arc<ModuleLifecycle>> {
        self.lifecycle
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| GatewayError::Other("module lifecycle is not initialized".into()))
    }

    pub(crate) fn chunked_client(&self) -> Result<ChunkedMethodClient> {
        let invoker = AdapterInvoker::new(self.lifecycle()?, self.config.adapter_module_id.as_str());
        Ok(ChunkedMethodClient::with_config(
            Arc::new(invoker),
            self.config.rpc.clone(),
        ))
    }

    fn set_health(&self, state: HealthState) {
        *self.health.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub(crate) fn archive(&self) -> Option<&Arc<dyn ArchiveStore>> {
        self.archive
            .as_ref()
            .filter(|_| self.archive_ready.load(Ordering::SeqCst))
    }

    async fn configure_archive(&self) {
        let Some(archive) = self.archive.as_ref() else {
            return;
        };

        let options = {
            let settings = self.settings.read().await;
            ArchiveOptions::from_settings(
                settings.get_str(capability::WP_BLOB_CONNECTION_STRING),
                settings.get_str(capability::WP_BLOB_CONTAINER_NAME),
            )
        };
        let Some(options) = options else {
            info!("All optional blob storage configuration values were not found");
            return;
        };

        match archive.configure(&options).await {
            Ok(()) => {
                info!("Archiving fetched nodes to container {}", options.container_name);
                self.archive_ready.store(true, Ordering::SeqCst);
            }
            Err(e) => error!("An error occurred while trying to configure the blob storage client: {:#}", e),
        }
    }

    async fn register_commands(&self, lifecycle: &ModuleLifecycle) {
        for name in capability::COMMANDS {
            let service = self.this.clone();
            let handler = method_handler(move |request: MethodRequest| {
                let service = service.clone();
                async move {
                    match service.upgrade() {
                        Some(service) => service.handle_command(request).await,
                        None => CommandResponse::error(500, "Proxy gateway service has shut down"),
                    }
                }
            });
            lifecycle.add_direct_method(name, handler).await;
        }
    }
}

fn default_settings() -> ModuleSettings {
    ModuleSettings::new()
        .with_setting(capability::WP_OPC_ENDPOINT, empty_endpoint())
        .with_setting(capability::WP_SERVER_NODE_DISCOVERY_ROOT, json!(""))
        .with_setting(capability::WP_BLOB_CONNECTION_STRING, json!(""))
        .with_setting(capability::WP_BLOB_CONTAINER_NAME, json!(""))
}

#[async_trait]
impl ModuleHooks for ProxyGatewayService {
    async fn initialize_module(&self, lifecycle: &Arc<ModuleLifecycle>) -> Result<()> {
        info!(
            "initializeModule (adapter module: {})",
            self.config.adapter_module_id
        );
        if self.lifecycle.set(Arc::downgrade(lifecycle)).is_err() {
            return Err(GatewayError::Config {
                message: "proxy gateway service is already attached to a lifecycle".into(),
            });
        }
        Ok(())
    }

    async fn on_module_ready(&self) -> Result<()> {
        info!("Starting onModuleReady initialization");
        let lifecycle = self.lifecycle()?;

        self.set_health(if lifecycle.is_connected().await {
            HealthState::Good
        } else {
            HealthState::Critical
        });

        self.configure_archive().await;
        self.register_commands(&lifecycle).await;

        // discovery can take minutes; don't hold up startup
        if let Some(service) = self.this.upgrade() {
            tokio::spawn(async move {
                service.start_opc_node_discovery().await;
            });
        }

        Ok(())
    }

    async fn on_health(&self) -> Result<HealthState> {
        Ok(*self.health.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn on_handle_module_properties(&self, desired: &Value) -> Map<String, Value> {
        self.settings.write().await.apply_desired(desired)
    }

    fn on_module_client_error(&self, error: &str) {
        error!("Module client connection error: {}", error);
        self.set_health(HealthState::Critical);
    }
}
