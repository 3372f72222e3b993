//! Connection, property sync, health and restart supervision for one module.
//!
//! A [`ModuleLifecycle`] owns the single transport connection of the process.
//! Everything the gateway sends or invokes goes through it, and every inbound
//! event arrives through the event pump it runs for the live connection.
//!
//! State machine:
//! - `Disconnected -> Connecting -> Connected` on a successful `connect()`
//! - `Connected -> Disconnected` on a client error (no automatic reconnect)
//! - `Connected -> Closing -> Disconnected` on `close()` or the next `connect()`

mod builder;
pub mod capability;
mod events;
mod gate;
mod hooks;
mod methods;
mod supervision;
mod telemetry;

pub use builder::ModuleLifecycleBuilder;
pub use hooks::ModuleHooks;

use crate::command::DirectMethodHandler;
use crate::config::{LifecycleConfig, ModuleEnvironment, TransportConfig, UploadConfig};
use crate::error::{GatewayError, Result};
use crate::retry::{retry_async, RetryPolicy};
use crate::settings::ModuleSettings;
use crate::size_budget::ChunkBudget;
use crate::system::HostProperties;
use crate::transport::{ModuleClient, ModuleTwin, TransportConnector};
use crate::upload::{StreamingUploader, UploadStatus};
use gate::StartGate;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use supervision::HealthTracker;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Process exit hook used by restarts.
pub type ExitHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Connection state of the module client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closing => write!(f, "closing"),
        }
    }
}

/// Lifecycle of one edge module. Lives for the whole process.
pub struct ModuleLifecycle {
    connector: Arc<dyn TransportConnector>,
    hooks: Arc<dyn ModuleHooks>,
    config: LifecycleConfig,
    environment: ModuleEnvironment,
    upload_config: UploadConfig,
    upload_budget: ChunkBudget,
    exit_handler: ExitHandler,

    state: RwLock<ConnectionState>,
    client: RwLock<Option<Arc<dyn ModuleClient>>>,
    twin: RwLock<Option<Arc<dyn ModuleTwin>>>,
    event_pump: Mutex<Option<JoinHandle<()>>>,
    /// Serializes `connect()` and `close()`.
    connection_guard: Mutex<()>,

    settings: RwLock<ModuleSettings>,
    methods: RwLock<HashMap<String, DirectMethodHandler>>,
    health: Mutex<HealthTracker>,
    start_gate: StartGate,
    restart_pending: AtomicBool,
}

impl ModuleLifecycle {
    pub fn builder(
        connector: Arc<dyn TransportConnector>,
        hooks: Arc<dyn ModuleHooks>,
    ) -> ModuleLifecycleBuilder {
        ModuleLifecycleBuilder::new(connector, hooks)
    }

    fn new(
        connector: Arc<dyn TransportConnector>,
        hooks: Arc<dyn ModuleHooks>,
        config: LifecycleConfig,
        environment: ModuleEnvironment,
        upload_config: UploadConfig,
        upload_budget: ChunkBudget,
        exit_handler: ExitHandler,
    ) -> Self {
        Self {
            connector,
            hooks,
            config,
            environment,
            upload_config,
            upload_budget,
            exit_handler,
            state: RwLock::new(ConnectionState::Disconnected),
            client: RwLock::new(None),
            twin: RwLock::new(None),
            event_pump: Mutex::new(None),
            connection_guard: Mutex::new(()),
            settings: RwLock::new(
                ModuleSettings::new().with_setting(capability::WP_DEBUG_TELEMETRY, json!(false)),
            ),
            methods: RwLock::new(HashMap::new()),
            health: Mutex::new(HealthTracker::default()),
            start_gate: StartGate::new(),
            restart_pending: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn environment(&self) -> &ModuleEnvironment {
        &self.environment
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.client.read().await.is_some()
    }

    /// Whether outbound payloads and invoke traffic are logged verbosely.
    pub async fn debug_telemetry(&self) -> bool {
        self.settings
            .read()
            .await
            .get_bool(capability::WP_DEBUG_TELEMETRY)
    }

    async fn client(&self) -> Option<Arc<dyn ModuleClient>> {
        self.client.read().await.clone()
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    /// Bring the module online.
    ///
    /// Runs `initialize_module`, connects with retries, waits for the first
    /// desired-properties sync, runs `on_module_ready`, registers the restart
    /// command and reports device properties and the started event.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        info!("Starting module {}", self.environment.module_id);

        if let Err(e) = self.hooks.initialize_module(self).await {
            error!("initializeModule failed: {}", e);
            return Err(e);
        }

        let policy = RetryPolicy::fixed(self.config.connect_attempts, self.config.connect_backoff);
        let (result, stats) =
            retry_async(&policy, || self.connect(), GatewayError::is_retryable).await;
        if let Err(e) = result {
            error!("Unable to connect the module client: {}", e);
            if !e.is_retryable() {
                return Err(e);
            }
            return Err(GatewayError::ConnectExhausted {
                attempts: stats.attempts,
            });
        }

        info!("Waiting for the first desired properties sync");
        self.start_gate.wait().await;

        if let Err(e) = self.hooks.on_module_ready().await {
            error!("onModuleReady failed: {}", e);
            return Err(e);
        }

        let restart = self.restart_method_handler();
        for method_name in [
            capability::CM_RESTART_GATEWAY_MODULE,
            capability::DM_RESTART_GATEWAY_MODULE,
        ] {
            self.add_direct_method(method_name, restart.clone()).await;
        }

        let host = serde_json::to_value(HostProperties::collect())?;
        self.update_properties(host).await;

        self.send_measurement(
            &json!({
                capability::ST_IOT_CENTRAL_CLIENT_STATE: capability::CLIENT_STATE_CONNECTED,
                capability::ST_MODULE_STATE: capability::MODULE_STATE_ACTIVE,
                capability::EV_MODULE_STARTED: "Module initialization"
            }),
            Some(TransportConfig::IOTC_OUTPUT_NAME),
        )
        .await;

        info!("Module {} started", self.environment.module_id);
        Ok(())
    }

    /// Replace any current connection with a new one.
    ///
    /// Tears down the previous client first, then creates a new client, waits
    /// the settle delay for dependent modules, opens it, fetches the twin and
    /// starts the event pump. Every attempt that gets a client pays the settle
    /// delay, a failed open included. On failure the half-built client is closed and the state
    /// returns to `Disconnected`.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let _guard = self.connection_guard.lock().await;

        self.teardown().await;
        self.set_state(ConnectionState::Connecting).await;

        info!(
            "Connecting module {} on device {} (hub: {}, auth: {})",
            self.environment.module_id,
            self.environment.device_id,
            self.environment.iothub_hostname,
            self.environment.auth_scheme
        );

        let client = match self.connector.create_client().await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to create the module client: {}", e);
                self.set_state(ConnectionState::Disconnected).await;
                return Err(e);
            }
        };
        let events = client.take_events();

        match self.open_client(&client).await {
            Ok(twin) => {
                let desired = twin.take_desired_updates();

                for method_name in self.methods.read().await.keys() {
                    client.on_method(method_name);
                }

                *self.client.write().await = Some(client);
                *self.twin.write().await = Some(twin);
                // the pump drops desired properties unless the state is Connected
                self.set_state(ConnectionState::Connected).await;
                *self.event_pump.lock().await = Some(self.spawn_event_pump(events, desired));

                info!("Module client connected");
                Ok(())
            }
            Err(e) => {
                error!("Failed to open the module client: {}", e);
                client.remove_all_listeners();
                if let Err(close_err) = client.close().await {
                    warn!("Error closing the failed module client: {}", close_err);
                }
                self.set_state(ConnectionState::Disconnected).await;
                Err(e)
            }
        }
    }

    async fn open_client(&self, client: &Arc<dyn ModuleClient>) -> Result<Arc<dyn ModuleTwin>> {
        info!(
            "Waiting {:?} for dependent modules to initialize",
            self.config.settle_delay
        );
        tokio::time::sleep(self.config.settle_delay).await;

        client.open().await?;
        client.get_twin().await
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let _guard = self.connection_guard.lock().await;
        self.teardown().await;
    }

    async fn teardown(&self) {
        if let Some(pump) = self.event_pump.lock().await.take() {
            pump.abort();
        }

        if let Some(twin) = self.twin.write().await.take() {
            twin.remove_all_listeners();
        }

        if let Some(client) = self.client.write().await.take() {
            self.set_state(ConnectionState::Closing).await;
            client.remove_all_listeners();
            if let Err(e) = client.close().await {
                warn!("Error closing the module client: {}", e);
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Upload a file as chunked telemetry and wait for the terminal status.
    pub async fn upload_file(self: &Arc<Self>, path: impl AsRef<Path>) -> UploadStatus {
        StreamingUploader::with_budget(self.clone(), self.upload_config.clone(), self.upload_budget)
            .upload_file(path)
            .await
    }

    /// Start a file upload in the background.
    pub fn send_large_payload(self: &Arc<Self>, path: impl Into<PathBuf>) -> JoinHandle<UploadStatus> {
        let lifecycle = self.clone();
        let path = path.into();
        tokio::spawn(async move { lifecycle.upload_file(&path).await })
    }
}
