//! Shared harness: a lifecycle wired to the in-memory hub.

#![allow(dead_code)]

use async_trait::async_trait;
use gateway_core::transport::MemoryHub;
use gateway_core::{
    HealthState, LifecycleConfig, ModuleEnvironment, ModuleHooks, ModuleLifecycle, Result,
    UploadConfig,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub struct TestHooks {
    pub health: Mutex<HealthState>,
    pub ready_calls: AtomicU32,
    pub desired_seen: Mutex<Vec<Value>>,
    pub client_errors: Mutex<Vec<String>>,
}

impl Default for TestHooks {
    fn default() -> Self {
        Self {
            health: Mutex::new(HealthState::Good),
            ready_calls: AtomicU32::new(0),
            desired_seen: Mutex::new(Vec::new()),
            client_errors: Mutex::new(Vec::new()),
        }
    }
}

impl TestHooks {
    pub fn set_health(&self, state: HealthState) {
        *self.health.lock().unwrap() = state;
    }
}

#[async_trait]
impl ModuleHooks for TestHooks {
    async fn on_module_ready(&self) -> Result<()> {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_health(&self) -> Result<HealthState> {
        Ok(*self.health.lock().unwrap())
    }

    async fn on_handle_module_properties(&self, desired: &Value) -> Map<String, Value> {
        self.desired_seen.lock().unwrap().push(desired.clone());
        Map::new()
    }

    fn on_module_client_error(&self, error: &str) {
        self.client_errors.lock().unwrap().push(error.to_string());
    }
}

pub struct Harness {
    pub hub: Arc<MemoryHub>,
    pub hooks: Arc<TestHooks>,
    pub lifecycle: Arc<ModuleLifecycle>,
    pub exits: Arc<AtomicU32>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    pub fn with_config(config: LifecycleConfig) -> Self {
        Self::with_configs(config, UploadConfig::default())
    }

    pub fn with_configs(config: LifecycleConfig, upload: UploadConfig) -> Self {
        let hub = MemoryHub::new();
        let hooks = Arc::new(TestHooks::default());
        let exits = Arc::new(AtomicU32::new(0));

        let exit_counter = exits.clone();
        let lifecycle = ModuleLifecycle::builder(hub.connector(), hooks.clone())
            .config(config)
            .upload_config(upload)
            .environment(test_environment())
            .exit_handler(move |_code| {
                exit_counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        Self {
            hub,
            hooks,
            lifecycle,
            exits,
        }
    }

    /// Start and wait for the module to be ready.
    pub async fn started() -> Self {
        let harness = Self::new();
        harness.lifecycle.start().await.unwrap();
        harness
    }

    pub fn exit_count(&self) -> u32 {
        self.exits.load(Ordering::SeqCst)
    }

    /// Sent bodies that carry `key` at the top level.
    pub fn bodies_with(&self, key: &str) -> Vec<Value> {
        self.hub
            .sent_bodies()
            .into_iter()
            .filter(|body| body.get(key).is_some())
            .collect()
    }
}

pub fn test_environment() -> ModuleEnvironment {
    ModuleEnvironment::from_lookup(|key| match key {
        "IOTEDGE_DEVICEID" => Some("edge-device-01".to_string()),
        "IOTEDGE_MODULEID" => Some("proxygateway".to_string()),
        _ => None,
    })
}

/// Let spawned tasks run; virtual time advances only once they are idle.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}
