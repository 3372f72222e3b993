//! Proxy service wired to a lifecycle over the in-memory hub, plus a scripted
//! OPC UA adapter.

#![allow(dead_code)]

use gateway_core::codec::{compress_json, decompress_json};
use gateway_core::transport::MemoryHub;
use gateway_core::{ModuleEnvironment, ModuleLifecycle, MethodParams, MethodResponse};
use gateway_proxy::{ArchiveStore, ProxyConfig, ProxyGatewayService};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct ProxyHarness {
    pub hub: Arc<MemoryHub>,
    pub service: Arc<ProxyGatewayService>,
    pub lifecycle: Arc<ModuleLifecycle>,
    pub storage: TempDir,
}

impl ProxyHarness {
    pub fn new(desired: Value) -> Self {
        Self::build(desired, None)
    }

    pub fn with_archive(desired: Value, archive: Arc<dyn ArchiveStore>) -> Self {
        Self::build(desired, Some(archive))
    }

    fn build(desired: Value, archive: Option<Arc<dyn ArchiveStore>>) -> Self {
        let hub = MemoryHub::new();
        hub.set_desired_document(desired);

        let storage = tempfile::tempdir().unwrap();
        let config = ProxyConfig::default().with_storage_root(storage.path());
        let service = match archive {
            Some(archive) => ProxyGatewayService::with_archive(config, archive),
            None => ProxyGatewayService::new(config),
        };

        let lifecycle = ModuleLifecycle::builder(hub.connector(), service.clone())
            .environment(ModuleEnvironment::from_lookup(|key| match key {
                "IOTEDGE_DEVICEID" => Some("edge-device-01".to_string()),
                "IOTEDGE_MODULEID" => Some("proxygateway".to_string()),
                _ => None,
            }))
            .exit_handler(|_| {})
            .build()
            .unwrap();

        Self {
            hub,
            service,
            lifecycle,
            storage,
        }
    }

    pub async fn started(desired: Value) -> Self {
        let harness = Self::new(desired);
        harness.lifecycle.start().await.unwrap();
        harness
    }

    pub fn bodies_with(&self, key: &str) -> Vec<Value> {
        self.hub
            .sent_bodies()
            .into_iter()
            .filter(|body| body.get(key).is_some())
            .collect()
    }

    /// Invocations of one adapter method, payloads only.
    pub fn adapter_calls(&self, method_name: &str) -> Vec<Value> {
        self.hub
            .invocations()
            .into_iter()
            .filter(|(_, params)| params.method_name == method_name)
            .map(|(_, params)| params.payload)
            .collect()
    }

    /// Files written under the storage root.
    pub fn stored_files(&self) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(self.storage.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

/// Wait until `condition` holds, giving blocking file IO real time to finish.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Adapter side of the submit-then-poll protocol.
///
/// Every submit gets a fresh request id; the first poll of that id answers
/// with the result `respond` computed from the decoded request.
pub struct ScriptedAdapter {
    next_request: u32,
    pending: HashMap<String, Value>,
    browse: MethodResponse,
    test_connection: MethodResponse,
    respond: Box<dyn FnMut(&str, &Value) -> Value + Send>,
}

impl ScriptedAdapter {
    pub fn new(respond: impl FnMut(&str, &Value) -> Value + Send + 'static) -> Self {
        Self {
            next_request: 0,
            pending: HashMap::new(),
            browse: MethodResponse::new(200, json!({"JobId": "browse-1"})),
            test_connection: MethodResponse::new(200, json!({})),
            respond: Box::new(respond),
        }
    }

    pub fn with_browse(mut self, response: MethodResponse) -> Self {
        self.browse = response;
        self
    }

    pub fn with_test_connection(mut self, response: MethodResponse) -> Self {
        self.test_connection = response;
        self
    }

    /// Install on the hub.
    pub fn install(mut self, hub: &MemoryHub) {
        hub.set_invoke_handler(move |_module_id, params| Ok(self.answer(params)));
    }

    fn answer(&mut self, params: &MethodParams) -> MethodResponse {
        match params.method_name.as_str() {
            "TestConnection_v1" => return self.test_connection.clone(),
            "BrowseNodes_v1" => return self.browse.clone(),
            _ => {}
        }

        if let Some(encoded) = params.payload.get("payload").and_then(Value::as_str) {
            let request = decompress_json(encoded).unwrap();
            let result = (self.respond)(&params.method_name, &request);
            self.next_request += 1;
            let request_id = format!("req-{}", self.next_request);
            self.pending.insert(request_id.clone(), result);
            return MethodResponse::new(202, json!({"RequestId": request_id}));
        }

        let request_id = params.payload["RequestId"].as_str().unwrap_or_default();
        match self.pending.remove(request_id) {
            Some(result) => {
                let (_, encoded) = compress_json(&result).unwrap();
                MethodResponse::new(200, json!({"Status": 200, "Payload": encoded}))
            }
            None => MethodResponse::new(404, json!({"error": {"code": "UnknownRequest"}})),
        }
    }
}

/// Adapter that serves browse pages for `FetchBrowsedNodes_v1`.
pub fn paged_browse(pages: Vec<Vec<Value>>) -> ScriptedAdapter {
    ScriptedAdapter::new(move |method_name, request| {
        assert_eq!(method_name, "FetchBrowsedNodes_v1");
        let page: usize = request["ContinuationToken"].as_str().unwrap().parse().unwrap();
        let nodes = pages[page - 1].clone();
        if page < pages.len() {
            json!({"nodes": nodes, "continuationToken": (page + 1).to_string()})
        } else {
            json!({"nodes": nodes})
        }
    })
}

pub fn discovery_settings() -> Value {
    json!({
        "wpOpcEndpoint": {
            "uri": "opc.tcp://plc-01:4840",
            "securityMode": 0,
            "credentials": {"credentialType": 0, "username": "", "password": ""}
        },
        "wpServerNodeDiscoveryRoot": "ns=0;i=85",
        "$version": 2
    })
}

/// Let spawned tasks run.
pub async fn settle_briefly() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
