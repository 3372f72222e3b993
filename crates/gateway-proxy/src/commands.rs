//! Command handlers: cloud commands in, adapter calls out.
//!
//! `testConnection` and `BrowseNodes_v1` fit in one direct method call; every
//! other adapter call goes through the chunked client.

use crate::capability::{self, adapter};
use crate::config::DiscoveryConfig;
use crate::node_file::{fetched_nodes_filename, NodeFileWriter};
use crate::service::ProxyGatewayService;
use chrono::Utc;
use gateway_core::{
    CommandResponse, MethodRequest, MethodResponse, ModuleLifecycle, TransportConfig,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Serialize)]
struct FetchBrowsedNodesRequest<'a> {
    #[serde(rename = "JobId")]
    job_id: &'a str,
    #[serde(rename = "ContinuationToken")]
    continuation_token: &'a str,
}

/// `error.code` of an adapter answer, if any.
fn error_code(payload: &Value) -> Option<String> {
    payload
        .pointer("/error/code")
        .and_then(Value::as_str)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

fn error_payload(payload: &Value) -> Option<Value> {
    payload.get("error").cloned()
}

fn continuation_token(payload: &Value) -> Option<String> {
    match payload.get("continuationToken") {
        Some(Value::String(token)) if !token.is_empty() => Some(token.clone()),
        Some(Value::Number(token)) => Some(token.to_string()),
        _ => None,
    }
}

impl ProxyGatewayService {
    /// Route one cloud command. Unknown names answer 400.
    pub async fn handle_command(&self, request: MethodRequest) -> CommandResponse {
        let MethodRequest {
            method_name,
            payload,
        } = request;

        match method_name.as_str() {
            capability::CM_START_OPC_NODE_DISCOVERY => self.start_opc_node_discovery().await,
            capability::CM_TEST_CONNECTION => self.test_connection(&payload).await,
            capability::CM_FETCH_NODES => self.fetch_nodes(payload).await,
            capability::CM_WRITE_VALUES => self.chunk_request(adapter::WRITE_VALUES, &payload).await,
            capability::CM_READ_VALUES => self.chunk_request(adapter::READ_VALUES, &payload).await,
            capability::CM_ADD_OR_UPDATE_ASSETS => {
                self.chunk_request(adapter::ADD_OR_UPDATE_ASSETS, &payload)
                    .await
            }
            capability::CM_GET_ALL_ASSETS => {
                self.chunk_request(adapter::GET_ALL_ASSETS, &json!([])).await
            }
            capability::CM_REMOVE_ASSETS => {
                self.chunk_request(adapter::REMOVE_ASSETS, &payload).await
            }
            _ => {
                let response = CommandResponse::error(
                    400,
                    format!("An unknown method name was found: {}", method_name),
                );
                error!("{}", response.message);
                response
            }
        }
    }

    /// Browse from the configured discovery root, when one is set.
    pub async fn start_opc_node_discovery(&self) -> CommandResponse {
        let endpoint = self
            .setting(capability::WP_OPC_ENDPOINT)
            .await
            .unwrap_or(Value::Null);
        let root = self
            .setting_str(capability::WP_SERVER_NODE_DISCOVERY_ROOT)
            .await;
        let uri = endpoint.get("uri").and_then(Value::as_str).unwrap_or("");

        if root.is_empty() || uri.is_empty() {
            let response = CommandResponse::error(
                500,
                "Some of the required settings for fetchNodes are missing",
            );
            error!("{}", response.message);
            return response;
        }

        if let Ok(lifecycle) = self.lifecycle() {
            lifecycle
                .send_measurement(
                    &json!({
                        capability::EV_FETCHED_OPC_NODES_AUTO_DISCOVERY:
                            format!("Starting auto-discovery at node: {}", root)
                    }),
                    Some(TransportConfig::IOTC_OUTPUT_NAME),
                )
                .await;
        }

        let result = self
            .fetch_nodes(json!({
                "opcEndpoint": endpoint,
                "startNode": root,
                "depth": DiscoveryConfig::DEPTH,
                "requestedNodeClasses": DiscoveryConfig::NODE_CLASSES,
                "requestedAttributes": DiscoveryConfig::ATTRIBUTES
            }))
            .await;

        if result.status != 200 {
            error!("Node discovery failed: {}", result.message);
            return result;
        }

        let response = CommandResponse::ok(format!("fetchNodes succeeded for root node: {}", root));
        info!("{}", response.message);
        response
    }

    /// Ask the adapter whether it can reach an OPC UA endpoint.
    pub async fn test_connection(&self, request: &Value) -> CommandResponse {
        let uri = request
            .pointer("/opcEndpoint/uri")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        info!("testConnection - url: {}", uri);

        let lifecycle = match self.lifecycle() {
            Ok(lifecycle) => lifecycle,
            Err(e) => return CommandResponse::from_error("testConnection failed", &e),
        };

        let result = lifecycle
            .invoke_direct_method(
                &self.config().adapter_module_id,
                adapter::TEST_CONNECTION,
                request.clone(),
                Some(DiscoveryConfig::TEST_CONNECTION_TIMEOUT_SECS),
                Some(DiscoveryConfig::TEST_CONNECTION_TIMEOUT_SECS),
            )
            .await;

        if result.status != 200 {
            let message = error_code(&result.payload)
                .unwrap_or_else(|| "An error occurred while testing the opcua url".to_string());
            error!("{}", message);
            return CommandResponse::error(result.status, message)
                .with_payload(error_payload(&result.payload).unwrap_or_else(|| json!({})));
        }

        let response = CommandResponse::ok(format!("testConnection succeeded for url: {}", uri));
        info!("{}", response.message);
        response
    }

    /// Browse the address space and collect every page into one file.
    ///
    /// Emits a started event, then a finished or error event. A complete
    /// file is uploaded as a large payload in the background, and archived
    /// when archival is configured.
    pub async fn fetch_nodes(&self, request: Value) -> CommandResponse {
        let job_id = Uuid::new_v4();
        let lifecycle = match self.lifecycle() {
            Ok(lifecycle) => lifecycle,
            Err(e) => return CommandResponse::from_error("fetchNodes failed", &e),
        };

        let start_node = request
            .get("startNode")
            .map(|node| node.as_str().map_or_else(|| node.to_string(), str::to_string))
            .unwrap_or_default();
        let depth = request.get("depth").cloned().unwrap_or(Value::Null);
        info!("Starting node: {}, depth: {}", start_node, depth);

        lifecycle
            .send_measurement(
                &json!({
                    capability::EV_FETCHED_OPC_NODES_STARTED: format!(
                        "Starting node: {}, depth: {}, jobId: {}",
                        start_node, depth, job_id
                    )
                }),
                Some(TransportConfig::IOTC_OUTPUT_NAME),
            )
            .await;

        let response = self.browse_to_file(&lifecycle, request).await;

        let event = if response.status == 200 {
            json!({
                capability::EV_FETCHED_OPC_NODES_FINISHED:
                    format!("Status: {}, jobId: {}", response.status, job_id)
            })
        } else {
            json!({
                capability::EV_FETCHED_OPC_NODES_ERROR: format!(
                    "Status: {}, jobId: {}, Message: {},",
                    response.status, job_id, response.message
                )
            })
        };
        lifecycle
            .send_measurement(&event, Some(TransportConfig::IOTC_OUTPUT_NAME))
            .await;

        response
    }

    async fn browse_to_file(
        &self,
        lifecycle: &Arc<ModuleLifecycle>,
        request: Value,
    ) -> CommandResponse {
        info!("Calling {}", adapter::BROWSE_NODES);
        let browse = lifecycle
            .invoke_direct_method(
                &self.config().adapter_module_id,
                adapter::BROWSE_NODES,
                request,
                None,
                None,
            )
            .await;
        info!("{} returned status: {}", adapter::BROWSE_NODES, browse.status);

        let browse_job = browse
            .payload
            .get("JobId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let browse_job = match browse_job {
            Some(id) if browse.status == 200 => id,
            _ => return browse_failure(&browse),
        };

        let filename = fetched_nodes_filename(Utc::now());
        let path = self.config().storage_root.join(&filename);

        let (response, file_complete) = self.collect_pages(&browse_job, &path).await;

        if response.status == 200 && file_complete {
            // detached; the caller only waits for the browse
            drop(lifecycle.send_large_payload(&path));
            self.spawn_archive(path, filename);
        }

        response
    }

    /// Page through a browse job, appending nodes to the file at `path`.
    ///
    /// Returns the last page's response and whether the file was written
    /// completely.
    async fn collect_pages(&self, browse_job: &str, path: &Path) -> (CommandResponse, bool) {
        let mut writer = match NodeFileWriter::create(path).await {
            Ok(writer) => writer,
            Err(e) => {
                let response =
                    CommandResponse::error(500, format!("fetchNodes failed: {:#}", e));
                error!("{}", response.message);
                return (response, false);
            }
        };

        let mut token = DiscoveryConfig::FIRST_CONTINUATION_TOKEN.to_string();
        let mut complete = true;
        let page = loop {
            info!(
                "Calling fetchBrowsedNodes with JobId: {} and ContinuationToken: {}",
                browse_job, token
            );
            let page = self.fetch_browsed_nodes(browse_job, &token).await;
            info!("fetchBrowsedNodes returned status: {}", page.status);

            if page.status != 200 {
                break page;
            }

            let payload = page.payload.clone().unwrap_or(Value::Null);
            if let Some(nodes) = payload.get("nodes").and_then(Value::as_array) {
                info!("fetchBrowsedNodes returned {} nodes", nodes.len());
                if let Err(e) = writer.append(nodes).await {
                    complete = false;
                    let response = CommandResponse::error(
                        500,
                        format!("Error while fetching node chunks: {:#}", e),
                    );
                    error!("{}", response.message);
                    break response;
                }
            }

            match continuation_token(&payload) {
                Some(next) => token = next,
                None => break page,
            }
        };

        match writer.finish().await {
            Ok(path) => info!("Fetched nodes written to {}", path.display()),
            Err(e) => {
                complete = false;
                error!("Error closing the fetched nodes file: {:#}", e);
            }
        }

        (page, complete)
    }

    async fn fetch_browsed_nodes(&self, browse_job: &str, continuation_token: &str) -> CommandResponse {
        let request = FetchBrowsedNodesRequest {
            job_id: browse_job,
            continuation_token,
        };
        match serde_json::to_value(request) {
            Ok(request) => self.chunk_request(adapter::FETCH_BROWSED_NODES, &request).await,
            Err(e) => CommandResponse::error(500, format!("fetchBrowsedNodes failed: {}", e)),
        }
    }

    /// Run one adapter call through the chunked client.
    pub async fn chunk_request(&self, method_name: &str, request: &Value) -> CommandResponse {
        match self.chunked_client() {
            Ok(client) => client.invoke(method_name, request).await,
            Err(e) => CommandResponse::from_error(&format!("{} failed", method_name), &e),
        }
    }

    fn spawn_archive(&self, path: PathBuf, blob_name: String) {
        let Some(archive) = self.archive().cloned() else {
            return;
        };
        let Ok(lifecycle) = self.lifecycle() else {
            return;
        };

        tokio::spawn(async move {
            info!("uploadFetchedNodesFile {}", blob_name);
            match archive.put_file(&path, &blob_name, "application/json").await {
                Ok(url) => {
                    lifecycle
                        .send_measurement(
                            &json!({ capability::EV_FETCHED_OPC_NODES_UPLOADED: url }),
                            Some(TransportConfig::IOTC_OUTPUT_NAME),
                        )
                        .await;
                }
                Err(e) => error!("Error uploading file to blob storage: {:#}", e),
            }
        });
    }
}

fn browse_failure(browse: &MethodResponse) -> CommandResponse {
    let message = error_code(&browse.payload).unwrap_or_else(|| {
        format!(
            "Unknown error in the response from fetchNodes - status: {}",
            browse.status
        )
    });
    error!("{}", message);

    let response = CommandResponse::error(browse.status, message);
    match error_payload(&browse.payload) {
        Some(error) => response.with_payload(error),
        None => response,
    }
}
