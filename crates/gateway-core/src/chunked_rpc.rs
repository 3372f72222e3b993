//! Submit-then-poll RPC for payloads larger than one direct method call.
//!
//! 1. Gzip + base64 the request and submit `{contentLength, payload}`.
//! 2. The adapter answers 202 with a `RequestId`.
//! 3. Poll `{RequestId}` every interval while the answer is 102.
//! 4. A 200 carries `{Status: 200, Payload: <gzip + base64 JSON>}`.
//!
//! Any other status ends the call with that status. Each call owns its one
//! request id; concurrent calls share nothing but the invoker.

use crate::codec::{compress_json, decompress_json};
use crate::command::CommandResponse;
use crate::config::ChunkedRpcConfig;
use crate::error::{GatewayError, Result};
use crate::lifecycle::ModuleLifecycle;
use crate::transport::MethodResponse;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const STATUS_SUBMITTED: u16 = 202;
pub const STATUS_PENDING: u16 = 102;
pub const STATUS_COMPLETE: u16 = 200;

/// Bounded request/response primitive the chunked client runs over.
#[async_trait]
pub trait MethodInvoker: Send + Sync {
    /// Never fails; transport problems come back as a status.
    async fn invoke(&self, method_name: &str, payload: Value) -> MethodResponse;
}

/// Invokes methods on one fixed module through the lifecycle.
pub struct AdapterInvoker {
    lifecycle: Arc<ModuleLifecycle>,
    module_id: String,
}

impl AdapterInvoker {
    pub fn new(lifecycle: Arc<ModuleLifecycle>, module_id: impl Into<String>) -> Self {
        Self {
            lifecycle,
            module_id: module_id.into(),
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }
}

#[async_trait]
impl MethodInvoker for AdapterInvoker {
    async fn invoke(&self, method_name: &str, payload: Value) -> MethodResponse {
        self.lifecycle
            .invoke_direct_method(&self.module_id, method_name, payload, None, None)
            .await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkRequestEnvelope {
    content_length: usize,
    payload: String,
}

#[derive(Serialize)]
struct ChunkPollEnvelope<'a> {
    #[serde(rename = "RequestId")]
    request_id: &'a str,
}

/// One adapter answer, read leniently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkResult {
    /// Status of the invoke itself.
    pub status: u16,
    pub request_id: Option<String>,
    /// `Status` inside the body, when present.
    pub inner_status: Option<u16>,
    pub payload: Option<String>,
    pub error_code: Option<String>,
    pub error: Option<Value>,
}

fn field<'a>(body: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    body.get(name).or_else(|| {
        body.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

impl ChunkResult {
    pub fn from_response(response: &MethodResponse) -> Self {
        let mut result = ChunkResult {
            status: response.status,
            ..ChunkResult::default()
        };
        let Some(body) = response.payload.as_object() else {
            return result;
        };

        result.request_id = field(body, "RequestId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        result.inner_status = field(body, "Status")
            .and_then(Value::as_u64)
            .and_then(|status| u16::try_from(status).ok());
        result.payload = field(body, "Payload")
            .and_then(Value::as_str)
            .filter(|payload| !payload.is_empty())
            .map(str::to_string);
        result.error = field(body, "error").cloned();
        result.error_code = result
            .error
            .as_ref()
            .and_then(|error| error.get("code").or_else(|| error.get("message")))
            .and_then(Value::as_str)
            .map(str::to_string);

        result
    }

    fn into_failure(self, method_name: &str) -> CommandResponse {
        let message = self.error_code.unwrap_or_else(|| {
            format!(
                "Unknown error in the chunked response from {} - status: {}",
                method_name, self.status
            )
        });
        error!("{}", message);

        let response = CommandResponse::error(self.status, message);
        match self.error {
            Some(error) => response.with_payload(error),
            None => response,
        }
    }
}

/// Client for the submit-then-poll protocol.
pub struct ChunkedMethodClient {
    invoker: Arc<dyn MethodInvoker>,
    config: ChunkedRpcConfig,
}

impl ChunkedMethodClient {
    pub fn new(invoker: Arc<dyn MethodInvoker>) -> Self {
        Self::with_config(invoker, ChunkedRpcConfig::default())
    }

    pub fn with_config(invoker: Arc<dyn MethodInvoker>, config: ChunkedRpcConfig) -> Self {
        Self { invoker, config }
    }

    /// Run one chunked call. Never fails; errors come back as a status.
    ///
    /// On success the payload is the decoded response object plus
    /// `compressedPayload`, the response still encoded for re-emission.
    pub async fn invoke(&self, method_name: &str, request: &Value) -> CommandResponse {
        info!("chunkRequest {}", method_name);

        match self.try_invoke(method_name, request).await {
            Ok(response) => response,
            Err(e) => {
                let response =
                    CommandResponse::new(e.status_code(), format!("{} failed: {}", method_name, e));
                error!("{}", response.message);
                response
            }
        }
    }

    async fn try_invoke(&self, method_name: &str, request: &Value) -> Result<CommandResponse> {
        let (content_length, payload) = compress_json(request)?;
        let submit = serde_json::to_value(ChunkRequestEnvelope {
            content_length,
            payload,
        })?;

        let submitted = ChunkResult::from_response(&self.invoker.invoke(method_name, submit).await);
        let request_id = match (submitted.status, submitted.request_id.clone()) {
            (STATUS_SUBMITTED, Some(request_id)) => request_id,
            _ => return Ok(submitted.into_failure(method_name)),
        };
        debug!("{} accepted as request {}", method_name, request_id);

        let result = self.poll(method_name, &request_id).await?;

        let completed = result.status == STATUS_COMPLETE
            && matches!(result.inner_status, None | Some(STATUS_COMPLETE));
        if completed {
            if let Some(payload) = result.payload.as_deref() {
                let decoded = decompress_json(payload)?;
                return Ok(CommandResponse::ok(format!("{} succeeded", method_name))
                    .with_payload(merge_payload(payload, decoded)));
            }
        }

        Ok(result.into_failure(method_name))
    }

    /// Poll until a status other than 102 arrives.
    async fn poll(&self, method_name: &str, request_id: &str) -> Result<ChunkResult> {
        let mut polls: u32 = 0;

        loop {
            if let Some(max_polls) = self.config.max_polls {
                if polls >= max_polls {
                    return Err(GatewayError::Timeout(self.config.poll_interval * polls));
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
            polls += 1;

            let poll = serde_json::to_value(ChunkPollEnvelope { request_id })?;
            let response = self.invoker.invoke(method_name, poll).await;
            info!("{} returned status: {}", method_name, response.status);

            if response.status != STATUS_PENDING {
                return Ok(ChunkResult::from_response(&response));
            }
        }
    }
}

/// `{compressedPayload, ...decoded}`; non-object results go under `data`.
fn merge_payload(compressed: &str, decoded: Value) -> Value {
    let mut merged = Map::new();
    merged.insert("compressedPayload".to_string(), json!(compressed));
    match decoded {
        Value::Object(fields) => merged.extend(fields),
        other => {
            merged.insert("data".to_string(), other);
        }
    }
    Value::Object(merged)
}
