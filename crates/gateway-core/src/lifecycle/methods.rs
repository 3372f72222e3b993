//! Direct methods: registration, dispatch and outbound invocation.

use super::ModuleLifecycle;
use crate::command::{method_handler, CommandResponse, DirectMethodHandler};
use crate::error::{GatewayError, Result};
use crate::transport::{MethodParams, MethodRequest, MethodResponse};
use futures::FutureExt;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

impl ModuleLifecycle {
    /// Register `handler` for direct method `method_name`.
    ///
    /// Handlers survive reconnects: every new client gets the full set.
    pub async fn add_direct_method(&self, method_name: &str, handler: DirectMethodHandler) {
        self.methods
            .write()
            .await
            .insert(method_name.to_string(), handler);

        match self.client().await {
            Some(client) => client.on_method(method_name),
            None => debug!(
                "Direct method {} registered, enabled on the next connect",
                method_name
            ),
        }
    }

    /// Route an inbound direct method call to its handler.
    ///
    /// Unknown names answer 400. A panicking handler answers 500.
    pub async fn dispatch_direct_method(&self, request: MethodRequest) -> CommandResponse {
        info!("{} command received", request.method_name);

        let handler = self.methods.read().await.get(&request.method_name).cloned();
        let Some(handler) = handler else {
            let response = CommandResponse::error(
                400,
                format!("An unknown method name was found: {}", request.method_name),
            );
            error!("{}", response.message);
            return response;
        };

        let method_name = request.method_name.clone();
        match AssertUnwindSafe(handler(request)).catch_unwind().await {
            Ok(response) => {
                info!("{} finished with status {}: {}", method_name, response.status, response.message);
                response
            }
            Err(_) => {
                let response = CommandResponse::error(
                    500,
                    format!("An error occurred executing the command {}", method_name),
                );
                error!("{}", response.message);
                response
            }
        }
    }

    /// Invoke a direct method on another module of this device.
    ///
    /// Never fails: a missing client or transport error becomes status 500.
    pub async fn invoke_direct_method(
        &self,
        module_id: &str,
        method_name: &str,
        payload: Value,
        connect_timeout_secs: Option<u32>,
        response_timeout_secs: Option<u32>,
    ) -> MethodResponse {
        let Some(client) = self.client().await else {
            error!("invokeDirectMethod {}: module client not connected", method_name);
            return MethodResponse::new(500, json!({}));
        };

        let params = MethodParams::new(method_name, payload)
            .with_timeouts(connect_timeout_secs, response_timeout_secs);

        let debug_telemetry = self.debug_telemetry().await;
        if debug_telemetry {
            info!(
                "invokeModuleMethod request: {}",
                serde_json::to_string(&params).unwrap_or_default()
            );
        }

        match client
            .invoke_method(&self.environment.device_id, module_id, params)
            .await
        {
            Ok(mut response) => {
                if response.payload.is_null() {
                    response.payload = json!({});
                }
                if debug_telemetry {
                    info!(
                        "invokeModuleMethod response: status {} {}",
                        response.status, response.payload
                    );
                }
                if !response.is_success() {
                    error!(
                        "invokeModuleMethod {} on {} returned status {}",
                        method_name, module_id, response.status
                    );
                }
                response
            }
            Err(e) => {
                error!("invokeModuleMethod {} on {} failed: {}", method_name, module_id, e);
                MethodResponse::new(500, json!({}))
            }
        }
    }

    /// Handler for the built-in restart command.
    ///
    /// Answers right away; the restart runs on its own task.
    pub(super) fn restart_method_handler(self: &Arc<Self>) -> DirectMethodHandler {
        let lifecycle = Arc::downgrade(self);
        method_handler(move |request: MethodRequest| {
            let lifecycle = lifecycle.clone();
            async move {
                let delay = match restart_delay(&request.payload) {
                    Ok(delay) => delay,
                    Err(e) => return CommandResponse::from_error(&request.method_name, &e),
                };

                if let Some(lifecycle) = lifecycle.upgrade() {
                    tokio::spawn(async move {
                        lifecycle
                            .restart_module(delay, "RestartModule command received")
                            .await;
                    });
                }

                CommandResponse::ok("Restart module request received")
            }
        })
    }
}

/// Delay requested by a restart command, from `{timeout: <seconds>}`.
fn restart_delay(payload: &Value) -> Result<Duration> {
    match payload.get("timeout") {
        None | Some(Value::Null) => Ok(Duration::ZERO),
        Some(timeout) => timeout
            .as_u64()
            .map(Duration::from_secs)
            .ok_or_else(|| GatewayError::InvalidParams {
                message: format!("timeout must be a non-negative integer, got {}", timeout),
            }),
    }
}
