//! Outbound telemetry and twin property sync.

use super::ModuleLifecycle;
use crate::error::{GatewayError, Result};
use crate::settings::unrecognized_names;
use crate::transport::Message;
use crate::upload::MessageSink;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

impl ModuleLifecycle {
    /// Send one telemetry message on `output_name`, or the default output.
    ///
    /// Logs and does nothing when there is no client.
    pub async fn send_measurement<T: Serialize + ?Sized>(&self, data: &T, output_name: Option<&str>) {
        let message = match Message::json(data) {
            Ok(message) => message,
            Err(e) => {
                error!("sendMeasurement: unable to serialize telemetry: {}", e);
                return;
            }
        };

        let Some(client) = self.client().await else {
            warn!("sendMeasurement: module client not connected");
            return;
        };
        let debug_telemetry = self.debug_telemetry().await;
        let body = debug_telemetry.then(|| String::from_utf8_lossy(&message.body).into_owned());

        let result = match output_name {
            Some(output_name) => client.send_output_event(output_name, message).await,
            None => client.send_event(message).await,
        };

        match result {
            Ok(()) => {
                if let Some(body) = body {
                    info!("sendEvent: {}", body);
                }
            }
            Err(e) => error!("sendMeasurement: {}", e),
        }
    }

    /// Send a prepared message on a named output, propagating failures.
    ///
    /// Used by the uploader, which has to stop on the first failed chunk.
    pub async fn send_large_payload_message(&self, output_name: &str, message: Message) -> Result<()> {
        let client = self.client().await.ok_or(GatewayError::NotConnected)?;
        if self.debug_telemetry().await {
            debug!(
                "sendLargePayloadMessage: {} bytes on {}, properties {:?}",
                message.body.len(),
                output_name,
                message.properties
            );
        }
        client.send_output_event(output_name, message).await
    }

    /// Push a reported-properties patch. No-op without a twin.
    pub async fn update_properties(&self, patch: Value) {
        let Some(twin) = self.twin.read().await.clone() else {
            warn!("updateModuleProperties: no twin available");
            return;
        };

        let logged = self.debug_telemetry().await.then(|| patch.to_string());
        match twin.update_reported(patch).await {
            Ok(()) => {
                if let Some(patch) = logged {
                    info!("Module properties updated: {}", patch);
                }
            }
            Err(e) => error!("Error updating module properties: {}", e),
        }
    }

    /// Apply one desired-properties document or patch.
    ///
    /// The service hooks see it first, then the lifecycle's own settings.
    /// All acknowledgements go out as one reported patch, and the first call
    /// opens the start gate.
    pub(super) async fn handle_desired_properties(&self, desired: Value) {
        if !self.is_connected().await {
            return;
        }

        info!("onHandleModuleProperties");
        if self.debug_telemetry().await {
            info!("desiredChangedSettings: {}", desired);
        }

        let mut reported = self.hooks.on_handle_module_properties(&desired).await;
        reported.extend(self.settings.write().await.apply_desired(&desired));

        for name in unrecognized_names(&desired, &reported) {
            warn!("Received desired property change for unknown setting '{}'", name);
        }

        if !reported.is_empty() {
            self.update_properties(Value::Object(reported)).await;
        }

        if self.start_gate.open().await {
            debug!("First desired properties sync handled");
        }
    }
}

#[async_trait]
impl MessageSink for ModuleLifecycle {
    async fn send_message(&self, output_name: &str, message: Message) -> Result<()> {
        self.send_large_payload_message(output_name, message).await
    }
}
