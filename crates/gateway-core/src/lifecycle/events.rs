//! Per-connection event pump.

use super::{ConnectionState, ModuleLifecycle};
use crate::transport::ClientEvent;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

enum Pumped {
    Event(ClientEvent),
    Desired(Value),
}

async fn next_item<T>(receiver: &mut Option<UnboundedReceiver<T>>) -> Option<T> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

impl ModuleLifecycle {
    /// Drain client events and desired-property patches for one connection.
    ///
    /// Patches are applied in arrival order on the pump itself. Direct method
    /// calls are answered on their own tasks so a slow command never stalls
    /// the pump.
    pub(super) fn spawn_event_pump(
        self: &Arc<Self>,
        mut events: Option<UnboundedReceiver<ClientEvent>>,
        mut desired: Option<UnboundedReceiver<Value>>,
    ) -> JoinHandle<()> {
        let lifecycle = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    Some(event) = next_item(&mut events) => Pumped::Event(event),
                    Some(patch) = next_item(&mut desired) => Pumped::Desired(patch),
                    else => break,
                };

                let Some(lifecycle) = lifecycle.upgrade() else {
                    break;
                };

                match item {
                    Pumped::Event(event) => {
                        if !lifecycle.handle_client_event(event).await {
                            break;
                        }
                    }
                    Pumped::Desired(patch) => lifecycle.handle_desired_properties(patch).await,
                }
            }
            debug!("Event pump stopped");
        })
    }

    /// Returns false once the connection is gone.
    async fn handle_client_event(self: &Arc<Self>, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Connected => self.hooks.on_module_connect(),
            ClientEvent::Disconnected => self.hooks.on_module_disconnect(),
            ClientEvent::Error(message) => {
                error!("Module client error: {}", message);
                self.drop_connection().await;
                self.hooks.on_module_client_error(&message);
                return false;
            }
            ClientEvent::InputMessage {
                input_name,
                message,
            } => {
                self.hooks
                    .on_handle_downstream_messages(&input_name, message)
                    .await;
            }
            ClientEvent::MethodCall { request, responder } => {
                let lifecycle = self.clone();
                tokio::spawn(async move {
                    let method_name = request.method_name.clone();
                    let response = lifecycle.dispatch_direct_method(request).await;
                    if responder.send(response.into_method_response()).is_err() {
                        warn!("Caller of {} went away before the response was sent", method_name);
                    }
                });
            }
        }
        true
    }

    /// Forget the current client and twin after a fatal transport error.
    async fn drop_connection(&self) {
        if let Some(twin) = self.twin.write().await.take() {
            twin.remove_all_listeners();
        }
        if let Some(client) = self.client.write().await.take() {
            client.remove_all_listeners();
        }
        self.set_state(ConnectionState::Disconnected).await;
    }
}
