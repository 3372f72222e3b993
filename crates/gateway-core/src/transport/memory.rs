//! In-process transport for tests and local runs without an edge hub.
//!
//! Built only with the `test-util` feature.
//!
//! A [`MemoryHub`] plays the edge hub: it records everything clients send,
//! answers outbound direct methods through a settable handler, and lets the
//! caller inject events, desired-property patches and inbound method calls.

use super::{
    ClientEvent, Message, MethodParams, MethodRequest, MethodResponse, ModuleClient, ModuleTwin,
    TransportConnector,
};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};

type InvokeHandler = Box<dyn FnMut(&str, &MethodParams) -> Result<MethodResponse> + Send>;

/// A message captured by the hub.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// `None` for the default output.
    pub output_name: Option<String>,
    pub message: Message,
}

#[derive(Default)]
struct HubState {
    sent: Vec<SentMessage>,
    reported: Vec<Value>,
    invocations: Vec<(String, MethodParams)>,
    registered_methods: Vec<String>,
    create_failures: u32,
    open_failures: u32,
    fail_sends: bool,
    clients_created: u32,
    clients_closed: u32,
    desired_document: Value,
    /// Generation of the client currently holding the event sender.
    generation: u32,
    event_tx: Option<mpsc::UnboundedSender<ClientEvent>>,
    desired_tx: Option<mpsc::UnboundedSender<Value>>,
}

/// Shared state behind every client a [`MemoryConnector`] creates.
#[derive(Default)]
pub struct MemoryHub {
    state: Mutex<HubState>,
    invoke_handler: Mutex<Option<InvokeHandler>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState {
                desired_document: json!({}),
                ..HubState::default()
            }),
            invoke_handler: Mutex::new(None),
        })
    }

    pub fn connector(self: &Arc<Self>) -> Arc<MemoryConnector> {
        Arc::new(MemoryConnector { hub: self.clone() })
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` calls to `create_client` fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.state().create_failures = count;
    }

    /// Make the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.state().open_failures = count;
    }

    /// Make every send fail until reset.
    pub fn set_send_failure(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// Full desired document delivered first by every new twin.
    pub fn set_desired_document(&self, desired: Value) {
        self.state().desired_document = desired;
    }

    /// Answer outbound direct methods with `handler`. Without one every call
    /// gets `200 {}`.
    pub fn set_invoke_handler(
        &self,
        handler: impl FnMut(&str, &MethodParams) -> Result<MethodResponse> + Send + 'static,
    ) {
        *self
            .invoke_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
    }

    /// Deliver a desired-property patch to the live twin.
    pub fn push_desired(&self, patch: Value) -> bool {
        self.state()
            .desired_tx
            .as_ref()
            .is_some_and(|tx| tx.send(patch).is_ok())
    }

    /// Deliver a client event to the live client.
    pub fn emit(&self, event: ClientEvent) -> bool {
        self.state()
            .event_tx
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Call a direct method on the module and wait for its response.
    ///
    /// Returns `None` when nobody is listening or the call was dropped.
    pub async fn call_method(&self, method_name: &str, payload: Value) -> Option<MethodResponse> {
        let (responder, response) = oneshot::channel();
        let delivered = self.emit(ClientEvent::MethodCall {
            request: MethodRequest::new(method_name, payload),
            responder,
        });
        if !delivered {
            return None;
        }
        response.await.ok()
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Bodies of every sent message, parsed as JSON.
    pub fn sent_bodies(&self) -> Vec<Value> {
        self.state()
            .sent
            .iter()
            .filter_map(|sent| sent.message.body_json().ok())
            .collect()
    }

    pub fn reported_patches(&self) -> Vec<Value> {
        self.state().reported.clone()
    }

    /// Outbound direct method calls as `(module_id, params)`.
    pub fn invocations(&self) -> Vec<(String, MethodParams)> {
        self.state().invocations.clone()
    }

    pub fn registered_methods(&self) -> Vec<String> {
        self.state().registered_methods.clone()
    }

    pub fn clients_created(&self) -> u32 {
        self.state().clients_created
    }

    pub fn clients_closed(&self) -> u32 {
        self.state().clients_closed
    }
}

/// [`TransportConnector`] backed by a [`MemoryHub`].
pub struct MemoryConnector {
    hub: Arc<MemoryHub>,
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    async fn create_client(&self) -> Result<Arc<dyn ModuleClient>> {
        let mut state = self.hub.state();
        if state.create_failures > 0 {
            state.create_failures -= 1;
            return Err(GatewayError::transport("edge hub unreachable"));
        }

        state.clients_created += 1;
        state.generation = state.clients_created;
        let (tx, rx) = mpsc::unbounded_channel();
        state.event_tx = Some(tx);

        Ok(Arc::new(MemoryClient {
            hub: self.hub.clone(),
            generation: state.generation,
            events: Mutex::new(Some(rx)),
        }))
    }
}

struct MemoryClient {
    hub: Arc<MemoryHub>,
    generation: u32,
    events: Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
}

impl MemoryClient {
    fn record_send(&self, output_name: Option<&str>, message: Message) -> Result<()> {
        let mut state = self.hub.state();
        if state.fail_sends {
            return Err(GatewayError::transport("send rejected by edge hub"));
        }
        state.sent.push(SentMessage {
            output_name: output_name.map(str::to_string),
            message,
        });
        Ok(())
    }
}

#[async_trait]
impl ModuleClient for MemoryClient {
    async fn open(&self) -> Result<()> {
        let mut state = self.hub.state();
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(GatewayError::transport("open refused"));
        }
        if state.generation == self.generation {
            if let Some(tx) = state.event_tx.as_ref() {
                let _ = tx.send(ClientEvent::Connected);
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.hub.state().clients_closed += 1;
        Ok(())
    }

    async fn send_event(&self, message: Message) -> Result<()> {
        self.record_send(None, message)
    }

    async fn send_output_event(&self, output_name: &str, message: Message) -> Result<()> {
        self.record_send(Some(output_name), message)
    }

    async fn get_twin(&self) -> Result<Arc<dyn ModuleTwin>> {
        let mut state = self.hub.state();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(state.desired_document.clone());
        state.desired_tx = Some(tx);

        Ok(Arc::new(MemoryTwin {
            hub: self.hub.clone(),
            desired: Mutex::new(Some(rx)),
        }))
    }

    async fn invoke_method(
        &self,
        _device_id: &str,
        module_id: &str,
        params: MethodParams,
    ) -> Result<MethodResponse> {
        self.hub
            .state()
            .invocations
            .push((module_id.to_string(), params.clone()));

        let mut handler = self
            .hub
            .invoke_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match handler.as_mut() {
            Some(handler) => handler(module_id, &params),
            None => Ok(MethodResponse::new(200, json!({}))),
        }
    }

    fn on_method(&self, method_name: &str) {
        let mut state = self.hub.state();
        if !state.registered_methods.iter().any(|m| m == method_name) {
            state.registered_methods.push(method_name.to_string());
        }
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn remove_all_listeners(&self) {
        let mut state = self.hub.state();
        if state.generation == self.generation {
            state.event_tx = None;
        }
    }
}

struct MemoryTwin {
    hub: Arc<MemoryHub>,
    desired: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

#[async_trait]
impl ModuleTwin for MemoryTwin {
    async fn update_reported(&self, patch: Value) -> Result<()> {
        self.hub.state().reported.push(patch);
        Ok(())
    }

    fn take_desired_updates(&self) -> Option<mpsc::UnboundedReceiver<Value>> {
        self.desired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn remove_all_listeners(&self) {
        self.hub.state().desired_tx = None;
    }
}
