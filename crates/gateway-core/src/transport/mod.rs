//! Seam between the module lifecycle and the IoT Edge device SDK.
//!
//! The lifecycle only talks to these traits. A connector creates one
//! [`ModuleClient`] per connection attempt; the client hands out its event
//! stream once, and the twin hands out its desired-property stream once.
//! The first item on the desired stream must be the full desired document,
//! later items are patches.

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod message;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, MemoryHub, SentMessage};
pub use message::{ClientEvent, Message, MethodParams, MethodRequest, MethodResponse};

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Creates module clients from the environment the edge runtime provides.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn create_client(&self) -> Result<Arc<dyn ModuleClient>>;
}

/// One connection to the edge hub.
#[async_trait]
pub trait ModuleClient: Send + Sync {
    async fn open(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Send telemetry on the default output.
    async fn send_event(&self, message: Message) -> Result<()>;

    /// Send telemetry on a named output.
    async fn send_output_event(&self, output_name: &str, message: Message) -> Result<()>;

    async fn get_twin(&self) -> Result<Arc<dyn ModuleTwin>>;

    /// Invoke a direct method on another module of the same device.
    async fn invoke_method(
        &self,
        device_id: &str,
        module_id: &str,
        params: MethodParams,
    ) -> Result<MethodResponse>;

    /// Start delivering calls for `method_name` as [`ClientEvent::MethodCall`].
    fn on_method(&self, method_name: &str);

    /// Take the event stream. Returns `None` after the first call.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>>;

    /// Stop delivering events of any kind.
    fn remove_all_listeners(&self);
}

/// Device twin of the module.
#[async_trait]
pub trait ModuleTwin: Send + Sync {
    async fn update_reported(&self, patch: Value) -> Result<()>;

    /// Take the desired-property stream. Returns `None` after the first call.
    fn take_desired_updates(&self) -> Option<mpsc::UnboundedReceiver<Value>>;

    fn remove_all_listeners(&self);
}
