//! Direct method command results and handlers.

use crate::error::GatewayError;
use crate::transport::{MethodRequest, MethodResponse};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Async handler registered for one direct method name.
pub type DirectMethodHandler =
    Arc<dyn Fn(MethodRequest) -> BoxFuture<'static, CommandResponse> + Send + Sync>;

/// Wrap an async closure as a [`DirectMethodHandler`].
pub fn method_handler<F, Fut>(handler: F) -> DirectMethodHandler
where
    F: Fn(MethodRequest) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = CommandResponse> + Send + 'static,
{
    Arc::new(move |request| Box::pin(handler(request)))
}

/// Result of a module command, also the body of every direct method reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CommandResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            payload: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(200, message)
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, message)
    }

    /// Response for a failed operation, status taken from the error.
    pub fn from_error(context: &str, error: &GatewayError) -> Self {
        Self::new(error.status_code(), format!("{}: {}", context, error))
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Direct method reply: same status outside and inside.
    pub fn into_method_response(self) -> MethodResponse {
        let status = self.status;
        let payload = serde_json::to_value(&self).unwrap_or(Value::Null);
        MethodResponse::new(status, payload)
    }
}
