//! Values that cross the transport seam.

use crate::config::TransportConfig;
use crate::error::Result;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// One telemetry or module-to-module message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    /// Application properties, sent alongside the body.
    pub properties: BTreeMap<String, String>,
}

impl Message {
    /// A UTF-8 JSON message.
    pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<Self> {
        Ok(Self {
            body: Bytes::from(serde_json::to_vec(data)?),
            content_type: Some(TransportConfig::CONTENT_TYPE_JSON.to_string()),
            content_encoding: Some(TransportConfig::CONTENT_ENCODING_UTF8.to_string()),
            properties: BTreeMap::new(),
        })
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Parse the body as JSON.
    pub fn body_json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Parameters for invoking a direct method on another module.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodParams {
    pub method_name: String,
    pub payload: Value,
    #[serde(
        rename = "connectTimeoutInSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub connect_timeout_secs: Option<u32>,
    #[serde(
        rename = "responseTimeoutInSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_timeout_secs: Option<u32>,
}

impl MethodParams {
    pub fn new(method_name: impl Into<String>, payload: Value) -> Self {
        Self {
            method_name: method_name.into(),
            payload,
            connect_timeout_secs: None,
            response_timeout_secs: None,
        }
    }

    pub fn with_timeouts(mut self, connect_secs: Option<u32>, response_secs: Option<u32>) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.response_timeout_secs = response_secs;
        self
    }
}

/// Status and payload of a direct method call, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodResponse {
    pub status: u16,
    pub payload: Value,
}

impl MethodResponse {
    pub fn new(status: u16, payload: Value) -> Self {
        Self { status, payload }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An inbound direct method call.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRequest {
    pub method_name: String,
    pub payload: Value,
}

impl MethodRequest {
    pub fn new(method_name: impl Into<String>, payload: Value) -> Self {
        Self {
            method_name: method_name.into(),
            payload,
        }
    }
}

/// Events a live client delivers to its owner.
#[derive(Debug)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Error(String),
    /// Message from another module routed to one of our inputs.
    InputMessage { input_name: String, message: Message },
    /// Direct method call for a registered method name. The response goes
    /// back through `responder`.
    MethodCall {
        request: MethodRequest,
        responder: oneshot::Sender<MethodResponse>,
    },
}
