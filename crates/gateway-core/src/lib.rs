//! Gateway Core - module lifecycle and large-payload plumbing for IoT Edge gateways.
//!
//! The transport between an edge module and the cloud caps every message and
//! every direct method response at a small size. This crate moves payloads of
//! any size across it:
//!
//! - [`ChunkedMethodClient`] runs a submit-then-poll RPC against an adapter
//!   module, with gzip + base64 request and response bodies.
//! - [`StreamingUploader`] turns a byte source into a sequence of bounded,
//!   compressed telemetry chunks followed by one status message.
//! - [`ModuleLifecycle`] owns the connection, the twin, direct method
//!   dispatch, health checks and supervised restarts.
//!
//! The device SDK itself sits behind the traits in [`transport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_core::{ModuleLifecycle, HealthConfig};
//!
//! let lifecycle = ModuleLifecycle::builder(connector, service).build()?;
//! lifecycle.start().await?;
//! lifecycle.spawn_health_monitor(HealthConfig::CHECK_INTERVAL);
//! ```

pub mod chunked_rpc;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod logging;
pub mod retry;
pub mod settings;
pub mod size_budget;
pub mod system;
pub mod transport;
pub mod upload;

// Re-export commonly used types
pub use chunked_rpc::{AdapterInvoker, ChunkResult, ChunkedMethodClient, MethodInvoker};
pub use command::{method_handler, CommandResponse, DirectMethodHandler};
pub use config::{
    ChunkedRpcConfig, HealthConfig, LifecycleConfig, ModuleEnvironment, TransportConfig,
    UploadConfig,
};
pub use error::{GatewayError, Result};
pub use health::HealthState;
pub use lifecycle::{ConnectionState, ModuleHooks, ModuleLifecycle, ModuleLifecycleBuilder};
pub use settings::ModuleSettings;
pub use size_budget::{compute_chunk_budget, ChunkBudget};
pub use transport::{
    ClientEvent, Message, MethodParams, MethodRequest, MethodResponse, ModuleClient, ModuleTwin,
    TransportConnector,
};
pub use upload::{ChunkAccumulator, MessageSink, StreamingUploader, UploadJob, UploadStatus};
