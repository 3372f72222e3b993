//! Gateway Proxy - OPC UA command proxy for an IoT Central edge gateway.
//!
//! [`ProxyGatewayService`] plugs into a `gateway_core::ModuleLifecycle` as its
//! hooks. It keeps the OPC UA endpoint settings, registers the cloud commands
//! and forwards each one to the adapter module on the same device, using the
//! chunked client for anything that may not fit in one direct method call.
//! Node discovery writes the browsed address space to a file and ships it back
//! as a large payload.
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_core::{HealthConfig, ModuleLifecycle};
//! use gateway_proxy::{ProxyConfig, ProxyGatewayService};
//!
//! let service = ProxyGatewayService::new(ProxyConfig::from_env());
//! let lifecycle = ModuleLifecycle::builder(connector, service).build()?;
//! lifecycle.start().await?;
//! lifecycle.spawn_health_monitor(HealthConfig::CHECK_INTERVAL);
//! ```

pub mod archive;
pub mod capability;
mod commands;
pub mod config;
pub mod node_file;
mod service;

pub use archive::{ArchiveOptions, ArchiveStore};
pub use config::{DiscoveryConfig, ProxyConfig};
pub use service::ProxyGatewayService;
