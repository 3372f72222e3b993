//! Builder for [`ModuleLifecycle`].

use super::{ExitHandler, ModuleHooks, ModuleLifecycle};
use crate::config::{LifecycleConfig, ModuleEnvironment, UploadConfig};
use crate::error::{GatewayError, Result};
use crate::transport::TransportConnector;
use crate::upload::StreamingUploader;
use std::sync::Arc;
use tracing::info;

/// Builder for configuring a [`ModuleLifecycle`].
///
/// # Example
///
/// ```rust,ignore
/// let lifecycle = ModuleLifecycle::builder(connector, service)
///     .config(LifecycleConfig::default().with_health_check_retries(5))
///     .environment(ModuleEnvironment::from_env())
///     .build()?;
/// lifecycle.start().await?;
/// ```
pub struct ModuleLifecycleBuilder {
    connector: Arc<dyn TransportConnector>,
    hooks: Arc<dyn ModuleHooks>,
    config: LifecycleConfig,
    upload_config: UploadConfig,
    environment: Option<ModuleEnvironment>,
    exit_handler: Option<ExitHandler>,
}

impl ModuleLifecycleBuilder {
    pub fn new(connector: Arc<dyn TransportConnector>, hooks: Arc<dyn ModuleHooks>) -> Self {
        Self {
            connector,
            hooks,
            config: LifecycleConfig::default(),
            upload_config: UploadConfig::default(),
            environment: None,
            exit_handler: None,
        }
    }

    pub fn config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn upload_config(mut self, config: UploadConfig) -> Self {
        self.upload_config = config;
        self
    }

    /// Default: [`ModuleEnvironment::from_env`].
    pub fn environment(mut self, environment: ModuleEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Called with the exit code when a restart is due.
    ///
    /// Default: `std::process::exit`.
    pub fn exit_handler(mut self, handler: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.exit_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Arc<ModuleLifecycle>> {
        let environment = self.environment.unwrap_or_else(ModuleEnvironment::from_env);

        let mut config = self.config;
        if let Some(retries) = environment.health_check_retries {
            info!("Health check retries set to {} from the environment", retries);
            config.health_check_retries = retries;
        }
        if config.health_check_retries == 0 {
            return Err(GatewayError::Config {
                message: "health_check_retries must be at least 1".into(),
            });
        }

        let upload_budget = StreamingUploader::budget_for(&self.upload_config)?;

        let exit_handler = self
            .exit_handler
            .unwrap_or_else(|| Arc::new(|code| std::process::exit(code)));

        Ok(Arc::new(ModuleLifecycle::new(
            self.connector,
            self.hooks,
            config,
            environment,
            self.upload_config,
            upload_budget,
            exit_handler,
        )))
    }
}
