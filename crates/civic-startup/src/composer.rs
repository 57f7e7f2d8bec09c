//! Configuration loading and service graph composition.

use std::sync::Arc;

use civic_common::StartupError;
use civic_config::{CivicConfig, ConfigBuilder, LayeredConfig};

use crate::diagnostics::LogControl;
use crate::services::{ServiceCollection, ServiceProvider};

/// A group of related registrations, e.g. storage or dashboard services.
pub trait ServiceModule: Send + Sync {
    fn name(&self) -> &str;

    fn register(
        &self,
        services: &mut ServiceCollection,
        config: &LayeredConfig,
    ) -> Result<(), StartupError>;
}

/// [`ServiceModule`] from a closure.
pub struct FnModule<F> {
    name: String,
    register: F,
}

pub fn module_fn<F>(name: impl Into<String>, register: F) -> FnModule<F>
where
    F: Fn(&mut ServiceCollection, &LayeredConfig) -> Result<(), StartupError> + Send + Sync,
{
    FnModule {
        name: name.into(),
        register,
    }
}

impl<F> ServiceModule for FnModule<F>
where
    F: Fn(&mut ServiceCollection, &LayeredConfig) -> Result<(), StartupError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn register(
        &self,
        services: &mut ServiceCollection,
        config: &LayeredConfig,
    ) -> Result<(), StartupError> {
        (self.register)(services, config)
    }
}

/// The output of composition: validated configuration and service graph.
#[derive(Clone)]
pub struct Composition {
    pub config: Arc<LayeredConfig>,
    pub provider: ServiceProvider,
}

impl Composition {
    pub fn settings(&self) -> &CivicConfig {
        self.config.config()
    }
}

/// Loads configuration, applies logging settings, registers every module and
/// validates the resulting graph.
pub struct ApplicationComposer {
    builder: Option<ConfigBuilder>,
    loaded: Option<LayeredConfig>,
    modules: Vec<Box<dyn ServiceModule>>,
    log_control: LogControl,
}

impl ApplicationComposer {
    pub fn new(builder: ConfigBuilder) -> Self {
        Self {
            builder: Some(builder),
            loaded: None,
            modules: Vec::new(),
            log_control: LogControl::disabled(),
        }
    }

    /// Compose against configuration that is already loaded.
    pub fn with_config(config: LayeredConfig) -> Self {
        Self {
            builder: None,
            loaded: Some(config),
            modules: Vec::new(),
            log_control: LogControl::disabled(),
        }
    }

    pub fn log_control(mut self, control: LogControl) -> Self {
        self.log_control = control;
        self
    }

    pub fn module(mut self, module: impl ServiceModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Load configuration ahead of [`compose`](Self::compose), e.g. to
    /// configure the splash. Blocking; later calls reuse the result.
    pub fn load_config(&mut self) -> Result<&LayeredConfig, StartupError> {
        let config = self.take_config()?;
        Ok(self.loaded.insert(config))
    }

    fn take_config(&mut self) -> Result<LayeredConfig, StartupError> {
        if let Some(config) = self.loaded.take() {
            return Ok(config);
        }
        let builder = self.builder.take().unwrap_or_default();
        builder.build().map_err(|e| {
            tracing::error!(error = %e, "configuration could not be loaded");
            StartupError::Config(e)
        })
    }

    /// Blocking: reads configuration files. Run off the async workers.
    pub fn compose(mut self) -> Result<Composition, StartupError> {
        let config = self.take_config()?;

        if let Err(e) = self.log_control.apply(&config.config().logging) {
            tracing::warn!(error = %e, "logging section not applied");
        }
        tracing::info!(
            sources = ?config.sources(),
            environment = config.environment().unwrap_or("default"),
            "configuration loaded"
        );

        let config = Arc::new(config);
        let mut services = ServiceCollection::new();
        services
            .register_instance(config.clone())
            .register_instance(Arc::new(config.config().clone()));

        let mut failures = Vec::new();
        for module in &self.modules {
            match module.register(&mut services, &config) {
                Ok(()) => tracing::debug!(module = module.name(), "service module registered"),
                Err(e) => {
                    tracing::error!(module = module.name(), error = %e, "service module failed");
                    failures.push(format!("module {}: {e}", module.name()));
                }
            }
        }

        let provider = services.build();
        if let Err(mut graph_failures) = provider.validate_all() {
            failures.append(&mut graph_failures);
        }
        if !failures.is_empty() {
            return Err(StartupError::Composition(failures));
        }

        Ok(Composition { config, provider })
    }
}
