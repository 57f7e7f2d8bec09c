//! Assembles the config layers in precedence order.

use std::path::PathBuf;

use civic_common::ConfigError;
use serde::de::DeserializeOwned;
use toml::{Table, Value};
use tracing::{debug, info};

use crate::schema::CivicConfig;
use crate::toml_loader::{create_default_config, environment_config_path, load_table};
use crate::validation;

use super::merge::{lookup, merge_tables};
use super::sources::{env_layer, secret_layer, SecretStore, ENV_PREFIX};

/// Builds a [`LayeredConfig`] from, in increasing precedence:
///
/// 1. the base file (`config.toml`)
/// 2. the environment file (`config.<environment>.toml`), if present
/// 3. `CIVIC__`-prefixed environment variables
/// 4. an optional secret store
pub struct ConfigBuilder {
    base_file: Option<PathBuf>,
    create_if_missing: bool,
    environment: Option<String>,
    env_prefix: String,
    env_vars: Option<Vec<(String, String)>>,
    secret_store: Option<Box<dyn SecretStore>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            base_file: None,
            create_if_missing: false,
            environment: None,
            env_prefix: ENV_PREFIX.to_string(),
            env_vars: None,
            secret_store: None,
        }
    }

    pub fn base_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_file = Some(path.into());
        self
    }

    /// Write the documented default file when the base file is missing.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment.filter(|e| !e.is_empty());
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Use these variables instead of the process environment.
    pub fn env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn secret_store(mut self, store: impl SecretStore + 'static) -> Self {
        self.secret_store = Some(Box::new(store));
        self
    }

    pub fn build(self) -> Result<LayeredConfig, ConfigError> {
        let mut merged = Table::new();
        let mut sources = Vec::new();

        if let Some(base) = &self.base_file {
            match load_table(base) {
                Ok(table) => {
                    merge_tables(&mut merged, table);
                    sources.push(format!("file:{}", base.display()));
                }
                Err(ConfigError::FileNotFound(_)) if self.create_if_missing => {
                    info!("no config found at {}, creating default", base.display());
                    create_default_config(base)?;
                    merge_tables(&mut merged, load_table(base)?);
                    sources.push(format!("file:{}", base.display()));
                }
                Err(ConfigError::FileNotFound(_)) => {
                    debug!(path = %base.display(), "base config file missing, using defaults");
                }
                Err(e) => return Err(e),
            }

            if let Some(environment) = &self.environment {
                let path = environment_config_path(base, environment);
                match load_table(&path) {
                    Ok(table) => {
                        merge_tables(&mut merged, table);
                        sources.push(format!("file:{}", path.display()));
                    }
                    Err(ConfigError::FileNotFound(_)) => {
                        debug!(path = %path.display(), "no environment override file");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let vars = match self.env_vars {
            Some(vars) => vars,
            None => std::env::vars().collect(),
        };
        let env_table = env_layer(vars, &self.env_prefix);
        if !env_table.is_empty() {
            merge_tables(&mut merged, env_table);
            sources.push(format!("env:{}", self.env_prefix));
        }

        if let Some(store) = &self.secret_store {
            let secrets = secret_layer(store.as_ref())?;
            if !secrets.is_empty() {
                merge_tables(&mut merged, secrets);
            }
            sources.push(format!("secrets:{}", store.name()));
        }

        let config = CivicConfig::deserialize_from(merged.clone())?;
        validation::validate(&config)?;

        info!(sources = ?sources, "configuration assembled");
        Ok(LayeredConfig {
            merged,
            config,
            sources,
            environment: self.environment,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The merged configuration: typed view plus raw lookup by dotted path.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    merged: Table,
    config: CivicConfig,
    sources: Vec<String>,
    environment: Option<String>,
}

impl LayeredConfig {
    /// Configuration made only of schema defaults.
    pub fn defaults() -> Self {
        Self {
            merged: Table::new(),
            config: CivicConfig::default(),
            sources: Vec::new(),
            environment: None,
        }
    }

    pub fn config(&self) -> &CivicConfig {
        &self.config
    }

    /// Applied layers, lowest precedence first.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Raw table at a dotted path, as merged from the layers. Keys left to
    /// schema defaults are not present here; use [`LayeredConfig::config`].
    pub fn get_section(&self, path: &str) -> Option<&Table> {
        lookup(&self.merged, path)?.as_table()
    }

    pub fn get_value(&self, path: &str) -> Option<&Value> {
        lookup(&self.merged, path)
    }

    /// Typed lookup of a dotted path. `Ok(None)` when no layer set it.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ConfigError> {
        match self.get_value(path) {
            Some(value) => value
                .clone()
                .try_into::<T>()
                .map(Some)
                .map_err(|e| ConfigError::ParseError(format!("{path}: {e}"))),
            None => Ok(None),
        }
    }
}
