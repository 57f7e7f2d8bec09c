//! Non-file config layers: environment variables and secret stores.

use std::collections::BTreeMap;

use civic_common::ConfigError;
use toml::Table;

use super::merge::{insert_path, parse_scalar};

/// Default prefix for environment overrides: `CIVIC__STORAGE__MANDATORY`.
pub const ENV_PREFIX: &str = "CIVIC__";

/// A source of secret values (connection strings, API keys), applied as the
/// last config layer. Keys are dotted config paths such as
/// `storage.connection_string`.
pub trait SecretStore: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self) -> Result<Vec<(String, String)>, ConfigError>;
}

/// In-memory secret store, for tests and for secrets handed over by a
/// launcher process.
#[derive(Debug, Default, Clone)]
pub struct MapSecretStore {
    name: String,
    values: BTreeMap<String, String>,
}

impl MapSecretStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SecretStore for MapSecretStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<(String, String)>, ConfigError> {
        Ok(self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Build a layer from `PREFIX`-ed environment variables. Double underscores
/// separate path segments; segments are lowercased.
pub(crate) fn env_layer<I>(vars: I, prefix: &str) -> Table
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut table = Table::new();
    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        let path: Vec<String> = rest
            .split("__")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if path.is_empty() {
            continue;
        }
        insert_path(&mut table, &path, parse_scalar(&value));
    }
    table
}

/// Build a layer from a secret store. Secret values are always strings.
pub(crate) fn secret_layer(store: &dyn SecretStore) -> Result<Table, ConfigError> {
    let entries = store
        .load()
        .map_err(|e| ConfigError::SourceError(format!("secret store '{}': {e}", store.name())))?;

    let mut table = Table::new();
    for (key, value) in entries {
        let path: Vec<String> = key
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if path.is_empty() {
            continue;
        }
        insert_path(&mut table, &path, toml::Value::String(value));
    }
    Ok(table)
}
