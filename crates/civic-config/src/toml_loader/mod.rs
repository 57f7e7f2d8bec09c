//! TOML config file loading and creation.

mod loader;
mod paths;
mod template;

#[cfg(test)]
mod tests;

pub use loader::{load_from_path, load_table};
pub use paths::{create_default_config, default_config_path, environment_config_path};
pub use template::default_config_toml;
