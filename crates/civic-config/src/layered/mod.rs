//! Layered configuration with deterministic later-wins precedence.

mod builder;
mod merge;
mod sources;

#[cfg(test)]
mod tests;

pub use builder::{ConfigBuilder, LayeredConfig};
pub use sources::{MapSecretStore, SecretStore, ENV_PREFIX};
