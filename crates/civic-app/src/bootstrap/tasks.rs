//! Ordered startup tasks.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use civic_startup::tasks::{
    RegistrationError, StartupTask, StartupTaskDescriptor, StartupTaskRegistry, TaskContext,
    TaskError,
};

use crate::services::license::EXPIRY_WARNING_DAYS;
use crate::services::{FundCache, LicenseStatus, LicenseVerifier, MigrationOutcome, SettingsMigrator};

/// An expired or unreadable license stops startup.
pub struct VerifyLicense;

#[async_trait]
impl StartupTask for VerifyLicense {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        let verifier = ctx.resolve::<LicenseVerifier>()?;
        let today = Local::now().date_naive();
        match verifier
            .verify(today)
            .await
            .map_err(|e| TaskError::failed(e.to_string()))?
        {
            LicenseStatus::Community => {
                tracing::info!("no license installed, running the community edition");
            }
            LicenseStatus::Licensed {
                holder,
                seats,
                expires,
            } => {
                let days_left = (expires - today).num_days();
                if days_left <= EXPIRY_WARNING_DAYS {
                    tracing::warn!(%holder, %expires, days_left, "license expires soon");
                } else {
                    tracing::info!(%holder, seats, %expires, "license verified");
                }
            }
        }
        Ok(())
    }
}

pub struct MigrateUserSettings;

#[async_trait]
impl StartupTask for MigrateUserSettings {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        let migrator = ctx.resolve::<SettingsMigrator>()?;
        match migrator.migrate().await.map_err(TaskError::Failed)? {
            MigrationOutcome::Migrated { keys } => tracing::info!(keys, "legacy settings migrated"),
            outcome => tracing::debug!(?outcome, "no settings migration needed"),
        }
        Ok(())
    }
}

pub struct PrimeFundCache;

#[async_trait]
impl StartupTask for PrimeFundCache {
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        let cache = ctx.resolve::<FundCache>()?;
        let count = tokio::select! {
            _ = ctx.token().cancelled() => return Err(TaskError::Cancelled),
            primed = cache.prime() => primed.map_err(TaskError::Failed)?,
        };
        tracing::info!(count, "fund cache primed");
        Ok(())
    }
}

/// License first, then settings, then the fund cache.
pub fn register(registry: &mut StartupTaskRegistry) -> Result<(), RegistrationError> {
    registry
        .register(StartupTaskDescriptor::new("verify-license", 10), VerifyLicense)?
        .register(
            StartupTaskDescriptor::new("migrate-user-settings", 20).non_fatal(),
            MigrateUserSettings,
        )?
        .register(
            StartupTaskDescriptor::new("prime-fund-cache", 30)
                .non_fatal()
                .with_timeout(Duration::from_secs(10)),
            PrimeFundCache,
        )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::core_module;
    use civic_common::StartupError;
    use civic_config::ConfigBuilder;
    use civic_startup::ui::UiLoop;
    use civic_startup::{ApplicationComposer, Composition, StartupContext};

    fn composed(data_dir: &std::path::Path) -> Composition {
        let config = ConfigBuilder::new()
            .env_vars([("CIVIC__STORAGE__DATA_DIR", data_dir.display().to_string())])
            .build()
            .unwrap();
        ApplicationComposer::with_config(config)
            .module(core_module())
            .compose()
            .unwrap()
    }

    async fn run_all(data_dir: &std::path::Path) -> Result<Vec<String>, StartupError> {
        let ui = UiLoop::spawn("ui-tasks").unwrap();
        let ctx = StartupContext::new(ui.dispatcher());
        let composition = composed(data_dir);
        let mut registry = StartupTaskRegistry::new();
        register(&mut registry).unwrap();
        let report = registry.freeze().run(&ctx, &composition.provider).await?;
        Ok(report
            .warnings
            .iter()
            .map(|w| format!("{}: {}", w.task, w.reason))
            .collect())
    }

    #[test]
    fn tasks_register_in_order() {
        let mut registry = StartupTaskRegistry::new();
        register(&mut registry).unwrap();
        let names: Vec<_> = registry.descriptors().map(|d| d.name().to_string()).collect();
        assert_eq!(names, ["verify-license", "migrate-user-settings", "prime-fund-cache"]);
        let fatal: Vec<_> = registry.descriptors().map(|d| d.is_fatal()).collect();
        assert_eq!(fatal, [true, false, false]);
    }

    #[tokio::test]
    async fn fresh_install_starts_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let warnings = run_all(dir.path()).await.unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[tokio::test]
    async fn expired_license_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("license.toml"),
            "holder = \"Fairview\"\nexpires = \"2020-01-01\"\n",
        )
        .unwrap();

        let err = run_all(dir.path()).await.unwrap_err();
        assert_eq!(err.task_name(), Some("verify-license"));
        assert!(err.to_string().contains("expired"), "{err}");
    }

    #[tokio::test]
    async fn broken_ledger_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("funds.csv"), "100,General\n").unwrap();

        let warnings = run_all(dir.path()).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("prime-fund-cache:"), "{warnings:?}");
    }
}
