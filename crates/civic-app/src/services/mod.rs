//! Application services and their registration modules.

pub mod funds;
pub mod license;
pub mod settings;
pub mod templates;

use std::sync::Arc;

use civic_config::LayeredConfig;
use civic_startup::services::ServiceCollection;
use civic_startup::ui::UiDispatcher;
use civic_startup::{module_fn, ServiceModule};
use tokio_util::sync::CancellationToken;

use crate::console::DashboardViewModel;
use crate::paths::AppPaths;

pub use funds::{FundCache, FundSummary};
pub use license::{LicenseStatus, LicenseVerifier};
pub use settings::{MigrationOutcome, SettingsMigrator};
pub use templates::ReportTemplates;

/// Paths, license, settings, fund cache and report templates.
pub fn core_module() -> impl ServiceModule {
    module_fn("core", |services: &mut ServiceCollection, config: &LayeredConfig| {
        let paths = Arc::new(AppPaths::from_config(config.config()));
        tracing::debug!(data_dir = %paths.data_dir().display(), "data directory resolved");

        services
            .register_instance(paths)
            .register_singleton(|r| Ok(LicenseVerifier::new(r.resolve::<AppPaths>()?.license_file())))
            .register_singleton(|r| {
                let paths = r.resolve::<AppPaths>()?;
                Ok(SettingsMigrator::new(
                    paths.legacy_settings_file(),
                    paths.settings_file(),
                ))
            })
            .register_singleton(|r| Ok(FundCache::new(r.resolve::<AppPaths>()?.fund_ledger())))
            .register_singleton(|r| Ok(ReportTemplates::new(r.resolve::<AppPaths>()?.templates_dir())));
        Ok(())
    })
}

/// View models, one set per window scope.
pub fn dashboard_module(ui: UiDispatcher, root: CancellationToken) -> impl ServiceModule {
    module_fn(
        "dashboard",
        move |services: &mut ServiceCollection, _: &LayeredConfig| {
            let ui = ui.clone();
            let root = root.clone();
            services.register_scoped(move |r| {
                Ok(DashboardViewModel::new(
                    r.resolve::<FundCache>()?,
                    ui.clone(),
                    &root,
                ))
            });
            Ok(())
        },
    )
}
