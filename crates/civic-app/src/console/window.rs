use std::sync::Arc;

use civic_common::{Notification, NotificationLevel, NotificationQueue};
use civic_startup::services::ServiceScope;
use civic_startup::ui::{CollectionChange, OperationOutcome};
use civic_startup::{CompletionSignal, MainWindow, WindowError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::{Console, DashboardViewModel};
use crate::services::FundSummary;

const WIDTH: usize = 56;

/// The dashboard, drawn as text. Owns its service scope.
pub struct ConsoleWindow {
    scope: Option<ServiceScope>,
    dashboard: Arc<DashboardViewModel>,
    notifications: NotificationQueue,
    rendered: CompletionSignal<()>,
    console: Console,
    runtime: Handle,
    subscription: Option<u64>,
    loading: Option<JoinHandle<()>>,
}

impl ConsoleWindow {
    pub fn open(scope: ServiceScope, console: Console, runtime: Handle) -> Result<Self, WindowError> {
        let dashboard = scope.resolve::<DashboardViewModel>()?;
        Ok(Self {
            scope: Some(scope),
            dashboard,
            notifications: NotificationQueue::default(),
            rendered: CompletionSignal::new(),
            console,
            runtime,
            subscription: None,
            loading: None,
        })
    }

    pub fn notifications(&mut self) -> &mut NotificationQueue {
        &mut self.notifications
    }
}

impl MainWindow for ConsoleWindow {
    fn show(&mut self) -> Result<(), WindowError> {
        self.console.line("=".repeat(WIDTH));
        let title = format!("Civic Budget Desktop {}", env!("CARGO_PKG_VERSION"));
        self.console.line(format!("{title:^width$}", width = WIDTH));
        self.console.line("=".repeat(WIDTH));
        Ok(())
    }

    fn layout(&mut self) {
        self.console
            .line(format!("{:<8} {:<28} {:>18}", "Fund", "Name", "Appropriated"));
        self.console.line("-".repeat(WIDTH));
    }

    fn activate(&mut self) {
        let console = self.console.clone();
        self.subscription = Some(self.dashboard.funds().subscribe(
            move |change: &CollectionChange<FundSummary>| match change {
                CollectionChange::Reset { items } if items.is_empty() => {
                    console.line("  (no funds in the ledger yet)");
                }
                CollectionChange::Reset { items } | CollectionChange::Added { items, .. } => {
                    for fund in items {
                        console.line(row(fund));
                    }
                }
                CollectionChange::Replaced { new, .. } => console.line(row(new)),
                CollectionChange::Removed { item, .. } => {
                    console.line(format!("  fund {} removed", item.code));
                }
            },
        ));

        let dashboard = self.dashboard.clone();
        let console = self.console.clone();
        self.loading = Some(self.runtime.spawn(async move {
            match dashboard.load().await {
                Ok(OperationOutcome::Completed(count)) => {
                    tracing::info!(count, "dashboard loaded");
                }
                Ok(OperationOutcome::Cancelled) => {}
                Err(e) => console.line(format!("  dashboard unavailable: {e}")),
            }
        }));

        self.console.line("  Loading funds...");
        if self.rendered.complete(()).is_err() {
            tracing::debug!("first render already reported");
        }
    }

    fn first_render(&self) -> CompletionSignal<()> {
        self.rendered.clone()
    }

    fn notify(&mut self, notification: Notification) {
        let level = match notification.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        };
        self.console.line(format!(
            "  [{level}] {}: {}",
            notification.title, notification.body
        ));
        self.notifications.push(notification);
    }

    fn close(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.dashboard.funds().unsubscribe(id);
        }
        self.dashboard.dispose();
        if let Some(task) = self.loading.take() {
            task.abort();
        }
        if let Some(scope) = self.scope.take() {
            scope.dispose();
        }
        self.console.line("-".repeat(WIDTH));
        self.console.line("Civic closed.");
    }
}

fn row(fund: &FundSummary) -> String {
    format!(
        "{:<8} {:<28} {:>18}",
        fund.code,
        truncate(&fund.name, 28),
        fund.appropriated_display()
    )
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
