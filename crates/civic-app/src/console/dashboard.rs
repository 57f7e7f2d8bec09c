use std::sync::{Arc, Mutex, PoisonError};

use civic_startup::ui::{
    ui_progress, AsyncOperation, ObservableCollection, OperationOutcome, OperationProgress,
    UiDispatcher,
};
use tokio_util::sync::CancellationToken;

use crate::services::{FundCache, FundSummary};

/// Backs the dashboard: the fund list plus a status line.
pub struct DashboardViewModel {
    funds: ObservableCollection<FundSummary>,
    cache: Arc<FundCache>,
    loader: AsyncOperation,
    ui: UiDispatcher,
    status: Arc<Mutex<String>>,
}

impl DashboardViewModel {
    pub fn new(cache: Arc<FundCache>, ui: UiDispatcher, parent: &CancellationToken) -> Self {
        Self {
            funds: ObservableCollection::new(ui.clone()),
            cache,
            loader: AsyncOperation::new("dashboard", parent),
            ui,
            status: Arc::new(Mutex::new(String::from("Not loaded"))),
        }
    }

    pub fn funds(&self) -> &ObservableCollection<FundSummary> {
        &self.funds
    }

    /// Last progress message, updated on the UI thread.
    pub fn status(&self) -> String {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_busy()
    }

    /// Fill the fund list from the cache, priming it first if startup did not.
    pub async fn load(&self) -> Result<OperationOutcome<usize>, String> {
        let status = self.status.clone();
        let progress = ui_progress(self.ui.clone(), move |p: OperationProgress| {
            *status.lock().unwrap_or_else(PoisonError::into_inner) = p.message;
        });
        let cache = self.cache.clone();
        let funds = self.funds.clone();

        self.loader
            .execute("load-funds", Some(progress), move |op| async move {
                op.report(10, "Reading funds");
                if !cache.is_primed() {
                    cache.prime().await?;
                }
                if op.is_cancelled() {
                    return Err("dashboard closed".to_string());
                }
                let items = cache.funds();
                let count = items.len();
                funds.replace_all(items);
                op.report(100, format!("{count} funds"));
                Ok(count)
            })
            .await
    }

    /// Cancel loading. Called when the owning window closes.
    pub fn dispose(&self) {
        self.loader.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_startup::ui::{CollectionChange, UiLoop};
    use std::time::Duration;

    fn cache_with(dir: &tempfile::TempDir, ledger: &str) -> Arc<FundCache> {
        let path = dir.path().join("funds.csv");
        std::fs::write(&path, ledger).unwrap();
        Arc::new(FundCache::new(path))
    }

    #[tokio::test]
    async fn load_fills_the_collection_on_the_ui_thread() {
        let ui = UiLoop::spawn("ui-dashboard").unwrap();
        let dispatcher = ui.dispatcher();
        let dir = tempfile::tempdir().unwrap();
        let model = DashboardViewModel::new(
            cache_with(&dir, "100,General,10\n200,Water,20\n"),
            dispatcher.clone(),
            &CancellationToken::new(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer_ui = dispatcher.clone();
        let sink = seen.clone();
        model.funds().subscribe(move |change: &CollectionChange<FundSummary>| {
            if let CollectionChange::Reset { items } = change {
                sink.lock().unwrap().push((items.len(), observer_ui.is_ui_thread()));
            }
        });

        let outcome = model.load().await.unwrap();

        assert_eq!(outcome.completed(), Some(2));
        assert_eq!(model.funds().len(), 2);
        // Flush the UI queue behind the notifications.
        dispatcher.run_on_ui_async(|| ()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(2, true)]);
        assert_eq!(model.status(), "2 funds");
    }

    #[tokio::test]
    async fn disposed_model_does_not_load() {
        let ui = UiLoop::spawn("ui-dashboard-disposed").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let model = DashboardViewModel::new(
            cache_with(&dir, "100,General,10\n"),
            ui.dispatcher(),
            &CancellationToken::new(),
        );

        model.dispose();
        let outcome = model.load().await.unwrap();

        assert!(outcome.is_cancelled());
        assert!(model.funds().is_empty());
        assert!(!model.is_loading());
    }

    #[tokio::test]
    async fn bad_ledger_reports_the_error() {
        let ui = UiLoop::spawn("ui-dashboard-error").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let model = DashboardViewModel::new(
            cache_with(&dir, "not,a,number\n"),
            ui.dispatcher(),
            &CancellationToken::new(),
        );

        let err = tokio::time::timeout(Duration::from_secs(5), model.load())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.contains("bad amount"), "{err}");
    }
}
