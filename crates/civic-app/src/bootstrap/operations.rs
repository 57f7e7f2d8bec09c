//! Independent bootstrap work run before the ordered tasks.

use std::sync::Arc;

use civic_startup::ParallelOperation;

use crate::paths::AppPaths;
use crate::services::ReportTemplates;

pub fn operations(paths: Arc<AppPaths>, templates: Arc<ReportTemplates>) -> Vec<ParallelOperation> {
    vec![ensure_data_dirs(paths), warm_report_templates(templates)]
}

/// Creates the data directory tree. Fail-fast.
fn ensure_data_dirs(paths: Arc<AppPaths>) -> ParallelOperation {
    ParallelOperation::new("ensure-data-dirs", move |token| async move {
        for dir in paths.required_dirs() {
            if token.is_cancelled() {
                return Err("cancelled".to_string());
            }
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| format!("cannot create {}: {e}", dir.display()))?;
        }
        Ok(())
    })
    .fail_fast()
}

fn warm_report_templates(templates: Arc<ReportTemplates>) -> ParallelOperation {
    ParallelOperation::new("warm-report-templates", move |token| async move {
        let count = templates.warm(&token).await?;
        tracing::debug!(count, "report templates ready");
        Ok(())
    })
}
