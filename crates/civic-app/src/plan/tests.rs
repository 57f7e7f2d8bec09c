use std::path::Path;

use civic_common::{StartupError, StartupPhase};
use civic_startup::ui::{UiLoop, UiThread};
use civic_startup::StartupOrchestrator;

use super::*;
use crate::console::{captured, text};

struct Harness {
    _ui: UiThread,
    _dir: tempfile::TempDir,
    ctx: StartupContext,
    orchestrator: StartupOrchestrator,
    window: Arc<std::sync::Mutex<Vec<u8>>>,
    splash: Arc<std::sync::Mutex<Vec<u8>>>,
}

fn write_config(root: &Path) -> PathBuf {
    let config = root.join("config.toml");
    std::fs::write(
        &config,
        format!(
            "[storage]\ndata_dir = '{}'\n\n[logging]\ndirectory = '{}'\n\n[telemetry]\nenabled = false\n",
            root.join("data").display(),
            root.join("logs").display(),
        ),
    )
    .unwrap();
    config
}

fn harness(prepare: impl FnOnce(&Path), allow_degraded: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    prepare(&data);

    let ui = UiLoop::spawn("ui-plan").unwrap();
    let ctx = StartupContext::new(ui.dispatcher());
    let options = PlanOptions {
        config_path: Some(write_config(dir.path())),
        environment: None,
        allow_degraded,
    };
    let (window_console, window) = captured();
    let (splash_console, splash) = captured();
    let plan = CivicPlan::new(options, &ctx, Handle::current(), LogControl::disabled())
        .with_consoles(window_console, splash_console);

    Harness {
        _ui: ui,
        _dir: dir,
        ctx,
        orchestrator: StartupOrchestrator::new(Arc::new(plan)),
        window,
        splash,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fresh_install_reaches_ready() {
    let h = harness(|_| {}, false);

    let app = h.orchestrator.run(&h.ctx).await.unwrap();

    assert_eq!(h.ctx.phases().current(), StartupPhase::Ready);
    assert!(!app.is_degraded(), "{:?}", app.warnings());
    let result = app.background_result().unwrap();
    let snapshot = result.health_snapshot.as_ref().unwrap();
    assert_eq!(snapshot.probes.len(), 3);
    assert!(text(&h.splash).starts_with("Civic "));

    app.shutdown().await.unwrap();
    let window = text(&h.window);
    assert!(window.contains("Civic Budget Desktop"));
    assert!(window.trim_end().ends_with("Civic closed."));
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_license_never_opens_the_window() {
    let h = harness(
        |data| {
            std::fs::write(
                data.join("license.toml"),
                "holder = \"Fairview\"\nexpires = \"2020-06-30\"\n",
            )
            .unwrap();
        },
        false,
    );

    let failure = h.orchestrator.run(&h.ctx).await.err().unwrap();

    assert_eq!(failure.error.task_name(), Some("verify-license"));
    assert_eq!(failure.exit_code(), 1);
    assert!(text(&h.window).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_schema_is_fatal_unless_degraded_is_allowed() {
    let newer = |data: &Path| std::fs::write(data.join("schema_version"), "99\n").unwrap();

    let strict = harness(newer, false);
    let failure = strict.orchestrator.run(&strict.ctx).await.err().unwrap();
    assert!(matches!(failure.error, StartupError::Background { .. }));
    assert!(failure.to_string().contains("newer release"), "{failure}");
    assert!(text(&strict.window).is_empty());

    let lenient = harness(newer, true);
    let app = lenient.orchestrator.run(&lenient.ctx).await.unwrap();
    assert!(app.is_degraded());
    assert!(app.warnings().iter().any(|w| w.contains("newer release")));
    app.shutdown().await.unwrap();
    assert!(text(&lenient.window).contains("[warning] Running in degraded mode"));
}

#[tokio::test(flavor = "multi_thread")]
async fn smoke_test_opens_and_closes_the_window() {
    let h = harness(|_| {}, false);

    h.orchestrator.smoke_test(&h.ctx).await.unwrap();

    let window = text(&h.window);
    assert!(window.contains("Loading funds"));
    assert!(window.trim_end().ends_with("Civic closed."));
    assert!(text(&h.splash).is_empty());
}

#[test]
fn allow_degraded_overrides_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let options = PlanOptions {
        config_path: Some(write_config(dir.path())),
        environment: None,
        allow_degraded: true,
    };
    let config = options.config_builder().build().unwrap();
    assert!(config.config().startup.allow_degraded);
    assert!(!config.config().telemetry.enabled);
}
