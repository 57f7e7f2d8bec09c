mod bootstrap;
mod checks;
mod cli;
mod console;
mod crash_report;
mod paths;
mod plan;
mod services;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use civic_startup::diagnostics::{self, LogControl};
use civic_startup::ui::{UiDispatcher, UiLoop};
use civic_startup::{StartupContext, StartupOrchestrator};

use crate::plan::{CivicPlan, PlanOptions};

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let path = crash_report::write_crash_report(info);

        eprintln!("\n--- Civic crashed ---");
        if let Some(p) = &path {
            eprintln!("Crash report written to: {}", p.display());
        }
        eprintln!("Please send this report to your IT department.");
        eprintln!("---------------------\n");

        default_hook(info);
    }));
}

/// Stops the UI loop when the driver task ends, panics included.
struct StopUiOnDrop(UiDispatcher);

impl Drop for StopUiOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

fn main() -> ExitCode {
    install_panic_hook();

    let args = cli::parse();

    let log_control = match diagnostics::init_logging(&args.logging_options()) {
        Ok(control) => control,
        Err(e) => {
            eprintln!("civic: {e}");
            LogControl::disabled()
        }
    };
    tracing::info!("Civic v{} starting", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("civic-worker")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("civic: could not start the async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let (ui_loop, ui) = UiLoop::new();
    let ctx = StartupContext::new(ui.clone());
    let plan = CivicPlan::new(
        PlanOptions::from_args(&args),
        &ctx,
        runtime.handle().clone(),
        log_control,
    );
    let orchestrator = StartupOrchestrator::new(Arc::new(plan));

    let smoke_test = args.smoke_test;
    let driver = runtime.spawn(async move {
        let _stop = StopUiOnDrop(ui);
        if smoke_test {
            smoke(&orchestrator, &ctx).await
        } else {
            run(&orchestrator, &ctx).await
        }
    });

    // The main thread is the UI thread from here until the driver finishes.
    ui_loop.run();

    let code = match runtime.block_on(driver) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "startup driver ended abnormally");
            1
        }
    };
    runtime.shutdown_timeout(Duration::from_secs(2));
    tracing::info!(exit_code = code, "shutdown complete");
    ExitCode::from(code)
}

/// Full startup, then run until Ctrl-C.
async fn run(orchestrator: &StartupOrchestrator, ctx: &StartupContext) -> u8 {
    let interrupt = ctx.root().clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received");
                interrupt.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    let app = match orchestrator.run(ctx).await {
        Ok(app) => app,
        Err(failure) => {
            eprintln!("civic: {failure}");
            return failure.exit_code();
        }
    };
    if app.is_degraded() {
        tracing::warn!(reasons = ?app.warnings(), "running in degraded mode");
    }

    ctx.root().cancelled().await;

    match app.shutdown().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("civic: shutdown failed: {e}");
            e.exit_code()
        }
    }
}

async fn smoke(orchestrator: &StartupOrchestrator, ctx: &StartupContext) -> u8 {
    match orchestrator.smoke_test(ctx).await {
        Ok(elapsed) => {
            println!("smoke test passed in {} ms", elapsed.as_millis());
            0
        }
        Err(failure) => {
            eprintln!("civic: {failure}");
            failure.exit_code()
        }
    }
}
