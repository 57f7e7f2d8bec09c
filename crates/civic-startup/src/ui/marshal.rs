//! The UI message loop and the dispatcher used to reach it.
//!
//! Exactly one thread runs [`UiLoop::run`]; that thread is "the UI thread".
//! Every UI-affine object (splash surface, main window, collection observers)
//! is only touched from jobs executed by this loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use civic_common::StartupError;
use tokio::sync::oneshot;

use crate::util::panic_message;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    #[error("ui loop is not running")]
    LoopClosed,

    #[error("ui action panicked: {0}")]
    Panicked(String),
}

impl From<MarshalError> for StartupError {
    fn from(e: MarshalError) -> Self {
        StartupError::Marshal(e.to_string())
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

enum UiMessage {
    Run(Job),
    Stop,
}

struct LoopState {
    ui_thread: OnceLock<ThreadId>,
    stopped: AtomicBool,
}

/// Handle for scheduling work on the UI thread. Cheap to clone.
#[derive(Clone)]
pub struct UiDispatcher {
    tx: mpsc::Sender<UiMessage>,
    state: Arc<LoopState>,
}

/// The receiving end of the UI queue. Consumed by [`UiLoop::run`].
pub struct UiLoop {
    rx: mpsc::Receiver<UiMessage>,
    state: Arc<LoopState>,
}

impl UiLoop {
    pub fn new() -> (UiLoop, UiDispatcher) {
        let (tx, rx) = mpsc::channel();
        let state = Arc::new(LoopState {
            ui_thread: OnceLock::new(),
            stopped: AtomicBool::new(false),
        });
        let dispatcher = UiDispatcher {
            tx,
            state: state.clone(),
        };
        (UiLoop { rx, state }, dispatcher)
    }

    /// Run jobs on the calling thread until [`UiDispatcher::stop`] is called
    /// or every dispatcher is dropped. The calling thread becomes the UI
    /// thread for the lifetime of the process.
    pub fn run(self) {
        let current = thread::current().id();
        if self.state.ui_thread.set(current).is_err() {
            tracing::warn!("ui loop restarted on a different thread");
        }
        tracing::debug!(thread = ?thread::current().name(), "ui loop running");

        let mut executed: u64 = 0;
        while let Ok(message) = self.rx.recv() {
            match message {
                UiMessage::Run(job) => {
                    executed += 1;
                    // Result-bearing jobs catch their own panics; this catches
                    // fire-and-forget posts.
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                        tracing::error!(
                            panic = %panic_message(payload.as_ref()),
                            "posted ui action panicked"
                        );
                    }
                }
                UiMessage::Stop => break,
            }
        }

        self.state.stopped.store(true, Ordering::SeqCst);
        tracing::debug!(executed, "ui loop stopped");
        // Dropping `rx` drops every queued job, which releases their reply
        // channels so pending callers observe `LoopClosed`.
    }

    /// Spawn a dedicated UI thread. Used by tests and headless tooling.
    pub fn spawn(name: &str) -> std::io::Result<UiThread> {
        let (ui_loop, dispatcher) = UiLoop::new();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || ui_loop.run())?;
        Ok(UiThread {
            dispatcher,
            handle: Some(handle),
        })
    }
}

impl UiDispatcher {
    /// Whether the calling thread is the UI thread.
    pub fn is_ui_thread(&self) -> bool {
        self.state.ui_thread.get() == Some(&thread::current().id())
    }

    pub fn is_running(&self) -> bool {
        !self.state.stopped.load(Ordering::SeqCst)
    }

    /// Queue `action` on the UI thread without waiting for it.
    pub fn post<F>(&self, action: F) -> Result<(), MarshalError>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_running() {
            return Err(MarshalError::LoopClosed);
        }
        self.tx
            .send(UiMessage::Run(Box::new(action)))
            .map_err(|_| MarshalError::LoopClosed)
    }

    /// Run `action` on the UI thread and return its result.
    ///
    /// Runs inline when already on the UI thread. From any other thread the
    /// caller blocks until the loop executes it; async code should prefer
    /// [`UiDispatcher::run_on_ui_async`] so a runtime worker is not parked.
    pub fn run_on_ui<F, R>(&self, action: F) -> Result<R, MarshalError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_thread() {
            return run_guarded(action);
        }
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.post(move || {
            let _ = reply_tx.send(run_guarded(action));
        })?;
        reply_rx.recv().map_err(|_| MarshalError::LoopClosed)?
    }

    /// Async form of [`UiDispatcher::run_on_ui`]: posts and awaits.
    pub async fn run_on_ui_async<F, R>(&self, action: F) -> Result<R, MarshalError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_thread() {
            return run_guarded(action);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(move || {
            let _ = reply_tx.send(run_guarded(action));
        })?;
        reply_rx.await.map_err(|_| MarshalError::LoopClosed)?
    }

    /// Ask the loop to exit after the jobs already queued.
    pub fn stop(&self) {
        let _ = self.tx.send(UiMessage::Stop);
    }
}

fn run_guarded<F, R>(action: F) -> Result<R, MarshalError>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(action))
        .map_err(|payload| MarshalError::Panicked(panic_message(payload.as_ref())))
}

/// A UI loop running on its own thread. Stops and joins on drop.
pub struct UiThread {
    dispatcher: UiDispatcher,
    handle: Option<JoinHandle<()>>,
}

impl UiThread {
    pub fn dispatcher(&self) -> UiDispatcher {
        self.dispatcher.clone()
    }

    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.dispatcher.stop();
            if handle.join().is_err() {
                tracing::error!("ui thread terminated abnormally");
            }
        }
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.join();
    }
}
