//! Latest-value progress reporting for the splash and the shell.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use civic_common::{new_correlation_id, StartupPhase};
use tokio::sync::watch;

use crate::ui::UiDispatcher;
use crate::util::panic_message;

/// One immutable progress report. A newer snapshot replaces an older one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub phase: StartupPhase,
    /// 0..=100.
    pub percentage: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    /// Monotonic per reporter; higher means newer.
    pub sequence: u64,
}

pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
    /// Set while a delivery is queued on the UI loop.
    pending: AtomicBool,
}

struct Inner {
    latest: watch::Sender<Option<Arc<ProgressSnapshot>>>,
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
    correlation_id: String,
    ui: UiDispatcher,
}

/// Accepts progress from any thread and delivers the newest snapshot to
/// subscribers on the UI thread.
///
/// Only the latest snapshot is kept. Each subscriber has at most one delivery
/// queued at a time and that delivery reads the latest value when it runs, so
/// bursts coalesce and the final delivery always carries the final report.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<Inner>,
}

impl ProgressReporter {
    pub fn new(ui: UiDispatcher) -> Self {
        Self::with_correlation_id(ui, new_correlation_id())
    }

    pub fn with_correlation_id(ui: UiDispatcher, correlation_id: impl Into<String>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                latest,
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                correlation_id: correlation_id.into(),
                ui,
            }),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.inner.correlation_id
    }

    /// Record a new snapshot. Percentages above 100 are clamped; a value lower
    /// than the previous one is accepted with a warning.
    pub fn report(
        &self,
        phase: StartupPhase,
        percentage: u8,
        message: impl Into<String>,
    ) -> Arc<ProgressSnapshot> {
        let percentage = percentage.min(100);
        let message = message.into();
        let mut regressed_from = None;
        let mut stored = None;

        self.inner.latest.send_modify(|slot| {
            let sequence = slot.as_ref().map_or(1, |prev| prev.sequence + 1);
            if let Some(prev) = slot.as_ref() {
                if percentage < prev.percentage {
                    regressed_from = Some(prev.percentage);
                }
            }
            let snapshot = Arc::new(ProgressSnapshot {
                phase,
                percentage,
                message: message.clone(),
                timestamp: Utc::now(),
                correlation_id: self.inner.correlation_id.clone(),
                sequence,
            });
            stored = Some(snapshot.clone());
            *slot = Some(snapshot);
        });

        if let Some(previous) = regressed_from {
            tracing::warn!(previous, percentage, message = %message, "startup progress went backwards");
        }
        tracing::debug!(
            phase = %phase,
            percentage,
            message = %message,
            correlation_id = %self.inner.correlation_id,
            "startup progress"
        );

        self.notify_all();
        match stored {
            Some(snapshot) => snapshot,
            // send_modify always runs the closure.
            None => Arc::new(ProgressSnapshot {
                phase,
                percentage,
                message,
                timestamp: Utc::now(),
                correlation_id: self.inner.correlation_id.clone(),
                sequence: 0,
            }),
        }
    }

    pub fn latest(&self) -> Option<Arc<ProgressSnapshot>> {
        self.inner.latest.borrow().clone()
    }

    /// Async observation without the UI thread.
    pub fn watch(&self) -> watch::Receiver<Option<Arc<ProgressSnapshot>>> {
        self.inner.latest.subscribe()
    }

    /// Deliver snapshots to `callback` on the UI thread. A late subscriber
    /// receives the current snapshot right away.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let subscriber = Arc::new(Subscriber {
            id,
            callback: Arc::new(callback),
            pending: AtomicBool::new(false),
        });
        if let Ok(mut subscribers) = self.inner.subscribers.write() {
            subscribers.push(subscriber.clone());
        }
        if self.latest().is_some() {
            self.schedule(&subscriber);
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.inner.subscribers.write() {
            Ok(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|s| s.id != id);
                subscribers.len() != before
            }
            Err(_) => false,
        }
    }

    fn notify_all(&self) {
        let subscribers: Vec<Arc<Subscriber>> = match self.inner.subscribers.read() {
            Ok(list) => list.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for subscriber in &subscribers {
            self.schedule(subscriber);
        }
    }

    fn schedule(&self, subscriber: &Arc<Subscriber>) {
        if subscriber.pending.swap(true, Ordering::SeqCst) {
            // A queued delivery will pick up the newest snapshot.
            return;
        }
        let inner = self.inner.clone();
        let target = subscriber.clone();
        let posted = self.inner.ui.post(move || deliver(&inner, &target));
        if posted.is_err() {
            subscriber.pending.store(false, Ordering::SeqCst);
            tracing::debug!("ui loop closed, dropping progress delivery");
        }
    }
}

/// Runs on the UI thread.
fn deliver(inner: &Inner, subscriber: &Subscriber) {
    // Clear first: a report racing with this delivery either is visible to
    // the read below or schedules a fresh delivery.
    subscriber.pending.store(false, Ordering::SeqCst);
    let still_subscribed = match inner.subscribers.read() {
        Ok(list) => list.iter().any(|s| s.id == subscriber.id),
        Err(_) => true,
    };
    if !still_subscribed {
        return;
    }
    let Some(snapshot) = inner.latest.borrow().clone() else {
        return;
    };
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(&snapshot))) {
        tracing::warn!(
            subscriber = subscriber.id,
            panic = %panic_message(payload.as_ref()),
            "progress subscriber panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::UiLoop;
    use std::sync::Mutex;

    #[test]
    fn keeps_only_the_latest_snapshot() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let reporter = ProgressReporter::with_correlation_id(ui.dispatcher(), "abcd1234");

        reporter.report(StartupPhase::Bootstrap, 5, "starting");
        let last = reporter.report(StartupPhase::Composed, 20, "services ready");

        let latest = reporter.latest().unwrap();
        assert_eq!(latest, last);
        assert_eq!(latest.sequence, 2);
        assert_eq!(latest.correlation_id, "abcd1234");
    }

    #[test]
    fn clamps_and_accepts_regressions() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let reporter = ProgressReporter::new(ui.dispatcher());

        assert_eq!(reporter.report(StartupPhase::Ready, 250, "over").percentage, 100);
        assert_eq!(reporter.report(StartupPhase::Ready, 40, "back").percentage, 40);
        assert_eq!(reporter.latest().unwrap().message, "back");
    }

    #[test]
    fn concurrent_reporters_end_on_the_last_value() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let dispatcher = ui.dispatcher();
        let reporter = ProgressReporter::new(dispatcher.clone());

        let seen = Arc::new(Mutex::new(Vec::<Arc<ProgressSnapshot>>::new()));
        let off_thread = Arc::new(AtomicBool::new(false));
        {
            let seen = seen.clone();
            let off_thread = off_thread.clone();
            let d = dispatcher.clone();
            reporter.subscribe(move |snapshot| {
                if !d.is_ui_thread() {
                    off_thread.store(true, Ordering::SeqCst);
                }
                seen.lock().unwrap().push(Arc::new(snapshot.clone()));
            });
        }

        let workers: Vec<_> = (0..6)
            .map(|t| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    for i in 0..200u32 {
                        reporter.report(
                            StartupPhase::TasksRunning,
                            (i % 100) as u8,
                            format!("worker {t} step {i}"),
                        );
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        let final_report = reporter.report(StartupPhase::Ready, 100, "ready");
        dispatcher.run_on_ui(|| ()).unwrap();

        let seen = seen.lock().unwrap();
        let last_seen = seen.last().unwrap();
        assert_eq!(**last_seen, *final_report);
        assert!(seen.len() <= 6 * 200 + 1);
        // Deliveries never go back in time.
        assert!(seen.windows(2).all(|w| w[0].sequence <= w[1].sequence));
        assert!(!off_thread.load(Ordering::SeqCst));
    }

    #[test]
    fn late_subscriber_gets_current_snapshot() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let dispatcher = ui.dispatcher();
        let reporter = ProgressReporter::new(dispatcher.clone());
        reporter.report(StartupPhase::SplashShown, 10, "splash");

        let got = Arc::new(Mutex::new(None));
        {
            let got = got.clone();
            reporter.subscribe(move |s| *got.lock().unwrap() = Some(s.percentage));
        }
        dispatcher.run_on_ui(|| ()).unwrap();
        assert_eq!(*got.lock().unwrap(), Some(10));
    }

    #[test]
    fn subscriber_panic_is_contained() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let dispatcher = ui.dispatcher();
        let reporter = ProgressReporter::new(dispatcher.clone());
        let id = reporter.subscribe(|_| panic!("splash disposed"));

        reporter.report(StartupPhase::Bootstrap, 1, "x");
        dispatcher.run_on_ui(|| ()).unwrap();

        // Loop still alive, unsubscribe still works.
        assert!(dispatcher.is_running());
        assert!(reporter.unsubscribe(id));
    }

    #[tokio::test]
    async fn watch_observes_reports() {
        let ui = UiLoop::spawn("ui-test").unwrap();
        let reporter = ProgressReporter::new(ui.dispatcher());
        let mut rx = reporter.watch();

        reporter.report(StartupPhase::Composed, 30, "composed");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().percentage, 30);
    }
}
