//! Named health probes, run together and published as one snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use civic_common::{EventBus, StartupEvent};
use futures_util::future::join_all;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::util::catch_panic;

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    /// A failing critical probe makes background initialization fatal.
    fn critical(&self) -> bool {
        false
    }

    async fn check(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub duration: Duration,
    /// Failure reason; `None` when the probe passed.
    pub detail: Option<String>,
    pub critical: bool,
}

impl ProbeOutcome {
    pub fn passed(&self) -> bool {
        self.status == ProbeStatus::Pass
    }
}

/// Results of one complete probe run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub probes: BTreeMap<String, ProbeOutcome>,
    /// `None` until the first run finishes.
    pub taken_at: Option<DateTime<Utc>>,
    /// Incremented on every run; 0 means never run.
    pub generation: u64,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.probes.values().all(ProbeOutcome::passed)
    }

    pub fn failing(&self) -> impl Iterator<Item = (&str, &ProbeOutcome)> {
        self.probes
            .iter()
            .filter(|(_, outcome)| !outcome.passed())
            .map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn critical_failures(&self) -> impl Iterator<Item = (&str, &ProbeOutcome)> {
        self.failing().filter(|(_, outcome)| outcome.critical)
    }
}

/// Owns the probe set and the latest [`HealthSnapshot`].
///
/// Runs never overlap: a periodic tick that arrives while a run is in
/// progress waits for it. Readers only ever see a complete snapshot.
pub struct HealthCheckCoordinator {
    probes: Vec<Arc<dyn HealthProbe>>,
    probe_timeout: Duration,
    latest: watch::Sender<Arc<HealthSnapshot>>,
    run_lock: AsyncMutex<()>,
    events: Option<EventBus>,
}

impl HealthCheckCoordinator {
    pub fn new(probe_timeout: Duration) -> Self {
        let (latest, _) = watch::channel(Arc::new(HealthSnapshot::default()));
        Self {
            probes: Vec::new(),
            probe_timeout,
            latest,
            run_lock: AsyncMutex::new(()),
            events: None,
        }
    }

    pub fn with_probe(mut self, probe: impl HealthProbe + 'static) -> Self {
        self.probes.push(Arc::new(probe));
        self
    }

    pub fn with_shared_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Publish a `HealthUpdated` event after every run.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<HealthSnapshot>> {
        self.latest.subscribe()
    }

    /// Run every probe concurrently, each bounded by the probe timeout, and
    /// publish the combined snapshot.
    pub async fn run_once(&self) -> Arc<HealthSnapshot> {
        let _running = self.run_lock.lock().await;

        let checks = self.probes.iter().map(|probe| {
            let limit = self.probe_timeout;
            async move {
                let started = Instant::now();
                let result = match tokio::time::timeout(limit, catch_panic(probe.check())).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("timed out after {}ms", limit.as_millis())),
                };
                let outcome = ProbeOutcome {
                    status: if result.is_ok() {
                        ProbeStatus::Pass
                    } else {
                        ProbeStatus::Fail
                    },
                    duration: started.elapsed(),
                    detail: result.err(),
                    critical: probe.critical(),
                };
                (probe.name().to_string(), outcome)
            }
        });
        let probes: BTreeMap<_, _> = join_all(checks).await.into_iter().collect();

        let generation = self.latest.borrow().generation + 1;
        let snapshot = Arc::new(HealthSnapshot {
            probes,
            taken_at: Some(Utc::now()),
            generation,
        });

        let failing = snapshot.failing().count();
        let passing = snapshot.probes.len() - failing;
        for (name, outcome) in snapshot.failing() {
            tracing::warn!(
                probe = name,
                critical = outcome.critical,
                reason = outcome.detail.as_deref().unwrap_or(""),
                "health probe failed"
            );
        }
        tracing::debug!(generation, passing, failing, "health snapshot published");

        self.latest.send_replace(snapshot.clone());
        if let Some(events) = &self.events {
            events.publish(StartupEvent::HealthUpdated { passing, failing });
        }
        snapshot
    }

    /// Repeat [`run_once`](Self::run_once) every `interval` until `token` is
    /// cancelled. The first periodic run happens one interval from now.
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                interval_secs = interval.as_secs(),
                probes = self.probes.len(),
                "periodic health checks started"
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
            tracing::info!("periodic health checks stopped");
        })
    }
}
