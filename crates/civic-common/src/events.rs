use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::StartupPhase;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StartupEvent {
    PhaseChanged {
        from: StartupPhase,
        to: StartupPhase,
    },
    TaskWarning {
        task: String,
        reason: String,
    },
    DegradedMode {
        reasons: Vec<String>,
    },
    HealthUpdated {
        passing: usize,
        failing: usize,
    },
    Shutdown,
    #[serde(other)]
    Unknown,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StartupEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StartupEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: StartupEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
