use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use opsmith_types::EventRecord;

/// A run event as seen by subscribers: the record plus the run it belongs
/// to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEnvelope {
    pub run_id: String,
    pub record: EventRecord,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RunEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEnvelope> {
        self.tx.subscribe()
    }

    pub fn publish(&self, envelope: RunEnvelope) {
        let _ = self.tx.send(envelope);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
