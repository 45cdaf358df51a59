//! In-memory run state: one slot per run holding the snapshot fields, an
//! append-only event log with a per-run sequence counter, and write-once
//! findings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use opsmith_types::{EventRecord, RunEvent, RunSnapshot, RunStatus};

use crate::event_bus::{EventBus, RunEnvelope};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("unknown run: {0}")]
    UnknownRun(String),
    #[error("duplicate finding key: {0}")]
    DuplicateKey(String),
}

struct RunState {
    snapshot: RunSnapshot,
    next_seq: u64,
}

/// Per-run slots behind a map lock, so appends to one run never contend
/// with another run's log.
#[derive(Clone)]
pub struct RunStateStore {
    runs: Arc<RwLock<HashMap<String, Arc<Mutex<RunState>>>>>,
    bus: EventBus,
}

impl RunStateStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            bus,
        }
    }

    pub async fn create_run(&self, request: &str) -> RunSnapshot {
        let snapshot = RunSnapshot {
            id: format!("run_{}", Uuid::new_v4()),
            status: RunStatus::Running,
            created_at: Utc::now(),
            request: request.to_string(),
            round: 0,
            findings: BTreeMap::new(),
            events: Vec::new(),
            synthesis: None,
            failure_reason: None,
        };
        self.runs.write().await.insert(
            snapshot.id.clone(),
            Arc::new(Mutex::new(RunState {
                snapshot: snapshot.clone(),
                next_seq: 1,
            })),
        );
        snapshot
    }

    async fn slot(&self, run_id: &str) -> Result<Arc<Mutex<RunState>>, StateError> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| StateError::UnknownRun(run_id.to_string()))
    }

    /// Append one event, assigning the next sequence number, and fan it out
    /// to subscribers.
    pub async fn append_event(
        &self,
        run_id: &str,
        event: RunEvent,
    ) -> Result<EventRecord, StateError> {
        let slot = self.slot(run_id).await?;
        let record = {
            let mut state = slot.lock().await;
            let record = EventRecord {
                seq: state.next_seq,
                at: Utc::now(),
                event,
            };
            state.next_seq += 1;
            state.snapshot.events.push(record.clone());
            record
        };
        self.bus.publish(RunEnvelope {
            run_id: run_id.to_string(),
            record: record.clone(),
        });
        Ok(record)
    }

    /// Write-once: a key that already exists is refused, never overwritten.
    pub async fn record_finding(
        &self,
        run_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StateError> {
        let slot = self.slot(run_id).await?;
        let mut state = slot.lock().await;
        if state.snapshot.findings.contains_key(key) {
            return Err(StateError::DuplicateKey(key.to_string()));
        }
        state.snapshot.findings.insert(key.to_string(), value);
        Ok(())
    }

    pub async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<(), StateError> {
        let slot = self.slot(run_id).await?;
        slot.lock().await.snapshot.status = status;
        Ok(())
    }

    pub async fn set_round(&self, run_id: &str, round: u32) -> Result<(), StateError> {
        let slot = self.slot(run_id).await?;
        slot.lock().await.snapshot.round = round;
        Ok(())
    }

    pub async fn set_synthesis(&self, run_id: &str, synthesis: &str) -> Result<(), StateError> {
        let slot = self.slot(run_id).await?;
        slot.lock().await.snapshot.synthesis = Some(synthesis.to_string());
        Ok(())
    }

    pub async fn set_failure(&self, run_id: &str, reason: &str) -> Result<(), StateError> {
        let slot = self.slot(run_id).await?;
        let mut state = slot.lock().await;
        state.snapshot.status = RunStatus::Failed;
        state.snapshot.failure_reason = Some(reason.to_string());
        Ok(())
    }

    pub async fn snapshot(&self, run_id: &str) -> Result<RunSnapshot, StateError> {
        let slot = self.slot(run_id).await?;
        let state = slot.lock().await;
        Ok(state.snapshot.clone())
    }

    pub async fn list_runs(&self) -> Vec<RunSnapshot> {
        let slots: Vec<Arc<Mutex<RunState>>> =
            self.runs.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.lock().await.snapshot.clone());
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> RunStateStore {
        RunStateStore::new(EventBus::new())
    }

    #[tokio::test]
    async fn events_get_increasing_sequence_numbers() {
        let store = store();
        let run = store.create_run("check sales").await;
        for round in 1..=3 {
            store
                .append_event(&run.id, RunEvent::PlanStarted { round })
                .await
                .unwrap();
        }
        let snapshot = store.snapshot(&run.id).await.unwrap();
        let seqs: Vec<u64> = snapshot.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn findings_are_write_once() {
        let store = store();
        let run = store.create_run("check sales").await;
        store
            .record_finding(&run.id, "r1.sales", json!({"total": 10}))
            .await
            .unwrap();
        let err = store
            .record_finding(&run.id, "r1.sales", json!({"total": 99}))
            .await
            .unwrap_err();
        assert_eq!(err, StateError::DuplicateKey("r1.sales".to_string()));
        let snapshot = store.snapshot(&run.id).await.unwrap();
        assert_eq!(snapshot.findings["r1.sales"]["total"], 10);
    }

    #[tokio::test]
    async fn unknown_run_is_reported() {
        let store = store();
        let err = store.snapshot("run_missing").await.unwrap_err();
        assert_eq!(err, StateError::UnknownRun("run_missing".to_string()));
    }

    #[tokio::test]
    async fn append_publishes_to_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let store = RunStateStore::new(bus);
        let run = store.create_run("check sales").await;
        store
            .append_event(
                &run.id,
                RunEvent::RunStarted {
                    request: "check sales".to_string(),
                },
            )
            .await
            .unwrap();
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.run_id, run.id);
        assert_eq!(envelope.record.seq, 1);
    }

    #[tokio::test]
    async fn failure_sets_status_and_reason() {
        let store = store();
        let run = store.create_run("check sales").await;
        store
            .set_failure(&run.id, "planning_loop_exceeded")
            .await
            .unwrap();
        let snapshot = store.snapshot(&run.id).await.unwrap();
        assert_eq!(snapshot.status, RunStatus::Failed);
        assert_eq!(
            snapshot.failure_reason.as_deref(),
            Some("planning_loop_exceeded")
        );
    }
}
