use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ActionDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    WaitingHuman,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Succeeded,
    Failed,
}

/// One entry in a run's append-only event log. `seq` is assigned by the
/// run state store and totally orders events within a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RunEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        request: String,
    },
    PlanStarted {
        round: u32,
    },
    PlanDecided {
        round: u32,
        workers: Vec<String>,
    },
    PlanCompleted {
        round: u32,
    },
    WorkerDispatched {
        round: u32,
        worker: String,
        objective: String,
    },
    WorkerFinished {
        round: u32,
        worker: String,
        status: WorkerStatus,
    },
    ToolInvoked {
        tool: String,
        outcome: String,
        duration_ms: f64,
    },
    ApprovalRequested {
        action_id: String,
        action_type: String,
        worker: String,
    },
    ActionDecided {
        action_id: String,
        decision: ActionDecision,
    },
    ActionExecuted {
        action_id: String,
        outcome: String,
    },
    RunCompleted {
        round: u32,
    },
    RunFailed {
        reason: String,
    },
    RunCancelled,
}

/// Read-consistent point-in-time copy of a run, as handed to callers and
/// to the planner capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub request: String,
    pub round: u32,
    #[serde(default)]
    pub findings: BTreeMap<String, Value>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}
