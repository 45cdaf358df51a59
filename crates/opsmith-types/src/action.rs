use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    ExecutionFailed,
}

impl ActionStatus {
    /// True once the action can no longer change state on its own: it has
    /// been rejected, executed, or failed execution. An `approved` action
    /// is not terminal — execution is still owed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Rejected | ActionStatus::Executed | ActionStatus::ExecutionFailed
        )
    }

    /// True once a human has ruled on the action, whether or not execution
    /// has happened yet.
    pub fn is_decided(self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDecision {
    Approve,
    Reject,
}

/// What a worker emits instead of calling a mutating tool directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionProposal {
    pub action_type: String,
    pub payload: Value,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub run_id: String,
    pub worker: String,
    pub round: u32,
    pub action_type: String,
    pub payload: Value,
    pub reasoning: String,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl PendingAction {
    pub fn new(run_id: &str, worker: &str, round: u32, proposal: ActionProposal) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            worker: worker.to_string(),
            round,
            action_type: proposal.action_type,
            payload: proposal.payload,
            reasoning: proposal.reasoning,
            status: ActionStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ActionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_action_starts_pending() {
        let action = PendingAction::new(
            "run_1",
            "inventory",
            1,
            ActionProposal {
                action_type: "restock_item".to_string(),
                payload: json!({"product_id": 101, "quantity": 50}),
                reasoning: "Low stock detected.".to_string(),
            },
        );
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.decided_at.is_none());
        assert!(!action.status.is_terminal());
    }

    #[test]
    fn approved_is_decided_but_not_terminal() {
        assert!(ActionStatus::Approved.is_decided());
        assert!(!ActionStatus::Approved.is_terminal());
        assert!(ActionStatus::Rejected.is_terminal());
        assert!(ActionStatus::ExecutionFailed.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let value = serde_json::to_value(ActionStatus::ExecutionFailed).unwrap();
        assert_eq!(value, "execution_failed");
    }
}
