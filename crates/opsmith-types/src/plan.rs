use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of delegated work produced by the planner. `result_key` names
/// the findings slot the worker's output lands in; the executor prefixes
/// it with the round so repeated rounds never collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateTask {
    pub worker: String,
    pub objective: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub result_key: String,
}

impl DelegateTask {
    pub fn new(worker: &str, objective: &str) -> Self {
        Self {
            worker: worker.to_string(),
            objective: objective.to_string(),
            parameters: Map::new(),
            result_key: worker.to_string(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }
}

/// Planner output: either another round of delegation or a final synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PlanDecision {
    Delegate { tasks: Vec<DelegateTask> },
    Complete { synthesis: String },
}
