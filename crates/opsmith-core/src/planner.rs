//! Planning capability. The rule planner routes on request keywords the
//! same way an operator would triage: sales questions to the sales worker,
//! stock questions to inventory, and so on; "why" questions additionally
//! pull in the incident historian. Once a round of findings exists it
//! synthesizes and completes.

use async_trait::async_trait;
use serde_json::json;

use opsmith_types::{DelegateTask, PlanDecision, RunSnapshot};

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, snapshot: &RunSnapshot) -> anyhow::Result<PlanDecision>;
}

pub struct RulePlanner;

const SALES_CUES: &[&str] = &["sale", "revenue", "trend", "sell", "top product"];
const INVENTORY_CUES: &[&str] = &["stock", "inventory", "restock", "replenish"];
const MARKETING_CUES: &[&str] = &["campaign", "roas", "spend", "marketing", "ads"];
const SUPPORT_CUES: &[&str] = &["ticket", "support", "sentiment", "complain", "customer"];
const HISTORY_CUES: &[&str] = &["why", "before", "past", "previous", "happened", "again"];

fn matches_any(request: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| request.contains(cue))
}

#[async_trait]
impl Planner for RulePlanner {
    async fn plan(&self, snapshot: &RunSnapshot) -> anyhow::Result<PlanDecision> {
        if snapshot.round >= 1 && !snapshot.findings.is_empty() {
            return Ok(PlanDecision::Complete {
                synthesis: synthesize(snapshot),
            });
        }

        let request = snapshot.request.to_lowercase();
        let mut tasks = Vec::new();
        if matches_any(&request, SALES_CUES) {
            tasks.push(
                DelegateTask::new("sales", "Analyze revenue and top products for the past week.")
                    .with_param("window_days", json!(7)),
            );
        }
        if matches_any(&request, INVENTORY_CUES) {
            tasks.push(DelegateTask::new(
                "inventory",
                "Check stock levels and flag anything low or out of stock.",
            ));
        }
        if matches_any(&request, MARKETING_CUES) {
            tasks.push(DelegateTask::new(
                "marketing",
                "Review campaign spend, budgets, and return on ad spend.",
            ));
        }
        if matches_any(&request, SUPPORT_CUES) {
            tasks.push(
                DelegateTask::new("support", "Assess ticket volume and customer sentiment.")
                    .with_param("window_days", json!(7)),
            );
        }
        if matches_any(&request, HISTORY_CUES) {
            tasks.push(
                DelegateTask::new("historian", "Find similar past incidents.")
                    .with_param("query", json!(snapshot.request)),
            );
        }

        // A request that names no domain gets the full operational sweep.
        if tasks.is_empty() || tasks.iter().all(|t| t.worker == "historian") {
            for (worker, objective) in [
                ("sales", "Summarize recent sales performance."),
                ("inventory", "Check stock levels across products."),
                ("marketing", "Review campaign spend and status."),
                ("support", "Assess recent ticket sentiment."),
            ] {
                if !tasks.iter().any(|t| t.worker == worker) {
                    tasks.push(DelegateTask::new(worker, objective));
                }
            }
        }

        Ok(PlanDecision::Delegate { tasks })
    }
}

/// Collect the `insights` strings each worker left in its finding; fall
/// back to a count when nobody had anything to say.
fn synthesize(snapshot: &RunSnapshot) -> String {
    let mut lines: Vec<String> = Vec::new();
    for value in snapshot.findings.values() {
        let Some(insights) = value.get("insights").and_then(|v| v.as_array()) else {
            continue;
        };
        for insight in insights.iter().filter_map(|v| v.as_str()) {
            lines.push(insight.to_string());
        }
    }
    if lines.is_empty() {
        format!(
            "Analysis complete; {} finding(s) collected, nothing notable to report.",
            snapshot.findings.len()
        )
    } else {
        lines.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    use opsmith_types::RunStatus;

    fn snapshot(request: &str, round: u32) -> RunSnapshot {
        RunSnapshot {
            id: "run_1".to_string(),
            status: RunStatus::Running,
            created_at: Utc::now(),
            request: request.to_string(),
            round,
            findings: BTreeMap::new(),
            events: Vec::new(),
            synthesis: None,
            failure_reason: None,
        }
    }

    fn workers(decision: &PlanDecision) -> Vec<String> {
        match decision {
            PlanDecision::Delegate { tasks } => {
                tasks.iter().map(|t| t.worker.clone()).collect()
            }
            PlanDecision::Complete { .. } => panic!("expected delegation"),
        }
    }

    #[tokio::test]
    async fn sales_request_routes_to_sales_worker() {
        let decision = RulePlanner
            .plan(&snapshot("How is revenue trending this week?", 0))
            .await
            .unwrap();
        assert_eq!(workers(&decision), vec!["sales"]);
    }

    #[tokio::test]
    async fn multi_domain_request_fans_out() {
        let decision = RulePlanner
            .plan(&snapshot("Check stock levels and campaign spend", 0))
            .await
            .unwrap();
        let names = workers(&decision);
        assert!(names.contains(&"inventory".to_string()));
        assert!(names.contains(&"marketing".to_string()));
    }

    #[tokio::test]
    async fn why_question_adds_historian() {
        let decision = RulePlanner
            .plan(&snapshot("Why did revenue drop last week?", 0))
            .await
            .unwrap();
        let names = workers(&decision);
        assert!(names.contains(&"sales".to_string()));
        assert!(names.contains(&"historian".to_string()));
    }

    #[tokio::test]
    async fn vague_request_gets_full_sweep() {
        let decision = RulePlanner
            .plan(&snapshot("Give me a status report", 0))
            .await
            .unwrap();
        assert_eq!(workers(&decision).len(), 4);
    }

    #[tokio::test]
    async fn second_round_with_findings_completes() {
        let mut snap = snapshot("How is revenue?", 1);
        snap.findings.insert(
            "r1.sales".to_string(),
            json!({"insights": ["Revenue is trending up."]}),
        );
        let decision = RulePlanner.plan(&snap).await.unwrap();
        match decision {
            PlanDecision::Complete { synthesis } => {
                assert!(synthesis.contains("Revenue is trending up."));
            }
            _ => panic!("expected completion"),
        }
    }
}
