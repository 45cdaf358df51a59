//! Domain workers. Each worker turns a delegated objective into read-only
//! tool calls through the gateway, distills a finding, and proposes any
//! mutations as pending actions instead of performing them.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};

use opsmith_gateway::{CallerIdentity, Gateway};
use opsmith_types::{ActionProposal, DelegateTask, RunEvent};
use opsmith_wire::{InvokeRequest, InvokeResponse};

use crate::state::RunStateStore;

pub struct WorkerReport {
    pub finding: Value,
    pub proposals: Vec<ActionProposal>,
}

impl WorkerReport {
    fn read_only(finding: Value) -> Self {
        Self {
            finding,
            proposals: Vec::new(),
        }
    }
}

/// Everything a worker needs to act on behalf of one run.
#[derive(Clone)]
pub struct WorkerContext {
    run_id: String,
    gateway: Gateway,
    caller: CallerIdentity,
    state: RunStateStore,
}

impl WorkerContext {
    pub fn new(
        run_id: &str,
        gateway: Gateway,
        caller: CallerIdentity,
        state: RunStateStore,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            gateway,
            caller,
            state,
        }
    }

    /// Read-only tool call. Every invocation lands in the run's event log
    /// with its outcome and duration.
    pub async fn call(&self, tool: &str, arguments: Value) -> anyhow::Result<Value> {
        let request = InvokeRequest::new(tool, arguments);
        let response = self.gateway.invoke(&request, &self.caller, false).await;
        match response {
            InvokeResponse::Success(ok) => {
                self.state
                    .append_event(
                        &self.run_id,
                        RunEvent::ToolInvoked {
                            tool: tool.to_string(),
                            outcome: "ok".to_string(),
                            duration_ms: ok.metadata.duration_ms,
                        },
                    )
                    .await?;
                Ok(ok.result)
            }
            InvokeResponse::Error(err) => {
                self.state
                    .append_event(
                        &self.run_id,
                        RunEvent::ToolInvoked {
                            tool: tool.to_string(),
                            outcome: err.error.kind.as_str().to_string(),
                            duration_ms: 0.0,
                        },
                    )
                    .await?;
                Err(anyhow!(
                    "{} failed: {}: {}",
                    tool,
                    err.error.kind.as_str(),
                    err.error.message
                ))
            }
        }
    }
}

#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &WorkerContext, task: &DelegateTask) -> anyhow::Result<WorkerReport>;
}

fn window_days(task: &DelegateTask) -> Value {
    task.parameters
        .get("window_days")
        .cloned()
        .unwrap_or(json!(7))
}

pub struct SalesWorker;

#[async_trait]
impl Worker for SalesWorker {
    fn name(&self) -> &'static str {
        "sales"
    }

    async fn run(&self, ctx: &WorkerContext, task: &DelegateTask) -> anyhow::Result<WorkerReport> {
        let window = window_days(task);
        let summary = ctx
            .call(
                "get_sales_summary",
                json!({"window_days": window, "group_by": "day"}),
            )
            .await?;
        let top = ctx
            .call(
                "get_top_products",
                json!({"window_days": window, "limit": 5}),
            )
            .await?;

        let mut insights = Vec::new();
        if let Some(trend) = summary["trend_analysis"].as_str() {
            insights.push(format!("Revenue is {trend} over the window."));
        }
        if let Some(best) = top["products"].get(0) {
            if let (Some(name), Some(revenue)) =
                (best["name"].as_str(), best["revenue"].as_f64())
            {
                insights.push(format!("Best seller is {name} at {revenue:.2} revenue."));
            }
        }

        Ok(WorkerReport::read_only(json!({
            "summary": summary["summary"],
            "trend": summary["trend"],
            "top_products": top["products"],
            "insights": insights,
        })))
    }
}

pub struct InventoryWorker;

#[async_trait]
impl Worker for InventoryWorker {
    fn name(&self) -> &'static str {
        "inventory"
    }

    async fn run(&self, ctx: &WorkerContext, _task: &DelegateTask) -> anyhow::Result<WorkerReport> {
        let status = ctx.call("get_inventory_status", json!({})).await?;
        let low = ctx.call("get_low_stock_products", json!({})).await?;

        let mut insights = Vec::new();
        let mut proposals = Vec::new();
        let out_count = status["out_of_stock_count"].as_u64().unwrap_or(0);
        let low_count = status["low_stock_count"].as_u64().unwrap_or(0);
        if out_count > 0 {
            insights.push(format!("{out_count} product(s) are out of stock."));
        }
        if low_count > 0 {
            insights.push(format!("{low_count} product(s) are below their low-stock threshold."));
        }

        if let Some(items) = status["items"].as_array() {
            for item in items.iter().filter(|i| i["status"] == "out_of_stock") {
                let Some(product_id) = item["product_id"].as_i64() else {
                    continue;
                };
                let name = item["name"].as_str().unwrap_or("product");
                proposals.push(ActionProposal {
                    action_type: "restock_item".to_string(),
                    payload: json!({
                        "product_id": product_id,
                        "quantity": 50,
                        "reason": format!("{name} is out of stock"),
                    }),
                    reasoning: format!(
                        "{name} (id {product_id}) has zero stock; restocking 50 units."
                    ),
                });
            }
        }

        Ok(WorkerReport {
            finding: json!({
                "inventory": status,
                "low_stock": low["products"],
                "insights": insights,
            }),
            proposals,
        })
    }
}

pub struct MarketingWorker;

#[async_trait]
impl Worker for MarketingWorker {
    fn name(&self) -> &'static str {
        "marketing"
    }

    async fn run(&self, ctx: &WorkerContext, _task: &DelegateTask) -> anyhow::Result<WorkerReport> {
        let spend = ctx.call("get_campaign_spend", json!({})).await?;

        let mut insights = Vec::new();
        let mut proposals = Vec::new();
        let mut roas: Option<Value> = None;

        if let Some(campaigns) = spend["campaigns"].as_array() {
            // Campaigns come back highest spend first.
            if let Some(top) = campaigns.first().and_then(|c| c["campaign_id"].as_i64()) {
                roas = Some(
                    ctx.call("calculate_roas", json!({"campaign_id": top}))
                        .await?,
                );
            }
            for campaign in campaigns {
                let utilization = campaign["budget_utilization_pct"].as_f64().unwrap_or(0.0);
                if utilization <= 100.0 || campaign["status"] != "active" {
                    continue;
                }
                let Some(campaign_id) = campaign["campaign_id"].as_i64() else {
                    continue;
                };
                let name = campaign["name"].as_str().unwrap_or("campaign");
                insights.push(format!(
                    "{name} has spent {utilization:.0}% of its budget."
                ));
                proposals.push(ActionProposal {
                    action_type: "pause_campaign".to_string(),
                    payload: json!({
                        "campaign_id": campaign_id,
                        "reason": format!("{name} is over budget at {utilization:.0}% utilization"),
                    }),
                    reasoning: format!(
                        "{name} (id {campaign_id}) exceeded its budget; pausing stops further spend."
                    ),
                });
            }
        }

        Ok(WorkerReport {
            finding: json!({
                "campaigns": spend["campaigns"],
                "top_campaign_roas": roas,
                "insights": insights,
            }),
            proposals,
        })
    }
}

pub struct SupportWorker;

#[async_trait]
impl Worker for SupportWorker {
    fn name(&self) -> &'static str {
        "support"
    }

    async fn run(&self, ctx: &WorkerContext, task: &DelegateTask) -> anyhow::Result<WorkerReport> {
        let window = window_days(task);
        let sentiment = ctx
            .call("get_support_sentiment", json!({"window_days": window}))
            .await?;
        let trends = ctx
            .call("get_ticket_trends", json!({"window_days": window}))
            .await?;

        let mut insights = Vec::new();
        let mut proposals = Vec::new();
        let volume = sentiment["ticket_volume"].as_u64().unwrap_or(0);
        insights.push(format!("{volume} ticket(s) in the window."));
        if sentiment["has_sentiment_issues"] == true {
            let ratio = sentiment["sentiment"]["negative_ratio"].as_f64().unwrap_or(0.0);
            insights.push(format!(
                "Negative sentiment is elevated ({:.0}% of tickets).",
                ratio * 100.0
            ));
            if let Some(ticket_id) = sentiment["sentiment"]["negative_ticket_ids"]
                .as_array()
                .and_then(|ids| ids.first())
                .and_then(Value::as_i64)
            {
                proposals.push(ActionProposal {
                    action_type: "escalate_ticket".to_string(),
                    payload: json!({
                        "ticket_id": ticket_id,
                        "priority": "high",
                        "reason": "negative sentiment spike",
                    }),
                    reasoning: format!(
                        "Ticket {ticket_id} is the oldest strongly negative ticket in an elevated-negativity window."
                    ),
                });
            }
        }

        Ok(WorkerReport {
            finding: json!({
                "sentiment": sentiment,
                "trends": trends,
                "insights": insights,
            }),
            proposals,
        })
    }
}

pub struct HistorianWorker;

#[async_trait]
impl Worker for HistorianWorker {
    fn name(&self) -> &'static str {
        "historian"
    }

    async fn run(&self, ctx: &WorkerContext, task: &DelegateTask) -> anyhow::Result<WorkerReport> {
        let query = task
            .parameters
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or(&task.objective)
            .to_string();
        let matches = ctx
            .call("query_past_incidents", json!({"query": query, "k": 3}))
            .await?;

        let mut insights = Vec::new();
        if let Some(best) = matches["matches"].get(0) {
            if let Some(summary) = best["incident_summary"].as_str() {
                insights.push(format!("Closest past incident: {summary}."));
            }
        }

        Ok(WorkerReport::read_only(json!({
            "query": query,
            "matches": matches["matches"],
            "insights": insights,
        })))
    }
}

/// The worker roster the engine starts with.
pub fn standard_workers() -> HashMap<String, Arc<dyn Worker>> {
    let workers: Vec<Arc<dyn Worker>> = vec![
        Arc::new(SalesWorker),
        Arc::new(InventoryWorker),
        Arc::new(MarketingWorker),
        Arc::new(SupportWorker),
        Arc::new(HistorianWorker),
    ];
    workers
        .into_iter()
        .map(|w| (w.name().to_string(), w))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use opsmith_tools::{standard_registry, OpsDataset, StaticRecall};

    use crate::event_bus::EventBus;

    const KEY: &str = "test-key";

    async fn ctx() -> (WorkerContext, RunStateStore, String) {
        let registry = standard_registry(
            Arc::new(OpsDataset::with_fixture()),
            Arc::new(StaticRecall::with_fixture()),
        )
        .unwrap();
        let gateway = Gateway::new(registry, KEY, Duration::from_secs(2));
        let state = RunStateStore::new(EventBus::new());
        let run = state.create_run("test").await;
        (
            WorkerContext::new(&run.id, gateway, CallerIdentity::bearer(KEY), state.clone()),
            state,
            run.id,
        )
    }

    #[tokio::test]
    async fn sales_worker_produces_insights() {
        let (ctx, _, _) = ctx().await;
        let task = DelegateTask::new("sales", "Analyze revenue.");
        let report = SalesWorker.run(&ctx, &task).await.unwrap();
        assert!(report.proposals.is_empty());
        assert!(report.finding["summary"]["total_revenue"].is_number());
        assert!(!report.finding["insights"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inventory_worker_proposes_restock_for_out_of_stock() {
        let (ctx, _, _) = ctx().await;
        let task = DelegateTask::new("inventory", "Check stock.");
        let report = InventoryWorker.run(&ctx, &task).await.unwrap();
        // Fixture has exactly one out-of-stock product.
        assert_eq!(report.proposals.len(), 1);
        let proposal = &report.proposals[0];
        assert_eq!(proposal.action_type, "restock_item");
        assert_eq!(proposal.payload["product_id"], 3);
    }

    #[tokio::test]
    async fn marketing_worker_proposes_pause_for_overspent_campaign() {
        let (ctx, _, _) = ctx().await;
        let task = DelegateTask::new("marketing", "Review campaigns.");
        let report = MarketingWorker.run(&ctx, &task).await.unwrap();
        assert!(report
            .proposals
            .iter()
            .any(|p| p.action_type == "pause_campaign" && p.payload["campaign_id"] == 2));
    }

    #[tokio::test]
    async fn tool_calls_are_logged_to_the_run() {
        let (ctx, state, run_id) = ctx().await;
        let task = DelegateTask::new("sales", "Analyze revenue.");
        SalesWorker.run(&ctx, &task).await.unwrap();
        let snapshot = state.snapshot(&run_id).await.unwrap();
        let invoked: Vec<&str> = snapshot
            .events
            .iter()
            .filter_map(|e| match &e.event {
                RunEvent::ToolInvoked { tool, .. } => Some(tool.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(invoked, vec!["get_sales_summary", "get_top_products"]);
    }

    #[tokio::test]
    async fn historian_worker_recalls_incidents() {
        let (ctx, _, _) = ctx().await;
        let task = DelegateTask::new("historian", "Find similar past incidents.")
            .with_param("query", json!("revenue dropped after checkout latency"));
        let report = HistorianWorker.run(&ctx, &task).await.unwrap();
        assert!(!report.finding["matches"].as_array().unwrap().is_empty());
    }
}
