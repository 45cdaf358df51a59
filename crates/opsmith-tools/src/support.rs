//! Support domain tools: sentiment and trend reads plus the HITL-gated
//! ticket mutations.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

use crate::dataset::{round2, OpsDataset};
use crate::schema::{FieldSpec, ToolSchema};
use crate::Tool;

pub struct SupportSentimentTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl SupportSentimentTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::read_only(
                "get_support_sentiment",
                "Aggregate sentiment metrics for support tickets in a window.",
            )
            .field(
                FieldSpec::integer("window_days")
                    .range(1, 90)
                    .default_value(json!(7)),
            )
            .field(FieldSpec::integer("product_id").describe("Optional product filter"))
            .field(FieldSpec::text("issue_category").describe("Optional category filter")),
        }
    }
}

#[async_trait]
impl Tool for SupportSentimentTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let days = args.get("window_days").and_then(Value::as_i64).unwrap_or(7);
        let product_id = args.get("product_id").and_then(Value::as_i64);
        let category = args
            .get("issue_category")
            .and_then(Value::as_str)
            .map(str::to_string);
        let cutoff = Utc::now() - Duration::days(days);

        let result = self
            .data
            .read(|d| {
                let tickets: Vec<_> = d
                    .tickets
                    .iter()
                    .filter(|t| t.created_at >= cutoff)
                    .filter(|t| match product_id {
                        Some(id) => t.product_id == Some(id),
                        None => true,
                    })
                    .filter(|t| match &category {
                        Some(category) => &t.issue_category == category,
                        None => true,
                    })
                    .collect();

                let total = tickets.len();
                let negative_ticket_ids: Vec<i64> = tickets
                    .iter()
                    .filter(|t| t.sentiment < 0.4)
                    .map(|t| t.id)
                    .collect();
                let negative_count = negative_ticket_ids.len();
                let neutral_count = tickets
                    .iter()
                    .filter(|t| t.sentiment >= 0.4 && t.sentiment < 0.7)
                    .count();
                let positive_count = tickets.iter().filter(|t| t.sentiment >= 0.7).count();
                let avg_sentiment = if total > 0 {
                    tickets.iter().map(|t| t.sentiment).sum::<f64>() / total as f64
                } else {
                    0.0
                };
                let negative_ratio = if total > 0 {
                    negative_count as f64 / total as f64
                } else {
                    0.0
                };

                json!({
                    "window_days": days,
                    "sentiment": {
                        "avg_sentiment": round2(avg_sentiment),
                        "negative_ratio": round2(negative_ratio),
                        "positive_count": positive_count,
                        "neutral_count": neutral_count,
                        "negative_count": negative_count,
                        "negative_ticket_ids": negative_ticket_ids,
                    },
                    "ticket_volume": total,
                    "has_sentiment_issues": total > 0 && negative_ratio > 0.3,
                })
            })
            .await;
        Ok(result)
    }
}

pub struct TicketTrendsTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl TicketTrendsTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::read_only(
                "get_ticket_trends",
                "Ticket volume per day and per issue category in a window.",
            )
            .field(
                FieldSpec::integer("window_days")
                    .range(1, 90)
                    .default_value(json!(7)),
            ),
        }
    }
}

#[async_trait]
impl Tool for TicketTrendsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let days = args.get("window_days").and_then(Value::as_i64).unwrap_or(7);
        let cutoff = Utc::now() - Duration::days(days);

        let result = self
            .data
            .read(|d| {
                let mut per_day: BTreeMap<String, i64> = BTreeMap::new();
                let mut per_category: BTreeMap<String, i64> = BTreeMap::new();
                for ticket in d.tickets.iter().filter(|t| t.created_at >= cutoff) {
                    *per_day
                        .entry(ticket.created_at.format("%Y-%m-%d").to_string())
                        .or_insert(0) += 1;
                    *per_category.entry(ticket.issue_category.clone()).or_insert(0) += 1;
                }
                let total: i64 = per_day.values().sum();
                let mut categories: Vec<Value> = per_category
                    .into_iter()
                    .map(|(category, count)| json!({"category": category, "count": count}))
                    .collect();
                categories.sort_by_key(|c| -c["count"].as_i64().unwrap_or(0));
                let daily: Vec<Value> = per_day
                    .into_iter()
                    .map(|(day, count)| json!({"day": day, "count": count}))
                    .collect();
                json!({
                    "window_days": days,
                    "total": total,
                    "daily": daily,
                    "by_category": categories,
                })
            })
            .await;
        Ok(result)
    }
}

pub struct EscalateTicketTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl EscalateTicketTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::mutating(
                "escalate_ticket",
                "Raise a support ticket's priority.",
            )
            .field(FieldSpec::integer("ticket_id").required())
            .field(
                FieldSpec::text("priority")
                    .one_of(&["low", "medium", "high", "critical"])
                    .default_value(json!("high")),
            )
            .field(FieldSpec::text("reason")),
        }
    }
}

#[async_trait]
impl Tool for EscalateTicketTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let ticket_id = args
            .get("ticket_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let priority = args
            .get("priority")
            .and_then(Value::as_str)
            .unwrap_or("high")
            .to_string();
        let reason = args
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        let result = self
            .data
            .write(|d| {
                let Some(ticket) = d.tickets.iter_mut().find(|t| t.id == ticket_id) else {
                    return json!({
                        "success": false,
                        "error": format!("Ticket {ticket_id} not found"),
                    });
                };
                let old_priority = ticket.priority.clone();
                ticket.priority = priority.clone();
                json!({
                    "success": true,
                    "ticket_id": ticket.id,
                    "issue_category": ticket.issue_category,
                    "old_priority": old_priority,
                    "new_priority": priority,
                    "reason": reason,
                })
            })
            .await;
        Ok(result)
    }
}

pub struct CloseTicketTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl CloseTicketTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::mutating("close_ticket", "Close a support ticket.")
                .field(FieldSpec::integer("ticket_id").required())
                .field(FieldSpec::text("resolution").describe("Resolution summary")),
        }
    }
}

#[async_trait]
impl Tool for CloseTicketTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let ticket_id = args
            .get("ticket_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let resolution = args
            .get("resolution")
            .and_then(Value::as_str)
            .map(str::to_string);

        let result = self
            .data
            .write(|d| {
                let Some(ticket) = d.tickets.iter_mut().find(|t| t.id == ticket_id) else {
                    return json!({
                        "success": false,
                        "error": format!("Ticket {ticket_id} not found"),
                    });
                };
                ticket.open = false;
                ticket.resolution = resolution.clone();
                json!({
                    "success": true,
                    "ticket_id": ticket.id,
                    "issue_category": ticket.issue_category,
                    "resolution": resolution,
                })
            })
            .await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sentiment_buckets_add_up() {
        let tool = SupportSentimentTool::new(Arc::new(OpsDataset::with_fixture()));
        let args = tool
            .schema()
            .validate(&json!({"window_days": 30}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        let sentiment = &result["sentiment"];
        let total = result["ticket_volume"].as_i64().unwrap();
        let sum = sentiment["positive_count"].as_i64().unwrap()
            + sentiment["neutral_count"].as_i64().unwrap()
            + sentiment["negative_count"].as_i64().unwrap();
        assert_eq!(total, sum);
    }

    #[tokio::test]
    async fn category_filter_narrows_volume() {
        let tool = SupportSentimentTool::new(Arc::new(OpsDataset::with_fixture()));
        let all = tool
            .execute(tool.schema().validate(&json!({"window_days": 30})).unwrap())
            .await
            .unwrap();
        let filtered = tool
            .execute(
                tool.schema()
                    .validate(&json!({"window_days": 30, "issue_category": "billing"}))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(
            filtered["ticket_volume"].as_i64().unwrap()
                < all["ticket_volume"].as_i64().unwrap()
        );
    }

    #[tokio::test]
    async fn escalate_sets_priority() {
        let data = Arc::new(OpsDataset::with_fixture());
        let tool = EscalateTicketTool::new(data.clone());
        let args = tool
            .schema()
            .validate(&json!({"ticket_id": 1, "priority": "critical"}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["new_priority"], "critical");
        let priority = data.read(|d| d.tickets[0].priority.clone()).await;
        assert_eq!(priority, "critical");
    }

    #[tokio::test]
    async fn close_marks_ticket_resolved() {
        let data = Arc::new(OpsDataset::with_fixture());
        let tool = CloseTicketTool::new(data.clone());
        let args = tool
            .schema()
            .validate(&json!({"ticket_id": 2, "resolution": "refund issued"}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["success"], true);
        let open = data.read(|d| d.tickets[1].open).await;
        assert!(!open);
    }

    #[tokio::test]
    async fn trends_report_counts_by_category() {
        let tool = TicketTrendsTool::new(Arc::new(OpsDataset::with_fixture()));
        let args = tool.schema().validate(&json!({"window_days": 30})).unwrap();
        let result = tool.execute(args).await.unwrap();
        assert!(result["total"].as_i64().unwrap() > 0);
        assert!(!result["by_category"].as_array().unwrap().is_empty());
    }
}
