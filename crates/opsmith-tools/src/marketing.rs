//! Marketing domain tools: campaign spend reads, ROAS, and the HITL-gated
//! status/budget mutations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::dataset::{round2, OpsDataset};
use crate::schema::{FieldSpec, ToolSchema};
use crate::Tool;

pub struct CampaignSpendTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl CampaignSpendTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::read_only(
                "get_campaign_spend",
                "Spend, budget, and conversion metrics for campaigns, highest spend first.",
            )
            .field(FieldSpec::integer_list("campaign_ids"))
            .field(FieldSpec::text("status").one_of(&["active", "paused"])),
        }
    }
}

#[async_trait]
impl Tool for CampaignSpendTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let ids: Option<Vec<i64>> = args
            .get("campaign_ids")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_i64).collect());
        let status = args
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);

        let result = self
            .data
            .read(|d| {
                let mut campaigns: Vec<Value> = d
                    .campaigns
                    .iter()
                    .filter(|c| match &ids {
                        Some(ids) => ids.contains(&c.id),
                        None => true,
                    })
                    .filter(|c| match &status {
                        Some(status) => &c.status == status,
                        None => true,
                    })
                    .map(|c| {
                        let utilization = if c.budget > 0.0 {
                            round2((c.spend / c.budget) * 100.0)
                        } else {
                            0.0
                        };
                        json!({
                            "campaign_id": c.id,
                            "name": c.name,
                            "budget": round2(c.budget),
                            "spend": round2(c.spend),
                            "clicks": c.clicks,
                            "conversions": c.conversions,
                            "status": c.status,
                            "budget_utilization_pct": utilization,
                        })
                    })
                    .collect();
                campaigns.sort_by(|a, b| {
                    let sa = a["spend"].as_f64().unwrap_or(0.0);
                    let sb = b["spend"].as_f64().unwrap_or(0.0);
                    sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
                });
                let count = campaigns.len();
                json!({"campaigns": campaigns, "count": count})
            })
            .await;
        Ok(result)
    }
}

/// Return on ad spend per campaign, using conversions times the store's
/// current average order value as attributed revenue.
pub struct RoasTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl RoasTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::read_only(
                "calculate_roas",
                "Return on ad spend for one campaign.",
            )
            .field(FieldSpec::integer("campaign_id").required()),
        }
    }
}

#[async_trait]
impl Tool for RoasTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let campaign_id = args
            .get("campaign_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();

        let result = self
            .data
            .read(|d| {
                let Some(campaign) = d.campaigns.iter().find(|c| c.id == campaign_id) else {
                    return json!({
                        "success": false,
                        "error": format!("Campaign {campaign_id} not found"),
                    });
                };
                let total_revenue: f64 = d.orders.iter().map(|o| o.revenue).sum();
                let avg_order_value = if d.orders.is_empty() {
                    0.0
                } else {
                    total_revenue / d.orders.len() as f64
                };
                let attributed_revenue = campaign.conversions as f64 * avg_order_value;
                let roas = if campaign.spend > 0.0 {
                    round2(attributed_revenue / campaign.spend)
                } else {
                    0.0
                };
                json!({
                    "campaign_id": campaign.id,
                    "name": campaign.name,
                    "spend": round2(campaign.spend),
                    "conversions": campaign.conversions,
                    "avg_order_value": round2(avg_order_value),
                    "attributed_revenue": round2(attributed_revenue),
                    "roas": roas,
                })
            })
            .await;
        Ok(result)
    }
}

pub struct UpdateCampaignStatusTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl UpdateCampaignStatusTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::mutating(
                "update_campaign_status",
                "Pause or resume a campaign.",
            )
            .field(FieldSpec::integer("campaign_id").required())
            .field(
                FieldSpec::text("status")
                    .required()
                    .one_of(&["active", "paused"]),
            )
            .field(FieldSpec::text("reason")),
        }
    }
}

#[async_trait]
impl Tool for UpdateCampaignStatusTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let campaign_id = args
            .get("campaign_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let new_status = args
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("paused")
            .to_string();
        let reason = args
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        let result = self
            .data
            .write(|d| {
                let Some(campaign) = d.campaigns.iter_mut().find(|c| c.id == campaign_id)
                else {
                    return json!({
                        "success": false,
                        "error": format!("Campaign {campaign_id} not found"),
                    });
                };
                let old_status = campaign.status.clone();
                campaign.status = new_status.clone();
                json!({
                    "success": true,
                    "campaign_id": campaign.id,
                    "campaign_name": campaign.name,
                    "old_status": old_status,
                    "new_status": new_status,
                    "reason": reason,
                })
            })
            .await;
        Ok(result)
    }
}

pub struct UpdateCampaignBudgetTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl UpdateCampaignBudgetTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::mutating("update_campaign_budget", "Set a campaign's budget.")
                .field(FieldSpec::integer("campaign_id").required())
                .field(FieldSpec::number("new_budget").required().greater_than(0.0))
                .field(FieldSpec::text("reason")),
        }
    }
}

#[async_trait]
impl Tool for UpdateCampaignBudgetTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let campaign_id = args
            .get("campaign_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let new_budget = args
            .get("new_budget")
            .and_then(Value::as_f64)
            .unwrap_or_default();
        let reason = args
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        let result = self
            .data
            .write(|d| {
                let Some(campaign) = d.campaigns.iter_mut().find(|c| c.id == campaign_id)
                else {
                    return json!({
                        "success": false,
                        "error": format!("Campaign {campaign_id} not found"),
                    });
                };
                let old_budget = campaign.budget;
                campaign.budget = new_budget;
                json!({
                    "success": true,
                    "campaign_id": campaign.id,
                    "campaign_name": campaign.name,
                    "old_budget": round2(old_budget),
                    "new_budget": round2(new_budget),
                    "reason": reason,
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
    async fn spend_report_includes_utilization() {
        let tool = CampaignSpendTool::new(Arc::new(OpsDataset::with_fixture()));
        let args = tool.schema().validate(&json!({})).unwrap();
        let result = tool.execute(args).await.unwrap();
        let campaigns = result["campaigns"].as_array().unwrap();
        assert_eq!(campaigns.len(), 4);
        // Fixture campaign 2 is overspent.
        let overspent = campaigns
            .iter()
            .find(|c| c["campaign_id"] == 2)
            .unwrap();
        assert!(overspent["budget_utilization_pct"].as_f64().unwrap() > 100.0);
    }

    #[tokio::test]
    async fn spend_report_filters_by_status() {
        let tool = CampaignSpendTool::new(Arc::new(OpsDataset::with_fixture()));
        let args = tool
            .schema()
            .validate(&json!({"status": "paused"}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["count"], 1);
    }

    #[tokio::test]
    async fn status_update_records_transition() {
        let data = Arc::new(OpsDataset::with_fixture());
        let tool = UpdateCampaignStatusTool::new(data.clone());
        let args = tool
            .schema()
            .validate(&json!({"campaign_id": 2, "status": "paused"}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["old_status"], "active");
        assert_eq!(result["new_status"], "paused");
        let status = data.read(|d| d.campaigns[1].status.clone()).await;
        assert_eq!(status, "paused");
    }

    #[tokio::test]
    async fn budget_must_be_positive() {
        let tool = UpdateCampaignBudgetTool::new(Arc::new(OpsDataset::with_fixture()));
        let violation = tool
            .schema()
            .validate(&json!({"campaign_id": 1, "new_budget": 0}))
            .unwrap_err();
        assert_eq!(violation.field, "new_budget");
    }

    #[tokio::test]
    async fn roas_for_unknown_campaign_reports_error() {
        let tool = RoasTool::new(Arc::new(OpsDataset::with_fixture()));
        let args = tool
            .schema()
            .validate(&json!({"campaign_id": 42}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["success"], false);
    }
}
