//! Sales domain read tools: aggregated summary with trend buckets, and
//! top products by revenue.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use serde_json::{json, Map, Value};

use crate::dataset::{round2, OpsDataset};
use crate::schema::{FieldSpec, ToolSchema};
use crate::Tool;

fn window_days(args: &Map<String, Value>) -> i64 {
    args.get("window_days").and_then(Value::as_i64).unwrap_or(7)
}

pub struct SalesSummaryTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl SalesSummaryTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::read_only(
                "get_sales_summary",
                "Revenue, units sold, order count, and bucketed trend for a time window.",
            )
            .field(
                FieldSpec::integer("window_days")
                    .range(1, 90)
                    .default_value(json!(7))
                    .describe("Number of days to analyze"),
            )
            .field(
                FieldSpec::text("group_by")
                    .one_of(&["day", "week"])
                    .default_value(json!("day"))
                    .describe("Trend bucket granularity"),
            ),
        }
    }
}

#[async_trait]
impl Tool for SalesSummaryTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let days = window_days(&args);
        let group_by = args
            .get("group_by")
            .and_then(Value::as_str)
            .unwrap_or("day")
            .to_string();
        let cutoff = Utc::now() - Duration::days(days);

        let rows = self
            .data
            .read(|d| {
                let mut buckets: BTreeMap<String, (f64, i64, i64)> = BTreeMap::new();
                for order in d.orders.iter().filter(|o| o.placed_at >= cutoff) {
                    let bucket = match group_by.as_str() {
                        "week" => {
                            let week = order.placed_at.iso_week();
                            format!("{}-W{:02}", week.year(), week.week())
                        }
                        _ => order.placed_at.format("%Y-%m-%d").to_string(),
                    };
                    let entry = buckets.entry(bucket).or_insert((0.0, 0, 0));
                    entry.0 += order.revenue;
                    entry.1 += order.qty;
                    entry.2 += 1;
                }
                let mut rows: Vec<Value> = buckets
                    .into_iter()
                    .map(|(bucket, (revenue, units, order_count))| {
                        json!({
                            "bucket": bucket,
                            "revenue": round2(revenue),
                            "units": units,
                            "order_count": order_count,
                        })
                    })
                    .collect();
                // Most recent bucket first; a window of N days never
                // reports more than N buckets even when the cutoff lands
                // mid-day.
                rows.reverse();
                rows.truncate(days as usize);
                rows
            })
            .await;

        let total_revenue: f64 = rows
            .iter()
            .filter_map(|r| r["revenue"].as_f64())
            .sum();
        let total_units: i64 = rows.iter().filter_map(|r| r["units"].as_i64()).sum();
        let total_orders: i64 = rows
            .iter()
            .filter_map(|r| r["order_count"].as_i64())
            .sum();

        let trend_analysis = trend_direction(&rows);

        Ok(json!({
            "summary": {
                "total_revenue": round2(total_revenue),
                "total_units": total_units,
                "total_orders": total_orders,
                "window_days": days,
            },
            "trend": rows,
            "trend_analysis": trend_analysis,
        }))
    }
}

/// Compare the two most recent buckets; a swing past 10% either way counts
/// as a trend, anything inside the band is stable.
fn trend_direction(rows: &[Value]) -> &'static str {
    if rows.len() < 2 {
        return "stable";
    }
    let recent = rows[0]["revenue"].as_f64().unwrap_or(0.0);
    let previous = rows[1]["revenue"].as_f64().unwrap_or(0.0);
    if previous <= 0.0 {
        return "stable";
    }
    let change_pct = ((recent - previous) / previous) * 100.0;
    if change_pct > 10.0 {
        "increasing"
    } else if change_pct < -10.0 {
        "decreasing"
    } else {
        "stable"
    }
}

pub struct TopProductsTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl TopProductsTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::read_only(
                "get_top_products",
                "Top N products by revenue for a given window.",
            )
            .field(
                FieldSpec::integer("window_days")
                    .range(1, 90)
                    .default_value(json!(7)),
            )
            .field(
                FieldSpec::integer("limit")
                    .range(1, 50)
                    .default_value(json!(5)),
            ),
        }
    }
}

#[async_trait]
impl Tool for TopProductsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let days = window_days(&args);
        let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(5) as usize;
        let cutoff = Utc::now() - Duration::days(days);

        let products = self
            .data
            .read(|d| {
                let mut per_product: BTreeMap<i64, (i64, f64)> = BTreeMap::new();
                for order in d.orders.iter().filter(|o| o.placed_at >= cutoff) {
                    let entry = per_product.entry(order.product_id).or_insert((0, 0.0));
                    entry.0 += order.qty;
                    entry.1 += order.revenue;
                }
                let mut rows: Vec<Value> = per_product
                    .into_iter()
                    .filter_map(|(product_id, (units, revenue))| {
                        let product = d.products.iter().find(|p| p.id == product_id)?;
                        Some(json!({
                            "product_id": product_id,
                            "name": product.name,
                            "category": product.category,
                            "units_sold": units,
                            "revenue": round2(revenue),
                        }))
                    })
                    .collect();
                rows.sort_by(|a, b| {
                    let ra = a["revenue"].as_f64().unwrap_or(0.0);
                    let rb = b["revenue"].as_f64().unwrap_or(0.0);
                    rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
                });
                rows.truncate(limit);
                rows
            })
            .await;

        let total: f64 = products
            .iter()
            .filter_map(|p| p["revenue"].as_f64())
            .sum();

        Ok(json!({
            "products": products,
            "window_days": days,
            "total_top_products_revenue": round2(total),
        }))
    }
}
