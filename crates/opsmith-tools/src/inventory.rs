//! Inventory domain tools: stock status reads plus the HITL-gated stock
//! adjustment.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::dataset::OpsDataset;
use crate::schema::{FieldSpec, ToolSchema};
use crate::Tool;

fn stock_status(stock_qty: i64, threshold: i64) -> &'static str {
    if stock_qty == 0 {
        "out_of_stock"
    } else if stock_qty <= threshold {
        "low_stock"
    } else {
        "in_stock"
    }
}

pub struct InventoryStatusTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl InventoryStatusTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::read_only(
                "get_inventory_status",
                "Current stock levels for products, lowest stock first.",
            )
            .field(
                FieldSpec::integer_list("product_ids")
                    .describe("Product IDs to check; all products when omitted"),
            )
            .field(
                FieldSpec::integer("limit")
                    .range(1, 200)
                    .default_value(json!(50)),
            ),
        }
    }
}

#[async_trait]
impl Tool for InventoryStatusTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let ids: Option<Vec<i64>> = args.get("product_ids").and_then(Value::as_array).map(|a| {
            a.iter().filter_map(Value::as_i64).collect()
        });
        let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(50) as usize;

        let result = self
            .data
            .read(|d| {
                let mut items: Vec<Value> = d
                    .products
                    .iter()
                    .filter(|p| match &ids {
                        Some(ids) => ids.contains(&p.id),
                        None => true,
                    })
                    .map(|p| {
                        json!({
                            "product_id": p.id,
                            "name": p.name,
                            "category": p.category,
                            "stock_qty": p.stock_qty,
                            "low_stock_threshold": p.low_stock_threshold,
                            "status": stock_status(p.stock_qty, p.low_stock_threshold),
                        })
                    })
                    .collect();
                items.sort_by_key(|item| item["stock_qty"].as_i64().unwrap_or(0));
                items.truncate(limit);

                let out_of_stock_count = items
                    .iter()
                    .filter(|i| i["status"] == "out_of_stock")
                    .count();
                let low_stock_count =
                    items.iter().filter(|i| i["status"] == "low_stock").count();
                let total_count = items.len();

                json!({
                    "items": items,
                    "total_count": total_count,
                    "out_of_stock_count": out_of_stock_count,
                    "low_stock_count": low_stock_count,
                })
            })
            .await;
        Ok(result)
    }
}

pub struct LowStockProductsTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl LowStockProductsTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::read_only(
                "get_low_stock_products",
                "Products at or below their low-stock threshold.",
            )
            .field(
                FieldSpec::integer("limit")
                    .range(1, 200)
                    .default_value(json!(50)),
            ),
        }
    }
}

#[async_trait]
impl Tool for LowStockProductsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(50) as usize;
        let result = self
            .data
            .read(|d| {
                let mut items: Vec<Value> = d
                    .products
                    .iter()
                    .filter(|p| p.stock_qty <= p.low_stock_threshold)
                    .map(|p| {
                        json!({
                            "product_id": p.id,
                            "name": p.name,
                            "stock_qty": p.stock_qty,
                            "low_stock_threshold": p.low_stock_threshold,
                            "status": stock_status(p.stock_qty, p.low_stock_threshold),
                        })
                    })
                    .collect();
                items.sort_by_key(|item| item["stock_qty"].as_i64().unwrap_or(0));
                items.truncate(limit);
                let count = items.len();
                json!({"products": items, "count": count})
            })
            .await;
        Ok(result)
    }
}

/// Mutating: adjusts stock by a signed delta. Never drives stock below
/// zero; the refusal is reported in the result, not as a transport error.
pub struct UpdateInventoryTool {
    data: Arc<OpsDataset>,
    schema: ToolSchema,
}

impl UpdateInventoryTool {
    pub fn new(data: Arc<OpsDataset>) -> Self {
        Self {
            data,
            schema: ToolSchema::mutating(
                "update_inventory",
                "Adjust product stock by a positive or negative amount.",
            )
            .field(FieldSpec::integer("product_id").required())
            .field(
                FieldSpec::integer("quantity_change")
                    .required()
                    .describe("Amount to add (positive) or remove (negative)"),
            )
            .field(FieldSpec::text("reason").describe("Reason for the adjustment")),
        }
    }
}

#[async_trait]
impl Tool for UpdateInventoryTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let product_id = args
            .get("product_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let change = args
            .get("quantity_change")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let reason = args
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        let result = self
            .data
            .write(|d| {
                let Some(product) = d.products.iter_mut().find(|p| p.id == product_id) else {
                    return json!({
                        "success": false,
                        "error": format!("Product {product_id} not found"),
                    });
                };
                let old_qty = product.stock_qty;
                let new_qty = old_qty + change;
                if new_qty < 0 {
                    return json!({
                        "success": false,
                        "error": format!(
                            "Cannot reduce stock below 0. Current: {old_qty}, Change: {change}"
                        ),
                    });
                }
                product.stock_qty = new_qty;
                json!({
                    "success": true,
                    "product_id": product.id,
                    "product_name": product.name,
                    "old_quantity": old_qty,
                    "new_quantity": new_qty,
                    "change": change,
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
    async fn status_derivation_matches_thresholds() {
        assert_eq!(stock_status(0, 10), "out_of_stock");
        assert_eq!(stock_status(5, 10), "low_stock");
        assert_eq!(stock_status(11, 10), "in_stock");
    }

    #[tokio::test]
    async fn inventory_status_filters_by_ids() {
        let tool = InventoryStatusTool::new(Arc::new(OpsDataset::with_fixture()));
        let args = tool
            .schema()
            .validate(&json!({"product_ids": [1, 3]}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        let items = result["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        // Fixture product 3 has zero stock.
        assert_eq!(result["out_of_stock_count"], 1);
    }

    #[tokio::test]
    async fn update_refuses_negative_stock() {
        let data = Arc::new(OpsDataset::with_fixture());
        let tool = UpdateInventoryTool::new(data.clone());
        let args = tool
            .schema()
            .validate(&json!({"product_id": 3, "quantity_change": -5}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["success"], false);
        let untouched = data.read(|d| d.products[2].stock_qty).await;
        assert_eq!(untouched, 0);
    }

    #[tokio::test]
    async fn update_applies_restock() {
        let data = Arc::new(OpsDataset::with_fixture());
        let tool = UpdateInventoryTool::new(data.clone());
        let args = tool
            .schema()
            .validate(&json!({
                "product_id": 3,
                "quantity_change": 40,
                "reason": "restock"
            }))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["old_quantity"], 0);
        assert_eq!(result["new_quantity"], 40);
    }

    #[tokio::test]
    async fn missing_product_is_reported_in_result() {
        let tool = UpdateInventoryTool::new(Arc::new(OpsDataset::with_fixture()));
        let args = tool
            .schema()
            .validate(&json!({"product_id": 999, "quantity_change": 1}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["success"], false);
    }
}
