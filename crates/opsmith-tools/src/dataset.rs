//! In-process operations dataset sitting behind the named read tools.
//! The relational store itself is an external capability; tools only see
//! this accessor, so swapping in a real backend touches nothing above it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Monetary and ratio outputs are reported to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock_qty: i64,
    pub low_stock_threshold: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub product_id: i64,
    pub qty: i64,
    pub revenue: f64,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub budget: f64,
    pub spend: f64,
    pub clicks: i64,
    pub conversions: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub product_id: Option<i64>,
    pub issue_category: String,
    pub sentiment: f64,
    pub priority: String,
    pub open: bool,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct OpsData {
    pub products: Vec<Product>,
    pub orders: Vec<OrderRecord>,
    pub campaigns: Vec<Campaign>,
    pub tickets: Vec<Ticket>,
}

pub struct OpsDataset {
    inner: RwLock<OpsData>,
}

impl OpsDataset {
    pub fn new(data: OpsData) -> Self {
        Self {
            inner: RwLock::new(data),
        }
    }

    pub fn empty() -> Self {
        Self::new(OpsData::default())
    }

    pub async fn read<R>(&self, f: impl FnOnce(&OpsData) -> R) -> R {
        let guard = self.inner.read().await;
        f(&guard)
    }

    pub async fn write<R>(&self, f: impl FnOnce(&mut OpsData) -> R) -> R {
        let mut guard = self.inner.write().await;
        f(&mut guard)
    }

    /// Deterministic sample data used by tests and the demo wiring: six
    /// products, two weeks of orders, four campaigns, and a spread of
    /// support tickets.
    pub fn with_fixture() -> Self {
        let now = Utc::now();
        let mut data = OpsData::default();

        let catalog: [(&str, &str, f64, i64, i64); 6] = [
            ("Trail Runner Shoe", "footwear", 89.0, 42, 10),
            ("Alpine Jacket", "apparel", 149.0, 7, 12),
            ("Canyon Backpack", "gear", 72.0, 0, 8),
            ("Summit Tent", "gear", 299.0, 15, 5),
            ("Ridge Water Bottle", "accessories", 18.0, 120, 25),
            ("Basecamp Stove", "gear", 64.0, 4, 6),
        ];
        for (idx, (name, category, price, stock, threshold)) in catalog.iter().enumerate() {
            data.products.push(Product {
                id: idx as i64 + 1,
                name: name.to_string(),
                category: category.to_string(),
                price: *price,
                stock_qty: *stock,
                low_stock_threshold: *threshold,
            });
        }

        // Orders over the past 14 days, heavier in the recent week.
        let mut order_id = 1;
        for day in 0..14 {
            let per_day = if day < 7 { 6 } else { 3 };
            for slot in 0..per_day {
                let product = &data.products[(day + slot) % data.products.len()];
                let qty = 1 + ((day + slot) % 3) as i64;
                data.orders.push(OrderRecord {
                    id: order_id,
                    product_id: product.id,
                    qty,
                    revenue: product.price * qty as f64,
                    placed_at: now - Duration::days(day as i64) - Duration::hours(slot as i64),
                });
                order_id += 1;
            }
        }

        data.campaigns = vec![
            Campaign {
                id: 1,
                name: "Summer Trail Push".to_string(),
                budget: 5000.0,
                spend: 3200.0,
                clicks: 10400,
                conversions: 310,
                status: "active".to_string(),
            },
            Campaign {
                id: 2,
                name: "Gear Clearance".to_string(),
                budget: 2000.0,
                spend: 2150.0,
                clicks: 8900,
                conversions: 95,
                status: "active".to_string(),
            },
            Campaign {
                id: 3,
                name: "Newsletter Retarget".to_string(),
                budget: 800.0,
                spend: 240.0,
                clicks: 1200,
                conversions: 44,
                status: "active".to_string(),
            },
            Campaign {
                id: 4,
                name: "Winter Preview".to_string(),
                budget: 3000.0,
                spend: 0.0,
                clicks: 0,
                conversions: 0,
                status: "paused".to_string(),
            },
        ];

        let sentiments: [(&str, f64, Option<i64>); 10] = [
            ("shipping_delay", 0.2, Some(3)),
            ("shipping_delay", 0.3, Some(3)),
            ("product_defect", 0.1, Some(2)),
            ("product_defect", 0.35, Some(2)),
            ("billing", 0.5, None),
            ("billing", 0.6, None),
            ("sizing", 0.65, Some(1)),
            ("praise", 0.9, Some(1)),
            ("praise", 0.85, Some(5)),
            ("sizing", 0.7, Some(4)),
        ];
        for (idx, (category, sentiment, product_id)) in sentiments.iter().enumerate() {
            data.tickets.push(Ticket {
                id: idx as i64 + 1,
                product_id: *product_id,
                issue_category: category.to_string(),
                sentiment: *sentiment,
                priority: "medium".to_string(),
                open: true,
                resolution: None,
                created_at: now - Duration::days((idx % 6) as i64),
            });
        }

        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_has_every_entity_kind() {
        let data = OpsDataset::with_fixture();
        data.read(|d| {
            assert_eq!(d.products.len(), 6);
            assert!(!d.orders.is_empty());
            assert_eq!(d.campaigns.len(), 4);
            assert_eq!(d.tickets.len(), 10);
        })
        .await;
    }

    #[tokio::test]
    async fn write_mutates_in_place() {
        let data = OpsDataset::with_fixture();
        data.write(|d| d.products[0].stock_qty = 99).await;
        let qty = data.read(|d| d.products[0].stock_qty).await;
        assert_eq!(qty, 99);
    }
}
