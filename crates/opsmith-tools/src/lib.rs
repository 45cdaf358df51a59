use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod dataset;
pub mod inventory;
pub mod marketing;
pub mod recall;
pub mod sales;
pub mod schema;
pub mod support;

pub use dataset::{Campaign, OpsData, OpsDataset, OrderRecord, Product, Ticket};
pub use recall::{IncidentMatch, RecallProvider, StaticRecall};
pub use schema::{FieldKind, FieldSpec, SchemaViolation, ToolSchema};

/// A named, schema-described capability. Handlers receive arguments that
/// already passed schema validation with defaults applied.
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;
    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value>;
}

impl std::fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.schema().name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

/// Registered once at process start, immutable afterwards. The builder is
/// the only mutation point; `build` freezes the map behind an `Arc`.
pub struct ToolRegistryBuilder {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, tool: impl Tool + 'static) -> Result<Self, RegistryError> {
        let name = tool.schema().name.to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: Arc::new(self.tools),
        }
    }
}

#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            tools: HashMap::new(),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, UnknownTool> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> =
            self.tools.values().map(|t| t.schema().clone()).collect();
        schemas.sort_by(|a, b| a.name.cmp(b.name));
        schemas
    }
}

/// The full tool set of the operations assistant: read tools per domain,
/// the recall tool, and the HITL-gated mutating tools.
pub fn standard_registry(
    data: Arc<OpsDataset>,
    recall_provider: Arc<dyn RecallProvider>,
) -> Result<ToolRegistry, RegistryError> {
    Ok(ToolRegistry::builder()
        .register(sales::SalesSummaryTool::new(data.clone()))?
        .register(sales::TopProductsTool::new(data.clone()))?
        .register(inventory::InventoryStatusTool::new(data.clone()))?
        .register(inventory::LowStockProductsTool::new(data.clone()))?
        .register(inventory::UpdateInventoryTool::new(data.clone()))?
        .register(marketing::CampaignSpendTool::new(data.clone()))?
        .register(marketing::RoasTool::new(data.clone()))?
        .register(marketing::UpdateCampaignStatusTool::new(data.clone()))?
        .register(marketing::UpdateCampaignBudgetTool::new(data.clone()))?
        .register(support::SupportSentimentTool::new(data.clone()))?
        .register(support::TicketTrendsTool::new(data.clone()))?
        .register(support::EscalateTicketTool::new(data.clone()))?
        .register(support::CloseTicketTool::new(data))?
        .register(recall::PastIncidentsTool::new(recall_provider))?
        .build())
}
