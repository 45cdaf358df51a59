//! Similarity recall over past incidents. The real vector search lives
//! outside this system; `RecallProvider` is its input/output contract and
//! `StaticRecall` a deterministic stand-in for tests and local runs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::schema::{FieldSpec, ToolSchema};
use crate::Tool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentMatch {
    pub incident_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_taken: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    pub score: f64,
}

#[async_trait]
pub trait RecallProvider: Send + Sync {
    async fn recall(
        &self,
        query: &str,
        k: usize,
        min_score: f64,
    ) -> anyhow::Result<Vec<IncidentMatch>>;
}

/// Token-overlap scoring over a fixed incident list. Deterministic, which
/// is what the tests need; swap in a real embedding-backed provider in
/// production wiring.
#[derive(Default)]
pub struct StaticRecall {
    incidents: Vec<IncidentMatch>,
}

impl StaticRecall {
    pub fn new(incidents: Vec<IncidentMatch>) -> Self {
        Self { incidents }
    }

    pub fn with_fixture() -> Self {
        Self::new(vec![
            IncidentMatch {
                incident_summary: "Revenue dropped 18% after checkout latency spike".to_string(),
                root_cause: Some("Payment gateway timeout under load".to_string()),
                action_taken: Some("Scaled payment workers; added retry budget".to_string()),
                outcome: Some("Recovered within two days".to_string()),
                score: 0.0,
            },
            IncidentMatch {
                incident_summary: "Out of stock on top seller during campaign".to_string(),
                root_cause: Some("Restock order delayed by supplier".to_string()),
                action_taken: Some("Paused campaign; emergency restock".to_string()),
                outcome: Some("Lost sales for one week".to_string()),
                score: 0.0,
            },
            IncidentMatch {
                incident_summary: "Negative support sentiment spike over sizing issues".to_string(),
                root_cause: Some("New size chart published with wrong measurements".to_string()),
                action_taken: Some("Corrected chart; proactive outreach".to_string()),
                outcome: Some("Sentiment recovered".to_string()),
                score: 0.0,
            },
        ])
    }
}

fn overlap_score(query: &str, text: &str) -> f64 {
    let query_tokens: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    let hits = query_tokens
        .iter()
        .filter(|token| text_lower.contains(token.as_str()))
        .count();
    hits as f64 / query_tokens.len() as f64
}

#[async_trait]
impl RecallProvider for StaticRecall {
    async fn recall(
        &self,
        query: &str,
        k: usize,
        min_score: f64,
    ) -> anyhow::Result<Vec<IncidentMatch>> {
        let mut scored: Vec<IncidentMatch> = self
            .incidents
            .iter()
            .map(|incident| {
                let mut hit = incident.clone();
                hit.score = overlap_score(query, &incident.incident_summary);
                hit
            })
            .filter(|hit| hit.score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

pub struct PastIncidentsTool {
    provider: Arc<dyn RecallProvider>,
    schema: ToolSchema,
}

impl PastIncidentsTool {
    pub fn new(provider: Arc<dyn RecallProvider>) -> Self {
        Self {
            provider,
            schema: ToolSchema::read_only(
                "query_past_incidents",
                "Ranked list of similar past incidents for a free-text query.",
            )
            .field(FieldSpec::text("query").required())
            .field(
                FieldSpec::integer("k")
                    .range(1, 10)
                    .default_value(json!(3)),
            )
            .field(
                FieldSpec::number("min_score")
                    .number_range(0.0, 1.0)
                    .default_value(json!(0.0)),
            ),
        }
    }
}

#[async_trait]
impl Tool for PastIncidentsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let k = args.get("k").and_then(Value::as_i64).unwrap_or(3) as usize;
        let min_score = args
            .get("min_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let matches = self.provider.recall(&query, k, min_score).await?;
        let count = matches.len();
        Ok(json!({
            "query": query,
            "matches": matches,
            "count": count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recall_ranks_by_overlap() {
        let provider = StaticRecall::with_fixture();
        let matches = provider
            .recall("why did revenue drop", 3, 0.0)
            .await
            .unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches[0].incident_summary.contains("Revenue"));
        assert!(matches[0].score >= matches[1].score);
    }

    #[tokio::test]
    async fn min_score_filters_weak_matches() {
        let provider = StaticRecall::with_fixture();
        let matches = provider.recall("revenue dropped", 5, 0.9).await.unwrap();
        assert!(matches.len() <= 1);
    }

    #[tokio::test]
    async fn tool_requires_query() {
        let tool = PastIncidentsTool::new(Arc::new(StaticRecall::with_fixture()));
        let violation = tool.schema().validate(&json!({})).unwrap_err();
        assert_eq!(violation.field, "query");
    }

    #[tokio::test]
    async fn tool_caps_results_at_k() {
        let tool = PastIncidentsTool::new(Arc::new(StaticRecall::with_fixture()));
        let args = tool
            .schema()
            .validate(&json!({"query": "stock campaign sentiment revenue", "k": 2}))
            .unwrap();
        let result = tool.execute(args).await.unwrap();
        assert!(result["matches"].as_array().unwrap().len() <= 2);
    }
}
