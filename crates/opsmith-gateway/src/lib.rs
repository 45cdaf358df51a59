//! The invocation gateway: every tool call, from workers or from the
//! approved-action path, goes through `Gateway::invoke`. Failures come
//! back as typed envelopes; nothing is raised past this boundary.

use std::time::{Duration, Instant};

use tracing::Level;

use opsmith_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use opsmith_tools::ToolRegistry;
use opsmith_wire::{ErrorKind, InvokeRequest, InvokeResponse};

/// Out-of-band bearer credential accompanying an invocation.
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    bearer: Option<String>,
}

impl CallerIdentity {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { bearer: None }
    }
}

#[derive(Clone)]
pub struct Gateway {
    registry: ToolRegistry,
    api_key: String,
    tool_timeout: Duration,
}

impl Gateway {
    pub fn new(registry: ToolRegistry, api_key: impl Into<String>, tool_timeout: Duration) -> Self {
        Self {
            registry,
            api_key: api_key.into(),
            tool_timeout,
        }
    }

    /// Execute one tool call. `post_approval` is set only by the executor's
    /// approved-action path; it is the single way a mutating tool runs.
    pub async fn invoke(
        &self,
        request: &InvokeRequest,
        caller: &CallerIdentity,
        post_approval: bool,
    ) -> InvokeResponse {
        let start = Instant::now();

        // Reject fast, before any other work.
        let authorized = caller
            .bearer
            .as_deref()
            .map(|token| token == self.api_key)
            .unwrap_or(false);
        if !authorized {
            let fingerprint = caller
                .bearer
                .as_deref()
                .map(redact_text)
                .unwrap_or_else(|| "missing credential".to_string());
            tracing::warn!(target: "opsmith.audit", tool = %request.tool, credential = %fingerprint, "unauthorized invocation");
            return self.finish(
                request,
                start,
                InvokeResponse::error(ErrorKind::Unauthorized, "Invalid or missing API key"),
            );
        }

        let tool = match self.registry.resolve(&request.tool) {
            Ok(tool) => tool,
            Err(err) => {
                return self.finish(
                    request,
                    start,
                    InvokeResponse::error(ErrorKind::UnknownTool, err.to_string()),
                )
            }
        };

        // The approval gate comes before argument validation: a mutating
        // call without the flag is refused regardless of argument validity,
        // so no detail about a blocked action leaks from validation.
        if tool.schema().mutating && !post_approval {
            return self.finish(
                request,
                start,
                InvokeResponse::error(
                    ErrorKind::ApprovalRequired,
                    format!("Tool '{}' mutates state and requires approval", request.tool),
                ),
            );
        }

        let normalized = match tool.schema().validate(&request.arguments) {
            Ok(args) => args,
            Err(violation) => {
                return self.finish(
                    request,
                    start,
                    InvokeResponse::error(ErrorKind::ValidationError, violation.to_string()),
                )
            }
        };

        let response = match tokio::time::timeout(self.tool_timeout, tool.execute(normalized)).await
        {
            Err(_) => InvokeResponse::error(
                ErrorKind::ToolTimeout,
                format!(
                    "Tool '{}' exceeded {}ms",
                    request.tool,
                    self.tool_timeout.as_millis()
                ),
            ),
            Ok(Err(err)) => InvokeResponse::error(
                ErrorKind::InternalError,
                format!("Tool '{}' failed: {err}", request.tool),
            ),
            Ok(Ok(result)) => {
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                InvokeResponse::ok(&request.tool, duration_ms, result)
            }
        };
        self.finish(request, start, response)
    }

    /// Record the invocation to the observability sink regardless of
    /// outcome, then hand the envelope back.
    fn finish(
        &self,
        request: &InvokeRequest,
        start: Instant,
        response: InvokeResponse,
    ) -> InvokeResponse {
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let (level, status, error_code) = match response.error_kind() {
            None => (Level::INFO, "ok", None),
            Some(kind) => (Level::WARN, "error", Some(kind.as_str())),
        };
        emit_event(
            level,
            ProcessKind::Gateway,
            ObservabilityEvent {
                event: "tool.invoke",
                component: "gateway",
                tool: Some(&request.tool),
                status: Some(status),
                error_code,
                detail: Some(&format!("{duration_ms:.1}ms")),
                ..Default::default()
            },
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;

    use opsmith_tools::{
        standard_registry, FieldSpec, OpsDataset, StaticRecall, Tool, ToolSchema,
    };

    const KEY: &str = "test-key";

    fn gateway() -> Gateway {
        let registry = standard_registry(
            Arc::new(OpsDataset::with_fixture()),
            Arc::new(StaticRecall::with_fixture()),
        )
        .unwrap();
        Gateway::new(registry, KEY, Duration::from_millis(500))
    }

    fn caller() -> CallerIdentity {
        CallerIdentity::bearer(KEY)
    }

    #[tokio::test]
    async fn missing_credential_is_rejected_first() {
        let gw = gateway();
        let req = InvokeRequest::new("no_such_tool", json!({}));
        let resp = gw.invoke(&req, &CallerIdentity::anonymous(), false).await;
        assert_eq!(resp.error_kind(), Some(ErrorKind::Unauthorized));
    }

    #[tokio::test]
    async fn wrong_credential_is_rejected() {
        let gw = gateway();
        let req = InvokeRequest::new("get_sales_summary", json!({}));
        let resp = gw
            .invoke(&req, &CallerIdentity::bearer("wrong"), false)
            .await;
        assert_eq!(resp.error_kind(), Some(ErrorKind::Unauthorized));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let gw = gateway();
        let req = InvokeRequest::new("no_such_tool", json!({}));
        let resp = gw.invoke(&req, &caller(), false).await;
        assert_eq!(resp.error_kind(), Some(ErrorKind::UnknownTool));
    }

    #[tokio::test]
    async fn validation_error_names_first_field() {
        let gw = gateway();
        let req = InvokeRequest::new("get_sales_summary", json!({"window_days": 0}));
        let resp = gw.invoke(&req, &caller(), false).await;
        assert_eq!(resp.error_kind(), Some(ErrorKind::ValidationError));
        match resp {
            InvokeResponse::Error(err) => {
                assert!(err.error.message.starts_with("window_days:"));
            }
            _ => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn mutating_without_flag_requires_approval_even_with_bad_args() {
        let gw = gateway();
        for arguments in [
            json!({"product_id": 1, "quantity_change": 5}),
            json!({"quantity_change": "not-an-int"}),
        ] {
            let req = InvokeRequest::new("update_inventory", arguments);
            let resp = gw.invoke(&req, &caller(), false).await;
            assert_eq!(resp.error_kind(), Some(ErrorKind::ApprovalRequired));
        }
    }

    #[tokio::test]
    async fn post_approval_flag_lets_mutating_tool_run() {
        let gw = gateway();
        let req = InvokeRequest::new(
            "update_inventory",
            json!({"product_id": 1, "quantity_change": 5}),
        );
        let resp = gw.invoke(&req, &caller(), true).await;
        assert!(resp.is_success());
        assert_eq!(resp.result().unwrap()["success"], true);
    }

    #[tokio::test]
    async fn successful_call_carries_metadata() {
        let gw = gateway();
        let req = InvokeRequest::new("get_sales_summary", json!({"window_days": 7}));
        let resp = gw.invoke(&req, &caller(), false).await;
        match resp {
            InvokeResponse::Success(ok) => {
                assert_eq!(ok.metadata.tool, "get_sales_summary");
                assert!(ok.metadata.duration_ms >= 0.0);
                assert!(ok.result["summary"]["total_revenue"].as_f64().unwrap() >= 0.0);
            }
            _ => panic!("expected success"),
        }
    }

    struct SlowTool {
        schema: ToolSchema,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn schema(&self) -> &ToolSchema {
            &self.schema
        }

        async fn execute(&self, _args: Map<String, Value>) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let registry = opsmith_tools::ToolRegistry::builder()
            .register(SlowTool {
                schema: ToolSchema::read_only("slow", "Sleeps").field(FieldSpec::text("noop")),
            })
            .unwrap()
            .build();
        let gw = Gateway::new(registry, KEY, Duration::from_millis(20));
        let req = InvokeRequest::new("slow", json!({}));
        let resp = gw.invoke(&req, &caller(), false).await;
        assert_eq!(resp.error_kind(), Some(ErrorKind::ToolTimeout));
    }
}
