//! Wire contract for tool invocation. These shapes are consumed by external
//! callers and must stay bit-exact: `{tool, arguments}` in,
//! `{success, result, metadata}` or `{success, error}` out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

impl InvokeRequest {
    pub fn new(tool: &str, arguments: Value) -> Self {
        Self {
            tool: tool.to_string(),
            arguments,
        }
    }
}

/// Error taxonomy of the invocation boundary. Serialized as the bare
/// variant name (`"ValidationError"`, `"ToolTimeout"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    UnknownTool,
    ValidationError,
    ApprovalRequired,
    ToolTimeout,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::ApprovalRequired => "ApprovalRequired",
            ErrorKind::ToolTimeout => "ToolTimeout",
            ErrorKind::InternalError => "InternalError",
        }
    }

    /// Input and authorization errors are never retried; timeouts are the
    /// transient class callers may retry with backoff.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::ToolTimeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub tool: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub result: Value,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvokeResponse {
    Success(SuccessResponse),
    Error(ErrorResponse),
}

impl InvokeResponse {
    pub fn ok(tool: &str, duration_ms: f64, result: Value) -> Self {
        InvokeResponse::Success(SuccessResponse {
            success: true,
            result,
            metadata: ToolMetadata {
                tool: tool.to_string(),
                duration_ms,
            },
        })
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        InvokeResponse::Error(ErrorResponse {
            success: false,
            error: ErrorDetail {
                kind,
                message: message.into(),
            },
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvokeResponse::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            InvokeResponse::Success(_) => None,
            InvokeResponse::Error(resp) => Some(resp.error.kind),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            InvokeResponse::Success(resp) => Some(&resp.result),
            InvokeResponse::Error(_) => None,
        }
    }
}
