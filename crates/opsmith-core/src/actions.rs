//! Mapping from approved action types to gateway invocations. The worker
//! proposes a domain-level action; execution translates it into the
//! concrete mutating tool call, injecting fixed arguments where the tool
//! contract differs from the proposal shape.

use serde_json::{Map, Value};
use thiserror::Error;

use opsmith_types::PendingAction;
use opsmith_wire::InvokeRequest;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown action type: {0}")]
pub struct UnknownActionType(pub String);

fn copy_fields(payload: &Map<String, Value>, fields: &[&str]) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = payload.get(*field) {
            out.insert((*field).to_string(), value.clone());
        }
    }
    out
}

/// Build the tool invocation for an approved action.
pub fn invocation_for(action: &PendingAction) -> Result<InvokeRequest, UnknownActionType> {
    let payload = action.payload.as_object().cloned().unwrap_or_default();
    let (tool, arguments) = match action.action_type.as_str() {
        "restock_item" => {
            // Proposals speak of a restock quantity; the tool takes a
            // signed delta.
            let mut args = copy_fields(&payload, &["product_id", "reason"]);
            if let Some(quantity) = payload.get("quantity") {
                args.insert("quantity_change".to_string(), quantity.clone());
            }
            ("update_inventory", args)
        }
        "pause_campaign" => {
            let mut args = copy_fields(&payload, &["campaign_id", "reason"]);
            args.insert("status".to_string(), Value::String("paused".to_string()));
            ("update_campaign_status", args)
        }
        "resume_campaign" => {
            let mut args = copy_fields(&payload, &["campaign_id", "reason"]);
            args.insert("status".to_string(), Value::String("active".to_string()));
            ("update_campaign_status", args)
        }
        "adjust_campaign_budget" => (
            "update_campaign_budget",
            copy_fields(&payload, &["campaign_id", "new_budget", "reason"]),
        ),
        "escalate_ticket" => (
            "escalate_ticket",
            copy_fields(&payload, &["ticket_id", "priority", "reason"]),
        ),
        "close_ticket" => (
            "close_ticket",
            copy_fields(&payload, &["ticket_id", "resolution"]),
        ),
        other => return Err(UnknownActionType(other.to_string())),
    };
    Ok(InvokeRequest::new(tool, Value::Object(arguments)))
}
