//! Declarative argument schemas for tools. Validation walks fields in
//! declaration order and reports the first offending field, so the same
//! bad input always produces the same error.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct SchemaViolation {
    pub field: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        exclusive_min: bool,
    },
    Text {
        #[serde(skip_serializing_if = "Option::is_none")]
        one_of: Option<Vec<&'static str>>,
    },
    Bool,
    IntegerList,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: &'static str,
}

impl FieldSpec {
    pub fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Integer {
                min: None,
                max: None,
            },
            required: false,
            default: None,
            description: "",
        }
    }

    pub fn number(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Number {
                min: None,
                max: None,
                exclusive_min: false,
            },
            required: false,
            default: None,
            description: "",
        }
    }

    pub fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text { one_of: None },
            required: false,
            default: None,
            description: "",
        }
    }

    pub fn boolean(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Bool,
            required: false,
            default: None,
            description: "",
        }
    }

    pub fn integer_list(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::IntegerList,
            required: false,
            default: None,
            description: "",
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn range(mut self, lo: i64, hi: i64) -> Self {
        if let FieldKind::Integer { min, max } = &mut self.kind {
            *min = Some(lo);
            *max = Some(hi);
        }
        self
    }

    pub fn number_range(mut self, lo: f64, hi: f64) -> Self {
        if let FieldKind::Number { min, max, .. } = &mut self.kind {
            *min = Some(lo);
            *max = Some(hi);
        }
        self
    }

    pub fn greater_than(mut self, lo: f64) -> Self {
        if let FieldKind::Number {
            min, exclusive_min, ..
        } = &mut self.kind
        {
            *min = Some(lo);
            *exclusive_min = true;
        }
        self
    }

    pub fn one_of(mut self, options: &[&'static str]) -> Self {
        if let FieldKind::Text { one_of } = &mut self.kind {
            *one_of = Some(options.to_vec());
        }
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn describe(mut self, text: &'static str) -> Self {
        self.description = text;
        self
    }

    fn check(&self, value: &Value) -> Result<(), SchemaViolation> {
        match &self.kind {
            FieldKind::Integer { min, max } => {
                let Some(n) = value.as_i64() else {
                    return Err(SchemaViolation::new(self.name, "must be an integer"));
                };
                if let Some(lo) = min {
                    if n < *lo {
                        return Err(SchemaViolation::new(
                            self.name,
                            format!("must be >= {lo}"),
                        ));
                    }
                }
                if let Some(hi) = max {
                    if n > *hi {
                        return Err(SchemaViolation::new(
                            self.name,
                            format!("must be <= {hi}"),
                        ));
                    }
                }
            }
            FieldKind::Number {
                min,
                max,
                exclusive_min,
            } => {
                let Some(n) = value.as_f64() else {
                    return Err(SchemaViolation::new(self.name, "must be a number"));
                };
                if let Some(lo) = min {
                    if *exclusive_min && n <= *lo {
                        return Err(SchemaViolation::new(self.name, format!("must be > {lo}")));
                    }
                    if !*exclusive_min && n < *lo {
                        return Err(SchemaViolation::new(
                            self.name,
                            format!("must be >= {lo}"),
                        ));
                    }
                }
                if let Some(hi) = max {
                    if n > *hi {
                        return Err(SchemaViolation::new(
                            self.name,
                            format!("must be <= {hi}"),
                        ));
                    }
                }
            }
            FieldKind::Text { one_of } => {
                let Some(s) = value.as_str() else {
                    return Err(SchemaViolation::new(self.name, "must be a string"));
                };
                if let Some(options) = one_of {
                    if !options.iter().any(|option| *option == s) {
                        return Err(SchemaViolation::new(
                            self.name,
                            format!("must be one of: {}", options.join(", ")),
                        ));
                    }
                }
            }
            FieldKind::Bool => {
                if !value.is_boolean() {
                    return Err(SchemaViolation::new(self.name, "must be a boolean"));
                }
            }
            FieldKind::IntegerList => {
                let Some(items) = value.as_array() else {
                    return Err(SchemaViolation::new(self.name, "must be a list of integers"));
                };
                if items.iter().any(|item| item.as_i64().is_none()) {
                    return Err(SchemaViolation::new(self.name, "must be a list of integers"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub mutating: bool,
    pub fields: Vec<FieldSpec>,
}

impl ToolSchema {
    pub fn read_only(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            mutating: false,
            fields: Vec::new(),
        }
    }

    pub fn mutating(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            mutating: true,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Validate `arguments` against the schema and return the normalized
    /// argument map with defaults applied. Unknown fields are dropped.
    pub fn validate(&self, arguments: &Value) -> Result<Map<String, Value>, SchemaViolation> {
        let empty = Map::new();
        let supplied: &Map<String, Value> = match arguments {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(SchemaViolation::new(
                    "arguments",
                    "must be an object",
                ))
            }
        };

        let mut normalized = Map::new();
        for spec in &self.fields {
            match supplied.get(spec.name) {
                Some(Value::Null) | None => {
                    if let Some(default) = &spec.default {
                        normalized.insert(spec.name.to_string(), default.clone());
                    } else if spec.required {
                        return Err(SchemaViolation::new(spec.name, "is required"));
                    }
                }
                Some(value) => {
                    spec.check(value)?;
                    normalized.insert(spec.name.to_string(), value.clone());
                }
            }
        }
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sales_schema() -> ToolSchema {
        ToolSchema::read_only("get_sales_summary", "Aggregated sales metrics")
            .field(
                FieldSpec::integer("window_days")
                    .range(1, 90)
                    .default_value(json!(7)),
            )
            .field(
                FieldSpec::text("group_by")
                    .one_of(&["day", "week"])
                    .default_value(json!("day")),
            )
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let normalized = sales_schema().validate(&json!({})).unwrap();
        assert_eq!(normalized["window_days"], 7);
        assert_eq!(normalized["group_by"], "day");
    }

    #[test]
    fn zero_window_names_offending_field() {
        let violation = sales_schema()
            .validate(&json!({"window_days": 0}))
            .unwrap_err();
        assert_eq!(violation.field, "window_days");
        assert_eq!(violation.message, "must be >= 1");
    }

    #[test]
    fn first_offender_follows_declaration_order() {
        // Both fields are invalid; window_days is declared first.
        let violation = sales_schema()
            .validate(&json!({"group_by": "month", "window_days": 0}))
            .unwrap_err();
        assert_eq!(violation.field, "window_days");
    }

    #[test]
    fn enum_field_rejects_unknown_value() {
        let violation = sales_schema()
            .validate(&json!({"group_by": "month"}))
            .unwrap_err();
        assert_eq!(violation.field, "group_by");
        assert!(violation.message.contains("day, week"));
    }

    #[test]
    fn required_field_missing_is_reported() {
        let schema = ToolSchema::mutating("update_inventory", "Adjust stock")
            .field(FieldSpec::integer("product_id").required())
            .field(FieldSpec::integer("quantity_change").required());
        let violation = schema
            .validate(&json!({"quantity_change": 5}))
            .unwrap_err();
        assert_eq!(violation.field, "product_id");
        assert_eq!(violation.message, "is required");
    }

    #[test]
    fn exclusive_minimum_rejects_boundary() {
        let schema = ToolSchema::mutating("update_campaign_budget", "Set budget")
            .field(FieldSpec::number("new_budget").required().greater_than(0.0));
        let violation = schema.validate(&json!({"new_budget": 0.0})).unwrap_err();
        assert_eq!(violation.field, "new_budget");
        assert_eq!(violation.message, "must be > 0");
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let normalized = sales_schema()
            .validate(&json!({"window_days": 30, "noise": true}))
            .unwrap();
        assert_eq!(normalized["window_days"], 30);
        assert!(!normalized.contains_key("noise"));
    }

    #[test]
    fn non_object_arguments_rejected() {
        let violation = sales_schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(violation.field, "arguments");
    }

    #[test]
    fn integer_list_checks_element_types() {
        let schema = ToolSchema::read_only("get_inventory_status", "Stock levels")
            .field(FieldSpec::integer_list("product_ids"));
        assert!(schema.validate(&json!({"product_ids": [1, 2, 3]})).is_ok());
        let violation = schema
            .validate(&json!({"product_ids": [1, "two"]}))
            .unwrap_err();
        assert_eq!(violation.field, "product_ids");
    }
}
