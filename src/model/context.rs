//! The caller's evaluation input (§3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A scalar or collection attribute value in an [`EvaluationContext`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<serde_json::Value>),
}

impl AttributeValue {
    /// Numeric coercion for `Lt`/`Lte`/`Gt`/`Gte` (§4.B). Deliberately does
    /// not parse `String` — a numeric-looking string attribute (`"25"`) is a
    /// type mismatch, and the spec requires a type mismatch on a numeric
    /// operator to fail the constraint rather than silently coerce.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::String(_) | AttributeValue::Bool(_) | AttributeValue::List(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// The caller's input to an evaluation: which entity, and what it looks like.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvaluationContext {
    pub entity_id: String,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
}

fn default_entity_type() -> String {
    "user".to_string()
}

impl EvaluationContext {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type: default_entity_type(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_entity_type_is_user() {
        let ctx = EvaluationContext::new("u1");
        assert_eq!(ctx.entity_type, "user");
    }

    #[test]
    fn builder_sets_attributes() {
        let ctx = EvaluationContext::new("u1")
            .with_entity_type("account")
            .with_attribute("country", "BR");
        assert_eq!(ctx.entity_type, "account");
        assert_eq!(
            ctx.attributes.get("country").and_then(|v| v.as_str()),
            Some("BR")
        );
    }
}
