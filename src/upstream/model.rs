//! Wire shapes for the upstream HTTP surface (§6). These mirror the JSON the
//! upstream actually sends, separate from [`crate::model::Flag`] so a wire
//! format change doesn't ripple into the evaluator.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One entry of `GET /api/v1/flags`.
#[derive(Debug, Clone, Deserialize)]
pub struct FlagSummary {
    pub id: i64,
    pub key: String,
    #[serde(default)]
    pub tags: HashSet<String>,
}

/// Request body for `POST /api/v1/evaluation`.
#[derive(Debug, Serialize)]
pub struct EvaluationRequest {
    #[serde(rename = "flagKey")]
    pub flag_key: String,
    #[serde(rename = "entityContext")]
    pub entity_context: EntityContext,
    pub context: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct EntityContext {
    #[serde(rename = "entityID")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: String,
}

/// Response body for `POST /api/v1/evaluation`.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationResponse {
    #[serde(rename = "flagKey")]
    pub flag_key: String,
    #[serde(rename = "variantKey")]
    pub variant_key: Option<String>,
    #[serde(rename = "variantAttachment", default)]
    pub variant_attachment: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl From<&crate::model::EvaluationContext> for EntityContext {
    fn from(ctx: &crate::model::EvaluationContext) -> Self {
        Self {
            entity_id: ctx.entity_id.clone(),
            entity_type: ctx.entity_type.clone(),
        }
    }
}

pub fn context_to_json(ctx: &crate::model::EvaluationContext) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for (key, value) in &ctx.attributes {
        let json_value = match value {
            crate::model::AttributeValue::String(s) => serde_json::Value::String(s.clone()),
            crate::model::AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            crate::model::AttributeValue::Int(i) => serde_json::Value::from(*i),
            crate::model::AttributeValue::Float(f) => serde_json::Value::from(*f),
            crate::model::AttributeValue::List(items) => serde_json::Value::Array(items.clone()),
        };
        map.insert(key.clone(), json_value);
    }
    map
}
