//! The cached unit and its nested shapes (§3).
//!
//! Mirrors the shape the refresh orchestrator (component F) receives from the
//! upstream's `GET /api/v1/flags/{id}` response, plus the invariants the rest
//! of the core relies on (classifier, local evaluator).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A feature flag as cached locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flag {
    pub key: String,
    #[serde(default)]
    pub id: Option<i64>,
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub tags: HashSet<String>,
}

impl Flag {
    /// Look up a variant by id; used by the local evaluator to resolve a
    /// segment's distribution into a concrete `Variant`.
    pub fn variant(&self, key: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.key == key)
    }
}

/// An ordered rule within a flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub rank: i64,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub rollout_percent: u8,
    #[serde(default)]
    pub distributions: Vec<Distribution>,
}

/// A predicate on the evaluation context (§4.B for the operator set).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constraint {
    pub property: String,
    pub operator: Operator,
    pub value: serde_json::Value,
}

/// The closed operator set (§4.B). No arbitrary code execution from flag
/// content — this is a fixed enum, not an expression string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Eq,
    Neq,
    In,
    Notin,
    Lt,
    Lte,
    Gt,
    Gte,
    Matches,
    Contains,
}

/// A (variant, percent) pair used by the upstream's sticky bucketing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Distribution {
    pub variant_key: String,
    pub percent: u8,
}

/// The produced value of a flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub key: String,
    #[serde(default)]
    pub attachment: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_variant_lookup() {
        let flag = Flag {
            key: "f".into(),
            id: None,
            enabled: true,
            description: String::new(),
            segments: vec![],
            variants: vec![Variant {
                key: "on".into(),
                attachment: HashMap::new(),
            }],
            tags: HashSet::new(),
        };
        assert!(flag.variant("on").is_some());
        assert!(flag.variant("off").is_none());
    }

    #[test]
    fn operator_roundtrips_through_json() {
        let c = Constraint {
            property: "country".into(),
            operator: Operator::Eq,
            value: serde_json::json!("BR"),
        };
        let encoded = serde_json::to_string(&c).unwrap();
        let decoded: Constraint = serde_json::from_str(&encoded).unwrap();
        assert_eq!(c, decoded);
    }
}
