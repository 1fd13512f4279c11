//! The closed operator set (§4.B) — a hand-rolled dispatcher keyed on
//! [`Operator`], not a sandboxed expression engine. No arbitrary code
//! execution from flag content is possible: the match below is exhaustive
//! over a fixed enum, and `MATCHES` delegates to the `regex` crate rather
//! than interpreting anything flag-authored beyond a pattern string.

use crate::model::{AttributeValue, Operator};
use regex::Regex;

/// Evaluate a single operator against a context attribute and a constraint
/// literal. A missing attribute, or a type mismatch the operator can't
/// coerce, is a constraint failure rather than an error.
pub fn evaluate_operator(
    operator: Operator,
    attribute: Option<&AttributeValue>,
    literal: &serde_json::Value,
) -> bool {
    match operator {
        Operator::Eq => attribute.is_some_and(|a| values_equal(a, literal)),
        Operator::Neq => attribute.is_some_and(|a| !values_equal(a, literal)),
        Operator::In => attribute.is_some_and(|a| list_contains(literal, a)),
        Operator::Notin => attribute.is_some_and(|a| !list_contains(literal, a)),
        Operator::Lt => numeric_cmp(attribute, literal, |a, b| a < b),
        Operator::Lte => numeric_cmp(attribute, literal, |a, b| a <= b),
        Operator::Gt => numeric_cmp(attribute, literal, |a, b| a > b),
        Operator::Gte => numeric_cmp(attribute, literal, |a, b| a >= b),
        Operator::Matches => matches_regex(attribute, literal),
        Operator::Contains => contains_substring(attribute, literal),
    }
}

fn values_equal(attribute: &AttributeValue, literal: &serde_json::Value) -> bool {
    match (attribute, literal) {
        (AttributeValue::String(s), serde_json::Value::String(l)) => s == l,
        (AttributeValue::Bool(b), serde_json::Value::Bool(l)) => b == l,
        (AttributeValue::Int(i), serde_json::Value::Number(n)) => {
            n.as_i64().is_some_and(|l| *i == l) || n.as_f64().is_some_and(|l| *i as f64 == l)
        }
        (AttributeValue::Float(f), serde_json::Value::Number(n)) => {
            n.as_f64().is_some_and(|l| *f == l)
        }
        _ => false,
    }
}

fn list_contains(literal: &serde_json::Value, attribute: &AttributeValue) -> bool {
    let serde_json::Value::Array(items) = literal else {
        return false;
    };
    items.iter().any(|item| values_equal(attribute, item))
}

fn numeric_cmp(
    attribute: Option<&AttributeValue>,
    literal: &serde_json::Value,
    cmp: impl Fn(f64, f64) -> bool,
) -> bool {
    let Some(attribute) = attribute else {
        return false;
    };
    let Some(a) = attribute.as_f64() else {
        return false;
    };
    let Some(l) = literal.as_f64() else {
        return false;
    };
    cmp(a, l)
}

fn matches_regex(attribute: Option<&AttributeValue>, literal: &serde_json::Value) -> bool {
    let (Some(attribute), Some(pattern)) = (attribute, literal.as_str()) else {
        return false;
    };
    let Some(subject) = attribute.as_str() else {
        return false;
    };
    match Regex::new(pattern) {
        Ok(re) => re.is_match(subject),
        Err(_) => false,
    }
}

fn contains_substring(attribute: Option<&AttributeValue>, literal: &serde_json::Value) -> bool {
    let (Some(attribute), Some(needle)) = (attribute, literal.as_str()) else {
        return false;
    };
    let Some(subject) = attribute.as_str() else {
        return false;
    };
    subject.contains(needle)
}
