//! The answer returned from an evaluation (§3) and its typed accessors.
//!
//! Attachments are kept as an opaque `serde_json::Value` map rather than
//! eagerly decoded into a tagged union — most keys a caller never reads, so
//! decoding happens lazily in `GetString`/`GetInt`/`IsEnabled`.

use std::collections::HashMap;

/// The result of evaluating a single flag for a single context.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub flag_key: String,
    pub variant_key: Option<String>,
    pub variant_attachment: HashMap<String, serde_json::Value>,
    pub evaluation_reason: String,
}

const ENABLED_VARIANT_KEYS: [&str; 3] = ["enabled", "on", "true"];

impl EvaluationResult {
    pub fn unmatched(flag_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            flag_key: flag_key.into(),
            variant_key: None,
            variant_attachment: HashMap::new(),
            evaluation_reason: reason.into(),
        }
    }

    /// True iff the attachment carries `enabled: true`, `value: true`, or (if
    /// the attachment is empty) the variant key is one of the well-known
    /// truthy keys.
    pub fn is_enabled(&self) -> bool {
        if let Some(serde_json::Value::Bool(b)) = self.variant_attachment.get("enabled") {
            return *b;
        }
        if let Some(serde_json::Value::Bool(b)) = self.variant_attachment.get("value") {
            return *b;
        }
        if self.variant_attachment.is_empty()
            && let Some(key) = &self.variant_key
        {
            return ENABLED_VARIANT_KEYS.contains(&key.as_str());
        }
        false
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.variant_attachment
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.variant_attachment
            .get(key)
            .and_then(|v| v.as_i64())
            .unwrap_or(default)
    }
}
