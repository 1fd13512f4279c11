//! The local evaluator (§4.B) — resolves a `LOCAL`-classified flag against a
//! context without ever touching the upstream.

use crate::model::{EvaluationContext, EvaluationResult, Flag};
use crate::targeting::segment_matches;

/// Evaluate `flag` against `ctx` using only cached state.
///
/// Segments are tried in ascending `rank` order; the first one whose
/// constraints all hold wins. A winning segment with no distribution, or no
/// segment matching at all, both report "not enabled" — the router is the
/// one that turns that into a fallback decision, this function only reports
/// what locally-available data says.
pub fn evaluate(flag: &Flag, ctx: &EvaluationContext) -> EvaluationResult {
    if !flag.enabled {
        return EvaluationResult::unmatched(&flag.key, "flag disabled");
    }

    let mut ranked: Vec<_> = flag.segments.iter().collect();
    ranked.sort_by_key(|s| s.rank);

    for segment in ranked {
        if !segment_matches(segment, ctx) {
            continue;
        }
        let Some(dist) = segment.distributions.first() else {
            return EvaluationResult::unmatched(&flag.key, "no segment matched");
        };
        let Some(variant) = flag.variant(&dist.variant_key) else {
            return EvaluationResult::unmatched(&flag.key, "no segment matched");
        };
        return EvaluationResult {
            flag_key: flag.key.clone(),
            variant_key: Some(variant.key.clone()),
            variant_attachment: variant.attachment.clone(),
            evaluation_reason: "TARGETING_MATCH".to_string(),
        };
    }

    EvaluationResult::unmatched(&flag.key, "no segment matched")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Constraint, Distribution, Operator, Segment, Variant};
    use serde_json::json;
    use std::collections::{HashMap, HashSet};

    fn flag_with(segments: Vec<Segment>, variants: Vec<Variant>) -> Flag {
        Flag {
            key: "brazil_launch".into(),
            id: Some(1),
            enabled: true,
            description: String::new(),
            segments,
            variants,
            tags: HashSet::new(),
        }
    }

    fn on_variant() -> Variant {
        Variant {
            key: "on".into(),
            attachment: HashMap::from([("enabled".to_string(), json!(true))]),
        }
    }

    #[test]
    fn disabled_flag_is_unmatched() {
        let mut flag = flag_with(vec![], vec![]);
        flag.enabled = false;
        let result = evaluate(&flag, &EvaluationContext::new("u1"));
        assert!(!result.is_enabled());
        assert_eq!(result.evaluation_reason, "flag disabled");
    }

    #[test]
    fn matching_segment_resolves_variant() {
        let seg = Segment {
            rank: 0,
            constraints: vec![Constraint {
                property: "country".into(),
                operator: Operator::Eq,
                value: json!("BR"),
            }],
            rollout_percent: 100,
            distributions: vec![Distribution {
                variant_key: "on".into(),
                percent: 100,
            }],
        };
        let flag = flag_with(vec![seg], vec![on_variant()]);
        let ctx = EvaluationContext::new("u1").with_attribute("country", "BR");
        let result = evaluate(&flag, &ctx);
        assert!(result.is_enabled());
        assert_eq!(result.variant_key.as_deref(), Some("on"));
        assert_eq!(result.evaluation_reason, "TARGETING_MATCH");
    }

    #[test]
    fn first_matching_segment_wins() {
        let narrow = Segment {
            rank: 0,
            constraints: vec![Constraint {
                property: "country".into(),
                operator: Operator::Eq,
                value: json!("BR"),
            }],
            rollout_percent: 100,
            distributions: vec![Distribution {
                variant_key: "on".into(),
                percent: 100,
            }],
        };
        let catch_all = Segment {
            rank: 1,
            constraints: vec![],
            rollout_percent: 100,
            distributions: vec![Distribution {
                variant_key: "off".into(),
                percent: 100,
            }],
        };
        let off_variant = Variant {
            key: "off".into(),
            attachment: HashMap::new(),
        };
        let flag = flag_with(vec![catch_all, narrow], vec![on_variant(), off_variant]);
        let ctx = EvaluationContext::new("u1").with_attribute("country", "BR");
        let result = evaluate(&flag, &ctx);
        assert_eq!(result.variant_key.as_deref(), Some("on"));
    }

    #[test]
    fn no_matching_segment_is_unmatched() {
        let seg = Segment {
            rank: 0,
            constraints: vec![Constraint {
                property: "country".into(),
                operator: Operator::Eq,
                value: json!("BR"),
            }],
            rollout_percent: 100,
            distributions: vec![Distribution {
                variant_key: "on".into(),
                percent: 100,
            }],
        };
        let flag = flag_with(vec![seg], vec![on_variant()]);
        let ctx = EvaluationContext::new("u1").with_attribute("country", "US");
        let result = evaluate(&flag, &ctx);
        assert!(!result.is_enabled());
        assert_eq!(result.evaluation_reason, "no segment matched");
    }

    #[test]
    fn segment_with_no_distribution_is_unmatched() {
        let seg = Segment {
            rank: 0,
            constraints: vec![],
            rollout_percent: 100,
            distributions: vec![],
        };
        let flag = flag_with(vec![seg], vec![]);
        let result = evaluate(&flag, &EvaluationContext::new("u1"));
        assert!(!result.is_enabled());
    }
}
