//! Segment matching (§4.B) built on top of [`operators::evaluate_operator`].
//!
//! A segment matches a context iff every one of its constraints matches
//! (AND). A missing context attribute fails the constraint rather than
//! erroring, so a context that simply doesn't carry a targeting attribute
//! falls through to the next segment instead of blowing up the evaluation.

mod operators;

pub use operators::evaluate_operator;

use crate::model::{Constraint, EvaluationContext, Segment};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A constraint paired with a stable hash of its own shape, so a cache keyed
/// on `compiled_key()` survives flag re-fetches that leave the constraint
/// itself unchanged. Lifetime is bounded by flag replacement: callers drop
/// stale entries whenever a flag is re-fetched from the upstream, rather than
/// this type owning any expiry policy itself.
pub struct CompiledConstraint<'a> {
    constraint: &'a Constraint,
    key: u64,
}

impl<'a> CompiledConstraint<'a> {
    pub fn new(constraint: &'a Constraint) -> Self {
        let mut hasher = DefaultHasher::new();
        constraint.property.hash(&mut hasher);
        constraint.operator.hash(&mut hasher);
        constraint.value.to_string().hash(&mut hasher);
        Self {
            constraint,
            key: hasher.finish(),
        }
    }

    /// Stable across process runs only for the lifetime of one binary version
    /// (`DefaultHasher` gives no cross-version guarantee); good enough as an
    /// in-memory memoization key.
    pub fn compiled_key(&self) -> u64 {
        self.key
    }

    pub fn matches(&self, ctx: &EvaluationContext) -> bool {
        let attribute = ctx.attributes.get(&self.constraint.property);
        evaluate_operator(self.constraint.operator, attribute, &self.constraint.value)
    }
}

/// Whether every constraint in `segment` matches `ctx`. An empty constraint
/// list matches unconditionally — the segment exists purely to gate on
/// rollout percent and distribution.
///
/// Evaluates each constraint directly rather than through
/// [`CompiledConstraint`] — nothing in this crate caches evaluation results
/// keyed on `compiled_key()` yet, so building the wrapper here would only
/// pay its hashing cost without using it. `CompiledConstraint` stays public
/// for a caller that does add such a cache.
pub fn segment_matches(segment: &Segment, ctx: &EvaluationContext) -> bool {
    segment.constraints.iter().all(|constraint| {
        let attribute = ctx.attributes.get(&constraint.property);
        evaluate_operator(constraint.operator, attribute, &constraint.value)
    })
}
