//! Data shapes shared across the core (§3).

mod context;
mod flag;
mod result;

pub use context::{AttributeValue, EvaluationContext};
pub use flag::{Constraint, Distribution, Flag, Operator, Segment, Variant};
pub use result::EvaluationResult;
