//! The strategy classifier (§4.A) — a pure function, not a method on `Flag`,
//! so the router can be tested independently and disk-loaded flags can be
//! classified without reconstructing any behavior.

use crate::model::Flag;

/// Whether a flag can be answered purely from the local cache, or must be
/// delegated to the upstream's sticky bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Local,
    Remote,
}

/// Classify a flag as [`Strategy::Local`] or [`Strategy::Remote`].
///
/// Disabled flags still classify `Local` — they short-circuit to "no match"
/// without ever consulting the upstream. A flag only needs the upstream when
/// some segment has a partial rollout or a multi-variant (or non-100%)
/// distribution, since only the upstream owns the sticky hash of the entity
/// id that such splits require.
pub fn classify(flag: &Flag) -> Strategy {
    if !flag.enabled {
        return Strategy::Local;
    }

    for segment in &flag.segments {
        if segment.rollout_percent != 0 && segment.rollout_percent != 100 {
            return Strategy::Remote;
        }
        if segment.distributions.len() > 1 {
            return Strategy::Remote;
        }
        if let Some(dist) = segment.distributions.first()
            && dist.percent != 100
        {
            return Strategy::Remote;
        }
    }

    Strategy::Local
}
