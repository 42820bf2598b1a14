//! Lineage checks between consecutive capsules.

use std::fmt;

use uuid::Uuid;

use crate::capsule::Capsule;
use crate::constants::DIVERGENCE_THRESHOLD;
use crate::state::State;

#[derive(Clone, Debug, PartialEq)]
pub enum ContinuityViolation {
    /// `next.prev_id` does not point at `prev`.
    BrokenLink { expected: Uuid, found: Option<Uuid> },
    /// Curvature moved more than the divergence threshold in one link.
    Diverged { delta: f64 },
    /// State skipped an ordinal step without landing on Collapse.
    Discontinuous { from: State, to: State },
}

impl fmt::Display for ContinuityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BrokenLink { expected, found } => match found {
                Some(id) => write!(f, "broken link: expected parent {expected}, found {id}"),
                None => write!(f, "broken link: expected parent {expected}, found none"),
            },
            Self::Diverged { delta } => write!(f, "curvature jump too large: {delta:.3}"),
            Self::Discontinuous { from, to } => write!(f, "state jump {from} -> {to}"),
        }
    }
}

/// Check one link `prev → next`.
pub fn check_continuity(prev: &Capsule, next: &Capsule) -> Vec<ContinuityViolation> {
    let mut violations = Vec::new();
    if next.prev_id() != Some(prev.id()) {
        violations.push(ContinuityViolation::BrokenLink {
            expected: prev.id(),
            found: next.prev_id(),
        });
    }
    let delta = (next.curvature - prev.curvature).abs();
    if delta > DIVERGENCE_THRESHOLD {
        violations.push(ContinuityViolation::Diverged { delta });
    }
    if next.state != State::Collapse && prev.state.distance(next.state) > 1 {
        violations.push(ContinuityViolation::Discontinuous {
            from: prev.state,
            to: next.state,
        });
    }
    violations
}

/// Check every link of a chain ordered oldest first. Each violation is paired
/// with the index of the later capsule in the link.
pub fn verify_lineage(chain: &[Capsule]) -> Vec<(usize, ContinuityViolation)> {
    chain
        .windows(2)
        .enumerate()
        .flat_map(|(i, pair)| {
            check_continuity(&pair[0], &pair[1])
                .into_iter()
                .map(move |v| (i + 1, v))
        })
        .inspect(|(i, v)| tracing::warn!(index = *i, "continuity: {v}"))
        .collect()
}
