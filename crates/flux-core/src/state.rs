//! The four-valued state machine: Presence → Measurement → Flux → Collapse → Presence.
//!
//! Two advance mechanisms coexist. [`State::next`] is the fixed cyclic lookup the
//! feature engine uses; [`gated_advance`] only commits that step when the
//! curvature-driven transition probability clears a threshold. Whatever either
//! produces, [`clamp_transition`] then limits the move to one ordinal step
//! (Collapse excepted).

use serde::{Deserialize, Serialize};

use crate::constants::{
    PHI, PRESENCE_GATE_CURVATURE, SQRT2, TRANSITION_MIDPOINT, TRANSITION_STEEPNESS,
};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Presence,
    Measurement,
    Flux,
    Collapse,
}

impl State {
    pub const ALL: [State; 4] = [
        State::Presence,
        State::Measurement,
        State::Flux,
        State::Collapse,
    ];

    /// Wire code: 0, 2, 3, 4. The gap at 1 is historical and must be kept.
    pub fn code(self) -> u8 {
        match self {
            Self::Presence => 0,
            Self::Measurement => 2,
            Self::Flux => 3,
            Self::Collapse => 4,
        }
    }

    /// Unknown codes decode as Presence.
    pub fn from_code_lossy(code: i64) -> Self {
        match code {
            2 => Self::Measurement,
            3 => Self::Flux,
            4 => Self::Collapse,
            _ => Self::Presence,
        }
    }

    /// Position in the canonical ordering, 0..=3.
    pub fn ordinal(self) -> usize {
        match self {
            Self::Presence => 0,
            Self::Measurement => 1,
            Self::Flux => 2,
            Self::Collapse => 3,
        }
    }

    pub fn from_ordinal(ordinal: usize) -> Self {
        Self::ALL[ordinal.min(3)]
    }

    /// Ordinal distance, not code distance: Presence↔Measurement is 1 step.
    pub fn distance(self, other: State) -> usize {
        self.ordinal().abs_diff(other.ordinal())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Presence => "presence",
            Self::Measurement => "measurement",
            Self::Flux => "flux",
            Self::Collapse => "collapse",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "measurement" => Self::Measurement,
            "flux" => Self::Flux,
            "collapse" => Self::Collapse,
            _ => Self::Presence,
        }
    }

    /// Deterministic cyclic advance.
    pub fn next(self) -> Self {
        match self {
            Self::Presence => Self::Measurement,
            Self::Measurement => Self::Flux,
            Self::Flux => Self::Collapse,
            Self::Collapse => Self::Presence,
        }
    }

    /// Reference curvature κ: 0, √2, π/φ, φ².
    pub fn curvature(self) -> f64 {
        match self {
            Self::Presence => 0.0,
            Self::Measurement => SQRT2,
            Self::Flux => std::f64::consts::PI / PHI,
            Self::Collapse => PHI * PHI,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability of leaving `state` given the current curvature.
///
/// Logistic in `curvature / κ`, centred at 0.8 of the state's reference
/// curvature. Presence has κ = 0, so it is gated against √2 − 1 instead.
pub fn transition_probability(state: State, curvature: f64) -> f64 {
    let kappa = state.curvature();
    let kappa = if kappa > 0.0 {
        kappa
    } else {
        PRESENCE_GATE_CURVATURE
    };
    let ratio = curvature / kappa;
    1.0 / (1.0 + (-TRANSITION_STEEPNESS * (ratio - TRANSITION_MIDPOINT)).exp())
}

/// Advance to `state.next()` only if the transition probability exceeds `threshold`.
pub fn gated_advance(state: State, curvature: f64, threshold: f64) -> State {
    let p = transition_probability(state, curvature);
    if p > threshold { state.next() } else { state }
}

/// Limit a transition to one ordinal step unless the target is Collapse.
///
/// Collapse → Presence is a three-step ordinal jump, so it clamps to Flux.
pub fn clamp_transition(previous: State, computed: State) -> State {
    if computed == State::Collapse || previous.distance(computed) <= 1 {
        return computed;
    }
    if computed.ordinal() > previous.ordinal() {
        State::from_ordinal(previous.ordinal() + 1)
    } else {
        State::from_ordinal(previous.ordinal() - 1)
    }
}
