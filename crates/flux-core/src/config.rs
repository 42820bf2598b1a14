use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CURVATURE_DAMPING, ENTROPY_DAMPING, ENTROPY_JITTER, HISTORY_WINDOW, MAX_ENTROPY_JITTER,
    ROUTE_HISTORY, TRANSITION_THRESHOLD,
};

/// Which advance the orchestrator applies before clamping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransitionMode {
    /// Advance only when the transition probability clears the threshold.
    #[default]
    Gated,
    /// Always take the next state in the cycle.
    Cyclic,
}

/// Tunable pipeline parameters. Missing fields take the defaults from
/// [`constants`](crate::constants).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub curvature_damping: f64,
    pub entropy_damping: f64,
    /// Half-width of the uniform entropy jitter. Zero disables it.
    pub entropy_jitter: f64,
    pub transition_threshold: f64,
    pub transition_mode: TransitionMode,
    pub history_window: usize,
    pub route_history: usize,
    pub device_id: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            curvature_damping: CURVATURE_DAMPING,
            entropy_damping: ENTROPY_DAMPING,
            entropy_jitter: ENTROPY_JITTER,
            transition_threshold: TRANSITION_THRESHOLD,
            transition_mode: TransitionMode::Gated,
            history_window: HISTORY_WINDOW,
            route_history: ROUTE_HISTORY,
            device_id: "local".to_string(),
        }
    }
}

/// A config field outside its allowed range.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidConfig {
    pub field: &'static str,
    pub value: f64,
    pub allowed: &'static str,
}

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} (allowed: {})", self.field, self.value, self.allowed)
    }
}

impl std::error::Error for InvalidConfig {}

fn check(
    field: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
    allowed: &'static str,
) -> Result<(), InvalidConfig> {
    if value.is_finite() && (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(InvalidConfig {
            field,
            value,
            allowed,
        })
    }
}

impl PipelineConfig {
    /// Damping factors must keep |damped| ≤ |raw|, the jitter must be a
    /// small finite half-width, and the threshold is a probability.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        check("curvature_damping", self.curvature_damping, 0.0, 1.0, "[0, 1]")?;
        check("entropy_damping", self.entropy_damping, 0.0, 1.0, "[0, 1]")?;
        check(
            "entropy_jitter",
            self.entropy_jitter,
            0.0,
            MAX_ENTROPY_JITTER,
            "[0, 1]",
        )?;
        check(
            "transition_threshold",
            self.transition_threshold,
            0.0,
            1.0,
            "[0, 1]",
        )
    }

    /// Jitter half-width actually applied: non-finite or negative values
    /// disable jitter, oversized values are capped.
    pub fn effective_jitter(&self) -> f64 {
        let j = self.entropy_jitter;
        if j.is_finite() && j > 0.0 {
            j.min(MAX_ENTROPY_JITTER)
        } else {
            0.0
        }
    }
}
