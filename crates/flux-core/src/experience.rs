//! Experience tracking: the collaborator that supplies the router's consistency bias.

use crate::capsule::Capsule;
use crate::constants::{BIAS_CENTER, BIAS_RETENTION, CONSISTENCY_MEMORY};
use crate::history::History;
use crate::state::State;

/// Supplies a consistency bias for routing and learns from integrated capsules.
pub trait ExperienceTracker {
    /// Scalar bias in [-1, 1]. Positive favours agents that raise entropy.
    fn bias(&self, capsule: &Capsule) -> f64;

    /// Called with the final capsule after it has been integrated.
    fn update(&mut self, capsule: &Capsule, state: State);

    /// Raw internal bias for persistence. Trackers without state report 0.
    fn bias_vector(&self) -> f64 {
        0.0
    }

    fn set_bias_vector(&mut self, _value: f64) {}
}

/// Exponential moving average of (curvature + entropy) / 2, centred on 1.0
/// and squashed through tanh.
#[derive(Clone, Debug)]
pub struct ConsistencyTracker {
    bias_vector: f64,
    memory: History<(f64, f64)>,
}

impl Default for ConsistencyTracker {
    fn default() -> Self {
        Self {
            bias_vector: 0.0,
            memory: History::new(CONSISTENCY_MEMORY),
        }
    }
}

impl ConsistencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(&self) -> &History<(f64, f64)> {
        &self.memory
    }
}

impl ExperienceTracker for ConsistencyTracker {
    fn bias(&self, _capsule: &Capsule) -> f64 {
        self.bias_vector.tanh()
    }

    fn update(&mut self, capsule: &Capsule, state: State) {
        self.memory.push((capsule.curvature, capsule.entropy));
        let target = (capsule.curvature + capsule.entropy) / 2.0 - BIAS_CENTER;
        self.bias_vector = self.bias_vector * BIAS_RETENTION + target * (1.0 - BIAS_RETENTION);
        tracing::debug!(
            bias = self.bias_vector,
            state = state.as_str(),
            "consistency updated"
        );
    }

    fn bias_vector(&self) -> f64 {
        self.bias_vector
    }

    fn set_bias_vector(&mut self, value: f64) {
        self.bias_vector = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capsule(curvature: f64, entropy: f64) -> Capsule {
        let mut c = Capsule::new();
        c.curvature = curvature;
        c.entropy = entropy;
        c
    }

    #[test]
    fn test_starts_neutral() {
        let t = ConsistencyTracker::new();
        assert_eq!(t.bias(&Capsule::new()), 0.0);
    }

    #[test]
    fn test_ema_step() {
        let mut t = ConsistencyTracker::new();
        t.update(&capsule(3.0, 1.0), State::Flux);
        // target = 2 - 1 = 1, bias = 0.1
        assert!((t.bias_vector() - 0.1).abs() < 1e-12);
        assert!((t.bias(&Capsule::new()) - 0.1f64.tanh()).abs() < 1e-12);
    }

    #[test]
    fn test_bias_bounded() {
        let mut t = ConsistencyTracker::new();
        for _ in 0..500 {
            t.update(&capsule(1e6, 1e6), State::Collapse);
        }
        let b = t.bias(&Capsule::new());
        assert!(b <= 1.0 && b > 0.99, "bias = {b}");
        assert_eq!(t.memory().len(), CONSISTENCY_MEMORY);
    }

    #[test]
    fn test_low_signal_biases_negative() {
        let mut t = ConsistencyTracker::new();
        for _ in 0..10 {
            t.update(&capsule(0.1, 0.1), State::Presence);
        }
        assert!(t.bias(&Capsule::new()) < 0.0);
    }
}
