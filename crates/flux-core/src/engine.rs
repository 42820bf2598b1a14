//! Feature engine: accumulates curvature and entropy across processing passes.
//!
//! The engine is deterministic. Damping, jitter and clamping belong to the
//! orchestrator, which writes its post-processed values back via [`FeatureEngine::commit`].

use serde::{Deserialize, Serialize};

use crate::constants::{
    BASELINE_IRRATIONAL_WEIGHT, BASELINE_TRIG_WEIGHT, CURVATURE_IRRATIONAL_WEIGHT,
    CURVATURE_PRODUCT_WEIGHT, CURVATURE_REPTEND_WEIGHT, CURVATURE_TRIG_WEIGHT,
    DIVERGENCE_THRESHOLD, ENTROPY_WEIGHTS, HISTORY_WINDOW,
};
use crate::history::History;
use crate::math::{
    combinatoric_entropy, irrational_curvature, reptend_curvature, reptend_entropy,
    trig_curvature,
};
use crate::state::State;
use crate::triplet::Triplet;

/// Curvature contributed by one triplet, given the batch size `x` and current state.
pub fn combined_curvature(x: f64, triplet: &Triplet, state: State) -> f64 {
    let mut k = state.curvature()
        + trig_curvature(x) * CURVATURE_TRIG_WEIGHT
        + irrational_curvature(x) * CURVATURE_IRRATIONAL_WEIGHT
        + triplet.curvature() * CURVATURE_PRODUCT_WEIGHT;
    if triplet.is_combinatoric() {
        let (p, _) = triplet.primes();
        k += reptend_curvature(p) * CURVATURE_REPTEND_WEIGHT;
    }
    k
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub curvature: f64,
    pub entropy: f64,
    pub state: State,
    pub curvature_history: Vec<f64>,
    pub entropy_history: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct FeatureEngine {
    curvature: f64,
    entropy: f64,
    state: State,
    curvature_history: History<f64>,
    entropy_history: History<f64>,
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new(HISTORY_WINDOW)
    }
}

impl FeatureEngine {
    pub fn new(window: usize) -> Self {
        Self {
            curvature: 0.0,
            entropy: 0.0,
            state: State::Presence,
            curvature_history: History::new(window),
            entropy_history: History::new(window),
        }
    }

    pub fn curvature(&self) -> f64 {
        self.curvature
    }

    pub fn entropy(&self) -> f64 {
        self.entropy
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn curvature_history(&self) -> &History<f64> {
        &self.curvature_history
    }

    pub fn entropy_history(&self) -> &History<f64> {
        &self.entropy_history
    }

    /// Recompute curvature for this batch and append it to history.
    ///
    /// An empty batch leaves curvature and its history untouched.
    pub fn update_curvature<S: AsRef<str>>(&mut self, tokens: &[S], triplets: &[Triplet]) -> f64 {
        if tokens.is_empty() {
            return self.curvature;
        }
        let x = tokens.len() as f64;

        let mut total: f64 = triplets
            .iter()
            .map(|t| combined_curvature(x, t, self.state))
            .sum();
        total += irrational_curvature(x) * BASELINE_IRRATIONAL_WEIGHT;
        total += trig_curvature(x) * BASELINE_TRIG_WEIGHT;
        for t in triplets.iter().filter(|t| t.is_combinatoric()) {
            let (p, _) = t.primes();
            total += reptend_curvature(p) * CURVATURE_REPTEND_WEIGHT;
        }

        self.curvature = total;
        self.curvature_history.push(total);
        total
    }

    /// Recompute entropy for this batch and append it to history.
    pub fn update_entropy<S: AsRef<str>>(&mut self, tokens: &[S], triplets: &[Triplet]) -> f64 {
        let [w_tokens, w_triplets, w_reptend, w_combinatoric] = ENTROPY_WEIGHTS;

        let token_entropy = ((tokens.len() + 1) as f64).ln();
        let triplet_entropy: f64 = triplets.iter().map(Triplet::entropy).sum();
        let (reptend, combinatoric) = triplets
            .iter()
            .filter(|t| t.is_combinatoric())
            .map(Triplet::primes)
            .fold((0.0, 0.0), |(r, c), (p, q)| {
                (r + reptend_entropy(p), c + combinatoric_entropy(p, q))
            });

        let total = w_tokens * token_entropy
            + w_triplets * triplet_entropy
            + w_reptend * reptend
            + w_combinatoric * combinatoric;

        self.entropy = total;
        self.entropy_history.push(total);
        total
    }

    /// Deterministic cyclic advance of the engine's own state view.
    pub fn advance_state(&mut self) -> State {
        self.state = self.state.next();
        self.state
    }

    /// Overwrite current values and the newest history entries with
    /// post-processed numbers, without appending a second entry.
    pub fn commit(&mut self, curvature: f64, entropy: f64, state: State) {
        self.curvature = curvature;
        self.entropy = entropy;
        self.state = state;
        self.curvature_history.replace_last(curvature);
        self.entropy_history.replace_last(entropy);
    }

    /// last − previous curvature, 0 with fewer than two samples.
    pub fn curvature_derivative(&self) -> f64 {
        match (self.curvature_history.last(), self.curvature_history.previous()) {
            (Some(last), Some(prev)) => last - prev,
            _ => 0.0,
        }
    }

    /// 1 / (1 + variance) over the curvature window. 1.0 with fewer than two samples.
    pub fn temporal_coherence(&self) -> f64 {
        let n = self.curvature_history.len();
        if n < 2 {
            return 1.0;
        }
        let mean = self.curvature_history.iter().sum::<f64>() / n as f64;
        let variance = self
            .curvature_history
            .iter()
            .map(|c| (c - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        1.0 / (1.0 + variance)
    }

    pub fn is_diverged(&self) -> bool {
        self.curvature.abs() > DIVERGENCE_THRESHOLD
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            curvature: self.curvature,
            entropy: self.entropy,
            state: self.state,
            curvature_history: self.curvature_history.to_vec(),
            entropy_history: self.entropy_history.to_vec(),
        }
    }

    pub fn restore(window: usize, snapshot: &EngineSnapshot) -> Self {
        Self {
            curvature: snapshot.curvature,
            entropy: snapshot.entropy,
            state: snapshot.state,
            curvature_history: History::from_values(window, &snapshot.curvature_history),
            entropy_history: History::from_values(window, &snapshot.entropy_history),
        }
    }
}
