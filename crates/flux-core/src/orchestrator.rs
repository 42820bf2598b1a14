//! One processing pass: tokens → triplets → features → state → capsule.
//!
//! Order matters and is fixed: curvature, entropy, state advance (which reads
//! the raw curvature of this pass), damping and jitter, anti-jump clamp, then
//! the post-processed values are written back over the engine's history tail.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::capsule::{Capsule, FluxBand};
use crate::config::{PipelineConfig, TransitionMode};
use crate::engine::{EngineSnapshot, FeatureEngine};
use crate::math::{
    distinction_density, flux_propagate, hamiltonian, initial_psi, measurement_error,
    rail_interaction, reptend_entropy,
};
use crate::state::{State, clamp_transition, gated_advance};
use crate::tokenizer::Hints;
use crate::triplet::extract_triplets;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    pub engine: EngineSnapshot,
    pub session_id: String,
    pub last_capsule_id: Option<Uuid>,
}

/// Owns the feature engine and the committed state. Not shareable across
/// concurrent callers without external locking.
#[derive(Clone, Debug)]
pub struct Orchestrator {
    engine: FeatureEngine,
    config: PipelineConfig,
    session_id: String,
    last_capsule_id: Option<Uuid>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            engine: FeatureEngine::new(config.history_window),
            config,
            session_id: Uuid::new_v4().to_string(),
            last_capsule_id: None,
        }
    }

    pub fn engine(&self) -> &FeatureEngine {
        &self.engine
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.engine.state()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn last_capsule_id(&self) -> Option<Uuid> {
        self.last_capsule_id
    }

    pub fn process<S: AsRef<str>>(&mut self, tokens: &[S], rng: &mut impl Rng) -> Capsule {
        self.process_with_hints(tokens, None, rng)
    }

    /// Run one pass. Hints, when given, are recorded on the capsule only.
    pub fn process_with_hints<S: AsRef<str>>(
        &mut self,
        tokens: &[S],
        hints: Option<&Hints>,
        rng: &mut impl Rng,
    ) -> Capsule {
        let previous = self.engine.state();
        let triplets = extract_triplets(tokens);

        let raw_curvature = self.engine.update_curvature(tokens, &triplets);
        let raw_entropy = self.engine.update_entropy(tokens, &triplets);

        let target = match self.config.transition_mode {
            TransitionMode::Gated => {
                gated_advance(previous, raw_curvature, self.config.transition_threshold)
            }
            TransitionMode::Cyclic => self.engine.advance_state(),
        };

        let curvature = raw_curvature * self.config.curvature_damping;
        let j = self.config.effective_jitter();
        let jitter = if j > 0.0 { rng.random_range(-j..=j) } else { 0.0 };
        let entropy = (raw_entropy * self.config.entropy_damping + jitter).max(0.0);

        let state = clamp_transition(previous, target);
        self.engine.commit(curvature, entropy, state);

        tracing::debug!(
            tokens = tokens.len(),
            triplets = triplets.len(),
            raw_curvature,
            curvature,
            entropy,
            from = previous.as_str(),
            to = state.as_str(),
            "processed batch"
        );

        let flux = flux_propagate(curvature, curvature);
        let band = FluxBand::of(flux);

        let mut capsule = Capsule::with_identity(Uuid::new_v4(), self.last_capsule_id);
        capsule.device_id = self.config.device_id.clone();
        capsule.session_id = self.session_id.clone();
        capsule.tokens = band.markers();
        capsule
            .tokens
            .extend(tokens.iter().map(|t| t.as_ref().to_string()));

        let (reptend, rail) = triplets
            .iter()
            .filter(|t| t.is_combinatoric())
            .map(|t| t.primes())
            .fold((0.0, 0.0), |(r, i), (p, q)| {
                (r + reptend_entropy(p), i + rail_interaction(p, q))
            });

        capsule.triplets = triplets;
        capsule.curvature = curvature;
        capsule.entropy = entropy;
        capsule.density = distinction_density(tokens.len());
        capsule.psi = initial_psi();
        capsule.energy = hamiltonian(curvature);
        capsule.reptend_entropy = reptend;
        capsule.rail_interference = rail;
        capsule.measurement_error = measurement_error(state, entropy, curvature);
        capsule.state = state;
        capsule.metadata.insert("flux".into(), json!(flux));
        capsule
            .metadata
            .insert("flux_label".into(), json!(band.label()));
        capsule.metadata.insert(
            "curvature_derivative".into(),
            json!(self.engine.curvature_derivative()),
        );
        capsule.metadata.insert(
            "coherence".into(),
            json!(self.engine.temporal_coherence()),
        );
        capsule
            .metadata
            .insert("diverged".into(), json!(self.engine.is_diverged()));
        if let Some(hints) = hints {
            capsule.metadata.insert(
                "hints".into(),
                json!({
                    "dominant": hints.dominant().as_str(),
                    "contrast": hints.contrast,
                    "branching": hints.branching,
                    "recursion": hints.recursion,
                }),
            );
        }

        self.last_capsule_id = Some(capsule.id());
        capsule
    }

    /// Run a previously emitted capsule's content back through the pipeline.
    /// Marker tokens are not treated as input.
    pub fn reprocess(&mut self, capsule: &Capsule, rng: &mut impl Rng) -> Capsule {
        self.process(&capsule.content_tokens(), rng)
    }

    /// Fold a transformed capsule back into the engine: the state is clamped
    /// toward the capsule's state, then its curvature and entropy overwrite
    /// the history tail. Returns the committed state.
    pub fn integrate(&mut self, capsule: &Capsule) -> State {
        let previous = self.engine.state();
        let state = clamp_transition(previous, capsule.state);
        self.engine.commit(capsule.curvature, capsule.entropy, state);
        self.last_capsule_id = Some(capsule.id());
        tracing::debug!(
            from = previous.as_str(),
            to = state.as_str(),
            "integrated capsule"
        );
        state
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            engine: self.engine.snapshot(),
            session_id: self.session_id.clone(),
            last_capsule_id: self.last_capsule_id,
        }
    }

    pub fn restore(config: PipelineConfig, snapshot: &OrchestratorSnapshot) -> Self {
        Self {
            engine: FeatureEngine::restore(config.history_window, &snapshot.engine),
            config,
            session_id: snapshot.session_id.clone(),
            last_capsule_id: snapshot.last_capsule_id,
        }
    }
}
