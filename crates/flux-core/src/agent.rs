//! The three built-in agents, each a fixed numeric policy over a capsule's scalars.
//!
//! - **Expand** grows entropy and adds synthetic triplets.
//! - **Shape** damps entropy, bounds the triplet list and pulls ψ toward 1.
//! - **Collapse** drives the capsule into the Collapse state and validates it.
//!
//! Every transform runs the [`safety`](crate::safety) gate first and returns a
//! new capsule derived from the input via [`Capsule::successor`].

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::capsule::Capsule;
use crate::constants::{SHAPE_TRIPLET_LIMIT, SQRT2, VALID_ENTROPY_BOUND};
use crate::safety::{SafetyAction, SafetyAssessment, assess};
use crate::state::State;
use crate::triplet::Triplet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Expand,
    Shape,
    Collapse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Oscillation {
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tendency {
    Increase,
    Moderate,
    Decrease,
}

impl Tendency {
    /// +1 for increase, 0 for moderate, −1 for decrease.
    pub fn alignment(&self) -> f64 {
        match self {
            Self::Increase => 1.0,
            Self::Moderate => 0.0,
            Self::Decrease => -1.0,
        }
    }
}

/// Static description of an agent's bias.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FluxSignature {
    pub amplitude: f64,
    pub preferred_state: State,
    pub curvature_bias: f64,
    pub oscillation: Oscillation,
    pub density_shift: f64,
}

/// Static description of an agent's entropy tendency.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntropySignature {
    pub base: f64,
    /// Inclusive band the agent is most comfortable in.
    pub range: (f64, f64),
    pub tendency: Tendency,
    pub change: f64,
}

impl EntropySignature {
    pub fn contains(&self, entropy: f64) -> bool {
        self.range.0 <= entropy && entropy <= self.range.1
    }
}

impl Agent {
    pub const ALL: [Agent; 3] = [Agent::Expand, Agent::Shape, Agent::Collapse];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Shape => "shape",
            Self::Collapse => "collapse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "expand" => Some(Self::Expand),
            "shape" => Some(Self::Shape),
            "collapse" => Some(Self::Collapse),
            _ => None,
        }
    }

    pub fn flux_signature(&self) -> FluxSignature {
        match self {
            Self::Expand => FluxSignature {
                amplitude: SQRT2,
                preferred_state: State::Measurement,
                curvature_bias: 0.2,
                oscillation: Oscillation::High,
                density_shift: 0.1,
            },
            Self::Shape => FluxSignature {
                amplitude: 1.5,
                preferred_state: State::Flux,
                curvature_bias: 0.4,
                oscillation: Oscillation::Medium,
                density_shift: 0.3,
            },
            Self::Collapse => FluxSignature {
                amplitude: 0.5,
                preferred_state: State::Collapse,
                curvature_bias: -0.2,
                oscillation: Oscillation::Low,
                density_shift: 0.0,
            },
        }
    }

    pub fn entropy_signature(&self) -> EntropySignature {
        match self {
            Self::Expand => EntropySignature {
                base: 1.0,
                range: (0.5, 2.0),
                tendency: Tendency::Increase,
                change: 0.3,
            },
            Self::Shape => EntropySignature {
                base: 0.7,
                range: (0.3, 1.2),
                tendency: Tendency::Moderate,
                change: -0.1,
            },
            Self::Collapse => EntropySignature {
                base: 0.3,
                range: (0.1, 0.6),
                tendency: Tendency::Decrease,
                change: -0.25,
            },
        }
    }

    /// The shared safety gate.
    pub fn gate(&self, capsule: &Capsule) -> SafetyAssessment {
        assess(capsule)
    }

    /// Read-only diagnostics for `capsule` as seen from `state`.
    pub fn analyze(&self, capsule: &Capsule, state: State) -> Map<String, Value> {
        let gate = self.gate(capsule);
        let mut out = Map::new();
        out.insert("agent".into(), json!(self.name()));
        out.insert("state".into(), json!(state.as_str()));
        out.insert("safety_risk".into(), json!(gate.risk));
        out.insert("safety_action".into(), json!(gate.action.as_str()));

        match self {
            Self::Expand => {
                let branches = capsule.triplets.iter().filter(|t| t.is_combinatoric()).count();
                out.insert("expansion_potential".into(), json!(capsule.entropy * SQRT2));
                out.insert("possibility_count".into(), json!(capsule.tokens.len() * 2));
                out.insert("superposition_strength".into(), json!(capsule.psi));
                out.insert("combinatoric_branches".into(), json!(branches));
            }
            Self::Shape => {
                out.insert("shaping_potential".into(), json!(capsule.entropy * 0.7));
                out.insert(
                    "structure_score".into(),
                    json!(capsule.tokens.len() as f64 / capsule.entropy.max(0.1)),
                );
                out.insert("action_curvature".into(), json!(capsule.curvature));
            }
            Self::Collapse => {
                let status = if capsule.entropy < VALID_ENTROPY_BOUND {
                    "valid"
                } else {
                    "needs_review"
                };
                out.insert("coherence".into(), json!(1.0 - capsule.curvature * 0.1));
                out.insert("validation_status".into(), json!(status));
                out.insert(
                    "collapse_readiness".into(),
                    json!(1.0 - capsule.entropy * 0.5),
                );
            }
        }
        out
    }

    /// Apply this agent's policy. The input is never modified.
    pub fn transform(&self, capsule: &Capsule) -> Capsule {
        let gate = self.gate(capsule);
        let mut out = capsule.successor();

        match self {
            Self::Expand => expand(&mut out, gate.action),
            Self::Shape => shape(&mut out, gate.action),
            Self::Collapse => collapse(&mut out, gate.action),
        }

        out.metadata.insert("agent".into(), json!(self.name()));
        if gate.action != SafetyAction::Allow {
            out.metadata.insert("safety_risk".into(), json!(gate.risk));
            out.metadata
                .insert("safety_action".into(), json!(gate.action.as_str()));
        }
        tracing::debug!(
            agent = self.name(),
            action = gate.action.as_str(),
            entropy = out.entropy,
            curvature = out.curvature,
            "agent transform"
        );
        out
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn expand(c: &mut Capsule, action: SafetyAction) {
    let factor = match action {
        SafetyAction::Allow => 1.5,
        SafetyAction::Reframe => 1.2,
        SafetyAction::Block => {
            c.metadata.insert("expansion_limited".into(), json!(true));
            return;
        }
    };
    if action == SafetyAction::Reframe {
        c.metadata.insert("safer_expansion".into(), json!(true));
    }
    c.entropy *= factor;
    c.triplets.push(Triplet::presence());
    c.triplets.push(Triplet::trig());
    c.psi = (c.psi * 0.9).max(0.5);
    c.curvature *= 1.1;
}

fn shape(c: &mut Capsule, action: SafetyAction) {
    let curvature_factor = match action {
        SafetyAction::Reframe => {
            c.metadata.insert("shaped_for_safety".into(), json!(true));
            1.1
        }
        SafetyAction::Block => {
            c.metadata.insert("blocked".into(), json!(true));
            1.2
        }
        SafetyAction::Allow => 1.2,
    };
    c.entropy *= 0.8;
    c.triplets.truncate(SHAPE_TRIPLET_LIMIT);
    if c.psi < 0.8 {
        c.psi = 0.9;
    } else if c.psi > 1.2 {
        c.psi = 1.1;
    }
    c.curvature *= curvature_factor;
    c.density *= 1.3;
}

fn collapse(c: &mut Capsule, action: SafetyAction) {
    let (entropy_factor, curvature_factor) = match action {
        SafetyAction::Reframe => {
            c.metadata.insert("reframed".into(), json!(true));
            (0.6, 0.8)
        }
        SafetyAction::Block => {
            c.metadata.insert("blocked".into(), json!(true));
            c.metadata
                .insert("block_reason".into(), json!("user_safety_risk"));
            (0.5, 0.7)
        }
        SafetyAction::Allow => (0.5, 0.7),
    };
    c.entropy *= entropy_factor;
    c.curvature *= curvature_factor;
    c.psi = (c.psi * 1.1).max(1.2);
    c.state = State::Collapse;
    c.metadata.insert("validated".into(), json!(true));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triplet::TripletKind;

    fn to_tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    fn safe_capsule() -> Capsule {
        let mut c = Capsule::new();
        c.tokens = to_tokens(&["gentle", "morning", "light"]);
        c.triplets = vec![Triplet::new(0.4, 0.45, 1.0, TripletKind::Combinatorics)];
        c.entropy = 1.0;
        c.curvature = 2.0;
        c.density = 0.6;
        c.psi = 0.5f64.sqrt();
        c.state = State::Measurement;
        c
    }

    #[test]
    fn test_expand_allow() {
        let c = safe_capsule();
        let out = Agent::Expand.transform(&c);
        assert!((out.entropy - 1.5).abs() < 1e-12);
        assert!((out.curvature - 2.2).abs() < 1e-12);
        assert_eq!(out.triplets.len(), 3);
        assert_eq!(out.triplets[1], Triplet::presence());
        assert_eq!(out.triplets[2], Triplet::trig());
        assert_eq!(out.psi, 0.5f64.sqrt() * 0.9);
        assert_eq!(out.metadata["agent"], json!("expand"));
        assert!(!out.metadata.contains_key("safety_action"));
    }

    #[test]
    fn test_expand_psi_floor() {
        let mut c = safe_capsule();
        c.psi = 0.3;
        assert_eq!(Agent::Expand.transform(&c).psi, 0.5);
    }

    #[test]
    fn test_transform_never_mutates_input() {
        let c = safe_capsule();
        let before = c.clone();
        for agent in Agent::ALL {
            let out = agent.transform(&c);
            assert_eq!(out.prev_id(), Some(c.id()));
        }
        assert_eq!(c, before);
    }

    #[test]
    fn test_shape_policy() {
        let mut c = safe_capsule();
        c.triplets = vec![Triplet::presence(); 14];
        c.psi = 1.5;
        let out = Agent::Shape.transform(&c);
        assert_eq!(out.triplets.len(), 10);
        assert_eq!(out.psi, 1.1);
        assert!((out.entropy - 0.8).abs() < 1e-12);
        assert!((out.curvature - 2.4).abs() < 1e-12);
        assert!((out.density - 0.78).abs() < 1e-12);
    }

    #[test]
    fn test_shape_psi_inside_band_untouched() {
        let mut c = safe_capsule();
        c.psi = 1.0;
        assert_eq!(Agent::Shape.transform(&c).psi, 1.0);
        c.psi = 0.2;
        assert_eq!(Agent::Shape.transform(&c).psi, 0.9);
    }

    #[test]
    fn test_collapse_policy() {
        let c = safe_capsule();
        let out = Agent::Collapse.transform(&c);
        assert_eq!(out.state, State::Collapse);
        assert!(out.is_validated());
        assert!((out.entropy - 0.5).abs() < 1e-12);
        assert!((out.curvature - 1.4).abs() < 1e-12);
        assert_eq!(out.psi, 1.2);
    }

    #[test]
    fn test_collapse_blocks_delete_all_files() {
        let mut c = Capsule::new();
        c.tokens = to_tokens(&["delete", "all", "files"]);
        c.entropy = 4.0;

        let gate = Agent::Collapse.gate(&c);
        assert!(gate.risk >= 0.6, "risk = {}", gate.risk);

        let out = Agent::Collapse.transform(&c);
        assert!(out.is_blocked());
        assert_eq!(out.metadata["block_reason"], json!("user_safety_risk"));
        assert_eq!(out.metadata["safety_action"], json!("block"));
        assert_eq!(out.state, State::Collapse);
    }

    #[test]
    fn test_expand_block_suppresses_growth() {
        let mut c = safe_capsule();
        c.tokens = to_tokens(&["delete", "all", "files"]);
        c.entropy = 4.0;
        let out = Agent::Expand.transform(&c);
        assert_eq!(out.entropy, 4.0);
        assert_eq!(out.curvature, c.curvature);
        assert_eq!(out.triplets.len(), c.triplets.len());
        assert!(out.flag("expansion_limited"));
    }

    #[test]
    fn test_reframe_is_gentler() {
        let mut c = safe_capsule();
        c.tokens = to_tokens(&["remove", "the", "draft"]);
        let out = Agent::Expand.transform(&c);
        assert!((out.entropy - 1.2).abs() < 1e-12);
        assert!(out.flag("safer_expansion"));

        let shaped = Agent::Shape.transform(&c);
        assert!((shaped.curvature - 2.2).abs() < 1e-12);
        assert!(shaped.flag("shaped_for_safety"));
        assert!(!shaped.is_blocked());
    }

    #[test]
    fn test_deterministic_under_safe_input() {
        let a = safe_capsule();
        let mut b = a.clone();
        b.timestamp = "2001-01-01T00:00:00.000Z".into();
        for agent in Agent::ALL {
            let (x, y) = (agent.transform(&a), agent.transform(&b));
            assert_eq!(x.entropy.to_bits(), y.entropy.to_bits());
            assert_eq!(x.curvature.to_bits(), y.curvature.to_bits());
            assert_eq!(x.psi.to_bits(), y.psi.to_bits());
            assert_eq!(x.density.to_bits(), y.density.to_bits());
        }
    }

    #[test]
    fn test_analyze() {
        let c = safe_capsule();
        let expand = Agent::Expand.analyze(&c, State::Measurement);
        assert_eq!(expand["possibility_count"], json!(6));
        assert_eq!(expand["combinatoric_branches"], json!(1));
        assert_eq!(expand["safety_action"], json!("allow"));

        let collapse = Agent::Collapse.analyze(&c, State::Measurement);
        assert_eq!(collapse["validation_status"], json!("needs_review"));

        let mut calm = c.clone();
        calm.entropy = 0.4;
        let collapse = Agent::Collapse.analyze(&calm, State::Measurement);
        assert_eq!(collapse["validation_status"], json!("valid"));
    }

    #[test]
    fn test_names_roundtrip() {
        for agent in Agent::ALL {
            assert_eq!(Agent::from_name(agent.name()), Some(agent));
        }
        assert_eq!(Agent::from_name("eidos"), None);
    }

    #[test]
    fn test_signatures() {
        assert_eq!(Agent::Shape.flux_signature().preferred_state, State::Flux);
        assert!(Agent::Collapse.entropy_signature().contains(0.6));
        assert!(!Agent::Collapse.entropy_signature().contains(0.61));
    }
}
