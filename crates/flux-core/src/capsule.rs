//! The capsule: the only record that crosses component boundaries.
//!
//! Capsules are values. Agents and the orchestrator never edit one in place;
//! they derive a [`Capsule::successor`] whose `prev_id` links back to the source.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::{FLUX_LOW_BAND, FLUX_MID_BAND, MARKER_TOKEN_COUNT};
use crate::state::State;
use crate::time::now_iso8601;
use crate::triplet::Triplet;

const MARKER_HEAD: [&str; 3] = ["...", "internal", "flux"];

/// Observational band of the flux value, recorded as marker tokens and metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FluxBand {
    Low,
    Mid,
    High,
}

impl FluxBand {
    pub fn of(flux: f64) -> Self {
        if flux < FLUX_LOW_BAND {
            Self::Low
        } else if flux < FLUX_MID_BAND {
            Self::Mid
        } else {
            Self::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }

    /// Fourth marker token.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Low => "state_presence",
            Self::Mid => "state_curvature",
            Self::High => "state_collapse",
        }
    }

    pub fn markers(&self) -> Vec<String> {
        MARKER_HEAD
            .iter()
            .copied()
            .chain(std::iter::once(self.tag()))
            .map(str::to_string)
            .collect()
    }

    fn is_tag(token: &str) -> bool {
        matches!(token, "state_presence" | "state_curvature" | "state_collapse")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Capsule {
    id: Uuid,
    prev_id: Option<Uuid>,
    pub device_id: String,
    pub session_id: String,
    /// ISO-8601 UTC, millisecond precision.
    pub timestamp: String,

    pub tokens: Vec<String>,
    pub triplets: Vec<Triplet>,

    pub curvature: f64,
    pub entropy: f64,
    pub density: f64,
    pub psi: f64,
    pub energy: f64,
    pub reptend_entropy: f64,
    pub rail_interference: f64,
    pub measurement_error: f64,
    pub state: State,

    pub metadata: Map<String, Value>,
    pub agent_trace: Vec<String>,
    pub experience_delta: Map<String, Value>,
}

impl Default for Capsule {
    fn default() -> Self {
        Self::new()
    }
}

impl Capsule {
    /// Empty capsule with a fresh id and the current timestamp.
    pub fn new() -> Self {
        Self::with_identity(Uuid::new_v4(), None)
    }

    /// Capsule with an explicit identity. Used when decoding stored capsules.
    pub fn with_identity(id: Uuid, prev_id: Option<Uuid>) -> Self {
        Self {
            id,
            prev_id,
            device_id: String::new(),
            session_id: String::new(),
            timestamp: now_iso8601(),
            tokens: Vec::new(),
            triplets: Vec::new(),
            curvature: 0.0,
            entropy: 0.0,
            density: 0.0,
            psi: 0.0,
            energy: 0.0,
            reptend_entropy: 0.0,
            rail_interference: 0.0,
            measurement_error: 0.0,
            state: State::Presence,
            metadata: Map::new(),
            agent_trace: Vec::new(),
            experience_delta: Map::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn prev_id(&self) -> Option<Uuid> {
        self.prev_id
    }

    /// Copy of this capsule under a new id, linked back to this one.
    /// The timestamp is carried over.
    pub fn successor(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            prev_id: Some(self.id),
            ..self.clone()
        }
    }

    /// Tokens with every flux marker run removed.
    pub fn content_tokens(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.tokens.len());
        let mut i = 0;
        while i < self.tokens.len() {
            if is_marker_run(&self.tokens[i..]) {
                i += MARKER_TOKEN_COUNT;
            } else {
                out.push(self.tokens[i].clone());
                i += 1;
            }
        }
        out
    }

    /// Content tokens joined with spaces, as scanned by the safety gate.
    pub fn text(&self) -> String {
        self.content_tokens().join(" ")
    }

    pub fn flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn is_blocked(&self) -> bool {
        self.flag("blocked")
    }

    pub fn is_validated(&self) -> bool {
        self.flag("validated")
    }

    /// Recombine two branches into a new capsule.
    ///
    /// Signal scalars are averaged; state, energy and rail interference take the
    /// maximum; tokens, triplets and agent traces concatenate; metadata and
    /// experience maps union with `other` winning conflicts.
    pub fn merge(&self, other: &Capsule) -> Capsule {
        let mean = |a: f64, b: f64| (a + b) / 2.0;

        let mut merged = self.successor();
        merged.tokens.extend(other.tokens.iter().cloned());
        merged.triplets.extend(other.triplets.iter().copied());
        merged.agent_trace.extend(other.agent_trace.iter().cloned());

        merged.entropy = mean(self.entropy, other.entropy);
        merged.curvature = mean(self.curvature, other.curvature);
        merged.density = mean(self.density, other.density);
        merged.psi = mean(self.psi, other.psi);
        merged.reptend_entropy = mean(self.reptend_entropy, other.reptend_entropy);
        merged.measurement_error = mean(self.measurement_error, other.measurement_error);

        merged.state = self.state.max(other.state);
        merged.energy = self.energy.max(other.energy);
        merged.rail_interference = self.rail_interference.max(other.rail_interference);

        for (k, v) in &other.metadata {
            merged.metadata.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.experience_delta {
            merged.experience_delta.insert(k.clone(), v.clone());
        }
        merged.metadata.insert(
            "merged_from".to_string(),
            Value::Array(vec![
                Value::String(self.id.to_string()),
                Value::String(other.id.to_string()),
            ]),
        );

        if other.timestamp > self.timestamp {
            merged.timestamp = other.timestamp.clone();
        }
        merged
    }
}

fn is_marker_run(tokens: &[String]) -> bool {
    tokens.len() >= MARKER_TOKEN_COUNT
        && tokens.iter().zip(MARKER_HEAD).all(|(t, m)| t == m)
        && FluxBand::is_tag(&tokens[3])
}
