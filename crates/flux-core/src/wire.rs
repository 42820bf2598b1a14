//! Capsule wire format: a flat JSON object.
//!
//! Every field has a neutral default, and a field of the wrong type decodes as
//! that default, so partial or legacy maps always decode. The `signature` and
//! `continuity` blocks are derived on encode and ignored on decode. Older
//! capsules keyed tokens, state and energy as `raw_tokens`, `shell` and
//! `hamiltonian`; those keys are read when the current one is absent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::capsule::Capsule;
use crate::constants::{CURVATURE_CONFIDENCE_SCALE, EXPERIENCE_ENTROPY_BOOST};
use crate::state::State;
use crate::triplet::{Triplet, TripletKind};

pub const WIRE_VERSION: &str = "1";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct WireSignature {
    pub state_suggestion: u8,
    pub curvature_confidence: f64,
    pub entropy_estimate: f64,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct WireContinuity {
    pub tokens: usize,
    pub agents: usize,
    pub identity_depth: u64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct WireCapsule {
    #[serde(default, deserialize_with = "lenient_string")]
    pub capsule_id: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub prev_capsule_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub session_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,

    #[serde(default, deserialize_with = "lenient_strings")]
    pub tokens: Vec<String>,
    #[serde(default, deserialize_with = "lenient_triplets")]
    pub triplets: Vec<WireTriplet>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub curvature: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entropy: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub density: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub psi: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub energy: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub reptend_entropy: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rail_interference: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub measurement_error: f64,
    /// State code 0/2/3/4. State names are accepted too.
    #[serde(default, deserialize_with = "lenient_state")]
    pub state: u8,

    #[serde(default, deserialize_with = "lenient_map")]
    pub metadata: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub agent_trace: Vec<String>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub experience_delta: Map<String, Value>,

    #[serde(skip_deserializing)]
    pub signature: WireSignature,
    #[serde(skip_deserializing)]
    pub continuity: WireContinuity,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct WireTriplet {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub a: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub b: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub c: f64,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: String,
}

// --- Lenient field decoders ---

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Value::deserialize(d)?.as_f64().unwrap_or_default())
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_triplets<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<WireTriplet>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_map<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Object(m) => m,
        _ => Map::new(),
    })
}

fn lenient_state<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let state = match Value::deserialize(d)? {
        Value::Number(n) => State::from_code_lossy(n.as_i64().unwrap_or_default()),
        Value::String(s) => State::from_str_lossy(&s),
        _ => State::Presence,
    };
    Ok(state.code())
}

/// (legacy key, current key)
const LEGACY_KEYS: [(&str, &str); 3] = [
    ("raw_tokens", "tokens"),
    ("shell", "state"),
    ("hamiltonian", "energy"),
];

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

// --- Conversion ---

impl WireCapsule {
    pub fn from_capsule(c: &Capsule) -> Self {
        Self {
            capsule_id: c.id().to_string(),
            prev_capsule_id: c.prev_id().map(|id| id.to_string()),
            device_id: c.device_id.clone(),
            session_id: c.session_id.clone(),
            timestamp: c.timestamp.clone(),
            tokens: c.tokens.clone(),
            triplets: c
                .triplets
                .iter()
                .map(|t| WireTriplet {
                    a: t.a,
                    b: t.b,
                    c: t.c,
                    kind: t.kind.as_str().to_string(),
                })
                .collect(),
            curvature: c.curvature,
            entropy: c.entropy,
            density: c.density,
            psi: c.psi,
            energy: c.energy,
            reptend_entropy: c.reptend_entropy,
            rail_interference: c.rail_interference,
            measurement_error: c.measurement_error,
            state: c.state.code(),
            metadata: c.metadata.clone(),
            agent_trace: c.agent_trace.clone(),
            experience_delta: c.experience_delta.clone(),
            signature: c.signature(),
            continuity: c.continuity(),
        }
    }

    /// A missing or malformed id gets a fresh one.
    pub fn into_capsule(self) -> Capsule {
        let id = Uuid::parse_str(&self.capsule_id).unwrap_or_else(|_| Uuid::new_v4());
        let prev_id = self
            .prev_capsule_id
            .and_then(|s| Uuid::parse_str(&s).ok());

        let mut c = Capsule::with_identity(id, prev_id);
        c.device_id = self.device_id;
        c.session_id = self.session_id;
        c.timestamp = self.timestamp;
        c.tokens = self.tokens;
        c.triplets = self
            .triplets
            .into_iter()
            .map(|t| Triplet::new(t.a, t.b, t.c, TripletKind::from_str_lossy(&t.kind)))
            .collect();
        c.curvature = self.curvature;
        c.entropy = self.entropy;
        c.density = self.density;
        c.psi = self.psi;
        c.energy = self.energy;
        c.reptend_entropy = self.reptend_entropy;
        c.rail_interference = self.rail_interference;
        c.measurement_error = self.measurement_error;
        c.state = State::from_code_lossy(self.state as i64);
        c.metadata = self.metadata;
        c.agent_trace = self.agent_trace;
        c.experience_delta = self.experience_delta;
        c
    }
}

impl Capsule {
    /// Derived summary of this capsule's own scalars.
    pub fn signature(&self) -> WireSignature {
        let boost = self.experience_delta.len() as f64 * EXPERIENCE_ENTROPY_BOOST;
        WireSignature {
            state_suggestion: self.state.code(),
            curvature_confidence: round3(self.curvature * CURVATURE_CONFIDENCE_SCALE),
            entropy_estimate: round3(self.entropy + boost),
        }
    }

    pub fn continuity(&self) -> WireContinuity {
        WireContinuity {
            tokens: self.tokens.len(),
            agents: self.agent_trace.len(),
            identity_depth: self
                .experience_delta
                .get("identity_depth")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        }
    }

    /// Canonical key/value form.
    pub fn encode(&self) -> Map<String, Value> {
        // A struct of plain fields always serializes to an object.
        match serde_json::to_value(WireCapsule::from_capsule(self)) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Never fails: absent or mistyped fields take their neutral default.
    pub fn decode(map: &Map<String, Value>) -> Capsule {
        let mut map = map.clone();
        for (legacy, key) in LEGACY_KEYS {
            if let Some(v) = map.remove(legacy) {
                map.entry(key).or_insert(v);
            }
        }
        serde_json::from_value::<WireCapsule>(Value::Object(map))
            .unwrap_or_default()
            .into_capsule()
    }
}

pub fn export_json(capsule: &Capsule) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&WireCapsule::from_capsule(capsule))
}

pub fn import_json(json: &str) -> Result<Capsule, serde_json::Error> {
    let map: Map<String, Value> = serde_json::from_str(json)?;
    Ok(Capsule::decode(&map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn rich_capsule() -> Capsule {
        let parent = Capsule::new();
        let mut c = parent.successor();
        c.device_id = "device-7".into();
        c.session_id = "session-a".into();
        c.tokens = vec!["alpha".into(), "beta".into()];
        c.triplets = vec![
            Triplet::presence(),
            Triplet::new(0.5, 0.52, 1.0, TripletKind::Combinatorics),
        ];
        c.curvature = 2.718_281_828_459_045;
        c.entropy = 0.1 + 0.2;
        c.density = 0.6;
        c.psi = 0.5f64.sqrt();
        c.energy = -1.25;
        c.reptend_entropy = 1.0 / 3.0;
        c.rail_interference = 0.2;
        c.measurement_error = 1e-12;
        c.state = State::Flux;
        c.metadata.insert("flux_label".into(), json!("mid"));
        c.agent_trace = vec!["expand".into()];
        c.experience_delta.insert("identity_depth".into(), json!(3));
        c
    }

    #[test]
    fn test_roundtrip_is_exact() {
        let c = rich_capsule();
        let decoded = Capsule::decode(&c.encode());
        assert_eq!(decoded, c);
    }

    #[test]
    fn test_roundtrip_through_text() {
        let c = rich_capsule();
        let json = export_json(&c).unwrap();
        let back = import_json(&json).unwrap();
        assert_eq!(back, c);
        assert_eq!(back.curvature.to_bits(), c.curvature.to_bits());
    }

    #[test]
    fn test_signature_and_continuity_recomputed() {
        let c = rich_capsule();
        let mut map = c.encode();
        map.insert("signature".into(), json!({"state_suggestion": 0, "entropy_estimate": 99.0}));
        map.insert("continuity".into(), json!("garbage"));

        let decoded = Capsule::decode(&map);
        let encoded = decoded.encode();
        assert_eq!(encoded["signature"]["state_suggestion"], json!(3));
        assert_eq!(encoded["continuity"]["tokens"], json!(2));
        assert_eq!(encoded["continuity"]["identity_depth"], json!(3));
        // 0.30000000000000004 + 0.01 for one experience entry
        assert_eq!(encoded["signature"]["entropy_estimate"], json!(0.31));
    }

    #[test]
    fn test_decode_empty_map() {
        let c = Capsule::decode(&Map::new());
        assert!(c.tokens.is_empty());
        assert_eq!(c.entropy, 0.0);
        assert_eq!(c.state, State::Presence);
        assert_eq!(c.prev_id(), None);
        assert!(!c.id().is_nil());
    }

    #[test]
    fn test_decode_mistyped_fields() {
        let map = json!({
            "capsule_id": "not-a-uuid",
            "entropy": "high",
            "curvature": 1.5,
            "state": "collapse",
            "tokens": ["ok", 7, null, "fine"],
            "triplets": [{"a": 0.1, "b": 0.2, "c": 0.3, "type": "mystery"}, "junk"],
            "metadata": [1, 2],
        });
        let c = Capsule::decode(map.as_object().unwrap());
        assert_eq!(c.entropy, 0.0);
        assert_eq!(c.curvature, 1.5);
        assert_eq!(c.state, State::Collapse);
        assert_eq!(c.tokens, vec!["ok".to_string(), "fine".to_string()]);
        assert_eq!(c.triplets.len(), 1);
        assert_eq!(c.triplets[0].kind, TripletKind::Presence);
        assert!(c.metadata.is_empty());
    }

    #[test]
    fn test_unknown_state_code() {
        let map = json!({"state": 1});
        assert_eq!(Capsule::decode(map.as_object().unwrap()).state, State::Presence);
    }

    #[test]
    fn test_import_rejects_non_json() {
        assert!(import_json("{not json").is_err());
    }

    #[test]
    fn test_decode_legacy_field_names() {
        let map = json!({
            "raw_tokens": ["delete", "all", "files"],
            "shell": 4,
            "hamiltonian": 2.5,
            "entropy": 4.0,
            "triplets": [{"a": 0.0, "b": 1.0, "c": 1.5, "type": "presence"}],
        });
        let c = Capsule::decode(map.as_object().unwrap());
        assert_eq!(c.tokens, vec!["delete", "all", "files"]);
        assert_eq!(c.state, State::Collapse);
        assert_eq!(c.energy, 2.5);
        assert_eq!(c.entropy, 4.0);
        assert_eq!(c.triplets.len(), 1);
        assert_eq!(crate::safety::assess(&c).action, crate::SafetyAction::Block);

        let encoded = c.encode();
        assert!(encoded.contains_key("tokens"));
        assert!(!encoded.contains_key("raw_tokens"));
    }

    #[test]
    fn test_current_keys_win_over_legacy() {
        let map = json!({
            "tokens": ["new"],
            "raw_tokens": ["old"],
            "state": "flux",
            "shell": 4,
            "energy": 1.0,
            "hamiltonian": 9.0,
        });
        let c = Capsule::decode(map.as_object().unwrap());
        assert_eq!(c.tokens, vec!["new"]);
        assert_eq!(c.state, State::Flux);
        assert_eq!(c.energy, 1.0);
    }

    fn arb_capsule() -> impl Strategy<Value = Capsule> {
        let scalar = || -1e6..1e6f64;
        let triplet = (scalar(), scalar(), scalar(), 0usize..3).prop_map(|(a, b, c, k)| {
            let kind = [
                TripletKind::Presence,
                TripletKind::Trig,
                TripletKind::Combinatorics,
            ][k];
            Triplet::new(a, b, c, kind)
        });
        (
            prop::collection::vec("[a-z]{1,8}", 0..12),
            prop::collection::vec(triplet, 0..6),
            prop::array::uniform8(scalar()),
            0usize..4,
            any::<bool>(),
            prop::collection::vec("[a-z]{1,6}", 0..3),
        )
            .prop_map(|(tokens, triplets, s, ordinal, linked, trace)| {
                let mut c = if linked {
                    Capsule::new().successor()
                } else {
                    Capsule::new()
                };
                c.tokens = tokens;
                c.triplets = triplets;
                c.curvature = s[0];
                c.entropy = s[1];
                c.density = s[2];
                c.psi = s[3];
                c.energy = s[4];
                c.reptend_entropy = s[5];
                c.rail_interference = s[6];
                c.measurement_error = s[7];
                c.state = State::from_ordinal(ordinal);
                c.metadata.insert("flux_label".into(), json!("low"));
                c.agent_trace = trace;
                c
            })
    }

    proptest! {
        #[test]
        fn prop_roundtrip_is_exact(c in arb_capsule()) {
            prop_assert_eq!(&Capsule::decode(&c.encode()), &c);
            let back = import_json(&export_json(&c).unwrap()).unwrap();
            prop_assert_eq!(&back, &c);
        }
    }
}
