//! Capsule signal pipeline.
//!
//! Turns token batches into scalar signals (curvature, entropy, density, ψ,
//! energy), threads them through a four-state machine, routes the result to one
//! of three fixed transform agents, and packages everything as a self-describing
//! [`Capsule`] that is folded back into the running state for the next call.
//!
//! Zero I/O. Randomness is injected (`&mut impl Rng`) so every pass can run
//! deterministically under test.

pub mod agent;
pub mod capsule;
pub mod config;
pub mod constants;
pub mod continuity;
pub mod engine;
pub mod experience;
pub mod history;
pub mod math;
pub mod orchestrator;
pub mod router;
pub mod safety;
pub mod state;
pub mod supervisor;
pub mod time;
pub mod tokenizer;
pub mod triplet;
pub mod wire;

pub use agent::{Agent, EntropySignature, FluxSignature, Oscillation, Tendency};
pub use capsule::{Capsule, FluxBand};
pub use config::{InvalidConfig, PipelineConfig, TransitionMode};
pub use constants::{EPSILON, PHI, SQRT2};
pub use continuity::{ContinuityViolation, check_continuity, verify_lineage};
pub use engine::{EngineSnapshot, FeatureEngine};
pub use experience::{ConsistencyTracker, ExperienceTracker};
pub use history::History;
pub use orchestrator::{Orchestrator, OrchestratorSnapshot};
pub use router::{RouteRecord, Router};
pub use safety::{SafetyAction, SafetyAssessment, assess};
pub use state::{State, clamp_transition, gated_advance, transition_probability};
pub use supervisor::{PipelineSnapshot, StepOutcome, Supervisor};
pub use time::{millis_to_iso8601, now_iso8601};
pub use tokenizer::{Hints, extract_hints, tokenize};
pub use triplet::{Triplet, TripletKind, extract_triplets, token_value};
pub use wire::{WIRE_VERSION, WireCapsule, export_json, import_json};
