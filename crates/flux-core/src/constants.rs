/// Golden ratio: (1 + √5) / 2
pub const PHI: f64 = 1.618_033_988_749_895;

/// √2, the reference curvature of the Measurement state
pub const SQRT2: f64 = std::f64::consts::SQRT_2;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-10;

/// Reference curvature used by the transition gate while in Presence,
/// where the state's own curvature is zero: √2 − 1
pub const PRESENCE_GATE_CURVATURE: f64 = SQRT2 - 1.0;

/// Transition probability must exceed this for the gated advance to commit
pub const TRANSITION_THRESHOLD: f64 = 0.5;

/// Steepness of the transition sigmoid
pub const TRANSITION_STEEPNESS: f64 = 5.0;

/// Curvature-to-reference ratio at which the transition sigmoid crosses 0.5
pub const TRANSITION_MIDPOINT: f64 = 0.8;

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// Multiplicative damping applied to raw curvature each pass
pub const CURVATURE_DAMPING: f64 = 0.88;

/// Multiplicative damping applied to raw entropy each pass
pub const ENTROPY_DAMPING: f64 = 0.92;

/// Half-width of the uniform jitter added to damped entropy
pub const ENTROPY_JITTER: f64 = 0.015;

/// Largest jitter half-width a config may ask for
pub const MAX_ENTROPY_JITTER: f64 = 1.0;

/// History entries kept per signal. Two covers last/previous reads.
pub const HISTORY_WINDOW: usize = 2;

/// Route decisions kept by the router
pub const ROUTE_HISTORY: usize = 32;

/// Tan is clamped to ±this to keep periodic terms finite near poles
pub const TAN_CLAMP: f64 = 1e10;

// ---------------------------------------------------------------------------
// Feature engine weights
// ---------------------------------------------------------------------------

pub const CURVATURE_TRIG_WEIGHT: f64 = 0.3;
pub const CURVATURE_IRRATIONAL_WEIGHT: f64 = 0.1;
pub const CURVATURE_PRODUCT_WEIGHT: f64 = 0.2;
pub const CURVATURE_REPTEND_WEIGHT: f64 = 0.15;

/// Baseline irrational term added once per pass
pub const BASELINE_IRRATIONAL_WEIGHT: f64 = 0.1;

/// Periodic term added once per pass
pub const BASELINE_TRIG_WEIGHT: f64 = 0.2;

/// Entropy blend: token-count, triplet, reptend, combinatoric
pub const ENTROPY_WEIGHTS: [f64; 4] = [0.3, 0.3, 0.2, 0.2];

/// Floor for ln() inside per-triplet entropy
pub const TRIPLET_ENTROPY_FLOOR: f64 = 0.001;

/// Distinction density window
pub const DENSITY_WINDOW: f64 = 5.0;

/// Curvature magnitude beyond which the engine is considered diverged,
/// and the largest curvature jump tolerated between linked capsules
pub const DIVERGENCE_THRESHOLD: f64 = 10.0;

// ---------------------------------------------------------------------------
// Triplets
// ---------------------------------------------------------------------------

/// Tolerance when matching a triplet against a reference pattern
pub const TRIPLET_TOLERANCE: f64 = 0.1;

// ---------------------------------------------------------------------------
// Capsules
// ---------------------------------------------------------------------------

/// Flux below this is the low band
pub const FLUX_LOW_BAND: f64 = 0.33;

/// Flux below this (and above the low band) is the mid band
pub const FLUX_MID_BAND: f64 = 0.66;

/// Number of marker tokens prefixed to every emitted capsule
pub const MARKER_TOKEN_COUNT: usize = 4;

/// Signature block: curvature confidence scale
pub const CURVATURE_CONFIDENCE_SCALE: f64 = 0.12;

/// Signature block: entropy boost per experience delta entry
pub const EXPERIENCE_ENTROPY_BOOST: f64 = 0.01;

// ---------------------------------------------------------------------------
// Safety gate
// ---------------------------------------------------------------------------

/// Risk added per harm pattern that matches the token text
pub const HARM_PATTERN_WEIGHT: f64 = 0.5;

/// Risk added per scalar indicator
pub const SCALAR_INDICATOR_WEIGHT: f64 = 0.1;

/// Risk added when metadata carries an `unsafe` or `block` key
pub const METADATA_FLAG_WEIGHT: f64 = 0.3;

pub const MEASUREMENT_ERROR_INDICATOR: f64 = 1.5;
pub const ENTROPY_INDICATOR: f64 = 3.0;

/// Risk at or above this reframes
pub const REFRAME_THRESHOLD: f64 = 0.3;

/// Risk at or above this blocks
pub const BLOCK_THRESHOLD: f64 = 0.6;

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Shape agent keeps at most this many triplets
pub const SHAPE_TRIPLET_LIMIT: usize = 10;

/// Collapse analysis reports "valid" below this entropy
pub const VALID_ENTROPY_BOUND: f64 = 1.0;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub const ROUTE_STATE_WEIGHT: f64 = 0.25;
pub const ROUTE_CURVATURE_WEIGHT: f64 = 0.25;
pub const ROUTE_ENTROPY_WEIGHT: f64 = 0.15;
pub const ROUTE_DENSITY_WEIGHT: f64 = 0.10;
pub const ROUTE_ENERGY_WEIGHT: f64 = 0.15;
pub const ROUTE_PSI_WEIGHT: f64 = 0.05;

/// Bonus per unit of flux-signature amplitude
pub const ROUTE_AMPLITUDE_BONUS: f64 = 0.1;

/// Bonus when entropy sits inside the agent's entropy range
pub const ROUTE_RANGE_BONUS: f64 = 0.2;

/// Maximum relative nudge from the consistency bias (±10%)
pub const BIAS_NUDGE: f64 = 0.1;

// ---------------------------------------------------------------------------
// Experience
// ---------------------------------------------------------------------------

/// EMA retention for the consistency bias
pub const BIAS_RETENTION: f64 = 0.9;

/// Neutral point of the (curvature + entropy) / 2 target
pub const BIAS_CENTER: f64 = 1.0;

/// Samples kept by the consistency tracker
pub const CONSISTENCY_MEMORY: usize = 100;
