//! Closed-form signal functions shared by the feature engine, orchestrator and agents.
//!
//! Everything here is a pure function of its arguments. None of the formulas claim
//! physical meaning; they are tuned signal shapes.

use crate::constants::{DENSITY_WINDOW, PHI, SQRT2, TAN_CLAMP, TRIPLET_ENTROPY_FLOOR};
use crate::state::State;

const SQRT3: f64 = 1.732_050_807_568_877_2;
const SQRT5: f64 = 2.236_067_977_499_79;

/// tan(x) clamped to ±1e10 so periodic terms stay finite near poles.
pub fn clamped_tan(x: f64) -> f64 {
    x.tan().clamp(-TAN_CLAMP, TAN_CLAMP)
}

/// |sin x| + |cos x| + |tan x| / 3
pub fn trig_curvature(x: f64) -> f64 {
    x.sin().abs() + x.cos().abs() + clamped_tan(x).abs() / 3.0
}

/// √2|x| + ½√3|x| + 0.3√5|x| + φ|x|
pub fn irrational_curvature(x: f64) -> f64 {
    let a = x.abs();
    SQRT2 * a + SQRT3 * a * 0.5 + SQRT5 * a * 0.3 + PHI * a
}

/// √2·sin x + (π/φ)·tan x + ln(|x| + 2)
pub fn hamiltonian(x: f64) -> f64 {
    SQRT2 * x.sin() + (std::f64::consts::PI / PHI) * clamped_tan(x) + (x.abs() + 2.0).ln()
}

/// tanh(√2·tan(πx/3)), bounded to (-1, 1).
pub fn flux_basic(x: f64) -> f64 {
    (SQRT2 * clamped_tan(std::f64::consts::PI / 3.0 * x)).tanh()
}

/// Flux scaled up by curvature.
pub fn flux_propagate(x: f64, curvature: f64) -> f64 {
    flux_basic(x) * (1.0 + 0.2 * curvature)
}

/// Distinction density at the end of a batch of `n` tokens.
pub fn distinction_density(n: usize) -> f64 {
    n.min(3) as f64 / DENSITY_WINDOW
}

/// |ψ| of the balanced (0.5, 0.5) superposition every fresh capsule starts from.
pub fn initial_psi() -> f64 {
    (0.5_f64 * 0.5 + 0.5 * 0.5).sqrt()
}

/// Σ ln(max(|e|, 0.001)) over the triplet's components.
pub fn triplet_entropy(values: [f64; 3]) -> f64 {
    values
        .iter()
        .map(|v| v.abs().max(TRIPLET_ENTROPY_FLOOR).ln())
        .sum()
}

/// Deviation introduced by observing `value` in `state`.
///
/// Presence observes nothing, Measurement reports the magnitude,
/// later states add a curvature-proportional term.
pub fn measurement_error(state: State, value: f64, curvature: f64) -> f64 {
    match state {
        State::Presence => 0.0,
        State::Measurement => value.abs(),
        State::Flux | State::Collapse => value.abs() + 0.1 * curvature,
    }
}

// ---------------------------------------------------------------------------
// Primes and reptends
// ---------------------------------------------------------------------------

pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut i = 3;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// Smallest prime ≥ n (2 for n < 2).
pub fn next_prime(n: u64) -> u64 {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

/// Period of the repeating decimal of 1/p: the multiplicative order of 10 mod p.
/// Zero for p < 3 and p = 5, whose expansions terminate.
pub fn reptend_length(p: u64) -> u64 {
    if p < 3 || p == 5 {
        return 0;
    }
    let mut k = 1;
    let mut remainder = 10 % p;
    while remainder != 1 && k < p {
        remainder = (remainder * 10) % p;
        k += 1;
    }
    if k < p { k } else { 0 }
}

/// L(p) / (p − 1)
pub fn reptend_entropy(p: u64) -> f64 {
    if p < 2 {
        return 0.0;
    }
    match reptend_length(p) {
        0 => 0.0,
        l => l as f64 / (p - 1) as f64,
    }
}

/// ln p / L(p)
pub fn reptend_curvature(p: u64) -> f64 {
    match reptend_length(p) {
        0 => 0.0,
        l => (p as f64).ln() / l as f64,
    }
}

/// ln p + ln q
pub fn combinatoric_entropy(p: u64, q: u64) -> f64 {
    (p.max(1) as f64).ln() + (q.max(1) as f64).ln()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rail {
    /// 2 and 3 sit off both rails.
    Special,
    /// p ≡ 5 (mod 6)
    A,
    /// p ≡ 1 (mod 6)
    B,
}

pub fn rail_of(p: u64) -> Rail {
    match p % 6 {
        _ if p == 2 || p == 3 => Rail::Special,
        5 => Rail::A,
        1 => Rail::B,
        _ => Rail::Special,
    }
}

/// Interference between two primes: 0 if either is special, 0.2 on the same
/// rail, 1.0 across rails.
pub fn rail_interaction(p: u64, q: u64) -> f64 {
    match (rail_of(p), rail_of(q)) {
        (Rail::Special, _) | (_, Rail::Special) => 0.0,
        (a, b) if a == b => 0.2,
        _ => 1.0,
    }
}
