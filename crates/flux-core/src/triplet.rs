//! Triplet extraction: tokens are hashed into [0, 1] in runs of three and each
//! run is classified against the presence, trig and combinatorics patterns.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{SQRT2, TRIPLET_TOLERANCE};
use crate::math::{next_prime, triplet_entropy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TripletKind {
    /// (0, 1, √2). Also the fallback for runs that match nothing.
    #[default]
    Presence,
    /// (⅓, ⅔, 1)
    Trig,
    /// Two near-equal values followed by a distinct third.
    Combinatorics,
}

impl TripletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Presence => "presence",
            Self::Trig => "trig",
            Self::Combinatorics => "combinatorics",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "trig" => Self::Trig,
            "combinatorics" | "combinatoric" => Self::Combinatorics,
            _ => Self::Presence,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    #[serde(rename = "type")]
    pub kind: TripletKind,
}

impl Triplet {
    pub fn new(a: f64, b: f64, c: f64, kind: TripletKind) -> Self {
        Self { a, b, c, kind }
    }

    /// The canonical presence shape (0, 1, √2).
    pub fn presence() -> Self {
        Self::new(0.0, 1.0, SQRT2, TripletKind::Presence)
    }

    /// The canonical trig shape (⅓, ⅔, 1).
    pub fn trig() -> Self {
        Self::new(1.0 / 3.0, 2.0 / 3.0, 1.0, TripletKind::Trig)
    }

    /// Classify normalized values. Unmatched shapes fall back to presence.
    pub fn classify(a: f64, b: f64, c: f64) -> Self {
        let tol = TRIPLET_TOLERANCE;
        let kind = if a.abs() < tol && (b - 1.0).abs() < tol && (c - SQRT2).abs() < tol {
            TripletKind::Presence
        } else if (a - 1.0 / 3.0).abs() < tol
            && (b - 2.0 / 3.0).abs() < tol
            && (c - 1.0).abs() < tol
        {
            TripletKind::Trig
        } else if (a - b).abs() < tol && (c - a).abs() > tol {
            TripletKind::Combinatorics
        } else {
            TripletKind::Presence
        };
        Self::new(a, b, c, kind)
    }

    pub fn values(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    pub fn is_combinatoric(&self) -> bool {
        self.kind == TripletKind::Combinatorics
    }

    /// a·b·c
    pub fn curvature(&self) -> f64 {
        self.a * self.b * self.c
    }

    pub fn entropy(&self) -> f64 {
        triplet_entropy(self.values())
    }

    /// Prime pair (p, q) derived from the first and last component.
    /// Meaningful for combinatorics triplets; computed for any kind.
    pub fn primes(&self) -> (u64, u64) {
        (component_prime(self.a), component_prime(self.c))
    }
}

fn component_prime(v: f64) -> u64 {
    let scaled = (v.abs() * 100.0).floor();
    next_prime((scaled as u64).max(2))
}

/// Stable hash of a token into {0.00, 0.01, …, 0.99}.
pub fn token_value(token: &str) -> f64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % 100) as f64 / 100.0
}

/// Split tokens into runs of three and classify each run.
///
/// Full runs are normalized by their maximum before classification. A trailing
/// pair becomes (v₁, v₂, √2) and a lone token (0, v, √2), both tagged presence.
pub fn extract_triplets<S: AsRef<str>>(tokens: &[S]) -> Vec<Triplet> {
    tokens
        .chunks(3)
        .map(|run| {
            let values: Vec<f64> = run.iter().map(|t| token_value(t.as_ref())).collect();
            match values.as_slice() {
                &[a, b, c] => {
                    let max = a.max(b).max(c);
                    if max > 0.0 {
                        Triplet::classify(a / max, b / max, c / max)
                    } else {
                        Triplet::classify(a, b, c)
                    }
                }
                &[a, b] => Triplet::new(a, b, SQRT2, TripletKind::Presence),
                &[v] => Triplet::new(0.0, v, SQRT2, TripletKind::Presence),
                _ => Triplet::presence(),
            }
        })
        .collect()
}
