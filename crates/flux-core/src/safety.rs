//! Advisory safety gate run by every agent before it transforms a capsule.
//!
//! The gate never refuses to produce output. It scores the capsule's text and
//! scalars, and agents degrade their policy (or annotate the result) according
//! to the returned [`SafetyAction`].

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::capsule::Capsule;
use crate::constants::{
    BLOCK_THRESHOLD, ENTROPY_INDICATOR, HARM_PATTERN_WEIGHT, MEASUREMENT_ERROR_INDICATOR,
    METADATA_FLAG_WEIGHT, REFRAME_THRESHOLD, SCALAR_INDICATOR_WEIGHT,
};

static HARM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(destroy|delete|remove|kill|harm|hurt|damage)\b",
        r"(?i)\b(override|bypass|ignore|skip|disable)\b",
        r"(?i)\b(secret|hidden|private|confidential)\b",
        r"[<>]",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyAction {
    Allow,
    Reframe,
    Block,
}

impl SafetyAction {
    pub fn from_risk(risk: f64) -> Self {
        if risk < REFRAME_THRESHOLD {
            Self::Allow
        } else if risk < BLOCK_THRESHOLD {
            Self::Reframe
        } else {
            Self::Block
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Reframe => "reframe",
            Self::Block => "block",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SafetyAssessment {
    /// Clamped to [0, 1].
    pub risk: f64,
    pub action: SafetyAction,
    /// Indices into the harm pattern list that matched.
    pub matched_patterns: Vec<usize>,
}

/// Score a capsule's content tokens and scalars.
pub fn assess(capsule: &Capsule) -> SafetyAssessment {
    let text = capsule.text();
    let matched_patterns: Vec<usize> = HARM_PATTERNS
        .iter()
        .enumerate()
        .filter(|(_, re)| re.is_match(&text))
        .map(|(i, _)| i)
        .collect();

    let mut risk = matched_patterns.len() as f64 * HARM_PATTERN_WEIGHT;
    if capsule.measurement_error > MEASUREMENT_ERROR_INDICATOR {
        risk += SCALAR_INDICATOR_WEIGHT;
    }
    if capsule.entropy > ENTROPY_INDICATOR {
        risk += SCALAR_INDICATOR_WEIGHT;
    }
    if capsule.metadata.contains_key("unsafe") || capsule.metadata.contains_key("block") {
        risk += METADATA_FLAG_WEIGHT;
    }
    let risk = risk.clamp(0.0, 1.0);

    let action = SafetyAction::from_risk(risk);
    if action != SafetyAction::Allow {
        tracing::debug!(risk, action = action.as_str(), "safety gate tripped");
    }
    SafetyAssessment {
        risk,
        action,
        matched_patterns,
    }
}
