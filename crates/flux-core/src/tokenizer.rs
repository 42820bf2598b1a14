//! Text → tokens, plus the structural hints an upstream extractor may attach.
//!
//! The pipeline only needs an ordered token list. Hints are auxiliary: the
//! orchestrator records them on the capsule but does not depend on them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::state::State;

static WORD_OR_OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w']+|!=|<>|[!=<>?|&{}]").unwrap());
static APOSTROPHE_TRIM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^'+|'+$").unwrap());

const CONTRAST: &[&str] = &[
    "but", "vs", "versus", "else", "otherwise", "difference", "diff", "contrast", "not", "no",
    "without", "except", "!=", "<>", "!",
];
const BRANCHING: &[&str] = &[
    "if", "or", "match", "switch", "case", "when", "then", "choose", "select", "pick", "?", "|",
    "&",
];
const RECURSION: &[&str] = &[
    "for", "while", "loop", "repeat", "recurse", "recursive", "iterate", "call", "invoke",
    "apply", "{", "}",
];
const COLLAPSE: &[&str] = &[
    "return", "done", "final", "finally", "therefore", "result", "conclude", "=",
];

/// Lowercase words with apostrophes kept inside words; comparison and
/// branching operators survive as their own tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_OR_OPERATOR
        .find_iter(&lowered)
        .map(|m| APOSTROPHE_TRIM.replace_all(m.as_str(), "").to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Hints {
    /// One suggestion per token.
    pub state_suggestions: Vec<State>,
    pub contrast: usize,
    pub branching: usize,
    pub recursion: usize,
}

impl Hints {
    /// Most frequent non-Presence suggestion, Presence if there is none.
    /// Ties go to the later state in the cycle.
    pub fn dominant(&self) -> State {
        let mut counts = [0usize; 4];
        for s in &self.state_suggestions {
            counts[s.ordinal()] += 1;
        }
        (1..4)
            .filter(|&i| counts[i] > 0)
            .max_by_key(|&i| (counts[i], i))
            .map(State::from_ordinal)
            .unwrap_or(State::Presence)
    }
}

/// Per-token state suggestions and marker counts.
///
/// Contrast markers suggest Measurement, branching and recursion suggest Flux,
/// collapse markers suggest Collapse.
pub fn extract_hints<S: AsRef<str>>(tokens: &[S]) -> Hints {
    let mut hints = Hints::default();
    for token in tokens {
        let t = token.as_ref();
        let suggestion = if BRANCHING.contains(&t) {
            hints.branching += 1;
            State::Flux
        } else if RECURSION.contains(&t) {
            hints.recursion += 1;
            State::Flux
        } else if COLLAPSE.contains(&t) {
            State::Collapse
        } else if CONTRAST.contains(&t) {
            hints.contrast += 1;
            State::Measurement
        } else {
            State::Presence
        };
        hints.state_suggestions.push(suggestion);
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_words() {
        assert_eq!(
            tokenize("Don't Delete ALL files, please."),
            vec!["don't", "delete", "all", "files", "please"]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(tokenize("if a != b { x }"), vec!["if", "a", "!=", "b", "{", "x", "}"]);
        assert_eq!(tokenize("<script>"), vec!["<", "script", ">"]);
    }

    #[test]
    fn test_tokenize_trims_quotes() {
        assert_eq!(tokenize("'quoted'"), vec!["quoted"]);
        assert!(tokenize("''' ...").is_empty());
    }

    #[test]
    fn test_hints() {
        let tokens = tokenize("if this but not that then return");
        let hints = extract_hints(&tokens);
        assert_eq!(hints.state_suggestions.len(), tokens.len());
        assert_eq!(hints.branching, 2);
        assert_eq!(hints.contrast, 2);
        assert_eq!(hints.state_suggestions[0], State::Flux);
        assert_eq!(hints.state_suggestions[6], State::Collapse);
    }

    #[test]
    fn test_dominant() {
        let plain = extract_hints(&tokenize("the quick fox"));
        assert_eq!(plain.dominant(), State::Presence);

        let branchy = extract_hints(&tokenize("if or when but"));
        assert_eq!(branchy.dominant(), State::Flux);
    }
}
