//! Near-duplicate detection for the fact ledger.
//!
//! Facts arrive phrased from different viewpoints ("User likes pizza",
//! "I enjoy pizza"), so comparison happens on a normalized bag of content
//! words rather than on raw text.

use std::collections::BTreeSet;

pub trait SimilarityCheck: Send + Sync {
    /// True when `candidate` says the same thing as `existing`.
    fn is_duplicate(&self, candidate: &str, existing: &str) -> bool;
}

/// Words that carry no content for a fact about the user.
const FILLER: &[&str] = &[
    "user", "users", "i", "im", "me", "my", "mine", "myself", "they", "their", "he", "she",
    "his", "her", "a", "an", "the", "is", "am", "are", "was", "were", "be", "been", "really",
    "very", "quite", "so", "also", "too", "s", "do", "does",
];

/// Verbs folded onto a single canonical token.
const PREFERENCE_POSITIVE: &[&str] = &["like", "enjoy", "love", "prefer", "adore", "fond"];
const PREFERENCE_NEGATIVE: &[&str] = &["hate", "dislike", "detest", "loathe"];

/// Token-overlap heuristic: containment of one normalized phrase in the other,
/// or `|A ∩ B| / max(|A|, |B|)` at or above the threshold.
#[derive(Debug, Clone, Copy)]
pub struct TokenOverlap {
    pub threshold: f64,
}

impl Default for TokenOverlap {
    fn default() -> Self {
        Self { threshold: 0.8 }
    }
}

impl TokenOverlap {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }
}

impl SimilarityCheck for TokenOverlap {
    fn is_duplicate(&self, candidate: &str, existing: &str) -> bool {
        let a = content_tokens(candidate);
        let b = content_tokens(existing);
        if a.is_empty() || b.is_empty() {
            return candidate.trim().eq_ignore_ascii_case(existing.trim());
        }

        let phrase_a = format!(" {} ", a.join(" "));
        let phrase_b = format!(" {} ", b.join(" "));
        if phrase_a.contains(&phrase_b) || phrase_b.contains(&phrase_a) {
            return true;
        }

        overlap_ratio(&a, &b) >= self.threshold
    }
}

/// Lowercased content words in order of appearance, with filler removed and
/// simple inflections folded.
pub fn content_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .filter(|w| !FILLER.contains(w))
        .map(fold)
        .collect()
}

pub fn overlap_ratio(a: &[String], b: &[String]) -> f64 {
    let set_a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    let larger = set_a.len().max(set_b.len());
    if larger == 0 {
        return 0.0;
    }
    set_a.intersection(&set_b).count() as f64 / larger as f64
}

fn fold(word: &str) -> String {
    let stem = stem(word);
    if PREFERENCE_POSITIVE.contains(&stem.as_str()) {
        "like".to_string()
    } else if PREFERENCE_NEGATIVE.contains(&stem.as_str()) {
        "hate".to_string()
    } else {
        stem
    }
}

fn stem(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}
