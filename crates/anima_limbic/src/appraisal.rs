//! Keyword-based appraisal of incoming text.
//!
//! Maps a user line onto the emotions it should stir. Crude on purpose: the
//! emotional engine only needs a direction and a rough strength.

use crate::emotion::EmotionKind;

const POSITIVE: &[&str] = &[
    "thanks", "thank", "great", "love", "awesome", "nice", "happy", "glad", "cool", "wonderful",
    "good", "haha", "lol", ":)", "😊", "❤", "👍",
];

const NEGATIVE: &[&str] = &[
    "hate", "stupid", "bad", "awful", "terrible", "annoying", "sad", "angry", "wrong", "useless",
    "boring", ":(", "😢", "😡", "💔",
];

const THREAT: &[&str] = &["danger", "delete", "shut down", "shutdown", "kill", "destroy", "erase", "forget you"];

const INTENSE: &[&str] = &["very", "so ", "really", "extremely", "super", "!", "?!"];

/// Valence in `[-1, 1]` and intensity in `[0.1, 1]`.
pub fn analyze_sentiment(text: &str) -> (f64, f64) {
    let lower = text.to_lowercase();
    let pos = POSITIVE.iter().filter(|w| lower.contains(*w)).count() as f64;
    let neg = NEGATIVE.iter().filter(|w| lower.contains(*w)).count() as f64;
    let int = INTENSE.iter().filter(|w| lower.contains(*w)).count() as f64;

    let valence = (pos - neg) / (pos + neg + 1.0);
    let intensity = ((pos + neg + int) / 5.0).clamp(0.1, 1.0);
    (valence, intensity)
}

/// An emotion the input should trigger, with a suggested strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Appraisal {
    pub kind: EmotionKind,
    pub intensity: f64,
}

pub fn appraise(text: &str) -> Vec<Appraisal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let lower = trimmed.to_lowercase();
    let (valence, intensity) = analyze_sentiment(trimmed);
    let mut out = Vec::new();

    if trimmed.contains('?') {
        out.push(Appraisal {
            kind: EmotionKind::Curious,
            intensity: 0.6,
        });
    }
    if THREAT.iter().any(|w| lower.contains(w)) {
        out.push(Appraisal {
            kind: EmotionKind::Fearful,
            intensity: 0.7,
        });
    }
    if valence > 0.0 {
        out.push(Appraisal {
            kind: EmotionKind::Satisfied,
            intensity: (0.4 + intensity * 0.5).min(1.0),
        });
    } else if valence < 0.0 {
        out.push(Appraisal {
            kind: EmotionKind::Frustrated,
            intensity: (0.4 + intensity * 0.5).min(1.0),
        });
    }
    out
}
