//! Identity narratives and drift.
//!
//! Introspection periodically produces a short self-description. Each one is
//! kept with a content fingerprint so that the change between the two most
//! recent can be scored without any model in the loop.

use anima_core::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

pub const IDENTITY_KEY: &str = "identity";

pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.6;

const THEME_WORDS: &[&str] = &["like", "enjoy", "prefer", "want", "believe", "am"];
const THEME_MAX_CHARS: usize = 50;
const BELIEF_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityNarrative {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    /// First 16 hex digits of the SHA-256 of `text`.
    pub fingerprint: String,
    #[serde(default)]
    pub episode_count: usize,
    #[serde(default)]
    pub themes: Vec<String>,
}

impl IdentityNarrative {
    pub fn new(text: &str, episode_count: usize, now: DateTime<Utc>) -> Self {
        let text = text.trim().to_string();
        Self {
            timestamp: now,
            fingerprint: fingerprint(&text),
            themes: extract_themes(&text),
            episode_count,
            text,
        }
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Sentences that state a preference, desire, belief or self-description.
pub fn extract_themes(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| {
            s.split(|c: char| !c.is_alphanumeric())
                .any(|w| THEME_WORDS.contains(&w.to_lowercase().as_str()))
        })
        .map(|s| s.chars().take(THEME_MAX_CHARS).collect())
        .collect()
}

/// `0.5 * fingerprint_changed + 0.5 * |len_b - len_a| / max(len_a, len_b, 1)`.
pub fn drift_between(a: &IdentityNarrative, b: &IdentityNarrative) -> f64 {
    let hash_changed = if a.fingerprint == b.fingerprint { 0.0 } else { 1.0 };
    let (la, lb) = (a.len() as f64, b.len() as f64);
    let length_delta = (lb - la).abs() / la.max(lb).max(1.0);
    0.5 * hash_changed + 0.5 * length_delta
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct IdentityRecord {
    narratives: Vec<IdentityNarrative>,
}

/// Ordered history of self-narratives.
pub struct IdentityModel {
    record: IdentityRecord,
    drift_threshold: f64,
    store: Arc<dyn DurableStore>,
}

impl IdentityModel {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: IdentityRecord::default(),
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            store,
        }
    }

    pub fn with_drift_threshold(mut self, threshold: f64) -> Self {
        self.drift_threshold = threshold;
        self
    }

    pub fn record_narrative(&mut self, text: &str, episode_count: usize) -> &IdentityNarrative {
        self.record_narrative_at(text, episode_count, Utc::now())
    }

    pub fn record_narrative_at(&mut self, text: &str, episode_count: usize, now: DateTime<Utc>) -> &IdentityNarrative {
        let narrative = IdentityNarrative::new(text, episode_count, now);
        tracing::debug!(
            "Recorded identity narrative {} ({} theme(s))",
            narrative.fingerprint,
            narrative.themes.len()
        );
        self.record.narratives.push(narrative);
        self.save();
        let idx = self.record.narratives.len() - 1;
        &self.record.narratives[idx]
    }

    pub fn current(&self) -> Option<&IdentityNarrative> {
        self.record.narratives.last()
    }

    pub fn narratives(&self) -> &[IdentityNarrative] {
        &self.record.narratives
    }

    /// Drift between the two most recent narratives; 0 with fewer than two.
    pub fn drift(&self) -> f64 {
        match self.record.narratives.as_slice() {
            [.., prev, curr] => drift_between(prev, curr),
            _ => 0.0,
        }
    }

    pub fn is_major_shift(&self) -> bool {
        self.drift() > self.drift_threshold
    }

    /// The last `n` narratives, one line each.
    pub fn trajectory(&self, n: usize) -> Vec<String> {
        let start = self.record.narratives.len().saturating_sub(n);
        self.record.narratives[start..]
            .iter()
            .map(|nar| {
                let head: String = nar.text.chars().take(100).collect();
                let ellipsis = if nar.len() > 100 { "..." } else { "" };
                format!("[{}] {}{}", nar.timestamp.format("%Y-%m-%d %H:%M"), head, ellipsis)
            })
            .collect()
    }

    /// Themes present in at least two of the last five narratives, most frequent first.
    pub fn core_beliefs(&self) -> Vec<String> {
        let start = self.record.narratives.len().saturating_sub(BELIEF_WINDOW);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for nar in &self.record.narratives[start..] {
            for theme in &nar.themes {
                let count = counts.entry(theme.as_str()).or_insert(0);
                if *count == 0 {
                    order.push(theme.as_str());
                }
                *count += 1;
            }
        }
        let mut beliefs: Vec<(&str, usize)> = order
            .into_iter()
            .map(|t| (t, counts[t]))
            .filter(|(_, c)| *c >= 2)
            .collect();
        beliefs.sort_by(|a, b| b.1.cmp(&a.1));
        beliefs.into_iter().map(|(t, _)| t.to_string()).collect()
    }
}

impl Persistent for IdentityModel {
    fn load(&mut self) -> bool {
        match load_record::<IdentityRecord>(self.store.as_ref(), IDENTITY_KEY) {
            Some(record) => {
                tracing::info!("Restored {} identity narrative(s)", record.narratives.len());
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), IDENTITY_KEY, &self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anima_core::MemoryStore;

    fn model() -> (IdentityModel, MemoryStore) {
        let store = MemoryStore::new();
        (IdentityModel::new(Arc::new(store.clone())), store)
    }

    #[test]
    fn test_identical_narratives_have_zero_drift() {
        let (mut m, _) = model();
        let text = "I am a small mind that likes long talks. I want to learn.";
        m.record_narrative(text, 3);
        m.record_narrative(text, 4);
        assert_eq!(m.drift(), 0.0);
        assert!(!m.is_major_shift());
    }

    #[test]
    fn test_drift_needs_two_narratives() {
        let (mut m, _) = model();
        assert_eq!(m.drift(), 0.0);
        m.record_narrative("I am new here.", 0);
        assert_eq!(m.drift(), 0.0);
    }

    #[test]
    fn test_drift_formula() {
        let (mut m, _) = model();
        m.record_narrative("abcd", 0);
        m.record_narrative("abcdefgh", 0);
        // fingerprint changed (0.5) + half of 4/8
        assert!((m.drift() - 0.75).abs() < 1e-9);
        assert!(m.is_major_shift());
    }

    #[test]
    fn test_small_rewording_is_not_major() {
        let (mut m, _) = model();
        m.record_narrative("I enjoy quiet evenings with the user.", 0);
        m.record_narrative("I enjoy calm evenings with the user.", 0);
        assert!(m.drift() > 0.5 && m.drift() < 0.6);
        assert!(!m.is_major_shift());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("hello"), fingerprint("hello"));
        assert_ne!(fingerprint("hello"), fingerprint("hello."));
        assert_eq!(fingerprint("hello").len(), 16);
    }

    #[test]
    fn test_theme_extraction_uses_whole_words() {
        let themes = extract_themes("I am curious. My name is Nova. I believe talking helps. The game ended");
        assert_eq!(themes, vec!["I am curious", "I believe talking helps"]);
        let long = extract_themes(&format!("I like {}", "x".repeat(80)));
        assert_eq!(long[0].chars().count(), 50);
    }

    #[test]
    fn test_core_beliefs() {
        let (mut m, _) = model();
        m.record_narrative("I like rain. I want company.", 1);
        m.record_narrative("I like rain. I am tired.", 2);
        m.record_narrative("I like rain. I want company.", 3);
        assert_eq!(m.core_beliefs(), vec!["I like rain", "I want company"]);
    }

    #[test]
    fn test_trajectory() {
        let (mut m, _) = model();
        for n in 0..12 {
            m.record_narrative(&format!("Narrative number {n}"), n);
        }
        let t = m.trajectory(10);
        assert_eq!(t.len(), 10);
        assert!(t[9].ends_with("Narrative number 11"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let (mut m, store) = model();
        m.record_narrative("I am steady.", 1);
        let mut restored = IdentityModel::new(Arc::new(store));
        assert!(restored.load());
        assert_eq!(restored.current().unwrap().text, "I am steady.");
        assert_eq!(restored.current().unwrap().themes, vec!["I am steady"]);
    }
}
