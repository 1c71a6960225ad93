use crate::similarity::{content_tokens, overlap_ratio, SimilarityCheck, TokenOverlap};
use crate::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const STATE_KEY: &str = "state";

pub const MAX_LEVEL: f64 = 100.0;
pub const BASELINE_MOOD: f64 = 50.0;

const TALK_COST: f64 = 2.0;
const TALK_MOOD_RANGE: (f64, f64) = (-1.0, 2.0);
const SECONDS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Talk,
    Sleep,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub text: String,
    pub learned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FactOutcome {
    Accepted,
    TooShort,
    Duplicate,
    NearDuplicate { existing: String },
}

impl FactOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FactOutcome::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateDescription {
    Exhausted,
    Tired,
    Grumpy,
    Excited,
    Neutral,
}

impl StateDescription {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateDescription::Exhausted => "EXHAUSTED",
            StateDescription::Tired => "TIRED",
            StateDescription::Grumpy => "GRUMPY",
            StateDescription::Excited => "EXCITED",
            StateDescription::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for StateDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub vitality: f64,
    pub mood: f64,
    pub description: StateDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StateRecord {
    vitality: f64,
    mood: f64,
    facts: Vec<Fact>,
    last_active: DateTime<Utc>,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            vitality: MAX_LEVEL,
            mood: BASELINE_MOOD,
            facts: Vec::new(),
            last_active: Utc::now(),
        }
    }
}

// ============================================================================
// AgentState
// ============================================================================

/// Vitality, mood and the ledger of learned facts.
///
/// Every mutating call persists the whole record before returning.
pub struct AgentState {
    record: StateRecord,
    store: Arc<dyn DurableStore>,
    similarity: Arc<dyn SimilarityCheck>,
    min_fact_len: usize,
    idle_decay: f64,
}

impl AgentState {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: StateRecord::default(),
            store,
            similarity: Arc::new(TokenOverlap::default()),
            min_fact_len: 3,
            idle_decay: 0.2,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityCheck>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_min_fact_len(mut self, min_len: usize) -> Self {
        self.min_fact_len = min_len;
        self
    }

    pub fn with_idle_decay(mut self, decay: f64) -> Self {
        self.idle_decay = decay.max(0.0);
        self
    }

    pub fn vitality(&self) -> f64 {
        self.record.vitality
    }

    pub fn mood(&self) -> f64 {
        self.record.mood
    }

    pub fn facts(&self) -> &[Fact] {
        &self.record.facts
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.record.last_active
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            vitality: self.record.vitality,
            mood: self.record.mood,
            description: self.describe_state(),
        }
    }

    pub fn apply_action(&mut self, kind: ActionKind) -> StateSnapshot {
        self.apply_action_with(kind, &mut rand::thread_rng())
    }

    pub fn apply_action_with<R: Rng>(&mut self, kind: ActionKind, rng: &mut R) -> StateSnapshot {
        match kind {
            ActionKind::Talk => {
                self.record.vitality -= TALK_COST;
                self.record.mood += rng.gen_range(TALK_MOOD_RANGE.0..=TALK_MOOD_RANGE.1);
            }
            ActionKind::Sleep => {
                self.record.vitality = MAX_LEVEL;
                self.record.mood = BASELINE_MOOD;
            }
            ActionKind::Idle => {
                self.record.vitality -= self.idle_decay;
            }
        }
        self.record.vitality = clamp_level(self.record.vitality);
        self.record.mood = clamp_level(self.record.mood);
        if kind != ActionKind::Idle {
            self.record.last_active = Utc::now();
        }
        tracing::trace!(
            "State after {:?}: vitality={:.1} mood={:.1}",
            kind,
            self.record.vitality,
            self.record.mood
        );
        self.save();
        self.snapshot()
    }

    pub fn add_fact(&mut self, text: &str) -> FactOutcome {
        self.add_fact_at(text, Utc::now())
    }

    pub fn add_fact_at(&mut self, text: &str, now: DateTime<Utc>) -> FactOutcome {
        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.chars().count() < self.min_fact_len {
            tracing::debug!("Rejected fact (too short): {:?}", cleaned);
            return FactOutcome::TooShort;
        }

        let key = cleaned.to_lowercase();
        if self
            .record
            .facts
            .iter()
            .any(|f| f.text.to_lowercase() == key)
        {
            tracing::debug!("Rejected fact (duplicate): {:?}", cleaned);
            return FactOutcome::Duplicate;
        }

        if let Some(existing) = self
            .record
            .facts
            .iter()
            .find(|f| self.similarity.is_duplicate(&cleaned, &f.text))
        {
            tracing::debug!(
                "Rejected fact (near-duplicate of {:?}): {:?}",
                existing.text,
                cleaned
            );
            return FactOutcome::NearDuplicate {
                existing: existing.text.clone(),
            };
        }

        tracing::info!("Learned fact: {}", cleaned);
        self.record.facts.push(Fact {
            text: cleaned,
            learned_at: now,
        });
        self.save();
        FactOutcome::Accepted
    }

    pub fn coherence(&self) -> f64 {
        self.coherence_at(Utc::now())
    }

    /// `0.6 * stability + 0.4 * count_health`.
    ///
    /// Stability is the mean fact age measured in days, capped at 1. Count
    /// health peaks for 5 to 30 facts.
    pub fn coherence_at(&self, now: DateTime<Utc>) -> f64 {
        let n = self.record.facts.len();
        if n == 0 {
            return 0.5;
        }

        let total_age: f64 = self
            .record
            .facts
            .iter()
            .map(|f| (now - f.learned_at).num_milliseconds().max(0) as f64 / 1000.0)
            .sum();
        let stability = (total_age / (n as f64 * SECONDS_PER_DAY)).min(1.0);

        let count_health = match n {
            0..=4 => n as f64 / 5.0,
            5..=30 => 1.0,
            _ => (1.0 - (n - 30) as f64 / 100.0).max(0.5),
        };

        (0.6 * stability + 0.4 * count_health).clamp(0.0, 1.0)
    }

    pub fn is_fragmented(&self, threshold: f64) -> bool {
        self.coherence() < threshold
    }

    pub fn describe_state(&self) -> StateDescription {
        let v = self.record.vitality;
        let m = self.record.mood;
        if v < 20.0 {
            StateDescription::Exhausted
        } else if v < 50.0 {
            StateDescription::Tired
        } else if m < 30.0 {
            StateDescription::Grumpy
        } else if m > 70.0 {
            StateDescription::Excited
        } else {
            StateDescription::Neutral
        }
    }

    pub fn status(&self) -> String {
        format!(
            "Vitality: {}/100 | Mood: {}/100 | State: {} | Facts: {}",
            self.record.vitality.round() as i64,
            self.record.mood.round() as i64,
            self.describe_state(),
            self.record.facts.len()
        )
    }

    pub fn recent_facts(&self, n: usize) -> Vec<&Fact> {
        let skip = self.record.facts.len().saturating_sub(n);
        self.record.facts.iter().skip(skip).collect()
    }

    pub fn facts_by_age(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<&Fact> {
        self.record
            .facts
            .iter()
            .filter(|f| now - f.learned_at <= max_age)
            .collect()
    }

    /// Facts sharing content words with `query`, best match first.
    pub fn relevant_facts(&self, query: &str, n: usize) -> Vec<&Fact> {
        let query_tokens = content_tokens(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(f64, &Fact)> = self
            .record
            .facts
            .iter()
            .map(|f| (overlap_ratio(&query_tokens, &content_tokens(&f.text)), f))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(n).map(|(_, f)| f).collect()
    }
}

impl Persistent for AgentState {
    fn load(&mut self) -> bool {
        match load_record::<StateRecord>(self.store.as_ref(), STATE_KEY) {
            Some(mut record) => {
                record.vitality = clamp_level(record.vitality);
                record.mood = clamp_level(record.mood);
                tracing::info!(
                    "Restored state: vitality={:.0} mood={:.0} facts={}",
                    record.vitality,
                    record.mood,
                    record.facts.len()
                );
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), STATE_KEY, &self.record);
    }
}

fn clamp_level(v: f64) -> f64 {
    if v.is_nan() {
        BASELINE_MOOD
    } else {
        v.clamp(0.0, MAX_LEVEL)
    }
}
