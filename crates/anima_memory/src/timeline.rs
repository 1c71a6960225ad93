//! Timeline memory: significant events, regrets, anticipations and lessons.

use anima_core::similarity::content_tokens;
use anima_core::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const TIMELINE_KEY: &str = "timeline";

const EVENT_RETENTION: usize = 500;
const ANTICIPATION_RETENTION: usize = 50;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Interaction,
    Learning,
    Introspection,
    Goal,
    IdentityShift,
    Rest,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Interaction => "interaction",
            EventKind::Learning => "learning",
            EventKind::Introspection => "introspection",
            EventKind::Goal => "goal",
            EventKind::IdentityShift => "identity_shift",
            EventKind::Rest => "rest",
            EventKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsequenceNote {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub description: String,
    #[serde(default)]
    pub consequences: Vec<ConsequenceNote>,
    /// Importance for later reflection, 0..=1.
    #[serde(default)]
    pub learning_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarSituation {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub did_better: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regret {
    pub timestamp: DateTime<Utc>,
    pub situation: String,
    pub action_taken: String,
    pub better_action: String,
    #[serde(default)]
    pub why_better: String,
    #[serde(default)]
    pub similar_situations: Vec<SimilarSituation>,
}

impl Regret {
    /// A regret counts as learned once a later similar situation went better.
    pub fn learned(&self) -> bool {
        self.similar_situations.iter().any(|s| s.did_better)
    }

    pub fn times_reflected(&self) -> usize {
        self.similar_situations.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anticipation {
    pub timestamp: DateTime<Utc>,
    pub expectation: String,
    pub probability: f64,
    #[serde(default)]
    pub preparation: String,
    #[serde(default)]
    pub outcome: Option<bool>,
}

impl Anticipation {
    pub fn verify(&mut self, did_happen: bool) {
        self.outcome = Some(did_happen);
        self.probability = if did_happen {
            (self.probability + 0.1).min(1.0)
        } else {
            (self.probability - 0.05).max(0.0)
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSummary {
    pub events_in_period: usize,
    pub event_kinds: Vec<EventKind>,
    pub regrets_to_learn_from: usize,
    pub anticipation_accuracy: f64,
    pub key_lessons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalInsights {
    pub total_events: usize,
    pub total_regrets: usize,
    pub learned_regrets: usize,
    pub causal_patterns: usize,
    pub lessons_accumulated: usize,
    pub anticipation_accuracy: f64,
    pub most_common_event: Option<EventKind>,
}

// ============================================================================
// TimelineMemory
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct TimelineRecord {
    events: Vec<TimelineEvent>,
    regrets: Vec<Regret>,
    anticipations: Vec<Anticipation>,
    causal_chains: Vec<Vec<String>>,
    lessons: Vec<String>,
}

pub struct TimelineMemory {
    record: TimelineRecord,
    store: Arc<dyn DurableStore>,
}

impl TimelineMemory {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: TimelineRecord::default(),
            store,
        }
    }

    // ------------------------------------------------------------------ events

    /// Append an event and return its index.
    pub fn record_event(&mut self, kind: EventKind, description: impl Into<String>) -> usize {
        self.record_event_at(kind, description, 0.0, Utc::now())
    }

    pub fn record_event_at(
        &mut self,
        kind: EventKind,
        description: impl Into<String>,
        learning_value: f64,
        now: DateTime<Utc>,
    ) -> usize {
        self.record.events.push(TimelineEvent {
            timestamp: now,
            kind,
            description: description.into(),
            consequences: Vec::new(),
            learning_value: learning_value.clamp(0.0, 1.0),
        });
        if self.record.events.len() > EVENT_RETENTION {
            let excess = self.record.events.len() - EVENT_RETENTION;
            self.record.events.drain(..excess);
        }
        self.save();
        self.record.events.len() - 1
    }

    pub fn add_consequence(&mut self, index: usize, description: &str, confidence: f64) -> bool {
        let Some(event) = self.record.events.get_mut(index) else {
            return false;
        };
        event.consequences.push(ConsequenceNote {
            timestamp: Utc::now(),
            description: description.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        });
        self.save();
        true
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.record.events
    }

    pub fn recent_events(&self, window: Duration, now: DateTime<Utc>) -> Vec<&TimelineEvent> {
        let cutoff = now - window;
        self.record
            .events
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .collect()
    }

    /// The event at `index` followed by up to `depth` later events.
    pub fn event_chain(&self, index: usize, depth: usize) -> Vec<&TimelineEvent> {
        let Some(start) = self.record.events.get(index) else {
            return Vec::new();
        };
        std::iter::once(start)
            .chain(self.record.events.iter().skip(index + 1).take(depth))
            .collect()
    }

    // ----------------------------------------------------------------- regrets

    pub fn record_regret(&mut self, situation: &str, action_taken: &str, better_action: &str, why_better: &str) -> usize {
        self.record.regrets.push(Regret {
            timestamp: Utc::now(),
            situation: situation.to_string(),
            action_taken: action_taken.to_string(),
            better_action: better_action.to_string(),
            why_better: why_better.to_string(),
            similar_situations: Vec::new(),
        });
        self.save();
        self.record.regrets.len() - 1
    }

    pub fn regrets(&self) -> &[Regret] {
        &self.record.regrets
    }

    /// A past regret whose situation opens with words seen in `situation`.
    pub fn matching_regret(&self, situation: &str) -> Option<(usize, &Regret)> {
        let words = content_tokens(situation);
        self.record.regrets.iter().enumerate().find(|(_, r)| {
            content_tokens(&r.situation)
                .iter()
                .take(3)
                .any(|w| words.contains(w))
        })
    }

    pub fn record_regret_learning(&mut self, index: usize, description: &str, did_better: bool) -> bool {
        let Some(regret) = self.record.regrets.get_mut(index) else {
            return false;
        };
        regret.similar_situations.push(SimilarSituation {
            timestamp: Utc::now(),
            description: description.to_string(),
            did_better,
        });
        self.save();
        true
    }

    // ----------------------------------------------------------- anticipations

    pub fn make_anticipation(&mut self, expectation: &str, probability: f64, preparation: &str) -> usize {
        self.record.anticipations.push(Anticipation {
            timestamp: Utc::now(),
            expectation: expectation.to_string(),
            probability: probability.clamp(0.0, 1.0),
            preparation: preparation.to_string(),
            outcome: None,
        });
        if self.record.anticipations.len() > ANTICIPATION_RETENTION {
            let excess = self.record.anticipations.len() - ANTICIPATION_RETENTION;
            self.record.anticipations.drain(..excess);
        }
        self.save();
        self.record.anticipations.len() - 1
    }

    pub fn verify_anticipation(&mut self, index: usize, did_happen: bool) -> bool {
        let Some(a) = self.record.anticipations.get_mut(index) else {
            return false;
        };
        a.verify(did_happen);
        self.save();
        true
    }

    pub fn anticipations(&self) -> &[Anticipation] {
        &self.record.anticipations
    }

    pub fn anticipation_accuracy(&self) -> f64 {
        let verified: Vec<bool> = self
            .record
            .anticipations
            .iter()
            .filter_map(|a| a.outcome)
            .collect();
        if verified.is_empty() {
            return 0.0;
        }
        verified.iter().filter(|v| **v).count() as f64 / verified.len() as f64
    }

    // ---------------------------------------------------------- causal chains

    /// Remember that `events` tend to follow one another. Needs at least two links.
    pub fn identify_causal_chain(&mut self, events: Vec<String>) -> bool {
        if events.len() < 2 {
            return false;
        }
        self.record.causal_chains.push(events);
        self.save();
        true
    }

    /// Everything known to follow from a chain starting like `starting_event`.
    pub fn apply_causal_chain(&self, starting_event: &str) -> Vec<String> {
        let needle = starting_event.to_lowercase();
        self.record
            .causal_chains
            .iter()
            .filter(|chain| {
                chain
                    .first()
                    .is_some_and(|head| head.to_lowercase().contains(&needle))
            })
            .flat_map(|chain| chain.iter().skip(1).cloned())
            .collect()
    }

    // ----------------------------------------------------------------- lessons

    /// Returns false if the lesson was already known.
    pub fn record_lesson(&mut self, lesson: &str) -> bool {
        let lesson = lesson.trim();
        if lesson.is_empty() || self.record.lessons.iter().any(|l| l == lesson) {
            return false;
        }
        self.record.lessons.push(lesson.to_string());
        self.save();
        true
    }

    pub fn lessons(&self) -> &[String] {
        &self.record.lessons
    }

    pub fn lessons_about(&self, topic: &str) -> Vec<&str> {
        let topic = topic.to_lowercase();
        self.record
            .lessons
            .iter()
            .filter(|l| l.to_lowercase().contains(&topic))
            .map(String::as_str)
            .collect()
    }

    /// Lessons sharing content words with `text`.
    pub fn lessons_relevant_to(&self, text: &str, n: usize) -> Vec<&str> {
        let words = content_tokens(text);
        self.record
            .lessons
            .iter()
            .filter(|l| content_tokens(l).iter().any(|w| words.contains(w)))
            .take(n)
            .map(String::as_str)
            .collect()
    }

    // ---------------------------------------------------------------- summary

    pub fn summary(&self, window: Duration, now: DateTime<Utc>) -> TimelineSummary {
        let recent = self.recent_events(window, now);
        let mut kinds: Vec<EventKind> = Vec::new();
        for e in &recent {
            if !kinds.contains(&e.kind) {
                kinds.push(e.kind);
            }
        }
        let skip = self.record.lessons.len().saturating_sub(5);
        TimelineSummary {
            events_in_period: recent.len(),
            event_kinds: kinds,
            regrets_to_learn_from: self.record.regrets.iter().filter(|r| !r.learned()).count(),
            anticipation_accuracy: self.anticipation_accuracy(),
            key_lessons: self.record.lessons[skip..].to_vec(),
        }
    }

    pub fn insights(&self) -> TemporalInsights {
        let mut counts: HashMap<EventKind, usize> = HashMap::new();
        for e in &self.record.events {
            *counts.entry(e.kind).or_insert(0) += 1;
        }
        let most_common_event = counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.as_str().cmp(a.0.as_str())))
            .map(|(kind, _)| kind);
        TemporalInsights {
            total_events: self.record.events.len(),
            total_regrets: self.record.regrets.len(),
            learned_regrets: self.record.regrets.iter().filter(|r| r.learned()).count(),
            causal_patterns: self.record.causal_chains.len(),
            lessons_accumulated: self.record.lessons.len(),
            anticipation_accuracy: self.anticipation_accuracy(),
            most_common_event,
        }
    }
}

impl Persistent for TimelineMemory {
    fn load(&mut self) -> bool {
        match load_record::<TimelineRecord>(self.store.as_ref(), TIMELINE_KEY) {
            Some(record) => {
                tracing::info!(
                    "Restored timeline: {} events, {} regrets, {} lessons",
                    record.events.len(),
                    record.regrets.len(),
                    record.lessons.len()
                );
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), TIMELINE_KEY, &self.record);
    }
}
