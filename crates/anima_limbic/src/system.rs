use crate::emotion::{DecisionModifier, Emotion, EmotionKind};
use anima_core::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

pub const EMOTIONS_KEY: &str = "emotions";

/// Trigger history entries kept on disk.
pub const HISTORY_LIMIT: usize = 100;

// ============================================================================
// Derived views
// ============================================================================

/// Normalized decision weights; the four fields sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionWeights {
    pub exploration: f64,
    pub safety: f64,
    pub speed: f64,
    pub patience: f64,
}

impl Default for DecisionWeights {
    fn default() -> Self {
        Self {
            exploration: 0.25,
            safety: 0.25,
            speed: 0.25,
            patience: 0.25,
        }
    }
}

impl DecisionWeights {
    fn apply(&mut self, m: &DecisionModifier) {
        self.exploration *= m.exploration;
        self.safety *= m.safety;
        self.speed *= m.speed;
        self.patience *= m.patience;
    }

    fn normalized(self) -> Self {
        let total = self.exploration + self.safety + self.speed + self.patience;
        if total <= 0.0 || !total.is_finite() {
            return Self::default();
        }
        Self {
            exploration: self.exploration / total,
            safety: self.safety / total,
            speed: self.speed / total,
            patience: self.patience / total,
        }
    }

    /// The heaviest weight and its name.
    pub fn dominant(&self) -> (&'static str, f64) {
        [
            ("exploration", self.exploration),
            ("safety", self.safety),
            ("speed", self.speed),
            ("patience", self.patience),
        ]
        .into_iter()
        .fold(("exploration", f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodLabel {
    Excited,
    Content,
    Peaceful,
    Neutral,
    Anxious,
    Discouraged,
    Distressed,
}

impl MoodLabel {
    /// Ordered threshold lookup over (mood, arousal).
    pub fn from_scalars(mood: f64, arousal: f64) -> Self {
        if mood > 0.7 && arousal > 0.6 {
            MoodLabel::Excited
        } else if mood > 0.7 {
            MoodLabel::Content
        } else if mood > 0.5 && arousal < 0.4 {
            MoodLabel::Peaceful
        } else if mood > 0.5 {
            MoodLabel::Neutral
        } else if mood > 0.3 && arousal > 0.6 {
            MoodLabel::Anxious
        } else if mood > 0.3 {
            MoodLabel::Discouraged
        } else {
            MoodLabel::Distressed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodLabel::Excited => "EXCITED",
            MoodLabel::Content => "CONTENT",
            MoodLabel::Peaceful => "PEACEFUL",
            MoodLabel::Neutral => "NEUTRAL",
            MoodLabel::Anxious => "ANXIOUS",
            MoodLabel::Discouraged => "DISCOURAGED",
            MoodLabel::Distressed => "DISTRESSED",
        }
    }
}

impl fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmotionalSnapshot {
    pub mood: f64,
    pub arousal: f64,
    pub label: MoodLabel,
    /// Active emotions with their current intensity, strongest first.
    pub active: Vec<(EmotionKind, f64)>,
    pub weights: DecisionWeights,
}

impl EmotionalSnapshot {
    pub fn describe(&self) -> String {
        let active = if self.active.is_empty() {
            "calm".to_string()
        } else {
            self.active
                .iter()
                .map(|(k, i)| format!("{k} {i:.2}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let (lean, w) = self.weights.dominant();
        format!(
            "{} (mood {:.2}, arousal {:.2}; {}; leaning toward {} {:.2})",
            self.label, self.mood, self.arousal, active, lean, w
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EmotionKind,
    pub intensity: f64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub reinforced: bool,
}

// ============================================================================
// EmotionalSystem
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct EmotionRecord {
    emotions: Vec<Emotion>,
    history: VecDeque<EmotionEvent>,
    mood: f64,
    arousal: f64,
    saved_at: Option<DateTime<Utc>>,
}

impl Default for EmotionRecord {
    fn default() -> Self {
        Self {
            emotions: Vec::new(),
            history: VecDeque::new(),
            mood: 0.5,
            arousal: 0.5,
            saved_at: None,
        }
    }
}

/// The set of live emotions and everything derived from them.
///
/// Mood and arousal are recomputed from current (decayed) intensities on
/// every read; the stored copies only serve people inspecting the record.
pub struct EmotionalSystem {
    record: EmotionRecord,
    store: Arc<dyn DurableStore>,
}

impl EmotionalSystem {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: EmotionRecord::default(),
            store,
        }
    }

    pub fn trigger(&mut self, kind: EmotionKind, intensity: f64, source: &str) -> f64 {
        self.trigger_at(kind, intensity, source, Utc::now())
    }

    /// Create or reinforce an emotion. Returns its resulting intensity.
    pub fn trigger_at(&mut self, kind: EmotionKind, intensity: f64, source: &str, now: DateTime<Utc>) -> f64 {
        let intensity = intensity.clamp(0.0, 1.0);
        let (resulting, reinforced) = match self
            .record
            .emotions
            .iter_mut()
            .find(|e| e.kind == kind && e.is_active(now))
        {
            Some(existing) => {
                existing.reinforce(intensity);
                (existing.intensity, true)
            }
            None => {
                self.record
                    .emotions
                    .push(Emotion::new(kind, intensity, source, now));
                (intensity, false)
            }
        };

        tracing::debug!(
            "Emotion {} {} -> {:.2} ({})",
            kind,
            if reinforced { "reinforced" } else { "triggered" },
            resulting,
            source
        );

        self.record.history.push_back(EmotionEvent {
            timestamp: now,
            kind,
            intensity,
            source: source.to_string(),
            reinforced,
        });
        while self.record.history.len() > HISTORY_LIMIT {
            self.record.history.pop_front();
        }

        self.refresh_scalars(now);
        self.save();
        resulting
    }

    pub fn trigger_curiosity(&mut self, topic: &str) -> f64 {
        self.trigger(EmotionKind::Curious, 0.6, &format!("Curious about: {topic}"))
    }

    pub fn trigger_fear(&mut self, risk: &str) -> f64 {
        self.trigger(EmotionKind::Fearful, 0.7, &format!("Concerned about: {risk}"))
    }

    pub fn trigger_satisfaction(&mut self, accomplishment: &str) -> f64 {
        self.trigger(EmotionKind::Satisfied, 0.7, &format!("Satisfied by: {accomplishment}"))
    }

    pub fn trigger_frustration(&mut self, obstacle: &str) -> f64 {
        self.trigger(EmotionKind::Frustrated, 0.6, &format!("Frustrated by: {obstacle}"))
    }

    pub fn trigger_confusion(&mut self, issue: &str) -> f64 {
        self.trigger(EmotionKind::Confused, 0.5, &format!("Confused about: {issue}"))
    }

    /// Drop expired emotions. Returns how many were removed.
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.record.emotions.len();
        self.record.emotions.retain(|e| e.is_active(now));
        let removed = before - self.record.emotions.len();
        if removed > 0 {
            tracing::debug!("Purged {} expired emotion(s)", removed);
            self.refresh_scalars(now);
            self.save();
        }
        removed
    }

    pub fn emotions(&self) -> &[Emotion] {
        &self.record.emotions
    }

    pub fn history(&self) -> &VecDeque<EmotionEvent> {
        &self.record.history
    }

    pub fn active(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Emotion> {
        self.record.emotions.iter().filter(move |e| e.is_active(now))
    }

    pub fn intensity_of(&self, kind: EmotionKind, now: DateTime<Utc>) -> f64 {
        self.active(now)
            .filter(|e| e.kind == kind)
            .map(|e| e.intensity_at(now))
            .sum::<f64>()
            .min(1.0)
    }

    pub fn decision_weights(&self, now: DateTime<Utc>) -> DecisionWeights {
        let mut weights = DecisionWeights {
            exploration: 0.5,
            safety: 0.5,
            speed: 0.5,
            patience: 0.5,
        };
        for emotion in self.active(now) {
            weights.apply(&emotion.modifier_at(now));
        }
        weights.normalized()
    }

    /// `(mood, arousal)` from the current intensities of active emotions.
    pub fn scalars(&self, now: DateTime<Utc>) -> (f64, f64) {
        let mut positive = 0.0;
        let mut negative = 0.0;
        let mut arousal_sum = 0.0;
        for emotion in self.active(now) {
            let i = emotion.intensity_at(now);
            if emotion.kind.is_positive() {
                positive += i;
            } else if emotion.kind.is_negative() {
                negative += i;
            }
            if emotion.kind.is_arousing() {
                arousal_sum += i;
            }
        }

        let mood = ((positive - negative) / 2.0 + 0.5).clamp(0.0, 1.0);
        let arousal = if positive + negative > 0.0 {
            (arousal_sum / 3.0).clamp(0.0, 1.0)
        } else {
            0.5
        };
        (mood, arousal)
    }

    pub fn label(&self, now: DateTime<Utc>) -> MoodLabel {
        let (mood, arousal) = self.scalars(now);
        MoodLabel::from_scalars(mood, arousal)
    }

    pub fn strongest(&self, now: DateTime<Utc>) -> Option<(EmotionKind, f64)> {
        self.active(now)
            .map(|e| (e.kind, e.intensity_at(now)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn recommended_action(&self, now: DateTime<Utc>) -> &'static str {
        match self.strongest(now) {
            Some((kind, _)) => kind.recommended_action(),
            None => "Continue normally",
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> EmotionalSnapshot {
        let (mood, arousal) = self.scalars(now);
        let mut active: Vec<(EmotionKind, f64)> = self
            .active(now)
            .map(|e| (e.kind, e.intensity_at(now)))
            .collect();
        active.sort_by(|a, b| b.1.total_cmp(&a.1));
        EmotionalSnapshot {
            mood,
            arousal,
            label: MoodLabel::from_scalars(mood, arousal),
            active,
            weights: self.decision_weights(now),
        }
    }

    fn refresh_scalars(&mut self, now: DateTime<Utc>) {
        let (mood, arousal) = self.scalars(now);
        self.record.mood = mood;
        self.record.arousal = arousal;
        self.record.saved_at = Some(now);
    }
}

impl Persistent for EmotionalSystem {
    fn load(&mut self) -> bool {
        match load_record::<EmotionRecord>(self.store.as_ref(), EMOTIONS_KEY) {
            Some(mut record) => {
                let now = Utc::now();
                record.emotions.retain(|e| e.is_active(now));
                tracing::info!(
                    "Restored {} live emotion(s), {} history entries",
                    record.emotions.len(),
                    record.history.len()
                );
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), EMOTIONS_KEY, &self.record);
    }
}
