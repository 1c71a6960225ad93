use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_DURATION_SECS: f64 = 300.0;

/// Fraction of a new trigger's intensity added to an already active emotion.
pub const REINFORCEMENT_RATE: f64 = 0.3;

/// Modifier value that leaves a decision weight unchanged relative to the others.
const NEUTRAL_MODIFIER: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionKind {
    Neutral,
    Curious,
    Fearful,
    Satisfied,
    Frustrated,
    Confused,
    Determined,
}

impl EmotionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionKind::Neutral => "neutral",
            EmotionKind::Curious => "curious",
            EmotionKind::Fearful => "fearful",
            EmotionKind::Satisfied => "satisfied",
            EmotionKind::Frustrated => "frustrated",
            EmotionKind::Confused => "confused",
            EmotionKind::Determined => "determined",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, EmotionKind::Curious | EmotionKind::Satisfied)
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, EmotionKind::Frustrated | EmotionKind::Fearful)
    }

    pub fn is_arousing(&self) -> bool {
        matches!(
            self,
            EmotionKind::Frustrated | EmotionKind::Curious | EmotionKind::Fearful
        )
    }

    pub fn recommended_action(&self) -> &'static str {
        match self {
            EmotionKind::Curious => "Explore and ask questions about the topic",
            EmotionKind::Fearful => "Verify assumptions and check for risks before proceeding",
            EmotionKind::Satisfied => "Take time to reflect on accomplishment",
            EmotionKind::Frustrated => "Try a different approach or ask for help",
            EmotionKind::Confused => "Ask for clarification and slow down",
            EmotionKind::Neutral | EmotionKind::Determined => "Proceed with caution",
        }
    }
}

impl fmt::Display for EmotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-emotion multipliers on the four decision weights.
///
/// `0.5` is neutral; anything above pulls that weight up relative to the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionModifier {
    pub exploration: f64,
    pub safety: f64,
    pub speed: f64,
    pub patience: f64,
}

impl Default for DecisionModifier {
    fn default() -> Self {
        Self {
            exploration: NEUTRAL_MODIFIER,
            safety: NEUTRAL_MODIFIER,
            speed: NEUTRAL_MODIFIER,
            patience: NEUTRAL_MODIFIER,
        }
    }
}

impl DecisionModifier {
    pub fn for_emotion(kind: EmotionKind, intensity: f64) -> Self {
        let i = intensity.clamp(0.0, 1.0);
        let base = Self::default();
        match kind {
            EmotionKind::Curious => Self {
                exploration: 1.0 + i,
                patience: 1.0 + 0.5 * i,
                ..base
            },
            EmotionKind::Fearful => Self {
                safety: 1.0 + 2.0 * i,
                speed: 0.5 + 1.5 * i,
                exploration: 0.5 - 0.3 * i,
                ..base
            },
            EmotionKind::Satisfied => Self {
                patience: 1.0 + i,
                speed: 0.5 - 0.3 * i,
                ..base
            },
            EmotionKind::Frustrated => Self {
                speed: 1.0 + 1.5 * i,
                patience: 0.5 - 0.5 * i,
                ..base
            },
            EmotionKind::Confused => Self {
                speed: 0.3,
                patience: 2.0,
                safety: 1.5,
                ..base
            },
            EmotionKind::Neutral | EmotionKind::Determined => base,
        }
    }
}

/// One tagged, linearly decaying emotional signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    pub kind: EmotionKind,
    /// Intensity at `triggered_at`.
    pub intensity: f64,
    pub triggered_at: DateTime<Utc>,
    pub duration_secs: f64,
    #[serde(default)]
    pub source: String,
}

impl Emotion {
    pub fn new(kind: EmotionKind, intensity: f64, source: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            intensity: intensity.clamp(0.0, 1.0),
            triggered_at: now,
            duration_secs: DEFAULT_DURATION_SECS,
            source: source.into(),
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs.max(0.0);
        self
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.triggered_at).num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.age_secs(now) < self.duration_secs
    }

    /// Current intensity: full at trigger time, zero once the lifetime is over.
    pub fn intensity_at(&self, now: DateTime<Utc>) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        let remaining = (1.0 - self.age_secs(now) / self.duration_secs).max(0.0);
        self.intensity * remaining
    }

    /// Add a fraction of `added` to the base intensity. The lifetime is fixed
    /// at trigger time and does not restart.
    pub fn reinforce(&mut self, added: f64) {
        self.intensity = (self.intensity + REINFORCEMENT_RATE * added.clamp(0.0, 1.0)).min(1.0);
    }

    pub fn modifier_at(&self, now: DateTime<Utc>) -> DecisionModifier {
        DecisionModifier::for_emotion(self.kind, self.intensity_at(now))
    }
}
