//! Episodic log: one closed record per interaction cycle.
//!
//! An episode is assembled through an [`EpisodeDraft`] while the interaction
//! is in flight and becomes an immutable [`Episode`] once closed. The log only
//! ever appends.

use anima_core::similarity::content_tokens;
use anima_core::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub const EPISODES_KEY: &str = "episodes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub reply: String,
    #[serde(default)]
    pub reflection: String,
    #[serde(default)]
    pub facts_learned: Vec<String>,
    #[serde(default)]
    pub goals_active: Vec<String>,
    pub vitality_before: f64,
    pub vitality_after: f64,
    pub mood_before: f64,
    pub mood_after: f64,
    #[serde(default)]
    pub state_desc: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub success: bool,
}

/// An episode still being filled in.
#[derive(Debug)]
pub struct EpisodeDraft {
    episode: Episode,
    started: Instant,
}

impl EpisodeDraft {
    pub fn open(user_input: &str, vitality: f64, mood: f64, goals_active: Vec<String>, state_desc: &str) -> Self {
        Self {
            episode: Episode {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                user_input: user_input.to_string(),
                reply: String::new(),
                reflection: String::new(),
                facts_learned: Vec::new(),
                goals_active,
                vitality_before: vitality,
                vitality_after: vitality,
                mood_before: mood,
                mood_after: mood,
                state_desc: state_desc.to_string(),
                duration_ms: 0,
                success: false,
            },
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.episode.id
    }

    pub fn set_reply(&mut self, reply: impl Into<String>) {
        self.episode.reply = reply.into();
    }

    pub fn set_reflection(&mut self, reflection: impl Into<String>) {
        self.episode.reflection = reflection.into();
    }

    pub fn learned(&mut self, fact: impl Into<String>) {
        self.episode.facts_learned.push(fact.into());
    }

    /// Seal the episode with the post-interaction state.
    pub fn close(mut self, vitality: f64, mood: f64, success: bool) -> Episode {
        self.episode.vitality_after = vitality;
        self.episode.mood_after = mood;
        self.episode.success = success;
        self.episode.duration_ms = self.started.elapsed().as_millis() as u64;
        self.episode
    }
}

/// A pair of facts from different episodes that point opposite ways.
#[derive(Debug, Clone, PartialEq)]
pub struct Contradiction {
    pub earlier_at: DateTime<Utc>,
    pub earlier: String,
    pub later_at: DateTime<Utc>,
    pub later: String,
}

// ============================================================================
// Episodic Log
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct EpisodeRecord {
    episodes: Vec<Episode>,
}

pub struct EpisodicLog {
    record: EpisodeRecord,
    store: Arc<dyn DurableStore>,
}

impl EpisodicLog {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: EpisodeRecord::default(),
            store,
        }
    }

    pub fn append(&mut self, episode: Episode) {
        tracing::debug!(
            "Episode {} closed (success={}, {} fact(s))",
            episode.id,
            episode.success,
            episode.facts_learned.len()
        );
        self.record.episodes.push(episode);
        self.save();
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.record.episodes
    }

    pub fn len(&self) -> usize {
        self.record.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.episodes.is_empty()
    }

    pub fn recent(&self, n: usize) -> &[Episode] {
        let start = self.record.episodes.len().saturating_sub(n);
        &self.record.episodes[start..]
    }

    /// Episodes with `start <= timestamp <= end`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Episode> {
        self.record
            .episodes
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect()
    }

    pub fn facts_timeline(&self) -> Vec<(DateTime<Utc>, &str)> {
        let mut timeline: Vec<_> = self
            .record
            .episodes
            .iter()
            .flat_map(|e| e.facts_learned.iter().map(move |f| (e.timestamp, f.as_str())))
            .collect();
        timeline.sort();
        timeline
    }

    pub fn goals_timeline(&self) -> Vec<(DateTime<Utc>, &str)> {
        let mut timeline: Vec<_> = self
            .record
            .episodes
            .iter()
            .flat_map(|e| e.goals_active.iter().map(move |g| (e.timestamp, g.as_str())))
            .collect();
        timeline.sort();
        timeline
    }

    /// `(timestamp, vitality_before, vitality_after)` per episode.
    pub fn vitality_trajectory(&self) -> Vec<(DateTime<Utc>, f64, f64)> {
        self.record
            .episodes
            .iter()
            .map(|e| (e.timestamp, e.vitality_before, e.vitality_after))
            .collect()
    }

    pub fn success_rate(&self) -> f64 {
        if self.record.episodes.is_empty() {
            return 0.0;
        }
        let ok = self.record.episodes.iter().filter(|e| e.success).count();
        ok as f64 / self.record.episodes.len() as f64
    }

    /// Likes in one episode against hates in a later one (or the reverse)
    /// about the same subject.
    pub fn contradictions(&self) -> Vec<Contradiction> {
        let mut found = Vec::new();
        for (i, first) in self.record.episodes.iter().enumerate() {
            for second in &self.record.episodes[i + 1..] {
                for a in &first.facts_learned {
                    for b in &second.facts_learned {
                        if facts_contradict(a, b) {
                            found.push(Contradiction {
                                earlier_at: first.timestamp,
                                earlier: a.clone(),
                                later_at: second.timestamp,
                                later: b.clone(),
                            });
                        }
                    }
                }
            }
        }
        found
    }
}

/// Two statements take opposite like/hate stances on a shared topic.
pub fn facts_contradict(a: &str, b: &str) -> bool {
    let ta = content_tokens(a);
    let tb = content_tokens(b);
    let stance = |t: &[String]| {
        (
            t.iter().any(|w| w == "like"),
            t.iter().any(|w| w == "hate"),
        )
    };
    let (a_likes, a_hates) = stance(&ta);
    let (b_likes, b_hates) = stance(&tb);
    if !((a_likes && b_hates) || (a_hates && b_likes)) {
        return false;
    }

    let topic = |t: &[String]| -> Vec<String> {
        t.iter()
            .filter(|w| *w != "like" && *w != "hate" && *w != "not" && *w != "don")
            .cloned()
            .collect()
    };
    let topic_a = topic(&ta);
    let topic_b = topic(&tb);
    !topic_a.is_empty() && topic_a.iter().any(|w| topic_b.contains(w))
}

impl Persistent for EpisodicLog {
    fn load(&mut self) -> bool {
        match load_record::<EpisodeRecord>(self.store.as_ref(), EPISODES_KEY) {
            Some(record) => {
                tracing::info!("Restored {} episode(s)", record.episodes.len());
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), EPISODES_KEY, &self.record);
    }
}
