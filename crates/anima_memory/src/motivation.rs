//! Intrinsic drives and the goals they propose.
//!
//! A drive is born from a detected condition (an open knowledge gap, poor
//! prediction accuracy, a fact that contradicts what was known) and grows
//! stronger the longer it goes unsatisfied. The strongest active drive can
//! be turned into a goal suggestion for the arbiter.

use anima_core::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MOTIVATION_KEY: &str = "motivation";

/// Drives at or below this strength are dormant.
const ACTIVE_STRENGTH: f64 = 0.3;
const INITIAL_STRENGTH: f64 = 0.5;
const SATISFY_STEP: f64 = 0.5;
const DECAY_STEP: f64 = 0.05;
const DRIVE_LIMIT: usize = 30;
const GOAL_HISTORY: usize = 20;

/// Prediction accuracy above which competence is not in question.
const ACCURATE_ENOUGH: f64 = 0.7;
const ANOMALY_STRENGTH: f64 = 0.7;
const TRIGGER_PREVIEW: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveKind {
    Curiosity,
    Competence,
    Autonomy,
}

impl DriveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveKind::Curiosity => "curiosity",
            DriveKind::Competence => "competence",
            DriveKind::Autonomy => "autonomy",
        }
    }

    /// Goal label the arbiter is nudged towards.
    pub fn goal_label(&self) -> &'static str {
        match self {
            DriveKind::Curiosity => "SATISFY_CURIOSITY",
            DriveKind::Competence => "IMPROVE_PREDICTIONS",
            DriveKind::Autonomy => "INVESTIGATE_ANOMALY",
        }
    }

    pub fn proposed_action(&self) -> &'static str {
        match self {
            DriveKind::Curiosity => "Ask questions about the gap",
            DriveKind::Competence => "Practice and improve prediction",
            DriveKind::Autonomy => "Investigate the anomaly",
        }
    }

    /// The drive a goal label answers to, if any.
    pub fn from_goal_label(label: &str) -> Option<Self> {
        [DriveKind::Curiosity, DriveKind::Competence, DriveKind::Autonomy]
            .into_iter()
            .find(|k| k.goal_label() == label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drive {
    pub kind: DriveKind,
    pub trigger: String,
    pub strength: f64,
    pub last_activated: DateTime<Utc>,
    #[serde(default)]
    pub times_activated: u32,
    /// 0 = starving, 1 = fully satisfied.
    #[serde(default)]
    pub satisfaction: f64,
}

impl Drive {
    fn new(kind: DriveKind, trigger: &str, strength: f64, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            trigger: trigger.to_string(),
            strength: strength.clamp(0.0, 1.0),
            last_activated: now,
            times_activated: 0,
            satisfaction: 0.0,
        }
    }

    fn activate(&mut self, strength: f64, now: DateTime<Utc>) {
        self.strength = strength.clamp(0.0, 1.0);
        self.times_activated += 1;
        self.last_activated = now;
    }

    pub fn satisfy(&mut self, amount: f64) {
        self.satisfaction = (self.satisfaction + amount).min(1.0);
    }

    /// Satisfaction wears off; strength follows what is left unmet.
    pub fn decay(&mut self) {
        self.satisfaction = (self.satisfaction - DECAY_STEP).max(0.0);
        self.strength = ACTIVE_STRENGTH + (1.0 - ACTIVE_STRENGTH) * (1.0 - self.satisfaction);
    }

    pub fn is_active(&self) -> bool {
        self.strength > ACTIVE_STRENGTH
    }
}

/// A goal suggestion backed by the strongest drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveGoal {
    pub drive: DriveKind,
    pub motivation: String,
    pub strength: f64,
    pub proposed_action: String,
    pub generated_at: DateTime<Utc>,
}

impl DriveGoal {
    pub fn label(&self) -> &'static str {
        self.drive.goal_label()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotivationState {
    pub total_drives: usize,
    pub active_drives: usize,
    pub strongest: Option<DriveKind>,
    pub generated_goals: usize,
    pub last_goal: Option<DriveGoal>,
}

fn preview(text: &str) -> String {
    text.chars().take(TRIGGER_PREVIEW).collect()
}

// ============================================================================
// Motivation
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct MotivationRecord {
    /// "<kind>:<trigger>" -> drive
    drives: BTreeMap<String, Drive>,
    generated_goals: Vec<DriveGoal>,
}

pub struct Motivation {
    record: MotivationRecord,
    store: Arc<dyn DurableStore>,
}

impl Motivation {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: MotivationRecord::default(),
            store,
        }
    }

    /// Activate (creating if needed) the drive for `trigger`, evicting the
    /// stalest drive when full. Returns its key.
    fn arouse(
        &mut self,
        kind: DriveKind,
        trigger: &str,
        strength: f64,
        now: DateTime<Utc>,
    ) -> String {
        let key = format!("{}:{}", kind.as_str(), trigger);
        if !self.record.drives.contains_key(&key) && self.record.drives.len() >= DRIVE_LIMIT {
            let stalest = self
                .record
                .drives
                .iter()
                .min_by_key(|(_, d)| d.last_activated)
                .map(|(k, _)| k.clone());
            if let Some(k) = stalest {
                self.record.drives.remove(&k);
            }
        }
        let drive = self
            .record
            .drives
            .entry(key.clone())
            .or_insert_with(|| Drive::new(kind, trigger, INITIAL_STRENGTH, now));
        drive.activate(strength, now);
        tracing::debug!("Drive {} aroused ({:.2}): {}", kind.as_str(), drive.strength, trigger);
        self.save();
        key
    }

    /// Curiosity about the first open gap, scaled by how much is unknown.
    pub fn detect_curiosity_gap(
        &mut self,
        gaps: &[&str],
        uncertainties: usize,
        now: DateTime<Utc>,
    ) -> Option<&Drive> {
        let first = gaps.first()?;
        let strength = (gaps.len() as f64 * 0.2 + uncertainties as f64 * 0.15).min(1.0);
        let trigger = format!("Gap: {}", preview(first));
        let key = self.arouse(DriveKind::Curiosity, &trigger, strength, now);
        self.record.drives.get(&key)
    }

    /// Competence suffers when verified predictions keep missing.
    pub fn detect_prediction_failure(
        &mut self,
        verified: usize,
        accuracy: f64,
        now: DateTime<Utc>,
    ) -> Option<&Drive> {
        if verified == 0 || accuracy > ACCURATE_ENOUGH {
            return None;
        }
        let strength = (1.0 - accuracy) * 0.8;
        let key = self.arouse(DriveKind::Competence, "Improve predictions", strength, now);
        self.record.drives.get(&key)
    }

    /// A fact that contradicts what was known wants investigating.
    pub fn detect_anomaly(
        &mut self,
        fact: &str,
        contradicts_known: bool,
        now: DateTime<Utc>,
    ) -> Option<&Drive> {
        if !contradicts_known {
            return None;
        }
        let trigger = format!("Understand: {}", preview(fact));
        let key = self.arouse(DriveKind::Autonomy, &trigger, ANOMALY_STRENGTH, now);
        self.record.drives.get(&key)
    }

    /// Goal from the strongest active drive; `None` when every drive is dormant.
    pub fn generate_goal_at(&mut self, now: DateTime<Utc>) -> Option<DriveGoal> {
        let strongest = self
            .record
            .drives
            .values()
            .filter(|d| d.is_active())
            .max_by(|a, b| a.strength.total_cmp(&b.strength))?;
        let goal = DriveGoal {
            drive: strongest.kind,
            motivation: strongest.trigger.clone(),
            strength: strongest.strength,
            proposed_action: strongest.kind.proposed_action().to_string(),
            generated_at: now,
        };
        self.record.generated_goals.push(goal.clone());
        let excess = self
            .record
            .generated_goals
            .len()
            .saturating_sub(GOAL_HISTORY);
        self.record.generated_goals.drain(..excess);
        self.save();
        Some(goal)
    }

    /// Satisfy every drive of `kind`. Returns how many were touched.
    pub fn satisfy(&mut self, kind: DriveKind) -> usize {
        let mut touched = 0;
        for drive in self.record.drives.values_mut().filter(|d| d.kind == kind) {
            drive.satisfy(SATISFY_STEP);
            touched += 1;
        }
        if touched > 0 {
            self.save();
        }
        touched
    }

    /// One decay step for every drive.
    pub fn update_drives(&mut self) {
        if self.record.drives.is_empty() {
            return;
        }
        for drive in self.record.drives.values_mut() {
            drive.decay();
        }
        self.save();
    }

    pub fn drives(&self) -> impl Iterator<Item = &Drive> {
        self.record.drives.values()
    }

    pub fn generated_goals(&self) -> &[DriveGoal] {
        &self.record.generated_goals
    }

    pub fn state(&self) -> MotivationState {
        MotivationState {
            total_drives: self.record.drives.len(),
            active_drives: self.record.drives.values().filter(|d| d.is_active()).count(),
            strongest: self
                .record
                .drives
                .values()
                .max_by(|a, b| a.strength.total_cmp(&b.strength))
                .map(|d| d.kind),
            generated_goals: self.record.generated_goals.len(),
            last_goal: self.record.generated_goals.last().cloned(),
        }
    }
}

impl Persistent for Motivation {
    fn load(&mut self) -> bool {
        match load_record::<MotivationRecord>(self.store.as_ref(), MOTIVATION_KEY) {
            Some(record) => {
                tracing::info!(
                    "Restored motivation: {} drives, {} generated goals",
                    record.drives.len(),
                    record.generated_goals.len()
                );
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), MOTIVATION_KEY, &self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anima_core::MemoryStore;

    fn motivation() -> (Motivation, MemoryStore) {
        let store = MemoryStore::new();
        (Motivation::new(Arc::new(store.clone())), store)
    }

    #[test]
    fn test_curiosity_scales_with_gaps() {
        let (mut m, _) = motivation();
        let now = Utc::now();
        assert!(m.detect_curiosity_gap(&[], 3, now).is_none());

        let d = m
            .detect_curiosity_gap(&["where I work", "my cat"], 1, now)
            .unwrap();
        assert_eq!(d.kind, DriveKind::Curiosity);
        assert_eq!(d.trigger, "Gap: where I work");
        assert!((d.strength - 0.55).abs() < 1e-9);
        assert_eq!(d.times_activated, 1);

        let d = m
            .detect_curiosity_gap(&["where I work", "a", "b", "c", "d", "e"], 2, now)
            .unwrap();
        assert_eq!(d.strength, 1.0);
        assert_eq!(d.times_activated, 2);
        assert_eq!(m.state().total_drives, 1);
    }

    #[test]
    fn test_prediction_failure_needs_evidence_and_misses() {
        let (mut m, _) = motivation();
        let now = Utc::now();
        assert!(m.detect_prediction_failure(0, 0.0, now).is_none());
        assert!(m.detect_prediction_failure(4, 0.75, now).is_none());
        let d = m.detect_prediction_failure(4, 0.25, now).unwrap();
        assert_eq!(d.kind, DriveKind::Competence);
        assert!((d.strength - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_anomaly_only_on_contradiction() {
        let (mut m, _) = motivation();
        let now = Utc::now();
        assert!(m.detect_anomaly("User hates tea", false, now).is_none());
        let d = m
            .detect_anomaly("User hates tea, which is news to me after all", true, now)
            .unwrap();
        assert_eq!(d.trigger, "Understand: User hates tea, which is news ");
        assert_eq!(d.strength, 0.7);
    }

    #[test]
    fn test_goal_follows_strongest_drive() {
        let (mut m, _) = motivation();
        let now = Utc::now();
        assert!(m.generate_goal_at(now).is_none());

        m.detect_curiosity_gap(&["my cat"], 0, now);
        assert!(m.generate_goal_at(now).is_none(), "0.2 is dormant");

        m.detect_anomaly("User hates tea", true, now);
        let goal = m.generate_goal_at(now).unwrap();
        assert_eq!(goal.drive, DriveKind::Autonomy);
        assert_eq!(goal.label(), "INVESTIGATE_ANOMALY");
        assert_eq!(goal.proposed_action, "Investigate the anomaly");
        assert_eq!(m.state().generated_goals, 1);
        assert_eq!(m.state().last_goal, Some(goal));
        assert_eq!(
            DriveKind::from_goal_label("INVESTIGATE_ANOMALY"),
            Some(DriveKind::Autonomy)
        );
        assert_eq!(DriveKind::from_goal_label("REST"), None);
    }

    #[test]
    fn test_decay_and_satisfaction() {
        let (mut m, _) = motivation();
        let now = Utc::now();
        m.detect_anomaly("User hates tea", true, now);

        // Unmet drives climb to full strength.
        m.update_drives();
        assert!((m.drives().next().unwrap().strength - 1.0).abs() < 1e-9);

        assert_eq!(m.satisfy(DriveKind::Autonomy), 1);
        assert_eq!(m.satisfy(DriveKind::Curiosity), 0);
        m.update_drives();
        let d = m.drives().next().unwrap();
        assert!((d.satisfaction - 0.45).abs() < 1e-9);
        assert!((d.strength - (0.3 + 0.7 * 0.55)).abs() < 1e-9);
    }

    #[test]
    fn test_drive_count_is_bounded() {
        let (mut m, _) = motivation();
        let start = Utc::now();
        for n in 0..(DRIVE_LIMIT + 5) {
            let at = start + chrono::Duration::seconds(n as i64);
            m.detect_anomaly(&format!("fact {n}"), true, at);
        }
        assert_eq!(m.state().total_drives, DRIVE_LIMIT);
        assert!(m.drives().all(|d| d.trigger != "Understand: fact 0"));
    }

    #[test]
    fn test_goal_history_is_bounded_and_persists() {
        let (mut m, store) = motivation();
        let now = Utc::now();
        m.detect_anomaly("User hates tea", true, now);
        for _ in 0..(GOAL_HISTORY + 3) {
            m.generate_goal_at(now);
        }
        assert_eq!(m.generated_goals().len(), GOAL_HISTORY);

        let mut restored = Motivation::new(Arc::new(store));
        assert!(restored.load());
        assert_eq!(restored.state(), m.state());
    }
}
