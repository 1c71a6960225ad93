//! World model: entities, causal rules and predictions.
//!
//! Rules carry a frequency estimate (`observed / (observed + violated)`) that
//! moves as consequences are recorded. Predictions are produced elsewhere and
//! parked here until the next observation confirms or refutes them. A
//! confirmed prediction becomes a rule conditioned on the cue that prompted it.

use anima_core::similarity::{content_tokens, overlap_ratio};
use anima_core::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub const WORLD_MODEL_KEY: &str = "world_model";

pub const PREDICTION_RETENTION: usize = 20;
pub const CONSEQUENCE_RETENTION: usize = 50;

/// Token overlap at which an observation counts as the predicted outcome.
const PREDICTION_MATCH: f64 = 0.4;

const CONFIDENCE_STEP: f64 = 0.1;
const HIGH_CONFIDENCE: f64 = 0.7;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// relation -> targets
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<String>>,
    pub last_updated: DateTime<Utc>,
}

impl Entity {
    fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            properties: BTreeMap::new(),
            relations: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalRule {
    pub condition: String,
    pub consequence: String,
    pub probability: f64,
    pub times_observed: u32,
    pub times_violated: u32,
}

impl CausalRule {
    pub fn new(condition: &str, consequence: &str, prior: f64) -> Self {
        Self {
            condition: condition.to_string(),
            consequence: consequence.to_string(),
            probability: prior.clamp(0.0, 1.0),
            times_observed: 1,
            times_violated: 0,
        }
    }

    pub fn update(&mut self, held: bool) {
        if held {
            self.times_observed += 1;
        } else {
            self.times_violated += 1;
        }
        let total = self.times_observed + self.times_violated;
        if total > 0 {
            self.probability = f64::from(self.times_observed) / f64::from(total);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Confirmed,
    Refuted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub text: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub recommended_action: String,
    pub made_at: DateTime<Utc>,
    /// What was said when the prediction was made.
    #[serde(default)]
    pub cue: String,
    #[serde(default)]
    pub outcome: Option<Outcome>,
}

impl Prediction {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: String::new(),
            recommended_action: String::new(),
            made_at: Utc::now(),
            cue: String::new(),
            outcome: None,
        }
    }

    pub fn with_cue(mut self, cue: impl Into<String>) -> Self {
        self.cue = cue.into();
        self
    }

    pub fn verify(&mut self, was_true: bool) {
        if was_true {
            self.outcome = Some(Outcome::Confirmed);
            self.confidence = (self.confidence + CONFIDENCE_STEP).min(1.0);
        } else {
            self.outcome = Some(Outcome::Refuted);
            self.confidence = (self.confidence - CONFIDENCE_STEP).max(0.0);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consequence {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub outcome: String,
    #[serde(default)]
    pub was_predicted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    DoIt,
    AvoidIt,
    #[default]
    Uncertain,
}

impl Recommendation {
    pub fn parse_str(s: &str) -> Self {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "do_it" | "do" | "yes" => Recommendation::DoIt,
            "avoid_it" | "avoid" | "no" => Recommendation::AvoidIt,
            _ => Recommendation::Uncertain,
        }
    }
}

/// Imagined consequences of a contemplated action.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Simulation {
    pub immediate: String,
    pub cascade: String,
    pub long_term: String,
    pub risks: Vec<String>,
    pub benefits: Vec<String>,
    pub recommendation: Recommendation,
    pub confidence: f64,
}

impl Simulation {
    /// What to assume when nothing usable came back.
    pub fn uncertain() -> Self {
        Self {
            confidence: 0.0,
            ..Default::default()
        }
    }
}

/// A pending prediction settled against an observation.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPrediction {
    pub prediction: Prediction,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldSummary {
    pub entities_known: usize,
    pub causal_rules: usize,
    pub active_predictions: usize,
    pub proven_consequences: usize,
    pub high_confidence_rules: usize,
    pub prediction_accuracy: f64,
}

// ============================================================================
// WorldModel
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct WorldRecord {
    entities: BTreeMap<String, Entity>,
    causal_rules: Vec<CausalRule>,
    predictions: Vec<Prediction>,
    consequences: Vec<Consequence>,
}

pub struct WorldModel {
    record: WorldRecord,
    store: Arc<dyn DurableStore>,
}

impl WorldModel {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: WorldRecord::default(),
            store,
        }
    }

    fn entity_mut(&mut self, name: &str, kind: &str) -> &mut Entity {
        self.record
            .entities
            .entry(name.to_string())
            .or_insert_with(|| Entity::new(name, kind))
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.record.entities.get(name)
    }

    pub fn observe_state(&mut self, entity: &str, key: &str, value: impl Into<Value>) {
        let e = self.entity_mut(entity, "object");
        e.properties.insert(key.to_string(), value.into());
        e.last_updated = Utc::now();
        self.save();
    }

    /// Track `from --relation--> to`.
    pub fn establish_relation(&mut self, from: &str, relation: &str, to: &str) {
        self.entity_mut(to, "entity");
        let e = self.entity_mut(from, "entity");
        let targets = e.relations.entry(relation.to_string()).or_default();
        if !targets.iter().any(|t| t == to) {
            targets.push(to.to_string());
            e.last_updated = Utc::now();
        }
        self.save();
    }

    /// Learn "if `condition`, then `consequence`"; a known rule is reinforced instead.
    pub fn learn_causal_rule(&mut self, condition: &str, consequence: &str, prior: f64) {
        self.reinforce_rule(condition, consequence, prior);
        self.save();
    }

    fn reinforce_rule(&mut self, condition: &str, consequence: &str, prior: f64) {
        match self
            .record
            .causal_rules
            .iter_mut()
            .find(|r| r.condition == condition && r.consequence == consequence)
        {
            Some(rule) => rule.update(true),
            None => {
                tracing::debug!("Learned causal rule: {} => {}", condition, consequence);
                self.record
                    .causal_rules
                    .push(CausalRule::new(condition, consequence, prior));
            }
        }
    }

    pub fn causal_rules(&self) -> &[CausalRule] {
        &self.record.causal_rules
    }

    /// Rules whose condition opens with words present in `situation`.
    pub fn relevant_rules(&self, situation: &str) -> Vec<&CausalRule> {
        let words = content_tokens(situation);
        self.record
            .causal_rules
            .iter()
            .filter(|r| {
                content_tokens(&r.condition)
                    .iter()
                    .take(2)
                    .any(|w| words.contains(w))
            })
            .collect()
    }

    /// Log that `action` led to `outcome` and move every rule conditioned on it.
    pub fn record_consequence(&mut self, action: &str, outcome: &str, was_predicted: bool) {
        self.log_consequence(action, outcome, was_predicted, Utc::now());
        self.update_rules_for(action, outcome);
        self.save();
    }

    fn log_consequence(
        &mut self,
        action: &str,
        outcome: &str,
        was_predicted: bool,
        now: DateTime<Utc>,
    ) {
        self.record.consequences.push(Consequence {
            timestamp: now,
            action: action.to_string(),
            outcome: outcome.to_string(),
            was_predicted,
        });
        let excess = self
            .record
            .consequences
            .len()
            .saturating_sub(CONSEQUENCE_RETENTION);
        self.record.consequences.drain(..excess);
    }

    fn update_rules_for(&mut self, action: &str, outcome: &str) {
        let action_l = action.to_lowercase();
        let outcome_l = outcome.to_lowercase();
        for rule in &mut self.record.causal_rules {
            if rule.condition.to_lowercase().contains(&action_l) {
                rule.update(rule.consequence.to_lowercase().contains(&outcome_l));
            }
        }
    }

    pub fn consequences(&self) -> &[Consequence] {
        &self.record.consequences
    }

    pub fn add_predictions(&mut self, predictions: Vec<Prediction>) {
        if predictions.is_empty() {
            return;
        }
        self.record.predictions.extend(predictions);
        let excess = self
            .record
            .predictions
            .len()
            .saturating_sub(PREDICTION_RETENTION);
        self.record.predictions.drain(..excess);
        self.save();
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.record.predictions
    }

    pub fn pending_predictions(&self) -> impl Iterator<Item = &Prediction> {
        self.record.predictions.iter().filter(|p| p.outcome.is_none())
    }

    /// Returns false if no prediction carries `id`.
    pub fn verify_prediction(&mut self, id: Uuid, was_true: bool) -> bool {
        let Some(p) = self.record.predictions.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        p.verify(was_true);
        self.save();
        true
    }

    /// Settle every pending prediction against what was just observed.
    ///
    /// A confirmed prediction teaches (or reinforces) the rule "if <cue>,
    /// then <prediction>". A refuted one counts against that same rule if it
    /// is already known. Both land in the consequence log.
    pub fn verify_against(
        &mut self,
        observed: &str,
        now: DateTime<Utc>,
    ) -> Vec<VerifiedPrediction> {
        let observed_tokens = content_tokens(observed);
        let mut settled = Vec::new();
        for p in self
            .record
            .predictions
            .iter_mut()
            .filter(|p| p.outcome.is_none())
        {
            let confirmed =
                overlap_ratio(&content_tokens(&p.text), &observed_tokens) >= PREDICTION_MATCH;
            p.verify(confirmed);
            settled.push(VerifiedPrediction {
                prediction: p.clone(),
                confirmed,
            });
        }
        if settled.is_empty() {
            return settled;
        }

        for v in &settled {
            let cue = v.prediction.cue.as_str();
            if cue.is_empty() {
                continue;
            }
            if v.confirmed {
                self.reinforce_rule(cue, &v.prediction.text, v.prediction.confidence);
            } else if let Some(rule) = self
                .record
                .causal_rules
                .iter_mut()
                .find(|r| r.condition == cue && r.consequence == v.prediction.text)
            {
                rule.update(false);
            }
            self.log_consequence(cue, observed, v.confirmed, now);
        }
        tracing::debug!(
            "Settled {} prediction(s), {} confirmed",
            settled.len(),
            settled.iter().filter(|v| v.confirmed).count()
        );
        self.save();
        settled
    }

    /// Predictions that have been confirmed or refuted.
    pub fn verified_count(&self) -> usize {
        self.record
            .predictions
            .iter()
            .filter(|p| p.outcome.is_some())
            .count()
    }

    pub fn prediction_accuracy(&self) -> f64 {
        let verified: Vec<_> = self
            .record
            .predictions
            .iter()
            .filter_map(|p| p.outcome)
            .collect();
        if verified.is_empty() {
            return 0.0;
        }
        let correct = verified.iter().filter(|o| **o == Outcome::Confirmed).count();
        correct as f64 / verified.len() as f64
    }

    pub fn summary(&self) -> WorldSummary {
        WorldSummary {
            entities_known: self.record.entities.len(),
            causal_rules: self.record.causal_rules.len(),
            active_predictions: self.pending_predictions().count(),
            proven_consequences: self.record.consequences.len(),
            high_confidence_rules: self
                .record
                .causal_rules
                .iter()
                .filter(|r| r.probability > HIGH_CONFIDENCE)
                .count(),
            prediction_accuracy: self.prediction_accuracy(),
        }
    }

    /// Rules formatted for a prompt, strongest first.
    pub fn describe_rules(&self, situation: &str, limit: usize) -> String {
        let mut rules = self.relevant_rules(situation);
        rules.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        if rules.is_empty() {
            return "No specific patterns learned".to_string();
        }
        rules
            .iter()
            .take(limit)
            .map(|r| {
                format!(
                    "- If {}, then {} ({:.0}% probability)",
                    r.condition,
                    r.consequence,
                    r.probability * 100.0
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Persistent for WorldModel {
    fn load(&mut self) -> bool {
        match load_record::<WorldRecord>(self.store.as_ref(), WORLD_MODEL_KEY) {
            Some(record) => {
                tracing::info!(
                    "Restored world model: {} entities, {} rules",
                    record.entities.len(),
                    record.causal_rules.len()
                );
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), WORLD_MODEL_KEY, &self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anima_core::MemoryStore;

    fn world() -> (WorldModel, MemoryStore) {
        let store = MemoryStore::new();
        (WorldModel::new(Arc::new(store.clone())), store)
    }

    #[test]
    fn test_rule_reinforcement_and_update() {
        let (mut w, _) = world();
        w.learn_causal_rule("user is tired", "replies get short", 0.7);
        assert_eq!(w.causal_rules().len(), 1);
        assert_eq!(w.causal_rules()[0].probability, 0.7);

        w.learn_causal_rule("user is tired", "replies get short", 0.7);
        assert_eq!(w.causal_rules().len(), 1);
        assert_eq!(w.causal_rules()[0].times_observed, 2);
        assert_eq!(w.causal_rules()[0].probability, 1.0);
    }

    #[test]
    fn test_record_consequence_moves_matching_rules() {
        let (mut w, _) = world();
        w.learn_causal_rule("I complain", "the user leaves", 0.7);
        w.record_consequence("complain", "the user laughs", false);
        let rule = &w.causal_rules()[0];
        assert_eq!(rule.times_violated, 1);
        assert!((rule.probability - 0.5).abs() < 1e-9);
        assert_eq!(w.consequences().len(), 1);
    }

    #[test]
    fn test_relations_are_deduplicated() {
        let (mut w, _) = world();
        w.establish_relation("user", "told", "User likes tea");
        w.establish_relation("user", "told", "User likes tea");
        let user = w.entity("user").unwrap();
        assert_eq!(user.relations["told"].len(), 1);
        assert!(w.entity("User likes tea").is_some());
    }

    #[test]
    fn test_observe_state() {
        let (mut w, _) = world();
        w.observe_state("self", "vitality", 42.0);
        assert_eq!(w.entity("self").unwrap().properties["vitality"], serde_json::json!(42.0));
    }

    #[test]
    fn test_prediction_verification_and_accuracy() {
        let (mut w, _) = world();
        let a = Prediction::new("user asks a follow-up", 0.5);
        let b = Prediction::new("user says goodbye", 0.95);
        let (ida, idb) = (a.id, b.id);
        w.add_predictions(vec![a, b]);
        assert_eq!(w.prediction_accuracy(), 0.0);

        assert!(w.verify_prediction(ida, true));
        assert!(w.verify_prediction(idb, false));
        assert!(!w.verify_prediction(Uuid::new_v4(), true));

        assert!((w.predictions()[0].confidence - 0.6).abs() < 1e-9);
        assert!((w.predictions()[1].confidence - 0.85).abs() < 1e-9);
        assert_eq!(w.prediction_accuracy(), 0.5);
        assert_eq!(w.summary().active_predictions, 0);
    }

    #[test]
    fn test_relevant_rules_and_description() {
        let (mut w, _) = world();
        w.learn_causal_rule("user tired", "short replies", 0.8);
        w.learn_causal_rule("weather rainy", "user stays home", 0.6);
        let hits = w.relevant_rules("the user seems tired tonight");
        assert_eq!(hits.len(), 1);
        assert!(w.describe_rules("tired again", 5).contains("80% probability"));
        assert_eq!(w.describe_rules("nothing matches", 5), "No specific patterns learned");
    }

    #[test]
    fn test_consequence_log_is_bounded_in_memory_and_on_disk() {
        let (mut w, store) = world();
        for n in 0..60 {
            w.record_consequence(&format!("act {n}"), "ok", false);
        }
        assert_eq!(w.consequences().len(), CONSEQUENCE_RETENTION);
        assert_eq!(w.consequences()[0].action, "act 10");

        let mut restored = WorldModel::new(Arc::new(store));
        assert!(restored.load());
        assert_eq!(restored.consequences(), w.consequences());
    }

    #[test]
    fn test_prediction_backlog_is_bounded() {
        let (mut w, store) = world();
        for n in 0..200 {
            w.add_predictions(vec![Prediction::new(format!("guess {n}"), 0.5)]);
        }
        assert_eq!(w.predictions().len(), PREDICTION_RETENTION);
        assert_eq!(w.predictions()[0].text, "guess 180");
        assert_eq!(w.pending_predictions().count(), PREDICTION_RETENTION);

        let mut restored = WorldModel::new(Arc::new(store));
        assert!(restored.load());
        assert_eq!(restored.predictions(), w.predictions());
    }

    #[test]
    fn test_confirmed_prediction_becomes_a_rule() {
        let (mut w, _) = world();
        w.add_predictions(vec![
            Prediction::new("User asks for a pasta recipe", 0.6).with_cue("I love cooking pasta"),
            Prediction::new("User says goodbye", 0.5).with_cue("I love cooking pasta"),
        ]);

        let settled = w.verify_against("Can I get a pasta recipe?", Utc::now());
        assert_eq!(settled.len(), 2);
        assert!(settled[0].confirmed);
        assert!(!settled[1].confirmed);
        assert_eq!(w.pending_predictions().count(), 0);
        assert_eq!(w.prediction_accuracy(), 0.5);
        assert_eq!(w.verified_count(), 2);

        assert_eq!(w.causal_rules().len(), 1);
        let rule = &w.causal_rules()[0];
        assert_eq!(rule.condition, "I love cooking pasta");
        assert_eq!(rule.consequence, "User asks for a pasta recipe");
        assert_eq!(rule.times_violated, 0);
        assert_eq!(w.consequences().len(), 2);
        assert!(w.consequences()[0].was_predicted);

        let hint = w.describe_rules("User said: I love cooking rice", 5);
        assert!(hint.contains("If I love cooking pasta, then User asks for a pasta recipe"));

        assert!(w.verify_against("anything else", Utc::now()).is_empty());
    }

    #[test]
    fn test_refuted_prediction_weakens_its_rule() {
        let (mut w, _) = world();
        w.learn_causal_rule("good morning", "user wants coffee", 0.8);
        w.learn_causal_rule("good morning", "user yawns", 0.8);
        w.add_predictions(vec![
            Prediction::new("user wants coffee", 0.7).with_cue("good morning")
        ]);
        let settled = w.verify_against("I am going back to bed", Utc::now());
        assert!(!settled[0].confirmed);
        let rule = &w.causal_rules()[0];
        assert_eq!(rule.times_violated, 1);
        assert!((rule.probability - 0.5).abs() < 1e-9);
        assert_eq!(w.causal_rules()[1].times_violated, 0);
        assert!(!w.consequences()[0].was_predicted);
    }

    #[test]
    fn test_recommendation_parse() {
        assert_eq!(Recommendation::parse_str("do_it"), Recommendation::DoIt);
        assert_eq!(Recommendation::parse_str("Avoid it"), Recommendation::AvoidIt);
        assert_eq!(Recommendation::parse_str("???"), Recommendation::Uncertain);
        assert_eq!(Simulation::uncertain().recommendation, Recommendation::Uncertain);
    }
}
