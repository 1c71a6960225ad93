//! Metacognition: what the agent knows it does not know.
//!
//! Three ledgers: knowledge gaps (topics it could not answer), uncertainties
//! (beliefs held with explicit confidence), and learning events (errors and
//! their corrections). Confidence about a topic is assessed from how many
//! facts support it and how many contradictions weigh against it.

use anima_core::similarity::content_tokens;
use anima_core::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const METACOGNITION_KEY: &str = "metacognition";

const GAP_RETENTION: usize = 50;
const UNCERTAINTY_RETENTION: usize = 100;
const LEARNING_RETENTION: usize = 100;

/// Facts needed for full confidence.
const FULL_EVIDENCE: f64 = 5.0;
const CONTRADICTION_PENALTY: f64 = 0.1;
const HIGH_PRIORITY: f64 = 0.7;
const LOW_CONFIDENCE: f64 = 0.5;
/// Beliefs below this confidence should be checked before they are relied on.
const VERIFY_BELOW: f64 = 0.6;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub topic: String,
    pub reason: String,
    pub priority: f64,
    pub noticed_at: DateTime<Utc>,
    /// Times the same gap was hit again.
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uncertainty {
    pub statement: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence_count: u32,
    #[serde(default)]
    pub contradictions: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub noted_at: DateTime<Utc>,
}

impl Uncertainty {
    /// Half from evidence (saturating at five pieces), half from the absence
    /// of contradictions (each one costs a fifth).
    pub fn update_confidence(&mut self, evidence: u32, contradictions: u32) {
        self.evidence_count = evidence;
        let support = (f64::from(evidence) / FULL_EVIDENCE).min(1.0);
        let consistency = (1.0 - f64::from(contradictions) * 0.2).max(0.0);
        self.confidence = 0.5 * support + 0.5 * consistency;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub correction: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpistemicStatus {
    pub knowledge_gaps: usize,
    pub high_priority_gaps: usize,
    pub uncertainties: usize,
    pub low_confidence_beliefs: usize,
    pub learning_events: usize,
    pub last_learning: Option<DateTime<Utc>>,
}

/// Confidence in 0..=1 from supporting facts and contradictions, rounded to
/// two decimals.
pub fn assess_confidence(facts_count: usize, contradiction_count: usize) -> f64 {
    let support = (facts_count as f64 / FULL_EVIDENCE).min(1.0);
    let raw = support - contradiction_count as f64 * CONTRADICTION_PENALTY;
    (raw.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// First-person sentence describing how sure the agent is about `topic`.
pub fn confidence_explanation(topic: &str, confidence: f64) -> String {
    if confidence > 0.8 {
        format!("I'm quite confident about {topic} (80%+) - strong evidence")
    } else if confidence > 0.6 {
        format!("I'm moderately confident about {topic} (60-80%) - some evidence")
    } else if confidence > 0.4 {
        format!("I'm uncertain about {topic} (40-60%) - limited evidence")
    } else if confidence > 0.2 {
        format!("I'm very uncertain about {topic} (20-40%) - weak evidence")
    } else {
        format!("I'm essentially guessing about {topic} - little or no evidence")
    }
}

fn same_topic(a: &str, b: &str) -> bool {
    let ta = content_tokens(a);
    !ta.is_empty() && ta == content_tokens(b)
}

fn trim_front<T>(items: &mut Vec<T>, keep: usize) {
    let excess = items.len().saturating_sub(keep);
    items.drain(..excess);
}

// ============================================================================
// MetaCognition
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct MetaRecord {
    knowledge_gaps: Vec<KnowledgeGap>,
    uncertainties: Vec<Uncertainty>,
    learning_history: Vec<LearningEvent>,
}

pub struct MetaCognition {
    record: MetaRecord,
    store: Arc<dyn DurableStore>,
}

impl MetaCognition {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: MetaRecord::default(),
            store,
        }
    }

    /// Note that `topic` could not be answered. Returns false when the gap
    /// was already known; its attempt count goes up instead.
    pub fn register_unknown_at(
        &mut self,
        topic: &str,
        reason: &str,
        priority: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let topic = topic.trim();
        if topic.is_empty() {
            return false;
        }
        if let Some(gap) = self
            .record
            .knowledge_gaps
            .iter_mut()
            .find(|g| same_topic(&g.topic, topic))
        {
            gap.attempts += 1;
            gap.priority = gap.priority.max(priority.clamp(0.0, 1.0));
            self.save();
            return false;
        }
        tracing::debug!("Knowledge gap: {}", topic);
        self.record.knowledge_gaps.push(KnowledgeGap {
            topic: topic.to_string(),
            reason: reason.to_string(),
            priority: priority.clamp(0.0, 1.0),
            noticed_at: now,
            attempts: 0,
        });
        trim_front(&mut self.record.knowledge_gaps, GAP_RETENTION);
        self.save();
        true
    }

    /// Drop every gap that `fact` shares content words with.
    pub fn resolve_gaps(&mut self, fact: &str) -> Vec<KnowledgeGap> {
        let words = content_tokens(fact);
        if words.is_empty() {
            return Vec::new();
        }
        let (resolved, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.record.knowledge_gaps)
            .into_iter()
            .partition(|g| content_tokens(&g.topic).iter().any(|w| words.contains(w)));
        self.record.knowledge_gaps = open;
        if !resolved.is_empty() {
            tracing::debug!("Resolved {} knowledge gap(s) with: {}", resolved.len(), fact);
            self.save();
        }
        resolved
    }

    pub fn register_uncertainty_at(
        &mut self,
        statement: &str,
        confidence: f64,
        reasoning: &str,
        now: DateTime<Utc>,
    ) {
        let confidence = confidence.clamp(0.0, 1.0);
        match self
            .record
            .uncertainties
            .iter_mut()
            .find(|u| same_topic(&u.statement, statement))
        {
            Some(u) => {
                u.confidence = confidence;
                u.reasoning = reasoning.to_string();
                u.noted_at = now;
            }
            None => {
                self.record.uncertainties.push(Uncertainty {
                    statement: statement.to_string(),
                    confidence,
                    evidence_count: 0,
                    contradictions: Vec::new(),
                    reasoning: reasoning.to_string(),
                    noted_at: now,
                });
                trim_front(&mut self.record.uncertainties, UNCERTAINTY_RETENTION);
            }
        }
        self.save();
    }

    /// Attach `contradicting` evidence to the belief `statement`, holding it
    /// as an even-odds uncertainty first if it was not tracked yet. Returns
    /// the recomputed confidence.
    pub fn doubt_at(&mut self, statement: &str, contradicting: &str, now: DateTime<Utc>) -> f64 {
        let idx = match self
            .record
            .uncertainties
            .iter()
            .position(|u| same_topic(&u.statement, statement))
        {
            Some(idx) => idx,
            None => {
                self.record.uncertainties.push(Uncertainty {
                    statement: statement.to_string(),
                    confidence: 0.5,
                    evidence_count: 0,
                    contradictions: Vec::new(),
                    reasoning: String::new(),
                    noted_at: now,
                });
                trim_front(&mut self.record.uncertainties, UNCERTAINTY_RETENTION);
                self.record.uncertainties.len() - 1
            }
        };
        let u = &mut self.record.uncertainties[idx];
        u.contradictions.push(contradicting.to_string());
        u.reasoning = format!("Contradicted by: {contradicting}");
        u.noted_at = now;
        let (support, against) = (u.evidence_count, u.contradictions.len() as u32);
        u.update_confidence(support, against);
        let confidence = u.confidence;
        self.save();
        confidence
    }

    pub fn learn_from_error_at(&mut self, error: &str, correction: &str, now: DateTime<Utc>) {
        tracing::debug!("Learning from error: {} -> {}", error, correction);
        self.record.learning_history.push(LearningEvent {
            timestamp: now,
            error: error.to_string(),
            correction: correction.to_string(),
        });
        trim_front(&mut self.record.learning_history, LEARNING_RETENTION);
        self.save();
    }

    /// Low-confidence beliefs that share content words with `topic`.
    pub fn doubts_about(&self, topic: &str) -> usize {
        let words = content_tokens(topic);
        self.record
            .uncertainties
            .iter()
            .filter(|u| u.confidence < LOW_CONFIDENCE)
            .filter(|u| content_tokens(&u.statement).iter().any(|w| words.contains(w)))
            .count()
    }

    /// True unless a held belief mentioning `topic` is confident enough.
    pub fn should_verify(&self, topic: &str) -> bool {
        let topic = topic.to_lowercase();
        match self
            .record
            .uncertainties
            .iter()
            .find(|u| u.statement.to_lowercase().contains(&topic))
        {
            Some(u) => u.confidence < VERIFY_BELOW,
            None => true,
        }
    }

    pub fn knowledge_gaps(&self) -> &[KnowledgeGap] {
        &self.record.knowledge_gaps
    }

    /// Gap topics, highest priority first.
    pub fn top_gaps(&self, n: usize) -> Vec<&str> {
        let mut gaps: Vec<&KnowledgeGap> = self.record.knowledge_gaps.iter().collect();
        gaps.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        gaps.into_iter().take(n).map(|g| g.topic.as_str()).collect()
    }

    pub fn uncertainties(&self) -> &[Uncertainty] {
        &self.record.uncertainties
    }

    pub fn learning_history(&self) -> &[LearningEvent] {
        &self.record.learning_history
    }

    pub fn epistemic_status(&self) -> EpistemicStatus {
        EpistemicStatus {
            knowledge_gaps: self.record.knowledge_gaps.len(),
            high_priority_gaps: self
                .record
                .knowledge_gaps
                .iter()
                .filter(|g| g.priority > HIGH_PRIORITY)
                .count(),
            uncertainties: self.record.uncertainties.len(),
            low_confidence_beliefs: self
                .record
                .uncertainties
                .iter()
                .filter(|u| u.confidence < LOW_CONFIDENCE)
                .count(),
            learning_events: self.record.learning_history.len(),
            last_learning: self.record.learning_history.last().map(|e| e.timestamp),
        }
    }
}

impl Persistent for MetaCognition {
    fn load(&mut self) -> bool {
        match load_record::<MetaRecord>(self.store.as_ref(), METACOGNITION_KEY) {
            Some(record) => {
                tracing::info!(
                    "Restored metacognition: {} gaps, {} uncertainties, {} learning events",
                    record.knowledge_gaps.len(),
                    record.uncertainties.len(),
                    record.learning_history.len()
                );
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), METACOGNITION_KEY, &self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anima_core::MemoryStore;

    fn meta() -> (MetaCognition, MemoryStore) {
        let store = MemoryStore::new();
        (MetaCognition::new(Arc::new(store.clone())), store)
    }

    #[test]
    fn test_assess_confidence() {
        assert_eq!(assess_confidence(0, 0), 0.0);
        assert_eq!(assess_confidence(2, 0), 0.4);
        assert_eq!(assess_confidence(5, 0), 1.0);
        assert_eq!(assess_confidence(9, 0), 1.0);
        assert_eq!(assess_confidence(5, 3), 0.7);
        assert_eq!(assess_confidence(1, 4), 0.0);
    }

    #[test]
    fn test_confidence_explanation_bands() {
        assert!(confidence_explanation("tea", 0.9).starts_with("I'm quite confident about tea"));
        assert!(confidence_explanation("tea", 0.7).contains("moderately"));
        assert!(confidence_explanation("tea", 0.5).starts_with("I'm uncertain"));
        assert!(confidence_explanation("tea", 0.3).contains("very uncertain"));
        assert!(confidence_explanation("tea", 0.0).contains("essentially guessing"));
    }

    #[test]
    fn test_gaps_dedupe_and_resolve() {
        let (mut m, _) = meta();
        let now = Utc::now();
        assert!(m.register_unknown_at("What is my cat's name?", "no facts", 0.5, now));
        assert!(!m.register_unknown_at("what is my cat's name", "no facts", 0.8, now));
        assert!(m.register_unknown_at("Where do I work?", "no facts", 0.4, now));
        assert!(!m.register_unknown_at("   ", "blank", 0.4, now));
        assert_eq!(m.knowledge_gaps().len(), 2);
        assert_eq!(m.knowledge_gaps()[0].attempts, 1);
        assert_eq!(m.knowledge_gaps()[0].priority, 0.8);
        assert_eq!(m.top_gaps(1), vec!["What is my cat's name?"]);
        assert_eq!(m.epistemic_status().high_priority_gaps, 1);

        let resolved = m.resolve_gaps("User's cat is called Miso");
        assert_eq!(resolved.len(), 1);
        assert_eq!(m.knowledge_gaps().len(), 1);
        assert!(m.resolve_gaps("").is_empty());
    }

    #[test]
    fn test_gap_list_is_bounded() {
        let (mut m, _) = meta();
        for n in 0..(GAP_RETENTION + 10) {
            m.register_unknown_at(&format!("topic{n}"), "", 0.5, Utc::now());
        }
        assert_eq!(m.knowledge_gaps().len(), GAP_RETENTION);
        assert_eq!(m.knowledge_gaps()[0].topic, "topic10");
    }

    #[test]
    fn test_uncertainty_and_verification() {
        let (mut m, _) = meta();
        let now = Utc::now();
        assert!(m.should_verify("coffee"));

        m.register_uncertainty_at("User likes coffee", 0.8, "said so once", now);
        assert!(!m.should_verify("coffee"));
        assert_eq!(m.doubts_about("coffee"), 0);

        // No supporting evidence recorded, one contradiction: 0 + 0.5 * 0.8.
        let c = m.doubt_at("User likes coffee", "User hates coffee", now);
        assert!((c - 0.4).abs() < 1e-9);
        assert_eq!(m.uncertainties()[0].contradictions.len(), 1);
        assert!(m.should_verify("coffee"));
        assert_eq!(m.doubts_about("Do I still drink coffee?"), 1);

        let c = m.doubt_at("User owns a boat", "User sold the boat", now);
        assert!((c - 0.4).abs() < 1e-9);
        let c = m.doubt_at("user owns a boat", "User never had a boat", now);
        assert!((c - 0.3).abs() < 1e-9);
        assert_eq!(m.uncertainties().len(), 2);
        assert_eq!(m.epistemic_status().low_confidence_beliefs, 2);
    }

    #[test]
    fn test_update_confidence() {
        let mut u = Uncertainty {
            statement: "x".into(),
            confidence: 0.5,
            evidence_count: 0,
            contradictions: Vec::new(),
            reasoning: String::new(),
            noted_at: Utc::now(),
        };
        u.update_confidence(5, 0);
        assert_eq!(u.confidence, 1.0);
        u.update_confidence(0, 10);
        assert_eq!(u.confidence, 0.0);
    }

    #[test]
    fn test_learning_from_error_persists() {
        let (mut m, store) = meta();
        let now = Utc::now();
        m.learn_from_error_at("expected a greeting", "user went quiet", now);
        m.register_unknown_at("favourite band", "never asked", 0.5, now);
        let status = m.epistemic_status();
        assert_eq!(status.learning_events, 1);
        assert_eq!(status.last_learning, Some(now));

        let mut restored = MetaCognition::new(Arc::new(store));
        assert!(restored.load());
        assert_eq!(restored.learning_history(), m.learning_history());
        assert_eq!(restored.knowledge_gaps(), m.knowledge_gaps());
    }
}
