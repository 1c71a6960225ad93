//! Tolerant decoding of Reasoner output.
//!
//! Models wrap JSON in prose or code fences, prefix list markers to tagged
//! lines, and occasionally return nothing useful at all. Every decoder here
//! returns an explicit result (an empty list, `None`, or an uncertain
//! simulation) instead of failing.

use anima_memory::{Prediction, Recommendation, Simulation};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::LazyLock;

static RE_TAGGED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:[-*•][ \t]*|\d+[.)][ \t]*)?(FACT|LESSON)[ \t]*[:：][ \t]*(.+?)[ \t]*$").unwrap()
});
static RE_CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap());

// ============================================================================
// Facts and lessons
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FactEntry {
    Text(String),
    Triple {
        subject: String,
        predicate: String,
        object: String,
    },
}

impl FactEntry {
    fn into_text(self) -> String {
        match self {
            FactEntry::Text(t) => t,
            FactEntry::Triple {
                subject,
                predicate,
                object,
            } => format!("{} {} {}", subject, predicate, object),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FactBlock {
    facts: Vec<FactEntry>,
}

fn clean_item(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

fn push_unique(out: &mut Vec<String>, item: String) {
    if !item.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(&item)) {
        out.push(item);
    }
}

fn tagged_lines(text: &str, tag: &str) -> Vec<String> {
    let mut out = Vec::new();
    for cap in RE_TAGGED_LINE.captures_iter(text) {
        if cap[1].eq_ignore_ascii_case(tag) {
            push_unique(&mut out, clean_item(&cap[2]));
        }
    }
    out
}

/// Facts stated as `FACT:` lines or as a `{"facts": [...]}` block.
pub fn decode_facts(text: &str) -> Vec<String> {
    let mut facts = tagged_lines(text, "FACT");
    if let Some(block) = decode_json::<FactBlock>(text) {
        for entry in block.facts {
            push_unique(&mut facts, clean_item(&entry.into_text()));
        }
    }
    facts
}

/// Lessons stated as `LESSON:` lines.
pub fn decode_lessons(text: &str) -> Vec<String> {
    tagged_lines(text, "LESSON")
}

// ============================================================================
// Goal labels
// ============================================================================

/// Trim, uppercase, strip `.` and `"`. `None` when nothing usable is left or
/// the answer was longer than `max_len` characters before stripping.
pub fn clean_goal_label(raw: &str, max_len: usize) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    if upper.chars().count() > max_len {
        return None;
    }
    let label: String = upper.chars().filter(|c| *c != '.' && *c != '"').collect();
    let label = label.trim().to_string();
    if label.is_empty() {
        return None;
    }
    Some(label)
}

// ============================================================================
// Predictions and simulations
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DecodedPrediction {
    pub prediction: String,
    pub reasoning: String,
    pub confidence: Option<f64>,
    pub recommended_action: String,
}

impl DecodedPrediction {
    pub fn into_prediction(self) -> Prediction {
        let mut p = Prediction::new(self.prediction.trim(), self.confidence.unwrap_or(0.5));
        p.reasoning = self.reasoning;
        p.recommended_action = self.recommended_action;
        p
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PredictionPayload {
    List(Vec<DecodedPrediction>),
    Wrapped { predictions: Vec<DecodedPrediction> },
    Single(DecodedPrediction),
}

/// Predictions from a JSON list, a `{"predictions": [...]}` wrapper, or a
/// single object. Entries without prediction text are dropped.
pub fn decode_predictions(text: &str) -> Vec<DecodedPrediction> {
    let payload = decode_json::<PredictionPayload>(text);
    let list = match payload {
        Some(PredictionPayload::List(l)) => l,
        Some(PredictionPayload::Wrapped { predictions }) => predictions,
        Some(PredictionPayload::Single(p)) => vec![p],
        None => {
            tracing::debug!("No predictions decoded from reasoner output");
            return Vec::new();
        }
    };
    list.into_iter()
        .filter(|p| !p.prediction.trim().is_empty())
        .collect()
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSimulation {
    immediate: String,
    cascade: String,
    long_term: String,
    risks: Vec<String>,
    benefits: Vec<String>,
    recommendation: String,
    confidence: Option<f64>,
}

/// A simulation object, or [`Simulation::uncertain`] when none can be read.
pub fn decode_simulation(text: &str) -> Simulation {
    match decode_json::<RawSimulation>(text) {
        Some(raw) => Simulation {
            immediate: raw.immediate,
            cascade: raw.cascade,
            long_term: raw.long_term,
            risks: raw.risks,
            benefits: raw.benefits,
            recommendation: Recommendation::parse_str(&raw.recommendation),
            confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        },
        None => Simulation::uncertain(),
    }
}

// ============================================================================
// JSON recovery
// ============================================================================

/// Try the whole text, then each fenced code block, then the outermost
/// `{...}` and `[...]` slices.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<T>(trimmed) {
        return Some(v);
    }

    for cap in RE_CODE_FENCE.captures_iter(trimmed) {
        if let Ok(v) = serde_json::from_str::<T>(cap[1].trim()) {
            return Some(v);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str::<T>(&trimmed[start..=end]) {
                    return Some(v);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_lines() {
        let text = "The user seems cheerful.\nFACT: User likes pizza\n - fact: User lives in Lisbon.\nnot a FACT: here";
        assert_eq!(decode_facts(text), vec!["User likes pizza", "User lives in Lisbon."]);
    }

    #[test]
    fn test_fact_lines_strip_quotes_and_dedupe() {
        let text = "FACT: \"User owns a cat\"\nFACT: user owns a cat\n1. FACT: User is 30";
        assert_eq!(decode_facts(text), vec!["User owns a cat", "User is 30"]);
    }

    #[test]
    fn test_fact_json_block() {
        let text = "Sure!\n```json\n{\"facts\": [\"User likes jazz\", {\"subject\": \"User\", \"predicate\": \"works as\", \"object\": \"a nurse\"}]}\n```";
        assert_eq!(decode_facts(text), vec!["User likes jazz", "User works as a nurse"]);
    }

    #[test]
    fn test_no_facts() {
        assert!(decode_facts("Nothing worth remembering.").is_empty());
        assert!(decode_facts("").is_empty());
    }

    #[test]
    fn test_lessons() {
        let text = "FACT: User likes tea\nLESSON: Short answers land better when tired";
        assert_eq!(decode_lessons(text), vec!["Short answers land better when tired"]);
        assert_eq!(decode_facts(text), vec!["User likes tea"]);
    }

    #[test]
    fn test_goal_label_cleaning() {
        assert_eq!(clean_goal_label("  seek_attention.\n", 30), Some("SEEK_ATTENTION".into()));
        assert_eq!(clean_goal_label("\"Express_Joy\"", 30), Some("EXPRESS_JOY".into()));
        assert_eq!(clean_goal_label("learn to paint", 30), Some("LEARN TO PAINT".into()));
        assert_eq!(clean_goal_label("", 30), None);
        assert_eq!(clean_goal_label("...", 30), None);
        let rambling = "I think I would like to reflect on my life for a while";
        assert_eq!(clean_goal_label(rambling, 30), None);
    }

    #[test]
    fn test_goal_label_length_counts_punctuation() {
        let thirty = "A".repeat(30);
        assert_eq!(clean_goal_label(&thirty, 30), Some(thirty.clone()));
        assert_eq!(clean_goal_label(&format!("{thirty}."), 30), None);
        assert_eq!(clean_goal_label(&format!("\"{thirty}\""), 30), None);
        assert_eq!(clean_goal_label("  \"rest.\"  ", 30), Some("REST".into()));
    }

    #[test]
    fn test_predictions_direct_list() {
        let text = r#"[{"prediction": "User will ask about food", "reasoning": "They mentioned pizza", "confidence": 0.8, "recommended_action": "Suggest a recipe"}]"#;
        let preds = decode_predictions(text);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].confidence, Some(0.8));
        let p = preds[0].clone().into_prediction();
        assert_eq!(p.text, "User will ask about food");
        assert_eq!(p.recommended_action, "Suggest a recipe");
    }

    #[test]
    fn test_predictions_in_prose_and_fences() {
        let fenced = "Here you go:\n```json\n[{\"prediction\": \"User says goodbye\"}]\n```";
        let preds = decode_predictions(fenced);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].clone().into_prediction().confidence, 0.5);

        let wrapped = r#"Result: {"predictions": [{"prediction": "A"}, {"prediction": ""}]} done"#;
        assert_eq!(decode_predictions(wrapped).len(), 1);

        let single = r#"{"prediction": "User will laugh", "confidence": 0.3}"#;
        assert_eq!(decode_predictions(single).len(), 1);
    }

    #[test]
    fn test_predictions_garbage_is_empty() {
        assert!(decode_predictions("I cannot predict the future.").is_empty());
        assert!(decode_predictions("[not json}").is_empty());
    }

    #[test]
    fn test_simulation_decoding() {
        let text = r#"{"immediate": "User smiles", "risks": ["none"], "recommendation": "do_it", "confidence": 0.7}"#;
        let sim = decode_simulation(text);
        assert_eq!(sim.immediate, "User smiles");
        assert_eq!(sim.recommendation, Recommendation::DoIt);
        assert_eq!(sim.risks, vec!["none"]);
        assert!((sim.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_simulation_fallback() {
        let sim = decode_simulation("no idea");
        assert_eq!(sim, Simulation::uncertain());
    }
}
