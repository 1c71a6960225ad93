use crate::prompts;
use anima_core::{AgentState, Reasoner};
use anima_memory::{IdentityModel, IdentityNarrative};
use chrono::{DateTime, Utc};
use std::sync::Arc;

const INTROSPECTION_TEMPERATURE: f32 = 0.5;
const NARRATIVE_FACTS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct IntrospectionReport {
    pub narrative: IdentityNarrative,
    pub drift: f64,
    pub major_shift: bool,
    pub coherence: f64,
    pub fragmented: bool,
}

/// Periodic self-narrative refresh.
pub struct Introspector {
    reasoner: Arc<dyn Reasoner>,
    fragmentation_threshold: f64,
}

impl Introspector {
    pub fn new(reasoner: Arc<dyn Reasoner>, fragmentation_threshold: f64) -> Self {
        Self {
            reasoner,
            fragmentation_threshold,
        }
    }

    /// Ask for a fresh narrative and record it. `None` when the Reasoner
    /// could not provide one; the identity history is left untouched.
    pub async fn introspect(
        &self,
        state: &AgentState,
        episode_count: usize,
        identity: &mut IdentityModel,
        now: DateTime<Utc>,
    ) -> Option<IntrospectionReport> {
        let facts: Vec<&str> = state
            .recent_facts(NARRATIVE_FACTS)
            .into_iter()
            .map(|f| f.text.as_str())
            .collect();
        let previous = identity.current().map(|n| n.text.clone());
        let prompt = prompts::introspection_prompt(&facts, episode_count, previous.as_deref());

        let text = match self
            .reasoner
            .respond(prompts::INTROSPECTION_ROLE, "", &prompt, INTROSPECTION_TEMPERATURE)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!("Introspection skipped: {}", e);
                return None;
            }
        };

        let narrative = identity.record_narrative_at(&text, episode_count, now).clone();
        let coherence = state.coherence_at(now);
        Some(IntrospectionReport {
            narrative,
            drift: identity.drift(),
            major_shift: identity.is_major_shift(),
            coherence,
            fragmented: coherence < self.fragmentation_threshold,
        })
    }
}
