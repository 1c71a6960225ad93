//! Goal arbitration.
//!
//! Three tiers, evaluated top-down; the first that applies decides:
//!
//! 1. **Reflex**: low vitality forces rest without consulting anyone.
//! 2. **Resume**: a fresh top goal stays in charge.
//! 3. **Reasoning**: the Reasoner names what the agent wants next, nudged by
//!    the strongest intrinsic drive when there is one.
//!
//! Arbitration never fails. Any Reasoner trouble ends in `IDLE`.

use crate::extraction::clean_goal_label;
use crate::prompts;
use anima_core::config::GoalConfig;
use anima_core::{AgentState, Reasoner};
use anima_memory::{DriveGoal, Goal, GoalPriority, GoalStack};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub const CRITICAL_SLEEP: &str = "CRITICAL_SLEEP";
pub const NEED_REST: &str = "NEED_REST";
pub const IDLE: &str = "IDLE";

pub const CRITICAL_VITALITY: f64 = 15.0;
pub const LOW_VITALITY: f64 = 30.0;

pub const NEED_REST_UTTERANCE: &str = "I can't keep going... let me rest and recharge for a bit.";

const GOAL_TEMPERATURE: f32 = 0.7;
const UTTERANCE_TEMPERATURE: f32 = 0.8;
const RECENT_FACTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Reflex,
    Resume,
    Reasoning,
    /// The Reasoner failed or answered with nothing usable.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub goal: Goal,
    pub tier: Tier,
    /// Whether arbitration pushed the goal onto the stack.
    pub pushed: bool,
}

impl Decision {
    fn new(goal: Goal, tier: Tier, pushed: bool) -> Self {
        Self { goal, tier, pushed }
    }

    fn idle(tier: Tier, now: DateTime<Utc>) -> Self {
        Self::new(Goal::created_at(IDLE, GoalPriority::Normal, now), tier, false)
    }
}

/// What acting on a goal amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Realization {
    /// Run a rest cycle now.
    ForceSleep,
    /// Say this, unprompted.
    Speak(String),
    Nothing,
}

/// Chance that acting on `goal` is actually expressed on a given check.
pub fn emission_probability(goal: &Goal, vitality: f64) -> f64 {
    match goal.name.as_str() {
        CRITICAL_SLEEP => 0.8,
        NEED_REST => ((LOW_VITALITY - vitality) / LOW_VITALITY).clamp(0.0, 1.0),
        IDLE => 0.0,
        _ => 0.05,
    }
}

/// Labels other than the reflex and idle ones need the Reasoner to be acted on.
pub fn is_reasoned(goal: &Goal) -> bool {
    !matches!(goal.name.as_str(), CRITICAL_SLEEP | NEED_REST | IDLE)
}

/// `draw` is a fresh uniform sample from `[0, 1)`.
pub fn should_emit(goal: &Goal, vitality: f64, draw: f64) -> bool {
    draw < emission_probability(goal, vitality)
}

pub struct GoalArbiter {
    reasoner: Arc<dyn Reasoner>,
    resume_ceiling: Duration,
    max_label_len: usize,
}

impl GoalArbiter {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: &GoalConfig) -> Self {
        Self {
            reasoner,
            resume_ceiling: Duration::seconds(config.resume_ceiling_secs),
            max_label_len: config.max_label_len,
        }
    }

    /// Reflex tier on its own. `None` when vitality is comfortable.
    pub fn reflex(&self, vitality: f64, goals: &mut GoalStack, now: DateTime<Utc>) -> Option<Decision> {
        if vitality < CRITICAL_VITALITY {
            if let Some(top) = goals.top().filter(|g| g.name == CRITICAL_SLEEP) {
                return Some(Decision::new(top.clone(), Tier::Reflex, false));
            }
            let goal = Goal::created_at(CRITICAL_SLEEP, GoalPriority::Critical, now);
            goals.push(goal.clone());
            return Some(Decision::new(goal, Tier::Reflex, true));
        }
        if vitality < LOW_VITALITY {
            let goal = Goal::created_at(NEED_REST, GoalPriority::High, now);
            return Some(Decision::new(goal, Tier::Reflex, false));
        }
        None
    }

    pub async fn arbitrate(
        &self,
        state: &AgentState,
        goals: &mut GoalStack,
        drive: Option<&DriveGoal>,
        now: DateTime<Utc>,
    ) -> Decision {
        if let Some(decision) = self.reflex(state.vitality(), goals, now) {
            tracing::debug!("Reflex goal: {}", decision.goal.name);
            return decision;
        }

        if let Some(top) = goals.top() {
            if now - top.created_at < self.resume_ceiling {
                return Decision::new(top.clone(), Tier::Resume, false);
            }
            tracing::info!("Goal {} outlived its window; completing it", top.name);
            goals.pop_at(now);
        }

        self.reason(state, goals, drive, now).await
    }

    async fn reason(
        &self,
        state: &AgentState,
        goals: &mut GoalStack,
        drive: Option<&DriveGoal>,
        now: DateTime<Utc>,
    ) -> Decision {
        let facts: Vec<&str> = state
            .recent_facts(RECENT_FACTS)
            .into_iter()
            .map(|f| f.text.as_str())
            .collect();
        let prompt =
            prompts::goal_prompt(state.vitality(), state.mood(), &facts, &goals.describe(), drive);

        let raw = match self.reasoner.respond("", "", &prompt, GOAL_TEMPERATURE).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Goal reasoning failed, staying idle: {}", e);
                return Decision::idle(Tier::Fallback, now);
            }
        };

        match clean_goal_label(&raw, self.max_label_len) {
            Some(label) if label == IDLE => Decision::idle(Tier::Reasoning, now),
            Some(label) => {
                let goal = Goal::created_at(label, GoalPriority::Normal, now);
                goals.push(goal.clone());
                Decision::new(goal, Tier::Reasoning, true)
            }
            None => {
                tracing::debug!("Unusable goal label {:?}, staying idle", raw);
                Decision::idle(Tier::Fallback, now)
            }
        }
    }

    /// Turn a goal into an action. Only non-reflex labels reach the Reasoner.
    pub async fn realize(&self, goal: &Goal) -> Realization {
        match goal.name.as_str() {
            CRITICAL_SLEEP => Realization::ForceSleep,
            NEED_REST => Realization::Speak(NEED_REST_UTTERANCE.to_string()),
            IDLE => Realization::Nothing,
            label => {
                let prompt = prompts::utterance_prompt(label);
                match self.reasoner.respond("", "", &prompt, UTTERANCE_TEMPERATURE).await {
                    Ok(text) if !text.trim().is_empty() => Realization::Speak(text.trim().to_string()),
                    Ok(_) => Realization::Nothing,
                    Err(e) => {
                        tracing::warn!("Could not phrase goal {}: {}", label, e);
                        Realization::Nothing
                    }
                }
            }
        }
    }
}
