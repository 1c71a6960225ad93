//! Goal stack.
//!
//! Goals are suspended, never lost: pushing a new goal interrupts the current
//! one, and popping resumes whatever sat beneath it. Only the top is active.

use anima_core::store::{load_record, save_record, DurableStore, Persistent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

pub const GOALS_KEY: &str = "goals";

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

// ============================================================================
// Goal Data Model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalPriority {
    Normal,
    High,
    Critical,
}

impl GoalPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalPriority::Normal => "normal",
            GoalPriority::High => "high",
            GoalPriority::Critical => "critical",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s {
            "critical" => GoalPriority::Critical,
            "high" => GoalPriority::High,
            _ => GoalPriority::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub priority: GoalPriority,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn new(name: impl Into<String>, priority: GoalPriority) -> Self {
        Self::created_at(name, priority, Utc::now())
    }

    pub fn created_at(name: impl Into<String>, priority: GoalPriority, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            priority,
            created_at: now,
            completed: false,
            completed_at: None,
        }
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }
}

// ============================================================================
// Goal Stack
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GoalRecord {
    stack: Vec<Goal>,
    history: VecDeque<Goal>,
}

pub struct GoalStack {
    record: GoalRecord,
    history_limit: usize,
    store: Arc<dyn DurableStore>,
}

impl GoalStack {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            record: GoalRecord::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            store,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Interrupt the current goal with `goal`.
    pub fn push(&mut self, goal: Goal) {
        tracing::info!("Goal pushed: {} ({})", goal.name, goal.priority.as_str());
        self.record.stack.push(goal);
        self.save();
    }

    /// Finish the current goal and resume the one beneath it.
    pub fn pop(&mut self) -> Option<Goal> {
        self.pop_at(Utc::now())
    }

    pub fn pop_at(&mut self, now: DateTime<Utc>) -> Option<Goal> {
        let mut goal = self.record.stack.pop()?;
        goal.completed = true;
        goal.completed_at = Some(now);
        tracing::info!("Goal completed: {}", goal.name);

        self.record.history.push_back(goal.clone());
        while self.record.history.len() > self.history_limit {
            self.record.history.pop_front();
        }
        self.save();
        Some(goal)
    }

    /// Pop the top goal only if it carries `name`.
    pub fn complete_top_if(&mut self, name: &str) -> Option<Goal> {
        if self.top().is_some_and(|g| g.name == name) {
            self.pop()
        } else {
            None
        }
    }

    pub fn top(&self) -> Option<&Goal> {
        self.record.stack.last()
    }

    pub fn goals(&self) -> &[Goal] {
        &self.record.stack
    }

    /// Stack contents bottom to top.
    pub fn active_names(&self) -> Vec<String> {
        self.record.stack.iter().map(|g| g.name.clone()).collect()
    }

    pub fn history(&self) -> &VecDeque<Goal> {
        &self.record.history
    }

    pub fn len(&self) -> usize {
        self.record.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.stack.is_empty()
    }

    pub fn describe(&self) -> String {
        if self.record.stack.is_empty() {
            return "no active goals".to_string();
        }
        self.record
            .stack
            .iter()
            .rev()
            .map(|g| format!("{} [{}]", g.name, g.priority.as_str()))
            .collect::<Vec<_>>()
            .join(" <- ")
    }
}

impl Persistent for GoalStack {
    fn load(&mut self) -> bool {
        match load_record::<GoalRecord>(self.store.as_ref(), GOALS_KEY) {
            Some(record) => {
                tracing::info!(
                    "Restored goal stack: {} active, {} completed",
                    record.stack.len(),
                    record.history.len()
                );
                self.record = record;
                true
            }
            None => false,
        }
    }

    fn save(&self) {
        save_record(self.store.as_ref(), GOALS_KEY, &self.record);
    }
}
