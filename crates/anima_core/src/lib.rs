pub mod config;
pub mod error;
pub mod similarity;
pub mod state;
pub mod store;

pub use config::AnimaConfig;
pub use error::{ReasonerError, StoreError};
pub use state::{ActionKind, AgentState, Fact, FactOutcome, StateDescription, StateSnapshot};
pub use store::{DurableStore, JsonFileStore, MemoryStore, Persistent};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The opaque text-generation collaborator.
///
/// Implementations may fail in any way they like; every caller treats a
/// failure as a degraded outcome, never as fatal.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn respond(
        &self,
        role: &str,
        context: &str,
        user_text: &str,
        temperature: f32,
    ) -> Result<String, ReasonerError>;

    fn name(&self) -> &str {
        "reasoner"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceKind {
    /// Answer to a user line.
    Reply,
    /// Spoken on the agent's own initiative.
    Autonomous,
    /// System-level notice (rest cycles, identity shifts, failures).
    Notice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub kind: UtteranceKind,
    pub text: String,
}

impl Utterance {
    pub fn reply(text: impl Into<String>) -> Self {
        Self { kind: UtteranceKind::Reply, text: text.into() }
    }

    pub fn autonomous(text: impl Into<String>) -> Self {
        Self { kind: UtteranceKind::Autonomous, text: text.into() }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self { kind: UtteranceKind::Notice, text: text.into() }
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Output sink for everything the agent says.
#[async_trait]
pub trait Expression: Send + Sync {
    async fn speak(&self, utterance: &Utterance) -> anyhow::Result<()>;
}
