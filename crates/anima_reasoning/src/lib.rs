//! # Anima Reasoning
//!
//! Everything that talks to the Reasoner, and the loop that decides when to.
//!
//! - **Providers**: Ollama over its OpenAI-compatible API, a deterministic
//!   offline mock, and a scripted reasoner for tests.
//! - **Decoding**: tolerant parsing of free-form Reasoner output.
//! - **Arbiter**: reflex, resume and reasoning tiers for goal selection.
//! - **Control loop**: the single owner of every subsystem.

pub mod arbiter;
pub mod control_loop;
pub mod extraction;
pub mod forecast;
pub mod introspection;
pub mod llm;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod router;

pub use arbiter::{Decision, GoalArbiter, Realization, Tier};
pub use control_loop::{ControlLoop, Organism, TickOutcome};
pub use llm::BoundedReasoner;
pub use providers::{build_reasoner, MockReasoner, OllamaReasoner, ScriptedReasoner};
pub use router::{InputKind, InputRouter};
