pub mod mock;
pub mod ollama;

pub use mock::{MockReasoner, ScriptedReasoner};
pub use ollama::OllamaReasoner;

use anima_core::config::ReasonerConfig;
use anima_core::Reasoner;
use std::sync::Arc;

/// Construct the provider named in the config.
pub fn build_reasoner(config: &ReasonerConfig) -> anyhow::Result<Arc<dyn Reasoner>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaReasoner::new(config)?)),
        "mock" => Ok(Arc::new(MockReasoner::new(&config.model))),
        other => anyhow::bail!("Unknown reasoner provider '{}' (expected 'ollama' or 'mock')", other),
    }
}
