//! Reasoner-backed forecasting over the world model.

use crate::extraction::{decode_predictions, decode_simulation};
use crate::prompts;
use anima_core::Reasoner;
use anima_memory::{Prediction, Simulation, WorldModel};
use std::sync::Arc;

const FORECAST_TEMPERATURE: f32 = 0.4;
const SIMULATION_TEMPERATURE: f32 = 0.3;
const RULES_IN_PROMPT: usize = 5;

pub struct Forecaster {
    reasoner: Arc<dyn Reasoner>,
}

impl Forecaster {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Predictions about what follows `situation`, informed by learned rules.
    /// Empty when the Reasoner fails or its answer cannot be decoded.
    pub async fn forecast(&self, situation: &str, world: &WorldModel) -> Vec<Prediction> {
        let rules = world.describe_rules(situation, RULES_IN_PROMPT);
        let prompt = prompts::forecast_prompt(situation, &rules);
        match self
            .reasoner
            .respond(prompts::FORECAST_ROLE, "", &prompt, FORECAST_TEMPERATURE)
            .await
        {
            Ok(text) => decode_predictions(&text)
                .into_iter()
                .map(|p| p.into_prediction())
                .collect(),
            Err(e) => {
                tracing::warn!("Forecast failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Imagined consequences of `action`; uncertain when nothing usable came back.
    pub async fn simulate(&self, action: &str) -> Simulation {
        let prompt = prompts::simulation_prompt(action);
        match self
            .reasoner
            .respond(prompts::SIMULATION_ROLE, "", &prompt, SIMULATION_TEMPERATURE)
            .await
        {
            Ok(text) => decode_simulation(&text),
            Err(e) => {
                tracing::warn!("Simulation failed: {}", e);
                Simulation::uncertain()
            }
        }
    }
}
