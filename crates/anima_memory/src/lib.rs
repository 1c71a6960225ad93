pub mod episode;
pub mod goals;
pub mod identity;
pub mod metacognition;
pub mod motivation;
pub mod timeline;
pub mod world_model;

pub use episode::{
    facts_contradict, Contradiction, Episode, EpisodeDraft, EpisodicLog, EPISODES_KEY,
};
pub use goals::{Goal, GoalPriority, GoalStack, GOALS_KEY};
pub use identity::{drift_between, IdentityModel, IdentityNarrative, IDENTITY_KEY};
pub use metacognition::{
    assess_confidence, confidence_explanation, EpistemicStatus, KnowledgeGap, MetaCognition,
    Uncertainty, METACOGNITION_KEY,
};
pub use motivation::{Drive, DriveGoal, DriveKind, Motivation, MotivationState, MOTIVATION_KEY};
pub use timeline::{EventKind, TimelineMemory, TIMELINE_KEY};
pub use world_model::{
    CausalRule, Entity, Prediction, Recommendation, Simulation, VerifiedPrediction, WorldModel,
    WORLD_MODEL_KEY,
};
