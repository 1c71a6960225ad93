//! # Anima Limbic System
//!
//! Fast, non-verbal state regulation:
//!
//! - **Emotions**: tagged intensities that decay linearly over a fixed lifetime
//!   and reinforce rather than duplicate.
//! - **Decision weights**: exploration / safety / speed / patience, shaped by
//!   whatever emotions are live.
//! - **Heartbeat**: the fixed tick and the slower rhythms riding on it.
//!
//! Everything here is synchronous and clock-injected; the control loop owns
//! the only instance and decides when time advances.

pub mod appraisal;
pub mod emotion;
mod heartbeat;
mod system;

pub use appraisal::{appraise, Appraisal};
pub use emotion::{DecisionModifier, Emotion, EmotionKind};
pub use heartbeat::{Cadence, DueWork, HeartbeatConfig};
pub use system::{
    DecisionWeights, EmotionEvent, EmotionalSnapshot, EmotionalSystem, MoodLabel, EMOTIONS_KEY,
};
