//! The control loop: single scheduling authority and sole owner of state.
//!
//! One tick runs, in order: metabolism, introspection, goal arbitration (each
//! only when its interval has elapsed), then at most one queued input line.
//! Nothing inside a tick is allowed to end the loop; only a shutdown command
//! or a closed input channel does.

use crate::arbiter::{self, GoalArbiter, Realization};
use crate::extraction::{decode_facts, decode_lessons};
use crate::forecast::Forecaster;
use crate::introspection::Introspector;
use crate::llm::BoundedReasoner;
use crate::prompts::{self, InteractionContext};
use crate::router::{InputKind, InputRouter};
use anima_core::similarity::TokenOverlap;
use anima_core::store::DurableStore;
use anima_core::{
    ActionKind, AgentState, AnimaConfig, Expression, FactOutcome, Persistent, Reasoner, Utterance,
};
use anima_limbic::{appraise, Cadence, EmotionKind, EmotionalSystem, HeartbeatConfig};
use anima_memory::{
    assess_confidence, confidence_explanation, facts_contradict, DriveGoal, DriveKind, Episode,
    EpisodeDraft, EpisodicLog, EventKind, GoalStack, IdentityModel, MetaCognition, Motivation,
    Recommendation, TimelineMemory, WorldModel,
};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};

const REPLY_TEMPERATURE: f32 = 0.7;
const REFLECTION_TEMPERATURE: f32 = 0.3;
const CONTEXT_FACTS: usize = 3;
const CONTEXT_LESSONS: usize = 3;
const LEARNING_PER_FACT: f64 = 0.2;
/// Relevant facts weighed when judging confidence.
const EVIDENCE_FACTS: usize = 5;
const GAP_PRIORITY: f64 = 0.5;
const GAPS_CONSIDERED: usize = 5;
const REST_RULE_PRIOR: f64 = 0.9;
/// A simulated "avoid it" at or above this confidence holds back a goal.
const HOLD_BACK_CONFIDENCE: f64 = 0.6;

pub const FALLBACK_NOTICE: &str = "(My thoughts are scattered right now. I couldn't form a reply.)";

// ============================================================================
// Organism
// ============================================================================

/// Every persistent subsystem, restored from one store.
pub struct Organism {
    pub state: AgentState,
    pub goals: GoalStack,
    pub emotions: EmotionalSystem,
    pub episodes: EpisodicLog,
    pub identity: IdentityModel,
    pub world: WorldModel,
    pub timeline: TimelineMemory,
    pub metacognition: MetaCognition,
    pub motivation: Motivation,
}

impl Organism {
    /// Build every subsystem against `store` and load whatever it holds.
    pub fn open(store: Arc<dyn DurableStore>, config: &AnimaConfig) -> Self {
        let mut organism = Self {
            state: AgentState::new(store.clone())
                .with_similarity(Arc::new(TokenOverlap::new(config.facts.similarity_threshold)))
                .with_min_fact_len(config.facts.min_len)
                .with_idle_decay(config.organism.idle_decay),
            goals: GoalStack::new(store.clone()).with_history_limit(config.goals.history_limit),
            emotions: EmotionalSystem::new(store.clone()),
            episodes: EpisodicLog::new(store.clone()),
            identity: IdentityModel::new(store.clone())
                .with_drift_threshold(config.identity.drift_threshold),
            world: WorldModel::new(store.clone()),
            timeline: TimelineMemory::new(store.clone()),
            metacognition: MetaCognition::new(store.clone()),
            motivation: Motivation::new(store),
        };

        let restored = [
            organism.state.load(),
            organism.goals.load(),
            organism.emotions.load(),
            organism.episodes.load(),
            organism.identity.load(),
            organism.world.load(),
            organism.timeline.load(),
            organism.metacognition.load(),
            organism.motivation.load(),
        ];
        tracing::info!(
            "Organism opened ({} of {} records restored)",
            restored.iter().filter(|r| **r).count(),
            restored.len()
        );
        organism
    }

    pub fn save_all(&self) {
        self.state.save();
        self.goals.save();
        self.emotions.save();
        self.episodes.save();
        self.identity.save();
        self.world.save();
        self.timeline.save();
        self.metacognition.save();
        self.motivation.save();
    }
}

// ============================================================================
// ControlLoop
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Shutdown,
}

pub struct ControlLoop {
    organism: Organism,
    reasoner: Arc<dyn Reasoner>,
    arbiter: GoalArbiter,
    introspector: Introspector,
    forecaster: Forecaster,
    router: InputRouter,
    expression: Arc<dyn Expression>,
    cadence: Cadence,
    forecast: bool,
    rng: StdRng,
}

impl ControlLoop {
    /// `reasoner` is wrapped in a [`BoundedReasoner`] using the configured timeout.
    pub fn new(
        organism: Organism,
        reasoner: Arc<dyn Reasoner>,
        expression: Arc<dyn Expression>,
        config: &AnimaConfig,
        start: DateTime<Utc>,
    ) -> Self {
        let reasoner: Arc<dyn Reasoner> =
            Arc::new(BoundedReasoner::new(reasoner, config.reasoner.timeout()));
        Self {
            organism,
            arbiter: GoalArbiter::new(reasoner.clone(), &config.goals),
            introspector: Introspector::new(reasoner.clone(), config.identity.fragmentation_threshold),
            forecaster: Forecaster::new(reasoner.clone()),
            reasoner,
            router: InputRouter::with_defaults(),
            expression,
            cadence: Cadence::new(HeartbeatConfig::from_config(&config.organism), start),
            forecast: config.organism.forecast,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic mood drift and emission draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn organism(&self) -> &Organism {
        &self.organism
    }

    pub fn organism_mut(&mut self) -> &mut Organism {
        &mut self.organism
    }

    /// Tick until shutdown, then save every subsystem.
    pub async fn run(mut self, mut input: mpsc::Receiver<String>) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.cadence.config().interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            "Control loop started (tick {:?}, reasoner {})",
            self.cadence.config().interval,
            self.reasoner.name()
        );

        loop {
            ticker.tick().await;
            if self.tick_at(Utc::now(), &mut input).await == TickOutcome::Shutdown {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// One tick. Never blocks on the input queue.
    pub async fn tick_at(&mut self, now: DateTime<Utc>, input: &mut mpsc::Receiver<String>) -> TickOutcome {
        let due = self.cadence.poll(now);
        if due.metabolism {
            self.metabolize(now);
        }
        if due.introspection {
            self.introspect(now).await;
        }
        if due.goal_check {
            self.goal_check(now).await;
        }

        match input.try_recv() {
            Ok(line) => self.handle_input(&line, now).await,
            Err(TryRecvError::Empty) => TickOutcome::Continue,
            Err(TryRecvError::Disconnected) => {
                tracing::info!("Input channel closed");
                TickOutcome::Shutdown
            }
        }
    }

    pub async fn handle_input(&mut self, line: &str, now: DateTime<Utc>) -> TickOutcome {
        match self.router.route(line) {
            InputKind::Shutdown => TickOutcome::Shutdown,
            InputKind::Rest => {
                self.rest(now).await;
                TickOutcome::Continue
            }
            InputKind::Ignore => TickOutcome::Continue,
            InputKind::Converse(text) => {
                self.interact(&text, now).await;
                TickOutcome::Continue
            }
        }
    }

    pub async fn shutdown(&self) {
        self.organism.save_all();
        let state = &self.organism.state;
        tracing::info!(
            "Shutting down with vitality {:.1}, {} fact(s), {} episode(s)",
            state.vitality(),
            state.facts().len(),
            self.organism.episodes.len()
        );
        self.say(Utterance::notice(format!(
            "Saving state (vitality left: {:.0}%). Goodbye.",
            state.vitality()
        )))
        .await;
    }

    // ------------------------------------------------------------- rhythms

    pub fn metabolize(&mut self, now: DateTime<Utc>) {
        let snap = self.organism.state.apply_action(ActionKind::Idle);
        let expired = self.organism.emotions.cleanup(now);
        self.organism.motivation.update_drives();
        tracing::debug!(
            "Metabolism: vitality {:.1}, {} emotion(s) expired",
            snap.vitality,
            expired
        );
    }

    pub async fn introspect(&mut self, now: DateTime<Utc>) {
        let org = &mut self.organism;
        let episode_count = org.episodes.len();
        let Some(report) = self
            .introspector
            .introspect(&org.state, episode_count, &mut org.identity, now)
            .await
        else {
            return;
        };

        if report.fragmented {
            tracing::warn!("Fact ledger looks fragmented (coherence {:.2})", report.coherence);
        }

        if report.major_shift {
            tracing::warn!(
                "Major identity shift (drift {:.2}): {}",
                report.drift,
                report.narrative.text
            );
            org.timeline.record_event_at(
                EventKind::IdentityShift,
                format!("Identity drift {:.2}", report.drift),
                report.drift,
                now,
            );
            self.say(Utterance::notice(format!(
                "I feel like I'm changing (identity drift {:.2}).",
                report.drift
            )))
            .await;
        } else {
            tracing::info!("Introspection recorded (drift {:.2})", report.drift);
            org.timeline.record_event_at(
                EventKind::Introspection,
                format!("Narrative {}", report.narrative.fingerprint),
                0.0,
                now,
            );
        }
    }

    pub async fn goal_check(&mut self, now: DateTime<Utc>) {
        let draw: f64 = self.rng.gen();
        self.goal_check_with_draw(now, draw).await;
    }

    /// Goal arbitration with an explicit uniform draw for the emission roll.
    pub async fn goal_check_with_draw(&mut self, now: DateTime<Utc>, draw: f64) {
        let drive = self.consult_drives(now);
        let org = &mut self.organism;
        let decision = self
            .arbiter
            .arbitrate(&org.state, &mut org.goals, drive.as_ref(), now)
            .await;
        if decision.pushed {
            if let Some(kind) = DriveKind::from_goal_label(&decision.goal.name) {
                tracing::debug!("Adopted a {} goal", kind.as_str());
                org.motivation.satisfy(kind);
            }
        }
        let vitality = org.state.vitality();
        tracing::debug!(
            "Goal check: {} via {:?} (draw {:.2})",
            decision.goal.name,
            decision.tier,
            draw
        );
        if !arbiter::should_emit(&decision.goal, vitality, draw) {
            return;
        }
        if self.forecast
            && arbiter::is_reasoned(&decision.goal)
            && self.holds_back(&decision.goal.name).await
        {
            return;
        }

        match self.arbiter.realize(&decision.goal).await {
            Realization::ForceSleep => {
                tracing::info!("Vitality critical ({:.1}); forcing a rest cycle", vitality);
                self.rest(now).await;
            }
            Realization::Speak(text) => {
                self.organism.timeline.record_event_at(
                    EventKind::Goal,
                    format!("Acted on {}", decision.goal.name),
                    0.0,
                    now,
                );
                self.say(Utterance::autonomous(text)).await;
            }
            Realization::Nothing => {}
        }
    }

    /// Detect drives from open gaps and prediction accuracy, then propose a
    /// goal from the strongest one.
    fn consult_drives(&mut self, now: DateTime<Utc>) -> Option<DriveGoal> {
        let org = &mut self.organism;
        let gaps = org.metacognition.top_gaps(GAPS_CONSIDERED);
        let doubts = org.metacognition.epistemic_status().low_confidence_beliefs;
        org.motivation.detect_curiosity_gap(&gaps, doubts, now);
        org.motivation.detect_prediction_failure(
            org.world.verified_count(),
            org.world.prediction_accuracy(),
            now,
        );
        org.motivation.generate_goal_at(now)
    }

    /// Imagine acting on `goal` first. True when the simulation advises
    /// against it with enough confidence; what it foresaw is kept as a rule.
    async fn holds_back(&mut self, goal: &str) -> bool {
        let action = format!("I act on {}", goal);
        let sim = self.forecaster.simulate(&action).await;
        if sim.recommendation != Recommendation::AvoidIt || sim.confidence < HOLD_BACK_CONFIDENCE {
            return false;
        }
        tracing::info!(
            "Holding back on {} ({:.0}% sure it would go badly)",
            goal,
            sim.confidence * 100.0
        );
        if !sim.immediate.trim().is_empty() {
            self.organism
                .world
                .learn_causal_rule(&action, sim.immediate.trim(), sim.confidence);
        }
        true
    }

    /// Full rest: vitality restored, mood back to baseline, and a pending
    /// critical-sleep goal completed.
    pub async fn rest(&mut self, now: DateTime<Utc>) {
        let org = &mut self.organism;
        let snap = org.state.apply_action(ActionKind::Sleep);
        org.world.observe_state("self", "vitality", snap.vitality);
        org.world
            .learn_causal_rule("I rest", "my vitality is restored", REST_RULE_PRIOR);
        if org.goals.complete_top_if(arbiter::CRITICAL_SLEEP).is_some() {
            org.emotions
                .trigger_at(EmotionKind::Satisfied, 0.7, "rested after exhaustion", now);
        }
        org.timeline.record_event_at(EventKind::Rest, "Rest cycle", 0.0, now);
        self.say(Utterance::notice(format!(
            "Woke up! Vitality restored to {:.0}%.",
            snap.vitality
        )))
        .await;
    }

    // ---------------------------------------------------------- interaction

    /// One conversational exchange, start to closed episode.
    pub async fn interact(&mut self, text: &str, now: DateTime<Utc>) -> Episode {
        let desc = self.organism.state.describe_state();
        let mut draft = {
            let org = &self.organism;
            EpisodeDraft::open(
                text,
                org.state.vitality(),
                org.state.mood(),
                org.goals.active_names(),
                desc.as_str(),
            )
        };

        self.settle_predictions(text, now);

        for a in appraise(text) {
            self.organism.emotions.trigger_at(a.kind, a.intensity, text, now);
        }

        let confidence = self.confidence_about(text);
        if confidence <= 0.0 && text.trim_end().ends_with('?') {
            self.organism.metacognition.register_unknown_at(
                text,
                "asked with nothing relevant remembered",
                GAP_PRIORITY,
                now,
            );
        }

        let context = self.assemble_context(text, confidence, now);
        let reply = match self
            .reasoner
            .respond(prompts::PERSONA_ROLE, &context, text, REPLY_TEMPERATURE)
            .await
        {
            Ok(reply) => Some(reply.trim().to_string()),
            Err(e) => {
                tracing::warn!("Reply failed: {}", e);
                self.organism
                    .emotions
                    .trigger_at(EmotionKind::Confused, 0.5, "could not form a reply", now);
                None
            }
        };
        let success = reply.is_some();

        match &reply {
            Some(r) => {
                draft.set_reply(r.clone());
                self.say(Utterance::reply(r.clone())).await;
                let reflection = self.reflect(text, r, desc).await;
                self.learn_from_reflection(&reflection, &mut draft, now);
                draft.set_reflection(reflection);
            }
            None => self.say(Utterance::notice(FALLBACK_NOTICE)).await,
        }

        let after = self
            .organism
            .state
            .apply_action_with(ActionKind::Talk, &mut self.rng);

        if self.forecast {
            if let Some(r) = &reply {
                let situation = format!("User said: {}. I replied: {}", text, r);
                let predictions: Vec<_> = self
                    .forecaster
                    .forecast(&situation, &self.organism.world)
                    .await
                    .into_iter()
                    .map(|p| p.with_cue(text))
                    .collect();
                tracing::debug!("Forecast produced {} prediction(s)", predictions.len());
                self.organism.world.add_predictions(predictions);
            }
        }

        let episode = draft.close(after.vitality, after.mood, success);
        let learned = episode.facts_learned.len();
        self.organism.episodes.append(episode.clone());
        self.organism.timeline.record_event_at(
            EventKind::Interaction,
            format!("Conversation: {}", text.chars().take(60).collect::<String>()),
            learned as f64 * LEARNING_PER_FACT,
            now,
        );
        episode
    }

    /// Check what was expected against what the user actually said. Settled
    /// predictions stay on as beliefs with their updated confidence.
    fn settle_predictions(&mut self, text: &str, now: DateTime<Utc>) {
        let org = &mut self.organism;
        for v in org.world.verify_against(text, now) {
            let outcome = if v.confirmed { "borne out" } else { "did not happen" };
            org.metacognition.register_uncertainty_at(
                &v.prediction.text,
                v.prediction.confidence,
                outcome,
                now,
            );
            if v.confirmed {
                tracing::debug!("Prediction confirmed: {}", v.prediction.text);
            } else {
                org.metacognition.learn_from_error_at(
                    &format!("Expected: {}", v.prediction.text),
                    &format!("Observed: {}", text),
                    now,
                );
            }
        }
    }

    fn confidence_about(&self, text: &str) -> f64 {
        let org = &self.organism;
        let support = org.state.relevant_facts(text, EVIDENCE_FACTS).len();
        assess_confidence(support, org.metacognition.doubts_about(text))
    }

    fn assemble_context(&self, text: &str, confidence: f64, now: DateTime<Utc>) -> String {
        let org = &self.organism;
        let snapshot = org.emotions.snapshot(now);
        InteractionContext {
            status: org.state.status(),
            tone: prompts::tone_instruction(org.state.describe_state()),
            facts: org
                .state
                .relevant_facts(text, CONTEXT_FACTS)
                .into_iter()
                .map(|f| f.text.as_str())
                .collect(),
            confidence: confidence_explanation("this", confidence),
            emotion: snapshot.label.to_string(),
            dominant_weight: snapshot.weights.dominant(),
            goal: org.goals.top().map(|g| g.name.as_str()),
            narrative: org.identity.current().map(|n| n.text.as_str()),
            lessons: org.timeline.lessons_relevant_to(text, CONTEXT_LESSONS),
        }
        .render()
    }

    async fn reflect(&self, text: &str, reply: &str, desc: anima_core::StateDescription) -> String {
        let prompt = prompts::reflection_prompt(text, reply, desc);
        match self
            .reasoner
            .respond(prompts::REFLECTION_ROLE, "", &prompt, REFLECTION_TEMPERATURE)
            .await
        {
            Ok(r) => r.trim().to_string(),
            Err(e) => {
                tracing::warn!("Reflection failed: {}", e);
                String::new()
            }
        }
    }

    fn learn_from_reflection(&mut self, reflection: &str, draft: &mut EpisodeDraft, now: DateTime<Utc>) {
        let org = &mut self.organism;
        for fact in decode_facts(reflection) {
            let conflict = org
                .state
                .facts()
                .iter()
                .find(|known| facts_contradict(&known.text, &fact))
                .map(|known| known.text.clone());
            match org.state.add_fact_at(&fact, now) {
                FactOutcome::Accepted => {
                    org.world.establish_relation("user", "told", &fact);
                    if !org.metacognition.resolve_gaps(&fact).is_empty() {
                        org.motivation.satisfy(DriveKind::Curiosity);
                    }
                    if let Some(known) = conflict {
                        tracing::info!("New fact {:?} contradicts {:?}", fact, known);
                        org.metacognition.doubt_at(&known, &fact, now);
                        org.motivation.detect_anomaly(&fact, true, now);
                    }
                    draft.learned(fact);
                }
                rejected => tracing::debug!("Fact {:?} not stored: {:?}", fact, rejected),
            }
        }
        for lesson in decode_lessons(reflection) {
            if org.timeline.record_lesson(&lesson) {
                tracing::info!("Lesson learned: {}", lesson);
            }
        }
    }

    async fn say(&self, utterance: Utterance) {
        if let Err(e) = self.expression.speak(&utterance).await {
            tracing::warn!("Expression sink failed: {:#}", e);
        }
    }
}
