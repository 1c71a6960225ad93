//! Integration tests for the ControlLoop.
//!
//! A ScriptedReasoner replays canned answers so every exchange is
//! deterministic, and a capturing Expression records what the agent said.

use anima_core::{
    ActionKind, AnimaConfig, Expression, JsonFileStore, MemoryStore, ReasonerError, Utterance,
    UtteranceKind,
};
use anima_limbic::EmotionKind;
use anima_memory::{DriveKind, EventKind};
use anima_reasoning::arbiter::CRITICAL_SLEEP;
use anima_reasoning::control_loop::FALLBACK_NOTICE;
use anima_reasoning::prompts::{FORECAST_ROLE, PERSONA_ROLE, SIMULATION_ROLE};
use anima_reasoning::{ControlLoop, Organism, ScriptedReasoner, TickOutcome};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ============================================================================
// Harness
// ============================================================================

#[derive(Default)]
struct CaptureExpression {
    said: Mutex<Vec<Utterance>>,
}

impl CaptureExpression {
    fn said(&self) -> Vec<Utterance> {
        self.said.lock().unwrap().clone()
    }

    fn last(&self) -> Utterance {
        self.said().last().cloned().expect("nothing was said")
    }
}

#[async_trait]
impl Expression for CaptureExpression {
    async fn speak(&self, utterance: &Utterance) -> anyhow::Result<()> {
        self.said.lock().unwrap().push(utterance.clone());
        Ok(())
    }
}

struct Harness {
    ctl: ControlLoop,
    reasoner: Arc<ScriptedReasoner>,
    out: Arc<CaptureExpression>,
    store: MemoryStore,
}

fn harness_with(responses: Vec<Result<String, ReasonerError>>, config: AnimaConfig) -> Harness {
    let store = MemoryStore::new();
    let reasoner = Arc::new(ScriptedReasoner::new(responses));
    let out = Arc::new(CaptureExpression::default());
    let organism = Organism::open(Arc::new(store.clone()), &config);
    let ctl = ControlLoop::new(organism, reasoner.clone(), out.clone(), &config, Utc::now()).with_seed(7);
    Harness { ctl, reasoner, out, store }
}

fn harness(texts: &[&str]) -> Harness {
    harness_with(
        texts.iter().map(|t| Ok(t.to_string())).collect(),
        AnimaConfig::default(),
    )
}

fn drain_to_critical(ctl: &mut ControlLoop) {
    for _ in 0..45 {
        ctl.organism_mut().state.apply_action(ActionKind::Talk);
    }
    assert_eq!(ctl.organism().state.vitality(), 10.0);
}

// ============================================================================
// Interaction
// ============================================================================

#[tokio::test]
async fn test_conversation_learns_a_fact() {
    let mut h = harness(&["Pizza is great!", "They love food.\nFACT: User likes pizza"]);
    let now = Utc::now();

    let ep = h.ctl.interact("I like pizza, do you?", now).await;

    assert!(ep.success);
    assert_eq!(ep.reply, "Pizza is great!");
    assert_eq!(ep.facts_learned, vec!["User likes pizza"]);
    assert_eq!(ep.vitality_before, 100.0);
    assert_eq!(ep.vitality_after, 98.0);
    assert_eq!(ep.state_desc, "NEUTRAL");

    let org = h.ctl.organism();
    assert_eq!(org.state.facts().len(), 1);
    assert_eq!(org.episodes.len(), 1);
    assert!(org.emotions.intensity_of(EmotionKind::Curious, now) > 0.0);
    let user = org.world.entity("user").unwrap();
    assert_eq!(user.relations["told"], vec!["User likes pizza"]);
    assert_eq!(org.timeline.events().last().unwrap().kind, EventKind::Interaction);

    assert_eq!(h.out.said(), vec![Utterance::reply("Pizza is great!")]);

    let calls = h.reasoner.recorded();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].role, PERSONA_ROLE);
    assert_eq!(calls[0].user_text, "I like pizza, do you?");
    assert!(calls[0].context.contains("CURRENT STATUS"));
    assert!(calls[0].context.contains("You are NEUTRAL"));
    assert!((calls[0].temperature - 0.7).abs() < f32::EPSILON);
    assert!((calls[1].temperature - 0.3).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_known_facts_are_not_relearned() {
    let mut h = harness(&[
        "Nice.",
        "FACT: User likes pizza",
        "Again?",
        "FACT: User likes pizza\nFACT: I enjoy pizza",
    ]);
    let now = Utc::now();
    h.ctl.interact("I like pizza", now).await;
    let second = h.ctl.interact("I really enjoy pizza", now).await;

    assert!(second.facts_learned.is_empty());
    assert_eq!(h.ctl.organism().state.facts().len(), 1);
}

#[tokio::test]
async fn test_relevant_facts_reach_the_context() {
    let mut h = harness(&["Noted.", "FACT: User lives in Lisbon", "Sunny there?", ""]);
    let now = Utc::now();
    h.ctl.interact("I moved to Lisbon", now).await;
    h.ctl.interact("How is the weather in Lisbon", now).await;

    let calls = h.reasoner.recorded();
    assert!(calls[2].context.contains("- User lives in Lisbon"));
}

#[tokio::test]
async fn test_reasoner_failure_still_closes_the_episode() {
    let mut h = harness_with(
        vec![Err(ReasonerError::transport("connection refused"))],
        AnimaConfig::default(),
    );
    let now = Utc::now();

    let ep = h.ctl.interact("hello there", now).await;

    assert!(!ep.success);
    assert!(ep.reply.is_empty());
    assert_eq!(ep.vitality_after, 98.0);
    assert_eq!(h.reasoner.calls(), 1);
    assert_eq!(h.out.last(), Utterance::notice(FALLBACK_NOTICE));

    let org = h.ctl.organism();
    assert_eq!(org.episodes.len(), 1);
    assert!(org.emotions.intensity_of(EmotionKind::Confused, now) > 0.0);
}

#[tokio::test]
async fn test_failed_reflection_learns_nothing() {
    let mut h = harness_with(
        vec![Ok("Hi!".into()), Err(ReasonerError::Timeout(std::time::Duration::from_secs(60)))],
        AnimaConfig::default(),
    );
    let ep = h.ctl.interact("My name is Sam", Utc::now()).await;
    assert!(ep.success);
    assert!(ep.reflection.is_empty());
    assert!(ep.facts_learned.is_empty());
}

#[tokio::test]
async fn test_lessons_from_reflection_are_kept() {
    let mut h = harness(&["Sorry.", "LESSON: Keep answers short when the user is busy"]);
    h.ctl.interact("I'm busy, be quick", Utc::now()).await;
    assert_eq!(
        h.ctl.organism().timeline.lessons().to_vec(),
        vec!["Keep answers short when the user is busy".to_string()]
    );
}

#[tokio::test]
async fn test_forecast_when_enabled() {
    let mut config = AnimaConfig::default();
    config.organism.forecast = true;
    let mut h = harness_with(
        vec![
            Ok("Pizza it is.".into()),
            Ok("Nothing new.".into()),
            Ok(r#"[{"prediction": "User orders pizza", "confidence": 0.6}]"#.into()),
        ],
        config,
    );
    h.ctl.interact("Dinner ideas?", Utc::now()).await;

    let world = &h.ctl.organism().world;
    assert_eq!(world.predictions().len(), 1);
    assert_eq!(world.predictions()[0].text, "User orders pizza");
    assert_eq!(world.predictions()[0].cue, "Dinner ideas?");
    assert_eq!(h.reasoner.calls(), 3);
}

fn forecasting(responses: &[&str]) -> Harness {
    let mut config = AnimaConfig::default();
    config.organism.forecast = true;
    harness_with(responses.iter().map(|t| Ok(t.to_string())).collect(), config)
}

#[tokio::test]
async fn test_confirmed_prediction_informs_the_next_forecast() {
    let mut h = forecasting(&[
        "Yum.",
        "Nothing new.",
        r#"[{"prediction": "User asks for a pasta recipe", "confidence": 0.6}]"#,
        "Sure.",
        "Nothing new.",
        "Nothing to predict.",
        "Lovely.",
        "Nothing new.",
        "Nothing to predict.",
    ]);
    let now = Utc::now();
    h.ctl.interact("I love cooking pasta", now).await;
    h.ctl.interact("Can I get a pasta recipe?", now).await;

    let world = &h.ctl.organism().world;
    assert_eq!(world.prediction_accuracy(), 1.0);
    assert_eq!(world.causal_rules().len(), 1);
    assert_eq!(world.causal_rules()[0].condition, "I love cooking pasta");
    assert!(world.consequences()[0].was_predicted);

    h.ctl.interact("I love cooking risotto", now).await;

    let calls = h.reasoner.recorded();
    assert_eq!(calls.len(), 9);
    assert_eq!(calls[5].role, FORECAST_ROLE);
    assert!(calls[5].user_text.contains("No specific patterns learned"));
    assert_eq!(calls[8].role, FORECAST_ROLE);
    assert!(calls[8]
        .user_text
        .contains("If I love cooking pasta, then User asks for a pasta recipe"));
}

#[tokio::test]
async fn test_missed_prediction_feeds_the_competence_drive() {
    let mut h = forecasting(&[
        "Pizza it is.",
        "Nothing new.",
        r#"[{"prediction": "User orders pizza", "confidence": 0.6}]"#,
        "Good night.",
        "Nothing new.",
        "Nothing to predict.",
        "IMPROVE_PREDICTIONS",
    ]);
    let now = Utc::now();
    h.ctl.interact("Dinner ideas?", now).await;
    h.ctl.interact("Actually I am going to bed", now).await;

    let org = h.ctl.organism();
    assert_eq!(org.world.prediction_accuracy(), 0.0);
    assert_eq!(org.metacognition.learning_history().len(), 1);
    assert_eq!(org.metacognition.learning_history()[0].error, "Expected: User orders pizza");
    assert_eq!(org.metacognition.top_gaps(5), vec!["Dinner ideas?"]);
    assert_eq!(org.metacognition.uncertainties()[0].statement, "User orders pizza");
    assert!(org.metacognition.should_verify("pizza"));

    h.ctl.goal_check_with_draw(now, 0.99).await;

    let calls = h.reasoner.recorded();
    assert_eq!(calls.len(), 7);
    assert!(calls[6].user_text.contains("Inner drive: Improve predictions (80%)"));
    let org = h.ctl.organism();
    assert_eq!(org.goals.top().unwrap().name, "IMPROVE_PREDICTIONS");
    let competence = org
        .motivation
        .drives()
        .find(|d| d.kind == DriveKind::Competence)
        .unwrap();
    assert_eq!(competence.satisfaction, 0.5);
    assert!(h.out.said().iter().all(|u| u.kind != UtteranceKind::Autonomous));
}

#[tokio::test]
async fn test_answered_gap_satisfies_curiosity() {
    let mut h = harness(&[
        "I don't know yet.",
        "Nothing new.",
        "IDLE",
        "Cool!",
        "FACT: User works at a bakery",
    ]);
    let now = Utc::now();
    h.ctl.interact("Where do I work?", now).await;
    assert!(h.reasoner.recorded()[0]
        .context
        .contains("CONFIDENCE: I'm essentially guessing about this"));
    assert_eq!(h.ctl.organism().metacognition.knowledge_gaps().len(), 1);

    h.ctl.goal_check_with_draw(now, 0.99).await;
    h.ctl.interact("I work at a bakery", now).await;

    let org = h.ctl.organism();
    assert!(org.metacognition.knowledge_gaps().is_empty());
    let curiosity = org
        .motivation
        .drives()
        .find(|d| d.kind == DriveKind::Curiosity)
        .unwrap();
    assert_eq!(curiosity.trigger, "Gap: Where do I work?");
    assert_eq!(curiosity.satisfaction, 0.5);
}

#[tokio::test]
async fn test_contradicting_fact_is_doubted() {
    let mut h = harness(&["Nice.", "FACT: User likes coffee", "Oh?", "FACT: User hates coffee"]);
    let now = Utc::now();
    h.ctl.interact("Coffee is my thing", now).await;
    h.ctl.interact("Coffee makes me sick now", now).await;

    let org = h.ctl.organism();
    assert_eq!(org.state.facts().len(), 2);
    let doubt = &org.metacognition.uncertainties()[0];
    assert_eq!(doubt.statement, "User likes coffee");
    assert_eq!(doubt.contradictions, vec!["User hates coffee"]);
    assert!(org.metacognition.should_verify("coffee"));
    assert_eq!(org.motivation.state().strongest, Some(DriveKind::Autonomy));
}

// ============================================================================
// Commands and ticks
// ============================================================================

#[tokio::test]
async fn test_input_commands() {
    let mut h = harness(&[]);
    let now = Utc::now();
    h.ctl.organism_mut().state.apply_action(ActionKind::Talk);

    assert_eq!(h.ctl.handle_input("   ", now).await, TickOutcome::Continue);
    assert!(h.out.said().is_empty());

    assert_eq!(h.ctl.handle_input("SLEEP", now).await, TickOutcome::Continue);
    assert_eq!(h.ctl.organism().state.vitality(), 100.0);
    assert_eq!(h.out.last().kind, UtteranceKind::Notice);

    assert_eq!(h.ctl.handle_input("Quit", now).await, TickOutcome::Shutdown);
    assert_eq!(h.ctl.organism().episodes.len(), 0);
    assert_eq!(h.reasoner.calls(), 0);
}

#[tokio::test]
async fn test_rest_teaches_a_rule() {
    let mut h = harness(&[]);
    let now = Utc::now();
    h.ctl.handle_input("sleep", now).await;
    h.ctl.handle_input("sleep", now).await;

    let world = &h.ctl.organism().world;
    assert_eq!(world.causal_rules().len(), 1);
    let rule = &world.causal_rules()[0];
    assert_eq!(rule.condition, "I rest");
    assert_eq!(rule.times_observed, 2);
    assert_eq!(world.entity("self").unwrap().properties["vitality"], 100.0);
}

#[tokio::test]
async fn test_tick_drains_one_line_at_a_time() {
    let mut h = harness(&["Hello!", "Nothing to note."]);
    let (tx, mut rx) = mpsc::channel(4);
    tx.send("hello".to_string()).await.unwrap();
    tx.send("exit".to_string()).await.unwrap();
    let now = Utc::now();

    assert_eq!(h.ctl.tick_at(now, &mut rx).await, TickOutcome::Continue);
    assert_eq!(h.ctl.organism().episodes.len(), 1);
    assert_eq!(h.ctl.tick_at(now, &mut rx).await, TickOutcome::Shutdown);
}

#[tokio::test]
async fn test_empty_queue_continues_and_closed_queue_stops() {
    let mut h = harness(&[]);
    let (tx, mut rx) = mpsc::channel::<String>(4);
    assert_eq!(h.ctl.tick_at(Utc::now(), &mut rx).await, TickOutcome::Continue);
    drop(tx);
    assert_eq!(h.ctl.tick_at(Utc::now(), &mut rx).await, TickOutcome::Shutdown);
}

#[tokio::test]
async fn test_rhythms_fire_on_schedule() {
    let config = AnimaConfig::default();
    let store = MemoryStore::new();
    let reasoner = Arc::new(ScriptedReasoner::with_texts(&["IDLE"]));
    let out = Arc::new(CaptureExpression::default());
    let start = Utc::now();
    let organism = Organism::open(Arc::new(store), &config);
    let mut ctl = ControlLoop::new(organism, reasoner.clone(), out, &config, start);
    let (_tx, mut rx) = mpsc::channel::<String>(4);

    ctl.tick_at(start + Duration::seconds(5), &mut rx).await;
    assert_eq!(ctl.organism().state.vitality(), 100.0);

    ctl.tick_at(start + Duration::seconds(11), &mut rx).await;
    assert!((ctl.organism().state.vitality() - 99.8).abs() < 1e-9);
    assert_eq!(reasoner.calls(), 0);

    ctl.tick_at(start + Duration::seconds(31), &mut rx).await;
    assert!((ctl.organism().state.vitality() - 99.6).abs() < 1e-9);
    assert_eq!(reasoner.calls(), 1);
    assert!(ctl.organism().goals.is_empty());
}

// ============================================================================
// Goals and introspection
// ============================================================================

#[tokio::test]
async fn test_critical_vitality_forces_a_rest_cycle() {
    let mut h = harness(&[]);
    drain_to_critical(&mut h.ctl);
    let now = Utc::now();

    h.ctl.goal_check_with_draw(now, 0.0).await;

    let org = h.ctl.organism();
    assert_eq!(org.state.vitality(), 100.0);
    assert_eq!(org.state.mood(), 50.0);
    assert!(org.goals.is_empty());
    assert_eq!(org.goals.history().back().unwrap().name, CRITICAL_SLEEP);
    assert!(org.emotions.intensity_of(EmotionKind::Satisfied, now) > 0.0);
    assert_eq!(org.timeline.events().last().unwrap().kind, EventKind::Rest);
    assert!(h.out.last().text.contains("Vitality restored"));
    assert_eq!(h.reasoner.calls(), 0);
}

#[tokio::test]
async fn test_unlucky_draw_leaves_critical_goal_pending() {
    let mut h = harness(&[]);
    drain_to_critical(&mut h.ctl);

    h.ctl.goal_check_with_draw(Utc::now(), 0.95).await;

    let org = h.ctl.organism();
    assert_eq!(org.state.vitality(), 10.0);
    assert_eq!(org.goals.top().unwrap().name, CRITICAL_SLEEP);
    assert!(h.out.said().is_empty());

    // A manual rest completes the pending goal too.
    h.ctl.handle_input("sleep", Utc::now()).await;
    assert!(h.ctl.organism().goals.is_empty());
}

#[tokio::test]
async fn test_reasoned_goal_is_spoken_on_a_lucky_draw() {
    let mut h = harness(&["EXPRESS_JOY", "What a lovely day!"]);
    h.ctl.goal_check_with_draw(Utc::now(), 0.01).await;

    assert_eq!(h.ctl.organism().goals.top().unwrap().name, "EXPRESS_JOY");
    assert_eq!(h.out.last(), Utterance::autonomous("What a lovely day!"));
    assert_eq!(h.ctl.organism().timeline.events().last().unwrap().kind, EventKind::Goal);
}

#[tokio::test]
async fn test_simulation_can_hold_back_a_goal() {
    let mut h = forecasting(&[
        "SEEK_ATTENTION",
        r#"{"immediate": "User feels interrupted", "recommendation": "avoid_it", "confidence": 0.8}"#,
    ]);
    h.ctl.goal_check_with_draw(Utc::now(), 0.01).await;

    assert!(h.out.said().is_empty());
    let calls = h.reasoner.recorded();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].role, SIMULATION_ROLE);
    assert!(calls[1].user_text.contains("I act on SEEK_ATTENTION"));

    let org = h.ctl.organism();
    assert_eq!(org.goals.top().unwrap().name, "SEEK_ATTENTION");
    let rule = &org.world.causal_rules()[0];
    assert_eq!(rule.condition, "I act on SEEK_ATTENTION");
    assert_eq!(rule.consequence, "User feels interrupted");
}

#[tokio::test]
async fn test_favourable_simulation_lets_the_goal_speak() {
    let mut h = forecasting(&[
        "EXPRESS_JOY",
        r#"{"immediate": "User smiles", "recommendation": "do_it", "confidence": 0.9}"#,
        "What a lovely day!",
    ]);
    h.ctl.goal_check_with_draw(Utc::now(), 0.01).await;
    assert_eq!(h.out.last(), Utterance::autonomous("What a lovely day!"));
    assert!(h.ctl.organism().world.causal_rules().is_empty());
}

#[tokio::test]
async fn test_identity_shift_is_surfaced() {
    let mut h = harness(&[
        "I am calm.",
        "I believe I am turning into something restless, loud and entirely unfamiliar.",
    ]);
    let now = Utc::now();
    h.ctl.introspect(now).await;
    assert!(h.out.said().is_empty());

    h.ctl.introspect(now).await;
    let notice = h.out.last();
    assert_eq!(notice.kind, UtteranceKind::Notice);
    assert!(notice.text.contains("identity drift"));

    let org = h.ctl.organism();
    assert_eq!(org.identity.narratives().len(), 2);
    let kinds: Vec<_> = org.timeline.events().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Introspection, EventKind::IdentityShift]);
}

// ============================================================================
// Persistence and the run loop
// ============================================================================

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnimaConfig::default();
    {
        let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
        let reasoner = Arc::new(ScriptedReasoner::with_texts(&["Hi Sam!", "FACT: User is called Sam"]));
        let organism = Organism::open(store, &config);
        let mut ctl = ControlLoop::new(
            organism,
            reasoner,
            Arc::new(CaptureExpression::default()),
            &config,
            Utc::now(),
        );
        ctl.interact("My name is Sam", Utc::now()).await;
        ctl.shutdown().await;
    }

    assert!(dir.path().join("state.json").exists());
    assert!(dir.path().join("episodes.json").exists());

    let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let restored = Organism::open(store, &config);
    assert_eq!(restored.state.facts()[0].text, "User is called Sam");
    assert_eq!(restored.state.vitality(), 98.0);
    assert_eq!(restored.episodes.len(), 1);
    assert!(restored.world.entity("user").is_some());
}

#[tokio::test]
async fn test_run_until_exit_saves_everything() {
    let config = AnimaConfig::default();
    let h = harness(&["Hello!", "FACT: User likes mornings"]);
    let (tx, rx) = mpsc::channel(4);
    tx.send("good morning".to_string()).await.unwrap();
    tx.send("exit".to_string()).await.unwrap();

    h.ctl.run(rx).await.unwrap();

    assert!(h.out.last().text.contains("Goodbye"));
    let restored = Organism::open(Arc::new(h.store.clone()), &config);
    assert_eq!(restored.episodes.len(), 1);
    assert_eq!(restored.state.facts().len(), 1);
}
