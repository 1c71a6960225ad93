//! Offline reasoners: a deterministic mock for running without a model, and
//! a scripted one that replays queued answers for tests.

use anima_core::{Reasoner, ReasonerError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct MockReasoner {
    model: String,
}

impl MockReasoner {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn respond(
        &self,
        _role: &str,
        _context: &str,
        user_text: &str,
        _temperature: f32,
    ) -> Result<String, ReasonerError> {
        let head: String = user_text.chars().take(80).collect();
        Ok(format!("(Mock {} response) I heard: {}", self.model, head))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// One recorded call to a [`ScriptedReasoner`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCall {
    pub role: String,
    pub context: String,
    pub user_text: String,
    pub temperature: f32,
}

/// Returns queued answers in order; once the queue runs dry every call fails
/// with [`ReasonerError::Empty`].
pub struct ScriptedReasoner {
    responses: Mutex<VecDeque<Result<String, ReasonerError>>>,
    calls: Mutex<Vec<ScriptedCall>>,
    call_count: AtomicUsize,
}

impl ScriptedReasoner {
    pub fn new(responses: Vec<Result<String, ReasonerError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Every answer succeeds with the given text.
    pub fn with_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn push(&self, response: Result<String, ReasonerError>) {
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<ScriptedCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn respond(
        &self,
        role: &str,
        context: &str,
        user_text: &str,
        temperature: f32,
    ) -> Result<String, ReasonerError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(ScriptedCall {
                role: role.to_string(),
                context: context.to_string(),
                user_text: user_text.to_string(),
                temperature,
            });
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or(Err(ReasonerError::Empty))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
