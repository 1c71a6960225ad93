use anima_core::{Reasoner, ReasonerError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Wraps any reasoner with a hard deadline.
///
/// An expired call is reported as [`ReasonerError::Timeout`] and the
/// in-flight request is dropped. Blank answers become [`ReasonerError::Empty`]
/// so callers only ever see usable text on `Ok`.
pub struct BoundedReasoner {
    inner: Arc<dyn Reasoner>,
    timeout: Duration,
}

impl BoundedReasoner {
    pub fn new(inner: Arc<dyn Reasoner>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Reasoner for BoundedReasoner {
    async fn respond(
        &self,
        role: &str,
        context: &str,
        user_text: &str,
        temperature: f32,
    ) -> Result<String, ReasonerError> {
        let call = self.inner.respond(role, context, user_text, temperature);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(ReasonerError::Empty),
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "{} did not answer within {:?}",
                    self.inner.name(),
                    self.timeout
                );
                Err(ReasonerError::Timeout(self.timeout))
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
