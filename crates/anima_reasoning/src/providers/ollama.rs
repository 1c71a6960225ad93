//! Ollama reasoner.
//!
//! Ollama exposes an OpenAI-compatible API at localhost:11434/v1. Each call
//! is a single non-streaming chat completion: the role prompt as the system
//! message, the assembled context as a prior assistant turn, then the user
//! text.

use crate::retry::{with_retry, RetryConfig};
use anima_core::config::ReasonerConfig;
use anima_core::{Reasoner, ReasonerError};
use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct OllamaReasoner {
    client: Client,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl OllamaReasoner {
    pub fn new(config: &ReasonerConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(config.timeout()).build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            retry: RetryConfig::with_retries(config.max_retries),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn build_messages(role: &str, context: &str, user_text: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    if !role.trim().is_empty() {
        messages.push(json!({"role": "system", "content": role}));
    }
    if !context.trim().is_empty() {
        messages.push(json!({
            "role": "assistant",
            "content": format!("My current memory context: {}", context)
        }));
    }
    messages.push(json!({"role": "user", "content": user_text}));
    messages
}

/// Pull the assistant text out of a chat completion body.
pub(crate) fn parse_chat_response(resp_json: &Value) -> Result<String, ReasonerError> {
    let content = resp_json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ReasonerError::Malformed("missing choices[0].message.content".into()))?;
    let content = content.trim();
    if content.is_empty() {
        return Err(ReasonerError::Empty);
    }
    Ok(content.to_string())
}

#[async_trait::async_trait]
impl Reasoner for OllamaReasoner {
    async fn respond(
        &self,
        role: &str,
        context: &str,
        user_text: &str,
        temperature: f32,
    ) -> Result<String, ReasonerError> {
        let payload = json!({
            "model": self.model,
            "messages": build_messages(role, context, user_text),
            "temperature": temperature,
            "stream": false,
        });
        let url = format!("{}/chat/completions", self.base_url);

        let response = with_retry(&self.retry, "Ollama", || async {
            self.client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(ReasonerError::transport)
        })
        .await?;

        let resp_json: Value = response
            .json()
            .await
            .map_err(|e| ReasonerError::Malformed(e.to_string()))?;
        parse_chat_response(&resp_json)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
