//! Single-shot LLM agent configured by a system prompt.
//!
//! Config keys: `system_prompt`, and optionally `api_key` / `api_base` /
//! `model` to talk to a different endpoint than the shared backend.

use async_trait::async_trait;
use chainlite_core::config::LlmConfig;
use chainlite_core::ChainError;
use std::sync::Arc;

use crate::capability::Agent;
use crate::llm::{ChatBackend, LlmClient};
use crate::loader::AgentInit;
use crate::types::ChatMessage;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

pub struct PromptAgent {
    name: String,
    system_prompt: Option<String>,
    backend: Arc<dyn ChatBackend>,
}

impl PromptAgent {
    pub fn new(name: &str, system_prompt: Option<String>, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            name: name.to_string(),
            system_prompt,
            backend,
        }
    }

    pub fn from_init(init: &AgentInit<'_>) -> Result<Self, ChainError> {
        let backend: Arc<dyn ChatBackend> = match init.config_str("api_key") {
            Some(key) => {
                let base = init.config_str("api_base").unwrap_or(DEFAULT_API_BASE);
                let model = init
                    .config_str("model")
                    .unwrap_or_else(|| LlmConfig::default_model_for_base(base));
                let client = LlmClient::new(base, key, model)
                    .map_err(|e| ChainError::Configuration(format!("{:#}", e)))?;
                Arc::new(client)
            }
            None => init.backend.clone().ok_or_else(|| {
                ChainError::Configuration(format!(
                    "Agent {} needs an LLM: set api_key in its config or configure CHAINLITE_API_KEY",
                    init.name
                ))
            })?,
        };
        Ok(Self::new(
            init.name,
            init.config_str("system_prompt").map(String::from),
            backend,
        ))
    }
}

#[async_trait]
impl Agent for PromptAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ChainError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(input));
        let reply = self
            .backend
            .complete(&messages, None)
            .await
            .map_err(|e| ChainError::Llm(format!("{:#}", e)))?;
        Ok(reply.content.unwrap_or_default().trim().to_string())
    }
}
