//! OpenAI-compatible API implementation.

use anyhow::{Context, Result};
use serde_json::json;

use crate::types::{ChatMessage, ToolDefinition};

use super::{ChatCompletionResponse, LlmClient};

impl LlmClient {
    pub(super) fn openai_request_body(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<serde_json::Value> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });

        if let Some(temp) = self.temperature {
            body["temperature"] = json!(temp);
        }

        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::to_value(tools)?;
            }
        }
        Ok(body)
    }

    pub(super) async fn openai_chat_completion(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.openai_request_body(messages, tools)?;

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("LLM API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, body_text);
        }

        let response: ChatCompletionResponse = resp
            .json()
            .await
            .context("Failed to parse LLM API response")?;

        tracing::debug!(
            model = %response.model,
            tokens = response.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0),
            "chat completion"
        );
        Ok(response)
    }
}
