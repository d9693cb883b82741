use crate::config::ModelConfig;
use async_trait::async_trait;
use bizflow_core::{BizflowError, BizflowResult};
use serde::Serialize;

/// A single-turn text completion backend.
///
/// Planner and agents only ever send one user message with an optional
/// system prompt, so the interface stays that narrow.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> BizflowResult<String>;
}

/// Claude (Anthropic) Messages API backend.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> BizflowResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [ClaudeMessage { role: "user", content: prompt }],
        });

        if let Some(sys) = system_prompt {
            body["system"] = serde_json::json!(sys);
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BizflowError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BizflowError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(BizflowError::Http(format!(
                "Claude API error {status}: {resp_body}"
            )));
        }

        parse_claude_text(&resp_body)
    }
}

/// Concatenate the text blocks of a Messages API response.
pub fn parse_claude_text(body: &serde_json::Value) -> BizflowResult<String> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| BizflowError::Agent("Missing content in Claude response".into()))?;

    let text_parts: Vec<&str> = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect();

    if text_parts.is_empty() {
        return Err(BizflowError::Agent(
            "Claude response contained no text".into(),
        ));
    }
    Ok(text_parts.join("\n"))
}
