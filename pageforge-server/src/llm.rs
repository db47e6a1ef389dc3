//! Claude API client used as the code generator.
//!
//! The pipeline only needs single-turn text completion, so the client sends
//! one user message and concatenates the text blocks of the reply.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, BuildResult};

/// Opening fence the model wraps HTML answers in.
pub const FENCE_OPEN: &str = "```html";
/// Closing fence.
pub const FENCE_CLOSE: &str = "```";

/// Anything that turns a prompt into generated source text.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> BuildResult<String>;
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Response from Claude API.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl ApiResponse {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

const SYSTEM_PROMPT: &str = "You are an expert front-end engineer. \
You answer with a single complete HTML document and nothing else.";

/// Claude API client.
pub struct LlmClient {
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            max_tokens: 8192,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Simple single-turn text completion.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": &self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to call Claude API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Claude API error {status}: {body}");
        }

        let parsed = resp
            .json::<ApiResponse>()
            .await
            .context("Failed to parse Claude response")?;
        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                model = %self.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = parsed.stop_reason.as_deref().unwrap_or("-"),
                "Claude completion"
            );
        }
        Ok(parsed.text())
    }
}

#[async_trait]
impl CodeGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> BuildResult<String> {
        let text = self
            .complete(SYSTEM_PROMPT, prompt)
            .await
            .map_err(|e| BuildError::Generation(format!("{e:#}")))?;
        if text.trim().is_empty() {
            return Err(BuildError::Generation("empty completion".to_string()));
        }
        Ok(text)
    }
}

/// Remove the code fence the model wraps its answer in.
///
/// Only applies when the text starts with the literal opening fence; the
/// closing fence is removed together with any whitespace trailing it.
/// Anything else comes back untouched.
pub fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix(FENCE_OPEN) else {
        return text;
    };
    inner
        .trim_end()
        .strip_suffix(FENCE_CLOSE)
        .unwrap_or(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_html() {
        let raw = "```html\n<!DOCTYPE html>\n<p>hi</p>\n```";
        assert_eq!(strip_code_fence(raw), "\n<!DOCTYPE html>\n<p>hi</p>\n");
    }

    #[test]
    fn strips_closing_fence_followed_by_newline() {
        let raw = "```html\n<p>x</p>\n```\n";
        assert_eq!(strip_code_fence(raw), "\n<p>x</p>\n");
    }

    #[test]
    fn opening_fence_without_closing_keeps_rest() {
        let raw = "```html\n<p>cut off";
        assert_eq!(strip_code_fence(raw), "\n<p>cut off");
    }

    #[test]
    fn unfenced_passes_through_unchanged() {
        for raw in [
            "<!DOCTYPE html><p>```</p>",
            "  ```html\n<p>leading space</p>\n```",
            "```\n<p>plain fence</p>\n```",
            "",
        ] {
            assert_eq!(strip_code_fence(raw).as_bytes(), raw.as_bytes());
        }
    }

    #[test]
    fn response_text_skips_non_text_blocks() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"a"},{"type":"thinking","thinking":"x"},{"type":"text","text":"b"}],
                "stop_reason":"end_turn","usage":{"input_tokens":1,"output_tokens":2}}"#,
        )
        .unwrap();
        assert_eq!(resp.text(), "ab");
    }
}
