//! Minimal OpenAI-compatible chat client used for grading.
//!
//! Only chat.completions with a plain-text reply is needed. Any provider that
//! speaks this API (OpenAI, Gemini's OpenAI endpoint, local gateways) works
//! through OPENAI_BASE_URL.
//!
//! NOTE: We never log the API key and keep logged payloads short.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum LlmError {
  #[error(transparent)]
  Http(#[from] reqwest::Error),
  #[error("LLM HTTP {status}: {message}")]
  Status { status: reqwest::StatusCode, message: String },
  #[error("LLM returned an empty completion")]
  Empty,
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  /// Completion cap from OPENAI_MAX_TOKENS; unset leaves it to the provider.
  pub max_tokens: Option<u32>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let timeout = std::env::var("OPENAI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(20);
    let max_tokens = parse_max_tokens(std::env::var("OPENAI_MAX_TOKENS").ok().as_deref());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string(), model, max_tokens })
  }

  /// Plain-text chat completion.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
  pub async fn chat_plain(&self, system: &str, user: &str, temperature: f32) -> Result<String, LlmError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      max_tokens: self.max_tokens,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "assess-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or(body);
      return Err(LlmError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "LLM usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    if text.is_empty() { Err(LlmError::Empty) } else { Ok(text) }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Positive integers only; anything else means no cap.
fn parse_max_tokens(raw: Option<&str>) -> Option<u32> {
  raw.and_then(|s| s.trim().parse::<u32>().ok()).filter(|n| *n > 0)
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
