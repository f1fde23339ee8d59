//! Chat-completions client for coaching nudges
//!
//! A thin reqwest wrapper around an OpenAI-compatible `/chat/completions`
//! endpoint. It requests a JSON-object response and returns the raw message
//! content; validating the shape of that content is the coaching module's job.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::GenerativeClient;
use crate::config::CoachingConfig;

/// Longest slice of an error body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")]
  kind: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
  message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
  #[serde(default)]
  content: Option<String>,
}

pub struct OpenAiClient {
  client: Client,
  base_url: String,
  model: String,
  api_key: String,
}

impl OpenAiClient {
  /// Build a client from configuration; fails when no API key is configured.
  pub fn from_config(config: &CoachingConfig) -> Result<Self> {
    let api_key = config
      .api_key
      .as_deref()
      .map(str::trim)
      .filter(|key| !key.is_empty())
      .ok_or_else(|| anyhow!("OPENAI_API_KEY not set"))?
      .to_string();

    let client = Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_string(),
      model: config.model.clone(),
      api_key,
    })
  }

  fn endpoint(&self) -> String {
    format!("{}/chat/completions", self.base_url)
  }
}

#[async_trait]
impl GenerativeClient for OpenAiClient {
  async fn complete_json(&self, prompt: &str) -> Result<String> {
    let request = ChatRequest {
      model: &self.model,
      messages: vec![ChatMessage { role: "user", content: prompt }],
      response_format: ResponseFormat { kind: "json_object" },
    };

    let response =
      self.client.post(self.endpoint()).bearer_auth(&self.api_key).json(&request).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
      bail!("chat completion returned {status}: {excerpt}");
    }

    let body: ChatResponse = response.json().await?;
    first_message_content(body)
  }
}

pub(crate) fn first_message_content(response: ChatResponse) -> Result<String> {
  response
    .choices
    .into_iter()
    .next()
    .and_then(|choice| choice.message.content)
    .filter(|content| !content.trim().is_empty())
    .ok_or_else(|| anyhow!("chat completion contained no message content"))
}
