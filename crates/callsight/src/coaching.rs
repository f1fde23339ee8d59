//! Coaching nudges for a call transcript
//!
//! The remote model is asked for a JSON object of the form
//! `{"nudges": ["...", "...", "..."]}`. Anything else (a bare array, missing key,
//! non-string items, more than three items) is rejected by [`parse_nudges`].
//! When no generative client is configured the advisor answers with
//! [`FALLBACK_TIPS`]; when the remote call times out or fails it reports a
//! single error line instead of raising.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CoachingConfig;
use crate::error::{CallsightError, Result};
use crate::features::truncate_chars;
use crate::models::{ModelHandle, ModelRegistry};

/// Tips returned whenever the generative model is not configured
pub const FALLBACK_TIPS: [&str; 3] = [
  "Remember to actively listen.",
  "Try to build more rapport.",
  "Summarize the call at the end.",
];

pub const MAX_NUDGES: usize = 3;

/// Longer tips are cut to this many words
pub const MAX_TIP_WORDS: usize = 40;

const ERROR_PREFIX: &str = "Error generating nudge";

pub fn fallback_tips() -> Vec<String> {
  FALLBACK_TIPS.iter().map(|tip| tip.to_string()).collect()
}

pub fn build_prompt(transcript: &str, max_chars: usize) -> String {
  let excerpt = truncate_chars(transcript, max_chars);
  format!(
    "You are coaching a sales agent. Read the call transcript below and give exactly \
     {MAX_NUDGES} short, distinct, actionable coaching tips of at most {MAX_TIP_WORDS} words \
     each. Respond with a JSON object of the form {{\"nudges\": [\"tip 1\", \"tip 2\", \
     \"tip 3\"]}} and nothing else.\n\nTranscript:\n{excerpt}"
  )
}

#[derive(Debug, Deserialize)]
struct NudgeResponse {
  nudges: Vec<String>,
}

fn limit_words(tip: &str) -> String {
  let words: Vec<&str> = tip.split_whitespace().collect();
  if words.len() <= MAX_TIP_WORDS {
    return words.join(" ");
  }
  words[..MAX_TIP_WORDS].join(" ")
}

/// Validate a raw model response into one to three non-empty tips.
pub fn parse_nudges(raw: &str) -> Result<Vec<String>> {
  let response: NudgeResponse = serde_json::from_str(raw.trim())
    .map_err(|e| CallsightError::RemoteCallFailure(format!("malformed nudge response: {e}")))?;

  let nudges: Vec<String> = response
    .nudges
    .iter()
    .map(|tip| limit_words(tip))
    .filter(|tip| !tip.is_empty())
    .collect();

  if nudges.is_empty() {
    return Err(CallsightError::RemoteCallFailure("response contained no nudges".into()));
  }
  if nudges.len() > MAX_NUDGES {
    return Err(CallsightError::RemoteCallFailure(format!(
      "expected at most {MAX_NUDGES} nudges, got {}",
      nudges.len()
    )));
  }
  Ok(nudges)
}

/// Result of one coaching attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CoachingOutcome {
  /// Tips produced by the remote model
  Generated(Vec<String>),
  /// No generative client configured
  Fallback,
  /// The remote call was attempted and failed
  Failed(String),
}

impl CoachingOutcome {
  /// Tips as returned by `advise`: failures become a single error line.
  pub fn into_tips(self) -> Vec<String> {
    match self {
      CoachingOutcome::Generated(tips) => tips,
      CoachingOutcome::Fallback => fallback_tips(),
      CoachingOutcome::Failed(reason) => vec![format!("{ERROR_PREFIX}: {reason}")],
    }
  }

  /// Tips for a recommendation, where a failed call degrades to the fallback set.
  pub fn into_tips_or_fallback(self) -> Vec<String> {
    match self {
      CoachingOutcome::Failed(_) => fallback_tips(),
      other => other.into_tips(),
    }
  }
}

#[derive(Clone)]
pub struct CoachingAdvisor {
  registry: Arc<ModelRegistry>,
  max_excerpt_chars: usize,
  timeout: Duration,
}

impl CoachingAdvisor {
  pub fn new(registry: Arc<ModelRegistry>, config: &CoachingConfig) -> Self {
    Self { registry, max_excerpt_chars: config.max_excerpt_chars, timeout: config.timeout() }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Ask the generative model for tips; never fails.
  ///
  /// The call is bounded by the configured timeout, and dropping the returned
  /// future abandons the request.
  pub async fn coach(&self, transcript: &str) -> CoachingOutcome {
    let client = match self.registry.generative().await {
      ModelHandle::Ready(client) => client,
      ModelHandle::Unavailable(reason) => {
        let e = CallsightError::ServiceUnavailable(reason);
        tracing::warn!(error = %e, "returning fallback coaching tips");
        return CoachingOutcome::Fallback;
      }
    };

    let prompt = build_prompt(transcript, self.max_excerpt_chars);
    let result = match tokio::time::timeout(self.timeout, client.complete_json(&prompt)).await {
      Ok(Ok(raw)) => parse_nudges(&raw),
      Ok(Err(e)) => Err(CallsightError::RemoteCallFailure(e.to_string())),
      Err(_) => Err(CallsightError::RemoteCallFailure(format!(
        "no response within {}s",
        self.timeout.as_secs_f32()
      ))),
    };

    match result {
      Ok(tips) => {
        tracing::debug!(count = tips.len(), "coaching tips generated");
        CoachingOutcome::Generated(tips)
      }
      Err(e) => {
        tracing::error!(error = %e, "coaching call failed");
        CoachingOutcome::Failed(e.to_string())
      }
    }
  }

  /// Coaching tips for a transcript: generated, fallback, or one error line.
  pub async fn advise(&self, transcript: &str) -> Vec<String> {
    self.coach(transcript).await.into_tips()
  }
}
