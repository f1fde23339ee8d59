use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CallsightError, Result};
use crate::features::TranscriptFeatures;

/// Scalar features derived from one processing pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallFeatures {
  /// Share of spoken words attributed to the agent, in `[0, 1]`
  pub talk_ratio: f32,
  /// Signed classifier confidence, in `[-1, 1]`
  pub sentiment: f32,
}

/// A stored call transcript together with its derived features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub agent_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub customer_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration_seconds: Option<u32>,
  #[serde(default = "default_language")]
  pub language: String,
  pub text: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub features: Option<CallFeatures>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub embedding: Option<Vec<f32>>,
}

fn default_language() -> String {
  "en".to_string()
}

impl TranscriptRecord {
  pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      agent_id: None,
      customer_id: None,
      started_at: None,
      duration_seconds: None,
      language: default_language(),
      text: text.into(),
      features: None,
      embedding: None,
    }
  }

  pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
    self.agent_id = Some(agent_id.into());
    self
  }

  pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
    self.embedding = Some(embedding);
    self
  }

  pub fn has_embedding(&self) -> bool {
    self.embedding.is_some()
  }

  /// Overwrite talk ratio, sentiment and embedding with the output of a pass.
  pub fn apply_features(&mut self, features: TranscriptFeatures) {
    self.features = Some(CallFeatures {
      talk_ratio: features.talk_ratio,
      sentiment: features.sentiment,
    });
    self.embedding = features.embedding;
  }

  /// The embedding, or `NotFound` when the call has not been embedded yet.
  pub fn require_embedding(&self) -> Result<&[f32]> {
    self.embedding.as_deref().ok_or_else(|| CallsightError::not_found(&self.id))
  }
}

/// Incoming call as accepted by `ingest`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCall {
  #[serde(default, alias = "call_id")]
  pub id: Option<String>,
  #[serde(default)]
  pub agent_id: Option<String>,
  #[serde(default)]
  pub customer_id: Option<String>,
  #[serde(default, alias = "start_time")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub duration_seconds: Option<u32>,
  #[serde(default = "default_language")]
  pub language: String,
  #[serde(alias = "transcript")]
  pub text: String,
}

impl From<NewCall> for TranscriptRecord {
  fn from(call: NewCall) -> Self {
    Self {
      id: call.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
      agent_id: call.agent_id,
      customer_id: call.customer_id,
      started_at: call.started_at,
      duration_seconds: call.duration_seconds,
      language: call.language,
      text: call.text,
      features: None,
      embedding: None,
    }
  }
}
