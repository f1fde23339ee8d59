//! Transcript feature extraction
//!
//! Turns raw transcript text into the three signals stored per call: the
//! agent's share of spoken words, a signed sentiment score and an embedding.
//! Extraction fails soft: model errors are logged and mapped to a neutral
//! sentiment or an absent embedding so one bad transcript never aborts a batch.

use serde::Serialize;
use std::sync::Arc;

use crate::error::CallsightError;
use crate::models::{ModelHandle, ModelRegistry, Polarity, SentimentClassifier, TextEncoder};

/// Output of one extraction pass over a transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptFeatures {
  pub talk_ratio: f32,
  pub sentiment: f32,
  pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
  Agent,
  Customer,
}

/// Split a `role: words` line into its speaker and the spoken part.
///
/// The label is matched case-insensitively after trimming; lines with any other
/// label, or without a delimiter, yield `None`.
pub fn parse_turn(line: &str) -> Option<(Speaker, &str)> {
  let (label, speech) = line.trim_start().split_once(':')?;
  let speaker = match label.trim().to_ascii_lowercase().as_str() {
    "agent" => Speaker::Agent,
    "customer" => Speaker::Customer,
    _ => return None,
  };
  Some((speaker, speech))
}

/// Agent words divided by agent plus customer words; 0.0 when nobody spoke.
pub fn talk_ratio(transcript: &str) -> f32 {
  let (mut agent, mut customer) = (0usize, 0usize);
  for (speaker, speech) in transcript.lines().filter_map(parse_turn) {
    let words = speech.split_whitespace().count();
    match speaker {
      Speaker::Agent => agent += words,
      Speaker::Customer => customer += words,
    }
  }

  let total = agent + customer;
  if total == 0 {
    return 0.0;
  }
  agent as f32 / total as f32
}

/// The longest prefix of `text` with at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
  match text.char_indices().nth(max_chars) {
    Some((offset, _)) => &text[..offset],
    None => text,
  }
}

/// Signed classifier confidence in `[-1, 1]`, or 0.0 when classification fails.
pub fn sentiment(model: &dyn SentimentClassifier, text: &str, max_chars: usize) -> f32 {
  let excerpt = truncate_chars(text, max_chars);
  let result =
    model.classify(excerpt).map_err(|e| CallsightError::ExtractionFailure(e.to_string()));

  let prediction = match result {
    Ok(prediction) => prediction,
    Err(e) => {
      tracing::warn!(error = %e, "sentiment defaulted to neutral");
      return 0.0;
    }
  };

  let confidence = prediction.confidence;
  if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
    let e = CallsightError::ExtractionFailure(format!("confidence {confidence} outside [0, 1]"));
    tracing::warn!(error = %e, "sentiment defaulted to neutral");
    return 0.0;
  }

  match prediction.polarity {
    Polarity::Positive => confidence,
    Polarity::Negative => -confidence,
  }
}

/// The embedding of `text`, or `None` when encoding fails.
///
/// Empty, non-finite and zero-magnitude outputs are treated as failures so they
/// never enter a similarity ranking.
pub fn embed(model: &dyn TextEncoder, text: &str) -> Option<Vec<f32>> {
  let vector = match model.encode(text) {
    Ok(vector) => vector,
    Err(e) => {
      let e = CallsightError::ExtractionFailure(e.to_string());
      tracing::warn!(encoder = model.name(), error = %e, "embedding unavailable");
      return None;
    }
  };

  let problem = if vector.is_empty() {
    Some("empty vector")
  } else if vector.iter().any(|x| !x.is_finite()) {
    Some("non-finite component")
  } else if vector.iter().all(|&x| x == 0.0) {
    Some("zero vector")
  } else {
    None
  };

  if let Some(problem) = problem {
    let e = CallsightError::ExtractionFailure(problem.to_string());
    tracing::warn!(encoder = model.name(), error = %e, "embedding unavailable");
    return None;
  }
  Some(vector)
}

/// Async front end over the pure extractors, resolving models from a registry
#[derive(Clone)]
pub struct FeatureExtractor {
  registry: Arc<ModelRegistry>,
  sentiment_max_chars: usize,
}

impl FeatureExtractor {
  pub fn new(registry: Arc<ModelRegistry>, sentiment_max_chars: usize) -> Self {
    Self { registry, sentiment_max_chars }
  }

  pub fn talk_ratio(&self, transcript: &str) -> f32 {
    talk_ratio(transcript)
  }

  pub async fn sentiment(&self, text: &str) -> f32 {
    let model = match self.registry.sentiment().await {
      ModelHandle::Ready(model) => model,
      ModelHandle::Unavailable(reason) => {
        tracing::debug!(%reason, "sentiment model unavailable, using neutral score");
        return 0.0;
      }
    };

    let text = text.to_string();
    let max_chars = self.sentiment_max_chars;
    match tokio::task::spawn_blocking(move || sentiment(model.as_ref(), &text, max_chars)).await {
      Ok(score) => score,
      Err(e) => {
        tracing::error!(error = %e, "sentiment task failed");
        0.0
      }
    }
  }

  pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
    let model = match self.registry.embedding().await {
      ModelHandle::Ready(model) => model,
      ModelHandle::Unavailable(reason) => {
        tracing::debug!(%reason, "embedding model unavailable");
        return None;
      }
    };

    let text = text.to_string();
    match tokio::task::spawn_blocking(move || embed(model.as_ref(), &text)).await {
      Ok(vector) => vector,
      Err(e) => {
        tracing::error!(error = %e, "embedding task failed");
        None
      }
    }
  }

  /// Talk ratio, sentiment and embedding for one transcript.
  pub async fn extract_features(&self, transcript: &str) -> TranscriptFeatures {
    let (sentiment, embedding) = tokio::join!(self.sentiment(transcript), self.embed(transcript));
    TranscriptFeatures { talk_ratio: talk_ratio(transcript), sentiment, embedding }
  }
}
