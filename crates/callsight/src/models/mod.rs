//! Model handles used by feature extraction and coaching
//!
//! Three kinds of model back the pipeline: a binary sentiment classifier, a
//! sentence encoder, and an optional remote generative client. Each sits behind
//! a trait so tests and alternative backends can be swapped in, and each is
//! created at most once per process by the [`ModelRegistry`].

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub mod hashing;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod openai;
pub mod registry;

pub use hashing::HashingEncoder;
pub use openai::OpenAiClient;
pub use registry::{DefaultModelLoader, ModelLoader, ModelRegistry};

/// The model kinds managed by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
  Sentiment,
  Embedding,
  Generative,
}

impl fmt::Display for ModelKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ModelKind::Sentiment => "sentiment",
      ModelKind::Embedding => "embedding",
      ModelKind::Generative => "generative",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
  Positive,
  Negative,
}

/// Raw classifier output: a label plus its confidence in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentPrediction {
  pub polarity: Polarity,
  pub confidence: f32,
}

/// Binary sentiment classifier
pub trait SentimentClassifier: Send + Sync {
  fn classify(&self, text: &str) -> Result<SentimentPrediction>;
}

/// Text encoder producing fixed-length embeddings
pub trait TextEncoder: Send + Sync {
  fn encode(&self, text: &str) -> Result<Vec<f32>>;

  /// Model identifier, for logs
  fn name(&self) -> &str;
}

/// Remote generative model that answers a prompt with a JSON document
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeClient: Send + Sync {
  async fn complete_json(&self, prompt: &str) -> Result<String>;
}

/// A registry slot: either a ready model or the reason it could not be created.
pub enum ModelHandle<T: ?Sized> {
  Ready(Arc<T>),
  Unavailable(String),
}

impl<T: ?Sized> Clone for ModelHandle<T> {
  fn clone(&self) -> Self {
    match self {
      ModelHandle::Ready(model) => ModelHandle::Ready(Arc::clone(model)),
      ModelHandle::Unavailable(reason) => ModelHandle::Unavailable(reason.clone()),
    }
  }
}

impl<T: ?Sized> fmt::Debug for ModelHandle<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ModelHandle::Ready(_) => f.write_str("Ready"),
      ModelHandle::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
    }
  }
}

impl<T: ?Sized> ModelHandle<T> {
  pub fn is_available(&self) -> bool {
    matches!(self, ModelHandle::Ready(_))
  }

  pub fn model(&self) -> Option<&Arc<T>> {
    match self {
      ModelHandle::Ready(model) => Some(model),
      ModelHandle::Unavailable(_) => None,
    }
  }

  pub fn unavailable_reason(&self) -> Option<&str> {
    match self {
      ModelHandle::Ready(_) => None,
      ModelHandle::Unavailable(reason) => Some(reason),
    }
  }
}
