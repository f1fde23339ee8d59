//! Configuration for callsight
//!
//! Values come from built-in defaults, an optional JSON file, and finally a
//! small set of environment variables (credentials and deployment knobs).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CallsightError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
  /// Location of the JSON call store used by the CLI
  #[serde(default = "default_data_path")]
  pub data_path: PathBuf,
  #[serde(default)]
  pub embedding: EmbeddingConfig,
  #[serde(default)]
  pub sentiment: SentimentConfig,
  #[serde(default)]
  pub coaching: CoachingConfig,
  #[serde(default)]
  pub recommend: RecommendConfig,
}

/// Which encoder produces transcript embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
  /// Deterministic feature hashing, no model download
  Hashing,
  /// Sentence-transformer ONNX model (requires the `onnx` feature)
  Onnx,
}

impl FromStr for EmbeddingBackend {
  type Err = CallsightError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "hashing" => Ok(Self::Hashing),
      "onnx" => Ok(Self::Onnx),
      other => Err(CallsightError::Config(format!("unknown embedding backend '{other}'"))),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
  #[serde(default = "default_embedding_backend")]
  pub backend: EmbeddingBackend,
  /// HuggingFace repository holding `onnx/model.onnx` and `tokenizer.json`
  #[serde(default = "default_embedding_repo")]
  pub model_repo: String,
  /// Output dimension of the hashing encoder
  #[serde(default = "default_embedding_dimension")]
  pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentConfig {
  #[serde(default = "default_sentiment_repo")]
  pub model_repo: String,
  /// Character limit applied before the text reaches the classifier
  #[serde(default = "default_sentiment_max_chars")]
  pub max_chars: usize,
  /// Token limit applied by the classifier's tokenizer
  #[serde(default = "default_sentiment_max_tokens")]
  pub max_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachingConfig {
  /// Never written back to disk
  #[serde(default, skip_serializing)]
  pub api_key: Option<String>,
  #[serde(default = "default_coaching_base_url")]
  pub base_url: String,
  #[serde(default = "default_coaching_model")]
  pub model: String,
  /// Transcript excerpt length sent to the remote model
  #[serde(default = "default_max_excerpt_chars")]
  pub max_excerpt_chars: usize,
  #[serde(default = "default_coaching_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
  #[serde(default = "default_k")]
  pub default_k: usize,
}

// Default value functions
fn default_data_path() -> PathBuf {
  dirs::home_dir()
    .unwrap_or_else(|| PathBuf::from("/tmp"))
    .join(".callsight")
    .join("calls.json")
}
fn default_embedding_backend() -> EmbeddingBackend {
  if cfg!(feature = "onnx") {
    EmbeddingBackend::Onnx
  } else {
    EmbeddingBackend::Hashing
  }
}
fn default_embedding_repo() -> String {
  "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_embedding_dimension() -> usize {
  384
}
fn default_sentiment_repo() -> String {
  "distilbert/distilbert-base-uncased-finetuned-sst-2-english".to_string()
}
fn default_sentiment_max_chars() -> usize {
  2000
}
fn default_sentiment_max_tokens() -> usize {
  512
}
fn default_coaching_base_url() -> String {
  "https://api.openai.com/v1".to_string()
}
fn default_coaching_model() -> String {
  "gpt-3.5-turbo".to_string()
}
fn default_max_excerpt_chars() -> usize {
  1500
}
fn default_coaching_timeout_secs() -> u64 {
  20
}
fn default_k() -> usize {
  5
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      backend: default_embedding_backend(),
      model_repo: default_embedding_repo(),
      dimension: default_embedding_dimension(),
    }
  }
}

impl Default for SentimentConfig {
  fn default() -> Self {
    Self {
      model_repo: default_sentiment_repo(),
      max_chars: default_sentiment_max_chars(),
      max_tokens: default_sentiment_max_tokens(),
    }
  }
}

impl Default for CoachingConfig {
  fn default() -> Self {
    Self {
      api_key: None,
      base_url: default_coaching_base_url(),
      model: default_coaching_model(),
      max_excerpt_chars: default_max_excerpt_chars(),
      timeout_secs: default_coaching_timeout_secs(),
    }
  }
}

impl Default for RecommendConfig {
  fn default() -> Self {
    Self { default_k: default_k() }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_path: default_data_path(),
      embedding: EmbeddingConfig::default(),
      sentiment: SentimentConfig::default(),
      coaching: CoachingConfig::default(),
      recommend: RecommendConfig::default(),
    }
  }
}

impl CoachingConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl Config {
  /// Load configuration from a JSON file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
  }

  /// Load configuration from `path`, or from the first well-known location that
  /// exists, then apply the process environment and validate.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let mut config = match path {
      Some(path) => Self::load_from_file(path)?,
      None => match Self::discover() {
        Some(found) => Self::load_from_file(found)?,
        None => Config::default(),
      },
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
  }

  fn discover() -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from("callsight.json")];
    if let Some(home) = dirs::home_dir() {
      candidates.push(home.join(".callsight").join("config.json"));
    }
    candidates.into_iter().find(|candidate| candidate.exists())
  }

  /// Overlay values from the process environment
  pub fn apply_env(&mut self) {
    self.apply_env_from(|key| std::env::var(key).ok());
  }

  /// Overlay values using an arbitrary variable lookup
  pub fn apply_env_from<F>(&mut self, lookup: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(path) = lookup("CALLSIGHT_DATA") {
      self.data_path = PathBuf::from(path);
    }
    if let Some(backend) = lookup("CALLSIGHT_EMBEDDING_BACKEND") {
      match backend.parse() {
        Ok(backend) => self.embedding.backend = backend,
        Err(e) => tracing::warn!(error = %e, "ignoring CALLSIGHT_EMBEDDING_BACKEND"),
      }
    }
    if let Some(key) = lookup("OPENAI_API_KEY") {
      self.coaching.api_key = Some(key);
    }
    if let Some(url) = lookup("OPENAI_BASE_URL") {
      self.coaching.base_url = url;
    }
    if let Some(model) = lookup("CALLSIGHT_COACHING_MODEL") {
      self.coaching.model = model;
    }
    if let Some(timeout) = lookup("CALLSIGHT_COACHING_TIMEOUT") {
      match timeout.parse() {
        Ok(secs) => self.coaching.timeout_secs = secs,
        Err(_) => {
          tracing::warn!(value = %timeout, "ignoring non-numeric CALLSIGHT_COACHING_TIMEOUT")
        }
      }
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.embedding.dimension == 0 {
      return Err(CallsightError::Config("embedding.dimension must be positive".into()));
    }
    if self.coaching.timeout_secs == 0 {
      return Err(CallsightError::Config("coaching.timeout_secs must be positive".into()));
    }
    if self.coaching.max_excerpt_chars == 0 {
      return Err(CallsightError::Config("coaching.max_excerpt_chars must be positive".into()));
    }
    if self.sentiment.max_chars == 0 {
      return Err(CallsightError::Config("sentiment.max_chars must be positive".into()));
    }
    if self.embedding.backend == EmbeddingBackend::Onnx && !cfg!(feature = "onnx") {
      return Err(CallsightError::Config(
        "embedding backend 'onnx' requires building with the `onnx` feature".into(),
      ));
    }
    Ok(())
  }

  /// Save configuration to a file
  pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(self)?;
    std::fs::write(path, content)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use std::collections::HashMap;
  use tempfile::TempDir;

  #[test]
  fn test_defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.coaching.max_excerpt_chars, 1500);
    assert_eq!(config.coaching.model, "gpt-3.5-turbo");
    assert_eq!(config.sentiment.max_tokens, 512);
    assert_eq!(config.recommend.default_k, 5);
    assert_eq!(config.embedding.dimension, 384);
    assert!(config.coaching.api_key.is_none());
    assert!(config.data_path.ends_with("calls.json"));
  }

  #[test]
  fn test_partial_file_fills_in_defaults() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("callsight.json");
    let body = r#"{
      "coaching": { "timeout_secs": 3 },
      "embedding": { "backend": "hashing", "dimension": 64 }
    }"#;
    std::fs::write(&path, body)?;

    let config = Config::load_from_file(&path)?;
    assert_eq!(config.coaching.timeout_secs, 3);
    assert_eq!(config.coaching.max_excerpt_chars, 1500);
    assert_eq!(config.embedding.dimension, 64);
    assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
    Ok(())
  }

  #[test]
  fn test_env_overlay() {
    let vars: HashMap<&str, &str> = [
      ("OPENAI_API_KEY", "sk-test"),
      ("CALLSIGHT_DATA", "/var/lib/callsight/calls.json"),
      ("CALLSIGHT_COACHING_TIMEOUT", "7"),
      ("OPENAI_BASE_URL", ""),
    ]
    .into_iter()
    .collect();

    let mut config = Config::default();
    config.apply_env_from(|key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(config.coaching.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.data_path, PathBuf::from("/var/lib/callsight/calls.json"));
    assert_eq!(config.coaching.timeout_secs, 7);
    // blank values are ignored
    assert_eq!(config.coaching.base_url, "https://api.openai.com/v1");
  }

  #[test]
  fn test_bad_env_values_are_ignored() {
    let mut config = Config::default();
    let before = config.coaching.timeout_secs;
    config.apply_env_from(|key| match key {
      "CALLSIGHT_COACHING_TIMEOUT" => Some("soon".to_string()),
      "CALLSIGHT_EMBEDDING_BACKEND" => Some("word2vec".to_string()),
      _ => None,
    });
    assert_eq!(config.coaching.timeout_secs, before);
    assert_eq!(config.embedding.backend, default_embedding_backend());
  }

  #[test]
  #[serial]
  fn test_apply_env_reads_process_environment() {
    std::env::set_var("CALLSIGHT_COACHING_MODEL", "gpt-4o-mini");
    let mut config = Config::default();
    config.apply_env();
    std::env::remove_var("CALLSIGHT_COACHING_MODEL");

    assert_eq!(config.coaching.model, "gpt-4o-mini");
  }

  #[test]
  fn test_validate_rejects_zero_values() {
    let mut config = Config::default();
    config.coaching.timeout_secs = 0;
    assert!(matches!(config.validate(), Err(CallsightError::Config(_))));

    let mut config = Config::default();
    config.embedding.dimension = 0;
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_backend_parsing() {
    assert_eq!("ONNX".parse::<EmbeddingBackend>().ok(), Some(EmbeddingBackend::Onnx));
    assert_eq!(" hashing ".parse::<EmbeddingBackend>().ok(), Some(EmbeddingBackend::Hashing));
    assert!("bert".parse::<EmbeddingBackend>().is_err());
  }

  #[test]
  fn test_api_key_is_not_saved() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("out.json");
    let mut config = Config::default();
    config.coaching.api_key = Some("sk-secret".into());
    config.save_to_file(&path)?;

    let written = std::fs::read_to_string(&path)?;
    assert!(!written.contains("sk-secret"));
    Ok(())
  }
}
