//! Local ONNX inference for sentiment and sentence embeddings
//!
//! Both models are fetched from HuggingFace on first load (`onnx/model.onnx`
//! plus `tokenizer.json`) and cached by hf-hub. `Session::run` needs exclusive
//! access, so each session sits behind a mutex and inference on one handle is
//! serialised.

use anyhow::{anyhow, Result};
use hf_hub::api::tokio::Api;
use ndarray::Array2;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tokenizers::{Encoding, Tokenizer, TruncationParams};

use ort::{
  execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch},
  session::Session,
  value::Value,
};

use super::{Polarity, SentimentClassifier, SentimentPrediction, TextEncoder};
use crate::config::{EmbeddingConfig, SentimentConfig};

const TOKENIZER_FILE: &str = "tokenizer.json";
const MODEL_FILE: &str = "onnx/model.onnx";

/// Tokens kept per input by the sentence encoder
const ENCODER_MAX_TOKENS: usize = 256;

struct ModelFiles {
  tokenizer_file: PathBuf,
  model_path: PathBuf,
}

#[cfg(not(tarpaulin_include))]
async fn download(repo_name: &str) -> Result<ModelFiles> {
  let api = Api::new().map_err(|e| anyhow!("HF API initialization failed: {}", e))?;
  let repo = api.model(repo_name.to_string());

  let tokenizer_file =
    repo.get(TOKENIZER_FILE).await.map_err(|e| anyhow!("Failed to download tokenizer: {}", e))?;
  let model_path =
    repo.get(MODEL_FILE).await.map_err(|e| anyhow!("Failed to download ONNX model: {}", e))?;

  Ok(ModelFiles { tokenizer_file, model_path })
}

#[cfg(not(tarpaulin_include))]
fn load_tokenizer(path: PathBuf, max_tokens: usize) -> Result<Tokenizer> {
  let mut tokenizer =
    Tokenizer::from_file(path).map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
  tokenizer
    .with_truncation(Some(TruncationParams { max_length: max_tokens, ..Default::default() }))
    .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
  tokenizer.with_padding(None);
  Ok(tokenizer)
}

#[cfg(not(tarpaulin_include))]
fn load_session(model_path: PathBuf) -> Result<Session> {
  let providers: Vec<ExecutionProviderDispatch> = vec![CPUExecutionProvider::default().into()];
  let session =
    Session::builder()?.with_execution_providers(providers)?.commit_from_file(model_path)?;
  Ok(session)
}

fn encode(tokenizer: &Tokenizer, text: &str) -> Result<Encoding> {
  tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))
}

fn to_tensor(values: &[u32]) -> Result<Value> {
  let ids: Vec<i64> = values.iter().map(|&x| i64::from(x)).collect();
  let array = Array2::from_shape_vec((1, ids.len()), ids)?;
  Ok(Value::from_array(array)?.into())
}

/// Inputs named by the model; `token_type_ids` only when the graph declares it
fn prepare(encoding: &Encoding, input_names: &[String]) -> Result<HashMap<String, Value>> {
  let mut input = HashMap::new();
  input.insert("input_ids".to_string(), to_tensor(encoding.get_ids())?);
  input.insert("attention_mask".to_string(), to_tensor(encoding.get_attention_mask())?);
  if input_names.iter().any(|name| name == "token_type_ids") {
    input.insert("token_type_ids".to_string(), to_tensor(encoding.get_type_ids())?);
  }
  Ok(input)
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
  session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn input_names(session: &Session) -> Vec<String> {
  session.inputs.iter().map(|input| input.name.to_string()).collect()
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|x| x / sum).collect()
}

/// Masked mean over the sequence axis of a `[1, seq, hidden]` tensor
pub fn mean_pool(shape: &[i64], data: &[f32], mask: &[u32]) -> Result<Vec<f32>> {
  if shape.len() != 3 {
    return Err(anyhow!("expected a rank-3 hidden state, got shape {:?}", shape));
  }
  let seq_length = shape[1] as usize;
  let hidden_size = shape[2] as usize;
  if data.len() < seq_length * hidden_size {
    return Err(anyhow!("hidden state shorter than its shape {:?}", shape));
  }

  let mut pooled = vec![0.0f32; hidden_size];
  let mut counted = 0usize;
  for token_idx in 0..seq_length {
    if mask.get(token_idx).copied().unwrap_or(1) == 0 {
      continue;
    }
    let start = token_idx * hidden_size;
    for (slot, &value) in pooled.iter_mut().zip(&data[start..start + hidden_size]) {
      *slot += value;
    }
    counted += 1;
  }

  if counted == 0 {
    return Err(anyhow!("attention mask selects no tokens"));
  }
  for value in pooled.iter_mut() {
    *value /= counted as f32;
  }
  Ok(pooled)
}

pub fn normalize(mut embedding: Vec<f32>) -> Vec<f32> {
  let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
  if magnitude >= f32::EPSILON {
    for value in embedding.iter_mut() {
      *value /= magnitude;
    }
  }
  embedding
}

/// DistilBERT-style binary classifier; label 0 is negative, label 1 positive
pub struct OnnxSentimentClassifier {
  session: Mutex<Session>,
  tokenizer: Tokenizer,
}

#[cfg(not(tarpaulin_include))]
impl OnnxSentimentClassifier {
  pub async fn load(config: &SentimentConfig) -> Result<Self> {
    tracing::info!(repo = %config.model_repo, "loading sentiment classifier");
    let files = download(&config.model_repo).await?;
    let tokenizer = load_tokenizer(files.tokenizer_file, config.max_tokens)?;
    let session = load_session(files.model_path)?;
    Ok(Self { session: Mutex::new(session), tokenizer })
  }
}

#[cfg(not(tarpaulin_include))]
impl SentimentClassifier for OnnxSentimentClassifier {
  fn classify(&self, text: &str) -> Result<SentimentPrediction> {
    let encoding = encode(&self.tokenizer, text)?;
    let mut session = lock(&self.session);
    let input = prepare(&encoding, &input_names(&session))?;
    let outputs = session.run(input)?;
    let tensor = outputs.get("logits").ok_or_else(|| anyhow!("model produced no 'logits' output"))?;
    let (_, logits) = tensor.try_extract_tensor::<f32>()?;
    if logits.len() < 2 {
      return Err(anyhow!("expected two logits, got {}", logits.len()));
    }

    let probabilities = softmax(&logits[..2]);
    let prediction = if probabilities[1] >= probabilities[0] {
      SentimentPrediction { polarity: Polarity::Positive, confidence: probabilities[1] }
    } else {
      SentimentPrediction { polarity: Polarity::Negative, confidence: probabilities[0] }
    };
    Ok(prediction)
  }
}

/// Sentence-transformer encoder with mean pooling
pub struct OnnxSentenceEncoder {
  session: Mutex<Session>,
  tokenizer: Tokenizer,
  name: String,
}

#[cfg(not(tarpaulin_include))]
impl OnnxSentenceEncoder {
  pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
    tracing::info!(repo = %config.model_repo, "loading sentence encoder");
    let files = download(&config.model_repo).await?;
    let tokenizer = load_tokenizer(files.tokenizer_file, ENCODER_MAX_TOKENS)?;
    let session = load_session(files.model_path)?;
    Ok(Self { session: Mutex::new(session), tokenizer, name: config.model_repo.clone() })
  }
}

#[cfg(not(tarpaulin_include))]
impl TextEncoder for OnnxSentenceEncoder {
  fn encode(&self, text: &str) -> Result<Vec<f32>> {
    let encoding = encode(&self.tokenizer, text)?;
    let mut session = lock(&self.session);
    let input = prepare(&encoding, &input_names(&session))?;
    let outputs = session.run(input)?;
    let tensor = outputs
      .get("last_hidden_state")
      .or_else(|| outputs.get("token_embeddings"))
      .ok_or_else(|| anyhow!("No output found from model - expected 'last_hidden_state'"))?;
    let (shape, data) = tensor.try_extract_tensor::<f32>()?;
    let pooled = mean_pool(shape.as_ref(), data, encoding.get_attention_mask())?;
    Ok(normalize(pooled))
  }

  fn name(&self) -> &str {
    &self.name
  }
}
