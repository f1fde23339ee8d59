//! Process-wide, lazily initialised model handles
//!
//! Every slot is a `tokio::sync::OnceCell`: the first caller runs the loader,
//! concurrent callers await that same initialisation, and everyone receives a
//! clone of the one handle. A failed load is remembered as `Unavailable` for
//! the lifetime of the registry, so the loader runs at most once per kind.
//!
//! Inference on a handle is serialised by the model implementation itself
//! (ONNX sessions sit behind a mutex); the registry only hands out `Arc`s and
//! never holds a lock while a caller uses them.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

use super::{
  GenerativeClient, HashingEncoder, ModelHandle, ModelKind, OpenAiClient, SentimentClassifier,
  TextEncoder,
};
use crate::config::{Config, EmbeddingBackend};

/// Constructs the models behind each registry slot
#[async_trait]
pub trait ModelLoader: Send + Sync {
  async fn load_sentiment(&self) -> Result<Arc<dyn SentimentClassifier>>;
  async fn load_embedding(&self) -> Result<Arc<dyn TextEncoder>>;
  async fn load_generative(&self) -> Result<Arc<dyn GenerativeClient>>;
}

/// Loader driven by [`Config`]
pub struct DefaultModelLoader {
  config: Config,
}

impl DefaultModelLoader {
  pub fn new(config: Config) -> Self {
    Self { config }
  }
}

#[async_trait]
impl ModelLoader for DefaultModelLoader {
  async fn load_sentiment(&self) -> Result<Arc<dyn SentimentClassifier>> {
    #[cfg(feature = "onnx")]
    {
      let classifier = super::onnx::OnnxSentimentClassifier::load(&self.config.sentiment).await?;
      Ok(Arc::new(classifier))
    }

    #[cfg(not(feature = "onnx"))]
    {
      Err(anyhow!(
        "sentiment classifier {} needs the `onnx` feature",
        self.config.sentiment.model_repo
      ))
    }
  }

  async fn load_embedding(&self) -> Result<Arc<dyn TextEncoder>> {
    match self.config.embedding.backend {
      EmbeddingBackend::Hashing => {
        Ok(Arc::new(HashingEncoder::new(self.config.embedding.dimension)?))
      }
      #[cfg(feature = "onnx")]
      EmbeddingBackend::Onnx => {
        let encoder = super::onnx::OnnxSentenceEncoder::load(&self.config.embedding).await?;
        Ok(Arc::new(encoder))
      }
      #[cfg(not(feature = "onnx"))]
      EmbeddingBackend::Onnx => Err(anyhow!(
        "sentence encoder {} needs the `onnx` feature",
        self.config.embedding.model_repo
      )),
    }
  }

  async fn load_generative(&self) -> Result<Arc<dyn GenerativeClient>> {
    Ok(Arc::new(OpenAiClient::from_config(&self.config.coaching)?))
  }
}

pub struct ModelRegistry {
  loader: Box<dyn ModelLoader>,
  sentiment: OnceCell<ModelHandle<dyn SentimentClassifier>>,
  embedding: OnceCell<ModelHandle<dyn TextEncoder>>,
  generative: OnceCell<ModelHandle<dyn GenerativeClient>>,
}

static GLOBAL: OnceLock<Arc<ModelRegistry>> = OnceLock::new();

impl ModelRegistry {
  pub fn new<L: ModelLoader + 'static>(loader: L) -> Self {
    Self {
      loader: Box::new(loader),
      sentiment: OnceCell::new(),
      embedding: OnceCell::new(),
      generative: OnceCell::new(),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(DefaultModelLoader::new(config.clone()))
  }

  /// The process-wide registry, created from `config` on first call.
  ///
  /// Later calls return the existing registry and ignore their argument.
  pub fn global(config: &Config) -> Arc<ModelRegistry> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(ModelRegistry::from_config(config))))
  }

  pub async fn sentiment(&self) -> ModelHandle<dyn SentimentClassifier> {
    resolve(&self.sentiment, ModelKind::Sentiment, || self.loader.load_sentiment()).await
  }

  pub async fn embedding(&self) -> ModelHandle<dyn TextEncoder> {
    resolve(&self.embedding, ModelKind::Embedding, || self.loader.load_embedding()).await
  }

  /// The generative client, or `Unavailable` when no credential is configured.
  pub async fn generative(&self) -> ModelHandle<dyn GenerativeClient> {
    resolve(&self.generative, ModelKind::Generative, || self.loader.load_generative()).await
  }

  /// Whether `kind` has been initialised successfully; never triggers a load.
  pub fn is_loaded(&self, kind: ModelKind) -> bool {
    match kind {
      ModelKind::Sentiment => self.sentiment.get().is_some_and(ModelHandle::is_available),
      ModelKind::Embedding => self.embedding.get().is_some_and(ModelHandle::is_available),
      ModelKind::Generative => self.generative.get().is_some_and(ModelHandle::is_available),
    }
  }
}

async fn resolve<T, F, Fut>(
  cell: &OnceCell<ModelHandle<T>>,
  kind: ModelKind,
  load: F,
) -> ModelHandle<T>
where
  T: ?Sized,
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Arc<T>>>,
{
  cell
    .get_or_init(|| async move {
      tracing::info!(%kind, "loading model");
      match load().await {
        Ok(model) => {
          tracing::info!(%kind, "model loaded");
          ModelHandle::Ready(model)
        }
        Err(e) => {
          tracing::warn!(%kind, error = %e, "model unavailable");
          ModelHandle::Unavailable(e.to_string())
        }
      }
    })
    .await
    .clone()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{Polarity, SentimentPrediction};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  struct FixedSentiment;

  impl SentimentClassifier for FixedSentiment {
    fn classify(&self, _text: &str) -> Result<SentimentPrediction> {
      Ok(SentimentPrediction { polarity: Polarity::Positive, confidence: 0.9 })
    }
  }

  #[derive(Default)]
  struct CountingLoader {
    sentiment_loads: Arc<AtomicUsize>,
    generative_loads: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl ModelLoader for CountingLoader {
    async fn load_sentiment(&self) -> Result<Arc<dyn SentimentClassifier>> {
      self.sentiment_loads.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(30)).await;
      Ok(Arc::new(FixedSentiment))
    }

    async fn load_embedding(&self) -> Result<Arc<dyn TextEncoder>> {
      Ok(Arc::new(HashingEncoder::new(8)?))
    }

    async fn load_generative(&self) -> Result<Arc<dyn GenerativeClient>> {
      self.generative_loads.fetch_add(1, Ordering::SeqCst);
      Err(anyhow!("OPENAI_API_KEY not set"))
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_concurrent_first_use_loads_once() {
    let loader = CountingLoader::default();
    let loads = Arc::clone(&loader.sentiment_loads);
    let registry = Arc::new(ModelRegistry::new(loader));

    let mut tasks = Vec::new();
    for _ in 0..16 {
      let registry = Arc::clone(&registry);
      tasks.push(tokio::spawn(async move { registry.sentiment().await }));
    }

    let mut handles = Vec::new();
    for task in tasks {
      handles.push(task.await.unwrap());
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    let first = handles[0].model().unwrap();
    for handle in &handles {
      assert!(Arc::ptr_eq(first, handle.model().unwrap()));
    }
  }

  #[tokio::test]
  async fn test_failed_load_is_cached_as_unavailable() {
    let loader = CountingLoader::default();
    let loads = Arc::clone(&loader.generative_loads);
    let registry = ModelRegistry::new(loader);

    let first = registry.generative().await;
    let second = registry.generative().await;

    assert!(!first.is_available());
    assert_eq!(second.unavailable_reason(), Some("OPENAI_API_KEY not set"));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(!registry.is_loaded(ModelKind::Generative));
  }

  #[tokio::test]
  async fn test_is_loaded_does_not_trigger_load() {
    let loader = CountingLoader::default();
    let loads = Arc::clone(&loader.sentiment_loads);
    let registry = ModelRegistry::new(loader);

    assert!(!registry.is_loaded(ModelKind::Sentiment));
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    registry.sentiment().await;
    assert!(registry.is_loaded(ModelKind::Sentiment));
  }

  #[tokio::test]
  async fn test_default_loader_without_api_key_is_unavailable() {
    let mut config = Config::default();
    config.coaching.api_key = None;
    config.embedding.backend = EmbeddingBackend::Hashing;
    let registry = ModelRegistry::from_config(&config);

    assert!(!registry.generative().await.is_available());
    assert!(registry.embedding().await.is_available());
  }
}
