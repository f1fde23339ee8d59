use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use callsight::models::{
  GenerativeClient, ModelLoader, Polarity, SentimentClassifier, SentimentPrediction, TextEncoder,
};
use callsight::processing::SAVE_BATCH_SIZE;
use callsight::{
  process_pending, FeatureExtractor, JsonFileStore, MemoryStore, ModelRegistry, ProcessingReport,
  Result, SimilarityIndex, TranscriptRecord, TranscriptStore, VectorIndex,
};

struct Positive;

impl SentimentClassifier for Positive {
  fn classify(&self, text: &str) -> anyhow::Result<SentimentPrediction> {
    if text.contains("crash") {
      return Err(anyhow!("classifier crashed"));
    }
    Ok(SentimentPrediction { polarity: Polarity::Positive, confidence: 0.6 })
  }
}

/// Three-dimensional encoder keyed on topic words; "garbled" text fails
struct TopicEncoder;

impl TextEncoder for TopicEncoder {
  fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>> {
    if text.contains("garbled") {
      return Err(anyhow!("could not encode"));
    }
    let count = |word: &str| text.matches(word).count() as f32;
    Ok(vec![count("invoice") + 0.1, count("parcel") + 0.1, count("refund") + 0.1])
  }

  fn name(&self) -> &str {
    "topic"
  }
}

struct Loader;

#[async_trait]
impl ModelLoader for Loader {
  async fn load_sentiment(&self) -> anyhow::Result<Arc<dyn SentimentClassifier>> {
    Ok(Arc::new(Positive))
  }

  async fn load_embedding(&self) -> anyhow::Result<Arc<dyn TextEncoder>> {
    Ok(Arc::new(TopicEncoder))
  }

  async fn load_generative(&self) -> anyhow::Result<Arc<dyn GenerativeClient>> {
    Err(anyhow!("not configured"))
  }
}

/// Memory store that counts `save_many` calls
#[derive(Default)]
struct CountingStore {
  inner: MemoryStore,
  batches: AtomicUsize,
}

#[async_trait]
impl TranscriptStore for CountingStore {
  async fn fetch(&self, id: &str) -> Result<TranscriptRecord> {
    self.inner.fetch(id).await
  }

  async fn save(&self, record: TranscriptRecord) -> Result<()> {
    self.save_many(vec![record]).await
  }

  async fn save_many(&self, records: Vec<TranscriptRecord>) -> Result<()> {
    self.batches.fetch_add(1, Ordering::SeqCst);
    self.inner.save_many(records).await
  }

  async fn list(&self) -> Result<Vec<TranscriptRecord>> {
    self.inner.list().await
  }
}

fn extractor() -> FeatureExtractor {
  FeatureExtractor::new(Arc::new(ModelRegistry::new(Loader)), 2000)
}

#[tokio::test]
async fn test_pass_saves_features_and_indexes_embeddings() {
  let store = MemoryStore::with_records([
    TranscriptRecord::new("c1", "agent: your invoice\ncustomer: invoice is wrong"),
    TranscriptRecord::new("c2", "agent: the parcel left\ncustomer: ok"),
    TranscriptRecord::new("empty", "   "),
    TranscriptRecord::new("bad", "customer: garbled crash noise"),
    TranscriptRecord::new("done", "agent: old").with_embedding(vec![0.0, 0.0, 1.0]),
  ]);
  let index = SimilarityIndex::new();

  let report = process_pending(&store, &extractor(), &index).await.unwrap();
  assert_eq!(
    report,
    ProcessingReport { total: 4, processed: 3, skipped: 1, without_embedding: 1, rejected: 0 }
  );

  let c1 = store.fetch("c1").await.unwrap();
  let features = c1.features.unwrap();
  assert!((features.talk_ratio - 0.4).abs() < 1e-6);
  assert!((features.sentiment - 0.6).abs() < 1e-6);
  assert_eq!(c1.embedding.as_ref().map(Vec::len), Some(3));

  // features are saved even when sentiment and embedding both fail
  let bad = store.fetch("bad").await.unwrap();
  assert_eq!(bad.features.map(|f| f.sentiment), Some(0.0));
  assert_eq!(bad.features.map(|f| f.talk_ratio), Some(0.0));
  assert!(bad.embedding.is_none());

  assert!(store.fetch("empty").await.unwrap().features.is_none());
  assert_eq!(index.len(), 2);
  assert_eq!(index.top_k("c1", 1)[0].call_id, "c2");
}

#[tokio::test]
async fn test_second_pass_only_retries_unembedded() {
  let store = MemoryStore::with_records([
    TranscriptRecord::new("c1", "agent: refund please"),
    TranscriptRecord::new("bad", "agent: garbled"),
  ]);
  let index = SimilarityIndex::new();

  process_pending(&store, &extractor(), &index).await.unwrap();
  let again = process_pending(&store, &extractor(), &index).await.unwrap();

  assert_eq!(again.total, 1);
  assert_eq!(again.without_embedding, 1);
  assert_eq!(store.list_with_embedding().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mismatched_embedding_is_counted_not_stored() {
  let store = MemoryStore::with_records([TranscriptRecord::new("c1", "agent: invoice")]);
  let index = SimilarityIndex::new();
  index.insert("legacy", vec![1.0, 0.0]).unwrap();

  let report = process_pending(&store, &extractor(), &index).await.unwrap();

  assert_eq!(report.processed, 1);
  assert_eq!(report.rejected, 1);
  let c1 = store.fetch("c1").await.unwrap();
  assert!(c1.features.is_some());
  assert!(!c1.has_embedding());
  assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn test_rejected_embedding_does_not_take_over_reloaded_index() {
  let store = MemoryStore::with_records([
    TranscriptRecord::new("a", "agent: invoice please"),
    TranscriptRecord::new("b", "agent: hi").with_embedding(vec![1.0, 0.0]),
    TranscriptRecord::new("c", "agent: yo").with_embedding(vec![0.0, 1.0]),
  ]);
  let index = SimilarityIndex::load_from(&store).await.unwrap();

  let report = process_pending(&store, &extractor(), &index).await.unwrap();
  assert_eq!(report.rejected, 1);

  let reloaded = SimilarityIndex::load_from(&store).await.unwrap();
  assert_eq!(reloaded.dimension(), Some(2));
  assert_eq!(reloaded.len(), 2);
  assert_eq!(reloaded.top_k("b", 1)[0].call_id, "c");
  assert!(store.list_with_embedding().await.unwrap().iter().all(|r| r.id != "a"));
}

#[tokio::test]
async fn test_large_pass_is_saved_in_batches() {
  let store = CountingStore::default();
  let records = (0..SAVE_BATCH_SIZE * 2 + 5)
    .map(|i| TranscriptRecord::new(format!("c{i:03}"), format!("agent: parcel {i}")));
  store.inner.save_many(records.collect()).await.unwrap();
  let index = SimilarityIndex::new();

  let report = process_pending(&store, &extractor(), &index).await.unwrap();

  assert_eq!(report.processed, SAVE_BATCH_SIZE * 2 + 5);
  assert_eq!(store.batches.load(Ordering::SeqCst), 3);
  assert!(store.list_pending().await.unwrap().is_empty());
  assert_eq!(index.len(), SAVE_BATCH_SIZE * 2 + 5);
}

#[tokio::test]
async fn test_json_store_pass_survives_reopen() {
  let temp = tempfile::TempDir::new().unwrap();
  let path = temp.path().join("calls.json");
  {
    let store = JsonFileStore::open(&path).unwrap();
    store.save(TranscriptRecord::new("c1", "agent: parcel parcel")).await.unwrap();
    store.save(TranscriptRecord::new("c2", "agent: invoice")).await.unwrap();
    let index = SimilarityIndex::load_from(&store).await.unwrap();
    assert!(index.is_empty());
    process_pending(&store, &extractor(), &index).await.unwrap();
  }

  let reopened = JsonFileStore::open(&path).unwrap();
  let index = SimilarityIndex::load_from(&reopened).await.unwrap();
  assert_eq!(index.len(), 2);
  assert_eq!(index.dimension(), Some(3));
  assert!(reopened.list_pending().await.unwrap().is_empty());
}
