//! Exact cosine-similarity search over call embeddings
//!
//! [`SimilarityIndex`] is a brute-force scan, O(n·D) per query, which is
//! plenty for a corpus of a few thousand calls. Callers program against
//! [`VectorIndex`] so an approximate nearest-neighbour structure can replace it
//! without changing the ranking contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{CallsightError, Result};
use crate::record::TranscriptRecord;
use crate::store::TranscriptStore;

/// Cosine of the angle between `a` and `b`, clamped to `[-1, 1]`.
///
/// `None` when the lengths differ, either slice is empty, or either vector has
/// zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
  if a.is_empty() || a.len() != b.len() {
    return None;
  }

  let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
  let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if magnitude_a == 0.0 || magnitude_b == 0.0 {
    return None;
  }
  let score = dot_product / (magnitude_a * magnitude_b);
  if !score.is_finite() {
    return None;
  }
  Some(score.clamp(-1.0, 1.0))
}

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCall {
  pub call_id: String,
  pub score: f32,
}

/// A queryable collection of `(call id, embedding)` pairs
pub trait VectorIndex: Send + Sync {
  /// Insert or replace the vector for `id`.
  ///
  /// The first insert fixes the dimensionality; any later vector of another
  /// length is rejected with `DimensionMismatch` and leaves the index as it was.
  fn insert(&self, id: &str, vector: Vec<f32>) -> Result<()>;

  /// Drop `id`; returns whether it was present.
  fn remove(&self, id: &str) -> bool;

  /// The `k` entries most similar to `query_id`, excluding `query_id` itself.
  ///
  /// Empty when `query_id` is not indexed or `k == 0`.
  fn top_k(&self, query_id: &str, k: usize) -> Vec<ScoredCall>;

  /// The `k` entries most similar to an arbitrary vector, optionally excluding one id.
  fn top_k_for_vector(
    &self,
    query: &[f32],
    k: usize,
    exclude: Option<&str>,
  ) -> Result<Vec<ScoredCall>>;

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Dimensionality fixed by the first insert, if any
  fn dimension(&self) -> Option<usize>;
}

#[derive(Debug, Default)]
struct IndexState {
  dimension: Option<usize>,
  entries: BTreeMap<String, Vec<f32>>,
}

impl IndexState {
  fn rank(&self, query: &[f32], k: usize, exclude: Option<&str>) -> Vec<ScoredCall> {
    if k == 0 {
      return Vec::new();
    }

    let mut scored: Vec<ScoredCall> = self
      .entries
      .iter()
      .filter(|(id, _)| Some(id.as_str()) != exclude)
      .filter_map(|(id, vector)| match cosine_similarity(query, vector) {
        Some(score) => Some(ScoredCall { call_id: id.clone(), score }),
        None => {
          tracing::warn!(call_id = %id, "skipping candidate with undefined similarity");
          None
        }
      })
      .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.call_id.cmp(&b.call_id)));
    scored.truncate(k);
    scored
  }
}

/// In-memory exact index guarded by a read-write lock
#[derive(Debug, Default)]
pub struct SimilarityIndex {
  state: RwLock<IndexState>,
}

impl SimilarityIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// An empty index whose dimensionality is already fixed
  pub fn with_dimension(dimension: usize) -> Self {
    let state = IndexState { dimension: Some(dimension), entries: BTreeMap::new() };
    Self { state: RwLock::new(state) }
  }

  /// Index every record that carries an embedding.
  ///
  /// The dimensionality is the most common embedding length among the
  /// records (the shorter one on a tie), so it does not depend on record
  /// order. Records of any other length are logged and left out.
  pub fn from_records<'a, I>(records: I) -> Self
  where
    I: IntoIterator<Item = &'a TranscriptRecord>,
  {
    let embedded: Vec<(&str, &[f32])> = records
      .into_iter()
      .filter_map(|r| r.embedding.as_deref().map(|e| (r.id.as_str(), e)))
      .filter(|(_, e)| !e.is_empty())
      .collect();

    let mut lengths: BTreeMap<usize, usize> = BTreeMap::new();
    for (_, embedding) in &embedded {
      *lengths.entry(embedding.len()).or_default() += 1;
    }
    let Some(dimension) = majority_length(&lengths) else {
      return Self::new();
    };
    if lengths.len() > 1 {
      tracing::warn!(dimension, lengths = ?lengths, "stored embeddings have mixed lengths");
    }

    let index = Self::with_dimension(dimension);
    for (id, embedding) in embedded {
      if let Err(e) = index.insert(id, embedding.to_vec()) {
        tracing::warn!(call_id = %id, error = %e, "record left out of similarity index");
      }
    }
    index
  }

  /// Materialise the index from every embedded record in `store`.
  pub async fn load_from(store: &dyn TranscriptStore) -> Result<Self> {
    let records = store.list_with_embedding().await?;
    let index = Self::from_records(&records);
    tracing::debug!(entries = index.len(), "similarity index loaded");
    Ok(index)
  }

  fn read(&self) -> RwLockReadGuard<'_, IndexState> {
    self.state.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
    self.state.write().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Most frequent length; ties go to the shorter one
fn majority_length(lengths: &BTreeMap<usize, usize>) -> Option<usize> {
  lengths
    .iter()
    .max_by(|(len_a, count_a), (len_b, count_b)| count_a.cmp(count_b).then(len_b.cmp(len_a)))
    .map(|(len, _)| *len)
}

impl VectorIndex for SimilarityIndex {
  fn insert(&self, id: &str, vector: Vec<f32>) -> Result<()> {
    let mut state = self.write();
    let expected = state.dimension.unwrap_or(vector.len());
    if vector.is_empty() || vector.len() != expected {
      return Err(CallsightError::DimensionMismatch { expected, actual: vector.len() });
    }

    state.dimension = Some(expected);
    state.entries.insert(id.to_string(), vector);
    Ok(())
  }

  fn remove(&self, id: &str) -> bool {
    self.write().entries.remove(id).is_some()
  }

  fn top_k(&self, query_id: &str, k: usize) -> Vec<ScoredCall> {
    let state = self.read();
    match state.entries.get(query_id) {
      Some(query) => state.rank(query, k, Some(query_id)),
      None => Vec::new(),
    }
  }

  fn top_k_for_vector(
    &self,
    query: &[f32],
    k: usize,
    exclude: Option<&str>,
  ) -> Result<Vec<ScoredCall>> {
    let state = self.read();
    if let Some(expected) = state.dimension {
      if query.len() != expected {
        return Err(CallsightError::DimensionMismatch { expected, actual: query.len() });
      }
    }
    Ok(state.rank(query, k, exclude))
  }

  fn len(&self) -> usize {
    self.read().entries.len()
  }

  fn dimension(&self) -> Option<usize> {
    self.read().dimension
  }
}
