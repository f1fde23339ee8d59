//! Similar calls plus coaching for one source call

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::coaching::CoachingAdvisor;
use crate::error::Result;
use crate::similarity::{ScoredCall, VectorIndex};
use crate::store::TranscriptStore;

/// Ranked similar calls and coaching nudges for one call.
///
/// `recommendations` is ordered by descending score, holds at most `k` entries
/// and never contains `source_call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  pub source_call_id: String,
  pub recommendations: Vec<ScoredCall>,
  pub coaching_nudges: Vec<String>,
}

#[derive(Clone)]
pub struct Recommender {
  store: Arc<dyn TranscriptStore>,
  index: Arc<dyn VectorIndex>,
  advisor: CoachingAdvisor,
}

impl Recommender {
  pub fn new(
    store: Arc<dyn TranscriptStore>,
    index: Arc<dyn VectorIndex>,
    advisor: CoachingAdvisor,
  ) -> Self {
    Self { store, index, advisor }
  }

  /// The `k` calls most similar to `call_id`.
  ///
  /// Fails with `NotFound` when the call is unknown or not embedded yet.
  pub async fn similar(&self, call_id: &str, k: usize) -> Result<Vec<ScoredCall>> {
    let record = self.store.fetch(call_id).await?;
    let embedding = record.require_embedding()?;
    self.index.top_k_for_vector(embedding, k, Some(call_id))
  }

  /// Coaching tips for a stored call.
  pub async fn advise(&self, call_id: &str) -> Result<Vec<String>> {
    let record = self.store.fetch(call_id).await?;
    Ok(self.advisor.advise(&record.text).await)
  }

  /// Similar calls and coaching nudges for `call_id`.
  ///
  /// The ranking and the coaching call run concurrently. A failed coaching call
  /// degrades to the fallback tips; only a missing call or embedding (and an
  /// embedding the index cannot compare against) fails the whole request.
  pub async fn recommend(&self, call_id: &str, k: usize) -> Result<Recommendation> {
    let record = self.store.fetch(call_id).await?;
    let embedding = record.require_embedding()?;

    let ranking = async { self.index.top_k_for_vector(embedding, k, Some(call_id)) };
    let (recommendations, outcome) = tokio::join!(ranking, self.advisor.coach(&record.text));

    let recommendations = recommendations?;
    tracing::debug!(%call_id, candidates = recommendations.len(), "recommendation ready");

    Ok(Recommendation {
      source_call_id: call_id.to_string(),
      recommendations,
      coaching_nudges: outcome.into_tips_or_fallback(),
    })
  }
}
