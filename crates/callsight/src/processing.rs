//! Batch feature extraction over calls that have not been embedded yet

use serde::Serialize;

use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::record::TranscriptRecord;
use crate::similarity::VectorIndex;
use crate::store::TranscriptStore;

/// Processed records are written to the store in groups of this size
pub const SAVE_BATCH_SIZE: usize = 64;

/// Counts from one processing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingReport {
  /// Records that were pending at the start of the pass
  pub total: usize,
  /// Records whose features were saved
  pub processed: usize,
  /// Records skipped for having no text
  pub skipped: usize,
  /// Processed records for which no embedding could be produced
  pub without_embedding: usize,
  /// Processed records whose embedding the index refused; saved without it
  pub rejected: usize,
}

/// Write one batch, taking its ids back out of the index if the write fails.
async fn flush(
  store: &dyn TranscriptStore,
  index: &dyn VectorIndex,
  batch: &mut Vec<TranscriptRecord>,
) -> Result<()> {
  if batch.is_empty() {
    return Ok(());
  }
  let records = std::mem::take(batch);
  let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
  if let Err(e) = store.save_many(records).await {
    for id in &ids {
      index.remove(id);
    }
    return Err(e);
  }
  tracing::debug!(count = ids.len(), "saved processed transcripts");
  Ok(())
}

/// Extract and save features for every pending record, indexing new embeddings.
///
/// An embedding is only stored once the index has accepted it, so the stored
/// corpus keeps a single dimensionality. Extraction problems are counted,
/// never raised; only storage failures abort the pass. Saves are grouped into
/// batches of [`SAVE_BATCH_SIZE`].
pub async fn process_pending(
  store: &dyn TranscriptStore,
  extractor: &FeatureExtractor,
  index: &dyn VectorIndex,
) -> Result<ProcessingReport> {
  let pending = store.list_pending().await?;
  let mut report = ProcessingReport { total: pending.len(), ..ProcessingReport::default() };

  if pending.is_empty() {
    tracing::info!("no new transcripts to process");
    return Ok(report);
  }
  tracing::info!(total = report.total, "processing transcripts");

  let mut batch = Vec::with_capacity(SAVE_BATCH_SIZE.min(pending.len()));
  for (position, mut record) in pending.into_iter().enumerate() {
    if record.text.trim().is_empty() {
      tracing::warn!(call_id = %record.id, "skipping transcript with empty text");
      report.skipped += 1;
      continue;
    }

    let features = extractor.extract_features(&record.text).await;
    record.apply_features(features);

    match record.embedding.take() {
      Some(vector) => match index.insert(&record.id, vector.clone()) {
        Ok(()) => record.embedding = Some(vector),
        Err(e) => {
          tracing::warn!(call_id = %record.id, error = %e, "embedding not indexed or stored");
          report.rejected += 1;
        }
      },
      None => report.without_embedding += 1,
    }

    tracing::info!(
      call_id = %record.id,
      done = position + 1,
      total = report.total,
      "processed transcript"
    );
    report.processed += 1;
    batch.push(record);
    if batch.len() >= SAVE_BATCH_SIZE {
      flush(store, index, &mut batch).await?;
    }
  }
  flush(store, index, &mut batch).await?;

  Ok(report)
}
