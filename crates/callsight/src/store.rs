//! Storage collaborator for transcript records
//!
//! The core only needs `fetch`, `save` and `list_with_embedding`; two
//! implementations are provided: an in-memory map for tests and embedding
//! callers, and a JSON file used by the CLI.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::error::{CallsightError, Result};
use crate::record::TranscriptRecord;

#[async_trait]
pub trait TranscriptStore: Send + Sync {
  /// The record for `id`, or `NotFound`.
  async fn fetch(&self, id: &str) -> Result<TranscriptRecord>;

  /// Insert or replace a whole record.
  async fn save(&self, record: TranscriptRecord) -> Result<()>;

  async fn save_many(&self, records: Vec<TranscriptRecord>) -> Result<()> {
    for record in records {
      self.save(record).await?;
    }
    Ok(())
  }

  /// Every record, ordered by id
  async fn list(&self) -> Result<Vec<TranscriptRecord>>;

  async fn list_with_embedding(&self) -> Result<Vec<TranscriptRecord>> {
    Ok(self.list().await?.into_iter().filter(TranscriptRecord::has_embedding).collect())
  }

  /// Records that have not been embedded yet
  async fn list_pending(&self) -> Result<Vec<TranscriptRecord>> {
    Ok(self.list().await?.into_iter().filter(|r| !r.has_embedding()).collect())
  }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  records: RwLock<BTreeMap<String, TranscriptRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_records(records: impl IntoIterator<Item = TranscriptRecord>) -> Self {
    let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
    Self { records: RwLock::new(records) }
  }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
  async fn fetch(&self, id: &str) -> Result<TranscriptRecord> {
    let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
    records.get(id).cloned().ok_or_else(|| CallsightError::not_found(id))
  }

  async fn save(&self, record: TranscriptRecord) -> Result<()> {
    let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
    records.insert(record.id.clone(), record);
    Ok(())
  }

  async fn list(&self) -> Result<Vec<TranscriptRecord>> {
    let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
    Ok(records.values().cloned().collect())
  }
}

/// Records kept as a pretty-printed JSON array in one file.
///
/// Every write replaces the file through a temporary sibling and a rename, so
/// a crash never leaves a half-written record behind.
#[derive(Debug)]
pub struct JsonFileStore {
  path: PathBuf,
  records: Mutex<BTreeMap<String, TranscriptRecord>>,
}

impl JsonFileStore {
  /// Open the store at `path`; a missing or empty file is an empty store.
  pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let records = if path.exists() {
      let content = std::fs::read_to_string(&path)?;
      if content.trim().is_empty() {
        BTreeMap::new()
      } else {
        let list: Vec<TranscriptRecord> = serde_json::from_str(&content).map_err(|e| {
          CallsightError::Storage(format!("failed to parse {}: {}", path.display(), e))
        })?;
        list.into_iter().map(|r| (r.id.clone(), r)).collect()
      }
    } else {
      BTreeMap::new()
    };

    tracing::debug!(path = %path.display(), records = records.len(), "opened call store");
    Ok(Self { path, records: Mutex::new(records) })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn persist(&self, records: &BTreeMap<String, TranscriptRecord>) -> Result<()> {
    let parent = match self.path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
      _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let list: Vec<&TranscriptRecord> = records.values().collect();
    let content = serde_json::to_string_pretty(&list)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(&self.path).map_err(|e| {
      CallsightError::Storage(format!("failed to write {}: {}", self.path.display(), e.error))
    })?;
    Ok(())
  }
}

#[async_trait]
impl TranscriptStore for JsonFileStore {
  async fn fetch(&self, id: &str) -> Result<TranscriptRecord> {
    let records = self.records.lock().await;
    records.get(id).cloned().ok_or_else(|| CallsightError::not_found(id))
  }

  async fn save(&self, record: TranscriptRecord) -> Result<()> {
    self.save_many(vec![record]).await
  }

  /// One file write for the whole batch; the in-memory view only changes when
  /// that write succeeds.
  async fn save_many(&self, batch: Vec<TranscriptRecord>) -> Result<()> {
    let mut records = self.records.lock().await;
    let mut updated = records.clone();
    for record in batch {
      updated.insert(record.id.clone(), record);
    }
    self.persist(&updated)?;
    *records = updated;
    Ok(())
  }

  async fn list(&self) -> Result<Vec<TranscriptRecord>> {
    let records = self.records.lock().await;
    Ok(records.values().cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::CallFeatures;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_memory_store_fetch_and_filters() {
    let store = MemoryStore::with_records([
      TranscriptRecord::new("b", "agent: hi").with_embedding(vec![1.0]),
      TranscriptRecord::new("a", "agent: hello"),
    ]);

    assert!(matches!(store.fetch("missing").await, Err(CallsightError::NotFound { .. })));
    assert_eq!(store.fetch("a").await.unwrap().text, "agent: hello");

    let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(store.list_with_embedding().await.unwrap()[0].id, "b");
    assert_eq!(store.list_pending().await.unwrap()[0].id, "a");
  }

  #[tokio::test]
  async fn test_json_store_round_trips_through_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("calls.json");

    let store = JsonFileStore::open(&path).unwrap();
    assert!(store.list().await.unwrap().is_empty());

    let mut record = TranscriptRecord::new("c1", "agent: welcome").with_agent("agent_007");
    record.features = Some(CallFeatures { talk_ratio: 1.0, sentiment: 0.8 });
    record.embedding = Some(vec![0.6, 0.8]);
    store.save(record.clone()).await.unwrap();
    store.save(TranscriptRecord::new("c2", "customer: hi")).await.unwrap();

    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.fetch("c1").await.unwrap(), record);
    assert_eq!(reopened.list().await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_json_store_save_overwrites() {
    let temp = TempDir::new().unwrap();
    let store = JsonFileStore::open(temp.path().join("calls.json")).unwrap();

    store.save(TranscriptRecord::new("c1", "first")).await.unwrap();
    store.save(TranscriptRecord::new("c1", "second")).await.unwrap();

    let records = store.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "second");
  }

  #[test]
  fn test_corrupt_file_is_a_storage_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("calls.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(JsonFileStore::open(&path), Err(CallsightError::Storage(_))));

    std::fs::write(&path, "  \n").unwrap();
    assert!(JsonFileStore::open(&path).is_ok());
  }
}
