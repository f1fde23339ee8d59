//! Command-line front end over a JSON call store

pub mod commands;
pub mod display;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::coaching::CoachingAdvisor;
use crate::config::Config;
use crate::features::FeatureExtractor;
use crate::models::ModelRegistry;
use crate::recommend::Recommender;
use crate::similarity::SimilarityIndex;
use crate::store::JsonFileStore;

/// Everything a command needs, resolved once from configuration
pub struct Context {
  pub config: Config,
  pub store: Arc<JsonFileStore>,
  pub registry: Arc<ModelRegistry>,
  pub json: bool,
}

impl Context {
  pub fn load(config_path: Option<&Path>, data: Option<PathBuf>, json: bool) -> Result<Self> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    if let Some(data) = data {
      config.data_path = data;
    }

    let store = JsonFileStore::open(&config.data_path)
      .with_context(|| format!("Failed to open call store {}", config.data_path.display()))?;
    let registry = ModelRegistry::global(&config);

    Ok(Self { config, store: Arc::new(store), registry, json })
  }

  pub fn extractor(&self) -> FeatureExtractor {
    FeatureExtractor::new(Arc::clone(&self.registry), self.config.sentiment.max_chars)
  }

  pub fn advisor(&self) -> CoachingAdvisor {
    CoachingAdvisor::new(Arc::clone(&self.registry), &self.config.coaching)
  }

  /// Similarity index over every embedded call in the store
  pub async fn index(&self) -> Result<SimilarityIndex> {
    Ok(SimilarityIndex::load_from(self.store.as_ref()).await?)
  }

  pub async fn recommender(&self) -> Result<Recommender> {
    let index = self.index().await?;
    Ok(Recommender::new(self.store.clone(), Arc::new(index), self.advisor()))
  }

  pub fn k_or_default(&self, k: Option<usize>) -> usize {
    k.unwrap_or(self.config.recommend.default_k)
  }
}
