//! Callsight - sales-call transcript analysis
//!
//! Derives per-call features (agent talk ratio, customer sentiment, semantic
//! embedding), ranks stored calls by cosine similarity, and pairs each ranking
//! with short coaching nudges from a remote language model, falling back to
//! fixed tips when no model is configured.

pub mod analytics;
pub mod cli;
pub mod coaching;
pub mod config;
pub mod error;
pub mod features;
pub mod listing;
pub mod models;
pub mod processing;
pub mod recommend;
pub mod record;
pub mod similarity;
pub mod store;

pub use coaching::{CoachingAdvisor, CoachingOutcome, FALLBACK_TIPS};
pub use config::Config;
pub use error::{CallsightError, Result};
pub use features::{FeatureExtractor, TranscriptFeatures};
pub use listing::{list_calls, CallFilter};
pub use models::{ModelHandle, ModelKind, ModelRegistry};
pub use processing::{process_pending, ProcessingReport};
pub use recommend::{Recommendation, Recommender};
pub use record::{CallFeatures, NewCall, TranscriptRecord};
pub use similarity::{cosine_similarity, ScoredCall, SimilarityIndex, VectorIndex};
pub use store::{JsonFileStore, MemoryStore, TranscriptStore};
