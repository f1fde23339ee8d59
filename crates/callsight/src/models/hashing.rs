use anyhow::{bail, Result};
use fxhash::hash64;

use super::TextEncoder;

/// Words that carry no topical signal in call transcripts
const STOP_WORDS: &[&str] = &[
  // Speaker labels
  "agent", "customer", // Articles and determiners
  "the", "a", "an", // Conjunctions
  "and", "or", "but", // Prepositions
  "in", "on", "at", "to", "for", "of", "with", "by", // Common verbs
  "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
  "would", "could", "should", // Pronouns
  "i", "me", "my", "you", "your", "we", "our", "us", "it", "its",
];

/// Deterministic bag-of-words encoder
///
/// Each word is hashed into one of `dimension` buckets with a hash-derived sign,
/// and the resulting vector is L2-normalised. Texts sharing vocabulary point in
/// similar directions, which is enough for offline similarity ranking without a
/// neural model.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
  dimension: usize,
}

impl HashingEncoder {
  pub fn new(dimension: usize) -> Result<Self> {
    if dimension == 0 {
      bail!("hashing encoder dimension must be positive");
    }
    Ok(Self { dimension })
  }

  pub fn dimension(&self) -> usize {
    self.dimension
  }
}

fn normalize_word(word: &str) -> String {
  word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

impl TextEncoder for HashingEncoder {
  fn encode(&self, text: &str) -> Result<Vec<f32>> {
    let mut vector = vec![0f32; self.dimension];
    let mut words = 0usize;

    for word in text.split_whitespace().map(normalize_word) {
      if word.is_empty() || STOP_WORDS.contains(&word.as_str()) {
        continue;
      }
      let hash = hash64(word.as_bytes());
      let bucket = (hash % self.dimension as u64) as usize;
      let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
      vector[bucket] += sign;
      words += 1;
    }

    if words == 0 {
      bail!("text has no indexable words");
    }

    let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude < f32::EPSILON {
      bail!("hashed vector has zero magnitude");
    }
    for value in vector.iter_mut() {
      *value /= magnitude;
    }

    Ok(vector)
  }

  fn name(&self) -> &str {
    "feature-hashing"
  }
}
