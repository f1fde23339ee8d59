use thiserror::Error;

/// Errors produced by the callsight core.
///
/// Only `NotFound` and `DimensionMismatch` are meant to reach a caller of the
/// feature/retrieval API. `ExtractionFailure`, `ServiceUnavailable` and
/// `RemoteCallFailure` are recovered inside the library to a documented default
/// and exist so that the recovery sites can log a typed diagnostic.
#[derive(Debug, Error)]
pub enum CallsightError {
  /// Unknown call identifier, or a call that has no embedding yet.
  #[error("call not found: {id}")]
  NotFound { id: String },

  /// Embedding length inconsistent with the index dimensionality.
  #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("feature extraction failed: {0}")]
  ExtractionFailure(String),

  #[error("service unavailable: {0}")]
  ServiceUnavailable(String),

  #[error("remote call failed: {0}")]
  RemoteCallFailure(String),

  #[error("storage error: {0}")]
  Storage(String),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl CallsightError {
  pub fn not_found(id: impl Into<String>) -> Self {
    Self::NotFound { id: id.into() }
  }

  /// True for the two variants that propagate to callers as hard errors.
  pub fn is_hard(&self) -> bool {
    matches!(self, Self::NotFound { .. } | Self::DimensionMismatch { .. })
  }
}

pub type Result<T> = std::result::Result<T, CallsightError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_not_found_message_names_id() {
    let err = CallsightError::not_found("call-42");
    assert!(err.to_string().contains("call-42"));
    assert!(err.is_hard());
  }

  #[test]
  fn test_dimension_mismatch_message() {
    let err = CallsightError::DimensionMismatch { expected: 384, actual: 3 };
    assert_eq!(err.to_string(), "embedding dimension mismatch: expected 384, got 3");
    assert!(err.is_hard());
  }

  #[test]
  fn test_recoverable_variants_are_not_hard() {
    let soft = [
      CallsightError::ExtractionFailure("bad".into()),
      CallsightError::ServiceUnavailable("no key".into()),
      CallsightError::RemoteCallFailure("timeout".into()),
    ];
    for err in soft {
      assert!(!err.is_hard(), "{err} should be recoverable");
    }
  }

  #[test]
  fn test_from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: CallsightError = io_err.into();
    assert!(err.to_string().starts_with("io error"));
  }
}
