//! Store error types

use thiserror::Error;

/// Errors surfaced by the store adapter and its backends
#[derive(Debug, Error)]
pub enum StoreError {
  /// Value could not be encoded as JSON. Raised before any I/O happens.
  #[error("serialization error: {0}")]
  Serialize(#[source] serde_json::Error),

  /// Stored value could not be converted into the requested type
  #[error("cannot decode value at '{key}': {source}")]
  Decode {
    key: String,
    #[source]
    source: serde_json::Error,
  },

  /// Backing client failure (connection, protocol, wrong value type)
  #[error("backend error: {0}")]
  Backend(#[from] anyhow::Error),

  #[error("invalid configuration: {0}")]
  Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
