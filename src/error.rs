//! Structured error types for the cascade engine.
//!
//! Invalid run configuration is the only fatal condition; malformed lines,
//! missing graphs and timeouts all degrade locally and are surfaced on the
//! report instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("config: {field}: {reason}")]
  Config { field: String, reason: String },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl EngineError {
  pub fn config(field: &str, reason: &str) -> Self {
    Self::Config {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}
