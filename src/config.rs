//! Run configuration with sane defaults, validated before processing starts.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Tunable thresholds for one engine run.
///
/// The propagation window and anomaly multiplier are engineering defaults,
/// not extracted constants; callers override them per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
  /// Observed rate must reach this multiple of the baseline to flag a cluster.
  pub anomaly_threshold: f64,
  /// ERROR/FATAL clusters with at least this many events are always anomalous.
  pub min_absolute_occurrences: u64,
  /// Max minutes between onsets for a temporal-only causal edge.
  pub max_propagation_window_minutes: i64,
  /// Clusters below this count are marked low-confidence (never dropped).
  pub min_cluster_occurrence: u64,
  /// Per-run normalization deadline in milliseconds; None = no deadline.
  pub normalize_timeout_ms: Option<u64>,
}

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      anomaly_threshold: 5.0,
      min_absolute_occurrences: 3,
      max_propagation_window_minutes: 15,
      min_cluster_occurrence: 2,
      normalize_timeout_ms: None,
    }
  }
}

impl RunConfig {
  /// Reject invalid configuration before any source is read.
  pub fn validate(&self) -> Result<(), EngineError> {
    if !self.anomaly_threshold.is_finite() || self.anomaly_threshold <= 0.0 {
      return Err(EngineError::config(
        "anomaly_threshold",
        "must be finite and > 0",
      ));
    }
    if self.min_absolute_occurrences == 0 {
      return Err(EngineError::config(
        "min_absolute_occurrences",
        "must be >= 1",
      ));
    }
    if self.max_propagation_window_minutes < 0 {
      return Err(EngineError::config(
        "max_propagation_window_minutes",
        "must be >= 0",
      ));
    }
    if self.min_cluster_occurrence == 0 {
      return Err(EngineError::config("min_cluster_occurrence", "must be >= 1"));
    }
    if self.normalize_timeout_ms == Some(0) {
      return Err(EngineError::config(
        "normalize_timeout_ms",
        "must be > 0 when set",
      ));
    }
    Ok(())
  }
}
