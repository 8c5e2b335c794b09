//! Core types for the cascade engine (JSON contracts + internal models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::RunConfig;

// ---------------------------------------------------------------------------
// Inbound types (JSON contract — what the caller sends)
// ---------------------------------------------------------------------------

/// One named log source: an ordered sequence of raw lines plus the service
/// the lines are attributed to (individual lines may override it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSource {
  pub id: String,
  pub service: String,
  pub lines: Vec<String>,
}

/// Externally supplied service dependency document. Edges are
/// `(upstream, downstream)` pairs. Unknown fields are silently ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSpec {
  #[serde(default)]
  pub nodes: Vec<String>,
  #[serde(default)]
  pub edges: Vec<(String, String)>,
}

/// Everything one engine run consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
  pub sources: Vec<LogSource>,
  #[serde(default)]
  pub dependency_graph: Option<GraphSpec>,
  /// Historical per-signature rates (events/minute) from an external
  /// collaborator; absent signatures fall back to the same-run proxy.
  #[serde(default)]
  pub baseline_rates: HashMap<String, f64>,
  /// Per-run configuration override; validated before processing begins.
  #[serde(default)]
  pub config: Option<RunConfig>,
}

// ---------------------------------------------------------------------------
// Level enum (normalized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
  Unknown,
  Debug,
  Info,
  Warn,
  Error,
  Fatal,
}

impl Level {
  pub fn from_str_loose(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "trace" | "debug" => Self::Debug,
      "info" | "notice" => Self::Info,
      "warn" | "warning" => Self::Warn,
      "error" | "err" => Self::Error,
      "fatal" | "critical" | "crit" | "emerg" => Self::Fatal,
      _ => Self::Unknown,
    }
  }

  pub fn score(self) -> u8 {
    match self {
      Self::Unknown => 0,
      Self::Debug => 5,
      Self::Info => 10,
      Self::Warn => 30,
      Self::Error => 60,
      Self::Fatal => 90,
    }
  }

  pub fn is_severe(self) -> bool {
    matches!(self, Self::Error | Self::Fatal)
  }
}

// ---------------------------------------------------------------------------
// Internal normalized types
// ---------------------------------------------------------------------------

/// Canonical event after normalization. Immutable once created.
#[derive(Debug, Clone)]
pub struct LogEvent {
  /// Stable id: `<source>#<line-seq>`.
  pub id: String,
  pub timestamp: DateTime<Utc>,
  /// True when the timestamp came from file-order fallback, not the line.
  pub time_inferred: bool,
  pub service: String,
  pub level: Level,
  pub message: String,
  pub source_ref: String,
  pub raw: String,
}

/// A masked message template used as the clustering key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signature(pub String);

/// Group of events sharing (signature, service). Accumulates only during a
/// single run; never shared across runs.
#[derive(Debug, Clone)]
pub struct Cluster {
  /// Stable hex id derived from (service, signature).
  pub id: String,
  pub signature: Signature,
  pub service: String,
  /// Highest severity observed among members.
  pub level: Level,
  pub count: u64,
  pub first_seen: DateTime<Utc>,
  pub last_seen: DateTime<Utc>,
  pub sample_message: String,
  pub member_event_ids: Vec<String>,
  /// Count fell below the configured minimum occurrence. Retained anyway so
  /// rare but severe patterns still reach the scorer.
  pub low_confidence: bool,
}

/// Rate-based verdict attached to a cluster. Rates are events/minute over
/// the run's analysis window.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AnomalyFlag {
  pub is_anomalous: bool,
  pub score: f64,
  pub baseline_rate: f64,
  pub observed_rate: f64,
}

/// Edge confidence: graph-attested beats temporal-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
  Low,
  High,
}

/// "`from`'s onset plausibly enabled `to`'s onset." Indices point into the
/// run's cluster list.
#[derive(Debug, Clone, Copy)]
pub struct CausalEdge {
  pub from: usize,
  pub to: usize,
  pub confidence: Confidence,
}

/// One weakly-connected component of anomalous clusters, onset-ordered,
/// with a single designated root candidate.
#[derive(Debug, Clone)]
pub struct IncidentChain {
  pub id: String,
  /// Member clusters in onset order (indices into the run's cluster list).
  pub cluster_indices: Vec<usize>,
  pub edges: Vec<CausalEdge>,
  pub root_index: usize,
  /// The component contains a directed cycle; members are mutually
  /// entangled rather than strictly ordered.
  pub entangled: bool,
}

// ---------------------------------------------------------------------------
// Error categories (coarse classification over the masked signature)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
  Database,
  Network,
  Timeout,
  Memory,
  Application,
}

impl ErrorCategory {
  /// Keyword classification; first match wins, unmatched = Application.
  pub fn classify(signature: &str) -> Self {
    let s = signature.to_ascii_lowercase();
    const RULES: &[(ErrorCategory, &[&str])] = &[
      (
        ErrorCategory::Database,
        &["connection pool", "query", "sql", "postgres", "mysql", "database"],
      ),
      (
        ErrorCategory::Timeout,
        &["timeout", "timed out", "deadline exceeded"],
      ),
      (
        ErrorCategory::Network,
        &["network", "socket", "connection refused", "unreachable", "host"],
      ),
      (
        ErrorCategory::Memory,
        &["memory", "oom", "heap", "allocation"],
      ),
    ];
    for (category, terms) in RULES {
      if terms.iter().any(|t| s.contains(t)) {
        return *category;
      }
    }
    Self::Application
  }
}

// ---------------------------------------------------------------------------
// Output types (JSON contract — what we emit)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
  pub id: String,
  pub signature: String,
  pub service: String,
  pub level: Level,
  pub category: ErrorCategory,
  pub count: u64,
  pub first_seen: String,
  pub last_seen: String,
  pub sample_message: String,
  pub low_confidence: bool,
  pub anomaly: AnomalyFlag,
  pub member_event_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeSummary {
  pub from_cluster: String,
  pub to_cluster: String,
  pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootCandidate {
  pub cluster_id: String,
  pub service: String,
  pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
  pub id: String,
  pub root: RootCandidate,
  /// Member cluster ids in onset order.
  pub cluster_ids: Vec<String>,
  pub edges: Vec<EdgeSummary>,
  pub entangled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
  pub timestamp: String,
  pub time_inferred: bool,
  pub service: String,
  pub level: Level,
  pub message: String,
  pub event_id: String,
  pub cluster_id: String,
  /// Position of the owning chain in the ranked chain list, if any.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub chain_index: Option<usize>,
  pub anomalous: bool,
}

/// Per-source normalization accounting. Malformed lines never abort a run.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDiagnostics {
  pub source_id: String,
  pub lines_read: u64,
  pub events_normalized: u64,
  pub malformed_count: u64,
}

/// The structured incident-analysis result handed to the external narrative
/// collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
  /// False is the defined "no incident detected" outcome, not an error.
  pub incident_detected: bool,
  pub clusters: Vec<ClusterSummary>,
  /// Ranked highest-first.
  pub chains: Vec<ChainSummary>,
  pub timeline: Vec<TimelineEntry>,
  /// ERROR/FATAL event totals per service.
  pub error_counts_by_service: BTreeMap<String, u64>,
  pub source_diagnostics: Vec<SourceDiagnostics>,
  pub warnings: Vec<String>,
  /// Free-form prose returned by the collaborator; never consulted by the
  /// engine itself.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub narrative: Option<String>,
}

impl AnalysisReport {
  /// Attach the external collaborator's narrative text verbatim.
  pub fn with_narrative(mut self, text: impl Into<String>) -> Self {
    self.narrative = Some(text.into());
    self
  }
}

/// Structured error output for an invalid request at the process boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn level_loose_parsing() {
    assert_eq!(Level::from_str_loose("WARNING"), Level::Warn);
    assert_eq!(Level::from_str_loose("err"), Level::Error);
    assert_eq!(Level::from_str_loose("CRITICAL"), Level::Fatal);
    assert_eq!(Level::from_str_loose("whatever"), Level::Unknown);
  }

  #[test]
  fn level_severity_ordering() {
    assert!(Level::Fatal > Level::Error);
    assert!(Level::Error > Level::Warn);
    assert!(Level::Unknown < Level::Debug);
    assert!(Level::Fatal.is_severe());
    assert!(!Level::Warn.is_severe());
  }

  #[test]
  fn category_classification() {
    assert_eq!(
      ErrorCategory::classify("connection pool exhausted"),
      ErrorCategory::Database
    );
    assert_eq!(
      ErrorCategory::classify("request timed out after <NUM>s"),
      ErrorCategory::Timeout
    );
    assert_eq!(
      ErrorCategory::classify("connection refused by <IP>"),
      ErrorCategory::Network
    );
    assert_eq!(ErrorCategory::classify("oom killed"), ErrorCategory::Memory);
    assert_eq!(
      ErrorCategory::classify("unexpected nil pointer"),
      ErrorCategory::Application
    );
  }

  #[test]
  fn request_deserializes_with_defaults() {
    let json = r#"{"sources":[{"id":"a","service":"api","lines":["x"]}]}"#;
    let req: AnalysisRequest = serde_json::from_str(json).unwrap();
    assert!(req.dependency_graph.is_none());
    assert!(req.baseline_rates.is_empty());
    assert!(req.config.is_none());
  }
}
