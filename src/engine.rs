//! Per-run orchestration: concurrent normalization, then the synchronous
//! clustering → scoring → cascade → timeline pipeline.
//!
//! The engine is instantiated fresh per run and holds no mutable state
//! between invocations; every input arrives as an explicit parameter.

use std::collections::BTreeMap;

use tokio::task::JoinSet;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use crate::anomaly;
use crate::cascade;
use crate::cluster;
use crate::config::RunConfig;
use crate::error::EngineError;
use crate::graph::DependencyGraph;
use crate::normalize::{self, NormalizedSource};
use crate::timeline;
use crate::types::*;

/// The cascade correlation engine. Owns only configuration.
#[derive(Debug)]
pub struct Engine {
  config: RunConfig,
}

impl Engine {
  /// Invalid configuration is rejected here, before any source is read.
  pub fn new(config: RunConfig) -> Result<Self, EngineError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn with_defaults() -> Self {
    Self {
      config: RunConfig::default(),
    }
  }

  pub fn config(&self) -> &RunConfig {
    &self.config
  }

  /// Run one full analysis over a closed batch of sources.
  ///
  /// The only error is an invalid per-request configuration override; every
  /// other failure degrades locally and is reported in `warnings` or the
  /// per-source diagnostics.
  pub async fn analyze(
    &self,
    request: AnalysisRequest,
  ) -> Result<AnalysisReport, EngineError> {
    let config = match &request.config {
      Some(override_config) => {
        override_config.validate()?;
        override_config.clone()
      }
      None => self.config.clone(),
    };

    let graph = match &request.dependency_graph {
      Some(spec) => DependencyGraph::from_spec(spec),
      None => DependencyGraph::empty(),
    };
    if graph.is_empty() {
      debug!("no dependency graph supplied; temporal-only correlation");
    }

    let mut warnings = Vec::new();
    let normalized = normalize_all(request.sources, &config, &mut warnings).await;

    let mut events = Vec::new();
    let mut diagnostics = Vec::new();
    for source in normalized.into_values() {
      events.extend(source.events);
      diagnostics.push(source.diagnostics);
    }
    for d in &diagnostics {
      if d.malformed_count > 0 {
        warn!(
          source = %d.source_id,
          malformed = d.malformed_count,
          "source contained malformed lines"
        );
      }
    }

    let mut error_counts_by_service: BTreeMap<String, u64> = BTreeMap::new();
    for event in events.iter().filter(|e| e.level.is_severe()) {
      *error_counts_by_service.entry(event.service.clone()).or_insert(0) += 1;
    }

    let clusters = cluster::build_clusters(&events, &config);
    let flags = anomaly::score_clusters(&clusters, &request.baseline_rates, &config);
    let chains = cascade::build_chains(&clusters, &flags, &graph, &config);
    let timeline = timeline::assemble(&events, &clusters, &flags, &chains);

    info!(
      events = events.len(),
      clusters = clusters.len(),
      anomalous = flags.iter().filter(|f| f.is_anomalous).count(),
      chains = chains.len(),
      "analysis complete"
    );

    Ok(assemble_report(
      clusters,
      flags,
      chains,
      timeline,
      error_counts_by_service,
      diagnostics,
      warnings,
    ))
  }
}

/// Normalize every source, one task each, honoring the per-run deadline.
///
/// On expiry outstanding tasks are cancelled and the run proceeds with
/// whatever finished: partial results, never a hard failure. Results are
/// keyed by source index so task completion order never leaks into output.
async fn normalize_all(
  sources: Vec<LogSource>,
  config: &RunConfig,
  warnings: &mut Vec<String>,
) -> BTreeMap<usize, NormalizedSource> {
  let total = sources.len();
  let mut tasks = JoinSet::new();
  for (index, source) in sources.into_iter().enumerate() {
    tasks.spawn(async move { (index, normalize::normalize_source(&source)) });
  }

  let deadline = config
    .normalize_timeout_ms
    .map(|ms| Instant::now() + Duration::from_millis(ms));

  let mut normalized = BTreeMap::new();
  loop {
    let joined = match deadline {
      Some(deadline) => tokio::select! {
        joined = tasks.join_next() => joined,
        _ = sleep_until(deadline) => {
          tasks.abort_all();
          warnings.push(format!(
            "normalization deadline expired; continuing with {} of {} sources",
            normalized.len(),
            total
          ));
          warn!(done = normalized.len(), total, "normalization timed out");
          break;
        }
      },
      None => tasks.join_next().await,
    };
    match joined {
      Some(Ok((index, source))) => {
        normalized.insert(index, source);
      }
      Some(Err(join_error)) => {
        // An isolated source failure must not abort the others.
        warnings.push(format!("source task failed: {}", join_error));
        warn!(%join_error, "normalization task failed");
      }
      None => break,
    }
  }
  normalized
}

fn assemble_report(
  clusters: Vec<Cluster>,
  flags: Vec<AnomalyFlag>,
  chains: Vec<IncidentChain>,
  timeline: Vec<TimelineEntry>,
  error_counts_by_service: BTreeMap<String, u64>,
  mut diagnostics: Vec<SourceDiagnostics>,
  warnings: Vec<String>,
) -> AnalysisReport {
  diagnostics.sort_by(|a, b| a.source_id.cmp(&b.source_id));

  let cluster_summaries: Vec<ClusterSummary> = clusters
    .iter()
    .zip(&flags)
    .map(|(cluster, flag)| ClusterSummary {
      id: cluster.id.clone(),
      signature: cluster.signature.0.clone(),
      service: cluster.service.clone(),
      level: cluster.level,
      category: ErrorCategory::classify(&cluster.signature.0),
      count: cluster.count,
      first_seen: cluster.first_seen.to_rfc3339(),
      last_seen: cluster.last_seen.to_rfc3339(),
      sample_message: cluster.sample_message.clone(),
      low_confidence: cluster.low_confidence,
      anomaly: *flag,
      member_event_ids: cluster.member_event_ids.clone(),
    })
    .collect();

  let chain_summaries: Vec<ChainSummary> = chains
    .iter()
    .map(|chain| {
      let root = &clusters[chain.root_index];
      ChainSummary {
        id: chain.id.clone(),
        root: RootCandidate {
          cluster_id: root.id.clone(),
          service: root.service.clone(),
          signature: root.signature.0.clone(),
        },
        cluster_ids: chain
          .cluster_indices
          .iter()
          .map(|&i| clusters[i].id.clone())
          .collect(),
        edges: chain
          .edges
          .iter()
          .map(|e| EdgeSummary {
            from_cluster: clusters[e.from].id.clone(),
            to_cluster: clusters[e.to].id.clone(),
            confidence: e.confidence,
          })
          .collect(),
        entangled: chain.entangled,
      }
    })
    .collect();

  AnalysisReport {
    incident_detected: !chain_summaries.is_empty(),
    clusters: cluster_summaries,
    chains: chain_summaries,
    timeline,
    error_counts_by_service,
    source_diagnostics: diagnostics,
    warnings,
    narrative: None,
  }
}
