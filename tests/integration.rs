//! Integration tests for the cascade engine.

use std::collections::HashMap;

use cascade_engine::types::{AnalysisRequest, GraphSpec, Level, LogSource};
use cascade_engine::{Engine, RunConfig};

fn source(id: &str, service: &str, lines: Vec<String>) -> LogSource {
  LogSource {
    id: id.into(),
    service: service.into(),
    lines,
  }
}

/// n ERROR lines with a shared template, one per minute from `start_min`.
fn error_burst(message: &str, start_min: u32, n: u32) -> Vec<String> {
  (0..n)
    .map(|i| {
      let min = start_min + i;
      format!(
        "2025-01-15T{:02}:{:02}:00Z ERROR {} attempt {}",
        10 + min / 60,
        min % 60,
        message,
        i
      )
    })
    .collect()
}

fn request(sources: Vec<LogSource>, graph: Option<GraphSpec>) -> AnalysisRequest {
  AnalysisRequest {
    sources,
    dependency_graph: graph,
    baseline_rates: HashMap::new(),
    config: None,
  }
}

fn abc_graph() -> GraphSpec {
  GraphSpec {
    nodes: vec!["a".into(), "b".into(), "c".into()],
    edges: vec![("a".into(), "b".into()), ("b".into(), "c".into())],
  }
}

#[tokio::test]
async fn cascade_across_dependency_chain_has_single_root() {
  // A -> B -> C; bursts staggered 3 minutes apart per service.
  let engine = Engine::with_defaults();
  let report = engine
    .analyze(request(
      vec![
        source("a.log", "a", error_burst("db pool exhausted", 0, 5)),
        source("b.log", "b", error_burst("upstream call failed", 3, 5)),
        source("c.log", "c", error_burst("request rejected", 6, 5)),
      ],
      Some(abc_graph()),
    ))
    .await
    .unwrap();

  assert!(report.incident_detected);
  let anomalous: Vec<_> = report
    .clusters
    .iter()
    .filter(|c| c.anomaly.is_anomalous)
    .collect();
  assert_eq!(anomalous.len(), 3);

  assert_eq!(report.chains.len(), 1, "one chain spanning all three services");
  let chain = &report.chains[0];
  assert_eq!(chain.cluster_ids.len(), 3);
  assert_eq!(chain.root.service, "a");
  assert!(!chain.entangled);

  assert_eq!(report.error_counts_by_service.get("a"), Some(&5));
  assert_eq!(report.error_counts_by_service.get("b"), Some(&5));
  assert_eq!(report.error_counts_by_service.get("c"), Some(&5));
}

#[tokio::test]
async fn degraded_mode_splits_bursts_beyond_propagation_window() {
  // No graph; X at t=0, Y at t=30min with a 15min window: two chains.
  let engine = Engine::with_defaults();
  let report = engine
    .analyze(request(
      vec![
        source("x.log", "x", error_burst("boom", 0, 5)),
        source("y.log", "y", error_burst("bang", 30, 5)),
      ],
      None,
    ))
    .await
    .unwrap();

  assert_eq!(report.chains.len(), 2);
  assert!(report.chains.iter().all(|c| c.cluster_ids.len() == 1));
  let roots: Vec<&str> = report.chains.iter().map(|c| c.root.service.as_str()).collect();
  assert!(roots.contains(&"x") && roots.contains(&"y"));
}

#[tokio::test]
async fn graph_without_matching_services_equals_no_graph() {
  let sources = || {
    vec![
      source("x.log", "x", error_burst("boom", 0, 5)),
      source("y.log", "y", error_burst("bang", 5, 5)),
    ]
  };
  let engine = Engine::with_defaults();

  let without = engine.analyze(request(sources(), None)).await.unwrap();
  let unrelated_graph = GraphSpec {
    nodes: vec!["other-1".into(), "other-2".into()],
    edges: vec![("other-1".into(), "other-2".into())],
  };
  let with_unrelated = engine
    .analyze(request(sources(), Some(unrelated_graph)))
    .await
    .unwrap();

  assert_eq!(
    serde_json::to_string(&without.chains).unwrap(),
    serde_json::to_string(&with_unrelated.chains).unwrap(),
    "an irrelevant graph must behave exactly like no graph"
  );
}

#[tokio::test]
async fn zero_anomalous_clusters_is_no_incident() {
  let engine = Engine::with_defaults();
  let report = engine
    .analyze(request(
      vec![source(
        "app.log",
        "api",
        vec![
          "2025-01-15T10:00:00Z INFO started worker 1".into(),
          "2025-01-15T10:01:00Z INFO started worker 2".into(),
          "2025-01-15T10:02:00Z WARN queue depth 3".into(),
        ],
      )],
      None,
    ))
    .await
    .unwrap();

  assert!(!report.incident_detected);
  assert!(report.chains.is_empty());
  // Clusters and timeline are still reported for context.
  assert!(!report.clusters.is_empty());
  assert_eq!(report.timeline.len(), 3);
}

#[tokio::test]
async fn clusters_are_order_independent() {
  let engine = Engine::with_defaults();
  let mut lines: Vec<String> = error_burst("timeout shard 7", 0, 4);
  lines.extend(error_burst("cache miss", 2, 3));

  let forward = engine
    .analyze(request(
      vec![
        source("s1", "api", lines.clone()),
        source("s2", "worker", error_burst("oom killed", 1, 4)),
      ],
      None,
    ))
    .await
    .unwrap();

  lines.reverse();
  let permuted = engine
    .analyze(request(
      vec![
        // Sources swapped and one source's lines reversed.
        source("s2", "worker", error_burst("oom killed", 1, 4)),
        source("s1", "api", lines),
      ],
      None,
    ))
    .await
    .unwrap();

  let key = |report: &cascade_engine::AnalysisReport| {
    let mut k: Vec<(String, String, u64)> = report
      .clusters
      .iter()
      .map(|c| (c.signature.clone(), c.service.clone(), c.count))
      .collect();
    k.sort();
    k
  };
  assert_eq!(key(&forward), key(&permuted));
}

#[tokio::test]
async fn root_selection_is_stable_across_runs_and_reordered_input() {
  let engine = Engine::with_defaults();
  let sources = vec![
    source("a.log", "a", error_burst("db pool exhausted", 0, 5)),
    source("b.log", "b", error_burst("upstream call failed", 3, 5)),
    source("c.log", "c", error_burst("request rejected", 6, 5)),
  ];
  let mut reordered = sources.clone();
  reordered.rotate_left(1);

  let first = engine
    .analyze(request(sources, Some(abc_graph())))
    .await
    .unwrap();
  let second = engine
    .analyze(request(reordered, Some(abc_graph())))
    .await
    .unwrap();

  assert_eq!(first.chains[0].root.cluster_id, second.chains[0].root.cluster_id);
  assert_eq!(first.chains[0].id, second.chains[0].id);
}

#[tokio::test]
async fn severe_rare_cluster_is_flagged_despite_low_confidence() {
  let engine = Engine::with_defaults();
  let report = engine
    .analyze(request(
      vec![source(
        "db.log",
        "db",
        vec![
          "2025-01-15T10:00:00Z FATAL disk failure on sda1".into(),
          "2025-01-15T10:00:30Z FATAL disk failure on sda2".into(),
          "2025-01-15T10:01:00Z FATAL disk failure on sda3".into(),
        ],
      )],
      None,
    ))
    .await
    .unwrap();

  let cluster = &report.clusters[0];
  assert_eq!(cluster.level, Level::Fatal);
  assert_eq!(cluster.count, 3);
  assert!(
    cluster.anomaly.is_anomalous,
    "absolute-severity rule must fire with no baseline at all"
  );
}

#[tokio::test]
async fn mixed_formats_and_malformed_lines_are_accounted_per_source() {
  let engine = Engine::with_defaults();
  let report = engine
    .analyze(request(
      vec![
        source(
          "mixed.log",
          "api",
          vec![
            r#"{"timestamp":"2025-01-15T10:00:00Z","level":"error","message":"connection refused by 10.0.0.1"}"#.into(),
            "2025-01-15 10:00:10 ERROR [api] connection refused by 10.0.0.2".into(),
            "".into(),
            r#"{"timestamp":"2025-01-15T10:00:20Z"}"#.into(),
            "2025-01-15T10:00:30Z ERROR connection refused by 10.0.0.3".into(),
          ],
        ),
        source("clean.log", "worker", error_burst("queue stalled", 0, 3)),
      ],
      None,
    ))
    .await
    .unwrap();

  let mixed = report
    .source_diagnostics
    .iter()
    .find(|d| d.source_id == "mixed.log")
    .unwrap();
  assert_eq!(mixed.lines_read, 5);
  assert_eq!(mixed.events_normalized, 3);
  assert_eq!(mixed.malformed_count, 2);

  // All three refused-connection events share one masked cluster.
  let refused = report
    .clusters
    .iter()
    .find(|c| c.signature.contains("connection refused"))
    .unwrap();
  assert_eq!(refused.count, 3);
  assert_eq!(refused.signature, "connection refused by <IP>");
}

#[tokio::test]
async fn timeline_interleaves_sources_chronologically() {
  let engine = Engine::with_defaults();
  let report = engine
    .analyze(request(
      vec![
        source("a.log", "a", error_burst("db pool exhausted", 0, 3)),
        source("b.log", "b", error_burst("upstream call failed", 1, 3)),
      ],
      Some(abc_graph()),
    ))
    .await
    .unwrap();

  assert_eq!(report.timeline.len(), 6);
  let timestamps: Vec<&str> = report.timeline.iter().map(|t| t.timestamp.as_str()).collect();
  let mut sorted = timestamps.clone();
  sorted.sort();
  assert_eq!(timestamps, sorted);
  // Anomalous entries carry their chain annotation.
  assert!(report
    .timeline
    .iter()
    .all(|t| !t.anomalous || t.chain_index.is_some()));
}

#[tokio::test]
async fn per_request_config_overrides_are_honoured() {
  // Widen the propagation window so a 30-minute gap still links.
  let engine = Engine::with_defaults();
  let mut req = request(
    vec![
      source("x.log", "x", error_burst("boom", 0, 5)),
      source("y.log", "y", error_burst("bang", 30, 5)),
    ],
    None,
  );
  req.config = Some(RunConfig {
    max_propagation_window_minutes: 60,
    ..RunConfig::default()
  });

  let report = engine.analyze(req).await.unwrap();
  assert_eq!(report.chains.len(), 1);
  assert_eq!(report.chains[0].cluster_ids.len(), 2);
}

#[tokio::test]
async fn normalization_deadline_yields_partial_results_not_failure() {
  let engine = Engine::with_defaults();
  let big_source = |i: usize| {
    let lines: Vec<String> = (0..2000)
      .map(|n| format!("2025-01-15T10:00:00Z ERROR shard {} request {} failed", i, n))
      .collect();
    source(&format!("s{}.log", i), &format!("svc{}", i), lines)
  };
  let mut req = request((0..32).map(big_source).collect(), None);
  req.config = Some(RunConfig {
    normalize_timeout_ms: Some(1),
    ..RunConfig::default()
  });

  // Whether or not the deadline fires on this machine, the run must
  // succeed with whatever was normalized in time.
  let report = engine.analyze(req).await.unwrap();
  assert!(report.source_diagnostics.len() <= 32);
  if report.source_diagnostics.len() < 32 {
    assert!(report
      .warnings
      .iter()
      .any(|w| w.contains("normalization deadline expired")));
  }
}

#[tokio::test]
async fn generous_deadline_changes_nothing() {
  let engine = Engine::with_defaults();
  let build = |timeout| {
    let mut req = request(
      vec![source("a.log", "a", error_burst("db pool exhausted", 0, 5))],
      None,
    );
    req.config = Some(RunConfig {
      normalize_timeout_ms: timeout,
      ..RunConfig::default()
    });
    req
  };

  let with_deadline = engine.analyze(build(Some(60_000))).await.unwrap();
  let without = engine.analyze(build(None)).await.unwrap();
  assert_eq!(
    serde_json::to_string(&with_deadline).unwrap(),
    serde_json::to_string(&without).unwrap()
  );
}

#[tokio::test]
async fn deterministic_report_across_repeated_runs() {
  let engine = Engine::with_defaults();
  let build = || {
    request(
      vec![
        source("a.log", "a", error_burst("db pool exhausted", 0, 5)),
        source("b.log", "b", error_burst("upstream call failed", 3, 5)),
      ],
      Some(abc_graph()),
    )
  };

  let first = engine.analyze(build()).await.unwrap();
  let second = engine.analyze(build()).await.unwrap();
  assert_eq!(
    serde_json::to_string(&first).unwrap(),
    serde_json::to_string(&second).unwrap(),
    "same inputs must produce byte-identical JSON output"
  );
}
