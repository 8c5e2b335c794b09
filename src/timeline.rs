//! Merge every cluster's member events into one chronological sequence for
//! the external narrative collaborator. Built fresh on each call; nothing is
//! retained between calls.

use std::collections::HashMap;

use crate::types::{AnomalyFlag, Cluster, IncidentChain, LogEvent, TimelineEntry};

/// Assemble the annotated timeline. `chains` must already be ranked; the
/// annotation records each event's chain position, if any.
pub fn assemble(
  events: &[LogEvent],
  clusters: &[Cluster],
  flags: &[AnomalyFlag],
  chains: &[IncidentChain],
) -> Vec<TimelineEntry> {
  let mut cluster_of_event: HashMap<&str, usize> = HashMap::new();
  for (idx, cluster) in clusters.iter().enumerate() {
    for id in &cluster.member_event_ids {
      cluster_of_event.insert(id.as_str(), idx);
    }
  }

  let mut chain_of_cluster: HashMap<usize, usize> = HashMap::new();
  for (rank, chain) in chains.iter().enumerate() {
    for &idx in &chain.cluster_indices {
      chain_of_cluster.insert(idx, rank);
    }
  }

  let mut annotated: Vec<(&LogEvent, usize)> = events
    .iter()
    .filter_map(|event| {
      let cluster_idx = *cluster_of_event.get(event.id.as_str())?;
      Some((event, cluster_idx))
    })
    .collect();

  annotated.sort_by(|(a, _), (b, _)| {
    a.timestamp
      .cmp(&b.timestamp)
      .then_with(|| a.service.cmp(&b.service))
      .then_with(|| a.id.cmp(&b.id))
  });

  annotated
    .into_iter()
    .map(|(event, cluster_idx)| TimelineEntry {
      timestamp: event.timestamp.to_rfc3339(),
      time_inferred: event.time_inferred,
      service: event.service.clone(),
      level: event.level,
      message: event.message.clone(),
      event_id: event.id.clone(),
      cluster_id: clusters[cluster_idx].id.clone(),
      chain_index: chain_of_cluster.get(&cluster_idx).copied(),
      anomalous: flags[cluster_idx].is_anomalous,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cluster::build_clusters;
  use crate::config::RunConfig;
  use crate::types::Level;
  use chrono::{TimeZone, Utc};

  fn event(seq: usize, service: &str, message: &str, min: u32) -> LogEvent {
    LogEvent {
      id: format!("s#{}", seq),
      timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, min, 0).unwrap(),
      time_inferred: false,
      service: service.into(),
      level: Level::Error,
      message: message.into(),
      source_ref: "s".into(),
      raw: message.into(),
    }
  }

  #[test]
  fn timeline_is_chronological_and_annotated() {
    let events = vec![
      event(0, "api", "timeout after 30ms", 5),
      event(1, "db", "pool exhausted 20 of 20", 0),
      event(2, "api", "timeout after 9ms", 8),
    ];
    let config = RunConfig::default();
    let clusters = build_clusters(&events, &config);
    let flags: Vec<AnomalyFlag> = clusters
      .iter()
      .map(|_| AnomalyFlag {
        is_anomalous: false,
        score: 1.0,
        baseline_rate: 1.0,
        observed_rate: 1.0,
      })
      .collect();

    let timeline = assemble(&events, &clusters, &flags, &[]);
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[0].service, "db");
    assert!(timeline.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(timeline.iter().all(|t| t.chain_index.is_none()));
    assert!(!timeline[0].cluster_id.is_empty());
  }

  #[test]
  fn repeated_calls_yield_identical_sequences() {
    let events = vec![
      event(0, "api", "timeout after 30ms", 5),
      event(1, "db", "pool exhausted 20 of 20", 0),
    ];
    let config = RunConfig::default();
    let clusters = build_clusters(&events, &config);
    let flags: Vec<AnomalyFlag> = clusters
      .iter()
      .map(|_| AnomalyFlag {
        is_anomalous: true,
        score: 9.0,
        baseline_rate: 0.1,
        observed_rate: 0.9,
      })
      .collect();

    let a = assemble(&events, &clusters, &flags, &[]);
    let b = assemble(&events, &clusters, &flags, &[]);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
      assert_eq!(x.event_id, y.event_id);
      assert_eq!(x.cluster_id, y.cluster_id);
    }
  }
}
