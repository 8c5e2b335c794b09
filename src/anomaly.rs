//! Flag clusters whose rate or severity deviates from a baseline.
//!
//! The observed rate is events/minute over the run's analysis window. The
//! baseline comes from externally supplied historical rates when present,
//! otherwise from the window-wide average across same-(service, level)
//! clusters in this run. Rare but severe clusters are caught by an absolute
//! occurrence rule regardless of rate.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::RunConfig;
use crate::types::{AnomalyFlag, Cluster, Level};

fn round3(x: f64) -> f64 {
  (x * 1000.0).round() / 1000.0
}

/// Analysis window in minutes, floored at one so a same-instant burst does
/// not divide by zero.
fn window_minutes(clusters: &[Cluster]) -> f64 {
  let first: Option<DateTime<Utc>> = clusters.iter().map(|c| c.first_seen).min();
  let last: Option<DateTime<Utc>> = clusters.iter().map(|c| c.last_seen).max();
  match (first, last) {
    (Some(first), Some(last)) => ((last - first).num_seconds() as f64 / 60.0).max(1.0),
    _ => 1.0,
  }
}

/// Score every cluster. Flags are returned in cluster order; no cluster is
/// ever dropped here, non-anomalous ones just stay out of the cascade.
pub fn score_clusters(
  clusters: &[Cluster],
  baseline_rates: &HashMap<String, f64>,
  config: &RunConfig,
) -> Vec<AnomalyFlag> {
  let window = window_minutes(clusters);
  let observed: Vec<f64> = clusters.iter().map(|c| c.count as f64 / window).collect();

  // Same-run proxy: mean observed rate across clusters of the same
  // (service, level).
  let mut proxy_sum: HashMap<(&str, Level), (f64, u64)> = HashMap::new();
  for (cluster, rate) in clusters.iter().zip(&observed) {
    let entry = proxy_sum
      .entry((cluster.service.as_str(), cluster.level))
      .or_insert((0.0, 0));
    entry.0 += rate;
    entry.1 += 1;
  }

  clusters
    .iter()
    .zip(&observed)
    .map(|(cluster, &observed_rate)| {
      let supplied = baseline_rates
        .get(&cluster.signature.0)
        .copied()
        .filter(|&r| r > 0.0);
      let baseline_rate = supplied.unwrap_or_else(|| {
        let (sum, n) = proxy_sum[&(cluster.service.as_str(), cluster.level)];
        sum / n as f64
      });

      let score = if baseline_rate > 0.0 {
        observed_rate / baseline_rate
      } else {
        observed_rate
      };

      let rate_anomalous =
        baseline_rate > 0.0 && observed_rate >= config.anomaly_threshold * baseline_rate;
      // Absolute rule: severe clusters are never missed just because no
      // meaningful baseline exists.
      let severity_anomalous =
        cluster.level.is_severe() && cluster.count >= config.min_absolute_occurrences;

      AnomalyFlag {
        is_anomalous: rate_anomalous || severity_anomalous,
        score: round3(score),
        baseline_rate: round3(baseline_rate),
        observed_rate: round3(observed_rate),
      }
    })
    .collect()
}
