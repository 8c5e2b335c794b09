//! Group normalized events into clusters keyed by (signature, service).
//!
//! Clustering is order-independent: any permutation of the input events
//! (within or across sources) yields the identical cluster set, so sources
//! normalized concurrently can be merged in any order.

use std::collections::HashMap;

use crate::config::RunConfig;
use crate::signature;
use crate::types::{Cluster, LogEvent, Signature};

/// Stable hex id for a (service, signature) pair.
fn cluster_id(service: &str, sig: &Signature) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(service.as_bytes());
  hasher.update(b"|");
  hasher.update(sig.0.as_bytes());
  let hex = hasher.finalize().to_hex();
  format!("cl-{}", &hex[..16])
}

/// Build clusters from the merged event set. Events of every level are
/// clustered; severity only matters to the scorer later. Output is sorted
/// by (first_seen, service, signature) for determinism.
pub fn build_clusters(events: &[LogEvent], config: &RunConfig) -> Vec<Cluster> {
  let mut groups: HashMap<(Signature, String), Vec<usize>> = HashMap::new();
  for (idx, event) in events.iter().enumerate() {
    let sig = signature::mask(&event.message);
    groups.entry((sig, event.service.clone())).or_default().push(idx);
  }

  let mut clusters: Vec<Cluster> = groups
    .into_iter()
    .map(|((sig, service), member_indices)| {
      let members: Vec<&LogEvent> = member_indices.iter().map(|&i| &events[i]).collect();
      let first_seen = members.iter().map(|e| e.timestamp).min().unwrap();
      let last_seen = members.iter().map(|e| e.timestamp).max().unwrap();
      let level = members.iter().map(|e| e.level).max().unwrap();
      // Permutation-stable sample: the (timestamp, message)-minimal member.
      let sample = members
        .iter()
        .min_by(|a, b| {
          a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.message.cmp(&b.message))
        })
        .unwrap();
      let mut member_event_ids: Vec<String> =
        members.iter().map(|e| e.id.clone()).collect();
      member_event_ids.sort();
      let count = members.len() as u64;

      Cluster {
        id: cluster_id(&service, &sig),
        low_confidence: count < config.min_cluster_occurrence,
        sample_message: sample.message.clone(),
        signature: sig,
        service,
        level,
        count,
        first_seen,
        last_seen,
        member_event_ids,
      }
    })
    .collect();

  clusters.sort_by(|a, b| {
    a.first_seen
      .cmp(&b.first_seen)
      .then_with(|| a.service.cmp(&b.service))
      .then_with(|| a.signature.cmp(&b.signature))
  });
  clusters
}
