//! Link anomalous clusters into incident chains and pick root candidates.
//!
//! Edges are graph-attested (high confidence) when the dependency graph
//! says the later cluster's service sits downstream of the earlier one's,
//! or temporal-only (low confidence) in degraded mode when onsets fall
//! within the propagation window. Weakly-connected components of the
//! resulting digraph are the candidate chains. All ordering is
//! deterministic; reordered input produces identical chains.

use std::collections::{HashMap, HashSet};

use chrono::Duration;

use crate::config::RunConfig;
use crate::graph::DependencyGraph;
use crate::types::{AnomalyFlag, CausalEdge, Cluster, Confidence, IncidentChain};

/// Stable chain id from its member cluster ids.
fn chain_id(clusters: &[Cluster], members: &[usize]) -> String {
  let mut hasher = blake3::Hasher::new();
  for &idx in members {
    hasher.update(clusters[idx].id.as_bytes());
    hasher.update(b"|");
  }
  let hex = hasher.finalize().to_hex();
  format!("chain-{}", &hex[..16])
}

/// Build causal edges over the onset-ordered anomalous clusters.
///
/// `ordered` holds cluster indices sorted by (first_seen, service,
/// signature); for every pair the earlier element is the candidate cause.
fn build_edges(
  clusters: &[Cluster],
  ordered: &[usize],
  graph: &DependencyGraph,
  config: &RunConfig,
) -> Vec<CausalEdge> {
  let window = Duration::minutes(config.max_propagation_window_minutes);
  let mut edges = Vec::new();

  for (pos, &a) in ordered.iter().enumerate() {
    for &b in &ordered[pos + 1..] {
      let (from, to) = (&clusters[a], &clusters[b]);
      let mut attested = false;
      if graph.has_edge(&from.service, &to.service) {
        edges.push(CausalEdge {
          from: a,
          to: b,
          confidence: Confidence::High,
        });
        attested = true;
      }
      // Equal onsets qualify in both directions; a mutual dependency that
      // fails simultaneously is a genuine cycle.
      if from.first_seen == to.first_seen && graph.has_edge(&to.service, &from.service) {
        edges.push(CausalEdge {
          from: b,
          to: a,
          confidence: Confidence::High,
        });
        attested = true;
      }
      if attested {
        continue;
      }
      // Degraded, temporal-only mode: only when the graph has nothing to
      // say about either service.
      let degraded =
        graph.is_empty() || (!graph.contains(&from.service) && !graph.contains(&to.service));
      if degraded && to.first_seen - from.first_seen <= window {
        edges.push(CausalEdge {
          from: a,
          to: b,
          confidence: Confidence::Low,
        });
      }
    }
  }
  edges
}

/// Weakly-connected components, each reported in onset order. Singletons
/// are components too: an isolated anomalous cluster is its own chain.
fn connected_components(ordered: &[usize], edges: &[CausalEdge]) -> Vec<Vec<usize>> {
  let mut undirected: HashMap<usize, Vec<usize>> = HashMap::new();
  for edge in edges {
    undirected.entry(edge.from).or_default().push(edge.to);
    undirected.entry(edge.to).or_default().push(edge.from);
  }

  let mut seen: HashSet<usize> = HashSet::new();
  let mut components = Vec::new();
  for &start in ordered {
    if seen.contains(&start) {
      continue;
    }
    let mut stack = vec![start];
    let mut component = Vec::new();
    seen.insert(start);
    while let Some(node) = stack.pop() {
      component.push(node);
      if let Some(neighbors) = undirected.get(&node) {
        for &next in neighbors {
          if seen.insert(next) {
            stack.push(next);
          }
        }
      }
    }
    // Restore onset order within the component.
    let positions: HashMap<usize, usize> =
      ordered.iter().enumerate().map(|(p, &i)| (i, p)).collect();
    component.sort_by_key(|i| positions[i]);
    components.push(component);
  }
  components
}

/// Does the component's directed edge set contain a cycle?
fn has_cycle(members: &[usize], edges: &[CausalEdge]) -> bool {
  let member_set: HashSet<usize> = members.iter().copied().collect();
  let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
  for edge in edges {
    if member_set.contains(&edge.from) && member_set.contains(&edge.to) {
      adjacency.entry(edge.from).or_default().push(edge.to);
    }
  }

  // Iterative three-color DFS.
  #[derive(Clone, Copy, PartialEq)]
  enum Color {
    White,
    Gray,
    Black,
  }
  let mut color: HashMap<usize, Color> =
    members.iter().map(|&m| (m, Color::White)).collect();

  for &start in members {
    if color[&start] != Color::White {
      continue;
    }
    let mut stack = vec![(start, false)];
    while let Some((node, children_done)) = stack.pop() {
      if children_done {
        color.insert(node, Color::Black);
        continue;
      }
      if color[&node] == Color::Black {
        continue;
      }
      color.insert(node, Color::Gray);
      stack.push((node, true));
      if let Some(neighbors) = adjacency.get(&node) {
        for &next in neighbors {
          match color[&next] {
            Color::Gray => return true,
            Color::White => stack.push((next, false)),
            Color::Black => {}
          }
        }
      }
    }
  }
  false
}

/// Pick the root candidate: the member whose strongest incoming confidence
/// is minimal, then earliest onset, then fewest upstream dependencies, then
/// (service, signature) as the final deterministic tie-break.
fn select_root(
  clusters: &[Cluster],
  members: &[usize],
  edges: &[CausalEdge],
  graph: &DependencyGraph,
) -> usize {
  let mut incoming: HashMap<usize, Option<Confidence>> =
    members.iter().map(|&m| (m, None)).collect();
  for edge in edges {
    if let Some(best) = incoming.get_mut(&edge.to) {
      *best = Some(match *best {
        Some(prev) => prev.max(edge.confidence),
        None => edge.confidence,
      });
    }
  }

  let rank = |c: Option<Confidence>| match c {
    None => 0u8,
    Some(Confidence::Low) => 1,
    Some(Confidence::High) => 2,
  };

  *members
    .iter()
    .min_by(|&&a, &&b| {
      rank(incoming[&a])
        .cmp(&rank(incoming[&b]))
        .then_with(|| clusters[a].first_seen.cmp(&clusters[b].first_seen))
        .then_with(|| {
          graph
            .upstream_count(&clusters[a].service)
            .cmp(&graph.upstream_count(&clusters[b].service))
        })
        .then_with(|| clusters[a].service.cmp(&clusters[b].service))
        .then_with(|| clusters[a].signature.cmp(&clusters[b].signature))
    })
    .unwrap()
}

/// Build and rank incident chains from the anomalous subset of `clusters`.
/// An empty anomalous set yields zero chains: a normal "no incident" result.
pub fn build_chains(
  clusters: &[Cluster],
  flags: &[AnomalyFlag],
  graph: &DependencyGraph,
  config: &RunConfig,
) -> Vec<IncidentChain> {
  // Onset-ordered anomalous clusters; ties broken by service then signature
  // (the clusters slice is already sorted exactly this way).
  let ordered: Vec<usize> = clusters
    .iter()
    .enumerate()
    .filter(|(i, _)| flags[*i].is_anomalous)
    .map(|(i, _)| i)
    .collect();
  if ordered.is_empty() {
    return Vec::new();
  }

  let edges = build_edges(clusters, &ordered, graph, config);
  let components = connected_components(&ordered, &edges);

  let mut chains: Vec<IncidentChain> = components
    .into_iter()
    .map(|members| {
      let member_set: HashSet<usize> = members.iter().copied().collect();
      let mut chain_edges: Vec<CausalEdge> = edges
        .iter()
        .filter(|e| member_set.contains(&e.from) && member_set.contains(&e.to))
        .copied()
        .collect();
      chain_edges.sort_by_key(|e| (e.from, e.to));

      let entangled = has_cycle(&members, &chain_edges);
      let root_index = if entangled {
        // Mutually entangled: fall back to the earliest onset.
        *members
          .iter()
          .min_by(|&&a, &&b| {
            clusters[a]
              .first_seen
              .cmp(&clusters[b].first_seen)
              .then_with(|| clusters[a].service.cmp(&clusters[b].service))
              .then_with(|| clusters[a].signature.cmp(&clusters[b].signature))
          })
          .unwrap()
      } else {
        select_root(clusters, &members, &chain_edges, graph)
      };

      IncidentChain {
        id: chain_id(clusters, &members),
        cluster_indices: members,
        edges: chain_edges,
        root_index,
        entangled,
      }
    })
    .collect();

  // Rank: severity of members, then chain size, then edge confidence,
  // highest first; onset and id settle the rest.
  chains.sort_by(|a, b| {
    let severity = |c: &IncidentChain| {
      c.cluster_indices
        .iter()
        .map(|&i| clusters[i].level.score())
        .max()
        .unwrap_or(0)
    };
    let best_edge = |c: &IncidentChain| c.edges.iter().map(|e| e.confidence).max();
    severity(b)
      .cmp(&severity(a))
      .then_with(|| b.cluster_indices.len().cmp(&a.cluster_indices.len()))
      .then_with(|| best_edge(b).cmp(&best_edge(a)))
      .then_with(|| {
        clusters[a.root_index]
          .first_seen
          .cmp(&clusters[b.root_index].first_seen)
      })
      .then_with(|| a.id.cmp(&b.id))
  });
  chains
}
