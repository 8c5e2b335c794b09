//! Read-only service dependency graph.
//!
//! Supplied whole at the start of a run and never mutated. When no graph is
//! supplied every lookup returns empty and the cascade builder falls back to
//! degraded, temporal-only correlation. Cycles are allowed structurally.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::GraphSpec;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
  nodes: BTreeSet<String>,
  downstream: BTreeMap<String, BTreeSet<String>>,
  upstream: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
  pub fn empty() -> Self {
    Self::default()
  }

  /// Build from an external document. Service ids are lowercased to match
  /// normalized events; edge endpoints are added as nodes implicitly.
  pub fn from_spec(spec: &GraphSpec) -> Self {
    let mut graph = Self::default();
    for node in &spec.nodes {
      graph.nodes.insert(node.to_ascii_lowercase());
    }
    for (up, down) in &spec.edges {
      let up = up.to_ascii_lowercase();
      let down = down.to_ascii_lowercase();
      graph.nodes.insert(up.clone());
      graph.nodes.insert(down.clone());
      graph
        .downstream
        .entry(up.clone())
        .or_default()
        .insert(down.clone());
      graph.upstream.entry(down).or_default().insert(up);
    }
    graph
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn contains(&self, service: &str) -> bool {
    self.nodes.contains(service)
  }

  pub fn downstream_of<'a>(&'a self, service: &str) -> impl Iterator<Item = &'a str> + 'a {
    self
      .downstream
      .get(service)
      .into_iter()
      .flatten()
      .map(String::as_str)
  }

  pub fn upstream_of<'a>(&'a self, service: &str) -> impl Iterator<Item = &'a str> + 'a {
    self
      .upstream
      .get(service)
      .into_iter()
      .flatten()
      .map(String::as_str)
  }

  pub fn has_edge(&self, upstream: &str, downstream: &str) -> bool {
    self
      .downstream
      .get(upstream)
      .is_some_and(|set| set.contains(downstream))
  }

  /// Number of direct upstream dependencies; root-candidate tie-breaker.
  pub fn upstream_count(&self, service: &str) -> usize {
    self.upstream.get(service).map_or(0, BTreeSet::len)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chain_spec() -> GraphSpec {
    GraphSpec {
      nodes: vec!["A".into(), "B".into(), "C".into()],
      edges: vec![("A".into(), "B".into()), ("B".into(), "C".into())],
    }
  }

  #[test]
  fn lookups_follow_edge_direction() {
    let g = DependencyGraph::from_spec(&chain_spec());
    assert!(g.has_edge("a", "b"));
    assert!(!g.has_edge("b", "a"));
    assert_eq!(g.downstream_of("a").collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(g.upstream_of("c").collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(g.upstream_count("a"), 0);
    assert_eq!(g.upstream_count("b"), 1);
  }

  #[test]
  fn empty_graph_returns_empty_lookups() {
    let g = DependencyGraph::empty();
    assert!(g.is_empty());
    assert!(!g.contains("a"));
    assert_eq!(g.downstream_of("a").count(), 0);
    assert_eq!(g.upstream_of("a").count(), 0);
  }

  #[test]
  fn edge_endpoints_become_nodes() {
    let spec = GraphSpec {
      nodes: vec![],
      edges: vec![("X".into(), "Y".into())],
    };
    let g = DependencyGraph::from_spec(&spec);
    assert!(g.contains("x"));
    assert!(g.contains("y"));
    assert!(!g.is_empty());
  }
}
