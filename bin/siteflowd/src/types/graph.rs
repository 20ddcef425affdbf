use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
  Tunnel,
  Domain,
  Gateway,
  Container,
  Site,
  Nas,
}

impl NodeType {
  /// Deterministic sort rank used by the topology projection.
  pub fn rank(self) -> u8 {
    match self {
      NodeType::Tunnel => 0,
      NodeType::Domain => 1,
      NodeType::Gateway => 2,
      NodeType::Container => 3,
      NodeType::Site => 4,
      NodeType::Nas => 5,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
  pub cpu_percent: f64,
  pub memory_percent: f64,
  pub memory_usage_mb: f64,
  pub memory_limit_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Up,
  Down,
  Degraded,
  Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
  pub id: String,
  pub label: String,
  #[serde(rename = "type")]
  pub node_type: NodeType,
  pub status: NodeStatus,
  #[serde(default)]
  pub meta: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metrics: Option<NodeMetrics>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub backup: Option<super::backup::SiteBackupStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
  pub id: String,
  pub source: String,
  pub target: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
  pub nodes: Vec<GraphNode>,
  pub edges: Vec<GraphEdge>,
}

impl Graph {
  /// Sorts nodes by `(type_rank, id)` and edges by
  /// `(source, target, label)`, as required for the projection to be
  /// deterministic and thus fingerprintable.
  pub fn canonicalize(&mut self) {
    self.nodes.sort_by(|a, b| {
      a.node_type.rank().cmp(&b.node_type.rank()).then_with(|| a.id.cmp(&b.id))
    });
    self.edges.sort_by(|a, b| {
      a.source
        .cmp(&b.source)
        .then_with(|| a.target.cmp(&b.target))
        .then_with(|| a.label.cmp(&b.label))
    });
  }
}
