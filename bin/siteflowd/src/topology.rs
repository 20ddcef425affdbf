use std::collections::{BTreeMap, BTreeSet};

use crate::types::{
  Graph, GraphEdge, GraphNode, NodeStatus, NodeType, Site, SiteBackupStatus,
  SiteStatus,
};

/// `id` is always the literal `"gateway"` — there is exactly one gateway
/// node per graph, so it needs no disambiguating suffix. Only `label`
/// (what's shown in the UI) is configurable.
#[derive(Debug, Clone)]
pub struct GatewayInfo {
  pub id: String,
  pub label: String,
}

/// `id` is always the literal `"tunnel"`, independent of which external
/// tunnel provider or tunnel id is actually configured.
#[derive(Debug, Clone)]
pub struct TunnelInfo {
  pub id: String,
  pub label: String,
}

/// `id` is always the literal `"nas"`.
#[derive(Debug, Clone)]
pub struct NasInfo {
  pub id: String,
  pub label: String,
}

/// Projects a `Site[]` into the topology graph: one `site` node and one
/// `container` node per container, one `domain` node per distinct
/// domain, a single `gateway` node, and optional `tunnel`/`nas` nodes.
/// Edges: tunnel -> domain, domain -> gateway, gateway -> container (by
/// proxy target), container -> site.
pub fn build_graph(
  sites: &[Site],
  gateway: &GatewayInfo,
  tunnel: Option<&TunnelInfo>,
  nas: Option<&NasInfo>,
  backups: &BTreeMap<String, SiteBackupStatus>,
) -> Graph {
  let mut nodes = Vec::new();
  let mut edges = Vec::new();
  let mut domains_seen = BTreeSet::new();

  nodes.push(GraphNode {
    id: gateway.id.clone(),
    label: gateway.label.clone(),
    node_type: NodeType::Gateway,
    status: NodeStatus::Up,
    meta: BTreeMap::new(),
    metrics: None,
    backup: None,
  });

  if let Some(tunnel) = tunnel {
    nodes.push(GraphNode {
      id: tunnel.id.clone(),
      label: tunnel.label.clone(),
      node_type: NodeType::Tunnel,
      status: NodeStatus::Unknown,
      meta: BTreeMap::new(),
      metrics: None,
      backup: None,
    });
  }

  if let Some(nas) = nas {
    nodes.push(GraphNode {
      id: nas.id.clone(),
      label: nas.label.clone(),
      node_type: NodeType::Nas,
      status: NodeStatus::Unknown,
      meta: BTreeMap::new(),
      metrics: None,
      backup: None,
    });
  }

  for site in sites {
    let site_id = format!("site:{}", site.name);
    nodes.push(GraphNode {
      id: site_id.clone(),
      label: site.name.clone(),
      node_type: NodeType::Site,
      status: site_status_to_node_status(site.status),
      meta: BTreeMap::new(),
      metrics: None,
      backup: backups.get(&site.name).cloned(),
    });

    for container in &site.containers {
      let container_id = format!("container:{}", container.name);
      nodes.push(GraphNode {
        id: container_id.clone(),
        label: container.name.clone(),
        node_type: NodeType::Container,
        status: if container.is_up() { NodeStatus::Up } else { NodeStatus::Down },
        meta: BTreeMap::new(),
        metrics: None,
        backup: None,
      });
      edges.push(GraphEdge {
        id: format!("{container_id}->{site_id}"),
        source: container_id.clone(),
        target: site_id.clone(),
        label: None,
      });
      if let Some(target) = site
        .targets
        .iter()
        .find(|route| route.container.as_deref() == Some(container.name.as_str()))
      {
        for domain in std::iter::once(&target.domain) {
          if domains_seen.insert(domain.clone()) {
            nodes.push(GraphNode {
              id: format!("domain:{domain}"),
              label: domain.clone(),
              node_type: NodeType::Domain,
              status: NodeStatus::Unknown,
              meta: BTreeMap::new(),
              metrics: None,
              backup: None,
            });
          }
          edges.push(GraphEdge {
            id: format!("gateway:{}->container:{}", gateway.id, container.name),
            source: gateway.id.clone(),
            target: container_id.clone(),
            label: Some(target.target.clone()),
          });
          edges.push(GraphEdge {
            id: format!("domain:{domain}->gateway:{}", gateway.id),
            source: format!("domain:{domain}"),
            target: gateway.id.clone(),
            label: None,
          });
          if let Some(tunnel) = tunnel {
            edges.push(GraphEdge {
              id: format!("tunnel:{}->domain:{domain}", tunnel.id),
              source: tunnel.id.clone(),
              target: format!("domain:{domain}"),
              label: None,
            });
          }
        }
      }
    }
  }

  let mut graph = Graph { nodes, edges };
  graph.canonicalize();
  graph
}

fn site_status_to_node_status(status: SiteStatus) -> NodeStatus {
  match status {
    SiteStatus::Running => NodeStatus::Up,
    SiteStatus::Stopped => NodeStatus::Down,
    SiteStatus::Degraded => NodeStatus::Degraded,
    SiteStatus::Unknown => NodeStatus::Unknown,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{Container, Route};

  fn running_site() -> Site {
    Site {
      name: "blog".into(),
      path: "/srv/sites/blog".into(),
      compose_file: "docker-compose.yml".into(),
      services: vec![],
      containers: vec![Container {
        name: "blog_web".into(),
        status_text: "Up 1 hour".into(),
        state: None,
        image: None,
        ports: vec![],
      }],
      domains: vec!["blog.example.com".into()],
      targets: vec![Route {
        domain: "blog.example.com".into(),
        container: Some("blog_web".into()),
        port: Some(80),
        target: "blog_web:80".into(),
      }],
      status: SiteStatus::Running,
      error: None,
    }
  }

  #[test]
  fn builds_full_chain_from_container_to_gateway() {
    let gateway = GatewayInfo { id: "gateway".into(), label: "gateway".into() };
    let graph = build_graph(&[running_site()], &gateway, None, None, &BTreeMap::new());
    let types: Vec<NodeType> = graph.nodes.iter().map(|n| n.node_type).collect();
    assert!(types.contains(&NodeType::Site));
    assert!(types.contains(&NodeType::Container));
    assert!(types.contains(&NodeType::Domain));
    assert!(types.contains(&NodeType::Gateway));
    assert_eq!(graph.edges.len(), 3);
  }

  #[test]
  fn canonicalization_is_deterministic_across_input_order() {
    let gateway = GatewayInfo { id: "gateway".into(), label: "gateway".into() };
    let a = build_graph(&[running_site()], &gateway, None, None, &BTreeMap::new());
    let b = build_graph(&[running_site()], &gateway, None, None, &BTreeMap::new());
    assert_eq!(
      serde_json::to_string(&a).unwrap(),
      serde_json::to_string(&b).unwrap()
    );
  }
}
