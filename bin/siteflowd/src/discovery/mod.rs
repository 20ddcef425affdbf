mod compose;
mod correlate;
pub mod proxy;

pub use correlate::RawContainer;

use crate::executor::{RemoteExecutor, TransportError};
use crate::types::{Container, Graph, NodeMetrics, Site};
use correlate::DiscoveredSite;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
  #[error(transparent)]
  Transport(#[from] TransportError),
  #[error("failed to list site directories: {0}")]
  ListSites(String),
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
  pub sites_root: String,
  pub proxy_config_path: String,
  /// Child directory names under `sites_root` that are never sites:
  /// the gateway's own directory and the dashboard's own directory.
  pub denylist: Vec<String>,
}

/// Runs one full discovery cycle: lists site directories, reads and
/// parses each compose file, queries the container engine once for the
/// whole fleet, reads the gateway's routes, and joins everything into
/// `Site` records plus a raw metrics map keyed by container name.
pub async fn discover(
  executor: &RemoteExecutor,
  config: &DiscoveryConfig,
) -> Result<(Vec<Site>, BTreeMap<String, NodeMetrics>), DiscoveryError> {
  let dir_listing = executor
    .run(&["ls", "-1", &config.sites_root])
    .await?;
  if !dir_listing.success() {
    return Err(DiscoveryError::ListSites(dir_listing.stderr));
  }
  let site_dirs: Vec<String> = dir_listing
    .stdout
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .filter(|line| !config.denylist.iter().any(|denied| denied == line))
    .map(str::to_string)
    .collect();

  let mut discovered = Vec::with_capacity(site_dirs.len());
  for name in site_dirs {
    let path = format!("{}/{}", config.sites_root.trim_end_matches('/'), name);
    let compose_file = "docker-compose.yml".to_string();
    let remote_path = format!("{path}/{compose_file}");
    let services = match executor.read_file(&remote_path).await {
      Ok(yaml) => compose::parse_compose(&yaml).map_err(|e| e.to_string()),
      Err(err) => Err(err.to_string()),
    };
    discovered.push(DiscoveredSite { name, path, compose_file, services });
  }

  let live_containers = list_containers(executor).await?;
  let metrics = read_metrics(executor).await.unwrap_or_default();

  let proxy_contents = executor
    .read_file(&config.proxy_config_path)
    .await
    .unwrap_or_default();
  let routes = proxy::parse_routes(&proxy_contents).unwrap_or_default();

  let sites = correlate::correlate(discovered, &live_containers, &routes);
  Ok((sites, metrics))
}

async fn list_containers(
  executor: &RemoteExecutor,
) -> Result<Vec<Container>, DiscoveryError> {
  let output = executor
    .run(&["docker", "ps", "-a", "--format", "{{json .}}"])
    .await?;
  let containers = output
    .stdout
    .lines()
    .filter(|line| !line.trim().is_empty())
    .filter_map(|line| serde_json::from_str::<RawContainer>(line).ok())
    .map(Container::from)
    .collect();
  Ok(containers)
}

/// Batched `docker stats` read, used to populate graph node metrics.
/// Best-effort: a failure here must not fail the whole discovery cycle,
/// since metrics are an overlay, not structural data.
async fn read_metrics(
  executor: &RemoteExecutor,
) -> Result<BTreeMap<String, NodeMetrics>, DiscoveryError> {
  #[derive(serde::Deserialize)]
  struct RawStat {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CPUPerc")]
    cpu_perc: String,
    #[serde(rename = "MemPerc")]
    mem_perc: String,
    #[serde(rename = "MemUsage")]
    mem_usage: String,
  }

  let output = executor
    .run(&["docker", "stats", "--no-stream", "--format", "{{json .}}"])
    .await?;
  let mut metrics = BTreeMap::new();
  for line in output.stdout.lines() {
    let Ok(raw) = serde_json::from_str::<RawStat>(line) else {
      continue;
    };
    let (usage_mb, limit_mb) = parse_mem_usage(&raw.mem_usage);
    metrics.insert(
      raw.name,
      NodeMetrics {
        cpu_percent: parse_percent(&raw.cpu_perc),
        memory_percent: parse_percent(&raw.mem_perc),
        memory_usage_mb: usage_mb,
        memory_limit_mb: limit_mb,
      },
    );
  }
  Ok(metrics)
}

fn parse_percent(text: &str) -> f64 {
  text.trim_end_matches('%').parse().unwrap_or(0.0)
}

/// `docker stats` reports memory usage as e.g. `"123.4MiB / 1GiB"`.
fn parse_mem_usage(text: &str) -> (f64, f64) {
  let Some((used, limit)) = text.split_once('/') else {
    return (0.0, 0.0);
  };
  (parse_mib(used.trim()), parse_mib(limit.trim()))
}

fn parse_mib(text: &str) -> f64 {
  let lower = text.to_lowercase();
  if let Some(value) = lower.strip_suffix("gib") {
    value.trim().parse::<f64>().unwrap_or(0.0) * 1024.0
  } else if let Some(value) = lower.strip_suffix("mib") {
    value.trim().parse().unwrap_or(0.0)
  } else if let Some(value) = lower.strip_suffix("kib") {
    value.trim().parse::<f64>().unwrap_or(0.0) / 1024.0
  } else {
    0.0
  }
}

/// Attaches metrics and backup overlays onto an already-built graph's
/// container nodes. Kept here rather than in `topology` since it reads
/// the same metrics map this module produces.
pub fn attach_metrics(graph: &mut Graph, metrics: &BTreeMap<String, NodeMetrics>) {
  for node in &mut graph.nodes {
    if node.node_type == crate::types::NodeType::Container {
      node.metrics = metrics.get(&node.id).copied();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_mib_and_gib_usage() {
    assert_eq!(parse_mem_usage("123.4MiB / 1GiB"), (123.4, 1024.0));
    assert_eq!(parse_mem_usage("512KiB / 2GiB"), (0.5, 2048.0));
  }

  #[test]
  fn percent_strips_suffix() {
    assert_eq!(parse_percent("12.34%"), 12.34);
  }

  #[test]
  fn denylist_filters_gateway_and_dashboard_dirs() {
    let denylist = vec!["gateway".to_string(), "dashboard".to_string()];
    let names = vec!["blog", "gateway", "shop", "dashboard"];
    let kept: Vec<&&str> = names
      .iter()
      .filter(|name| !denylist.iter().any(|denied| denied == *name))
      .collect();
    assert_eq!(kept, vec![&"blog", &"shop"]);
  }
}
