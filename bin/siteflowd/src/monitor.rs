use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::backup_store::BackupStore;
use crate::discovery::{self, DiscoveryConfig};
use crate::fingerprint::fingerprint;
use crate::state_cache::StateCache;
use crate::topology::{self, GatewayInfo, NasInfo, TunnelInfo};
use crate::types::{Graph, Site};

/// Broadcast payload the subscription hub fans out to subscribers of
/// `sites.update` / `graph.update`.
#[derive(Debug, Clone)]
pub enum Delta {
  Sites(Vec<Site>),
  Graph(Graph),
}

/// Periodically re-runs discovery, diffs the result against the last
/// published fingerprint, and broadcasts only when something actually
/// changed. A discovery cycle that fails (host unreachable, transient
/// transport error) is logged and skipped rather than propagated —
/// the previous snapshot stays authoritative until the next successful
/// poll.
pub struct MonitorLoop {
  executor: Arc<crate::executor::RemoteExecutor>,
  cache: Arc<StateCache>,
  backups: Arc<BackupStore>,
  discovery_config: DiscoveryConfig,
  gateway: GatewayInfo,
  tunnel: Option<TunnelInfo>,
  nas: Option<NasInfo>,
  poll_interval: Duration,
  tx: broadcast::Sender<Delta>,
  last_sites_fingerprint: tokio::sync::Mutex<Option<String>>,
  last_graph_fingerprint: tokio::sync::Mutex<Option<String>>,
}

impl MonitorLoop {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    executor: Arc<crate::executor::RemoteExecutor>,
    cache: Arc<StateCache>,
    backups: Arc<BackupStore>,
    discovery_config: DiscoveryConfig,
    gateway: GatewayInfo,
    tunnel: Option<TunnelInfo>,
    nas: Option<NasInfo>,
    poll_interval: Duration,
  ) -> (Self, broadcast::Receiver<Delta>) {
    let (tx, rx) = broadcast::channel(64);
    (
      MonitorLoop {
        executor,
        cache,
        backups,
        discovery_config,
        gateway,
        tunnel,
        nas,
        poll_interval,
        tx,
        last_sites_fingerprint: tokio::sync::Mutex::new(None),
        last_graph_fingerprint: tokio::sync::Mutex::new(None),
      },
      rx,
    )
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Delta> {
    self.tx.subscribe()
  }

  /// Runs until `shutdown` resolves, polling every `poll_interval`.
  pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(self.poll_interval);
    loop {
      tokio::select! {
        _ = ticker.tick() => {
          if let Err(err) = self.tick(false).await {
            warn!("monitor cycle failed: {err:#}");
          }
        }
        _ = shutdown.changed() => {
          if *shutdown.borrow() {
            info!("monitor loop draining");
            break;
          }
        }
      }
    }
  }

  pub async fn force_refresh(&self) -> anyhow::Result<()> {
    self.tick(true).await
  }

  async fn tick(&self, force: bool) -> anyhow::Result<()> {
    let executor = self.executor.clone();
    let config = &self.discovery_config;
    let (sites, metrics) = discovery::discover(&executor, config).await?;
    let sites_for_cache = sites.clone();
    let cached_sites = self
      .cache
      .sites(force, || async move { sites_for_cache })
      .await;

    let backups = self.backups.summary().unwrap_or_default();
    let mut graph = topology::build_graph(
      &cached_sites,
      &self.gateway,
      self.tunnel.as_ref(),
      self.nas.as_ref(),
      &backups,
    );
    discovery::attach_metrics(&mut graph, &metrics);
    let graph_for_cache = graph.clone();
    let cached_graph =
      self.cache.graph(force, || async move { graph_for_cache }).await;

    self.publish_if_changed_sites(cached_sites).await?;
    self.publish_if_changed_graph(cached_graph).await?;
    Ok(())
  }

  async fn publish_if_changed_sites(&self, sites: Vec<Site>) -> anyhow::Result<()> {
    let digest = fingerprint(&sites)?;
    let mut last = self.last_sites_fingerprint.lock().await;
    if last.as_deref() != Some(digest.as_str()) {
      *last = Some(digest);
      let _ = self.tx.send(Delta::Sites(sites));
    }
    Ok(())
  }

  async fn publish_if_changed_graph(&self, graph: Graph) -> anyhow::Result<()> {
    let digest = fingerprint(&graph)?;
    let mut last = self.last_graph_fingerprint.lock().await;
    if last.as_deref() != Some(digest.as_str()) {
      *last = Some(digest);
      let _ = self.tx.send(Delta::Graph(graph));
    }
    Ok(())
  }
}
