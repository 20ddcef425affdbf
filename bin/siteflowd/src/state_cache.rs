use std::time::Duration;

use siteflow_cache::TtlCache;

use crate::types::{Graph, Site};

/// Holds the last-known sites snapshot and topology graph behind a
/// single-flighted TTL cache each, so concurrent HTTP requests and the
/// monitor loop's own polling never trigger more than one discovery
/// cycle in flight at a time.
pub struct StateCache {
  sites: TtlCache<Vec<Site>>,
  graph: TtlCache<Graph>,
}

impl StateCache {
  pub fn new(ttl: Duration) -> Self {
    StateCache { sites: TtlCache::new(ttl), graph: TtlCache::new(ttl) }
  }

  pub async fn sites<F, Fut>(&self, force_refresh: bool, refresh: F) -> Vec<Site>
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Vec<Site>>,
  {
    self.sites.get(force_refresh, refresh).await
  }

  pub async fn graph<F, Fut>(&self, force_refresh: bool, refresh: F) -> Graph
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Graph>,
  {
    self.graph.get(force_refresh, refresh).await
  }

  pub async fn invalidate(&self) {
    self.sites.invalidate().await;
    self.graph.invalidate().await;
  }

  /// Last value the monitor loop (or an explicit refresh) published,
  /// without triggering a refresh of its own. Used by read handlers
  /// that want `force=false` semantics: serve whatever the background
  /// poller last saw rather than pay for a synchronous discovery cycle.
  pub async fn sites_snapshot(&self) -> Option<Vec<Site>> {
    self.sites.snapshot().await
  }

  pub async fn graph_snapshot(&self) -> Option<Graph> {
    self.graph.snapshot().await
  }
}
