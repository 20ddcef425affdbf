use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::warn;

use siteflow_command::truncate_output;
use siteflow_response::{AppError, ErrorKind};

use crate::actions::ActionEngine;
use crate::audit_store::AuditStore;
use crate::backup_store::BackupStore;
use crate::config::Config;
use crate::discovery::{self, DiscoveryConfig};
use crate::executor::RemoteExecutor;
use crate::health::HealthAdapter;
use crate::hub::SubscriptionHub;
use crate::monitor::MonitorLoop;
use crate::provision::Provisioner;
use crate::state_cache::StateCache;
use crate::topology::GatewayInfo;
use crate::types::{AuditEntry, AuditStatus, Graph, Site, TargetType};

/// Everything an HTTP/WS handler needs, wired once at startup and
/// shared behind `Arc` for the lifetime of the process.
pub struct AppState {
  pub config: Config,
  pub executor: Arc<RemoteExecutor>,
  pub cache: Arc<StateCache>,
  pub audit: Arc<AuditStore>,
  pub backups: Arc<BackupStore>,
  pub hub: Arc<SubscriptionHub>,
  pub actions: Arc<ActionEngine>,
  pub provisioner: Arc<Provisioner>,
  pub health: Arc<HealthAdapter>,
  pub monitor: Arc<MonitorLoop>,
  pub discovery_config: DiscoveryConfig,
  pub gateway: GatewayInfo,
}

impl AppState {
  /// `force=false` serves whatever the monitor loop last published
  /// (falling back to an on-demand discovery cycle only if nothing has
  /// been published yet, e.g. right after startup); `force=true` always
  /// runs discovery and primes the cache with the fresh result.
  pub async fn sites(&self, force: bool) -> anyhow::Result<Vec<Site>> {
    if !force {
      if let Some(sites) = self.cache.sites_snapshot().await {
        return Ok(sites);
      }
    }
    let (sites, _) = discovery::discover(&self.executor, &self.discovery_config).await?;
    Ok(self.cache.sites(true, || async move { sites }).await)
  }

  pub async fn graph(&self, force: bool) -> anyhow::Result<Graph> {
    if !force {
      if let Some(graph) = self.cache.graph_snapshot().await {
        return Ok(graph);
      }
    }
    self.monitor.force_refresh().await?;
    match self.cache.graph_snapshot().await {
      Some(graph) => Ok(graph),
      None => anyhow::bail!("topology graph unavailable after a forced refresh"),
    }
  }

  /// Wraps `work` in the shared audit envelope: a `pending` entry is
  /// written before `work` runs and finalized to a terminal status
  /// after, with output truncated to the configured max length. A
  /// failure to write or finalize the audit entry is logged and never
  /// propagated to the caller. `work` returns both the value handed
  /// back to the caller and the text recorded as the audit output,
  /// since the two aren't always the same thing (e.g. a route edit
  /// returns the new route list but logs the rendered config diff).
  pub async fn audited<F, Fut, T>(
    &self,
    target_type: TargetType,
    target_name: &str,
    action_type: &str,
    work: F,
  ) -> siteflow_response::Result<T>
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = siteflow_response::Result<(T, String)>>,
  {
    let entry = AuditEntry {
      id: 0,
      timestamp: Utc::now(),
      action_type: action_type.to_string(),
      target_type,
      target_name: target_name.to_string(),
      status: AuditStatus::Pending,
      output: None,
      error_message: None,
      metadata: BTreeMap::new(),
      duration_ms: None,
    };
    let id = match self.audit.append(entry) {
      Ok(id) => Some(id),
      Err(err) => {
        warn!("failed to write pending audit entry for {action_type} on {target_name}: {err:#}");
        None
      }
    };

    let start = Instant::now();
    let result = work().await;
    let duration_ms = start.elapsed().as_millis() as i64;

    if let Some(id) = id {
      let finalize = match &result {
        Ok((_, output)) => self.audit.update(
          id,
          AuditStatus::Success,
          Some(truncate_output(output, self.config.audit_max_output_length)),
          None,
          duration_ms,
        ),
        Err(err) => self.audit.update(
          id,
          AuditStatus::Failure,
          None,
          Some(err.display_chain()),
          duration_ms,
        ),
      };
      if let Err(err) = finalize {
        warn!("failed to finalize audit entry {id}: {err:#}");
      }
    }

    result.map(|(value, _)| value)
  }

  pub fn transport_error(err: impl Into<anyhow::Error>) -> AppError {
    AppError::new(ErrorKind::Transport, err)
  }
}
