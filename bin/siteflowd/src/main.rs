#[macro_use]
extern crate tracing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

mod actions;
mod api;
mod audit_store;
mod backup_store;
mod config;
mod discovery;
mod executor;
mod fingerprint;
mod health;
mod hub;
mod monitor;
mod provision;
mod state;
mod state_cache;
mod topology;
mod types;

use audit_store::AuditStore;
use backup_store::BackupStore;
use executor::{RemoteExecutor, RemoteHost, SessionPool};
use health::HealthAdapter;
use hub::SubscriptionHub;
use monitor::MonitorLoop;
use provision::external::{DnsProviderClient, TunnelProviderClient, UptimeMonitorClient};
use provision::Provisioner;
use state::AppState;
use state_cache::StateCache;
use topology::GatewayInfo;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = config::load(false).context("failed to load configuration")?;
  siteflow_logger::init(&config.log_config())?;
  info!("siteflowd starting");

  let db = sled::open(&config.database_path)
    .with_context(|| format!("failed to open state database at {}", config.database_path))?;
  let audit = Arc::new(AuditStore::open(db.clone())?);
  let backups = Arc::new(BackupStore::open(&db, config.thresholds())?);

  let host = RemoteHost {
    host: config.remote_host.clone(),
    user: config.remote_user.clone(),
    port: config.remote_port,
    identity_file: config.remote_identity_file.clone(),
  };
  let pool = SessionPool::new(host, config.ssh_pool_size);
  let executor = Arc::new(RemoteExecutor::new(pool, Duration::from_secs(30)));

  let discovery_config = config.discovery_config();
  let gateway = GatewayInfo { id: "gateway".to_string(), label: config.gateway_label.clone() };

  let dns = match (&config.dns_provider_base_url, &config.dns_provider_api_token) {
    (Some(base_url), Some(token)) => {
      Some(Arc::new(DnsProviderClient::new(base_url.clone(), token.clone())))
    }
    _ => None,
  };
  let tunnel = match (&config.tunnel_base_url, &config.tunnel_api_token, &config.tunnel_id) {
    (Some(base_url), Some(token), Some(tunnel_id)) => Some(Arc::new(TunnelProviderClient::new(
      base_url.clone(),
      token.clone(),
      tunnel_id.clone(),
    ))),
    _ => None,
  };
  let uptime = match (&config.uptime_monitor_url, &config.uptime_monitor_api_token) {
    (Some(base_url), Some(token)) => {
      Some(Arc::new(UptimeMonitorClient::new(base_url.clone(), token.clone())))
    }
    _ => None,
  };

  let provisioner = Arc::new(Provisioner::new(
    executor.clone(),
    config.sites_root.clone(),
    config.base_domain.clone(),
    config.proxy_config_path.clone(),
    dns,
    tunnel,
    uptime,
  ));

  let health = match (
    &config.uptime_monitor_url,
    &config.uptime_monitor_username,
    &config.uptime_monitor_password,
  ) {
    (Some(url), Some(username), Some(password)) => {
      HealthAdapter::spawn(url.clone(), username.clone(), password.clone())
    }
    _ => HealthAdapter::disabled(),
  };

  let cache = Arc::new(StateCache::new(Duration::from_secs(config.state_cache_ttl_secs)));
  let actions = Arc::new(actions::ActionEngine::new(executor.clone()));
  let hub = Arc::new(SubscriptionHub::new());

  let (monitor_loop, mut delta_rx) = MonitorLoop::new(
    executor.clone(),
    cache.clone(),
    backups.clone(),
    discovery_config.clone(),
    gateway.clone(),
    config.tunnel_info(),
    None,
    Duration::from_secs(config.monitor_poll_interval_secs),
  );
  let monitor_loop = Arc::new(monitor_loop);

  let state = Arc::new(AppState {
    config: config.clone(),
    executor,
    cache,
    audit,
    backups,
    hub: hub.clone(),
    actions,
    provisioner,
    health,
    monitor: monitor_loop.clone(),
    discovery_config,
    gateway,
  });

  let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

  let monitor_task = {
    let monitor_loop = monitor_loop.clone();
    tokio::spawn(async move { monitor_loop.run(shutdown_rx).await })
  };

  let broadcast_task = tokio::spawn(async move {
    use types::ServerMessage;
    loop {
      match delta_rx.recv().await {
        Ok(monitor::Delta::Sites(sites)) => hub.publish("sites.update", ServerMessage::SitesUpdate { sites }),
        Ok(monitor::Delta::Graph(graph)) => hub.publish("graph.update", ServerMessage::GraphUpdate { graph }),
        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
      }
    }
  });

  let app = api::router(state);
  let listener = tokio::net::TcpListener::bind(&config.bind_address)
    .await
    .with_context(|| format!("failed to bind {}", config.bind_address))?;
  info!("listening on {}", config.bind_address);

  let shutdown_signal = async move {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(Duration::from_secs(5)).await;
  };

  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal).await.context("server error")?;

  monitor_task.abort();
  broadcast_task.abort();
  Ok(())
}
