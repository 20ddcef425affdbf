//! Loads `siteflowd`'s configuration from an optional TOML file
//! (`${VAR}`-interpolated) with `SITEFLOW_*` environment variables
//! overriding individual fields on top, the same file-then-env
//! layering the rest of SiteFlow's config crates use.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub remote_host: String,
  pub remote_user: String,
  pub remote_port: u16,
  pub remote_identity_file: Option<String>,
  pub ssh_pool_size: usize,

  pub sites_root: String,
  pub gateway_label: String,
  pub gateway_dir_name: String,
  pub dashboard_dir_name: String,
  pub proxy_config_path: String,
  pub base_domain: String,

  pub dns_provider_base_url: Option<String>,
  pub dns_provider_api_token: Option<String>,
  pub tunnel_base_url: Option<String>,
  pub tunnel_api_token: Option<String>,
  pub tunnel_id: Option<String>,
  pub tunnel_label: String,
  pub uptime_monitor_url: Option<String>,
  pub uptime_monitor_username: Option<String>,
  pub uptime_monitor_password: Option<String>,
  pub uptime_monitor_api_token: Option<String>,

  pub database_path: String,
  pub audit_retention_days: i64,
  pub audit_max_output_length: usize,
  pub state_cache_ttl_secs: u64,
  pub monitor_poll_interval_secs: u64,

  pub backup_threshold_db_hours: i64,
  pub backup_threshold_uploads_hours: i64,
  pub backup_threshold_verify_days: i64,
  pub backup_threshold_snapshot_days: i64,
  pub backup_threshold_system_hours: i64,

  pub bind_address: String,
  pub log_level: String,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      remote_host: "127.0.0.1".to_string(),
      remote_user: "siteflow".to_string(),
      remote_port: 22,
      remote_identity_file: None,
      ssh_pool_size: 4,

      sites_root: "/srv/sites".to_string(),
      gateway_label: "gateway".to_string(),
      gateway_dir_name: "gateway".to_string(),
      dashboard_dir_name: "dashboard".to_string(),
      proxy_config_path: "/etc/caddy/Caddyfile".to_string(),
      base_domain: "example.com".to_string(),

      dns_provider_base_url: None,
      dns_provider_api_token: None,
      tunnel_base_url: None,
      tunnel_api_token: None,
      tunnel_id: None,
      tunnel_label: "tunnel".to_string(),
      uptime_monitor_url: None,
      uptime_monitor_username: None,
      uptime_monitor_password: None,
      uptime_monitor_api_token: None,

      database_path: "/var/lib/siteflowd/siteflow.sled".to_string(),
      audit_retention_days: 90,
      audit_max_output_length: 16_384,
      state_cache_ttl_secs: 20,
      monitor_poll_interval_secs: 10,

      backup_threshold_db_hours: 26,
      backup_threshold_uploads_hours: 30,
      backup_threshold_verify_days: 7,
      backup_threshold_snapshot_days: 8,
      backup_threshold_system_hours: 26,

      bind_address: "0.0.0.0:8787".to_string(),
      log_level: "info".to_string(),
    }
  }
}

impl Config {
  pub fn thresholds(&self) -> crate::backup_store::Thresholds {
    crate::backup_store::Thresholds {
      db: chrono::Duration::hours(self.backup_threshold_db_hours),
      uploads: chrono::Duration::hours(self.backup_threshold_uploads_hours),
      verify: chrono::Duration::days(self.backup_threshold_verify_days),
      snapshot: chrono::Duration::days(self.backup_threshold_snapshot_days),
      system: chrono::Duration::hours(self.backup_threshold_system_hours),
    }
  }

  /// The graph node id is the fixed literal `tunnel` regardless of which
  /// external tunnel is configured; `tunnel_id` identifies the tunnel to
  /// the provider's API and never appears in the graph.
  pub fn tunnel_info(&self) -> Option<crate::topology::TunnelInfo> {
    self.tunnel_id.as_ref().map(|_| crate::topology::TunnelInfo {
      id: "tunnel".to_string(),
      label: self.tunnel_label.clone(),
    })
  }

  pub fn log_config(&self) -> siteflow_logger::LogConfig {
    siteflow_logger::LogConfig { level: self.log_level.clone(), stdio: Default::default() }
  }

  pub fn discovery_config(&self) -> crate::discovery::DiscoveryConfig {
    crate::discovery::DiscoveryConfig {
      sites_root: self.sites_root.clone(),
      proxy_config_path: self.proxy_config_path.clone(),
      denylist: vec![self.gateway_dir_name.clone(), self.dashboard_dir_name.clone()],
    }
  }
}

/// `SITEFLOW_*` environment overrides, one per [`Config`] field. Unset
/// fields fall back to whatever the TOML file (or the built-in default)
/// already has.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Env {
  siteflow_remote_host: Option<String>,
  siteflow_remote_user: Option<String>,
  siteflow_remote_port: Option<u16>,
  siteflow_remote_identity_file: Option<String>,
  siteflow_ssh_pool_size: Option<usize>,

  siteflow_sites_root: Option<String>,
  siteflow_gateway_label: Option<String>,
  siteflow_gateway_dir_name: Option<String>,
  siteflow_dashboard_dir_name: Option<String>,
  siteflow_proxy_config_path: Option<String>,
  siteflow_base_domain: Option<String>,

  siteflow_dns_provider_base_url: Option<String>,
  siteflow_dns_provider_api_token: Option<String>,
  siteflow_tunnel_base_url: Option<String>,
  siteflow_tunnel_api_token: Option<String>,
  siteflow_tunnel_id: Option<String>,
  siteflow_tunnel_label: Option<String>,
  siteflow_uptime_monitor_url: Option<String>,
  siteflow_uptime_monitor_username: Option<String>,
  siteflow_uptime_monitor_password: Option<String>,
  siteflow_uptime_monitor_api_token: Option<String>,

  siteflow_database_path: Option<String>,
  siteflow_audit_retention_days: Option<i64>,
  siteflow_audit_max_output_length: Option<usize>,
  siteflow_state_cache_ttl_secs: Option<u64>,
  siteflow_monitor_poll_interval_secs: Option<u64>,

  siteflow_backup_threshold_db_hours: Option<i64>,
  siteflow_backup_threshold_uploads_hours: Option<i64>,
  siteflow_backup_threshold_verify_days: Option<i64>,
  siteflow_backup_threshold_snapshot_days: Option<i64>,
  siteflow_backup_threshold_system_hours: Option<i64>,

  siteflow_bind_address: Option<String>,
  siteflow_log_level: Option<String>,

  siteflow_config_path: Option<PathBuf>,
}

fn apply_env(config: Config, env: Env) -> Config {
  Config {
    remote_host: env.siteflow_remote_host.unwrap_or(config.remote_host),
    remote_user: env.siteflow_remote_user.unwrap_or(config.remote_user),
    remote_port: env.siteflow_remote_port.unwrap_or(config.remote_port),
    remote_identity_file: env
      .siteflow_remote_identity_file
      .or(config.remote_identity_file),
    ssh_pool_size: env.siteflow_ssh_pool_size.unwrap_or(config.ssh_pool_size),

    sites_root: env.siteflow_sites_root.unwrap_or(config.sites_root),
    gateway_label: env.siteflow_gateway_label.unwrap_or(config.gateway_label),
    gateway_dir_name: env
      .siteflow_gateway_dir_name
      .unwrap_or(config.gateway_dir_name),
    dashboard_dir_name: env
      .siteflow_dashboard_dir_name
      .unwrap_or(config.dashboard_dir_name),
    proxy_config_path: env
      .siteflow_proxy_config_path
      .unwrap_or(config.proxy_config_path),
    base_domain: env.siteflow_base_domain.unwrap_or(config.base_domain),

    dns_provider_base_url: env
      .siteflow_dns_provider_base_url
      .or(config.dns_provider_base_url),
    dns_provider_api_token: env
      .siteflow_dns_provider_api_token
      .or(config.dns_provider_api_token),
    tunnel_base_url: env.siteflow_tunnel_base_url.or(config.tunnel_base_url),
    tunnel_api_token: env.siteflow_tunnel_api_token.or(config.tunnel_api_token),
    tunnel_id: env.siteflow_tunnel_id.or(config.tunnel_id),
    tunnel_label: env.siteflow_tunnel_label.unwrap_or(config.tunnel_label),
    uptime_monitor_url: env
      .siteflow_uptime_monitor_url
      .or(config.uptime_monitor_url),
    uptime_monitor_username: env
      .siteflow_uptime_monitor_username
      .or(config.uptime_monitor_username),
    uptime_monitor_password: env
      .siteflow_uptime_monitor_password
      .or(config.uptime_monitor_password),
    uptime_monitor_api_token: env
      .siteflow_uptime_monitor_api_token
      .or(config.uptime_monitor_api_token),

    database_path: env.siteflow_database_path.unwrap_or(config.database_path),
    audit_retention_days: env
      .siteflow_audit_retention_days
      .unwrap_or(config.audit_retention_days),
    audit_max_output_length: env
      .siteflow_audit_max_output_length
      .unwrap_or(config.audit_max_output_length),
    state_cache_ttl_secs: env
      .siteflow_state_cache_ttl_secs
      .unwrap_or(config.state_cache_ttl_secs),
    monitor_poll_interval_secs: env
      .siteflow_monitor_poll_interval_secs
      .unwrap_or(config.monitor_poll_interval_secs),

    backup_threshold_db_hours: env
      .siteflow_backup_threshold_db_hours
      .unwrap_or(config.backup_threshold_db_hours),
    backup_threshold_uploads_hours: env
      .siteflow_backup_threshold_uploads_hours
      .unwrap_or(config.backup_threshold_uploads_hours),
    backup_threshold_verify_days: env
      .siteflow_backup_threshold_verify_days
      .unwrap_or(config.backup_threshold_verify_days),
    backup_threshold_snapshot_days: env
      .siteflow_backup_threshold_snapshot_days
      .unwrap_or(config.backup_threshold_snapshot_days),
    backup_threshold_system_hours: env
      .siteflow_backup_threshold_system_hours
      .unwrap_or(config.backup_threshold_system_hours),

    bind_address: env.siteflow_bind_address.unwrap_or(config.bind_address),
    log_level: env.siteflow_log_level.unwrap_or(config.log_level),
  }
}

/// Resolves the config file path from `SITEFLOW_CONFIG_PATH` (default
/// `/etc/siteflowd/config.toml`), loads it if present, then layers
/// `SITEFLOW_*` environment overrides on top.
pub fn load(debug_print: bool) -> anyhow::Result<Config> {
  let env: Env = envy::from_env()?;
  let path = env
    .siteflow_config_path
    .clone()
    .unwrap_or_else(|| PathBuf::from("/etc/siteflowd/config.toml"));
  let base = siteflow_config::load_file::<Config>(&path, debug_print)?.unwrap_or_default();
  Ok(apply_env(base, env))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn env_overrides_win_over_file_defaults() {
    let config = Config::default();
    let env = Env { siteflow_base_domain: Some("sites.test".to_string()), ..Default::default() };
    let merged = apply_env(config, env);
    assert_eq!(merged.base_domain, "sites.test");
    assert_eq!(merged.sites_root, "/srv/sites");
  }
}
