pub mod detect;
pub mod external;
pub mod templates;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::actions::proxy as proxy_action;
use crate::executor::RemoteExecutor;
use detect::Template;
use external::{DnsProviderClient, TunnelProviderClient, UptimeMonitorClient};

pub struct ProvisionRequest {
  pub name: String,
  pub template: Template,
  pub domain: Option<String>,
  pub environment: BTreeMap<String, String>,
}

pub struct ProvisionOutcome {
  pub site_path: String,
  pub domain: String,
  pub compensations_run: Vec<String>,
}

pub struct DeprovisionRequest {
  pub name: String,
  pub remove_volumes: bool,
  pub remove_files: bool,
}

/// Distinguishes a bad request (name shape, missing input — never
/// touched the remote host or any external provider) from a failure
/// partway through the create flow (which already ran, and was rolled
/// back). Callers map the two to different HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
  #[error("{0}")]
  Validation(anyhow::Error),
  #[error("{error:#}")]
  Failed { error: anyhow::Error, compensations_run: Vec<String> },
}

pub struct Provisioner {
  executor: Arc<RemoteExecutor>,
  sites_root: String,
  base_domain: String,
  proxy_config_path: String,
  dns: Option<Arc<DnsProviderClient>>,
  tunnel: Option<Arc<TunnelProviderClient>>,
  uptime: Option<Arc<UptimeMonitorClient>>,
}

/// One step's undo action, pushed as each forward step succeeds and
/// run in reverse on any later failure.
type Compensation = Box<dyn FnOnce() -> futures::future::BoxFuture<'static, ()> + Send>;

impl Provisioner {
  pub fn new(
    executor: Arc<RemoteExecutor>,
    sites_root: String,
    base_domain: String,
    proxy_config_path: String,
    dns: Option<Arc<DnsProviderClient>>,
    tunnel: Option<Arc<TunnelProviderClient>>,
    uptime: Option<Arc<UptimeMonitorClient>>,
  ) -> Self {
    Provisioner { executor, sites_root, base_domain, proxy_config_path, dns, tunnel, uptime }
  }

  pub fn validate_name(name: &str) -> anyhow::Result<()> {
    let pattern = Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").unwrap();
    if name.len() < 2 || !pattern.is_match(name) {
      anyhow::bail!(
        "site name must be lowercase alphanumeric/hyphen, at least 2 chars, \
         and not start or end with a hyphen"
      );
    }
    Ok(())
  }

  pub async fn create(
    &self,
    request: ProvisionRequest,
  ) -> Result<ProvisionOutcome, ProvisionError> {
    Self::validate_name(&request.name).map_err(ProvisionError::Validation)?;

    let domain = request
      .domain
      .clone()
      .unwrap_or_else(|| format!("{}.{}", request.name, self.base_domain));
    let site_path = format!("{}/{}", self.sites_root.trim_end_matches('/'), request.name);

    let mut compensations: Vec<(String, Compensation)> = Vec::new();

    macro_rules! try_step {
      ($label:expr, $body:expr) => {
        match $body {
          Ok(value) => value,
          Err(err) => {
            let ran = self.rollback(compensations).await;
            return Err(ProvisionError::Failed {
              error: anyhow::anyhow!("{}: {err:#}", $label),
              compensations_run: ran,
            });
          }
        }
      };
    }

    let files = try_step!(
      "render template",
      templates::render(request.template, &request.name, &domain, &request.environment)
    );

    try_step!(
      "create site directory",
      self.executor.run(&["mkdir", "-p", &site_path]).await.map_err(|e| e.to_string())
    );
    {
      let site_path = site_path.clone();
      let executor = self.executor.clone();
      compensations.push((
        "remove site directory".to_string(),
        Box::new(move || {
          Box::pin(async move {
            let _ = executor.run(&["rm", "-rf", &site_path]).await;
          })
        }),
      ));
    }

    for dir in templates::required_directories(request.template) {
      let path = format!("{site_path}/{dir}");
      try_step!(
        format!("create directory {dir}"),
        self.executor.run(&["mkdir", "-p", &path]).await.map_err(|e| e.to_string())
      );
    }

    for file in &files {
      let remote_path = format!("{site_path}/{}", file.relative_path);
      if let Some(parent) = remote_path.rsplit_once('/') {
        let _ = self.executor.run(&["mkdir", "-p", parent.0]).await;
      }
      try_step!(
        format!("write {}", file.relative_path),
        self
          .executor
          .upload(&remote_path, file.contents.as_bytes())
          .await
          .map_err(|e| e.to_string())
      );
    }

    let target = format!("{}_web:80", request.name);
    try_step!(
      "append reverse-proxy route",
      proxy_action::upsert_route(&self.executor, &self.proxy_config_path, &domain, &target)
        .await
        .map_err(|e| e.to_string())
    );
    {
      let executor = self.executor.clone();
      let proxy_config_path = self.proxy_config_path.clone();
      let domain = domain.clone();
      compensations.push((
        "remove reverse-proxy route".to_string(),
        Box::new(move || {
          Box::pin(async move {
            let _ = proxy_action::remove_route(&executor, &proxy_config_path, &domain).await;
          })
        }),
      ));
    }

    if let Some(dns) = &self.dns {
      try_step!(
        "create DNS record",
        dns.upsert_record(&domain, &target).await.map_err(|e| e.to_string())
      );
      let dns = dns.clone();
      let domain = domain.clone();
      compensations.push((
        "remove DNS record".to_string(),
        Box::new(move || Box::pin(async move { let _ = dns.delete_record(&domain).await; })),
      ));
    }

    if let Some(tunnel) = &self.tunnel {
      try_step!(
        "register tunnel hostname",
        tunnel.register_hostname(&domain, &target).await.map_err(|e| e.to_string())
      );
      let tunnel = tunnel.clone();
      let domain = domain.clone();
      compensations.push((
        "unregister tunnel hostname".to_string(),
        Box::new(move || {
          Box::pin(async move { let _ = tunnel.unregister_hostname(&domain).await; })
        }),
      ));
    }

    if let Some(uptime) = &self.uptime {
      let check_url = format!("https://{domain}");
      try_step!(
        "create uptime monitor",
        uptime.create_monitor(&request.name, &check_url).await.map_err(|e| e.to_string())
      );
      let uptime = uptime.clone();
      let name = request.name.clone();
      compensations.push((
        "delete uptime monitor".to_string(),
        Box::new(move || Box::pin(async move { let _ = uptime.delete_monitor(&name).await; })),
      ));
    }

    let compose_path = "docker-compose.yml";
    try_step!(
      "bring services up",
      crate::actions::site::run(
        &self.executor,
        &site_path,
        compose_path,
        crate::actions::site::SiteAction::Start,
      )
      .await
      .map_err(|e| e.to_string())
    );

    if let Err(err) = self.wait_for_up(&site_path).await {
      warn!("site {} did not report up within the wait window: {err}", request.name);
    }

    try_step!(
      "reload reverse proxy",
      proxy_action::reload(&self.executor, &self.proxy_config_path)
        .await
        .map_err(|e| e.to_string())
    );

    Ok(ProvisionOutcome { site_path, domain, compensations_run: Vec::new() })
  }

  async fn wait_for_up(&self, site_path: &str) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
      let output = self
        .executor
        .run(&["docker", "compose", "-f", &format!("{site_path}/docker-compose.yml"), "ps", "--format", "{{json .}}"])
        .await?;
      if output.stdout.lines().any(|line| line.contains("\"State\":\"running\"")) {
        return Ok(());
      }
      if tokio::time::Instant::now() >= deadline {
        anyhow::bail!("timed out waiting for a container to report up");
      }
      tokio::time::sleep(Duration::from_secs(2)).await;
    }
  }

  async fn rollback(&self, compensations: Vec<(String, Compensation)>) -> Vec<String> {
    let mut ran = Vec::with_capacity(compensations.len());
    for (label, compensation) in compensations.into_iter().rev() {
      compensation().await;
      ran.push(label);
    }
    ran
  }

  /// Stops the stack, removes the proxy route, and unregisters external
  /// resources. Every step tolerates the resource already being gone.
  pub async fn deprovision(
    &self,
    request: DeprovisionRequest,
  ) -> anyhow::Result<()> {
    let site_path = format!("{}/{}", self.sites_root.trim_end_matches('/'), request.name);
    let compose_path = format!("{site_path}/docker-compose.yml");

    let mut down_args = vec!["docker", "compose", "-f", compose_path.as_str(), "down"];
    if request.remove_volumes {
      down_args.push("-v");
    }
    if let Err(err) = self.executor.run(&down_args).await {
      warn!("site {}: docker compose down failed, continuing deprovision: {err}", request.name);
    }

    let domain_guess = format!("{}.{}", request.name, self.base_domain);
    if let Err(err) = proxy_action::remove_route(&self.executor, &self.proxy_config_path, &domain_guess).await {
      warn!("site {}: failed to remove proxy route for {domain_guess}: {err}", request.name);
    }
    if let Err(err) = proxy_action::reload(&self.executor, &self.proxy_config_path).await {
      warn!("site {}: failed to reload proxy after removing route: {err}", request.name);
    }

    if let Some(uptime) = &self.uptime {
      if let Err(err) = uptime.delete_monitor(&request.name).await {
        warn!("site {}: failed to delete uptime monitor: {err}", request.name);
      }
    }
    if let Some(dns) = &self.dns {
      if let Err(err) = dns.delete_record(&domain_guess).await {
        warn!("site {}: failed to delete dns record for {domain_guess}: {err}", request.name);
      }
    }
    if let Some(tunnel) = &self.tunnel {
      if let Err(err) = tunnel.unregister_hostname(&domain_guess).await {
        warn!("site {}: failed to unregister tunnel hostname {domain_guess}: {err}", request.name);
      }
    }

    if request.remove_files {
      if let Err(err) = self.executor.run(&["rm", "-rf", &site_path]).await {
        warn!("site {}: failed to remove site files at {site_path}: {err}", request.name);
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validates_name_shape() {
    assert!(Provisioner::validate_name("blog").is_ok());
    assert!(Provisioner::validate_name("b").is_err());
    assert!(Provisioner::validate_name("-blog").is_err());
    assert!(Provisioner::validate_name("Blog").is_err());
    assert!(Provisioner::validate_name("my-blog-2").is_ok());
  }
}
