use siteflow_response::{AppError, ErrorKind};

use crate::discovery::proxy as proxy_format;
use crate::executor::RemoteExecutor;
use crate::types::Route;

/// Validates the gateway's config, then reloads it. Parse errors are
/// reported distinctly from reload failures so callers can tell a bad
/// edit from a gateway that's simply unreachable.
pub async fn reload(
  executor: &RemoteExecutor,
  config_path: &str,
) -> siteflow_response::Result<()> {
  let contents = executor
    .read_file(config_path)
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  proxy_format::validate_syntax(&contents)
    .map_err(|err| AppError::new(ErrorKind::Validation, err))?;
  let output = executor
    .run(&["caddy", "reload", "--config", config_path])
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  if !output.success() {
    return Err(AppError::new(
      ErrorKind::CommandFailure,
      anyhow::anyhow!("caddy reload failed: {}", output.combined()),
    ));
  }
  Ok(())
}

/// Adds or updates a route, writing the new config atomically
/// (write-temp, then rename) and reloading. If the reload fails, the
/// previous config is restored and reloaded again so a bad edit never
/// leaves the gateway serving a broken file.
pub async fn upsert_route(
  executor: &RemoteExecutor,
  config_path: &str,
  domain: &str,
  target: &str,
) -> siteflow_response::Result<Vec<Route>> {
  let previous = executor
    .read_file(config_path)
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  let updated = proxy_format::upsert_route(&previous, domain, target)
    .map_err(|err| AppError::new(ErrorKind::Validation, err))?;
  write_atomically_and_reload(executor, config_path, &previous, &updated).await?;
  proxy_format::parse_routes(&updated)
    .map_err(|err| AppError::new(ErrorKind::Fatal, err))
}

pub async fn remove_route(
  executor: &RemoteExecutor,
  config_path: &str,
  domain: &str,
) -> siteflow_response::Result<()> {
  let previous = executor
    .read_file(config_path)
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  let updated = proxy_format::remove_route(&previous, domain)
    .map_err(|err| AppError::new(ErrorKind::Validation, err))?;
  write_atomically_and_reload(executor, config_path, &previous, &updated).await
}

async fn write_atomically_and_reload(
  executor: &RemoteExecutor,
  config_path: &str,
  previous: &str,
  updated: &str,
) -> siteflow_response::Result<()> {
  let tmp_path = format!("{config_path}.tmp");
  executor
    .upload(&tmp_path, updated.as_bytes())
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  let rename = executor
    .run(&["mv", &tmp_path, config_path])
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  if !rename.success() {
    return Err(AppError::new(
      ErrorKind::CommandFailure,
      anyhow::anyhow!("failed to install proxy config: {}", rename.combined()),
    ));
  }
  if let Err(err) = reload(executor, config_path).await {
    let _ = executor.upload(config_path, previous.as_bytes()).await;
    let _ = reload(executor, config_path).await;
    return Err(err);
  }
  Ok(())
}
