use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use siteflow_response::{AppError, ErrorKind, Result};

use crate::provision::detect::{self, Detection, Template};
use crate::provision::{DeprovisionRequest, ProvisionError, ProvisionRequest};
use crate::state::AppState;
use crate::types::TargetType;

pub fn router() -> Router<Arc<AppState>> {
  Router::new()
    .route("/templates", get(list_templates))
    .route("/detect", post(detect_template))
    .route("/", post(create_site).delete(deprovision_site))
}

async fn list_templates() -> Json<Vec<Template>> {
  Json(vec![Template::Static, Template::Node, Template::Python, Template::Wordpress])
}

#[derive(Debug, Deserialize)]
struct DetectBody {
  #[serde(default)]
  git_url: Option<String>,
  #[serde(default)]
  path: Option<String>,
}

/// Both `git_url` and `path` name a source tree the remote host doesn't
/// have yet (or has outside `sites_root`): shallow-clone or point at it
/// directly, list its top-level entries over the same SSH connection
/// discovery uses, then classify by marker presence.
async fn detect_template(
  State(state): State<Arc<AppState>>,
  Json(body): Json<DetectBody>,
) -> Result<Json<Detection>> {
  let entries = if let Some(git_url) = &body.git_url {
    let staging = format!("/tmp/siteflow-detect-{}", uuid::Uuid::new_v4());
    let clone = state
      .executor
      .run(&["git", "clone", "--depth", "1", git_url, &staging])
      .await
      .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
    if !clone.success() {
      return Err(AppError::new(
        ErrorKind::Transport,
        anyhow::anyhow!("failed to clone {git_url}: {}", clone.combined()),
      ));
    }
    let entries = list_entries(&state, &staging).await?;
    let _ = state.executor.run(&["rm", "-rf", &staging]).await;
    entries
  } else if let Some(path) = &body.path {
    list_entries(&state, path).await?
  } else {
    return Err(AppError::new(
      ErrorKind::Validation,
      anyhow::anyhow!("one of git_url or path is required"),
    ));
  };
  Ok(Json(detect::detect(&entries)))
}

async fn list_entries(state: &AppState, root: &str) -> Result<Vec<String>> {
  let output = state
    .executor
    .run(&["find", root, "-mindepth", "1"])
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  let prefix = format!("{}/", root.trim_end_matches('/'));
  Ok(
    output
      .stdout
      .lines()
      .map(|line| line.strip_prefix(&prefix).unwrap_or(line).to_string())
      .collect(),
  )
}

#[derive(Debug, Deserialize)]
struct CreateBody {
  name: String,
  template: Template,
  #[serde(default)]
  domain: Option<String>,
  #[serde(default)]
  environment: BTreeMap<String, String>,
}

async fn create_site(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateBody>,
) -> Result<Json<serde_json::Value>> {
  let name = body.name.clone();
  let outcome = state
    .audited(TargetType::Site, &name, "site_provision", || async {
      let request = ProvisionRequest {
        name: body.name,
        template: body.template,
        domain: body.domain,
        environment: body.environment,
      };
      state.provisioner.create(request).await.map_err(|err| match err {
        ProvisionError::Validation(err) => AppError::new(ErrorKind::Validation, err),
        ProvisionError::Failed { error, compensations_run } => AppError::new(
          ErrorKind::Transport,
          anyhow::anyhow!("{error:#}; rolled back: [{}]", compensations_run.join(", ")),
        ),
      }).map(|outcome| {
        let log = format!("created at {} with domain {}", outcome.site_path, outcome.domain);
        (outcome, log)
      })
    })
    .await?;

  state.cache.invalidate().await;
  Ok(Json(serde_json::json!({
    "status": "success",
    "site_path": outcome.site_path,
    "domain": outcome.domain,
  })))
}

#[derive(Debug, Deserialize)]
struct DeprovisionBody {
  name: String,
  #[serde(default)]
  remove_volumes: bool,
  #[serde(default)]
  remove_files: bool,
}

async fn deprovision_site(
  State(state): State<Arc<AppState>>,
  Json(body): Json<DeprovisionBody>,
) -> Result<Json<serde_json::Value>> {
  let name = body.name.clone();
  state
    .audited(TargetType::Site, &name, "site_deprovision", || async {
      let request = DeprovisionRequest {
        name: body.name,
        remove_volumes: body.remove_volumes,
        remove_files: body.remove_files,
      };
      state
        .provisioner
        .deprovision(request)
        .await
        .map(|()| ((), "deprovisioned".to_string()))
        .map_err(|err| AppError::new(ErrorKind::Transport, err))
    })
    .await?;

  state.cache.invalidate().await;
  Ok(Json(serde_json::json!({ "status": "success" })))
}
