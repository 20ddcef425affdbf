use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use siteflow_response::{AppError, ErrorKind, Result};

use crate::actions::{container as container_action, site as site_action};
use crate::state::AppState;
use crate::types::{Site, TargetType};

pub fn router() -> Router<Arc<AppState>> {
  Router::new()
    .route("/", get(list_sites))
    .route("/{site}/{action}", post(site_action_handler))
    .route("/containers/{name}/{action}", post(container_action_handler))
    .route("/caddy/reload", post(reload_proxy))
}

#[derive(Debug, Deserialize)]
struct RefreshQuery {
  #[serde(default)]
  refresh: bool,
}

async fn list_sites(
  State(state): State<Arc<AppState>>,
  Query(query): Query<RefreshQuery>,
) -> Result<Json<Vec<Site>>> {
  let sites = state
    .sites(query.refresh)
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  Ok(Json(sites))
}

async fn site_action_handler(
  State(state): State<Arc<AppState>>,
  Path((site, action)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
  let action = parse_site_action(&action)?;
  let sites = state.sites(false).await.map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  let site_record = sites
    .into_iter()
    .find(|s| s.name == site)
    .ok_or_else(|| AppError::new(ErrorKind::NotFound, anyhow::anyhow!("unknown site {site}")))?;

  let action_type = format!("site_{}", action_label(&action));
  let output = state
    .actions
    .serialized(&site, || async {
      state
        .audited(TargetType::Site, &site, &action_type, || async {
          site_action::run(state.actions.executor(), &site_record.path, &site_record.compose_file, action)
            .await
            .map_err(|err| AppError::new(ErrorKind::Transport, err))
            .and_then(|output| {
              if output.success() {
                Ok((output.combined(), output.combined()))
              } else {
                Err(AppError::new(
                  ErrorKind::CommandFailure,
                  anyhow::anyhow!("{}", output.combined()),
                ))
              }
            })
        })
        .await
    })
    .await?;

  state.cache.invalidate().await;
  Ok(Json(serde_json::json!({ "status": "success", "output": output })))
}

async fn container_action_handler(
  State(state): State<Arc<AppState>>,
  Path((name, action)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
  let action = parse_container_action(&action)?;
  let action_type = format!("container_{}", container_action_label(&action));
  let is_logs = matches!(action, crate::actions::container::ContainerAction::Logs);

  let output = state
    .actions
    .serialized(&name, || async {
      state
        .audited(TargetType::Container, &name, &action_type, || async {
          let output = container_action::run(state.actions.executor(), &name, action)
            .await
            .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
          if is_logs || output.success() {
            Ok((output.combined(), output.combined()))
          } else {
            Err(AppError::new(
              ErrorKind::CommandFailure,
              anyhow::anyhow!("{}", output.combined()),
            ))
          }
        })
        .await
    })
    .await?;

  if !is_logs {
    state.cache.invalidate().await;
  }
  Ok(Json(serde_json::json!({ "status": "success", "output": output })))
}

async fn reload_proxy(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
  state
    .audited(TargetType::Route, "__proxy__", "proxy_reload", || async {
      crate::actions::proxy::reload(&state.executor, &state.config.proxy_config_path)
        .await
        .map(|()| ((), String::new()))
    })
    .await?;
  Ok(Json(serde_json::json!({ "status": "success" })))
}

fn parse_site_action(action: &str) -> Result<site_action::SiteAction> {
  match action {
    "start" => Ok(site_action::SiteAction::Start),
    "stop" => Ok(site_action::SiteAction::Stop),
    "restart" => Ok(site_action::SiteAction::Restart),
    other => Err(AppError::new(
      ErrorKind::Validation,
      anyhow::anyhow!("unknown site action {other}"),
    )),
  }
}

fn action_label(action: &site_action::SiteAction) -> &'static str {
  match action {
    site_action::SiteAction::Start => "start",
    site_action::SiteAction::Stop => "stop",
    site_action::SiteAction::Restart => "restart",
  }
}

fn parse_container_action(action: &str) -> Result<container_action::ContainerAction> {
  match action {
    "start" => Ok(container_action::ContainerAction::Start),
    "stop" => Ok(container_action::ContainerAction::Stop),
    "restart" => Ok(container_action::ContainerAction::Restart),
    "logs" => Ok(container_action::ContainerAction::Logs),
    other => Err(AppError::new(
      ErrorKind::Validation,
      anyhow::anyhow!("unknown container action {other}"),
    )),
  }
}

fn container_action_label(action: &container_action::ContainerAction) -> &'static str {
  match action {
    container_action::ContainerAction::Start => "start",
    container_action::ContainerAction::Stop => "stop",
    container_action::ContainerAction::Restart => "restart",
    container_action::ContainerAction::Logs => "logs",
  }
}
