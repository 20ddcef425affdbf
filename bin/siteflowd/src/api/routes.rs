use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use siteflow_response::{AppError, ErrorKind, Result};

use crate::discovery::proxy as proxy_format;
use crate::state::AppState;
use crate::types::{Route, TargetType};

pub fn router() -> Router<Arc<AppState>> {
  Router::new()
    .route("/", get(list_routes).post(add_route).delete(remove_route))
}

async fn list_routes(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Route>>> {
  let contents = state
    .executor
    .read_file(&state.config.proxy_config_path)
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  let routes = proxy_format::parse_routes(&contents)
    .map_err(|err| AppError::new(ErrorKind::Fatal, err))?;
  Ok(Json(routes))
}

#[derive(Debug, Deserialize)]
struct AddRouteBody {
  domain: String,
  container: String,
  port: u16,
}

async fn add_route(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AddRouteBody>,
) -> Result<Json<Vec<Route>>> {
  let target = format!("{}:{}", body.container, body.port);
  let routes = state
    .actions
    .serialized("__proxy__", || async {
      state
        .audited(TargetType::Route, &body.domain, "route_add", || async {
          crate::actions::proxy::upsert_route(
            &state.executor,
            &state.config.proxy_config_path,
            &body.domain,
            &target,
          )
          .await
          .map(|routes| {
            let log = serde_json::to_string(&routes).unwrap_or_default();
            (routes, log)
          })
        })
        .await
    })
    .await?;
  Ok(Json(routes))
}

#[derive(Debug, Deserialize)]
struct DomainQuery {
  domain: String,
}

async fn remove_route(
  State(state): State<Arc<AppState>>,
  Query(query): Query<DomainQuery>,
) -> Result<Json<serde_json::Value>> {
  state
    .actions
    .serialized("__proxy__", || async {
      state
        .audited(TargetType::Route, &query.domain, "route_remove", || async {
          crate::actions::proxy::remove_route(
            &state.executor,
            &state.config.proxy_config_path,
            &query.domain,
          )
          .await
          .map(|()| ((), String::new()))
        })
        .await
    })
    .await?;
  Ok(Json(serde_json::json!({ "status": "success" })))
}
