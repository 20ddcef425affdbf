use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use siteflow_response::{AppError, ErrorKind, Result};

use crate::state::AppState;
use crate::types::Graph;

pub fn router() -> Router<Arc<AppState>> {
  Router::new().route("/", get(get_graph))
}

#[derive(Debug, Deserialize)]
struct RefreshQuery {
  #[serde(default)]
  refresh: bool,
}

async fn get_graph(
  State(state): State<Arc<AppState>>,
  Query(query): Query<RefreshQuery>,
) -> Result<Json<Graph>> {
  let graph = state
    .graph(query.refresh)
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  Ok(Json(graph))
}
