use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
  Router::new().route("/", get(list_monitors))
}

async fn list_monitors(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
  let monitors = state.health.list_monitors();
  Json(serde_json::json!({ "monitors": monitors }))
}
