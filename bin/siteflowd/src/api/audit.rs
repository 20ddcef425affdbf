use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use siteflow_response::{AppError, ErrorKind, Result};

use crate::state::AppState;
use crate::types::{AuditPage, AuditQuery};

pub fn router() -> Router<Arc<AppState>> {
  Router::new()
    .route("/logs", get(list_logs))
    .route("/cleanup", post(cleanup_logs))
}

async fn list_logs(
  State(state): State<Arc<AppState>>,
  Query(query): Query<AuditQuery>,
) -> Result<Json<AuditPage>> {
  let page = state.audit.query(&query).map_err(|err| AppError::new(ErrorKind::Fatal, err))?;
  Ok(Json(page))
}

async fn cleanup_logs(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
  let cutoff = Utc::now() - chrono::Duration::days(state.config.audit_retention_days);
  let removed = state.audit.cleanup(cutoff).map_err(|err| AppError::new(ErrorKind::Fatal, err))?;
  Ok(Json(serde_json::json!({ "status": "success", "removed": removed })))
}
