use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use siteflow_response::{AppError, ErrorKind, Result};

use crate::state::AppState;
use crate::types::{BackupRun, BackupRunInput, RestorePoint, SiteBackupStatus};

pub fn router() -> Router<Arc<AppState>> {
  Router::new()
    .route("/runs", post(ingest_run))
    .route("/summary", get(summary))
    .route("/snapshots", get(restore_points))
}

#[derive(Debug, Deserialize)]
struct SnapshotsQuery {
  site: String,
}

async fn ingest_run(
  State(state): State<Arc<AppState>>,
  Json(input): Json<BackupRunInput>,
) -> Result<Json<BackupRun>> {
  let run = state.backups.record(input).map_err(|err| AppError::new(ErrorKind::Fatal, err))?;
  Ok(Json(run))
}

async fn summary(
  State(state): State<Arc<AppState>>,
) -> Result<Json<std::collections::BTreeMap<String, SiteBackupStatus>>> {
  let summary = state.backups.summary().map_err(|err| AppError::new(ErrorKind::Fatal, err))?;
  Ok(Json(summary))
}

async fn restore_points(
  State(state): State<Arc<AppState>>,
  Query(query): Query<SnapshotsQuery>,
) -> Result<Json<Vec<RestorePoint>>> {
  let points = state
    .backups
    .restore_points(&query.site)
    .map_err(|err| AppError::new(ErrorKind::Fatal, err))?;
  Ok(Json(points))
}
