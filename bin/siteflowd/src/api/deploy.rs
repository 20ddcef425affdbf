use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use siteflow_command::{all_stages_success, now_ms, Stage};
use siteflow_git::GitRemote;

use siteflow_response::{AppError, ErrorKind, Result};

use crate::state::AppState;
use crate::types::{Site, TargetType};

/// Folder uploads over SSH can take a while for a large static site
/// with many small assets.
const FOLDER_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

pub fn router() -> Router<Arc<AppState>> {
  Router::new()
    .route("/github", post(deploy_github))
    .route("/upload", post(deploy_upload))
    .route("/folder", post(deploy_folder))
    .route("/pull", post(deploy_pull))
    .route("/{site}/status", get(deploy_status))
}

async fn site_record(state: &AppState, name: &str) -> Result<Site> {
  let sites = state.sites(false).await.map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  sites
    .into_iter()
    .find(|s| s.name == name)
    .ok_or_else(|| AppError::new(ErrorKind::NotFound, anyhow::anyhow!("unknown site {name}")))
}

#[derive(Debug, Deserialize)]
struct GithubDeployBody {
  site: String,
  repo_url: String,
  #[serde(default)]
  branch: Option<String>,
  #[serde(default)]
  access_token: Option<String>,
}

async fn deploy_github(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GithubDeployBody>,
) -> Result<Json<serde_json::Value>> {
  let site = site_record(&state, &body.site).await?;
  let remote = GitRemote::new(body.repo_url, body.branch, None);
  let access_token = body.access_token;

  let stages = state
    .actions
    .serialized(&body.site, || async {
      state
        .audited(TargetType::Site, &body.site, "deploy_github", || async {
          let stages = crate::actions::deploy::deploy_from_git(
            &state.executor,
            &site.path,
            &site.compose_file,
            &remote,
            access_token.as_deref(),
          )
          .await;
          let log = stages
            .iter()
            .map(|stage| format!("[{}] {}", stage.stage, stage.output.combined()))
            .collect::<Vec<_>>()
            .join("\n");
          if all_stages_success(&stages) {
            Ok((stages, log))
          } else {
            Err(AppError::new(ErrorKind::CommandFailure, anyhow::anyhow!("{log}")))
          }
        })
        .await
    })
    .await?;

  state.cache.invalidate().await;
  Ok(Json(serde_json::json!({ "status": "success", "stages": stages })))
}

/// Extracts an uploaded archive or file set into a staging directory
/// under the site path, then atomically swaps it in for `content/`:
/// `content` -> `content.previous`, staging -> `content`. A failure
/// partway through never leaves `content` missing — the rename only
/// happens once extraction has fully succeeded.
async fn swap_in_staging(
  state: &AppState,
  site_path: &str,
  staging: &str,
) -> siteflow_response::Result<()> {
  let content = shell_escape::escape(format!("{site_path}/content").into());
  let previous = shell_escape::escape(format!("{site_path}/content.previous").into());
  let staging = shell_escape::escape(staging.into());
  let swap = format!(
    "rm -rf {previous} && (test -d {content} && mv {content} {previous} || true) && mv {staging} {content}"
  );
  let output = state
    .executor
    .run_shell(&swap)
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  if !output.success() {
    return Err(AppError::new(
      ErrorKind::CommandFailure,
      anyhow::anyhow!("failed to swap in staged deploy: {}", output.combined()),
    ));
  }
  Ok(())
}

async fn deploy_upload(
  State(state): State<Arc<AppState>>,
  mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
  let mut site: Option<String> = None;
  let mut archive: Option<Vec<u8>> = None;

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|err| AppError::new(ErrorKind::Validation, err))?
  {
    match field.name() {
      Some("site") => {
        site = Some(field.text().await.map_err(|err| AppError::new(ErrorKind::Validation, err))?);
      }
      Some("file") => {
        archive = Some(
          field
            .bytes()
            .await
            .map_err(|err| AppError::new(ErrorKind::Validation, err))?
            .to_vec(),
        );
      }
      _ => {}
    }
  }

  let site_name = site.ok_or_else(|| {
    AppError::new(ErrorKind::Validation, anyhow::anyhow!("missing 'site' field"))
  })?;
  let archive = archive.ok_or_else(|| {
    AppError::new(ErrorKind::Validation, anyhow::anyhow!("missing 'file' field"))
  })?;
  let record = site_record(&state, &site_name).await?;

  state
    .actions
    .serialized(&site_name, || async {
      state
        .audited(TargetType::Site, &site_name, "deploy_upload", || async {
          let staging = format!("{}/.staging-{}", record.path, uuid::Uuid::new_v4());
          let archive_path = format!("{staging}.zip");
          state
            .executor
            .run(&["mkdir", "-p", &staging])
            .await
            .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
          state
            .executor
            .upload(&archive_path, &archive)
            .await
            .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
          let unzip = state
            .executor
            .run_timeout(
              &["unzip", "-o", &archive_path, "-d", &staging],
              FOLDER_UPLOAD_TIMEOUT,
            )
            .await
            .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
          let _ = state.executor.run(&["rm", "-f", &archive_path]).await;
          if !unzip.success() {
            let _ = state.executor.run(&["rm", "-rf", &staging]).await;
            return Err(AppError::new(
              ErrorKind::CommandFailure,
              anyhow::anyhow!("unzip failed: {}", unzip.combined()),
            ));
          }
          swap_in_staging(&state, &record.path, &staging).await?;
          Ok(((), format!("uploaded archive extracted into {}/content", record.path)))
        })
        .await
    })
    .await?;

  state.cache.invalidate().await;
  Ok(Json(serde_json::json!({ "status": "success" })))
}

async fn deploy_folder(
  State(state): State<Arc<AppState>>,
  mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
  let mut site_name: Option<String> = None;
  let mut files: Vec<(String, Vec<u8>)> = Vec::new();

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|err| AppError::new(ErrorKind::Validation, err))?
  {
    match field.name() {
      Some("site") => {
        site_name =
          Some(field.text().await.map_err(|err| AppError::new(ErrorKind::Validation, err))?);
      }
      Some("files") => {
        let relative_path = field
          .file_name()
          .ok_or_else(|| AppError::new(ErrorKind::Validation, anyhow::anyhow!("file part missing a filename")))?
          .to_string();
        let bytes = field.bytes().await.map_err(|err| AppError::new(ErrorKind::Validation, err))?;
        files.push((relative_path, bytes.to_vec()));
      }
      _ => {}
    }
  }

  let site_name = site_name.ok_or_else(|| {
    AppError::new(ErrorKind::Validation, anyhow::anyhow!("missing 'site' field"))
  })?;
  if files.is_empty() {
    return Err(AppError::new(ErrorKind::Validation, anyhow::anyhow!("no files uploaded")));
  }
  let record = site_record(&state, &site_name).await?;

  state
    .actions
    .serialized(&site_name, || async {
      state
        .audited(TargetType::Site, &site_name, "deploy_folder", || async {
          let staging = format!("{}/.staging-{}", record.path, uuid::Uuid::new_v4());
          let file_count = files.len();
          for (relative_path, bytes) in &files {
            let remote_path = format!("{staging}/{relative_path}");
            if let Some((parent, _)) = remote_path.rsplit_once('/') {
              let _ = state.executor.run(&["mkdir", "-p", parent]).await;
            }
            state
              .executor
              .run_timeout(&["mkdir", "-p", &staging], FOLDER_UPLOAD_TIMEOUT)
              .await
              .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
            state
              .executor
              .upload(&remote_path, bytes)
              .await
              .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
          }
          swap_in_staging(&state, &record.path, &staging).await?;
          Ok(((), format!("uploaded {file_count} files into {}/content", record.path)))
        })
        .await
    })
    .await?;

  state.cache.invalidate().await;
  Ok(Json(serde_json::json!({ "status": "success" })))
}

#[derive(Debug, Deserialize)]
struct PullBody {
  site: String,
}

async fn deploy_pull(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PullBody>,
) -> Result<Json<serde_json::Value>> {
  let record = site_record(&state, &body.site).await?;

  let commit = state
    .actions
    .serialized(&body.site, || async {
      state
        .audited(TargetType::Site, &body.site, "deploy_pull", || async {
          let start = now_ms();
          let pull_cmd = GitRemote::fast_forward_pull_command(&record.path);
          let pull_output = state
            .executor
            .run_shell(&pull_cmd)
            .await
            .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
          let stage = Stage::new("pull", &pull_cmd, start, pull_output);
          if !stage.success() {
            return Err(AppError::new(
              ErrorKind::CommandFailure,
              anyhow::anyhow!("fast-forward pull failed: {}", stage.output.combined()),
            ));
          }
          let resolved = state
            .executor
            .run_shell(&GitRemote::resolved_commit_command(&record.path))
            .await
            .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
          let commit = resolved.stdout.trim().to_string();
          Ok((commit.clone(), format!("pulled to {commit}")))
        })
        .await
    })
    .await?;

  state.cache.invalidate().await;
  Ok(Json(serde_json::json!({ "status": "success", "commit": commit })))
}

async fn deploy_status(
  State(state): State<Arc<AppState>>,
  Path(site): Path<String>,
) -> Result<Json<serde_json::Value>> {
  let record = site_record(&state, &site).await?;
  let is_git = state
    .executor
    .run(&["test", "-d", &format!("{}/.git", record.path)])
    .await
    .map_err(|err| AppError::new(ErrorKind::Transport, err))?;
  if !is_git.success() {
    return Ok(Json(serde_json::json!({ "configured": false })));
  }

  let escaped_path = shell_escape::escape(record.path.clone().into());
  let remote_url = state
    .executor
    .run_shell(&format!("cd {escaped_path} && git remote get-url origin"))
    .await
    .map(|output| output.stdout.trim().to_string())
    .ok();
  let branch = state
    .executor
    .run_shell(&format!("cd {escaped_path} && git rev-parse --abbrev-ref HEAD"))
    .await
    .map(|output| output.stdout.trim().to_string())
    .ok();
  let commit = state
    .executor
    .run_shell(&GitRemote::resolved_commit_command(&record.path))
    .await
    .map(|output| output.stdout.trim().to_string())
    .ok();

  Ok(Json(serde_json::json!({
    "configured": true,
    "repo_url": remote_url,
    "branch": branch,
    "last_commit": commit,
  })))
}
