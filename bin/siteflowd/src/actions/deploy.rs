use std::time::Duration;

use siteflow_command::{Stage, now_ms, sanitize_stage};
use siteflow_git::GitRemote;

use crate::executor::RemoteExecutor;

/// `git fetch`/clone can take a while on a slow link or a large repo.
const GIT_TIMEOUT: Duration = Duration::from_secs(300);
const COMPOSE_TIMEOUT: Duration = Duration::from_secs(120);

/// Deploys (or redeploys) a site from git: clones on first deploy,
/// fetch-resets on subsequent ones, then brings the stack up. Every
/// stage is recorded even on failure so the caller can surface exactly
/// where the deploy stopped.
pub async fn deploy_from_git(
  executor: &RemoteExecutor,
  site_path: &str,
  compose_file: &str,
  remote: &GitRemote,
  access_token: Option<&str>,
) -> Vec<Stage> {
  let (_, redaction) = remote.authenticated_url(access_token);
  let redactions: Vec<(String, String)> = redaction.into_iter().collect();

  let mut stages = Vec::new();

  let exists_start = now_ms();
  let exists_cmd = GitRemote::exists_check_command(site_path);
  let exists_output = match executor.run_shell(&exists_cmd).await {
    Ok(output) => output,
    Err(err) => return vec![transport_failure_stage("check repository", &exists_cmd, exists_start, err)],
  };
  let already_cloned = exists_output.success();

  let checkout_start = now_ms();
  let checkout_cmd = if already_cloned {
    remote.fetch_reset_command(site_path, access_token)
  } else {
    remote.clone_command(site_path, access_token)
  };
  let checkout_label = if already_cloned { "fetch and reset" } else { "clone" };
  let checkout_output = match executor
    .run_timeout(&["sh", "-c", &checkout_cmd], GIT_TIMEOUT)
    .await
  {
    Ok(output) => output,
    Err(err) => {
      stages.push(transport_failure_stage(checkout_label, &checkout_cmd, checkout_start, err));
      return sanitize_all(stages, &redactions);
    }
  };
  let checkout_ok = checkout_output.success();
  stages.push(sanitize_stage(
    Stage::new(checkout_label, &checkout_cmd, checkout_start, checkout_output),
    &redactions,
  ));
  if !checkout_ok {
    return sanitize_all(stages, &redactions);
  }

  let up_start = now_ms();
  let compose_path = format!("{site_path}/{compose_file}");
  let up_cmd = format!(
    "docker compose -f {} up -d --build",
    shell_escape::escape(compose_path.clone().into())
  );
  match executor.run_timeout(&["sh", "-c", &up_cmd], COMPOSE_TIMEOUT).await {
    Ok(output) => {
      stages.push(Stage::new("compose up", &up_cmd, up_start, output));
    }
    Err(err) => {
      stages.push(transport_failure_stage("compose up", &up_cmd, up_start, err));
    }
  }

  sanitize_all(stages, &redactions)
}

fn sanitize_all(stages: Vec<Stage>, redactions: &[(String, String)]) -> Vec<Stage> {
  stages.into_iter().map(|stage| sanitize_stage(stage, redactions)).collect()
}

fn transport_failure_stage(
  label: &str,
  command: &str,
  start_ts: i64,
  err: crate::executor::TransportError,
) -> Stage {
  Stage::new(
    label,
    command,
    start_ts,
    siteflow_command::CommandOutput {
      stdout: String::new(),
      stderr: err.to_string(),
      exit_code: -1,
    },
  )
}
