use std::time::Duration;

use siteflow_command::CommandOutput;

use crate::executor::{RemoteExecutor, TransportError};

/// `docker compose up`/`down` can take a while pulling images or
/// tearing down volumes; give it more room than the default command
/// deadline.
const COMPOSE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteAction {
  Start,
  Stop,
  Restart,
}

/// Runs a whole-site compose control command against `compose_file`
/// inside `site_path`. Callers must hold the site's queue via
/// [`super::ActionEngine::serialized`] before calling this.
pub async fn run(
  executor: &RemoteExecutor,
  site_path: &str,
  compose_file: &str,
  action: SiteAction,
) -> Result<CommandOutput, TransportError> {
  let compose_path = format!("{site_path}/{compose_file}");
  match action {
    SiteAction::Start => {
      executor
        .run_timeout(
          &["docker", "compose", "-f", &compose_path, "up", "-d"],
          COMPOSE_TIMEOUT,
        )
        .await
    }
    SiteAction::Stop => {
      executor
        .run_timeout(
          &["docker", "compose", "-f", &compose_path, "down"],
          COMPOSE_TIMEOUT,
        )
        .await
    }
    SiteAction::Restart => {
      executor
        .run_timeout(
          &["docker", "compose", "-f", &compose_path, "restart"],
          COMPOSE_TIMEOUT,
        )
        .await
    }
  }
}
