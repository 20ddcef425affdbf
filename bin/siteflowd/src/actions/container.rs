use siteflow_command::CommandOutput;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::executor::{RemoteExecutor, TransportError};

const LOG_TAIL_LINES: &str = "200";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAction {
  Start,
  Stop,
  Restart,
  Logs,
}

/// Runs a single-container control command. `logs` is read-only and
/// returns the tail of output instead of controlling the container.
pub async fn run(
  executor: &RemoteExecutor,
  container: &str,
  action: ContainerAction,
) -> Result<CommandOutput, TransportError> {
  match action {
    ContainerAction::Start => executor.run(&["docker", "start", container]).await,
    ContainerAction::Stop => executor.run(&["docker", "stop", container]).await,
    ContainerAction::Restart => {
      executor.run(&["docker", "restart", container]).await
    }
    ContainerAction::Logs => {
      executor
        .run(&["docker", "logs", "--tail", LOG_TAIL_LINES, container])
        .await
    }
  }
}

/// Streams a container's log tail line-by-line instead of waiting for
/// the whole buffered result, so a websocket caller can forward each
/// line as an `action.output` chunk ahead of the terminal status.
pub async fn run_stream_logs(
  executor: &RemoteExecutor,
  container: &str,
) -> Result<(mpsc::Receiver<String>, JoinHandle<Result<CommandOutput, TransportError>>), TransportError> {
  executor
    .run_stream(&["docker", "logs", "--tail", LOG_TAIL_LINES, container])
    .await
}
