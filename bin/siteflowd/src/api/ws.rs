use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use uuid::Uuid;

use crate::actions::container as container_action;
use crate::hub::Connection;
use crate::state::AppState;
use crate::types::{ActionOutputStatus, ServerMessage, TargetType};

pub fn router() -> Router<Arc<AppState>> {
  Router::new().route("/", get(upgrade))
}

async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
  ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: axum::extract::ws::WebSocket, state: Arc<AppState>) {
  let (id, outbound) = state.hub.register();
  let connection = Connection { id, hub: state.hub.clone() };

  connection
    .run(socket, outbound, move |id, container, action| {
      let state = state.clone();
      async move { dispatch_action(state, id, container, action).await }
    })
    .await;
}

/// Runs a container action requested over the websocket through the
/// same serialized+audited path the REST container handler uses, then
/// reports start/completion back only to the requesting connection.
async fn dispatch_action(state: Arc<AppState>, connection_id: Uuid, container: String, action: String) {
  let Ok(parsed) = parse_action(&action) else {
    state.hub.send_to(
      connection_id,
      ServerMessage::ActionOutput {
        container,
        action,
        status: ActionOutputStatus::Failed,
        output: None,
        error: Some("unknown action".to_string()),
        duration_ms: None,
      },
    );
    return;
  };

  state.hub.send_to(
    connection_id,
    ServerMessage::ActionOutput {
      container: container.clone(),
      action: action.clone(),
      status: ActionOutputStatus::Started,
      output: None,
      error: None,
      duration_ms: None,
    },
  );

  let action_type = format!("container_{action}");
  let is_logs = matches!(parsed, container_action::ContainerAction::Logs);
  let start = siteflow_command::now_ms();

  let result = if is_logs {
    state
      .actions
      .serialized(&container, || async {
        state
          .audited(TargetType::Container, &container, &action_type, || async {
            let (mut chunks, done) =
              container_action::run_stream_logs(state.actions.executor(), &container)
                .await
                .map_err(|err| siteflow_response::AppError::new(siteflow_response::ErrorKind::Transport, err))?;

            while let Some(line) = chunks.recv().await {
              state.hub.send_to(
                connection_id,
                ServerMessage::ActionOutput {
                  container: container.clone(),
                  action: action.clone(),
                  status: ActionOutputStatus::Output,
                  output: Some(line),
                  error: None,
                  duration_ms: None,
                },
              );
            }

            let output = done
              .await
              .map_err(|err| siteflow_response::AppError::new(siteflow_response::ErrorKind::Fatal, anyhow::anyhow!(err)))?
              .map_err(|err| siteflow_response::AppError::new(siteflow_response::ErrorKind::Transport, err))?;

            if output.success() {
              Ok((output.combined(), output.combined()))
            } else {
              Err(siteflow_response::AppError::new(
                siteflow_response::ErrorKind::CommandFailure,
                anyhow::anyhow!("{}", output.combined()),
              ))
            }
          })
          .await
      })
      .await
  } else {
    state
      .actions
      .serialized(&container, || async {
        state
          .audited(TargetType::Container, &container, &action_type, || async {
            let output = container_action::run(state.actions.executor(), &container, parsed)
              .await
              .map_err(|err| siteflow_response::AppError::new(siteflow_response::ErrorKind::Transport, err))?;
            if output.success() {
              Ok((output.combined(), output.combined()))
            } else {
              Err(siteflow_response::AppError::new(
                siteflow_response::ErrorKind::CommandFailure,
                anyhow::anyhow!("{}", output.combined()),
              ))
            }
          })
          .await
      })
      .await
  };

  if !is_logs && result.is_ok() {
    state.cache.invalidate().await;
  }

  let duration_ms = siteflow_command::now_ms() - start;
  let message = match result {
    Ok(output) => ServerMessage::ActionOutput {
      container,
      action,
      status: ActionOutputStatus::Completed,
      output: Some(output),
      error: None,
      duration_ms: Some(duration_ms),
    },
    Err(err) => ServerMessage::ActionOutput {
      container,
      action,
      status: ActionOutputStatus::Failed,
      output: None,
      error: Some(err.to_string()),
      duration_ms: Some(duration_ms),
    },
  };
  state.hub.send_to(connection_id, message);
}

fn parse_action(action: &str) -> anyhow::Result<container_action::ContainerAction> {
  match action {
    "start" => Ok(container_action::ContainerAction::Start),
    "stop" => Ok(container_action::ContainerAction::Stop),
    "restart" => Ok(container_action::ContainerAction::Restart),
    "logs" => Ok(container_action::ContainerAction::Logs),
    other => anyhow::bail!("unknown container action {other}"),
  }
}
