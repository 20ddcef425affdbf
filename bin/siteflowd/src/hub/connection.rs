use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::debug;
use uuid::Uuid;

use crate::types::{ClientMessage, ServerMessage};

use super::SubscriptionHub;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
/// Three missed heartbeat intervals with no activity from the client
/// (text message, pong, or any other frame) closes the connection.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// One accepted websocket connection: subscribes/unsubscribes on
/// request, routes `action.start` to the caller, and forwards whatever
/// the hub queues for it. Runs until the socket closes or the hub
/// shuts down.
pub struct Connection {
  pub id: Uuid,
  pub hub: Arc<SubscriptionHub>,
}

impl Connection {
  pub async fn run<ActionFn, ActionFut>(
    self,
    socket: WebSocket,
    mut outbound: tokio::sync::mpsc::Receiver<ServerMessage>,
    on_action_start: ActionFn,
  ) where
    ActionFn: Fn(Uuid, String, String) -> ActionFut + Send + Sync + 'static,
    ActionFut: std::future::Future<Output = ()> + Send + 'static,
  {
    let (mut write, mut read) = socket.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // first tick fires immediately; consume it so we don't send a
    // needless ping right after connecting
    heartbeat.tick().await;
    let mut last_activity = Instant::now();

    loop {
      tokio::select! {
        incoming = read.next() => {
          match incoming {
            Some(Ok(Message::Text(text))) => {
              last_activity = Instant::now();
              self.handle_text(&text, &on_action_start).await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {
              last_activity = Instant::now();
            }
            Some(Err(err)) => {
              debug!("websocket read error: {err}");
              break;
            }
          }
        }
        outgoing = outbound.recv() => {
          match outgoing {
            Some(message) => {
              if write.send(Message::Text(message.to_json().into())).await.is_err() {
                break;
              }
            }
            None => break,
          }
        }
        _ = heartbeat.tick() => {
          if last_activity.elapsed() >= IDLE_TIMEOUT {
            debug!("connection {} idle beyond threshold, closing", self.id);
            break;
          }
          if write.send(Message::Ping(Vec::new().into())).await.is_err() {
            break;
          }
        }
      }
    }

    self.hub.unregister(self.id);
  }

  async fn handle_text<ActionFn, ActionFut>(&self, text: &str, on_action_start: &ActionFn)
  where
    ActionFn: Fn(Uuid, String, String) -> ActionFut,
    ActionFut: std::future::Future<Output = ()>,
  {
    let Ok(message) = serde_json::from_str::<ClientMessage>(text) else {
      self.hub.send_to(
        self.id,
        ServerMessage::Error { message: "unrecognized message".to_string() },
      );
      return;
    };
    match message {
      ClientMessage::Subscribe { topic } => self.hub.subscribe(self.id, &topic),
      ClientMessage::Unsubscribe { topic } => self.hub.unsubscribe(self.id, &topic),
      ClientMessage::ActionStart { container, action } => {
        on_action_start(self.id, container, action).await;
      }
      ClientMessage::Ping => self.hub.send_to(self.id, ServerMessage::Pong),
    }
  }
}
