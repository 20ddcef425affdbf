mod connection;

pub use connection::Connection;

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::types::ServerMessage;

const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Fans broadcast deltas and direct action output out to subscribed
/// websocket connections. Each connection gets its own bounded
/// outbound queue; a connection that can't keep up has messages
/// dropped for it rather than ever blocking the publishers.
#[derive(Default)]
pub struct SubscriptionHub {
  connections: DashMap<Uuid, ConnectionHandle>,
}

struct ConnectionHandle {
  topics: BTreeSet<String>,
  outbound: mpsc::Sender<ServerMessage>,
}

impl SubscriptionHub {
  pub fn new() -> Self {
    SubscriptionHub { connections: DashMap::new() }
  }

  /// Registers a new connection and returns its id plus the receiving
  /// half of its outbound queue, which the websocket write task drains.
  pub fn register(self: &Arc<Self>) -> (Uuid, mpsc::Receiver<ServerMessage>) {
    let id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    self
      .connections
      .insert(id, ConnectionHandle { topics: BTreeSet::new(), outbound: tx });
    (id, rx)
  }

  pub fn unregister(&self, id: Uuid) {
    self.connections.remove(&id);
  }

  pub fn subscribe(&self, id: Uuid, topic: &str) {
    if let Some(mut handle) = self.connections.get_mut(&id) {
      handle.topics.insert(topic.to_string());
    }
  }

  pub fn unsubscribe(&self, id: Uuid, topic: &str) {
    if let Some(mut handle) = self.connections.get_mut(&id) {
      handle.topics.remove(topic);
    }
  }

  /// Sends `message` to one specific connection (used for
  /// `action.output` progress, which only the requesting client should
  /// see). A connection whose queue is full is a slow consumer and is
  /// dropped outright rather than having the message silently discarded.
  pub fn send_to(&self, id: Uuid, message: ServerMessage) {
    let full = match self.connections.get(&id) {
      Some(handle) => matches!(
        handle.outbound.try_send(message),
        Err(mpsc::error::TrySendError::Full(_))
      ),
      None => false,
    };
    if full {
      warn!("connection {id} outbound queue full, dropping slow consumer");
      self.connections.remove(&id);
    }
  }

  /// Broadcasts `message` to every connection subscribed to `topic`.
  /// Slow consumers (full outbound queue) are dropped as a connection,
  /// not just skipped for this one message; fast consumers are
  /// unaffected.
  pub fn publish(&self, topic: &str, message: ServerMessage) {
    let mut slow_consumers = Vec::new();
    for entry in self.connections.iter() {
      if entry.value().topics.contains(topic) {
        if let Err(mpsc::error::TrySendError::Full(_)) =
          entry.value().outbound.try_send(message.clone())
        {
          slow_consumers.push(*entry.key());
        }
      }
    }
    for id in slow_consumers {
      warn!("connection {id} outbound queue full, dropping slow consumer");
      self.connections.remove(&id);
    }
  }

  pub fn connection_count(&self) -> usize {
    self.connections.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn publish_drops_a_connection_whose_queue_fills_up() {
    let hub = Arc::new(SubscriptionHub::new());
    let (id, _rx) = hub.register();
    hub.subscribe(id, "sites.update");

    for _ in 0..OUTBOUND_QUEUE_CAPACITY {
      hub.publish("sites.update", ServerMessage::Pong);
    }
    assert_eq!(hub.connection_count(), 1);

    hub.publish("sites.update", ServerMessage::Pong);
    assert_eq!(hub.connection_count(), 0);
  }

  #[tokio::test]
  async fn send_to_drops_a_connection_whose_queue_fills_up() {
    let hub = Arc::new(SubscriptionHub::new());
    let (id, _rx) = hub.register();

    for _ in 0..OUTBOUND_QUEUE_CAPACITY {
      hub.send_to(id, ServerMessage::Pong);
    }
    assert_eq!(hub.connection_count(), 1);

    hub.send_to(id, ServerMessage::Pong);
    assert_eq!(hub.connection_count(), 0);
  }

  #[tokio::test]
  async fn publish_only_reaches_subscribed_connections() {
    let hub = Arc::new(SubscriptionHub::new());
    let (id, mut rx) = hub.register();
    hub.subscribe(id, "sites.update");

    hub.publish("graph.update", ServerMessage::Pong);
    assert!(rx.try_recv().is_err());

    hub.publish("sites.update", ServerMessage::Pong);
    assert!(rx.try_recv().is_ok());
  }
}
