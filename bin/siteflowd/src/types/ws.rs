use serde::{Deserialize, Serialize};

use super::site::Site;
use super::graph::Graph;

/// Messages a client may send after connecting. The wire shape is
/// `{type, data}`, matching the design note calling for a tagged
/// variant rather than the original ad-hoc dynamic message shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
  Subscribe { topic: String },
  Unsubscribe { topic: String },
  ActionStart { container: String, action: String },
  Ping,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutputStatus {
  Started,
  /// One chunk of streamed output (e.g. a line of `docker logs`).
  /// Always delivered before the terminal `Completed`/`Failed` for the
  /// same action on the same connection.
  Output,
  Completed,
  Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
  SitesUpdate { sites: Vec<Site> },
  GraphUpdate { graph: Graph },
  ActionOutput {
    container: String,
    action: String,
    status: ActionOutputStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<i64>,
  },
  Error { message: String },
  Pong,
}

impl ServerMessage {
  pub fn to_json(&self) -> String {
    serde_json::to_string(self)
      .expect("ServerMessage always serializes")
  }
}
