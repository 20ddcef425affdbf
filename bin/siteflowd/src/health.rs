use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

const RECONNECT_BACKOFF_START: Duration = Duration::from_secs(1);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);
const HEARTBEAT_WINDOW: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HeartbeatStatus {
  Down = 0,
  Up = 1,
  Pending = 2,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MonitorStatus {
  pub up: bool,
  pub ping: Option<f64>,
  pub uptime: f64,
  pub heartbeats: Vec<HeartbeatStatus>,
}

fn uptime_over_window(heartbeats: &[HeartbeatStatus]) -> f64 {
  if heartbeats.is_empty() {
    return 0.0;
  }
  let up = heartbeats.iter().filter(|h| matches!(h, HeartbeatStatus::Up)).count();
  (up as f64 / heartbeats.len() as f64) * 100.0
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum InboundEvent {
  #[serde(rename = "heartbeat")]
  Heartbeat { monitor_name: String, status: u8, ping: Option<f64> },
  #[serde(other)]
  Unhandled,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum OutboundCommand<'a> {
  Login { username: &'a str, password: &'a str },
  AddMonitor { name: &'a str, url: &'a str },
  DeleteMonitor { name: &'a str },
}

/// Maintains a persistent connection to the uptime monitor's
/// push-style socket protocol, re-authenticating and reconnecting with
/// backoff on disconnect. Failure-tolerant by design: while
/// disconnected, `list_monitors` returns an empty mapping rather than
/// an error, so a flaky monitor service degrades the health overlay
/// instead of the whole API surface.
pub struct HealthAdapter {
  url: String,
  username: String,
  password: String,
  monitors: ArcSwap<BTreeMap<String, MonitorStatus>>,
  command_tx: tokio::sync::mpsc::UnboundedSender<String>,
}

impl HealthAdapter {
  pub fn spawn(url: String, username: String, password: String) -> Arc<Self> {
    let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
    let adapter = Arc::new(HealthAdapter {
      url,
      username,
      password,
      monitors: ArcSwap::from_pointee(BTreeMap::new()),
      command_tx,
    });
    tokio::spawn(run_loop(adapter.clone(), command_rx));
    adapter
  }

  /// No uptime monitor is configured: `list_monitors` always returns
  /// empty and no reconnect loop ever runs.
  pub fn disabled() -> Arc<Self> {
    let (command_tx, _command_rx) = tokio::sync::mpsc::unbounded_channel();
    Arc::new(HealthAdapter {
      url: String::new(),
      username: String::new(),
      password: String::new(),
      monitors: ArcSwap::from_pointee(BTreeMap::new()),
      command_tx,
    })
  }

  pub fn list_monitors(&self) -> BTreeMap<String, MonitorStatus> {
    (**self.monitors.load()).clone()
  }

  pub fn create_monitor(&self, name: &str, url: &str) {
    let command = OutboundCommand::AddMonitor { name, url };
    if let Ok(json) = serde_json::to_string(&command) {
      let _ = self.command_tx.send(json);
    }
  }

  pub fn delete_monitor(&self, name: &str) {
    let command = OutboundCommand::DeleteMonitor { name };
    if let Ok(json) = serde_json::to_string(&command) {
      let _ = self.command_tx.send(json);
    }
  }
}

async fn run_loop(
  adapter: Arc<HealthAdapter>,
  mut command_rx: tokio::sync::mpsc::UnboundedReceiver<String>,
) {
  let mut backoff = RECONNECT_BACKOFF_START;
  loop {
    match connect_and_serve(&adapter, &mut command_rx).await {
      Ok(()) => backoff = RECONNECT_BACKOFF_START,
      Err(err) => {
        warn!("uptime monitor connection lost: {err:#}; reconnecting in {backoff:?}");
        adapter.monitors.store(Arc::new(BTreeMap::new()));
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
      }
    }
  }
}

async fn connect_and_serve(
  adapter: &Arc<HealthAdapter>,
  command_rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<()> {
  let (ws_stream, _) = tokio_tungstenite::connect_async(&adapter.url).await?;
  let (mut write, mut read) = ws_stream.split();

  let login = OutboundCommand::Login { username: &adapter.username, password: &adapter.password };
  write.send(Message::Text(serde_json::to_string(&login)?.into())).await?;

  let mut heartbeats: BTreeMap<String, Vec<HeartbeatStatus>> = BTreeMap::new();
  let mut pings: BTreeMap<String, f64> = BTreeMap::new();

  loop {
    tokio::select! {
      incoming = read.next() => {
        let message = match incoming {
          Some(Ok(message)) => message,
          Some(Err(err)) => return Err(err.into()),
          None => anyhow::bail!("uptime monitor socket closed"),
        };
        let Message::Text(text) = message else { continue };
        let Ok(event) = serde_json::from_str::<InboundEvent>(&text) else {
          debug!("unrecognized uptime monitor event: {text}");
          continue;
        };
        if let InboundEvent::Heartbeat { monitor_name, status, ping } = event {
          let status = match status {
            1 => HeartbeatStatus::Up,
            2 => HeartbeatStatus::Pending,
            _ => HeartbeatStatus::Down,
          };
          let window = heartbeats.entry(monitor_name.clone()).or_default();
          window.push(status);
          if window.len() > HEARTBEAT_WINDOW {
            window.remove(0);
          }
          if let Some(ping) = ping {
            pings.insert(monitor_name.clone(), ping);
          }
          publish(adapter, &heartbeats, &pings);
        }
      }
      command = command_rx.recv() => {
        match command {
          Some(json) => { write.send(Message::Text(json.into())).await?; }
          None => return Ok(()),
        }
      }
    }
  }
}

fn publish(
  adapter: &Arc<HealthAdapter>,
  heartbeats: &BTreeMap<String, Vec<HeartbeatStatus>>,
  pings: &BTreeMap<String, f64>,
) {
  let mut monitors = BTreeMap::new();
  for (name, window) in heartbeats {
    let up = matches!(window.last(), Some(HeartbeatStatus::Up));
    monitors.insert(
      name.clone(),
      MonitorStatus {
        up,
        ping: pings.get(name).copied(),
        uptime: uptime_over_window(window),
        heartbeats: window.clone(),
      },
    );
  }
  adapter.monitors.store(Arc::new(monitors));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn uptime_is_percentage_of_up_samples() {
    let window = vec![
      HeartbeatStatus::Up,
      HeartbeatStatus::Up,
      HeartbeatStatus::Down,
      HeartbeatStatus::Up,
    ];
    assert_eq!(uptime_over_window(&window), 75.0);
  }

  #[test]
  fn empty_window_is_zero_uptime() {
    assert_eq!(uptime_over_window(&[]), 0.0);
  }
}
