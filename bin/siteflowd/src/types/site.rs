use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
  Running,
  Stopped,
  Degraded,
  Unknown,
}

/// A service declared in the site's `docker-compose.yml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
  pub name: String,
  pub container_name: Option<String>,
  pub image: Option<String>,
  pub ports: Vec<String>,
  pub labels: BTreeMap<String, String>,
  pub environment: BTreeMap<String, String>,
}

/// A live container as reported by the container engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Container {
  pub name: String,
  pub status_text: String,
  pub state: Option<String>,
  pub image: Option<String>,
  pub ports: Vec<String>,
}

impl Container {
  /// Per the status invariant: a container counts as healthy iff its
  /// status text begins with "Up".
  pub fn is_up(&self) -> bool {
    self.status_text.starts_with("Up")
  }
}

/// A reverse-proxy route: `domain -> (container, port)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
  pub domain: String,
  pub container: Option<String>,
  pub port: Option<u16>,
  pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
  pub name: String,
  pub path: String,
  pub compose_file: String,
  pub services: Vec<Service>,
  pub containers: Vec<Container>,
  pub domains: Vec<String>,
  pub targets: Vec<Route>,
  pub status: SiteStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl Site {
  /// Derives `status` from `containers` per the core status invariant:
  /// empty -> unknown, all up -> running, none up -> stopped, mixed ->
  /// degraded.
  pub fn derive_status(containers: &[Container]) -> SiteStatus {
    if containers.is_empty() {
      return SiteStatus::Unknown;
    }
    let up = containers.iter().filter(|c| c.is_up()).count();
    if up == containers.len() {
      SiteStatus::Running
    } else if up == 0 {
      SiteStatus::Stopped
    } else {
      SiteStatus::Degraded
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn container(up: bool) -> Container {
    Container {
      name: "c".into(),
      status_text: if up { "Up 3 hours".into() } else { "Exited (0) 2 hours ago".into() },
      state: None,
      image: None,
      ports: vec![],
    }
  }

  #[test]
  fn status_derivation_matrix() {
    assert_eq!(Site::derive_status(&[]), SiteStatus::Unknown);
    assert_eq!(
      Site::derive_status(&[container(true), container(true)]),
      SiteStatus::Running
    );
    assert_eq!(
      Site::derive_status(&[container(false), container(false)]),
      SiteStatus::Stopped
    );
    assert_eq!(
      Site::derive_status(&[container(true), container(false)]),
      SiteStatus::Degraded
    );
  }
}
