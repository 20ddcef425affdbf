use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;

use crate::types::Service;

#[derive(Debug, Deserialize)]
struct ComposeFile {
  #[serde(default)]
  services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Default, Deserialize)]
struct ComposeService {
  container_name: Option<String>,
  image: Option<String>,
  #[serde(default)]
  ports: Vec<PortEntry>,
  #[serde(default)]
  labels: LabelMap,
  #[serde(default)]
  environment: EnvMap,
}

/// Compose allows ports/labels/environment as either a mapping or a
/// list of `"KEY=VALUE"` / `"HOST:CONTAINER"` strings; both shapes show
/// up across real compose files so both are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortEntry {
  Short(String),
  Long { published: Option<serde_yaml_ng::Value>, target: Option<serde_yaml_ng::Value> },
}

impl std::fmt::Display for PortEntry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PortEntry::Short(s) => write!(f, "{s}"),
      PortEntry::Long { published, target } => {
        let published = published
          .as_ref()
          .map(value_to_string)
          .unwrap_or_default();
        let target =
          target.as_ref().map(value_to_string).unwrap_or_default();
        write!(f, "{published}:{target}")
      }
    }
  }
}

fn value_to_string(value: &serde_yaml_ng::Value) -> String {
  match value {
    serde_yaml_ng::Value::String(s) => s.clone(),
    serde_yaml_ng::Value::Number(n) => n.to_string(),
    other => format!("{other:?}"),
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum LabelMap {
  #[default]
  Empty,
  Map(BTreeMap<String, String>),
  List(Vec<String>),
}

impl LabelMap {
  fn into_map(self) -> BTreeMap<String, String> {
    match self {
      LabelMap::Empty => BTreeMap::new(),
      LabelMap::Map(map) => map,
      LabelMap::List(list) => list
        .into_iter()
        .filter_map(|entry| {
          let (k, v) = entry.split_once('=')?;
          Some((k.to_string(), v.to_string()))
        })
        .collect(),
    }
  }
}

type EnvMap = LabelMap;

/// Parses a `docker-compose.yml` into the declared services, tolerating
/// both mapping and list forms of `ports`/`labels`/`environment`.
pub fn parse_compose(yaml: &str) -> anyhow::Result<Vec<Service>> {
  let file: ComposeFile = serde_yaml_ng::from_str(yaml)
    .context("failed to parse docker-compose.yml")?;
  let mut services: Vec<Service> = file
    .services
    .into_iter()
    .map(|(name, service)| Service {
      name,
      container_name: service.container_name,
      image: service.image,
      ports: service.ports.iter().map(PortEntry::to_string).collect(),
      labels: service.labels.into_map(),
      environment: service.environment.into_map(),
    })
    .collect();
  services.sort_by(|a, b| a.name.cmp(&b.name));
  Ok(services)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_short_and_long_port_forms() {
    let yaml = r#"
services:
  web:
    image: nginx:latest
    container_name: blog_web
    ports:
      - "8080:80"
    labels:
      proxy.domain: blog.example.com
    environment:
      - FOO=bar
  db:
    image: postgres:16
"#;
    let services = parse_compose(yaml).unwrap();
    assert_eq!(services.len(), 2);
    let web = services.iter().find(|s| s.name == "web").unwrap();
    assert_eq!(web.container_name.as_deref(), Some("blog_web"));
    assert_eq!(web.ports, vec!["8080:80"]);
    assert_eq!(
      web.labels.get("proxy.domain").map(String::as_str),
      Some("blog.example.com")
    );
    assert_eq!(web.environment.get("FOO").map(String::as_str), Some("bar"));
  }

  #[test]
  fn rejects_malformed_yaml() {
    assert!(parse_compose("services: [this is not a map]").is_err());
  }
}
