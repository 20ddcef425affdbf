use crate::types::{Container, Route, Service, Site, SiteStatus};

/// One `docker ps` line, already parsed from the remote host's
/// newline-delimited JSON output.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawContainer {
  #[serde(rename = "Names")]
  pub names: String,
  #[serde(rename = "Status")]
  pub status: String,
  #[serde(rename = "State")]
  pub state: String,
  #[serde(rename = "Image")]
  pub image: String,
  #[serde(rename = "Ports")]
  pub ports: String,
}

impl From<RawContainer> for Container {
  fn from(raw: RawContainer) -> Self {
    Container {
      name: raw.names,
      status_text: raw.status,
      state: Some(raw.state),
      image: Some(raw.image),
      ports: raw
        .ports
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect(),
    }
  }
}

/// A declared site before live-state correlation: its directory name,
/// path, which compose file was found, and either its parsed services
/// or the error that prevented parsing.
pub struct DiscoveredSite {
  pub name: String,
  pub path: String,
  pub compose_file: String,
  pub services: Result<Vec<Service>, String>,
}

/// Joins declared services against the live container list and the
/// gateway's routes to produce a [`Site`] per discovered directory. A
/// site whose compose file failed to parse still gets a record (status
/// `unknown`, `error` set) rather than being dropped, so a single bad
/// site can't blank out the rest of the fleet.
pub fn correlate(
  sites: Vec<DiscoveredSite>,
  live_containers: &[Container],
  routes: &[Route],
) -> Vec<Site> {
  sites
    .into_iter()
    .map(|discovered| build_site(discovered, live_containers, routes))
    .collect()
}

fn build_site(
  discovered: DiscoveredSite,
  live_containers: &[Container],
  routes: &[Route],
) -> Site {
  let services = match discovered.services {
    Ok(services) => services,
    Err(error) => {
      return Site {
        name: discovered.name,
        path: discovered.path,
        compose_file: discovered.compose_file,
        services: Vec::new(),
        containers: Vec::new(),
        domains: Vec::new(),
        targets: Vec::new(),
        status: SiteStatus::Unknown,
        error: Some(error),
      };
    }
  };

  let declared_names: Vec<String> = services
    .iter()
    .map(|service| {
      service
        .container_name
        .clone()
        .unwrap_or_else(|| format!("{}_{}", discovered.name, service.name))
    })
    .collect();

  let containers: Vec<Container> = live_containers
    .iter()
    .filter(|container| {
      declared_names.iter().any(|name| &container.name == name)
        || container.name.starts_with(&format!("{}_", discovered.name))
        || container.name.starts_with(&format!("{}-", discovered.name))
    })
    .cloned()
    .collect();

  let site_targets: Vec<Route> = routes
    .iter()
    .filter(|route| {
      route
        .container
        .as_ref()
        .is_some_and(|c| declared_names.iter().any(|n| n == c))
    })
    .cloned()
    .collect();

  let mut domains: Vec<String> =
    site_targets.iter().map(|r| r.domain.clone()).collect();
  domains.sort();
  domains.dedup();

  let status = Site::derive_status(&containers);

  Site {
    name: discovered.name,
    path: discovered.path,
    compose_file: discovered.compose_file,
    services,
    containers,
    domains,
    targets: site_targets,
    status,
    error: None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  fn service(name: &str) -> Service {
    Service {
      name: name.to_string(),
      container_name: Some(format!("blog_{name}")),
      image: Some("nginx".into()),
      ports: vec![],
      labels: BTreeMap::new(),
      environment: BTreeMap::new(),
    }
  }

  #[test]
  fn correlates_containers_and_routes_by_declared_name() {
    let discovered = DiscoveredSite {
      name: "blog".into(),
      path: "/srv/sites/blog".into(),
      compose_file: "docker-compose.yml".into(),
      services: Ok(vec![service("web")]),
    };
    let containers = vec![Container {
      name: "blog_web".into(),
      status_text: "Up 2 hours".into(),
      state: Some("running".into()),
      image: Some("nginx".into()),
      ports: vec![],
    }];
    let routes = vec![Route {
      domain: "blog.example.com".into(),
      container: Some("blog_web".into()),
      port: Some(80),
      target: "blog_web:80".into(),
    }];
    let sites = correlate(vec![discovered], &containers, &routes);
    assert_eq!(sites.len(), 1);
    let site = &sites[0];
    assert_eq!(site.status, SiteStatus::Running);
    assert_eq!(site.domains, vec!["blog.example.com".to_string()]);
    assert_eq!(site.containers.len(), 1);
  }

  #[test]
  fn parse_failure_still_produces_a_record() {
    let discovered = DiscoveredSite {
      name: "broken".into(),
      path: "/srv/sites/broken".into(),
      compose_file: "docker-compose.yml".into(),
      services: Err("invalid yaml".into()),
    };
    let sites = correlate(vec![discovered], &[], &[]);
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].status, SiteStatus::Unknown);
    assert_eq!(sites[0].error.as_deref(), Some("invalid yaml"));
  }
}
