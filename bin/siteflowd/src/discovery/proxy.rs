use anyhow::bail;
use regex::Regex;

use crate::types::Route;

/// Matches a single Caddyfile site block: `domain { ... reverse_proxy
/// target ... }`. Only the first `reverse_proxy` directive per block is
/// read; blocks without one are skipped rather than treated as an
/// error, since a site can have a bare redirect block.
fn block_pattern() -> Regex {
  Regex::new(r"(?ms)^([a-zA-Z0-9_.\-]+)\s*\{(.*?)^\}").unwrap()
}

fn reverse_proxy_pattern() -> Regex {
  Regex::new(r"reverse_proxy\s+(\S+)").unwrap()
}

/// Parses the gateway's Caddyfile into `{domain -> target}` routes.
/// Each target is split into `(container, port)` when it matches
/// `host:port`; otherwise the whole string is kept as an opaque
/// upstream.
pub fn parse_routes(caddyfile: &str) -> anyhow::Result<Vec<Route>> {
  let blocks = block_pattern();
  let proxy = reverse_proxy_pattern();
  let mut routes = Vec::new();
  for capture in blocks.captures_iter(caddyfile) {
    let domain = capture[1].to_string();
    let body = &capture[2];
    let Some(target_match) = proxy.captures(body) else {
      continue;
    };
    let target = target_match[1].to_string();
    let (container, port) = match target.rsplit_once(':') {
      Some((host, port)) => (Some(host.to_string()), port.parse::<u16>().ok()),
      None => (None, None),
    };
    routes.push(Route { domain, container, port, target });
  }
  Ok(routes)
}

/// Rewrites `caddyfile`, replacing the `reverse_proxy` target of the
/// block for `domain` if present, or appending a new block otherwise.
pub fn upsert_route(
  caddyfile: &str,
  domain: &str,
  target: &str,
) -> anyhow::Result<String> {
  let blocks = block_pattern();
  if let Some(capture) = blocks
    .captures_iter(caddyfile)
    .find(|capture| &capture[1] == domain)
  {
    let whole = capture.get(0).unwrap();
    let new_block =
      format!("{domain} {{\n  reverse_proxy {target}\n}}");
    let mut rewritten = String::with_capacity(caddyfile.len());
    rewritten.push_str(&caddyfile[..whole.start()]);
    rewritten.push_str(&new_block);
    rewritten.push_str(&caddyfile[whole.end()..]);
    return Ok(rewritten);
  }
  let mut appended = caddyfile.to_string();
  if !appended.ends_with('\n') && !appended.is_empty() {
    appended.push('\n');
  }
  appended.push_str(&format!(
    "\n{domain} {{\n  reverse_proxy {target}\n}}\n"
  ));
  Ok(appended)
}

/// Removes the block for `domain`. No-op (not an error) if it is
/// already absent, matching the provisioner's idempotent-deprovision
/// contract.
pub fn remove_route(caddyfile: &str, domain: &str) -> anyhow::Result<String> {
  let blocks = block_pattern();
  let Some(capture) = blocks
    .captures_iter(caddyfile)
    .find(|capture| &capture[1] == domain)
  else {
    return Ok(caddyfile.to_string());
  };
  let whole = capture.get(0).unwrap();
  let mut rewritten = String::with_capacity(caddyfile.len());
  rewritten.push_str(&caddyfile[..whole.start()]);
  rewritten.push_str(&caddyfile[whole.end()..]);
  Ok(rewritten)
}

/// Runs `caddy validate` (via the caller's executor) style check
/// up-front by delegating to a syntactic brace-balance check here; the
/// real validation happens on the remote host through the reload
/// command, but callers can use this to fail fast before writing.
pub fn validate_syntax(caddyfile: &str) -> anyhow::Result<()> {
  let opens = caddyfile.matches('{').count();
  let closes = caddyfile.matches('}').count();
  if opens != closes {
    bail!("unbalanced braces in proxy config: {opens} open vs {closes} close");
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
blog.example.com {
  reverse_proxy blog_web:80
}

status.example.com {
  reverse_proxy status_app:3000
}
"#;

  #[test]
  fn parses_domain_target_pairs() {
    let routes = parse_routes(SAMPLE).unwrap();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].domain, "blog.example.com");
    assert_eq!(routes[0].container.as_deref(), Some("blog_web"));
    assert_eq!(routes[0].port, Some(80));
  }

  #[test]
  fn upsert_replaces_existing_block() {
    let updated =
      upsert_route(SAMPLE, "blog.example.com", "blog_web:8080").unwrap();
    let routes = parse_routes(&updated).unwrap();
    let blog = routes.iter().find(|r| r.domain == "blog.example.com").unwrap();
    assert_eq!(blog.port, Some(8080));
    assert_eq!(routes.len(), 2);
  }

  #[test]
  fn upsert_appends_new_block() {
    let updated =
      upsert_route(SAMPLE, "new.example.com", "new_app:4000").unwrap();
    let routes = parse_routes(&updated).unwrap();
    assert_eq!(routes.len(), 3);
  }

  #[test]
  fn remove_is_idempotent() {
    let once = remove_route(SAMPLE, "blog.example.com").unwrap();
    let twice = remove_route(&once, "blog.example.com").unwrap();
    assert_eq!(once, twice);
    assert_eq!(parse_routes(&once).unwrap().len(), 1);
  }

  #[test]
  fn validate_catches_unbalanced_braces() {
    assert!(validate_syntax("domain.com { reverse_proxy x:1").is_err());
    assert!(validate_syntax(SAMPLE).is_ok());
  }
}
