use std::collections::BTreeMap;

use minijinja::{Environment, context};

use super::detect::Template;

/// A file to materialize relative to the new site's directory, with
/// its rendered contents.
pub struct RenderedFile {
  pub relative_path: String,
  pub contents: String,
}

const STATIC_COMPOSE: &str = r#"services:
  web:
    image: nginx:alpine
    container_name: {{ name }}_web
    restart: unless-stopped
    volumes:
      - ./content:/usr/share/nginx/html:ro
    labels:
      siteflow.domain: "{{ domain }}"
"#;

const NODE_COMPOSE: &str = r#"services:
  app:
    image: node:20-alpine
    container_name: {{ name }}_app
    restart: unless-stopped
    working_dir: /app
    command: ["node", "server.js"]
    volumes:
      - ./content:/app
    environment:
{%- for key, value in environment %}
      {{ key }}: "{{ value }}"
{%- endfor %}
    labels:
      siteflow.domain: "{{ domain }}"
"#;

const PYTHON_COMPOSE: &str = r#"services:
  app:
    image: python:3.12-slim
    container_name: {{ name }}_app
    restart: unless-stopped
    working_dir: /app
    command: ["python", "manage.py", "runserver", "0.0.0.0:8000"]
    volumes:
      - ./content:/app
    environment:
{%- for key, value in environment %}
      {{ key }}: "{{ value }}"
{%- endfor %}
    labels:
      siteflow.domain: "{{ domain }}"
"#;

const WORDPRESS_COMPOSE: &str = r#"services:
  wordpress:
    image: wordpress:php8.3-apache
    container_name: {{ name }}_wordpress
    restart: unless-stopped
    volumes:
      - ./content:/var/www/html
      - ./uploads:/var/www/html/wp-content/uploads
    environment:
      WORDPRESS_DB_HOST: {{ name }}_db
{%- for key, value in environment %}
      {{ key }}: "{{ value }}"
{%- endfor %}
    labels:
      siteflow.domain: "{{ domain }}"
  db:
    image: mysql:8.0
    container_name: {{ name }}_db
    restart: unless-stopped
    volumes:
      - ./db:/var/lib/mysql
"#;

const STATIC_LANDING_PAGE: &str = r#"<!doctype html>
<html><head><title>{{ name }}</title></head>
<body><h1>{{ name }} is live</h1></body></html>
"#;

/// Renders the compose file (and, for `static`, the initial landing
/// page) for `template`, binding `name`/`domain`/`environment` into
/// the Jinja-style template text.
pub fn render(
  template: Template,
  name: &str,
  domain: &str,
  environment: &BTreeMap<String, String>,
) -> anyhow::Result<Vec<RenderedFile>> {
  let mut env = Environment::new();
  let source = match template {
    Template::Static => STATIC_COMPOSE,
    Template::Node => NODE_COMPOSE,
    Template::Python => PYTHON_COMPOSE,
    Template::Wordpress => WORDPRESS_COMPOSE,
  };
  env.add_template("compose", source)?;
  let compose = env.get_template("compose")?.render(context! {
    name => name,
    domain => domain,
    environment => environment,
  })?;

  let mut files = vec![RenderedFile {
    relative_path: "docker-compose.yml".to_string(),
    contents: compose,
  }];

  if template == Template::Static {
    env.add_template("landing", STATIC_LANDING_PAGE)?;
    let landing = env.get_template("landing")?.render(context! { name => name })?;
    files.push(RenderedFile {
      relative_path: "content/index.html".to_string(),
      contents: landing,
    });
  }

  Ok(files)
}

/// Directories that must exist under the site path before services
/// come up, beyond whatever `render` emits files into.
pub fn required_directories(template: Template) -> &'static [&'static str] {
  match template {
    Template::Static => &["content"],
    Template::Node | Template::Python => &["content"],
    Template::Wordpress => &["content", "uploads", "db"],
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_static_compose_and_landing_page() {
    let files =
      render(Template::Static, "blog", "blog.example.com", &BTreeMap::new())
        .unwrap();
    assert_eq!(files.len(), 2);
    assert!(files[0].contents.contains("blog_web"));
    assert!(files[1].contents.contains("blog is live"));
  }

  #[test]
  fn node_compose_includes_environment_entries() {
    let mut env = BTreeMap::new();
    env.insert("NODE_ENV".to_string(), "production".to_string());
    let files =
      render(Template::Node, "app", "app.example.com", &env).unwrap();
    assert!(files[0].contents.contains("NODE_ENV: \"production\""));
  }
}
