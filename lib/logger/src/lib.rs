use anyhow::Context;
use serde::Deserialize;
use tracing_subscriber::{
  EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdioMode {
  #[default]
  Standard,
  Pretty,
  Json,
  None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  #[serde(default = "default_level")]
  pub level: String,
  #[serde(default)]
  pub stdio: StdioMode,
}

fn default_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    LogConfig { level: default_level(), stdio: StdioMode::default() }
  }
}

/// Initializes the global `tracing` subscriber. Must be called once,
/// before any other component logs.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let filter = EnvFilter::try_new(&config.level)
    .unwrap_or_else(|_| EnvFilter::new("info"));
  let registry = Registry::default().with(filter);

  match config.stdio {
    StdioMode::Standard => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false),
      )
      .try_init(),
    StdioMode::Pretty => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(false)
          .with_line_number(false),
      )
      .try_init(),
    StdioMode::Json => {
      registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    }
    StdioMode::None => Ok(()),
  }
  .context("failed to init logger")
}
