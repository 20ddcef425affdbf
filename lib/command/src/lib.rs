//! Shapes the output of a remote command into the log record shared by
//! the action engine, the git/deploy helpers, and the audit store's
//! `output` field.

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_code: i32,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.exit_code == 0
  }

  pub fn combined(&self) -> String {
    match (self.stdout.is_empty(), self.stderr.is_empty()) {
      (true, true) => String::new(),
      (false, true) => self.stdout.clone(),
      (true, false) => self.stderr.clone(),
      (false, false) => format!("{}\n{}", self.stdout, self.stderr),
    }
  }
}

/// One stage of a multi-step remote operation (clone, checkout, pull,
/// compose up, ...), timestamped so stages can be stitched into a
/// single audit output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
  pub stage: String,
  pub command: String,
  pub output: CommandOutput,
  pub start_ts: i64,
  pub end_ts: i64,
}

impl Stage {
  pub fn new(
    stage: impl Into<String>,
    command: impl Into<String>,
    start_ts: i64,
    output: CommandOutput,
  ) -> Self {
    Stage {
      stage: stage.into(),
      command: command.into(),
      output,
      start_ts,
      end_ts: now_ms(),
    }
  }

  pub fn success(&self) -> bool {
    self.output.success()
  }
}

pub fn now_ms() -> i64 {
  Utc::now().timestamp_millis()
}

pub fn all_stages_success(stages: &[Stage]) -> bool {
  stages.iter().all(Stage::success)
}

/// Replaces every occurrence of each `(secret, placeholder)` pair across
/// a stage's command, stdout, and stderr, so audit output never leaks a
/// credential that was interpolated into the command line.
pub fn sanitize_stage(
  mut stage: Stage,
  replacers: &[(String, String)],
) -> Stage {
  for (secret, placeholder) in replacers {
    if secret.is_empty() {
      continue;
    }
    stage.command = stage.command.replace(secret.as_str(), placeholder);
    stage.output.stdout =
      stage.output.stdout.replace(secret.as_str(), placeholder);
    stage.output.stderr =
      stage.output.stderr.replace(secret.as_str(), placeholder);
  }
  stage
}

/// Truncates `text` to at most `max_len` bytes, on a char boundary,
/// noting how much was dropped.
pub fn truncate_output(text: &str, max_len: usize) -> String {
  if text.len() <= max_len {
    return text.to_string();
  }
  let mut end = max_len;
  while end > 0 && !text.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}\n... truncated {} bytes", &text[..end], text.len() - end)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncates_on_char_boundary() {
    let text = "héllo world, this needs truncation";
    let out = truncate_output(text, 4);
    assert!(out.starts_with("h"));
    assert!(out.contains("truncated"));
  }

  #[test]
  fn sanitize_redacts_secret_everywhere() {
    let stage = Stage::new(
      "Deploy",
      "curl -H 'Authorization: Bearer supersecret'",
      0,
      CommandOutput {
        stdout: "used token supersecret".into(),
        stderr: String::new(),
        exit_code: 0,
      },
    );
    let sanitized = sanitize_stage(
      stage,
      &[("supersecret".to_string(), "<TOKEN>".to_string())],
    );
    assert!(!sanitized.command.contains("supersecret"));
    assert!(!sanitized.output.stdout.contains("supersecret"));
    assert!(sanitized.command.contains("<TOKEN>"));
  }
}
