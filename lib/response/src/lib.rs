//! Shapes every fallible HTTP handler's error into the wire contract
//! from the error handling design: `{status, message}` plus an
//! [`ErrorKind`] used by callers (the audit store, the action engine)
//! that need to branch on *why* something failed, not just its message.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  Validation,
  NotFound,
  Conflict,
  Transport,
  Timeout,
  CommandFailure,
  Integrity,
  Fatal,
}

impl ErrorKind {
  pub fn status_code(self) -> StatusCode {
    match self {
      ErrorKind::Validation => StatusCode::BAD_REQUEST,
      ErrorKind::NotFound => StatusCode::NOT_FOUND,
      ErrorKind::Conflict => StatusCode::CONFLICT,
      ErrorKind::Transport => StatusCode::BAD_GATEWAY,
      ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
      ErrorKind::CommandFailure => StatusCode::INTERNAL_SERVER_ERROR,
      ErrorKind::Integrity => StatusCode::OK,
      ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Debug)]
pub struct AppError {
  pub kind: ErrorKind,
  pub error: anyhow::Error,
}

impl AppError {
  pub fn new(kind: ErrorKind, error: impl Into<anyhow::Error>) -> Self {
    AppError { kind, error: error.into() }
  }

  /// Full error chain, one cause per line. Used for audit entries and
  /// `action.output` websocket messages.
  pub fn display_chain(&self) -> String {
    let mut out = self.error.to_string();
    for cause in self.error.chain().skip(1) {
      out.push_str("\ncaused by: ");
      out.push_str(&cause.to_string());
    }
    out
  }
}

impl std::fmt::Display for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.error)
  }
}

impl std::error::Error for AppError {}

#[derive(Serialize)]
struct ErrorBody {
  status: u16,
  message: String,
  kind: ErrorKind,
}

impl IntoResponse for AppError {
  fn into_response(self) -> axum::response::Response {
    let status = self.kind.status_code();
    let body = ErrorBody {
      status: status.as_u16(),
      message: self.display_chain(),
      kind: self.kind,
    };
    (status, Json(body)).into_response()
  }
}
