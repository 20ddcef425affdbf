use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
  Success,
  Failure,
  Pending,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
  Site,
  Container,
  Route,
  Monitor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub id: u64,
  pub timestamp: chrono::DateTime<chrono::Utc>,
  pub action_type: String,
  pub target_type: TargetType,
  pub target_name: String,
  pub status: AuditStatus,
  #[serde(default)]
  pub output: Option<String>,
  #[serde(default)]
  pub error_message: Option<String>,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
  #[serde(default)]
  pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
  #[serde(default = "default_page")]
  pub page: u64,
  #[serde(default = "default_page_size")]
  pub page_size: u64,
  pub action_type: Option<String>,
  pub target_type: Option<TargetType>,
  pub target_name: Option<String>,
  pub status: Option<AuditStatus>,
  pub start_date: Option<chrono::DateTime<chrono::Utc>>,
  pub end_date: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_page() -> u64 {
  1
}
fn default_page_size() -> u64 {
  50
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
  pub rows: Vec<AuditEntry>,
  pub total: u64,
  pub page: u64,
  pub page_size: u64,
  pub total_pages: u64,
}
