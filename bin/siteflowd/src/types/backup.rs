use serde::{Deserialize, Serialize};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
  Db,
  Uploads,
  Verify,
  Snapshot,
  System,
}

impl JobType {
  pub const ALL: [JobType; 5] = [
    JobType::Db,
    JobType::Uploads,
    JobType::Verify,
    JobType::Snapshot,
    JobType::System,
  ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Ok,
  Warn,
  Fail,
}

/// Wire shape accepted by `POST /backups/runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRunInput {
  pub site: String,
  pub job_type: JobType,
  pub status: RunStatus,
  pub started_at: chrono::DateTime<chrono::Utc>,
  pub ended_at: chrono::DateTime<chrono::Utc>,
  #[serde(default)]
  pub bytes_written: Option<u64>,
  #[serde(default)]
  pub backup_id: Option<String>,
  #[serde(default)]
  pub repo: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRun {
  pub id: u64,
  pub site: String,
  pub job_type: JobType,
  pub status: RunStatus,
  pub started_at: chrono::DateTime<chrono::Utc>,
  pub ended_at: chrono::DateTime<chrono::Utc>,
  pub bytes_written: Option<u64>,
  pub backup_id: Option<String>,
  pub repo: Option<String>,
  pub error: Option<String>,
  pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
  Ok,
  Warn,
  Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteBackupStatus {
  pub site: String,
  pub overall_status: OverallStatus,
  /// One RPO (seconds) per configured job type; `None` when no
  /// successful run exists yet.
  pub rpo_seconds: std::collections::BTreeMap<String, Option<i64>>,
  pub latest: std::collections::BTreeMap<String, Option<BackupRun>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestorePoint {
  pub job_type: JobType,
  pub timestamp: chrono::DateTime<chrono::Utc>,
  pub backup_id: Option<String>,
  pub repo: Option<String>,
}
