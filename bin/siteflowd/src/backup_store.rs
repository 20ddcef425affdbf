use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sled::Transactional;

use crate::types::{
  BackupRun, BackupRunInput, JobType, OverallStatus, RestorePoint, RunStatus,
  SiteBackupStatus,
};

const RUNS_TREE: &str = "backup_runs";
const BY_SITE_JOB: &str = "backup_by_site_job";

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
  pub db: ChronoDuration,
  pub uploads: ChronoDuration,
  pub verify: ChronoDuration,
  pub snapshot: ChronoDuration,
  pub system: ChronoDuration,
}

impl Default for Thresholds {
  fn default() -> Self {
    Thresholds {
      db: ChronoDuration::hours(26),
      uploads: ChronoDuration::hours(30),
      verify: ChronoDuration::days(7),
      snapshot: ChronoDuration::days(8),
      system: ChronoDuration::hours(26),
    }
  }
}

impl Thresholds {
  fn for_job(&self, job_type: JobType) -> ChronoDuration {
    match job_type {
      JobType::Db => self.db,
      JobType::Uploads => self.uploads,
      JobType::Verify => self.verify,
      JobType::Snapshot => self.snapshot,
      JobType::System => self.system,
    }
  }
}

/// Ingests backup run records from the external restic-based runner
/// scripts, stored in the same sled database as the audit log but in
/// its own tree, keyed by `(site, job_type, started_at)` so re-posting
/// the same run is a no-op rather than a duplicate.
pub struct BackupStore {
  runs: sled::Tree,
  by_site_job: sled::Tree,
  thresholds: Thresholds,
}

impl BackupStore {
  pub fn open(db: &sled::Db, thresholds: Thresholds) -> anyhow::Result<Self> {
    Ok(BackupStore {
      runs: db.open_tree(RUNS_TREE)?,
      by_site_job: db.open_tree(BY_SITE_JOB)?,
      thresholds,
    })
  }

  /// Validates and records a run. Idempotent on `(site, job_type,
  /// started_at)`: re-ingesting the same key overwrites in place rather
  /// than creating a duplicate entry.
  pub fn record(&self, input: BackupRunInput) -> anyhow::Result<BackupRun> {
    let key = run_key(&input.site, input.job_type, input.started_at);
    let run = BackupRun {
      id: stable_id(&key),
      site: input.site,
      job_type: input.job_type,
      status: input.status,
      started_at: input.started_at,
      ended_at: input.ended_at,
      bytes_written: input.bytes_written,
      backup_id: input.backup_id,
      repo: input.repo,
      error: input.error,
      created_at: Utc::now(),
    };
    let value = serde_json::to_vec(&run)?;
    let site_job_key = site_job_key(&run.site, run.job_type);

    (&self.runs, &self.by_site_job)
      .transaction(|(runs, by_site_job)| {
        runs.insert(key.as_slice(), value.as_slice())?;
        by_site_job.insert(
          [site_job_key.as_slice(), &run.started_at.timestamp_millis().to_be_bytes()].concat(),
          key.as_slice(),
        )?;
        Ok::<_, sled::transaction::ConflictableTransactionError<sled::Error>>(())
      })?;
    Ok(run)
  }

  fn latest_for(&self, site: &str, job_type: JobType) -> anyhow::Result<Option<BackupRun>> {
    let prefix = site_job_key(site, job_type);
    let mut latest: Option<BackupRun> = None;
    for item in self.by_site_job.scan_prefix(&prefix) {
      let (_, primary_key) = item?;
      if let Some(bytes) = self.runs.get(primary_key)? {
        let run: BackupRun = serde_json::from_slice(&bytes)?;
        let should_replace = match &latest {
          Some(current) => run.started_at > current.started_at,
          None => true,
        };
        if should_replace {
          latest = Some(run);
        }
      }
    }
    Ok(latest)
  }

  /// The most recent `ok` run for `(site, job_type)`, the basis for RPO
  /// — a `warn` or `fail` run does not advance the recovery point.
  fn latest_ok_for(&self, site: &str, job_type: JobType) -> anyhow::Result<Option<BackupRun>> {
    let prefix = site_job_key(site, job_type);
    let mut latest: Option<BackupRun> = None;
    for item in self.by_site_job.scan_prefix(&prefix) {
      let (_, primary_key) = item?;
      if let Some(bytes) = self.runs.get(primary_key)? {
        let run: BackupRun = serde_json::from_slice(&bytes)?;
        if run.status != RunStatus::Ok {
          continue;
        }
        let should_replace = match &latest {
          Some(current) => run.started_at > current.started_at,
          None => true,
        };
        if should_replace {
          latest = Some(run);
        }
      }
    }
    Ok(latest)
  }

  fn all_sites(&self) -> anyhow::Result<Vec<String>> {
    let mut sites = std::collections::BTreeSet::new();
    for item in self.runs.iter() {
      let (_, value) = item?;
      let run: BackupRun = serde_json::from_slice(&value)?;
      sites.insert(run.site);
    }
    Ok(sites.into_iter().collect())
  }

  /// Per-site aggregate over every configured job type. RPO is derived
  /// on read from `now - ended_at` of the most recent `ok` run, never
  /// stored; it is `None` when no `ok` run exists yet even if later
  /// `warn`/`fail` runs have been recorded.
  pub fn summary(&self) -> anyhow::Result<BTreeMap<String, SiteBackupStatus>> {
    let mut summary = BTreeMap::new();
    for site in self.all_sites()? {
      summary.insert(site.clone(), self.site_status(&site)?);
    }
    Ok(summary)
  }

  pub fn site_status(&self, site: &str) -> anyhow::Result<SiteBackupStatus> {
    let now = Utc::now();
    let mut rpo_seconds = BTreeMap::new();
    let mut latest = BTreeMap::new();
    let mut any_stale = false;
    let mut any_fail = false;

    for job_type in JobType::ALL {
      let run = self.latest_for(site, job_type)?;
      let ok_run = self.latest_ok_for(site, job_type)?;
      let key = job_type_key(job_type);

      match &ok_run {
        Some(ok_run) => {
          let age = now - ok_run.ended_at;
          rpo_seconds.insert(key.clone(), Some(age.num_seconds()));
          if age > self.thresholds.for_job(job_type) {
            any_stale = true;
          }
        }
        None => {
          rpo_seconds.insert(key.clone(), None);
        }
      }
      match &run {
        Some(run) if run.status == RunStatus::Fail => any_fail = true,
        None => any_fail = true,
        _ => {}
      }
      latest.insert(key, run);
    }

    let overall_status = if any_fail {
      OverallStatus::Fail
    } else if any_stale {
      OverallStatus::Warn
    } else {
      OverallStatus::Ok
    };

    Ok(SiteBackupStatus { site: site.to_string(), overall_status, rpo_seconds, latest })
  }

  pub fn restore_points(&self, site: &str) -> anyhow::Result<Vec<RestorePoint>> {
    let mut points = Vec::new();
    for job_type in JobType::ALL {
      if let Some(run) = self.latest_for(site, job_type)? {
        points.push(RestorePoint {
          job_type,
          timestamp: run.started_at,
          backup_id: run.backup_id,
          repo: run.repo,
        });
      }
    }
    Ok(points)
  }
}

fn job_type_key(job_type: JobType) -> String {
  match job_type {
    JobType::Db => "db",
    JobType::Uploads => "uploads",
    JobType::Verify => "verify",
    JobType::Snapshot => "snapshot",
    JobType::System => "system",
  }
  .to_string()
}

fn site_job_key(site: &str, job_type: JobType) -> Vec<u8> {
  let mut key = site.as_bytes().to_vec();
  key.push(0);
  key.extend_from_slice(job_type_key(job_type).as_bytes());
  key.push(0);
  key
}

fn run_key(site: &str, job_type: JobType, started_at: DateTime<Utc>) -> Vec<u8> {
  let mut key = site_job_key(site, job_type);
  key.extend_from_slice(&started_at.timestamp_millis().to_be_bytes());
  key
}

fn stable_id(key: &[u8]) -> u64 {
  use std::hash::{Hash, Hasher};
  let mut hasher = std::collections::hash_map::DefaultHasher::new();
  key.hash(&mut hasher);
  hasher.finish()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn open_temp() -> BackupStore {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("backups.sled")).unwrap();
    std::mem::forget(dir);
    BackupStore::open(&db, Thresholds::default()).unwrap()
  }

  /// `ended_at` is the reference point the test cares about (RPO is
  /// derived from it); `started_at` is just five minutes earlier.
  fn input(job_type: JobType, status: RunStatus, ended_at: DateTime<Utc>) -> BackupRunInput {
    BackupRunInput {
      site: "blog".to_string(),
      job_type,
      status,
      started_at: ended_at - ChronoDuration::minutes(5),
      ended_at,
      bytes_written: Some(1024),
      backup_id: Some("snap1".to_string()),
      repo: Some("repo1".to_string()),
      error: None,
    }
  }

  #[test]
  fn re_ingesting_same_key_does_not_duplicate() {
    let store = open_temp();
    let ended = Utc::now();
    store.record(input(JobType::Db, RunStatus::Ok, ended)).unwrap();
    store.record(input(JobType::Db, RunStatus::Ok, ended)).unwrap();
    let points = store.restore_points("blog").unwrap();
    assert_eq!(points.iter().filter(|p| p.job_type == JobType::Db).count(), 1);
  }

  #[test]
  fn fresh_runs_for_every_job_type_are_ok() {
    let store = open_temp();
    let now = Utc::now();
    for job_type in JobType::ALL {
      store.record(input(job_type, RunStatus::Ok, now)).unwrap();
    }
    let status = store.site_status("blog").unwrap();
    assert_eq!(status.overall_status, OverallStatus::Ok);
  }

  #[test]
  fn missing_job_makes_status_fail() {
    let store = open_temp();
    store.record(input(JobType::Db, RunStatus::Ok, Utc::now())).unwrap();
    let status = store.site_status("blog").unwrap();
    assert_eq!(status.overall_status, OverallStatus::Fail);
  }

  #[test]
  fn stale_but_ok_last_run_is_warn() {
    let store = open_temp();
    let stale = Utc::now() - ChronoDuration::hours(40);
    for job_type in JobType::ALL {
      store.record(input(job_type, RunStatus::Ok, stale)).unwrap();
    }
    let status = store.site_status("blog").unwrap();
    assert_eq!(status.overall_status, OverallStatus::Warn);
  }

  #[test]
  fn rpo_is_derived_from_ended_at_not_started_at() {
    let store = open_temp();
    let ended = Utc::now() - ChronoDuration::hours(30);
    store.record(input(JobType::Db, RunStatus::Ok, ended)).unwrap();
    let status = store.site_status("blog").unwrap();
    let rpo = status.rpo_seconds.get("db").unwrap().unwrap();
    assert!((rpo - ChronoDuration::hours(30).num_seconds()).abs() < 5);
  }

  #[test]
  fn a_later_warn_run_does_not_advance_rpo_past_the_last_ok_run() {
    let store = open_temp();
    let ok_ended = Utc::now() - ChronoDuration::hours(10);
    let warn_ended = Utc::now() - ChronoDuration::minutes(5);
    store.record(input(JobType::Db, RunStatus::Ok, ok_ended)).unwrap();
    store.record(input(JobType::Db, RunStatus::Warn, warn_ended)).unwrap();
    let status = store.site_status("blog").unwrap();
    let rpo = status.rpo_seconds.get("db").unwrap().unwrap();
    assert!((rpo - ChronoDuration::hours(10).num_seconds()).abs() < 5);
  }
}
