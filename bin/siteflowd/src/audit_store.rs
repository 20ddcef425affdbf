use chrono::Utc;
use sled::{Db, Transactional};

use crate::types::{AuditEntry, AuditPage, AuditQuery, AuditStatus};

const PRIMARY_TREE: &str = "audit_entries";
const BY_TARGET_NAME: &str = "audit_by_target_name";
const BY_ACTION_TYPE: &str = "audit_by_action_type";
const BY_STATUS: &str = "audit_by_status";
const BY_TIMESTAMP: &str = "audit_by_timestamp";

/// Durable, key-ordered audit log backed by a single sled database
/// file. The primary tree is keyed by a zero-padded monotonic `u64` so
/// key order, id order, and insertion order coincide; four auxiliary
/// trees index `target_name`/`action_type`/`status`/`timestamp` as
/// `value\0id -> ()` entries rebuilt transactionally alongside every
/// write.
pub struct AuditStore {
  db: Db,
  primary: sled::Tree,
  by_target_name: sled::Tree,
  by_action_type: sled::Tree,
  by_status: sled::Tree,
  by_timestamp: sled::Tree,
}

impl AuditStore {
  pub fn open(db: Db) -> anyhow::Result<Self> {
    Ok(AuditStore {
      primary: db.open_tree(PRIMARY_TREE)?,
      by_target_name: db.open_tree(BY_TARGET_NAME)?,
      by_action_type: db.open_tree(BY_ACTION_TYPE)?,
      by_status: db.open_tree(BY_STATUS)?,
      by_timestamp: db.open_tree(BY_TIMESTAMP)?,
      db,
    })
  }

  fn next_id(&self) -> anyhow::Result<u64> {
    Ok(self.db.generate_id()?)
  }

  /// Writes a new `pending` entry and returns its id.
  pub fn append(&self, mut entry: AuditEntry) -> anyhow::Result<u64> {
    let id = self.next_id()?;
    entry.id = id;
    self.write_entry(&entry)?;
    Ok(id)
  }

  /// Finalizes a pending entry to a terminal status. A missing id is a
  /// logic error elsewhere in the engine, not a recoverable case.
  pub fn update(
    &self,
    id: u64,
    status: AuditStatus,
    output: Option<String>,
    error_message: Option<String>,
    duration_ms: i64,
  ) -> anyhow::Result<()> {
    let Some(mut entry) = self.get(id)? else {
      anyhow::bail!("audit entry {id} not found");
    };
    self.remove_from_indexes(&entry)?;
    entry.status = status;
    entry.output = output;
    entry.error_message = error_message;
    entry.duration_ms = Some(duration_ms);
    self.write_entry(&entry)
  }

  pub fn get(&self, id: u64) -> anyhow::Result<Option<AuditEntry>> {
    match self.primary.get(primary_key(id))? {
      Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  fn write_entry(&self, entry: &AuditEntry) -> anyhow::Result<()> {
    let key = primary_key(entry.id);
    let value = serde_json::to_vec(entry)?;
    let id_bytes = entry.id.to_be_bytes();

    (&self.primary, &self.by_target_name, &self.by_action_type, &self.by_status, &self.by_timestamp)
      .transaction(|(primary, by_target_name, by_action_type, by_status, by_timestamp)| {
        primary.insert(key.as_slice(), value.as_slice())?;
        by_target_name.insert(index_key(&entry.target_name, entry.id), &id_bytes)?;
        by_action_type.insert(index_key(&entry.action_type, entry.id), &id_bytes)?;
        by_status.insert(index_key(status_str(entry.status), entry.id), &id_bytes)?;
        by_timestamp.insert(
          index_key(&entry.timestamp.timestamp_millis().to_string(), entry.id),
          &id_bytes,
        )?;
        Ok::<_, sled::transaction::ConflictableTransactionError<sled::Error>>(())
      })?;
    Ok(())
  }

  fn remove_from_indexes(&self, entry: &AuditEntry) -> anyhow::Result<()> {
    self.by_target_name.remove(index_key(&entry.target_name, entry.id))?;
    self.by_action_type.remove(index_key(&entry.action_type, entry.id))?;
    self.by_status.remove(index_key(status_str(entry.status), entry.id))?;
    self.by_timestamp.remove(index_key(
      &entry.timestamp.timestamp_millis().to_string(),
      entry.id,
    ))?;
    Ok(())
  }

  /// Total-ordered by `timestamp desc, id desc`, which coincides with
  /// reverse primary-key order since ids are assigned in timestamp
  /// order.
  pub fn query(&self, query: &AuditQuery) -> anyhow::Result<AuditPage> {
    let mut matched = Vec::new();
    for item in self.primary.iter().rev() {
      let (_, value) = item?;
      let entry: AuditEntry = serde_json::from_slice(&value)?;
      if matches(&entry, query) {
        matched.push(entry);
      }
    }
    let total = matched.len() as u64;
    let page = query.page.max(1);
    let page_size = query.page_size.max(1);
    let start = ((page - 1) * page_size) as usize;
    let rows = matched.into_iter().skip(start).take(page_size as usize).collect();
    let total_pages = total.div_ceil(page_size).max(1);
    Ok(AuditPage { rows, total, page, page_size, total_pages })
  }

  /// Deletes every entry older than `older_than`, returning the count
  /// removed.
  pub fn cleanup(&self, older_than: chrono::DateTime<Utc>) -> anyhow::Result<u64> {
    let mut to_delete = Vec::new();
    for item in self.primary.iter() {
      let (_, value) = item?;
      let entry: AuditEntry = serde_json::from_slice(&value)?;
      if entry.timestamp < older_than {
        to_delete.push(entry);
      }
    }
    let count = to_delete.len() as u64;
    for entry in &to_delete {
      self.primary.remove(primary_key(entry.id))?;
      self.remove_from_indexes(entry)?;
    }
    Ok(count)
  }
}

fn matches(entry: &AuditEntry, query: &AuditQuery) -> bool {
  if let Some(action_type) = &query.action_type {
    if &entry.action_type != action_type {
      return false;
    }
  }
  if let Some(target_type) = query.target_type {
    if entry.target_type != target_type {
      return false;
    }
  }
  if let Some(target_name) = &query.target_name {
    if &entry.target_name != target_name {
      return false;
    }
  }
  if let Some(status) = query.status {
    if entry.status != status {
      return false;
    }
  }
  if let Some(start) = query.start_date {
    if entry.timestamp < start {
      return false;
    }
  }
  if let Some(end) = query.end_date {
    if entry.timestamp > end {
      return false;
    }
  }
  true
}

fn primary_key(id: u64) -> [u8; 8] {
  id.to_be_bytes()
}

fn index_key(value: &str, id: u64) -> Vec<u8> {
  let mut key = value.as_bytes().to_vec();
  key.push(0);
  key.extend_from_slice(&id.to_be_bytes());
  key
}

fn status_str(status: AuditStatus) -> &'static str {
  match status {
    AuditStatus::Success => "success",
    AuditStatus::Failure => "failure",
    AuditStatus::Pending => "pending",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  fn entry(target_name: &str, status: AuditStatus) -> AuditEntry {
    AuditEntry {
      id: 0,
      timestamp: Utc::now(),
      action_type: "container.start".to_string(),
      target_type: TargetType::Container,
      target_name: target_name.to_string(),
      status,
      output: None,
      error_message: None,
      metadata: BTreeMap::new(),
      duration_ms: None,
    }
  }

  fn open_temp() -> AuditStore {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("audit.sled")).unwrap();
    std::mem::forget(dir);
    AuditStore::open(db).unwrap()
  }

  #[test]
  fn append_assigns_monotonic_ids() {
    let store = open_temp();
    let a = store.append(entry("blog_web", AuditStatus::Pending)).unwrap();
    let b = store.append(entry("blog_web", AuditStatus::Pending)).unwrap();
    assert!(b > a);
  }

  #[test]
  fn update_transitions_pending_to_terminal() {
    let store = open_temp();
    let id = store.append(entry("blog_web", AuditStatus::Pending)).unwrap();
    store.update(id, AuditStatus::Success, Some("ok".into()), None, 120).unwrap();
    let fetched = store.get(id).unwrap().unwrap();
    assert_eq!(fetched.status, AuditStatus::Success);
    assert_eq!(fetched.duration_ms, Some(120));
  }

  #[test]
  fn query_orders_newest_first_and_paginates() {
    let store = open_temp();
    for _ in 0..5 {
      store.append(entry("blog_web", AuditStatus::Success)).unwrap();
    }
    let page = store
      .query(&AuditQuery { page: 1, page_size: 2, ..Default::default() })
      .unwrap();
    assert_eq!(page.rows.len(), 2);
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert!(page.rows[0].id > page.rows[1].id);
  }

  #[test]
  fn query_filters_by_target_name() {
    let store = open_temp();
    store.append(entry("blog_web", AuditStatus::Success)).unwrap();
    store.append(entry("status_app", AuditStatus::Success)).unwrap();
    let page = store
      .query(&AuditQuery {
        target_name: Some("status_app".to_string()),
        ..Default::default()
      })
      .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.rows[0].target_name, "status_app");
  }
}
