use sha2::{Digest, Sha256};

/// Serializes `value` as canonical JSON (keys sorted, no insignificant
/// whitespace) and hashes it, so two structurally-identical snapshots
/// always fingerprint the same regardless of map iteration order.
/// `Graph::canonicalize` and `serde_json`'s `BTreeMap` key ordering
/// cover array/object ordering; this just needs a stable hash on top.
pub fn fingerprint<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
  let canonical = canonical_json(value)?;
  let mut hasher = Sha256::new();
  hasher.update(canonical.as_bytes());
  Ok(hex::encode(hasher.finalize()))
}

fn canonical_json<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
  let value = serde_json::to_value(value)?;
  let sorted = sort_keys(value);
  Ok(serde_json::to_string(&sorted)?)
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
  match value {
    serde_json::Value::Object(map) => {
      let mut sorted = serde_json::Map::new();
      let mut keys: Vec<String> = map.keys().cloned().collect();
      keys.sort();
      for key in keys {
        sorted.insert(key.clone(), sort_keys(map[&key].clone()));
      }
      serde_json::Value::Object(sorted)
    }
    serde_json::Value::Array(items) => {
      serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
    }
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn same_content_different_key_order_fingerprints_equal() {
    let a = json!({"b": 1, "a": 2});
    let b = json!({"a": 2, "b": 1});
    assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
  }

  #[test]
  fn different_content_fingerprints_differ() {
    let a = json!({"a": 1});
    let b = json!({"a": 2});
    assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
  }
}
