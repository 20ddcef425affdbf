//! A single-flighted, TTL-bounded memoization cache.
//!
//! Used by the state cache component: many concurrent readers may call
//! [`TtlCache::get`] with `force_refresh = true` while a refresh is already
//! in flight. Exactly one underlying refresh runs; every caller queued
//! behind it observes the result of that one refresh rather than starting
//! its own.

use std::{
  future::Future,
  sync::atomic::{AtomicU64, Ordering},
  time::{Duration, Instant},
};

use tokio::sync::Mutex;

pub struct TtlCache<T> {
  ttl: Duration,
  version: AtomicU64,
  state: Mutex<CacheState<T>>,
}

struct CacheState<T> {
  value: Option<T>,
  fetched_at: Option<Instant>,
  version: u64,
}

impl<T> Default for CacheState<T> {
  fn default() -> Self {
    CacheState { value: None, fetched_at: None, version: 0 }
  }
}

impl<T: Clone> TtlCache<T> {
  pub fn new(ttl: Duration) -> Self {
    TtlCache {
      ttl,
      version: AtomicU64::new(0),
      state: Mutex::new(CacheState::default()),
    }
  }

  /// Returns the cached value, refreshing it first if the TTL has
  /// elapsed or `force_refresh` is set. Concurrent calls single-flight:
  /// only the first caller whose request isn't already satisfied by a
  /// refresh that started after it arrived actually invokes `refresh`.
  pub async fn get<F, Fut>(&self, force_refresh: bool, refresh: F) -> T
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
  {
    let version_at_entry = self.version.load(Ordering::SeqCst);
    let mut state = self.state.lock().await;

    let ttl_elapsed = state
      .fetched_at
      .map(|t| t.elapsed() >= self.ttl)
      .unwrap_or(true);
    let already_satisfied = state.version > version_at_entry;

    if ttl_elapsed || (force_refresh && !already_satisfied) {
      let value = refresh().await;
      state.value = Some(value.clone());
      state.fetched_at = Some(Instant::now());
      state.version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
      return value;
    }

    state
      .value
      .clone()
      .expect("cache entry considered fresh but has no value")
  }

  /// Marks the cached value stale without clearing it. The next `get`
  /// call (with or without `force_refresh`) triggers a refresh; readers
  /// racing on the old value before that happens still see it.
  pub async fn invalidate(&self) {
    let mut state = self.state.lock().await;
    state.fetched_at = None;
  }

  /// Returns the last cached value, if any, without triggering a refresh.
  pub async fn snapshot(&self) -> Option<T> {
    self.state.lock().await.value.clone()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;

  #[tokio::test]
  async fn refreshes_once_past_ttl() {
    let cache = TtlCache::new(Duration::from_millis(10));
    let calls = Arc::new(AtomicUsize::new(0));

    let c = calls.clone();
    let v1 = cache.get(false, || async move {
      c.fetch_add(1, Ordering::SeqCst);
      1
    }).await;
    assert_eq!(v1, 1);

    let c = calls.clone();
    let v2 = cache.get(false, || async move {
      c.fetch_add(1, Ordering::SeqCst);
      2
    }).await;
    // still within ttl, no second fetch
    assert_eq!(v2, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(15)).await;

    let c = calls.clone();
    let v3 = cache.get(false, || async move {
      c.fetch_add(1, Ordering::SeqCst);
      3
    }).await;
    assert_eq!(v3, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn single_flights_concurrent_force_refresh() {
    let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
    let calls = Arc::new(AtomicUsize::new(0));

    // Prime so fetched_at is Some(now), ttl is not the trigger below.
    let c = calls.clone();
    cache.get(false, || async move {
      c.fetch_add(1, Ordering::SeqCst);
      0
    }).await;

    let (start_tx, start_rx) = tokio::sync::watch::channel(false);
    let mut tasks = Vec::new();
    for _ in 0..8 {
      let cache = cache.clone();
      let calls = calls.clone();
      let mut start_rx = start_rx.clone();
      tasks.push(tokio::spawn(async move {
        start_rx.changed().await.ok();
        cache.get(true, || {
          let calls = calls.clone();
          async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            42
          }
        }).await
      }));
    }
    start_tx.send(true).ok();

    let mut results = Vec::new();
    for t in tasks {
      results.push(t.await.unwrap());
    }

    assert!(results.iter().all(|v| *v == 42));
    // exactly one refresh ran for the whole burst (plus the priming call)
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn invalidate_forces_next_refresh() {
    let cache = TtlCache::new(Duration::from_secs(60));
    cache.get(false, || async { 1 }).await;
    cache.invalidate().await;
    let v = cache.get(false, || async { 2 }).await;
    assert_eq!(v, 2);
  }
}
