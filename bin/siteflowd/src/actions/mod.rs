pub mod container;
pub mod deploy;
pub mod proxy;
pub mod site;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::executor::RemoteExecutor;

/// Serializes actions per logical target (a site name, or `"__proxy__"`
/// for gateway-wide operations) using a real FIFO queue rather than a
/// busy-check-and-reject gate: two actions submitted against the same
/// site in order `(start, stop)` always execute `start` fully before
/// `stop` begins, instead of the second one being rejected while the
/// first is in flight. `tokio::sync::Mutex` grants its waiters in
/// request order, which is exactly the ordering guarantee this needs.
pub struct ActionEngine {
  executor: Arc<RemoteExecutor>,
  queues: DashMap<String, Arc<Mutex<()>>>,
}

impl ActionEngine {
  pub fn new(executor: Arc<RemoteExecutor>) -> Self {
    ActionEngine { executor, queues: DashMap::new() }
  }

  pub fn executor(&self) -> &RemoteExecutor {
    &self.executor
  }

  fn queue_for(&self, target: &str) -> Arc<Mutex<()>> {
    self
      .queues
      .entry(target.to_string())
      .or_insert_with(|| Arc::new(Mutex::new(())))
      .clone()
  }

  /// Runs `work` with the named target's queue held, so any other
  /// action against the same target queued before or after this call
  /// executes in submission order.
  pub async fn serialized<F, Fut, T>(&self, target: &str, work: F) -> T
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
  {
    let queue = self.queue_for(target);
    let _permit = queue.lock().await;
    work().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn serializes_interleaved_actions_against_same_target_in_order() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let queue = Arc::new(Mutex::new(()));

    let o1 = order.clone();
    let q1 = queue.clone();
    let first = tokio::spawn(async move {
      let _permit = q1.lock().await;
      tokio::time::sleep(std::time::Duration::from_millis(20)).await;
      o1.lock().unwrap().push("start");
    });
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let o2 = order.clone();
    let q2 = queue.clone();
    let second = tokio::spawn(async move {
      let _permit = q2.lock().await;
      o2.lock().unwrap().push("stop");
    });

    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["start", "stop"]);
  }
}
