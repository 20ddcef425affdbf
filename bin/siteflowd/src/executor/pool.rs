use std::sync::Arc;

use openssh::{KnownHosts, Session, SessionBuilder};
use tokio::sync::{Mutex, Semaphore};

use super::TransportError;

/// Connection details for the single remote host SiteFlow manages.
#[derive(Debug, Clone)]
pub struct RemoteHost {
  pub host: String,
  pub user: String,
  pub port: u16,
  pub identity_file: Option<String>,
}

/// Holds up to `max_sessions` multiplexed `openssh::Session`s, each
/// reused across calls via ControlMaster so repeated commands against
/// the same host don't pay a fresh handshake. A semaphore caps
/// concurrent borrowers at the pool size; callers queue rather than
/// open unbounded connections.
pub struct SessionPool {
  host: RemoteHost,
  sessions: Mutex<Vec<Arc<Session>>>,
  permits: Semaphore,
  max_sessions: usize,
}

impl SessionPool {
  pub fn new(host: RemoteHost, max_sessions: usize) -> Self {
    SessionPool {
      host,
      sessions: Mutex::new(Vec::new()),
      permits: Semaphore::new(max_sessions),
      max_sessions,
    }
  }

  /// Borrows a session, opening one if the pool has spare capacity and
  /// none are idle. The returned session is handed back to the pool on
  /// drop via [`PooledSession`].
  pub async fn acquire(&self) -> Result<PooledSession<'_>, TransportError> {
    let _permit = self
      .permits
      .acquire()
      .await
      .expect("semaphore is never closed");
    let mut sessions = self.sessions.lock().await;
    let session = match sessions.pop() {
      Some(session) => session,
      None => Arc::new(self.connect().await?),
    };
    Ok(PooledSession { pool: self, session: Some(session), _permit })
  }

  async fn connect(&self) -> Result<Session, TransportError> {
    let mut builder = SessionBuilder::default();
    builder.user(self.host.user.clone());
    builder.port(self.host.port);
    builder.known_hosts_check(KnownHosts::Accept);
    if let Some(identity) = &self.host.identity_file {
      builder.keyfile(identity);
    }
    builder
      .connect_mux(&self.host.host)
      .await
      .map_err(TransportError::Connect)
  }

  fn release(&self, session: Arc<Session>) {
    if let Ok(mut sessions) = self.sessions.try_lock() {
      if sessions.len() < self.max_sessions {
        sessions.push(session);
      }
    }
  }
}

/// A session borrowed from the pool. Returned on drop rather than
/// closed, so the underlying multiplexed connection survives across
/// calls.
pub struct PooledSession<'a> {
  pool: &'a SessionPool,
  session: Option<Arc<Session>>,
  _permit: tokio::sync::SemaphorePermit<'a>,
}

impl<'a> std::ops::Deref for PooledSession<'a> {
  type Target = Session;

  fn deref(&self) -> &Session {
    self.session.as_ref().expect("taken only in Drop")
  }
}

impl<'a> Drop for PooledSession<'a> {
  fn drop(&mut self) {
    if let Some(session) = self.session.take() {
      self.pool.release(session);
    }
  }
}
