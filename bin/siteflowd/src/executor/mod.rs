mod pool;

pub use pool::{RemoteHost, SessionPool};

use std::time::Duration;

use siteflow_command::CommandOutput;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("failed to connect to remote host: {0}")]
  Connect(#[source] openssh::Error),
  #[error("command timed out after {0:?}")]
  Timeout(Duration),
  #[error("remote command failed: {0}")]
  Command(#[source] openssh::Error),
  #[error("remote i/o error: {0}")]
  Io(#[source] std::io::Error),
  #[error("{command} exited with {exit_code}: {stderr}")]
  NonZeroExit { command: String, exit_code: i32, stderr: String },
}

/// Executes commands and file transfers against the single configured
/// remote host, pooling multiplexed SSH sessions. Every caller (the
/// discovery pipeline, the provisioner, the action engine) shares one
/// pool so the total number of open connections stays bounded
/// regardless of how many components are driving the host at once.
pub struct RemoteExecutor {
  pool: SessionPool,
  default_timeout: Duration,
}

impl RemoteExecutor {
  pub fn new(pool: SessionPool, default_timeout: Duration) -> Self {
    RemoteExecutor { pool, default_timeout }
  }

  /// Runs `argv[0]` with the remaining elements as arguments, argv-style
  /// (no shell, no manual quoting).
  pub async fn run(
    &self,
    argv: &[&str],
  ) -> Result<CommandOutput, TransportError> {
    self.run_timeout(argv, self.default_timeout).await
  }

  pub async fn run_timeout(
    &self,
    argv: &[&str],
    timeout: Duration,
  ) -> Result<CommandOutput, TransportError> {
    let (program, args) = argv
      .split_first()
      .expect("argv must have at least a program name");
    let session = self.pool.acquire().await?;
    let mut command = session.command(*program);
    command.args(args);
    let output = tokio::time::timeout(timeout, command.output())
      .await
      .map_err(|_| TransportError::Timeout(timeout))?
      .map_err(TransportError::Command)?;
    Ok(CommandOutput {
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      exit_code: output.status.code().unwrap_or(-1),
    })
  }

  /// Runs a shell-string command built by the caller (e.g. a multi-stage
  /// `sh -c '... && ...'` deploy script). Every interpolated fragment
  /// must already be escaped by the caller via `shell-escape`.
  pub async fn run_shell(
    &self,
    shell_command: &str,
  ) -> Result<CommandOutput, TransportError> {
    self.run(&["sh", "-c", shell_command]).await
  }

  /// Writes `contents` to `remote_path` on the host by piping through
  /// `tee`, keeping the implementation to plain command execution rather
  /// than pulling in a separate SFTP client for a single write path.
  pub async fn upload(
    &self,
    remote_path: &str,
    contents: &[u8],
  ) -> Result<(), TransportError> {
    use tokio::io::AsyncWriteExt;

    let session = self.pool.acquire().await?;
    let mut command = session.command("tee");
    command.arg(remote_path);
    command.stdin(openssh::Stdio::piped());
    command.stdout(openssh::Stdio::null());
    let mut child = command.spawn().await.map_err(TransportError::Command)?;
    let mut stdin = child
      .stdin()
      .take()
      .expect("stdin requested as piped above");
    stdin.write_all(contents).await.map_err(TransportError::Io)?;
    drop(stdin);
    child
      .wait()
      .await
      .map_err(TransportError::Command)?;
    Ok(())
  }

  /// Runs `argv` and streams stdout back line-by-line as it's produced,
  /// for callers that want to forward progress before the command
  /// finishes (e.g. `action.output` chunks over the websocket) instead
  /// of waiting on the whole buffered result. The returned receiver is
  /// dropped by the caller to cancel the read loop early (the spawned
  /// task's next `send` fails and it stops); the join handle resolves
  /// to the same `CommandOutput` shape `run` returns, once the process
  /// exits.
  pub async fn run_stream(
    &self,
    argv: &[&str],
  ) -> Result<(mpsc::Receiver<String>, JoinHandle<Result<CommandOutput, TransportError>>), TransportError> {
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

    let (program, args) = argv
      .split_first()
      .expect("argv must have at least a program name");
    let session = self.pool.acquire().await?;
    let mut command = session.command(*program);
    command.args(args);
    command.stdout(openssh::Stdio::piped());
    command.stderr(openssh::Stdio::piped());
    let mut child = command.spawn().await.map_err(TransportError::Command)?;
    let stdout = child.stdout().take().expect("stdout requested as piped above");
    let mut stderr = child.stderr().take().expect("stderr requested as piped above");

    let (tx, rx) = mpsc::channel(64);
    let done = tokio::spawn(async move {
      let mut lines = BufReader::new(stdout).lines();
      let mut collected_stdout = String::new();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            collected_stdout.push_str(&line);
            collected_stdout.push('\n');
            if tx.send(line).await.is_err() {
              break;
            }
          }
          Ok(None) => break,
          Err(err) => return Err(TransportError::Io(err)),
        }
      }
      let mut stderr_buf = String::new();
      stderr.read_to_string(&mut stderr_buf).await.map_err(TransportError::Io)?;
      let status = child.wait().await.map_err(TransportError::Command)?;
      Ok(CommandOutput {
        stdout: collected_stdout,
        stderr: stderr_buf,
        exit_code: status.code().unwrap_or(-1),
      })
    });

    Ok((rx, done))
  }

  /// Reads a remote file's full contents via `cat`.
  pub async fn read_file(
    &self,
    remote_path: &str,
  ) -> Result<String, TransportError> {
    let output = self.run(&["cat", remote_path]).await?;
    if !output.success() {
      return Err(TransportError::NonZeroExit {
        command: format!("cat {remote_path}"),
        exit_code: output.exit_code,
        stderr: output.stderr,
      });
    }
    Ok(output.stdout)
  }
}
