//! Shapes the shell command sequences for git-based deploys. This crate
//! never executes anything itself — every command it builds is a single
//! shell invocation meant to be run through the remote executor, which
//! owns quoting, timeouts, and per-site serialization.

use shell_escape::escape;

/// A git remote pinned to a branch, optionally an exact commit.
#[derive(Debug, Clone)]
pub struct GitRemote {
  pub repo_url: String,
  pub branch: String,
  pub commit: Option<String>,
}

impl GitRemote {
  pub fn new(
    repo_url: impl Into<String>,
    branch: Option<String>,
    commit: Option<String>,
  ) -> Self {
    GitRemote {
      repo_url: repo_url.into(),
      branch: branch.unwrap_or_else(|| "main".to_string()),
      commit,
    }
  }

  /// Returns `(authenticated_url, redaction_pair)`. The redaction pair
  /// is `(token, "<TOKEN>")`, fed to [`siteflow_command::sanitize_stage`]
  /// so the token never appears in stored audit output.
  pub fn authenticated_url(
    &self,
    access_token: Option<&str>,
  ) -> (String, Option<(String, String)>) {
    match access_token {
      Some(token) if self.repo_url.starts_with("https://") => {
        let without_scheme = &self.repo_url["https://".len()..];
        (
          format!("https://x-access-token:{token}@{without_scheme}"),
          Some((token.to_string(), "<TOKEN>".to_string())),
        )
      }
      _ => (self.repo_url.clone(), None),
    }
  }

  /// `test -d '<dest>/.git'`, run first by the caller to decide between
  /// [`clone_command`] and [`fetch_reset_command`].
  pub fn exists_check_command(dest: &str) -> String {
    format!("test -d {}", quote(&format!("{dest}/.git")))
  }

  /// Single-shot clone at the pinned branch (and commit, if any), into
  /// `dest`. `dest`'s parent directory must already exist.
  pub fn clone_command(
    &self,
    dest: &str,
    access_token: Option<&str>,
  ) -> String {
    let (url, _) = self.authenticated_url(access_token);
    let mut cmd = format!(
      "git clone --branch {} --single-branch {} {}",
      quote(&self.branch),
      quote(&url),
      quote(dest),
    );
    if let Some(commit) = &self.commit {
      cmd.push_str(&format!(
        " && cd {} && git reset --hard {}",
        quote(dest),
        quote(commit),
      ));
    }
    cmd
  }

  /// Fixes the remote, force-checks-out the branch, and fast-forward
  /// pulls. Handles the case where the branch or remote changed since
  /// the last deploy without requiring a fresh clone.
  pub fn fetch_reset_command(
    &self,
    dest: &str,
    access_token: Option<&str>,
  ) -> String {
    let (url, _) = self.authenticated_url(access_token);
    let mut cmd = format!(
      "cd {dir} && git remote set-url origin {url} && git fetch origin {branch} && git checkout -f {branch} && git reset --hard origin/{branch}",
      dir = quote(dest),
      url = quote(&url),
      branch = quote(&self.branch),
    );
    if let Some(commit) = &self.commit {
      cmd.push_str(&format!(" && git reset --hard {}", quote(commit)));
    }
    cmd
  }

  /// Fast-forward-only fetch used by the `deploy/pull` endpoint; fails
  /// rather than discarding local changes.
  pub fn fast_forward_pull_command(dest: &str) -> String {
    format!(
      "cd {dir} && git pull --ff-only",
      dir = quote(dest),
    )
  }

  /// `git rev-parse HEAD`, used to report the resolved commit after a
  /// pull.
  pub fn resolved_commit_command(dest: &str) -> String {
    format!("cd {} && git rev-parse HEAD", quote(dest))
  }
}

fn quote(s: &str) -> String {
  escape(s.into()).into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn authenticated_url_injects_token_for_https() {
    let remote = GitRemote::new(
      "https://github.com/acme/blog.git",
      None,
      None,
    );
    let (url, redaction) =
      remote.authenticated_url(Some("ghp_abc123"));
    assert!(url.contains("x-access-token:ghp_abc123@"));
    assert_eq!(
      redaction,
      Some(("ghp_abc123".to_string(), "<TOKEN>".to_string()))
    );
  }

  #[test]
  fn clone_command_pins_branch_and_commit() {
    let remote = GitRemote::new(
      "https://github.com/acme/blog.git",
      Some("main".to_string()),
      Some("deadbeef".to_string()),
    );
    let cmd = remote.clone_command("/sites/blog", None);
    assert!(cmd.contains("--branch 'main'"));
    assert!(cmd.contains("git reset --hard 'deadbeef'"));
  }
}
