//! Node session (C1): a single, multiplexed SSH control channel to one host.
//!
//! Grounded in the `openssh` crate (ControlMaster-multiplexed sessions), the same
//! mechanism the original Python tool leans on via the bare `ssh` binary. Every
//! subsequent `run`/`retrieve` call on a connected session is dispatched as a new
//! logical channel over that one connection, satisfying spec §4.1's hard
//! multiplexing requirement.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use openssh::{KnownHosts, Session, Stdio as SshStdio};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::credentials::Credentials;
use crate::prelude::*;
use crate::util::shell_quote;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connect(#[source] openssh::Error),

    #[error("local ssh client does not support persistent multiplexed control channels")]
    ControlPersistUnsupported,

    #[error("command failed to start: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("command timed out after {0:?}")]
    TimedOut(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote session error: {0}")]
    Remote(#[from] openssh::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Closed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeState {
    Unprivileged,
    Sudo,
    Root,
}

pub struct RunOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub enum RunResult {
    Completed(RunOutcome),
    TimedOut,
}

enum Transport {
    Remote(Session),
    /// A session addressed as `localhost` short-circuits to local execution (Design
    /// Note "local-vs-remote driver session": one session variant per transport,
    /// both satisfying the same API).
    Local,
}

/// One remote (or local) host's SSH control channel plus the bookkeeping spec §3
/// requires: resolved hostname, privilege state, retrieved file paths, remote temp
/// dir, and the agent version the remote side reports.
pub struct NodeSession {
    pub address: String,
    pub resolved_hostname: Option<String>,
    pub state: ConnectionState,
    pub privilege: PrivilegeState,
    pub is_local: bool,
    pub retrieved_files: Vec<PathBuf>,
    pub remote_tmp_dir: Option<String>,
    pub remote_agent_version: Option<String>,
    transport: Option<Transport>,
    local_dest_dir: PathBuf,
    ssh_user: String,
    ssh_port: u16,
    ssh_key: Option<PathBuf>,
    sudo_password: Option<String>,
    root_password: Option<String>,
}

impl NodeSession {
    pub fn new(address: impl Into<String>, credentials: &Credentials, local_dest_dir: PathBuf) -> Self {
        let address = address.into();
        let is_local = address == "localhost";
        Self {
            address,
            resolved_hostname: None,
            state: ConnectionState::Unconnected,
            privilege: PrivilegeState::Unprivileged,
            is_local,
            retrieved_files: Vec::new(),
            remote_tmp_dir: None,
            remote_agent_version: None,
            transport: None,
            local_dest_dir,
            ssh_user: credentials.ssh_user.clone(),
            ssh_port: credentials.ssh_port,
            ssh_key: credentials.ssh_key.clone(),
            sudo_password: credentials
                .sudo_password
                .as_ref()
                .map(|s| s.expose().clone()),
            root_password: credentials
                .root_password
                .as_ref()
                .map(|s| s.expose().clone()),
        }
    }

    /// Brings the session to `connected`. Establishes the remote temp dir and reads
    /// the remote hostname and agent version (spec §4.1).
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_local {
            self.transport = Some(Transport::Local);
            self.state = ConnectionState::Connected;
            self.resolved_hostname = Some(
                tokio::process::Command::new("hostname")
                    .output()
                    .await
                    .ok()
                    .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
                    .unwrap_or_else(|| self.address.clone()),
            );
        } else {
            let destination = format!(
                "ssh://{user}@{host}:{port}",
                user = self.ssh_user,
                host = self.address,
                port = self.ssh_port
            );
            let session = Session::connect(&destination, KnownHosts::Add).await.map_err(|e| {
                self.state = ConnectionState::Failed;
                Error::Connect(e)
            })?;
            self.transport = Some(Transport::Remote(session));
            self.state = ConnectionState::Connected;

            if self.ssh_user != "root" {
                self.privilege = PrivilegeState::Unprivileged;
            }
        }

        if self.ssh_user == "root" {
            self.privilege = PrivilegeState::Unprivileged;
        }

        let hostname_out = self.exec_raw("hostname", None, Duration::from_secs(30)).await?;
        if let RunResult::Completed(out) = hostname_out {
            if out.exit_code == 0 {
                self.resolved_hostname = Some(out.stdout.trim().to_string());
            }
        }

        let tmp_out = self
            .exec_raw("mktemp -d /tmp/sos-collector.XXXXXX", None, Duration::from_secs(30))
            .await?;
        if let RunResult::Completed(out) = tmp_out {
            if out.exit_code == 0 {
                self.remote_tmp_dir = Some(out.stdout.trim().to_string());
            }
        }

        let version_out = self
            .exec_raw("sosreport --version 2>/dev/null | head -n1", None, Duration::from_secs(30))
            .await?;
        if let RunResult::Completed(out) = version_out {
            self.remote_agent_version = Some(out.stdout.trim().to_string());
        }

        Ok(())
    }

    /// Requests that `become_root` escalation wrap subsequent commands in `su -`,
    /// fed the root password (spec §4.1 privilege escalation state machine).
    pub fn escalate_to_root(&mut self) {
        self.privilege = PrivilegeState::Root;
    }

    /// Requests sudo escalation (non-root ssh user, without `become_root`).
    pub fn escalate_to_sudo(&mut self) {
        if self.privilege == PrivilegeState::Unprivileged {
            self.privilege = PrivilegeState::Sudo;
        }
    }

    /// Runs `command`, honoring the current privilege state, with `timeout`. A
    /// sudo/root wrapper never puts the password on the command line; it is written
    /// to the wrapped process's stdin instead (spec §4.1).
    pub async fn run(&mut self, command: &str, timeout: Duration, use_privilege: bool) -> Result<RunResult> {
        let (wrapped, stdin_feed) = if use_privilege {
            self.wrap_for_privilege(command)
        } else {
            (command.to_string(), None)
        };
        self.exec_raw(&wrapped, stdin_feed.as_deref(), timeout).await
    }

    fn wrap_for_privilege(&self, command: &str) -> (String, Option<String>) {
        match self.privilege {
            PrivilegeState::Root => {
                let inner = format!("su - -c {}", shell_quote(command));
                (inner, self.root_password.clone())
            }
            PrivilegeState::Sudo => {
                let wrapped = format!("sudo -S -p '' sh -c {}", shell_quote(command));
                (wrapped, self.sudo_password.clone())
            }
            PrivilegeState::Unprivileged => (command.to_string(), None),
        }
    }

    async fn exec_raw(
        &mut self,
        command: &str,
        stdin_feed: Option<&str>,
        timeout: Duration,
    ) -> Result<RunResult> {
        let fut = self.spawn_and_collect(command, stdin_feed);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => Ok(RunResult::Completed(result?)),
            Err(_) => Ok(RunResult::TimedOut),
        }
    }

    async fn spawn_and_collect(&self, command: &str, stdin_feed: Option<&str>) -> Result<RunOutcome> {
        match self.transport.as_ref().expect("session must be connected") {
            Transport::Local => {
                let mut cmd = tokio::process::Command::new("sh");
                cmd.arg("-c")
                    .arg(command)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
                let mut child = cmd.spawn().map_err(Error::Spawn)?;
                if let Some(feed) = stdin_feed {
                    if let Some(stdin) = child.stdin.as_mut() {
                        stdin.write_all(feed.as_bytes()).await?;
                        stdin.write_all(b"\n").await?;
                    }
                }
                drop(child.stdin.take());
                let output = child.wait_with_output().await?;
                Ok(RunOutcome {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Transport::Remote(session) => {
                let mut cmd = session.command("sh");
                cmd.arg("-c").arg(command);
                cmd.stdin(SshStdio::piped());
                cmd.stdout(SshStdio::piped());
                cmd.stderr(SshStdio::piped());
                let mut child = cmd.spawn().await?;
                if let Some(feed) = stdin_feed {
                    if let Some(stdin) = child.stdin().as_mut() {
                        stdin.write_all(feed.as_bytes()).await?;
                        stdin.write_all(b"\n").await?;
                    }
                }
                let output = child.wait_with_output().await?;
                Ok(RunOutcome {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        }
    }

    /// Copies a remote file to the driver's temp directory, preserving the
    /// basename. Implemented as `cat`-over-the-control-channel rather than a
    /// separate `scp` process, so the transfer rides the same multiplexed channel
    /// as every other command (spec §4.1).
    pub async fn retrieve(&mut self, remote_path: &str) -> Result<Option<PathBuf>> {
        let basename = Path::new(remote_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| remote_path.to_string());
        let local_path = self.local_dest_dir.join(&basename);

        let command = format!("cat {}", shell_quote(remote_path));
        let outcome = match self.exec_raw(&command, None, Duration::from_secs(120)).await? {
            RunResult::Completed(out) if out.exit_code == 0 => out,
            _ => return Ok(None),
        };

        tokio::fs::write(&local_path, outcome.stdout.as_bytes())
            .await
            .map_err(Error::Io)?;
        self.retrieved_files.push(local_path.clone());
        Ok(Some(local_path))
    }

    /// Convenience wrapper (spec §4.1): runs the agent command, then parses its
    /// last non-empty stdout line as a whitespace-separated list of artifact paths
    /// to retrieve.
    pub async fn run_agent(&mut self, command: &str, timeout: Duration) -> Result<Vec<PathBuf>> {
        let use_privilege = self.privilege != PrivilegeState::Unprivileged;
        let outcome = match self.run(command, timeout, use_privilege).await? {
            RunResult::Completed(out) => out,
            RunResult::TimedOut => return Err(Error::TimedOut(timeout)),
        };

        let last_line = outcome
            .stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("");

        let mut retrieved = Vec::new();
        for path in last_line.split_whitespace() {
            if let Some(local) = self.retrieve(path).await? {
                retrieved.push(local);
            }
        }
        Ok(retrieved)
    }

    /// Idempotent; must not raise (spec §3).
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Some(Transport::Remote(session)) = self.transport.take() {
            let _ = session.close().await;
        }
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_wrap_root_uses_su() {
        let creds = Credentials {
            ssh_user: "ops".to_string(),
            ..Default::default()
        };
        let mut node = NodeSession::new("example.test", &creds, PathBuf::from("/tmp"));
        node.escalate_to_root();
        let (wrapped, _) = node.wrap_for_privilege("sosreport --batch");
        assert!(wrapped.starts_with("su - -c"));
    }

    #[test]
    fn privilege_wrap_sudo_never_embeds_password() {
        let creds = Credentials {
            ssh_user: "ops".to_string(),
            sudo_password: Some(crate::util::Secret::new("s3cret".to_string())),
            ..Default::default()
        };
        let mut node = NodeSession::new("example.test", &creds, PathBuf::from("/tmp"));
        node.escalate_to_sudo();
        let (wrapped, feed) = node.wrap_for_privilege("sosreport --batch");
        assert!(wrapped.starts_with("sudo -S"));
        assert!(!wrapped.contains("s3cret"));
        assert_eq!(feed.as_deref(), Some("s3cret"));
    }

    #[test]
    fn unprivileged_root_user_never_wraps() {
        let creds = Credentials {
            ssh_user: "root".to_string(),
            ..Default::default()
        };
        let node = NodeSession::new("example.test", &creds, PathBuf::from("/tmp"));
        let (wrapped, feed) = node.wrap_for_privilege("sosreport --batch");
        assert_eq!(wrapped, "sosreport --batch");
        assert!(feed.is_none());
    }

    #[tokio::test]
    async fn run_agent_reports_timeout_as_a_distinct_failure_not_an_empty_success() {
        let creds = Credentials::default();
        let dest_dir = std::env::temp_dir();
        let mut node = NodeSession::new("localhost", &creds, dest_dir);
        node.connect().await.expect("local session always connects");

        let result = node.run_agent("sleep 2", Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::TimedOut(_))));
    }
}
