//! Executor collaborators consumed by the dispatch engine.
//!
//! The engine itself never knows how a task is actually run; it is handed a
//! [`LocalExecutor`] and a [`RemoteExecutor`] at construction. The provided
//! implementations run tasks through subprocesses, the remote one over an
//! ssh control channel. Library consumers are expected to inject their own.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::{PeerConfig, ProbeConfig};
use crate::error::ExecutorError;

/// Whatever diagnostic/LLM capability exists on the constrained host.
#[async_trait]
pub trait LocalExecutor: Send + Sync {
    async fn execute(&self, task: &str) -> Result<String, ExecutorError>;
}

/// The remote peer's execution capability, plus an authenticated
/// control-channel handshake used as the strict liveness check.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, task: &str) -> Result<String, ExecutorError>;

    /// Verify the control channel end to end, distinguishing "port open"
    /// from "service actually usable".
    async fn handshake(&self) -> Result<(), ExecutorError>;
}

/// Local executor running a fixed command with the task on stdin.
pub struct ShellLocalExecutor {
    program: String,
    args: Vec<String>,
}

impl ShellLocalExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl LocalExecutor for ShellLocalExecutor {
    async fn execute(&self, task: &str) -> Result<String, ExecutorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        run_with_stdin(&mut cmd, task).await
    }
}

/// Remote executor delegating over an ssh subprocess to the dev machine.
pub struct SshRemoteExecutor {
    peer: PeerConfig,
    probe: ProbeConfig,
    /// Command executed on the peer; the task text arrives on its stdin.
    remote_command: String,
}

impl SshRemoteExecutor {
    pub fn new(peer: PeerConfig, probe: ProbeConfig, remote_command: impl Into<String>) -> Self {
        Self {
            peer,
            probe,
            remote_command: remote_command.into(),
        }
    }

    fn ssh_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-p")
            .arg(self.peer.port.to_string())
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.probe.connect_timeout_secs
            ))
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(format!("{}@{}", self.peer.user, self.peer.host))
            .arg(remote_command);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshRemoteExecutor {
    async fn execute(&self, task: &str) -> Result<String, ExecutorError> {
        let mut cmd = self.ssh_command(&self.remote_command);
        run_with_stdin(&mut cmd, task).await
    }

    async fn handshake(&self) -> Result<(), ExecutorError> {
        // Bound the whole round-trip: ConnectTimeout only covers the TCP
        // stage, not a hung remote shell.
        let deadline = Duration::from_secs(self.probe.connect_timeout_secs * 2);
        let mut cmd = self.ssh_command("echo connectivity_test");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let result = tokio::time::timeout(deadline, async {
            let child = cmd
                .spawn()
                .map_err(|e| ExecutorError::Transport(format!("failed to spawn ssh: {}", e)))?;
            child
                .wait_with_output()
                .await
                .map_err(|e| ExecutorError::Transport(format!("ssh i/o failure: {}", e)))
        })
        .await
        .map_err(|_| ExecutorError::Timeout(deadline.as_secs()))??;

        if result.status.success()
            && String::from_utf8_lossy(&result.stdout).contains("connectivity_test")
        {
            Ok(())
        } else {
            Err(ExecutorError::Transport(format!(
                "ssh handshake failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            )))
        }
    }
}

async fn run_with_stdin(cmd: &mut Command, input: &str) -> Result<String, ExecutorError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| ExecutorError::Transport(format!("failed to spawn executor: {}", e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        // A child that exits without draining stdin is judged by its exit
        // status, not by the broken pipe.
        if let Err(e) = stdin.write_all(input.as_bytes()).await {
            debug!("[Executor] task input not fully consumed: {}", e);
        }
        // Dropping stdin closes the pipe so the child sees EOF.
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ExecutorError::Transport(format!("executor i/o failure: {}", e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("[Executor] non-zero exit {}: {}", output.status, stderr.trim());
        Err(ExecutorError::Execution(format!(
            "exit {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_local_executor_round_trip() {
        let executor = ShellLocalExecutor::new("cat", vec![]);
        let result = executor.execute("hello from the pi").await.unwrap();
        assert_eq!(result, "hello from the pi");
    }

    #[tokio::test]
    async fn test_shell_local_executor_missing_program_is_transport_error() {
        let executor = ShellLocalExecutor::new("definitely-not-a-real-binary-xyz", vec![]);
        match executor.execute("task").await {
            Err(ExecutorError::Transport(_)) => {}
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shell_local_executor_nonzero_exit_is_execution_error() {
        let executor = ShellLocalExecutor::new("false", vec![]);
        match executor.execute("task").await {
            Err(ExecutorError::Execution(_)) => {}
            other => panic!("expected execution error, got {:?}", other),
        }
    }
}
