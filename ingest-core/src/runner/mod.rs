//! Managed validating-node subprocess
//!
//! [`NodeRunner`] owns a node child process and exposes its ledger output as
//! an async stream of decoded metadata. The node writes framed metadata to
//! its stdout and diagnostics to stderr; the runner keeps the node's stdin
//! open as the shutdown channel. A graceful stop closes stdin, waits a
//! configured grace period, then force-kills.

mod pipe;

use crate::backend::BackendError;
use crate::config::NodeConfig;
use ledger_meta::{FrameReader, LedgerCloseMeta, MetaError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lines of node stderr retained for exit diagnostics
const STDERR_TAIL_LINES: usize = 64;

/// How the node replays ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMode {
    /// Replay a bounded historical range and exit
    CatchUp {
        /// First ledger to emit
        from: u32,
        /// Last ledger to emit
        to: u32,
    },
    /// Join the network and follow its head
    Track {
        /// First ledger to emit
        from: u32,
    },
}

/// A running node subprocess and its metadata stream
pub struct NodeRunner {
    child: Child,
    stdin: Option<ChildStdin>,
    meta_rx: mpsc::Receiver<Result<LedgerCloseMeta, MetaError>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    pump: JoinHandle<()>,
    stop_grace: Duration,
}

impl NodeRunner {
    /// Spawn the node described by `config` in `mode`
    pub fn spawn(config: &NodeConfig, mode: NodeMode) -> Result<Self, BackendError> {
        let cmd = pipe::node_command(&config.binary_path, &config.config_path, &mode);
        info!(binary = %config.binary_path.display(), ?mode, "starting node");
        Self::spawn_command(cmd, config)
    }

    /// Spawn an already-built command; split out so tests can substitute
    /// a stand-in process
    fn spawn_command(mut cmd: Command, config: &NodeConfig) -> Result<Self, BackendError> {
        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| {
            BackendError::Storage("node stdout was not captured".to_string())
        })?;
        let stderr = child.stderr.take();

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        if let Some(stderr) = stderr {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "node", "{}", line);
                    let mut tail = tail.lock();
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            });
        }

        // The channel bounds how far the node can run ahead of ingestion;
        // once it fills, the node blocks on its stdout pipe.
        let (meta_tx, meta_rx) = mpsc::channel(config.buffer_depth.max(1));
        let pump = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            loop {
                match reader.next_meta().await {
                    Ok(Some(meta)) => {
                        if meta_tx.send(Ok(meta)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = meta_tx.send(Err(err)).await;
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            meta_rx,
            stderr_tail,
            pump,
            stop_grace: Duration::from_millis(config.stop_grace_ms),
        })
    }

    /// Next metadata record; `Ok(None)` means the stream ended cleanly
    pub async fn next_meta(&mut self) -> Result<Option<LedgerCloseMeta>, BackendError> {
        match self.meta_rx.recv().await {
            Some(Ok(meta)) => Ok(Some(meta)),
            Some(Err(err)) => Err(BackendError::Meta(err)),
            None => Ok(None),
        }
    }

    /// Build the error describing an unexpected node exit
    pub async fn exit_error(&mut self) -> BackendError {
        let status = match self.child.try_wait() {
            Ok(Some(status)) => status.code(),
            _ => None,
        };
        let stderr = {
            let tail = self.stderr_tail.lock();
            tail.iter().cloned().collect::<Vec<_>>().join("\n")
        };
        BackendError::ProcessExited { status, stderr }
    }

    /// Stop the node: close its stdin, wait out the grace period, then
    /// force-kill. Always reaps the child.
    pub async fn stop(mut self) -> Result<(), BackendError> {
        self.pump.abort();

        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(?status, "node already exited");
            return Ok(());
        }

        // Closing stdin is the stop request.
        drop(self.stdin.take());

        match tokio::time::timeout(self.stop_grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(?status, "node stopped");
            }
            Err(_) => {
                warn!(
                    grace_ms = self.stop_grace.as_millis() as u64,
                    "node did not stop within grace period, killing"
                );
                self.child.start_kill()?;
                let status = self.child.wait().await?;
                info!(?status, "node killed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    fn test_config(grace_ms: u64) -> NodeConfig {
        NodeConfig {
            stop_grace_ms: grace_ms,
            ..NodeConfig::default()
        }
    }

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    #[tokio::test]
    async fn test_stop_via_stdin_close() {
        // `read` returns when stdin closes, so the process exits inside
        // the grace period without being killed.
        let runner =
            NodeRunner::spawn_command(shell("read _line"), &test_config(5_000)).unwrap();
        runner.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let runner =
            NodeRunner::spawn_command(shell("sleep 30"), &test_config(100)).unwrap();
        let start = std::time::Instant::now();
        runner.stop().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_exit_reported_with_stderr_tail() {
        let mut runner = NodeRunner::spawn_command(
            shell("echo boom >&2; exit 3"),
            &test_config(1_000),
        )
        .unwrap();
        // Stream ends without any frames.
        assert!(runner.next_meta().await.unwrap().is_none());
        // Give the child a moment to be reapable.
        tokio::time::sleep(Duration::from_millis(200)).await;
        match runner.exit_error().await {
            BackendError::ProcessExited { status, stderr } => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
        runner.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_repeated_start_stop() {
        for _ in 0..3 {
            let runner =
                NodeRunner::spawn_command(shell("read _line"), &test_config(5_000)).unwrap();
            runner.stop().await.unwrap();
        }
    }
}
