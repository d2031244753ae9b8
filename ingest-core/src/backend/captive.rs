//! Backend that owns a managed node subprocess

use crate::backend::{BackendError, LedgerBackend, LedgerRange, RequestGuard};
use crate::config::NodeConfig;
use crate::error::{OrderingError, Result};
use crate::runner::{NodeMode, NodeRunner};
use async_trait::async_trait;
use ledger_meta::LedgerCloseMeta;
use std::time::Duration;
use tracing::{debug, info};

/// Runs a validating node as a subprocess and serves its metadata stream
///
/// A bounded range starts the node in catch-up mode (replay and exit); an
/// unbounded range starts it tracking the network head. The stream is
/// strictly sequential, so requests must arrive in order; a stale leading
/// portion of the stream (sequences below the first request) is skipped.
pub struct CaptiveBackend {
    config: NodeConfig,
    guard: RequestGuard,
    runner: Option<NodeRunner>,
    served_first: bool,
}

impl CaptiveBackend {
    /// Create a backend; the node is not spawned until `prepare_range`
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            guard: RequestGuard::default(),
            runner: None,
            served_first: false,
        }
    }

    async fn next_meta(&mut self, first: bool) -> Result<Option<LedgerCloseMeta>> {
        let runner = self
            .runner
            .as_mut()
            .ok_or(BackendError::NotPrepared)?;
        if first {
            // The node may need to replay from an archive checkpoint before
            // the first ledger appears; bound that wait.
            let deadline = Duration::from_millis(self.config.start_timeout_ms);
            match tokio::time::timeout(deadline, runner.next_meta()).await {
                Ok(res) => Ok(res?),
                Err(_) => Err(BackendError::Timeout(format!(
                    "node produced no ledger within {}ms of start",
                    self.config.start_timeout_ms
                ))
                .into()),
            }
        } else {
            Ok(runner.next_meta().await?)
        }
    }
}

#[async_trait]
impl LedgerBackend for CaptiveBackend {
    async fn prepare_range(&mut self, range: LedgerRange) -> Result<()> {
        self.guard.prepare(range)?;
        if self.runner.is_none() {
            let mode = match range {
                LedgerRange::Bounded { from, to } => NodeMode::CatchUp { from, to },
                LedgerRange::Unbounded { from } => NodeMode::Track { from },
            };
            self.runner = Some(NodeRunner::spawn(&self.config, mode)?);
            info!(?range, "node session prepared");
        }
        Ok(())
    }

    async fn get_ledger(&mut self, sequence: u32) -> Result<LedgerCloseMeta> {
        self.guard.check_request(sequence)?;
        loop {
            let first = !self.served_first;
            match self.next_meta(first).await? {
                Some(meta) => {
                    self.served_first = true;
                    let produced = meta.sequence();
                    if produced < sequence {
                        // Stale leading ledgers before the requested start.
                        debug!(produced, sequence, "skipping ledger below request");
                        continue;
                    }
                    if produced > sequence {
                        return Err(OrderingError::UnexpectedSequence {
                            expected: sequence,
                            produced,
                        }
                        .into());
                    }
                    return Ok(meta);
                }
                None => {
                    // Stream ended while a ledger was still owed.
                    let runner = self
                        .runner
                        .as_mut()
                        .ok_or(BackendError::Closed)?;
                    return Err(runner.exit_error().await.into());
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.guard.close() {
            if let Some(runner) = self.runner.take() {
                runner.stop().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_get_ledger_requires_prepare() {
        let mut backend = CaptiveBackend::new(NodeConfig::default());
        assert!(matches!(
            backend.get_ledger(2).await,
            Err(Error::Backend(BackendError::NotPrepared))
        ));
    }

    #[tokio::test]
    async fn test_node_exit_is_surfaced() {
        // `sh` rejects the node flags and exits immediately, so the
        // metadata stream ends before any ledger arrives.
        let config = NodeConfig {
            binary_path: PathBuf::from("sh"),
            config_path: PathBuf::from("/dev/null"),
            ..NodeConfig::default()
        };
        let mut backend = CaptiveBackend::new(config);
        backend
            .prepare_range(LedgerRange::unbounded(2))
            .await
            .unwrap();
        match backend.get_ledger(2).await {
            Err(Error::Backend(BackendError::ProcessExited { .. })) => {}
            other => panic!("unexpected result: {:?}", other.map(|m| m.sequence())),
        }
        backend.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let config = NodeConfig {
            binary_path: PathBuf::from("sh"),
            config_path: PathBuf::from("/dev/null"),
            ..NodeConfig::default()
        };
        let mut backend = CaptiveBackend::new(config);
        backend
            .prepare_range(LedgerRange::bounded(2, 4))
            .await
            .unwrap();
        backend.close().await.unwrap();
        backend.close().await.unwrap();
        assert!(matches!(
            backend.get_ledger(2).await,
            Err(Error::Backend(BackendError::Closed))
        ));
    }
}
