//! Backend that reads metadata rows published by an externally-run node

use crate::backend::{BackendError, LedgerBackend, LedgerRange, RequestGuard};
use crate::error::Result;
use async_trait::async_trait;
use history_store::MetaStore;
use ledger_meta::LedgerCloseMeta;
use std::time::Duration;
use tracing::trace;

/// Default wait between polls for a not-yet-published ledger
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Serves ledgers from published metadata rows
///
/// The writing node and this reader share nothing but the table, so a
/// request for a sequence above the newest published row blocks and polls
/// until the row appears. A request below the retention floor can never be
/// satisfied and fails immediately.
pub struct DatabaseBackend<M> {
    store: M,
    guard: RequestGuard,
    poll_interval: Duration,
}

impl<M: MetaStore> DatabaseBackend<M> {
    /// Create a backend over a published-metadata store
    pub fn new(store: M) -> Self {
        Self {
            store,
            guard: RequestGuard::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl<M: MetaStore> LedgerBackend for DatabaseBackend<M> {
    async fn prepare_range(&mut self, range: LedgerRange) -> Result<()> {
        // Nothing to warm up; the writer is not ours to control.
        self.guard.prepare(range)
    }

    async fn get_ledger(&mut self, sequence: u32) -> Result<LedgerCloseMeta> {
        self.guard.check_request(sequence)?;
        loop {
            let latest = self.store.latest_sequence().await.map_err(BackendError::from)?;
            match latest {
                Some(latest) if sequence <= latest => {
                    let floor = self
                        .store
                        .retention_floor()
                        .await
                        .map_err(BackendError::from)?
                        .unwrap_or(latest);
                    if sequence < floor {
                        return Err(BackendError::OutOfRange {
                            sequence,
                            floor,
                            ceiling: latest,
                        }
                        .into());
                    }
                    let payload = self
                        .store
                        .get_meta(sequence)
                        .await
                        .map_err(BackendError::from)?
                        .ok_or_else(|| {
                            BackendError::Storage(format!(
                                "metadata row for ledger {sequence} missing despite \
                                 retention range {floor}..={latest}"
                            ))
                        })?;
                    return LedgerCloseMeta::decode(&payload)
                        .map_err(|e| BackendError::Meta(e).into());
                }
                _ => {
                    // Not published yet; wait for the writer.
                    trace!(sequence, ?latest, "ledger not yet published, polling");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.guard.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use history_store::MemoryHistoryStore;
    use ledger_meta::{LedgerCloseMeta, LedgerHeader};

    fn meta(sequence: u32) -> LedgerCloseMeta {
        LedgerCloseMeta {
            header: LedgerHeader {
                sequence,
                previous_ledger_hash: [0u8; 32],
                close_time: 1_700_000_000,
                protocol_version: 19,
                base_fee: 100,
                fee_pool: 0,
            },
            header_changes: vec![],
            transactions: vec![],
        }
    }

    fn publish(store: &MemoryHistoryStore, sequence: u32) {
        store.publish_meta(sequence, meta(sequence).encode().unwrap());
    }

    #[tokio::test]
    async fn test_serves_published_ledger() {
        let store = MemoryHistoryStore::new();
        publish(&store, 2);
        publish(&store, 3);

        let mut backend = DatabaseBackend::new(store);
        backend
            .prepare_range(LedgerRange::unbounded(2))
            .await
            .unwrap();
        assert_eq!(backend.get_ledger(2).await.unwrap().sequence(), 2);
        assert_eq!(backend.get_ledger(3).await.unwrap().sequence(), 3);
    }

    #[tokio::test]
    async fn test_below_retention_floor_fails() {
        let store = MemoryHistoryStore::new();
        publish(&store, 10);
        publish(&store, 11);

        let mut backend = DatabaseBackend::new(store);
        backend
            .prepare_range(LedgerRange::unbounded(2))
            .await
            .unwrap();
        match backend.get_ledger(5).await {
            Err(Error::Backend(BackendError::OutOfRange {
                sequence: 5,
                floor: 10,
                ceiling: 11,
            })) => {}
            other => panic!("unexpected result: {:?}", other.map(|m| m.sequence())),
        }
    }

    #[tokio::test]
    async fn test_blocks_until_published() {
        // Clones share the underlying tables.
        let store = MemoryHistoryStore::new();
        publish(&store, 2);

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.publish_meta(3, meta(3).encode().unwrap());
        });

        let mut backend =
            DatabaseBackend::new(store).with_poll_interval(Duration::from_millis(10));
        backend
            .prepare_range(LedgerRange::unbounded(2))
            .await
            .unwrap();
        assert_eq!(backend.get_ledger(2).await.unwrap().sequence(), 2);
        assert_eq!(backend.get_ledger(3).await.unwrap().sequence(), 3);
    }
}
