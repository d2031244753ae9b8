//! Ledger-at-a-time ingestion driver
//!
//! The sequencer is the only writer of derived state. It walks ledgers in
//! strict sequence order, single-flight: resume point from the cursor, fetch
//! from the backend, verify chain continuity against the index's own
//! committed hashes, run the processor pipeline, then commit rows, header
//! and cursor in one store transaction.

use crate::backend::{LedgerBackend, LedgerRange};
use crate::config::{FilterConfig, IngestConfig};
use crate::error::{OrderingError, Result};
use crate::processors::Pipeline;
use history_store::{HistoryStore, IngestionCursor, LedgerRow, SCHEMA_VERSION};
use ledger_meta::LedgerCloseMeta;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Where the sequencer is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Between ledgers
    Idle,
    /// Declaring the read range to the backend
    Preparing,
    /// Waiting on the backend for the next ledger
    Fetching,
    /// Running the processor pipeline
    Processing,
    /// Commit landed; transient before returning to idle
    Committed,
    /// Last cycle errored; the failed ledger was not committed
    Failed,
}

/// Single-flight, in-order ingestion driver
pub struct Sequencer<B> {
    backend: B,
    store: Arc<dyn HistoryStore>,
    network_passphrase: String,
    start_ledger: u32,
    filter_config: FilterConfig,
    state: SequencerState,
    prepared: bool,
    progress_tx: watch::Sender<u32>,
}

impl<B: LedgerBackend> Sequencer<B> {
    /// Create a sequencer over a backend and a store
    pub fn new(backend: B, store: Arc<dyn HistoryStore>, config: &IngestConfig) -> Self {
        let (progress_tx, _) = watch::channel(0);
        Self {
            backend,
            store,
            network_passphrase: config.network_passphrase.clone(),
            start_ledger: config.start_ledger,
            filter_config: config.filters.clone(),
            state: SequencerState::Idle,
            prepared: false,
            progress_tx,
        }
    }

    /// Current cycle state
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Watch committed ledger sequences, for out-of-band consumers
    pub fn progress(&self) -> watch::Receiver<u32> {
        self.progress_tx.subscribe()
    }

    /// Ingest exactly one ledger; returns the committed sequence
    ///
    /// On error nothing was committed and the cursor is unchanged: a retry
    /// re-ingests the same ledger.
    pub async fn run_once(&mut self) -> Result<u32> {
        match self.ingest_next().await {
            Ok(sequence) => {
                self.state = SequencerState::Idle;
                Ok(sequence)
            }
            Err(err) => {
                self.state = SequencerState::Failed;
                Err(err)
            }
        }
    }

    async fn ingest_next(&mut self) -> Result<u32> {
        let cursor = self.store.cursor().await?;
        let next = if cursor.last_ingested == 0 {
            self.start_ledger
        } else {
            cursor.last_ingested + 1
        };

        if !self.prepared {
            self.state = SequencerState::Preparing;
            self.backend
                .prepare_range(LedgerRange::unbounded(next))
                .await?;
            self.prepared = true;
        }

        self.state = SequencerState::Fetching;
        let meta = self.backend.get_ledger(next).await?;

        // Continuity check against the index's own committed hash, before
        // any processing. Only the hashes this index wrote are trusted.
        if let Some(expected) = self.store.ledger_hash(next - 1).await? {
            let found = hex::encode(meta.header.previous_ledger_hash);
            if found != expected {
                warn!(
                    sequence = next,
                    expected, found, "fetched ledger does not extend the committed chain"
                );
                return Err(OrderingError::HashMismatch {
                    sequence: next,
                    previous: next - 1,
                    expected,
                    found,
                }
                .into());
            }
        }

        self.state = SequencerState::Processing;
        let mut pipeline = Pipeline::new(next, &self.filter_config);
        pipeline.run(&meta, &self.network_passphrase)?;

        let mut tx = self.store.begin().await?;
        pipeline.commit_all(tx.as_mut()).await?;
        tx.insert_ledger(ledger_row(&meta)?).await?;
        tx.update_cursor(IngestionCursor {
            last_ingested: next,
            schema_version: SCHEMA_VERSION,
        })
        .await?;
        tx.commit().await?;

        self.state = SequencerState::Committed;
        let _ = self.progress_tx.send(next);
        info!(
            sequence = next,
            transactions = meta.transactions.len(),
            "ledger committed"
        );
        Ok(next)
    }

    /// Ingest ledgers until shutdown is requested or an error surfaces
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                result = self.run_once() => {
                    result?;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.backend.close().await
    }

    /// Close the backend, releasing its resources
    pub async fn close(&mut self) -> Result<()> {
        self.backend.close().await
    }
}

fn ledger_row(meta: &LedgerCloseMeta) -> Result<LedgerRow> {
    Ok(LedgerRow {
        sequence: meta.header.sequence,
        hash: meta.header.hash_hex()?,
        previous_hash: hex::encode(meta.header.previous_ledger_hash),
        close_time: meta.header.close_time,
        protocol_version: meta.header.protocol_version,
        transaction_count: meta.transactions.len() as i32,
    })
}
