//! Streaming views over one ledger's metadata
//!
//! Two single-pass readers present a [`LedgerCloseMeta`] to the processor
//! pipeline: [`ChangeReader`] flattens every entry change in deterministic
//! apply order, [`TransactionReader`] yields one record per transaction with
//! its network-scoped hash precomputed. Neither reader is restartable; build
//! a new one to re-read.

use crate::error::Result;
use ledger_meta::{
    Change, LedgerCloseMeta, OperationMeta, TransactionEnvelope, TransactionResult,
};
use std::collections::VecDeque;

/// One transaction with its precomputed hash, as seen by processors
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    /// Ordinal position within the ledger, starting at 1
    pub index: u32,
    /// Hex-encoded network-scoped transaction hash
    pub hash: String,
    /// Signed envelope
    pub envelope: TransactionEnvelope,
    /// Application result
    pub result: TransactionResult,
    /// Entry changes from fee processing
    pub fee_changes: Vec<Change>,
    /// Per-operation entry changes, parallel to `envelope.operations`
    pub operations: Vec<OperationMeta>,
}

impl LedgerTransaction {
    /// All changes this transaction caused, in apply order
    pub fn changes(&self) -> impl Iterator<Item = &Change> {
        self.fee_changes
            .iter()
            .chain(self.operations.iter().flat_map(|op| op.changes.iter()))
    }
}

/// Streams every entry change of one ledger in deterministic apply order:
/// header changes first, then all fee changes in transaction order, then
/// per-operation changes transaction by transaction
pub struct ChangeReader {
    pending: VecDeque<Change>,
}

impl ChangeReader {
    /// Flatten the ledger's changes into read order
    pub fn new(meta: &LedgerCloseMeta) -> Self {
        let mut pending = VecDeque::new();
        pending.extend(meta.header_changes.iter().cloned());
        for tx in &meta.transactions {
            pending.extend(tx.fee_changes.iter().cloned());
        }
        for tx in &meta.transactions {
            for op in &tx.operations {
                pending.extend(op.changes.iter().cloned());
            }
        }
        Self { pending }
    }

    /// Next change, `None` once exhausted
    pub fn read(&mut self) -> Option<Change> {
        self.pending.pop_front()
    }
}

/// Streams one ledger's transactions in apply order with hashes precomputed
pub struct TransactionReader {
    pending: VecDeque<LedgerTransaction>,
}

impl TransactionReader {
    /// Build the reader; hashing every envelope up front keeps `read`
    /// infallible
    pub fn new(meta: &LedgerCloseMeta, network_passphrase: &str) -> Result<Self> {
        let mut pending = VecDeque::with_capacity(meta.transactions.len());
        for tx in &meta.transactions {
            let hash = hex::encode(tx.envelope.hash(network_passphrase)?);
            pending.push_back(LedgerTransaction {
                index: tx.index,
                hash,
                envelope: tx.envelope.clone(),
                result: tx.result.clone(),
                fee_changes: tx.fee_changes.clone(),
                operations: tx.operations.clone(),
            });
        }
        Ok(Self { pending })
    }

    /// Next transaction, `None` once exhausted
    pub fn read(&mut self) -> Option<LedgerTransaction> {
        self.pending.pop_front()
    }
}
