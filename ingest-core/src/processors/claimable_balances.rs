//! Claimable balance processors
//!
//! Two processors share this table family: one maintains the live state
//! rows, the other maintains the history join tables linking balance ids to
//! the transactions and operations that touched them. Linking is two-phase:
//! balance ids are resolved to internal surrogate ids in one bulk upsert at
//! commit, then the join rows are inserted against those ids.

use crate::error::Result;
use crate::readers::LedgerTransaction;
use history_store::{ClaimableBalanceRow, HistoryTransaction};
use ledger_meta::{Change, ChangeKind, ClaimableBalanceEntry, EntryData, Operation};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) fn claimable_balance_row(
    entry: &ClaimableBalanceEntry,
    last_modified: u32,
) -> ClaimableBalanceRow {
    ClaimableBalanceRow {
        balance_id: entry.balance_id.clone(),
        asset: entry.asset.canonical(),
        amount: entry.amount,
        claimants: entry.claimants.clone(),
        last_modified,
    }
}

/// Folds claimable balance changes into per-ledger upserts and removals
#[derive(Debug)]
pub struct ClaimableBalanceStateProcessor {
    sequence: u32,
    upserts: BTreeMap<String, ClaimableBalanceRow>,
    removes: BTreeSet<String>,
}

impl ClaimableBalanceStateProcessor {
    pub(super) fn new(sequence: u32) -> Self {
        Self {
            sequence,
            upserts: BTreeMap::new(),
            removes: BTreeSet::new(),
        }
    }

    pub(super) fn process_change(&mut self, change: &Change) -> Result<()> {
        match change.kind() {
            ChangeKind::Created | ChangeKind::Updated => {
                if let Some(post) = &change.post {
                    if let EntryData::ClaimableBalance(entry) = &post.data {
                        self.removes.remove(&entry.balance_id);
                        self.upserts.insert(
                            entry.balance_id.clone(),
                            claimable_balance_row(entry, self.sequence),
                        );
                    }
                }
            }
            ChangeKind::Removed => {
                if let Some(pre) = &change.pre {
                    if let EntryData::ClaimableBalance(entry) = &pre.data {
                        self.upserts.remove(&entry.balance_id);
                        self.removes.insert(entry.balance_id.clone());
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) async fn commit(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        let rows: Vec<ClaimableBalanceRow> =
            std::mem::take(&mut self.upserts).into_values().collect();
        let removed: Vec<String> = std::mem::take(&mut self.removes).into_iter().collect();
        if !rows.is_empty() {
            tx.upsert_claimable_balances(rows).await?;
        }
        if !removed.is_empty() {
            tx.remove_claimable_balances(removed).await?;
        }
        Ok(())
    }
}

/// Transactions and operations using one balance id within a ledger
#[derive(Debug, Default)]
struct BalanceUse {
    transaction_ids: BTreeSet<i64>,
    operation_ids: BTreeSet<i64>,
}

/// Records which transactions and operations touched each claimable balance
///
/// A balance id is "touched" when an operation explicitly claims it or when
/// an operation's effects create or delete its entry. The per-id sets
/// deduplicate multiple touches within one transaction.
#[derive(Debug)]
pub struct ClaimableBalanceLinksProcessor {
    sequence: u32,
    uses: BTreeMap<String, BalanceUse>,
}

impl ClaimableBalanceLinksProcessor {
    pub(super) fn new(sequence: u32) -> Self {
        Self {
            sequence,
            uses: BTreeMap::new(),
        }
    }

    pub(super) fn process_transaction(&mut self, tx: &LedgerTransaction) -> Result<()> {
        if !tx.result.successful {
            return Ok(());
        }
        let transaction_id = super::transaction_id(self.sequence, tx.index);
        for (op_index, op) in tx.envelope.operations.iter().enumerate() {
            let operation_id = super::operation_id(self.sequence, tx.index, op_index as u32);
            if let Operation::ClaimClaimableBalance { balance_id } = op {
                self.touch(balance_id.clone(), transaction_id, operation_id);
            }
            if let Some(meta) = tx.operations.get(op_index) {
                for change in &meta.changes {
                    let entry = change
                        .post
                        .as_ref()
                        .or(change.pre.as_ref())
                        .map(|e| &e.data);
                    if let Some(EntryData::ClaimableBalance(cb)) = entry {
                        self.touch(cb.balance_id.clone(), transaction_id, operation_id);
                    }
                }
            }
        }
        Ok(())
    }

    fn touch(&mut self, balance_id: String, transaction_id: i64, operation_id: i64) {
        let entry = self.uses.entry(balance_id).or_default();
        entry.transaction_ids.insert(transaction_id);
        entry.operation_ids.insert(operation_id);
    }

    pub(super) async fn commit(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        let uses = std::mem::take(&mut self.uses);
        if uses.is_empty() {
            return Ok(());
        }
        let balance_ids: Vec<String> = uses.keys().cloned().collect();
        let internal = tx.create_claimable_balance_ids(balance_ids).await?;

        let mut tx_links = Vec::new();
        let mut op_links = Vec::new();
        for (balance_id, used) in &uses {
            let id = *internal.get(balance_id).ok_or_else(|| {
                history_store::Error::UnresolvedKey(balance_id.clone())
            })?;
            tx_links.extend(used.transaction_ids.iter().map(|t| (id, *t)));
            op_links.extend(used.operation_ids.iter().map(|o| (id, *o)));
        }
        tx.insert_claimable_balance_transactions(tx_links).await?;
        tx.insert_claimable_balance_operations(op_links).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_store::{HistoryStore, MemoryHistoryStore};
    use ledger_meta::{
        Asset, LedgerEntry, OperationMeta, TransactionEnvelope, TransactionResult,
    };

    fn claim_tx(index: u32, balance_id: &str) -> LedgerTransaction {
        let entry = LedgerEntry {
            last_modified: 8,
            data: EntryData::ClaimableBalance(ClaimableBalanceEntry {
                balance_id: balance_id.to_string(),
                asset: Asset::Native,
                amount: 50,
                claimants: vec!["GCLAIM".to_string()],
            }),
        };
        LedgerTransaction {
            index,
            hash: "cd".repeat(32),
            envelope: TransactionEnvelope {
                source_account: "GCLAIM".to_string(),
                fee: 100,
                seq_num: 1,
                operations: vec![Operation::ClaimClaimableBalance {
                    balance_id: balance_id.to_string(),
                }],
                memo: None,
            },
            result: TransactionResult {
                successful: true,
                fee_charged: 100,
            },
            fee_changes: vec![],
            operations: vec![OperationMeta {
                changes: vec![Change {
                    pre: Some(entry),
                    post: None,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_explicit_claim_and_entry_change_deduplicate() {
        // The claim operation names the balance and its effect deletes the
        // entry; both touches collapse into one link pair.
        let mut processor = ClaimableBalanceLinksProcessor::new(8);
        processor.process_transaction(&claim_tx(1, "beef01")).unwrap();

        let store = MemoryHistoryStore::new();
        let mut tx = store.begin().await.unwrap();
        processor.commit(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        let ids = store.history_claimable_balance_ids();
        assert_eq!(ids.len(), 1);
        let internal = ids["beef01"];
        assert_eq!(
            store.claimable_balance_transaction_links(),
            vec![(internal, super::super::transaction_id(8, 1))]
        );
        assert_eq!(
            store.claimable_balance_operation_links(),
            vec![(internal, super::super::operation_id(8, 1, 0))]
        );
    }

    #[tokio::test]
    async fn test_two_operations_share_one_history_row() {
        // Two claim operations in one transaction against the same balance:
        // one surrogate id, one transaction link, two operation links.
        let mut tx_record = claim_tx(1, "beef01");
        let extra_op = tx_record.envelope.operations[0].clone();
        let extra_meta = tx_record.operations[0].clone();
        tx_record.envelope.operations.push(extra_op);
        tx_record.operations.push(extra_meta);

        let mut processor = ClaimableBalanceLinksProcessor::new(8);
        processor.process_transaction(&tx_record).unwrap();

        let store = MemoryHistoryStore::new();
        let mut tx = store.begin().await.unwrap();
        processor.commit(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.history_claimable_balance_ids().len(), 1);
        assert_eq!(store.claimable_balance_transaction_links().len(), 1);
        assert_eq!(
            store
                .claimable_balance_operation_links()
                .iter()
                .map(|(_, op)| *op)
                .collect::<Vec<_>>(),
            vec![
                super::super::operation_id(8, 1, 0),
                super::super::operation_id(8, 1, 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_surrogate_ids_are_stable_across_ledgers() {
        let store = MemoryHistoryStore::new();

        for sequence in [8u32, 9u32] {
            let mut processor = ClaimableBalanceLinksProcessor::new(sequence);
            processor
                .process_transaction(&claim_tx(1, "beef01"))
                .unwrap();
            let mut tx = store.begin().await.unwrap();
            processor.commit(tx.as_mut()).await.unwrap();
            tx.commit().await.unwrap();
        }

        // Same balance id resolves to the same internal id both times.
        assert_eq!(store.history_claimable_balance_ids().len(), 1);
        assert_eq!(store.claimable_balance_transaction_links().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_transactions_produce_no_links() {
        let mut failed = claim_tx(1, "beef01");
        failed.result.successful = false;

        let mut processor = ClaimableBalanceLinksProcessor::new(8);
        processor.process_transaction(&failed).unwrap();

        let store = MemoryHistoryStore::new();
        let mut tx = store.begin().await.unwrap();
        processor.commit(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.history_claimable_balance_ids().is_empty());
    }
}
