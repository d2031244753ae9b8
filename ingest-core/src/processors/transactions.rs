//! History transaction processor

use crate::error::Result;
use crate::readers::LedgerTransaction;
use history_store::{HistoryTransaction, TransactionRow};

/// Records one history row per included transaction
#[derive(Debug)]
pub struct TransactionsProcessor {
    sequence: u32,
    rows: Vec<TransactionRow>,
}

impl TransactionsProcessor {
    pub(super) fn new(sequence: u32) -> Self {
        Self {
            sequence,
            rows: Vec::new(),
        }
    }

    pub(super) fn process_transaction(&mut self, tx: &LedgerTransaction) -> Result<()> {
        self.rows.push(TransactionRow {
            transaction_id: super::transaction_id(self.sequence, tx.index),
            ledger_sequence: self.sequence,
            index: tx.index,
            hash: tx.hash.clone(),
            source_account: tx.envelope.source_account.clone(),
            operation_count: tx.envelope.operations.len() as i32,
            successful: tx.result.successful,
            fee_charged: tx.result.fee_charged,
            memo: tx.envelope.memo.clone(),
        });
        Ok(())
    }

    pub(super) async fn commit(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        let rows = std::mem::take(&mut self.rows);
        if !rows.is_empty() {
            tx.insert_transactions(rows).await?;
        }
        Ok(())
    }
}
