//! Filtered-transaction processor
//!
//! Transactions the whitelist excludes are still accounted for: a minimal
//! row (ledger, ordinal, hash) proves the transaction existed without
//! carrying it into any derived table.

use crate::error::Result;
use crate::readers::LedgerTransaction;
use history_store::{FilteredTransactionRow, HistoryTransaction};

/// Records the minimal row for each excluded transaction
#[derive(Debug)]
pub struct FilteredTransactionsProcessor {
    sequence: u32,
    rows: Vec<FilteredTransactionRow>,
}

impl FilteredTransactionsProcessor {
    pub(super) fn new(sequence: u32) -> Self {
        Self {
            sequence,
            rows: Vec::new(),
        }
    }

    pub(super) fn process_transaction(&mut self, tx: &LedgerTransaction) -> Result<()> {
        self.rows.push(FilteredTransactionRow {
            ledger_sequence: self.sequence,
            index: tx.index,
            hash: tx.hash.clone(),
        });
        Ok(())
    }

    pub(super) async fn commit(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        let rows = std::mem::take(&mut self.rows);
        if !rows.is_empty() {
            tx.insert_filtered_transactions(rows).await?;
        }
        Ok(())
    }
}
