//! Processor pipeline
//!
//! Each processor folds one ledger's stream into pending writes for one
//! table family. Processing is synchronous accumulation; the accumulated
//! writes are flushed through a single store transaction at commit, so the
//! ledger lands all-or-nothing. The set of processors is closed: dispatch
//! goes through [`Processor`] rather than a trait object, which keeps the
//! pipeline's composition visible in one place.

mod accounts;
mod claimable_balances;
mod filter;
mod filtered;
mod offers;
mod transactions;
mod trustlines;

pub use accounts::AccountsProcessor;
pub use claimable_balances::{ClaimableBalanceLinksProcessor, ClaimableBalanceStateProcessor};
pub use filter::TransactionFilter;
pub use filtered::FilteredTransactionsProcessor;
pub use offers::OffersProcessor;
pub use transactions::TransactionsProcessor;
pub use trustlines::TrustlinesProcessor;

pub(crate) use accounts::account_row;
pub(crate) use claimable_balances::claimable_balance_row;
pub(crate) use offers::offer_row;
pub(crate) use trustlines::trustline_row;

use crate::config::FilterConfig;
use crate::error::Result;
use crate::readers::{ChangeReader, LedgerTransaction, TransactionReader};
use history_store::HistoryTransaction;
use ledger_meta::{Change, LedgerCloseMeta};
use tracing::debug;

/// Packed ordinal id of a transaction: ledger sequence in the high 32 bits,
/// transaction index shifted to leave room for operation ordinals below
pub fn transaction_id(sequence: u32, tx_index: u32) -> i64 {
    ((sequence as i64) << 32) | ((tx_index as i64) << 12)
}

/// Packed ordinal id of an operation: the transaction id plus the one-based
/// operation ordinal in the low bits
pub fn operation_id(sequence: u32, tx_index: u32, op_index: u32) -> i64 {
    transaction_id(sequence, tx_index) | (op_index as i64 + 1)
}

/// One member of the closed processor set
pub enum Processor {
    /// Account state rows
    Accounts(AccountsProcessor),
    /// Trustline state rows
    Trustlines(TrustlinesProcessor),
    /// Offer state rows
    Offers(OffersProcessor),
    /// Live claimable balance rows
    ClaimableBalanceState(ClaimableBalanceStateProcessor),
    /// Claimable balance history join rows
    ClaimableBalanceLinks(ClaimableBalanceLinksProcessor),
    /// History transaction rows
    Transactions(TransactionsProcessor),
    /// Minimal rows for whitelist-excluded transactions
    FilteredTransactions(FilteredTransactionsProcessor),
}

impl Processor {
    /// Stable name used in error reports and logs
    pub fn name(&self) -> &'static str {
        match self {
            Processor::Accounts(_) => "accounts",
            Processor::Trustlines(_) => "trustlines",
            Processor::Offers(_) => "offers",
            Processor::ClaimableBalanceState(_) => "claimable_balance_state",
            Processor::ClaimableBalanceLinks(_) => "claimable_balance_links",
            Processor::Transactions(_) => "transactions",
            Processor::FilteredTransactions(_) => "filtered_transactions",
        }
    }

    fn consumes_changes(&self) -> bool {
        matches!(
            self,
            Processor::Accounts(_)
                | Processor::Trustlines(_)
                | Processor::Offers(_)
                | Processor::ClaimableBalanceState(_)
        )
    }

    fn process_change(&mut self, change: &Change) -> Result<()> {
        match self {
            Processor::Accounts(p) => p.process_change(change),
            Processor::Trustlines(p) => p.process_change(change),
            Processor::Offers(p) => p.process_change(change),
            Processor::ClaimableBalanceState(p) => p.process_change(change),
            _ => Ok(()),
        }
    }

    fn process_transaction(&mut self, tx: &LedgerTransaction, included: bool) -> Result<()> {
        match self {
            Processor::ClaimableBalanceLinks(p) if included => p.process_transaction(tx),
            Processor::Transactions(p) if included => p.process_transaction(tx),
            Processor::FilteredTransactions(p) if !included => p.process_transaction(tx),
            _ => Ok(()),
        }
    }

    async fn commit(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        match self {
            Processor::Accounts(p) => p.commit(tx).await,
            Processor::Trustlines(p) => p.commit(tx).await,
            Processor::Offers(p) => p.commit(tx).await,
            Processor::ClaimableBalanceState(p) => p.commit(tx).await,
            Processor::ClaimableBalanceLinks(p) => p.commit(tx).await,
            Processor::Transactions(p) => p.commit(tx).await,
            Processor::FilteredTransactions(p) => p.commit(tx).await,
        }
    }
}

/// The standard processor set for one ledger
///
/// Change processors always see every entry change; the transaction filter
/// narrows only which transactions reach the transaction processors.
pub struct Pipeline {
    sequence: u32,
    filter: TransactionFilter,
    processors: Vec<Processor>,
}

impl Pipeline {
    /// Build the standard set for `sequence`
    pub fn new(sequence: u32, filter_config: &FilterConfig) -> Self {
        Self {
            sequence,
            filter: TransactionFilter::from_config(filter_config),
            processors: vec![
                Processor::Accounts(AccountsProcessor::new(sequence)),
                Processor::Trustlines(TrustlinesProcessor::new(sequence)),
                Processor::Offers(OffersProcessor::new(sequence)),
                Processor::ClaimableBalanceState(ClaimableBalanceStateProcessor::new(sequence)),
                Processor::ClaimableBalanceLinks(ClaimableBalanceLinksProcessor::new(sequence)),
                Processor::Transactions(TransactionsProcessor::new(sequence)),
                Processor::FilteredTransactions(FilteredTransactionsProcessor::new(sequence)),
            ],
        }
    }

    /// Feed one ledger's metadata through every processor
    pub fn run(&mut self, meta: &LedgerCloseMeta, network_passphrase: &str) -> Result<()> {
        let mut changes = ChangeReader::new(meta);
        while let Some(change) = changes.read() {
            for processor in self.processors.iter_mut().filter(|p| p.consumes_changes()) {
                processor.process_change(&change)?;
            }
        }

        let mut included = 0usize;
        let mut excluded = 0usize;
        let mut transactions = TransactionReader::new(meta, network_passphrase)?;
        while let Some(tx) = transactions.read() {
            let include = self.filter.include(&tx);
            if include {
                included += 1;
            } else {
                excluded += 1;
            }
            for processor in &mut self.processors {
                processor.process_transaction(&tx, include)?;
            }
        }
        debug!(
            sequence = self.sequence,
            included, excluded, "ledger processed"
        );
        Ok(())
    }

    /// Flush every processor's pending writes into one store transaction
    ///
    /// Fail-fast: the first failing processor aborts the whole ledger, named
    /// in the error so operators can see which table family choked.
    pub async fn commit_all(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        for processor in &mut self.processors {
            if let Err(err) = processor.commit(tx).await {
                return Err(crate::Error::Processor {
                    processor: processor.name(),
                    message: err.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_id_packing() {
        let tid = transaction_id(5, 2);
        assert_eq!(tid, (5i64 << 32) | (2i64 << 12));
        // Operation ordinals are one-based and stay below the next
        // transaction's id space.
        assert_eq!(operation_id(5, 2, 0), tid | 1);
        assert!(operation_id(5, 2, 0) < transaction_id(5, 3));
        // Ids order by (ledger, transaction, operation).
        assert!(transaction_id(5, 2) < transaction_id(6, 1));
        assert!(operation_id(5, 2, 3) < operation_id(5, 3, 0));
    }
}
