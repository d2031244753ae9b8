//! Store trait seams
//!
//! [`HistoryStore`] is the read/session surface, [`HistoryTransaction`] the
//! per-ledger write surface. One transaction covers one ledger's processor
//! output, the ledger header row and the cursor advance; it commits
//! all-or-nothing.

use crate::error::Result;
use crate::types::{
    AccountRow, ClaimableBalanceRow, FilteredTransactionRow, IngestionCursor, LedgerRow,
    OfferRow, TransactionRow, TrustlineKey, TrustlineRow,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Read and session surface of the history store
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Current durable resume point
    async fn cursor(&self) -> Result<IngestionCursor>;

    /// Trusted ledger hash lookup: `(hash, found)` semantics via `Option`
    ///
    /// Only hashes the index itself committed are returned; this is the
    /// trusted source consulted for chain continuity.
    async fn ledger_hash(&self, sequence: u32) -> Result<Option<String>>;

    /// Open a per-ledger write transaction
    async fn begin(&self) -> Result<Box<dyn HistoryTransaction>>;

    /// All account rows (verifier read)
    async fn accounts(&self) -> Result<Vec<AccountRow>>;

    /// All trustline rows (verifier read)
    async fn trustlines(&self) -> Result<Vec<TrustlineRow>>;

    /// All offer rows (verifier read)
    async fn offers(&self) -> Result<Vec<OfferRow>>;

    /// All live claimable balance rows (verifier read)
    async fn claimable_balances(&self) -> Result<Vec<ClaimableBalanceRow>>;

    /// Clear every re-derivable state table, for operator-directed re-sync
    async fn truncate_state_tables(&self) -> Result<()>;
}

/// Per-ledger write transaction
///
/// All multi-row methods batch internally with
/// [`crate::batch::MAX_BATCH_SIZE`]; all writes are visible to later reads
/// within the same transaction.
#[async_trait]
pub trait HistoryTransaction: Send {
    /// Upsert account rows keyed by account id
    async fn upsert_accounts(&mut self, rows: Vec<AccountRow>) -> Result<()>;

    /// Remove accounts by id
    async fn remove_accounts(&mut self, ids: Vec<String>) -> Result<()>;

    /// Upsert trustline rows keyed by (account, asset)
    async fn upsert_trustlines(&mut self, rows: Vec<TrustlineRow>) -> Result<()>;

    /// Remove trustlines by composite key
    async fn remove_trustlines(&mut self, keys: Vec<TrustlineKey>) -> Result<()>;

    /// Upsert offer rows keyed by offer id
    async fn upsert_offers(&mut self, rows: Vec<OfferRow>) -> Result<()>;

    /// Remove offers by id
    async fn remove_offers(&mut self, ids: Vec<i64>) -> Result<()>;

    /// Upsert live claimable balance rows keyed by balance id
    async fn upsert_claimable_balances(&mut self, rows: Vec<ClaimableBalanceRow>) -> Result<()>;

    /// Remove live claimable balances by id
    async fn remove_claimable_balances(&mut self, ids: Vec<String>) -> Result<()>;

    /// Resolve balance ids to internal surrogate ids in one bulk upsert,
    /// creating history rows for ids not seen before
    async fn create_claimable_balance_ids(
        &mut self,
        balance_ids: Vec<String>,
    ) -> Result<HashMap<String, i64>>;

    /// Insert (internal id, transaction id) join rows
    async fn insert_claimable_balance_transactions(
        &mut self,
        links: Vec<(i64, i64)>,
    ) -> Result<()>;

    /// Insert (internal id, operation id) join rows
    async fn insert_claimable_balance_operations(&mut self, links: Vec<(i64, i64)>) -> Result<()>;

    /// Insert history transaction rows
    async fn insert_transactions(&mut self, rows: Vec<TransactionRow>) -> Result<()>;

    /// Insert filtered-transaction rows
    async fn insert_filtered_transactions(
        &mut self,
        rows: Vec<FilteredTransactionRow>,
    ) -> Result<()>;

    /// Insert the committed ledger header row
    async fn insert_ledger(&mut self, row: LedgerRow) -> Result<()>;

    /// Advance the durable resume point
    async fn update_cursor(&mut self, cursor: IngestionCursor) -> Result<()>;

    /// Commit everything written through this transaction, atomically
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Published ledger-close metadata rows, the source a database-backed ledger
/// backend reads from
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Highest published sequence, if any
    async fn latest_sequence(&self) -> Result<Option<u32>>;

    /// Oldest retained sequence, if any
    async fn retention_floor(&self) -> Result<Option<u32>>;

    /// Framed metadata payload for one sequence
    async fn get_meta(&self, sequence: u32) -> Result<Option<Vec<u8>>>;
}
