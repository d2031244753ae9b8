//! In-memory history store
//!
//! Backs tests and local replay. Writes made through a transaction are
//! staged on a private copy of the tables and merged on commit, which gives
//! the same all-or-nothing and read-your-writes behavior as the PostgreSQL
//! implementation. A commit fault can be injected to exercise abort paths.

use crate::error::{Error, Result};
use crate::session::{HistoryStore, HistoryTransaction, MetaStore};
use crate::types::{
    AccountRow, ClaimableBalanceRow, FilteredTransactionRow, IngestionCursor, LedgerRow,
    OfferRow, TransactionRow, TrustlineKey, TrustlineRow,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Tables {
    cursor: IngestionCursor,
    accounts: BTreeMap<String, AccountRow>,
    trustlines: BTreeMap<TrustlineKey, TrustlineRow>,
    offers: BTreeMap<i64, OfferRow>,
    claimable_balances: BTreeMap<String, ClaimableBalanceRow>,
    history_claimable_balances: BTreeMap<String, i64>,
    next_internal_id: i64,
    cb_transaction_links: Vec<(i64, i64)>,
    cb_operation_links: Vec<(i64, i64)>,
    transactions: Vec<TransactionRow>,
    filtered_transactions: Vec<FilteredTransactionRow>,
    ledgers: BTreeMap<u32, LedgerRow>,
    meta: BTreeMap<u32, Vec<u8>>,
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<RwLock<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transaction commit fail, once
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Publish an encoded metadata payload, as an external node would
    pub fn publish_meta(&self, sequence: u32, payload: Vec<u8>) {
        self.inner.write().meta.insert(sequence, payload);
    }

    /// History claimable balance surrogate ids, for assertions
    pub fn history_claimable_balance_ids(&self) -> BTreeMap<String, i64> {
        self.inner.read().history_claimable_balances.clone()
    }

    /// (internal id, transaction id) join rows, for assertions
    pub fn claimable_balance_transaction_links(&self) -> Vec<(i64, i64)> {
        self.inner.read().cb_transaction_links.clone()
    }

    /// (internal id, operation id) join rows, for assertions
    pub fn claimable_balance_operation_links(&self) -> Vec<(i64, i64)> {
        self.inner.read().cb_operation_links.clone()
    }

    /// History transaction rows, for assertions
    pub fn transaction_rows(&self) -> Vec<TransactionRow> {
        self.inner.read().transactions.clone()
    }

    /// Filtered transaction rows, for assertions
    pub fn filtered_transaction_rows(&self) -> Vec<FilteredTransactionRow> {
        self.inner.read().filtered_transactions.clone()
    }

    /// Committed ledger rows, for assertions
    pub fn ledger_rows(&self) -> Vec<LedgerRow> {
        self.inner.read().ledgers.values().cloned().collect()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn cursor(&self) -> Result<IngestionCursor> {
        Ok(self.inner.read().cursor)
    }

    async fn ledger_hash(&self, sequence: u32) -> Result<Option<String>> {
        Ok(self
            .inner
            .read()
            .ledgers
            .get(&sequence)
            .map(|l| l.hash.clone()))
    }

    async fn begin(&self) -> Result<Box<dyn HistoryTransaction>> {
        let staged = self.inner.read().clone();
        Ok(Box::new(MemoryTransaction {
            shared: self.inner.clone(),
            fail_next_commit: self.fail_next_commit.clone(),
            staged,
        }))
    }

    async fn accounts(&self) -> Result<Vec<AccountRow>> {
        Ok(self.inner.read().accounts.values().cloned().collect())
    }

    async fn trustlines(&self) -> Result<Vec<TrustlineRow>> {
        Ok(self.inner.read().trustlines.values().cloned().collect())
    }

    async fn offers(&self) -> Result<Vec<OfferRow>> {
        Ok(self.inner.read().offers.values().cloned().collect())
    }

    async fn claimable_balances(&self) -> Result<Vec<ClaimableBalanceRow>> {
        Ok(self
            .inner
            .read()
            .claimable_balances
            .values()
            .cloned()
            .collect())
    }

    async fn truncate_state_tables(&self) -> Result<()> {
        let mut tables = self.inner.write();
        tables.accounts.clear();
        tables.trustlines.clear();
        tables.offers.clear();
        tables.claimable_balances.clear();
        Ok(())
    }
}

#[async_trait]
impl MetaStore for MemoryHistoryStore {
    async fn latest_sequence(&self) -> Result<Option<u32>> {
        Ok(self.inner.read().meta.keys().next_back().copied())
    }

    async fn retention_floor(&self) -> Result<Option<u32>> {
        Ok(self.inner.read().meta.keys().next().copied())
    }

    async fn get_meta(&self, sequence: u32) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().meta.get(&sequence).cloned())
    }
}

/// Transaction over staged tables, merged into the shared store on commit
struct MemoryTransaction {
    shared: Arc<RwLock<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
    staged: Tables,
}

#[async_trait]
impl HistoryTransaction for MemoryTransaction {
    async fn upsert_accounts(&mut self, rows: Vec<AccountRow>) -> Result<()> {
        for row in rows {
            self.staged.accounts.insert(row.account_id.clone(), row);
        }
        Ok(())
    }

    async fn remove_accounts(&mut self, ids: Vec<String>) -> Result<()> {
        for id in ids {
            self.staged.accounts.remove(&id);
        }
        Ok(())
    }

    async fn upsert_trustlines(&mut self, rows: Vec<TrustlineRow>) -> Result<()> {
        for row in rows {
            self.staged.trustlines.insert(row.key(), row);
        }
        Ok(())
    }

    async fn remove_trustlines(&mut self, keys: Vec<TrustlineKey>) -> Result<()> {
        for key in keys {
            self.staged.trustlines.remove(&key);
        }
        Ok(())
    }

    async fn upsert_offers(&mut self, rows: Vec<OfferRow>) -> Result<()> {
        for row in rows {
            self.staged.offers.insert(row.offer_id, row);
        }
        Ok(())
    }

    async fn remove_offers(&mut self, ids: Vec<i64>) -> Result<()> {
        for id in ids {
            self.staged.offers.remove(&id);
        }
        Ok(())
    }

    async fn upsert_claimable_balances(&mut self, rows: Vec<ClaimableBalanceRow>) -> Result<()> {
        for row in rows {
            self.staged
                .claimable_balances
                .insert(row.balance_id.clone(), row);
        }
        Ok(())
    }

    async fn remove_claimable_balances(&mut self, ids: Vec<String>) -> Result<()> {
        for id in ids {
            self.staged.claimable_balances.remove(&id);
        }
        Ok(())
    }

    async fn create_claimable_balance_ids(
        &mut self,
        balance_ids: Vec<String>,
    ) -> Result<HashMap<String, i64>> {
        let mut resolved = HashMap::with_capacity(balance_ids.len());
        for balance_id in balance_ids {
            let id = match self.staged.history_claimable_balances.get(&balance_id) {
                Some(id) => *id,
                None => {
                    self.staged.next_internal_id += 1;
                    let id = self.staged.next_internal_id;
                    self.staged
                        .history_claimable_balances
                        .insert(balance_id.clone(), id);
                    id
                }
            };
            resolved.insert(balance_id, id);
        }
        Ok(resolved)
    }

    async fn insert_claimable_balance_transactions(
        &mut self,
        links: Vec<(i64, i64)>,
    ) -> Result<()> {
        self.staged.cb_transaction_links.extend(links);
        Ok(())
    }

    async fn insert_claimable_balance_operations(&mut self, links: Vec<(i64, i64)>) -> Result<()> {
        self.staged.cb_operation_links.extend(links);
        Ok(())
    }

    async fn insert_transactions(&mut self, rows: Vec<TransactionRow>) -> Result<()> {
        self.staged.transactions.extend(rows);
        Ok(())
    }

    async fn insert_filtered_transactions(
        &mut self,
        rows: Vec<FilteredTransactionRow>,
    ) -> Result<()> {
        self.staged.filtered_transactions.extend(rows);
        Ok(())
    }

    async fn insert_ledger(&mut self, row: LedgerRow) -> Result<()> {
        self.staged.ledgers.insert(row.sequence, row);
        Ok(())
    }

    async fn update_cursor(&mut self, cursor: IngestionCursor) -> Result<()> {
        self.staged.cursor = cursor;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(Error::Internal("injected commit failure".to_string()));
        }
        *self.shared.write() = self.staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, balance: i64) -> AccountRow {
        AccountRow {
            account_id: id.to_string(),
            balance,
            sequence: 1,
            num_trustlines: 0,
            sponsor: None,
            last_modified: 1,
        }
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryHistoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_accounts(vec![account("A", 100)]).await.unwrap();
        tx.update_cursor(IngestionCursor {
            last_ingested: 1,
            schema_version: crate::types::SCHEMA_VERSION,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.accounts().await.unwrap().len(), 1);
        assert_eq!(store.cursor().await.unwrap().last_ingested, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_store_untouched() {
        let store = MemoryHistoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_accounts(vec![account("A", 100)]).await.unwrap();
        drop(tx);

        assert!(store.accounts().await.unwrap().is_empty());
        assert_eq!(store.cursor().await.unwrap().last_ingested, 0);
    }

    #[tokio::test]
    async fn test_injected_commit_failure() {
        let store = MemoryHistoryStore::new();
        store.fail_next_commit();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_accounts(vec![account("A", 100)]).await.unwrap();
        assert!(tx.commit().await.is_err());
        assert!(store.accounts().await.unwrap().is_empty());

        // The fault fires once
        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }

    #[tokio::test]
    async fn test_surrogate_ids_stable_across_ledgers() {
        let store = MemoryHistoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let first = tx
            .create_claimable_balance_ids(vec!["b1".to_string(), "b2".to_string()])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let second = tx
            .create_claimable_balance_ids(vec!["b2".to_string(), "b3".to_string()])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // b2 keeps its id, b3 gets a fresh one
        assert_eq!(first["b2"], second["b2"]);
        assert_ne!(second["b3"], second["b2"]);
        assert_ne!(second["b3"], first["b1"]);
    }

    #[tokio::test]
    async fn test_ledger_hash_lookup() {
        let store = MemoryHistoryStore::new();
        assert!(store.ledger_hash(7).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert_ledger(LedgerRow {
            sequence: 7,
            hash: "abcd".to_string(),
            previous_hash: "0000".to_string(),
            close_time: 0,
            protocol_version: 19,
            transaction_count: 0,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.ledger_hash(7).await.unwrap().unwrap(), "abcd");
    }

    #[tokio::test]
    async fn test_truncate_state_tables_keeps_history() {
        let store = MemoryHistoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_accounts(vec![account("A", 100)]).await.unwrap();
        tx.insert_ledger(LedgerRow {
            sequence: 1,
            hash: "aa".to_string(),
            previous_hash: "00".to_string(),
            close_time: 0,
            protocol_version: 19,
            transaction_count: 0,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        store.truncate_state_tables().await.unwrap();
        assert!(store.accounts().await.unwrap().is_empty());
        // Ledger history is not re-derivable and survives
        assert!(store.ledger_hash(1).await.unwrap().is_some());
    }
}
