//! Account state processor

use crate::error::Result;
use history_store::{AccountRow, HistoryTransaction};
use ledger_meta::{AccountEntry, Change, ChangeKind, EntryData};
use std::collections::{BTreeMap, BTreeSet};

/// Convert a ledger entry into its derived row
pub(crate) fn account_row(entry: &AccountEntry, last_modified: u32) -> AccountRow {
    AccountRow {
        account_id: entry.account_id.clone(),
        balance: entry.balance,
        sequence: entry.sequence,
        num_trustlines: entry.num_trustlines as i32,
        sponsor: entry.sponsor.clone(),
        last_modified,
    }
}

/// Folds account changes into per-ledger upserts and removals
///
/// Later changes to the same account within the ledger overwrite earlier
/// ones, so one row per account reaches the store.
#[derive(Debug)]
pub struct AccountsProcessor {
    sequence: u32,
    upserts: BTreeMap<String, AccountRow>,
    removes: BTreeSet<String>,
}

impl AccountsProcessor {
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
                    if let EntryData::Account(entry) = &post.data {
                        self.removes.remove(&entry.account_id);
                        self.upserts
                            .insert(entry.account_id.clone(), account_row(entry, self.sequence));
                    }
                }
            }
            ChangeKind::Removed => {
                if let Some(pre) = &change.pre {
                    if let EntryData::Account(entry) = &pre.data {
                        self.upserts.remove(&entry.account_id);
                        self.removes.insert(entry.account_id.clone());
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) async fn commit(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        let rows: Vec<AccountRow> = std::mem::take(&mut self.upserts).into_values().collect();
        let removed: Vec<String> = std::mem::take(&mut self.removes).into_iter().collect();
        if !rows.is_empty() {
            tx.upsert_accounts(rows).await?;
        }
        if !removed.is_empty() {
            tx.remove_accounts(removed).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_store::{HistoryStore, MemoryHistoryStore};
    use ledger_meta::LedgerEntry;

    fn entry(id: &str, balance: i64) -> LedgerEntry {
        LedgerEntry {
            last_modified: 5,
            data: EntryData::Account(AccountEntry {
                account_id: id.to_string(),
                balance,
                sequence: 1,
                num_trustlines: 0,
                sponsor: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_last_change_within_ledger_wins() {
        let mut processor = AccountsProcessor::new(5);
        processor
            .process_change(&Change {
                pre: None,
                post: Some(entry("GAAA", 10)),
            })
            .unwrap();
        processor
            .process_change(&Change {
                pre: Some(entry("GAAA", 10)),
                post: Some(entry("GAAA", 25)),
            })
            .unwrap();

        let store = MemoryHistoryStore::new();
        let mut tx = store.begin().await.unwrap();
        processor.commit(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        let rows = store.accounts().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].balance, 25);
        assert_eq!(rows[0].last_modified, 5);
    }

    #[tokio::test]
    async fn test_create_then_remove_leaves_no_row() {
        let mut processor = AccountsProcessor::new(5);
        processor
            .process_change(&Change {
                pre: None,
                post: Some(entry("GAAA", 10)),
            })
            .unwrap();
        processor
            .process_change(&Change {
                pre: Some(entry("GAAA", 10)),
                post: None,
            })
            .unwrap();

        let store = MemoryHistoryStore::new();
        let mut tx = store.begin().await.unwrap();
        processor.commit(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.accounts().await.unwrap().is_empty());
    }
}
