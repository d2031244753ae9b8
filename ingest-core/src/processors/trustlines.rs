//! Trustline state processor

use crate::error::Result;
use history_store::{HistoryTransaction, TrustlineKey, TrustlineRow};
use ledger_meta::{Change, ChangeKind, EntryData, TrustlineEntry};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) fn trustline_row(entry: &TrustlineEntry, last_modified: u32) -> TrustlineRow {
    TrustlineRow {
        account_id: entry.account_id.clone(),
        asset: entry.asset.canonical(),
        balance: entry.balance,
        limit: entry.limit,
        last_modified,
    }
}

/// Folds trustline changes into per-ledger upserts and removals, keyed by
/// the (account, asset) composite
#[derive(Debug)]
pub struct TrustlinesProcessor {
    sequence: u32,
    upserts: BTreeMap<TrustlineKey, TrustlineRow>,
    removes: BTreeSet<TrustlineKey>,
}

impl TrustlinesProcessor {
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
                    if let EntryData::Trustline(entry) = &post.data {
                        let row = trustline_row(entry, self.sequence);
                        let key = row.key();
                        self.removes.remove(&key);
                        self.upserts.insert(key, row);
                    }
                }
            }
            ChangeKind::Removed => {
                if let Some(pre) = &change.pre {
                    if let EntryData::Trustline(entry) = &pre.data {
                        let key = TrustlineKey {
                            account_id: entry.account_id.clone(),
                            asset: entry.asset.canonical(),
                        };
                        self.upserts.remove(&key);
                        self.removes.insert(key);
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) async fn commit(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        let rows: Vec<TrustlineRow> = std::mem::take(&mut self.upserts).into_values().collect();
        let removed: Vec<TrustlineKey> = std::mem::take(&mut self.removes).into_iter().collect();
        if !rows.is_empty() {
            tx.upsert_trustlines(rows).await?;
        }
        if !removed.is_empty() {
            tx.remove_trustlines(removed).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_store::{HistoryStore, MemoryHistoryStore};
    use ledger_meta::{Asset, LedgerEntry};

    fn entry(account: &str, code: &str, balance: i64) -> LedgerEntry {
        LedgerEntry {
            last_modified: 3,
            data: EntryData::Trustline(TrustlineEntry {
                account_id: account.to_string(),
                asset: Asset::Credit {
                    code: code.to_string(),
                    issuer: "GISSUER".to_string(),
                },
                balance,
                limit: 1_000,
            }),
        }
    }

    #[tokio::test]
    async fn test_composite_key_separates_assets() {
        let mut processor = TrustlinesProcessor::new(3);
        processor
            .process_change(&Change {
                pre: None,
                post: Some(entry("GAAA", "USD", 10)),
            })
            .unwrap();
        processor
            .process_change(&Change {
                pre: None,
                post: Some(entry("GAAA", "EUR", 20)),
            })
            .unwrap();

        let store = MemoryHistoryStore::new();
        let mut tx = store.begin().await.unwrap();
        processor.commit(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        let rows = store.trustlines().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.asset == "EUR:GISSUER"));
        assert!(rows.iter().any(|r| r.asset == "USD:GISSUER"));
    }

    #[tokio::test]
    async fn test_removal_deletes_only_matching_asset() {
        let store = MemoryHistoryStore::new();
        {
            let mut processor = TrustlinesProcessor::new(3);
            processor
                .process_change(&Change {
                    pre: None,
                    post: Some(entry("GAAA", "USD", 10)),
                })
                .unwrap();
            processor
                .process_change(&Change {
                    pre: None,
                    post: Some(entry("GAAA", "EUR", 20)),
                })
                .unwrap();
            let mut tx = store.begin().await.unwrap();
            processor.commit(tx.as_mut()).await.unwrap();
            tx.commit().await.unwrap();
        }

        let mut processor = TrustlinesProcessor::new(4);
        processor
            .process_change(&Change {
                pre: Some(entry("GAAA", "USD", 10)),
                post: None,
            })
            .unwrap();
        let mut tx = store.begin().await.unwrap();
        processor.commit(tx.as_mut()).await.unwrap();
        tx.commit().await.unwrap();

        let rows = store.trustlines().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].asset, "EUR:GISSUER");
    }
}
