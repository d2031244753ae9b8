//! Offer state processor

use crate::error::Result;
use history_store::{HistoryTransaction, OfferRow};
use ledger_meta::{Change, ChangeKind, EntryData, OfferEntry};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) fn offer_row(entry: &OfferEntry, last_modified: u32) -> OfferRow {
    OfferRow {
        offer_id: entry.offer_id,
        seller_id: entry.seller_id.clone(),
        selling: entry.selling.canonical(),
        buying: entry.buying.canonical(),
        amount: entry.amount,
        price_n: entry.price_n,
        price_d: entry.price_d,
        last_modified,
    }
}

/// Folds offer changes into per-ledger upserts and removals
#[derive(Debug)]
pub struct OffersProcessor {
    sequence: u32,
    upserts: BTreeMap<i64, OfferRow>,
    removes: BTreeSet<i64>,
}

impl OffersProcessor {
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
                    if let EntryData::Offer(entry) = &post.data {
                        self.removes.remove(&entry.offer_id);
                        self.upserts
                            .insert(entry.offer_id, offer_row(entry, self.sequence));
                    }
                }
            }
            ChangeKind::Removed => {
                if let Some(pre) = &change.pre {
                    if let EntryData::Offer(entry) = &pre.data {
                        self.upserts.remove(&entry.offer_id);
                        self.removes.insert(entry.offer_id);
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) async fn commit(&mut self, tx: &mut dyn HistoryTransaction) -> Result<()> {
        let rows: Vec<OfferRow> = std::mem::take(&mut self.upserts).into_values().collect();
        let removed: Vec<i64> = std::mem::take(&mut self.removes).into_iter().collect();
        if !rows.is_empty() {
            tx.upsert_offers(rows).await?;
        }
        if !removed.is_empty() {
            tx.remove_offers(removed).await?;
        }
        Ok(())
    }
}
