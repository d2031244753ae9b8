//! Ledger entry changes
//!
//! A [`Change`] is one entry-level mutation observed when a ledger closed:
//! a before image, an after image, or both. Entries are keyed by their
//! natural key (account id, offer id, balance id, trustline key), never by
//! storage position.

use crate::error::{MetaError, Result};
use crate::meta::Asset;
use serde::{Deserialize, Serialize};

/// Account state as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Natural key
    pub account_id: String,
    /// Balance in base units
    pub balance: i64,
    /// Account sequence number
    pub sequence: i64,
    /// Number of trustlines held
    pub num_trustlines: u32,
    /// Sponsoring account, if any
    pub sponsor: Option<String>,
}

/// Trustline from an account to a non-native asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustlineEntry {
    /// Holding account
    pub account_id: String,
    /// Trusted asset
    pub asset: Asset,
    /// Current balance in base units
    pub balance: i64,
    /// Trust limit
    pub limit: i64,
}

/// Open order-book offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    /// Natural key, assigned at creation
    pub offer_id: i64,
    /// Offer owner
    pub seller_id: String,
    /// Asset sold
    pub selling: Asset,
    /// Asset bought
    pub buying: Asset,
    /// Remaining amount of `selling`
    pub amount: i64,
    /// Price numerator
    pub price_n: i32,
    /// Price denominator
    pub price_d: i32,
}

/// Claimable balance held in escrow until claimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableBalanceEntry {
    /// Natural key: hex-encoded balance id
    pub balance_id: String,
    /// Escrowed asset
    pub asset: Asset,
    /// Escrowed amount in base units
    pub amount: i64,
    /// Accounts allowed to claim
    pub claimants: Vec<String>,
}

/// Typed payload of a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryData {
    /// Account entry
    Account(AccountEntry),
    /// Trustline entry
    Trustline(TrustlineEntry),
    /// Offer entry
    Offer(OfferEntry),
    /// Claimable balance entry
    ClaimableBalance(ClaimableBalanceEntry),
}

/// Ledger entry type discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Account
    Account,
    /// Trustline
    Trustline,
    /// Offer
    Offer,
    /// Claimable balance
    ClaimableBalance,
}

/// Type-specific natural key of a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKey {
    /// Account id
    Account(String),
    /// (account id, asset) pair
    Trustline {
        /// Holding account
        account_id: String,
        /// Trusted asset
        asset: Asset,
    },
    /// Offer id
    Offer(i64),
    /// Hex-encoded balance id
    ClaimableBalance(String),
}

impl EntryData {
    /// Entry type discriminant
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryData::Account(_) => EntryType::Account,
            EntryData::Trustline(_) => EntryType::Trustline,
            EntryData::Offer(_) => EntryType::Offer,
            EntryData::ClaimableBalance(_) => EntryType::ClaimableBalance,
        }
    }

    /// Natural key of the entry
    pub fn key(&self) -> EntryKey {
        match self {
            EntryData::Account(a) => EntryKey::Account(a.account_id.clone()),
            EntryData::Trustline(t) => EntryKey::Trustline {
                account_id: t.account_id.clone(),
                asset: t.asset.clone(),
            },
            EntryData::Offer(o) => EntryKey::Offer(o.offer_id),
            EntryData::ClaimableBalance(cb) => EntryKey::ClaimableBalance(cb.balance_id.clone()),
        }
    }
}

/// One ledger entry together with the sequence that last modified it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Ledger sequence of the last modification
    pub last_modified: u32,
    /// Typed payload
    pub data: EntryData,
}

/// Kind of mutation a change describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Entry did not exist before
    Created,
    /// Entry existed and still exists
    Updated,
    /// Entry no longer exists
    Removed,
}

/// A single before/after pair for one ledger entry
///
/// At least one of `pre`/`post` is always present: `pre == None` denotes
/// creation, `post == None` denotes removal, both present denotes update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// State before the ledger closed
    pub pre: Option<LedgerEntry>,
    /// State after the ledger closed
    pub post: Option<LedgerEntry>,
}

impl Change {
    /// Build a change, enforcing the pre/post invariant
    pub fn new(pre: Option<LedgerEntry>, post: Option<LedgerEntry>) -> Result<Self> {
        if pre.is_none() && post.is_none() {
            return Err(MetaError::EmptyChange);
        }
        Ok(Self { pre, post })
    }

    /// Validate the pre/post invariant on an already-deserialized change
    pub fn validate(&self) -> Result<()> {
        if self.pre.is_none() && self.post.is_none() {
            return Err(MetaError::EmptyChange);
        }
        Ok(())
    }

    /// Kind of mutation
    pub fn kind(&self) -> ChangeKind {
        match (&self.pre, &self.post) {
            (None, Some(_)) => ChangeKind::Created,
            (Some(_), Some(_)) => ChangeKind::Updated,
            // new() and validate() rule out (None, None)
            _ => ChangeKind::Removed,
        }
    }

    /// Entry type discriminant, taken from whichever side is present
    pub fn entry_type(&self) -> EntryType {
        self.side().entry_type()
    }

    /// Natural key, taken from whichever side is present
    pub fn key(&self) -> EntryKey {
        self.side().key()
    }

    fn side(&self) -> &EntryData {
        match (&self.pre, &self.post) {
            (_, Some(post)) => &post.data,
            (Some(pre), None) => &pre.data,
            (None, None) => unreachable!("empty change"),
        }
    }
}
