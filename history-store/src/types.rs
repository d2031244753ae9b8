//! Row types exchanged with the store
//!
//! Rows carry natural keys and already-derived values; the store never
//! recomputes ledger semantics.

use serde::{Deserialize, Serialize};

/// Version of the derived schema this build writes
pub const SCHEMA_VERSION: u32 = 1;

/// Durable resume point of the ingestion pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCursor {
    /// Last fully committed ledger sequence, 0 before first commit
    pub last_ingested: u32,
    /// Schema version the rows were written under
    pub schema_version: u32,
}

impl Default for IngestionCursor {
    fn default() -> Self {
        Self {
            last_ingested: 0,
            schema_version: SCHEMA_VERSION,
        }
    }
}

/// Account state row, keyed by account id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRow {
    /// Natural key
    pub account_id: String,
    /// Balance in base units
    pub balance: i64,
    /// Account sequence number
    pub sequence: i64,
    /// Number of trustlines held
    pub num_trustlines: i32,
    /// Sponsoring account, if any
    pub sponsor: Option<String>,
    /// Ledger that last modified the account
    pub last_modified: u32,
}

/// Composite natural key of a trustline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrustlineKey {
    /// Holding account
    pub account_id: String,
    /// Canonical asset string (`CODE:ISSUER`)
    pub asset: String,
}

/// Trustline state row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustlineRow {
    /// Holding account
    pub account_id: String,
    /// Canonical asset string
    pub asset: String,
    /// Balance in base units
    pub balance: i64,
    /// Trust limit
    pub limit: i64,
    /// Ledger that last modified the trustline
    pub last_modified: u32,
}

impl TrustlineRow {
    /// Composite natural key
    pub fn key(&self) -> TrustlineKey {
        TrustlineKey {
            account_id: self.account_id.clone(),
            asset: self.asset.clone(),
        }
    }
}

/// Offer state row, keyed by offer id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRow {
    /// Natural key
    pub offer_id: i64,
    /// Offer owner
    pub seller_id: String,
    /// Canonical selling asset
    pub selling: String,
    /// Canonical buying asset
    pub buying: String,
    /// Remaining amount
    pub amount: i64,
    /// Price numerator
    pub price_n: i32,
    /// Price denominator
    pub price_d: i32,
    /// Ledger that last modified the offer
    pub last_modified: u32,
}

/// Live claimable balance row, keyed by balance id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableBalanceRow {
    /// Natural key: hex-encoded balance id
    pub balance_id: String,
    /// Canonical asset string
    pub asset: String,
    /// Escrowed amount
    pub amount: i64,
    /// Accounts allowed to claim
    pub claimants: Vec<String>,
    /// Ledger that last modified the balance
    pub last_modified: u32,
}

/// History transaction row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    /// Packed ordinal id (ledger << 32 | index << 12)
    pub transaction_id: i64,
    /// Ledger the transaction was applied in
    pub ledger_sequence: u32,
    /// Ordinal within the ledger, starting at 1
    pub index: u32,
    /// Hex-encoded transaction hash
    pub hash: String,
    /// Submitting account
    pub source_account: String,
    /// Number of operations
    pub operation_count: i32,
    /// Whether the transaction was applied successfully
    pub successful: bool,
    /// Fee charged in base units
    pub fee_charged: i64,
    /// Optional memo
    pub memo: Option<String>,
}

/// Minimal record of a transaction excluded by the ingestion filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredTransactionRow {
    /// Ledger the transaction was applied in
    pub ledger_sequence: u32,
    /// Ordinal within the ledger
    pub index: u32,
    /// Hex-encoded transaction hash
    pub hash: String,
}

/// Committed ledger header row; its hash is the trusted hash source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    /// Ledger sequence
    pub sequence: u32,
    /// Hex-encoded header hash
    pub hash: String,
    /// Hex-encoded previous header hash
    pub previous_hash: String,
    /// Close time, unix seconds
    pub close_time: i64,
    /// Protocol version in effect
    pub protocol_version: u32,
    /// Number of transactions applied
    pub transaction_count: i32,
}
