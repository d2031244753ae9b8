//! Ledger-close metadata structures
//!
//! [`LedgerCloseMeta`] is the decoded, self-contained snapshot of everything
//! that changed when a ledger closed: the header, the ordered transaction
//! set with results, and the before/after images of every modified entry.
//! It is immutable once decoded.

use crate::change::Change;
use crate::error::{MetaError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Asset identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    /// The network's native asset
    Native,
    /// Issued credit asset
    Credit {
        /// Asset code, up to 12 characters
        code: String,
        /// Issuing account id
        issuer: String,
    },
}

impl Asset {
    /// Canonical `CODE:ISSUER` form, `native` for the native asset
    pub fn canonical(&self) -> String {
        match self {
            Asset::Native => "native".to_string(),
            Asset::Credit { code, issuer } => format!("{}:{}", code, issuer),
        }
    }
}

/// A single transaction operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create and fund a new account
    CreateAccount {
        /// New account id
        destination: String,
        /// Initial balance in base units
        starting_balance: i64,
    },
    /// Transfer an asset between accounts
    Payment {
        /// Receiving account
        destination: String,
        /// Transferred asset
        asset: Asset,
        /// Amount in base units
        amount: i64,
    },
    /// Create, update or delete a trustline
    ChangeTrust {
        /// Trusted asset
        asset: Asset,
        /// New limit, zero deletes the trustline
        limit: i64,
    },
    /// Create, update or delete an order-book offer
    ManageOffer {
        /// Offer id, zero creates a new offer
        offer_id: i64,
        /// Asset sold
        selling: Asset,
        /// Asset bought
        buying: Asset,
        /// Amount of `selling`, zero deletes the offer
        amount: i64,
        /// Price numerator
        price_n: i32,
        /// Price denominator
        price_d: i32,
    },
    /// Escrow an amount claimable by listed accounts
    CreateClaimableBalance {
        /// Escrowed asset
        asset: Asset,
        /// Escrowed amount in base units
        amount: i64,
        /// Accounts allowed to claim
        claimants: Vec<String>,
    },
    /// Claim an escrowed balance
    ClaimClaimableBalance {
        /// Hex-encoded balance id
        balance_id: String,
    },
}

/// Signed transaction envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    /// Submitting account
    pub source_account: String,
    /// Declared fee in base units
    pub fee: u32,
    /// Source account sequence number consumed
    pub seq_num: i64,
    /// Ordered operations
    pub operations: Vec<Operation>,
    /// Optional memo
    pub memo: Option<String>,
}

impl TransactionEnvelope {
    /// Transaction hash: SHA-256 over the network id and the canonical
    /// envelope bytes. The network passphrase scopes hashes to one network.
    pub fn hash(&self, network_passphrase: &str) -> Result<[u8; 32]> {
        let mut hasher = Sha256::new();
        hasher.update(Sha256::digest(network_passphrase.as_bytes()));
        hasher.update(bincode::serialize(self)?);
        Ok(hasher.finalize().into())
    }
}

/// Result of applying one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Whether the transaction was applied successfully
    pub successful: bool,
    /// Fee actually charged in base units
    pub fee_charged: i64,
}

/// Entry changes produced by one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMeta {
    /// Ordered entry changes
    pub changes: Vec<Change>,
}

/// One transaction as recorded in ledger-close metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Ordinal position within the ledger, starting at 1
    pub index: u32,
    /// Signed envelope
    pub envelope: TransactionEnvelope,
    /// Application result
    pub result: TransactionResult,
    /// Entry changes from fee processing
    pub fee_changes: Vec<Change>,
    /// Per-operation entry changes, parallel to `envelope.operations`
    pub operations: Vec<OperationMeta>,
}

/// Ledger header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// Strictly increasing ledger sequence number
    pub sequence: u32,
    /// Hash of the previous ledger's header
    pub previous_ledger_hash: [u8; 32],
    /// Ledger close time, unix seconds
    pub close_time: i64,
    /// Protocol version in effect
    pub protocol_version: u32,
    /// Base fee in base units
    pub base_fee: u32,
    /// Accumulated fee pool in base units
    pub fee_pool: i64,
}

impl LedgerHeader {
    /// Header hash: SHA-256 over the canonical header bytes
    pub fn hash(&self) -> Result<[u8; 32]> {
        let bytes = bincode::serialize(self)?;
        Ok(Sha256::digest(&bytes).into())
    }

    /// Hex-encoded header hash
    pub fn hash_hex(&self) -> Result<String> {
        Ok(hex::encode(self.hash()?))
    }
}

/// Everything that changed when one ledger closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCloseMeta {
    /// Ledger header
    pub header: LedgerHeader,
    /// Ledger-level entry changes (fee pool and friends), applied first
    pub header_changes: Vec<Change>,
    /// Ordered transaction set
    pub transactions: Vec<TransactionRecord>,
}

impl LedgerCloseMeta {
    /// Ledger sequence number
    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    /// Encode to the wire payload carried inside a frame
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a wire payload and validate structural invariants
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let meta: LedgerCloseMeta = bincode::deserialize(bytes)?;
        meta.validate()?;
        Ok(meta)
    }

    /// Check the change and transaction-ordering invariants
    pub fn validate(&self) -> Result<()> {
        for change in &self.header_changes {
            change.validate()?;
        }
        let mut expected = 1u32;
        for tx in &self.transactions {
            if tx.index != expected {
                return Err(MetaError::TransactionOrder {
                    sequence: self.header.sequence,
                    expected,
                    found: tx.index,
                });
            }
            expected += 1;
            for change in &tx.fee_changes {
                change.validate()?;
            }
            for op in &tx.operations {
                for change in &op.changes {
                    change.validate()?;
                }
            }
        }
        Ok(())
    }
}
