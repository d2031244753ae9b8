//! Meridian Ledger Metadata
//!
//! Typed, self-contained ledger-close metadata and the framed binary codec
//! the validating node emits it in.
//!
//! # Invariants
//!
//! - A [`Change`] always carries at least one of pre/post
//! - Transactions within a ledger are totally ordered by their index
//! - Decoding the same bytes twice yields identical structures

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod change;
pub mod error;
pub mod frame;
pub mod meta;

// Re-exports
pub use change::{
    AccountEntry, Change, ChangeKind, ClaimableBalanceEntry, EntryData, EntryKey, EntryType,
    LedgerEntry, OfferEntry, TrustlineEntry,
};
pub use error::{MetaError, Result};
pub use frame::{write_frame, write_meta, FrameReader, MAX_FRAME_SIZE};
pub use meta::{
    Asset, LedgerCloseMeta, LedgerHeader, Operation, OperationMeta, TransactionEnvelope,
    TransactionRecord, TransactionResult,
};
