//! Meridian History Store
//!
//! The relational boundary of the ingestion pipeline. The pipeline needs
//! three primitives from its store: upsert-on-conflict keyed by natural id,
//! batched multi-row insert, and read-your-writes within a transaction.
//! Everything here is expressed in terms of those primitives.
//!
//! Two implementations: [`PgHistoryStore`] (PostgreSQL via sqlx) for
//! production, [`MemoryHistoryStore`] for tests and local replay.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod batch;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod session;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use memory::MemoryHistoryStore;
pub use postgres::PgHistoryStore;
pub use session::{HistoryStore, HistoryTransaction, MetaStore};
pub use types::{
    AccountRow, ClaimableBalanceRow, FilteredTransactionRow, IngestionCursor, LedgerRow,
    OfferRow, TransactionRow, TrustlineKey, TrustlineRow, SCHEMA_VERSION,
};
