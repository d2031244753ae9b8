//! Meridian Ingestion Core
//!
//! Turns a validating node's closed-ledger output into a relational index.
//!
//! # Architecture
//!
//! Data flows one direction:
//!
//! ```text
//! NodeRunner → LedgerBackend → readers → processor pipeline → history store
//! ```
//!
//! The [`sequencer::Sequencer`] drives the flow one ledger at a time and owns
//! recovery decisions; the [`verify::StateVerifier`] runs out-of-band against
//! checkpoint snapshots and never touches the live path.
//!
//! # Invariants
//!
//! - A ledger is either fully indexed or not indexed at all
//! - Ledgers are ingested strictly in sequence order, single-flight
//! - The cursor advances only inside the same transaction that committed
//!   the ledger's rows

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod backend;
pub mod config;
pub mod error;
pub mod processors;
pub mod readers;
pub mod runner;
pub mod sequencer;
pub mod verify;

// Re-exports
pub use backend::{BackendError, LedgerBackend, LedgerRange};
pub use config::IngestConfig;
pub use error::{Error, OrderingError, Result};
pub use sequencer::{Sequencer, SequencerState};
