//! Error taxonomy of the ingestion pipeline
//!
//! Four classes with distinct recovery semantics: backend errors are fatal
//! to the session and call for backend recreation; ordering errors are never
//! auto-repaired; processor errors abort one ledger's commit and leave the
//! cursor untouched; verification mismatches are reported, not raised.

use crate::backend::BackendError;
use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chain-ordering violations; fatal, require operator intervention
#[derive(Error, Debug)]
pub enum OrderingError {
    /// A fetched ledger does not extend the chain the index committed
    #[error(
        "ledger {sequence} declares previous hash {found} but the trusted hash \
         for ledger {previous} is {expected}"
    )]
    HashMismatch {
        /// Sequence of the fetched ledger
        sequence: u32,
        /// Sequence the trusted hash belongs to
        previous: u32,
        /// Hash recorded in the index
        expected: String,
        /// Hash the fetched ledger declares
        found: String,
    },

    /// A backend was asked for sequences out of order
    #[error("ledger {requested} requested out of order (last request was {last})")]
    OutOfOrderRequest {
        /// Previously requested sequence
        last: u32,
        /// Offending request
        requested: u32,
    },

    /// The backend produced a sequence the session never asked for
    #[error("backend produced unexpected ledger {produced} while waiting for {expected}")]
    UnexpectedSequence {
        /// Sequence the session was waiting for
        expected: u32,
        /// Sequence the backend produced
        produced: u32,
    },
}

/// Ingestion errors
#[derive(Error, Debug)]
pub enum Error {
    /// Backend failure; the session must be recreated
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Chain-ordering violation
    #[error("Ordering error: {0}")]
    Ordering(#[from] OrderingError),

    /// A processor failed; the ledger's commit was aborted
    #[error("Processor error in {processor}: {message}")]
    Processor {
        /// Processor that failed
        processor: &'static str,
        /// Failure description
        message: String,
    },

    /// Store failure during commit; the ledger's commit was aborted
    #[error("Store error: {0}")]
    Store(#[from] history_store::Error),

    /// Metadata structure failed validation
    #[error("Metadata error: {0}")]
    Meta(#[from] ledger_meta::MetaError),

    /// State verification could not run (distinct from a mismatch, which is
    /// reported rather than raised)
    #[error("Verification error: {0}")]
    Verification(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether recovery means recreating the whole session (backend included)
    /// and retrying the same ledger
    pub fn requires_session_restart(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// Whether the error is unrecoverable without operator intervention
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Ordering(_) | Error::Config(_))
    }
}
