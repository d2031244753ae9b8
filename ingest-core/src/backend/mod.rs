//! Ledger backends
//!
//! A backend abstracts how ledger-close metadata for a sequence number is
//! obtained. Three interchangeable implementations satisfy one blocking
//! contract, which keeps the sequencer backend-agnostic:
//!
//! - [`DatabaseBackend`]: reads metadata rows published by an
//!   externally-run node
//! - [`CaptiveBackend`]: owns a managed node subprocess
//! - [`ArchiveBackend`]: reads precomputed metadata archives

use crate::error::Result;
use async_trait::async_trait;
use ledger_meta::LedgerCloseMeta;
use thiserror::Error;

mod archive;
mod captive;
mod database;

pub use archive::{ArchiveBackend, ArchiveStore, FsArchiveStore};
pub use captive::CaptiveBackend;
pub use database::DatabaseBackend;

/// Backend failures; fatal to the current session
#[derive(Error, Debug)]
pub enum BackendError {
    /// `get_ledger` called before `prepare_range`
    #[error("backend not prepared: call prepare_range first")]
    NotPrepared,

    /// A range was already prepared for this session
    #[error("backend already prepared with {0:?}")]
    AlreadyPrepared(LedgerRange),

    /// Requested sequence outside the backend's retained history
    #[error("ledger {sequence} outside retained history {floor}..={ceiling}")]
    OutOfRange {
        /// Requested sequence
        sequence: u32,
        /// Oldest retained sequence
        floor: u32,
        /// Newest retained sequence
        ceiling: u32,
    },

    /// Requested sequence outside the prepared range
    #[error("ledger {sequence} outside prepared range {range:?}")]
    OutsidePreparedRange {
        /// Requested sequence
        sequence: u32,
        /// Range this session prepared
        range: LedgerRange,
    },

    /// Backend already shut down
    #[error("backend is closed")]
    Closed,

    /// The node subprocess exited unexpectedly
    #[error("node process exited unexpectedly (status {status:?}): {stderr}")]
    ProcessExited {
        /// Exit code, if the process exited normally
        status: Option<i32>,
        /// Tail of the captured stderr
        stderr: String,
    },

    /// The metadata stream carried a malformed record
    #[error("malformed metadata: {0}")]
    Meta(ledger_meta::MetaError),

    /// Storage unreachable or incomplete
    #[error("storage error: {0}")]
    Storage(String),

    /// A blocking operation exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<history_store::Error> for BackendError {
    fn from(err: history_store::Error) -> Self {
        BackendError::Storage(err.to_string())
    }
}

/// A declared read range of ledger sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerRange {
    /// Replay a bounded historical range
    Bounded {
        /// First sequence, inclusive
        from: u32,
        /// Last sequence, inclusive
        to: u32,
    },
    /// Follow the network's head from a starting point
    Unbounded {
        /// First sequence, inclusive
        from: u32,
    },
}

impl LedgerRange {
    /// Bounded range constructor
    pub fn bounded(from: u32, to: u32) -> Self {
        LedgerRange::Bounded { from, to }
    }

    /// Unbounded range constructor
    pub fn unbounded(from: u32) -> Self {
        LedgerRange::Unbounded { from }
    }

    /// First sequence of the range
    pub fn from(&self) -> u32 {
        match self {
            LedgerRange::Bounded { from, .. } | LedgerRange::Unbounded { from } => *from,
        }
    }

    /// Whether the range contains a sequence
    pub fn contains(&self, sequence: u32) -> bool {
        match self {
            LedgerRange::Bounded { from, to } => sequence >= *from && sequence <= *to,
            LedgerRange::Unbounded { from } => sequence >= *from,
        }
    }
}

/// Uniform blocking-fetch contract over metadata sources
///
/// Sequences must be requested in non-decreasing order; `prepare_range` may
/// be called once per session; `close` is idempotent.
#[async_trait]
pub trait LedgerBackend: Send {
    /// Declare the range this session intends to read; may trigger
    /// background catch-up work
    async fn prepare_range(&mut self, range: LedgerRange) -> Result<()>;

    /// Block until the metadata for `sequence` is available
    async fn get_ledger(&mut self, sequence: u32) -> Result<LedgerCloseMeta>;

    /// Release all underlying resources; safe to call multiple times
    async fn close(&mut self) -> Result<()>;
}

/// Request-ordering state shared by all backend implementations
#[derive(Debug, Default)]
pub(crate) struct RequestGuard {
    prepared: Option<LedgerRange>,
    last_requested: Option<u32>,
    closed: bool,
}

impl RequestGuard {
    pub(crate) fn prepare(&mut self, range: LedgerRange) -> Result<()> {
        if self.closed {
            return Err(BackendError::Closed.into());
        }
        if let Some(existing) = self.prepared {
            if existing == range {
                // Idempotent re-prepare of the identical range
                return Ok(());
            }
            return Err(BackendError::AlreadyPrepared(existing).into());
        }
        self.prepared = Some(range);
        Ok(())
    }

    pub(crate) fn check_request(&mut self, sequence: u32) -> Result<LedgerRange> {
        if self.closed {
            return Err(BackendError::Closed.into());
        }
        let range = self.prepared.ok_or(BackendError::NotPrepared)?;
        if !range.contains(sequence) {
            return Err(BackendError::OutsidePreparedRange { sequence, range }.into());
        }
        if let Some(last) = self.last_requested {
            if sequence < last {
                return Err(crate::error::OrderingError::OutOfOrderRequest {
                    last,
                    requested: sequence,
                }
                .into());
            }
        }
        self.last_requested = Some(sequence);
        Ok(range)
    }

    pub(crate) fn close(&mut self) -> bool {
        let was_closed = self.closed;
        self.closed = true;
        !was_closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let bounded = LedgerRange::bounded(5, 10);
        assert!(bounded.contains(5));
        assert!(bounded.contains(10));
        assert!(!bounded.contains(4));
        assert!(!bounded.contains(11));

        let unbounded = LedgerRange::unbounded(5);
        assert!(unbounded.contains(u32::MAX));
        assert!(!unbounded.contains(4));
    }

    #[test]
    fn test_guard_requires_prepare() {
        let mut guard = RequestGuard::default();
        assert!(guard.check_request(5).is_err());

        guard.prepare(LedgerRange::unbounded(5)).unwrap();
        assert!(guard.check_request(5).is_ok());
    }

    #[test]
    fn test_guard_rejects_reprepare_with_different_range() {
        let mut guard = RequestGuard::default();
        guard.prepare(LedgerRange::unbounded(5)).unwrap();
        // Same range is idempotent
        assert!(guard.prepare(LedgerRange::unbounded(5)).is_ok());
        assert!(guard.prepare(LedgerRange::unbounded(6)).is_err());
    }

    #[test]
    fn test_guard_rejects_out_of_order() {
        let mut guard = RequestGuard::default();
        guard.prepare(LedgerRange::unbounded(1)).unwrap();
        guard.check_request(5).unwrap();
        // Non-decreasing is allowed
        assert!(guard.check_request(5).is_ok());
        assert!(matches!(
            guard.check_request(4),
            Err(crate::Error::Ordering(_))
        ));
    }

    #[test]
    fn test_guard_close_is_idempotent() {
        let mut guard = RequestGuard::default();
        assert!(guard.close());
        assert!(!guard.close());
        assert!(matches!(
            guard.prepare(LedgerRange::unbounded(1)),
            Err(crate::Error::Backend(BackendError::Closed))
        ));
    }
}
