//! Error types for ledger metadata decoding

use thiserror::Error;

/// Result type for metadata operations
pub type Result<T> = std::result::Result<T, MetaError>;

/// Metadata decoding errors
#[derive(Error, Debug)]
pub enum MetaError {
    /// Binary (de)serialization failed
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Frame length prefix exceeds the hard maximum
    #[error("Frame of {len} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Declared frame length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Stream ended in the middle of a frame
    #[error("Truncated frame: stream ended mid-record")]
    TruncatedFrame,

    /// A change with neither a pre nor a post image
    #[error("Invalid change: pre and post are both absent")]
    EmptyChange,

    /// Transaction records out of index order
    #[error("Transaction index {found} out of order in ledger {sequence} (expected {expected})")]
    TransactionOrder {
        /// Ledger the record belongs to
        sequence: u32,
        /// Index expected next
        expected: u32,
        /// Index actually found
        found: u32,
    },

    /// IO error while reading the stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
