use kestrel_indexdb::IndexDbError;

use crate::copy::PartialCopy;
use kestrel_types::{ObjectHash, TypeError};
use thiserror::Error;

/// Errors from engine and object handle operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No record exists for the object.
    #[error("object not found: {hash}")]
    NotFound { hash: ObjectHash },

    /// A data commit or delete carried no `X-Timestamp`.
    #[error("no timestamp in metadata")]
    MissingTimestamp,

    /// The requested byte range is empty or inverted.
    #[error("invalid range {start}..{end}")]
    InvalidRange { start: u64, end: u64 },

    /// Write or range operation attempted on a synthetic partition listing.
    #[error("partition listings are read-only")]
    ReadOnlyListing,

    /// No engine registered under the configured name.
    #[error("unknown object engine {0:?}")]
    UnknownEngine(String),

    /// Invalid or unparseable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Identity, timestamp or metadata error.
    #[error(transparent)]
    Types(#[from] TypeError),

    /// Failure reported by the index database.
    #[error("index database error: {0}")]
    IndexDb(#[from] IndexDbError),

    /// Streaming a payload failed after `written` bytes were delivered.
    #[error(transparent)]
    PartialCopy(#[from] PartialCopy),

    /// I/O error while reading a payload or scanning devices.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
