use std::path::PathBuf;

use kestrel_types::{ObjectHash, TypeError};

/// Errors from index database operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexDbError {
    /// No record exists for the hash.
    #[error("no index record for {hash} (shard {shard})")]
    NotFound { hash: ObjectHash, shard: u32 },

    /// The stored record is already at or beyond the writer's token.
    #[error("record for {hash} at {stored} supersedes token {token}")]
    Superseded {
        hash: ObjectHash,
        stored: i64,
        token: i64,
    },

    /// Writing the payload would eat into the configured free-space reserve.
    #[error("insufficient space on {path:?}: {available} bytes available, {needed} needed")]
    InsufficientSpace {
        path: PathBuf,
        available: u64,
        needed: u64,
    },

    /// Invalid construction parameters.
    #[error("invalid index database configuration: {0}")]
    InvalidConfig(String),

    /// A shard file on disk could not be decoded.
    #[error("corrupt shard file {path:?}: {reason}")]
    CorruptShard { path: PathBuf, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Identity or partition error.
    #[error(transparent)]
    Types(#[from] TypeError),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for index database operations.
pub type IndexDbResult<T> = Result<T, IndexDbError>;
