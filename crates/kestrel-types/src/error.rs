use thiserror::Error;

/// Errors produced by addressing, timestamp and metadata operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hash {hash:?}; length was {actual} not 32")]
    InvalidHashLength { hash: String, actual: usize },

    #[error("invalid hash {hash:?}; decoding error: {reason}")]
    InvalidHex { hash: String, reason: String },

    #[error("cannot derive object identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid ring part power {0}; must be at most 32")]
    InvalidPartPower(u32),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("metadata serialization error: {0}")]
    Serialization(String),
}

/// Result alias for type-level operations.
pub type TypeResult<T> = Result<T, TypeError>;
