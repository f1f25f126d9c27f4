//! Foundation types for the Kestrel object server.
//!
//! Every other Kestrel crate depends on `kestrel-types`. Nothing here touches
//! the filesystem; these are the pure building blocks of the storage layer.
//!
//! # Key Types
//!
//! - [`ObjectHash`]: 32-hex-character identity of a stored object
//! - [`ObjectVars`]: identifying variables a request supplies (device, account, ...)
//! - [`Timestamp`]: nanosecond epoch timestamp with canonical text form
//! - [`Metadata`]: string-to-string attribute bag with a JSON codec and digest
//!
//! # Addressing
//!
//! [`derive_hash`] maps identifying variables onto an [`ObjectHash`];
//! [`partition_of`] maps a hash onto a ring partition using its leading bits;
//! [`ring_part_power`] computes how many bits a ring of a given size needs.

pub mod error;
pub mod hash;
pub mod metadata;
pub mod timestamp;
pub mod vars;

pub use error::{TypeError, TypeResult};
pub use hash::{derive_hash, partition_of, ring_part_power, ObjectHash, HASH_HEX_LEN};
pub use metadata::{
    decode_metadata, encode_metadata, metadata_digest, Metadata, CONTENT_LENGTH, X_TIMESTAMP,
};
pub use timestamp::Timestamp;
pub use vars::ObjectVars;
