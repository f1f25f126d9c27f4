//! Index database for Kestrel storage devices.
//!
//! The index database maps each object hash to its latest committed record:
//! timestamp, deletion flag, metadata digest, serialized metadata and the
//! path of the payload file. Payloads are staged through an
//! [`AtomicFileWriter`] and only become visible when committed.
//!
//! # Backends
//!
//! All backends implement the [`IndexDb`] trait:
//!
//! - [`FileIndexDb`] -- sharded records persisted as JSON, payload files on disk
//!
//! # Rules
//!
//! 1. Last writer wins: a data commit or delete whose timestamp is not newer
//!    than the stored record is ignored and its staged payload discarded.
//! 2. A staged payload is never visible until its commit is accepted.
//! 3. Records and payloads belonging to a partition can be listed.
//! 4. All I/O errors are propagated to the caller.

pub mod error;
pub mod file;
pub mod record;
pub mod space;
pub mod traits;
pub mod writer;

pub use error::{IndexDbError, IndexDbResult};
pub use file::{FileIndexDb, FileIndexDbConfig};
pub use record::{CommitRequest, IndexRecord};
pub use traits::{AtomicFileWriter, IndexDb, NO_TOKEN_CUTOFF};
pub use writer::TempFileWriter;
