use std::io::Write;
use std::path::Path;

use kestrel_types::{ObjectHash, Timestamp};

use crate::error::IndexDbResult;
use crate::record::{CommitRequest, IndexRecord};

/// Token passed to [`IndexDb::temp_file`] meaning "no externally imposed cutoff".
pub const NO_TOKEN_CUTOFF: i64 = i64::MAX;

/// A staged payload that only becomes visible once published.
///
/// Exactly one owner holds a writer at a time. It must end in either
/// [`publish`](Self::publish) (done by the index database on commit) or
/// [`abandon`](Self::abandon); abandoning leaves no file behind.
pub trait AtomicFileWriter: Write + Send {
    /// Location of the staged temporary file.
    fn temp_path(&self) -> &Path;

    /// Number of payload bytes written so far.
    fn bytes_written(&self) -> u64;

    /// Durably move the staged file to `dest`.
    fn publish(self: Box<Self>, dest: &Path) -> IndexDbResult<()>;

    /// Discard the staged file.
    fn abandon(self: Box<Self>) -> IndexDbResult<()>;
}

/// Index database backing one storage device.
///
/// Implementations must be thread-safe and must serialize commits for the
/// same hash. Ordering is the store's responsibility: callers forward every
/// commit and never compare timestamps themselves.
pub trait IndexDb: Send + Sync {
    /// Number of leading hash bits that select a ring partition.
    fn ring_part_power(&self) -> u32;

    /// Fetch the record for `hash`.
    ///
    /// Returns `Ok(None)` if nothing was ever committed for it.
    fn lookup(&self, hash: &ObjectHash, shard: u32) -> IndexDbResult<Option<IndexRecord>>;

    /// All records whose hash falls in ring `partition`.
    fn list(&self, partition: u32) -> IndexDbResult<Vec<IndexRecord>>;

    /// Stage a new payload for `hash`.
    ///
    /// `max_token` rejects the write when the stored record is already at or
    /// beyond it; pass [`NO_TOKEN_CUTOFF`] for no cutoff. `expected_size` is
    /// used to check the free-space reserve (negative means unknown).
    fn temp_file(
        &self,
        hash: &ObjectHash,
        shard: u32,
        max_token: i64,
        expected_size: i64,
    ) -> IndexDbResult<Box<dyn AtomicFileWriter>>;

    /// Apply a commit, publishing its writer if it carries one.
    fn commit(&self, request: CommitRequest) -> IndexDbResult<()>;

    /// Purge tombstones committed before `cutoff`. Returns how many were removed.
    fn reclaim(&self, cutoff: Timestamp) -> IndexDbResult<usize>;
}
