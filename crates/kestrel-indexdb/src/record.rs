use std::fmt;
use std::path::PathBuf;

use kestrel_types::ObjectHash;
use serde::{Deserialize, Serialize};

use crate::traits::AtomicFileWriter;

/// The latest committed state of one object in the index database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Identity of the object.
    pub hash: ObjectHash,
    /// Secondary index (always 0 for whole objects).
    pub shard: u32,
    /// Commit timestamp in nanoseconds since the epoch.
    pub timestamp: i64,
    /// Whether this record is a tombstone.
    pub deletion: bool,
    /// `X-Timestamp` of the newest accepted metadata, in nanoseconds.
    ///
    /// Set to `timestamp` by data commits and deletes, advanced by
    /// metadata-only updates.
    #[serde(default)]
    pub meta_timestamp: i64,
    /// Digest of the metadata map.
    #[serde(with = "hex")]
    pub metahash: [u8; 32],
    /// Metadata serialized as JSON.
    pub metadata: String,
    /// Payload file, empty for tombstones committed without data.
    pub path: PathBuf,
}

impl IndexRecord {
    /// The serialized metadata bytes.
    pub fn metadata_bytes(&self) -> &[u8] {
        self.metadata.as_bytes()
    }

    /// Returns `true` if the record carries a payload file.
    pub fn has_payload(&self) -> bool {
        !self.path.as_os_str().is_empty()
    }
}

impl fmt::Display for IndexRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.hash,
            self.timestamp,
            if self.deletion { "deleted" } else { "live" },
            self.path.display()
        )
    }
}

/// Everything the index database needs to apply one commit.
pub struct CommitRequest {
    /// Staged payload to publish, `None` for metadata-only updates and most deletes.
    pub writer: Option<Box<dyn AtomicFileWriter>>,
    pub hash: ObjectHash,
    pub shard: u32,
    /// Nanoseconds since the epoch; 0 when the commit carries no timestamp.
    pub timestamp: i64,
    pub deletion: bool,
    pub metahash: [u8; 32],
    /// Metadata serialized as JSON.
    pub metadata: Vec<u8>,
}

impl fmt::Debug for CommitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitRequest")
            .field("writer", &self.writer.as_ref().map(|w| w.temp_path().to_path_buf()))
            .field("hash", &self.hash)
            .field("shard", &self.shard)
            .field("timestamp", &self.timestamp)
            .field("deletion", &self.deletion)
            .field("metadata_len", &self.metadata.len())
            .finish()
    }
}
