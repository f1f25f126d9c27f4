use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use kestrel_indexdb::{AtomicFileWriter, CommitRequest, IndexDb, IndexRecord, NO_TOKEN_CUTOFF};
use kestrel_types::{
    decode_metadata, encode_metadata, metadata_digest, Metadata, ObjectHash, Timestamp,
    CONTENT_LENGTH, X_TIMESTAMP,
};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::copy::{copy_exact, copy_to_all};
use crate::error::{EngineError, EngineResult};
use crate::traits::Object;

/// Where a handle's payload bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Payload {
    /// Not loaded yet.
    Unknown,
    /// Published payload file; empty for tombstones without data.
    File(PathBuf),
    /// Synthetic partition listing held in memory.
    Listing(Vec<u8>),
}

/// Object handle backed by a device's index database.
///
/// Created per request by [`IndexDbEngine`](crate::IndexDbEngine). The record
/// is loaded lazily on first read and never reloaded; a handle may observe a
/// stale record if another writer commits in between.
pub struct IndexDbObject {
    index_db: Arc<dyn IndexDb>,
    hash: ObjectHash,
    tracker: Option<TaskTracker>,
    loaded: bool,
    timestamp: i64,
    deletion: bool,
    metadata: Metadata,
    payload: Payload,
    writer: Option<Box<dyn AtomicFileWriter>>,
}

impl IndexDbObject {
    /// An unloaded handle for `hash`.
    pub fn new(index_db: Arc<dyn IndexDb>, hash: ObjectHash, tracker: Option<TaskTracker>) -> Self {
        Self {
            index_db,
            hash,
            tracker,
            loaded: false,
            timestamp: 0,
            deletion: false,
            metadata: Metadata::new(),
            payload: Payload::Unknown,
            writer: None,
        }
    }

    /// A preloaded, read-only handle listing `records` of ring `partition`.
    ///
    /// The payload is the partition number on the first line followed by one
    /// line per record; the metadata carries only a fresh `X-Timestamp` and
    /// the payload's `Content-Length`.
    pub fn listing(
        index_db: Arc<dyn IndexDb>,
        hash: ObjectHash,
        partition: u32,
        records: &[IndexRecord],
        tracker: Option<TaskTracker>,
    ) -> Self {
        let mut body = format!("{partition}\n");
        for record in records {
            body.push_str(&record.to_string());
            body.push('\n');
        }
        let body = body.into_bytes();
        let now = Timestamp::now();
        let metadata = Metadata::from([
            (X_TIMESTAMP.to_string(), now.canonical()),
            (CONTENT_LENGTH.to_string(), body.len().to_string()),
        ]);
        Self {
            index_db,
            hash,
            tracker,
            loaded: true,
            timestamp: now.as_nanos(),
            deletion: false,
            metadata,
            payload: Payload::Listing(body),
            writer: None,
        }
    }

    /// Identity of this object.
    pub fn hash(&self) -> &ObjectHash {
        &self.hash
    }

    /// Whether the record has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether a staged payload is pending on this handle.
    pub fn has_pending_writer(&self) -> bool {
        self.writer.is_some()
    }

    fn is_listing(&self) -> bool {
        matches!(self.payload, Payload::Listing(_))
    }

    fn load(&mut self) -> EngineResult<()> {
        if self.loaded {
            return Ok(());
        }
        let record = self
            .index_db
            .lookup(&self.hash, 0)?
            .ok_or(EngineError::NotFound { hash: self.hash })?;
        let metadata = decode_metadata(record.metadata_bytes())?;

        self.timestamp = record.timestamp;
        self.deletion = record.deletion;
        self.metadata = metadata;
        self.payload = Payload::File(record.path);
        self.loaded = true;
        debug!(hash = %self.hash, timestamp = self.timestamp, deletion = self.deletion, "loaded record");
        Ok(())
    }

    fn open_payload(&self) -> EngineResult<File> {
        match &self.payload {
            Payload::File(path) if !path.as_os_str().is_empty() => Ok(File::open(path)?),
            _ => Err(EngineError::NotFound { hash: self.hash }),
        }
    }

    fn abandon_writer(&mut self) -> EngineResult<()> {
        match self.writer.take() {
            Some(writer) => Ok(writer.abandon()?),
            None => Ok(()),
        }
    }

    /// Shared body of commit, commit_metadata and delete.
    fn commit_with(&mut self, metadata: &Metadata, deletion: bool) -> EngineResult<()> {
        if self.is_listing() {
            return Err(EngineError::ReadOnlyListing);
        }
        // The pending writer is consumed by this attempt whatever the outcome.
        let writer = self.writer.take();

        let prepared = prepare_commit(metadata, deletion || writer.is_some());
        let (timestamp, encoded) = match prepared {
            Ok(p) => p,
            Err(e) => {
                if let Some(w) = writer {
                    if let Err(abandon_err) = w.abandon() {
                        warn!(hash = %self.hash, error = %abandon_err, "failed to abandon writer");
                    }
                }
                return Err(e);
            }
        };

        self.index_db.commit(CommitRequest {
            writer,
            hash: self.hash,
            shard: 0,
            timestamp,
            deletion,
            metahash: metadata_digest(metadata),
            metadata: encoded,
        })?;
        debug!(hash = %self.hash, timestamp, deletion, "commit forwarded");
        Ok(())
    }
}

/// Validate the timestamp (when required) and serialize the metadata.
fn prepare_commit(metadata: &Metadata, needs_timestamp: bool) -> EngineResult<(i64, Vec<u8>)> {
    let mut timestamp = 0;
    if needs_timestamp {
        let raw = metadata
            .get(X_TIMESTAMP)
            .ok_or(EngineError::MissingTimestamp)?;
        timestamp = Timestamp::parse(raw)?.as_nanos();
    }
    Ok((timestamp, encode_metadata(metadata)?))
}

impl Object for IndexDbObject {
    fn try_metadata(&mut self) -> EngineResult<&Metadata> {
        self.load()?;
        Ok(&self.metadata)
    }

    fn try_content_length(&mut self) -> EngineResult<i64> {
        self.load()?;
        Ok(self
            .metadata
            .get(CONTENT_LENGTH)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(-1))
    }

    fn try_exists(&mut self) -> EngineResult<bool> {
        self.load()?;
        Ok(!self.deletion)
    }

    fn copy(&mut self, dsts: &mut [&mut dyn Write]) -> EngineResult<u64> {
        self.load()?;
        if let Payload::Listing(body) = &self.payload {
            return Ok(copy_to_all(&mut body.as_slice(), dsts)?);
        }
        // The file closes when it goes out of scope on every path.
        let mut file = self.open_payload()?;
        Ok(copy_to_all(&mut file, dsts)?)
    }

    fn copy_range(&mut self, dst: &mut dyn Write, start: u64, end: u64) -> EngineResult<u64> {
        if self.is_listing() {
            return Err(EngineError::ReadOnlyListing);
        }
        if end < start {
            return Err(EngineError::InvalidRange { start, end });
        }
        self.load()?;
        let mut file = self.open_payload()?;
        file.seek(SeekFrom::Start(start))?;
        Ok(copy_exact(&mut file, end - start, dst)?)
    }

    fn set_data(&mut self, expected_size: i64) -> EngineResult<&mut dyn Write> {
        if self.is_listing() {
            return Err(EngineError::ReadOnlyListing);
        }
        if let Some(previous) = self.writer.take() {
            if let Err(e) = previous.abandon() {
                warn!(hash = %self.hash, error = %e, "failed to abandon previous writer");
            }
        }
        let writer = self
            .index_db
            .temp_file(&self.hash, 0, NO_TOKEN_CUTOFF, expected_size)?;
        Ok(self.writer.insert(writer))
    }

    fn commit(&mut self, metadata: &Metadata) -> EngineResult<()> {
        self.commit_with(metadata, false)
    }

    fn commit_metadata(&mut self, metadata: &Metadata) -> EngineResult<()> {
        self.commit_with(metadata, false)
    }

    fn delete(&mut self, metadata: &Metadata) -> EngineResult<()> {
        self.commit_with(metadata, true)
    }

    fn close(&mut self) -> EngineResult<()> {
        self.abandon_writer()
    }

    fn quarantine(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn repr(&self) -> String {
        format!("IndexDbObject<{}, {}>", self.hash, self.timestamp)
    }

    fn tracker(&self) -> Option<&TaskTracker> {
        self.tracker.as_ref()
    }
}

impl std::fmt::Debug for IndexDbObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDbObject")
            .field("hash", &self.hash)
            .field("loaded", &self.loaded)
            .field("timestamp", &self.timestamp)
            .field("deletion", &self.deletion)
            .field("payload", &self.payload)
            .field("pending_writer", &self.writer.is_some())
            .finish()
    }
}
