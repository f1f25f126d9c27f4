use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use kestrel_types::{decode_metadata, ObjectHash, Timestamp, X_TIMESTAMP};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{IndexDbError, IndexDbResult};
use crate::record::{CommitRequest, IndexRecord};
use crate::space::check_reserve;
use crate::traits::{AtomicFileWriter, IndexDb, NO_TOKEN_CUTOFF};
use crate::writer::TempFileWriter;

/// Largest supported `db_part_power`; each shard is one file on disk.
const MAX_DB_PART_POWER: u32 = 16;

type Shard = BTreeMap<(ObjectHash, u32), IndexRecord>;

/// Construction parameters for a [`FileIndexDb`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileIndexDbConfig {
    /// Directory holding the shard files.
    pub db_path: PathBuf,
    /// Directory payload files are published under.
    pub file_path: PathBuf,
    /// Directory temporary files are staged in.
    pub temp_path: PathBuf,
    /// Leading hash bits that select a ring partition.
    pub ring_part_power: u32,
    /// Leading hash bits that select an index shard.
    pub db_part_power: u32,
    /// Number of payload subdirectories.
    pub subdirs: u32,
    /// Bytes that must stay free after staging a payload.
    pub fallocate_reserve: u64,
}

/// File-backed index database for one device.
///
/// Records live in `2^db_part_power` shards, each guarded by its own lock and
/// persisted as a JSON file that is atomically rewritten on every change.
/// Payloads are published to `file_path/<subdir>/<hash>.<timestamp>.data`.
pub struct FileIndexDb {
    config: FileIndexDbConfig,
    shards: Vec<RwLock<Shard>>,
}

impl FileIndexDb {
    /// Open (or create) the index database described by `config`.
    pub fn open(config: FileIndexDbConfig) -> IndexDbResult<Self> {
        if config.ring_part_power > 32 {
            return Err(IndexDbError::InvalidConfig(format!(
                "ring part power {} exceeds 32",
                config.ring_part_power
            )));
        }
        if config.db_part_power > config.ring_part_power {
            return Err(IndexDbError::InvalidConfig(format!(
                "db_part_power {} exceeds ring part power {}",
                config.db_part_power, config.ring_part_power
            )));
        }
        if config.db_part_power > MAX_DB_PART_POWER {
            return Err(IndexDbError::InvalidConfig(format!(
                "db_part_power {} exceeds {MAX_DB_PART_POWER}",
                config.db_part_power
            )));
        }
        if config.subdirs == 0 {
            return Err(IndexDbError::InvalidConfig("subdirs must be at least 1".into()));
        }

        fs::create_dir_all(&config.db_path)?;
        fs::create_dir_all(&config.file_path)?;
        fs::create_dir_all(&config.temp_path)?;

        let count = 1usize << config.db_part_power;
        let mut shards = Vec::with_capacity(count);
        let mut total = 0;
        for idx in 0..count {
            let shard = load_shard(&shard_file(&config.db_path, idx))?;
            total += shard.len();
            shards.push(RwLock::new(shard));
        }

        info!(
            db = ?config.db_path,
            shards = count,
            records = total,
            "opened index database"
        );
        Ok(Self { config, shards })
    }

    /// Where the payload for `hash` committed at `timestamp` is published.
    pub fn payload_path(&self, hash: &ObjectHash, timestamp: i64) -> PathBuf {
        let subdir = hash.upper_u32() % self.config.subdirs;
        self.config
            .file_path
            .join(format!("{subdir:02x}"))
            .join(format!("{hash}.{timestamp:019}.data"))
    }

    /// Total number of records across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().expect("index shard lock poisoned").len())
            .sum()
    }

    /// Returns `true` if no record has been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_index(&self, hash: &ObjectHash) -> IndexDbResult<usize> {
        Ok(hash.partition(self.config.db_part_power)? as usize)
    }

    fn persist_shard(&self, idx: usize, shard: &Shard) -> IndexDbResult<()> {
        let records: Vec<&IndexRecord> = shard.values().collect();
        let mut tmp = NamedTempFile::new_in(&self.config.db_path)?;
        serde_json::to_writer(&mut tmp, &records)
            .map_err(|e| IndexDbError::Serialization(e.to_string()))?;
        tmp.as_file().sync_all()?;
        tmp.persist(shard_file(&self.config.db_path, idx))
            .map_err(|e| IndexDbError::Io(e.error))?;
        Ok(())
    }
}

impl IndexDb for FileIndexDb {
    fn ring_part_power(&self) -> u32 {
        self.config.ring_part_power
    }

    fn lookup(&self, hash: &ObjectHash, shard: u32) -> IndexDbResult<Option<IndexRecord>> {
        let idx = self.shard_index(hash)?;
        let records = self.shards[idx].read().expect("index shard lock poisoned");
        Ok(records.get(&(*hash, shard)).cloned())
    }

    fn list(&self, partition: u32) -> IndexDbResult<Vec<IndexRecord>> {
        let shift = self.config.ring_part_power - self.config.db_part_power;
        let idx = (u64::from(partition) >> shift) as usize;
        let Some(lock) = self.shards.get(idx) else {
            return Ok(Vec::new());
        };
        let records = lock.read().expect("index shard lock poisoned");
        let mut out = Vec::new();
        for record in records.values() {
            if record.hash.partition(self.config.ring_part_power)? == partition {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    fn temp_file(
        &self,
        hash: &ObjectHash,
        shard: u32,
        max_token: i64,
        expected_size: i64,
    ) -> IndexDbResult<Box<dyn AtomicFileWriter>> {
        if max_token != NO_TOKEN_CUTOFF {
            if let Some(record) = self.lookup(hash, shard)? {
                if record.timestamp >= max_token {
                    return Err(IndexDbError::Superseded {
                        hash: *hash,
                        stored: record.timestamp,
                        token: max_token,
                    });
                }
            }
        }
        check_reserve(
            &self.config.temp_path,
            expected_size,
            self.config.fallocate_reserve,
        )?;
        Ok(Box::new(TempFileWriter::create_in(
            &self.config.temp_path,
            hash,
        )?))
    }

    fn commit(&self, request: CommitRequest) -> IndexDbResult<()> {
        let CommitRequest {
            writer,
            hash,
            shard,
            timestamp,
            deletion,
            metahash,
            metadata,
        } = request;
        let metadata = match String::from_utf8(metadata) {
            Ok(m) => m,
            Err(e) => {
                if let Some(w) = writer {
                    w.abandon()?;
                }
                return Err(IndexDbError::Serialization(e.to_string()));
            }
        };

        let idx = self.shard_index(&hash)?;
        let key = (hash, shard);
        let mut records = self.shards[idx].write().expect("index shard lock poisoned");
        let previous = records.get(&key).cloned();

        // Metadata-only update: keep timestamp and payload, order by X-Timestamp.
        if writer.is_none() && !deletion {
            let Some(mut record) = previous.clone() else {
                return Err(IndexDbError::NotFound { hash, shard });
            };
            if let Some(incoming) = metadata_timestamp(&metadata)? {
                if incoming <= record.meta_timestamp {
                    warn!(
                        hash = %hash,
                        stored = record.meta_timestamp,
                        incoming,
                        "ignoring metadata update not newer than stored metadata"
                    );
                    return Ok(());
                }
                record.meta_timestamp = incoming;
            }
            record.metahash = metahash;
            record.metadata = metadata;
            records.insert(key, record);
            if let Err(e) = self.persist_shard(idx, &records) {
                if let Some(prev) = previous {
                    records.insert(key, prev);
                }
                return Err(e);
            }
            debug!(hash = %hash, "updated metadata");
            return Ok(());
        }

        if let Some(prev) = &previous {
            if timestamp <= prev.timestamp {
                warn!(
                    hash = %hash,
                    stored = prev.timestamp,
                    incoming = timestamp,
                    "ignoring commit not newer than stored record"
                );
                if let Some(w) = writer {
                    w.abandon()?;
                }
                return Ok(());
            }
        }

        let path = match writer {
            Some(w) => {
                let dest = self.payload_path(&hash, timestamp);
                w.publish(&dest)?;
                dest
            }
            None => PathBuf::new(),
        };
        records.insert(
            key,
            IndexRecord {
                hash,
                shard,
                timestamp,
                deletion,
                meta_timestamp: timestamp,
                metahash,
                metadata,
                path: path.clone(),
            },
        );

        if let Err(e) = self.persist_shard(idx, &records) {
            match previous {
                Some(prev) => {
                    records.insert(key, prev);
                }
                None => {
                    records.remove(&key);
                }
            }
            remove_payload(&path);
            return Err(e);
        }

        if let Some(prev) = previous {
            if prev.path != path {
                remove_payload(&prev.path);
            }
        }
        debug!(hash = %hash, timestamp, deletion, "committed record");
        Ok(())
    }

    fn reclaim(&self, cutoff: Timestamp) -> IndexDbResult<usize> {
        let mut removed = 0;
        for (idx, lock) in self.shards.iter().enumerate() {
            let mut records = lock.write().expect("index shard lock poisoned");
            let expired: Vec<_> = records
                .iter()
                .filter(|(_, r)| r.deletion && r.timestamp < cutoff.as_nanos())
                .map(|(k, _)| *k)
                .collect();
            if expired.is_empty() {
                continue;
            }

            let purged: Vec<IndexRecord> = expired
                .iter()
                .filter_map(|k| records.remove(k))
                .collect();
            if let Err(e) = self.persist_shard(idx, &records) {
                for record in purged {
                    records.insert((record.hash, record.shard), record);
                }
                return Err(e);
            }
            for record in &purged {
                remove_payload(&record.path);
            }
            removed += purged.len();
        }
        if removed > 0 {
            info!(db = ?self.config.db_path, removed, "reclaimed tombstones");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for FileIndexDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIndexDb")
            .field("db_path", &self.config.db_path)
            .field("shards", &self.shards.len())
            .finish()
    }
}

fn shard_file(db_path: &Path, idx: usize) -> PathBuf {
    db_path.join(format!("index-{idx:04}.json"))
}

fn load_shard(path: &Path) -> IndexDbResult<Shard> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Shard::new()),
        Err(e) => return Err(e.into()),
    };
    let records: Vec<IndexRecord> =
        serde_json::from_slice(&bytes).map_err(|e| IndexDbError::CorruptShard {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(records
        .into_iter()
        .map(|mut r| {
            // Shards written before metadata ordering existed.
            if r.meta_timestamp == 0 {
                r.meta_timestamp = r.timestamp;
            }
            ((r.hash, r.shard), r)
        })
        .collect())
}

/// The `X-Timestamp` carried in serialized metadata, in nanoseconds.
fn metadata_timestamp(metadata: &str) -> IndexDbResult<Option<i64>> {
    let decoded = decode_metadata(metadata.as_bytes())?;
    let parsed = decoded
        .get(X_TIMESTAMP)
        .map(|raw| Timestamp::parse(raw))
        .transpose()?;
    Ok(parsed.map(|ts| ts.as_nanos()))
}

fn remove_payload(path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?path, error = %e, "failed to remove payload"),
    }
}
