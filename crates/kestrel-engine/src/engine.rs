use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kestrel_indexdb::{FileIndexDb, FileIndexDbConfig, IndexDb};
use kestrel_types::{derive_hash, ObjectHash, ObjectVars, Timestamp};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::object::IndexDbObject;
use crate::traits::{Object, ObjectEngine};

/// Object engine with one index database per storage device.
///
/// The device map is fixed at construction and read-only afterwards, so the
/// engine can be shared across request threads behind an `Arc`.
pub struct IndexDbEngine {
    devices_path: PathBuf,
    prefix: String,
    suffix: String,
    reclaim_age: Duration,
    index_dbs: HashMap<String, Arc<dyn IndexDb>>,
}

impl IndexDbEngine {
    /// Discover devices under `config.devices` and open an index database
    /// for each one.
    ///
    /// Every directory directly below the devices root, or symlink to one, is
    /// a device; an entry that cannot be stat'ed fails the open. Index
    /// databases live under `dbs/<device>/<policy dir>` when `dbs` is set,
    /// otherwise beside the payloads in `<device>/<policy dir>`.
    pub fn open(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let policy_dir = config.policy.dir_name();
        let ring_part_power = config.ring_part_power();

        let mut index_dbs: HashMap<String, Arc<dyn IndexDb>> = HashMap::new();
        for entry in fs::read_dir(&config.devices)? {
            let entry = entry?;
            // Follows symlinks so linked device directories count.
            if !fs::metadata(entry.path())?.is_dir() {
                continue;
            }
            let Some(device) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = ?entry.path(), "skipping device with non-UTF-8 name");
                continue;
            };

            let file_path = entry.path().join(&policy_dir);
            let db_path = match &config.dbs {
                Some(dbs) => dbs.join(&device).join(&policy_dir),
                None => file_path.clone(),
            };
            let db = FileIndexDb::open(FileIndexDbConfig {
                db_path,
                temp_path: file_path.join("temp"),
                file_path,
                ring_part_power,
                db_part_power: config.policy.db_part_power,
                subdirs: config.policy.subdirs,
                fallocate_reserve: config.fallocate_reserve,
            })?;
            info!(device = %device, policy = config.policy.index, "registered device");
            index_dbs.insert(device, Arc::new(db));
        }

        if index_dbs.is_empty() {
            warn!(devices = ?config.devices, "no devices found");
        }
        Ok(Self::with_index_dbs(config, index_dbs))
    }

    /// Build an engine over index databases supplied by the caller.
    pub fn with_index_dbs(
        config: &EngineConfig,
        index_dbs: HashMap<String, Arc<dyn IndexDb>>,
    ) -> Self {
        Self {
            devices_path: config.devices.clone(),
            prefix: config.hash_path_prefix.clone(),
            suffix: config.hash_path_suffix.clone(),
            reclaim_age: config.reclaim_age(),
            index_dbs,
        }
    }

    /// Index database for `device`, if this engine owns it.
    pub fn index_db(&self, device: &str) -> Option<&Arc<dyn IndexDb>> {
        self.index_dbs.get(device)
    }

    /// Names of all registered devices, sorted.
    pub fn devices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index_dbs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn device_db(&self, device: &str) -> &Arc<dyn IndexDb> {
        match self.index_dbs.get(device) {
            Some(db) => db,
            None => panic!("unknown device {device:?}: requests must be routed to a local device"),
        }
    }

    fn resolve(&self, vars: &ObjectVars) -> EngineResult<(Arc<dyn IndexDb>, ObjectHash)> {
        let db = Arc::clone(self.device_db(&vars.device));
        let hash = derive_hash(vars, &self.prefix, &self.suffix)?;
        Ok((db, hash))
    }
}

impl ObjectEngine for IndexDbEngine {
    fn new_object(
        &self,
        vars: &ObjectVars,
        _need_data: bool,
        tracker: Option<TaskTracker>,
    ) -> EngineResult<Box<dyn Object>> {
        let (db, hash) = self.resolve(vars)?;
        Ok(Box::new(IndexDbObject::new(db, hash, tracker)))
    }

    fn partition_listing(
        &self,
        vars: &ObjectVars,
        tracker: Option<TaskTracker>,
    ) -> EngineResult<Box<dyn Object>> {
        let (db, hash) = self.resolve(vars)?;
        let partition = hash.partition(db.ring_part_power())?;
        let records = db.list(partition)?;
        debug!(device = %vars.device, partition, records = records.len(), "partition listing");
        Ok(Box::new(IndexDbObject::listing(
            db, hash, partition, &records, tracker,
        )))
    }

    fn reclaim(&self) -> EngineResult<usize> {
        let age = i64::try_from(self.reclaim_age.as_nanos()).unwrap_or(i64::MAX);
        let cutoff = Timestamp::from_nanos(Timestamp::now().as_nanos().saturating_sub(age));
        let mut total = 0;
        for device in self.devices() {
            let removed = self.index_dbs[device].reclaim(cutoff)?;
            if removed > 0 {
                info!(device = %device, removed, "reclaimed tombstones");
            }
            total += removed;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for IndexDbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDbEngine")
            .field("devices_path", &self.devices_path)
            .field("devices", &self.devices())
            .field("reclaim_age", &self.reclaim_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use kestrel_types::{Metadata, CONTENT_LENGTH, X_TIMESTAMP};

    use crate::error::EngineError;

    fn setup(devices: &[&str]) -> (tempfile::TempDir, EngineConfig) {
        let dir = tempfile::tempdir().unwrap();
        for d in devices {
            fs::create_dir(dir.path().join(d)).unwrap();
        }
        fs::write(dir.path().join("not-a-device"), b"").unwrap();
        let config = EngineConfig {
            devices: dir.path().to_path_buf(),
            hash_path_suffix: "changeme".into(),
            ..Default::default()
        };
        (dir, config)
    }

    fn vars(device: &str, object: &str) -> ObjectVars {
        ObjectVars::new(device, "a", "c", object)
    }

    fn meta(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn put(engine: &IndexDbEngine, v: &ObjectVars, body: &[u8], ts: &str) {
        let mut obj = engine.new_object(v, true, None).unwrap();
        obj.set_data(body.len() as i64).unwrap().write_all(body).unwrap();
        let len = body.len().to_string();
        obj.commit(&meta(&[(X_TIMESTAMP, ts), (CONTENT_LENGTH, len.as_str())]))
            .unwrap();
        obj.close().unwrap();
    }

    #[test]
    fn discovers_only_directories() {
        let (dir, config) = setup(&["sda", "sdb"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        assert_eq!(engine.devices(), vec!["sda", "sdb"]);
        assert!(engine.index_db("not-a-device").is_none());
        assert!(dir.path().join("sda").join("objects").join("temp").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_device_is_discovered() {
        let (dir, config) = setup(&["sda"]);
        let target = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(target.path(), dir.path().join("sdb")).unwrap();

        let engine = IndexDbEngine::open(&config).unwrap();
        assert_eq!(engine.devices(), vec!["sda", "sdb"]);
        put(&engine, &vars("sdb", "linked"), b"via link", "1.0");
        assert!(engine.new_object(&vars("sdb", "linked"), true, None).unwrap().exists());
        assert!(target.path().join("objects").join("temp").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_device_link_fails_open() {
        let (dir, config) = setup(&["sda"]);
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("sdz")).unwrap();
        assert!(matches!(
            IndexDbEngine::open(&config),
            Err(EngineError::Io(_))
        ));
    }

    #[test]
    fn separate_db_root() {
        let (dir, mut config) = setup(&["sda"]);
        let dbs = tempfile::tempdir().unwrap();
        config.dbs = Some(dbs.path().to_path_buf());
        config.policy.index = 1;
        let engine = IndexDbEngine::open(&config).unwrap();
        put(&engine, &vars("sda", "o"), b"x", "1.0");
        assert!(dbs.path().join("sda").join("objects-1").join("index-0000.json").is_file());
        assert!(dir.path().join("sda").join("objects-1").join("temp").is_dir());
    }

    #[test]
    fn missing_devices_root_fails() {
        let config = EngineConfig {
            devices: PathBuf::from("/definitely/not/a/devices/root"),
            ..Default::default()
        };
        assert!(matches!(
            IndexDbEngine::open(&config),
            Err(EngineError::Io(_))
        ));
    }

    #[test]
    fn put_get_round_trip() {
        let (_dir, config) = setup(&["sda"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        let v = vars("sda", "photo.jpg");
        put(&engine, &v, b"pixels", "1500000000.00000");

        let mut obj = engine.new_object(&v, true, None).unwrap();
        let mut out = Vec::new();
        obj.copy(&mut [&mut out]).unwrap();
        assert_eq!(out, b"pixels");
        assert_eq!(obj.content_length(), 6);
        assert!(obj.repr().starts_with("IndexDbObject<"));

        // Same name on another device is a different store.
        let (_dir2, config2) = setup(&["sdb"]);
        let other = IndexDbEngine::open(&config2).unwrap();
        assert!(!other.new_object(&vars("sdb", "photo.jpg"), true, None).unwrap().exists());
    }

    #[test]
    fn delete_then_missing() {
        let (_dir, config) = setup(&["sda"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        let v = vars("sda", "gone");
        put(&engine, &v, b"bye", "1500000000.00000");

        let mut obj = engine.new_object(&v, false, None).unwrap();
        obj.delete(&meta(&[(X_TIMESTAMP, "1500000001.00000")]))
            .unwrap();
        assert!(!engine.new_object(&v, false, None).unwrap().exists());
    }

    #[test]
    fn raw_hash_addressing() {
        let (_dir, config) = setup(&["sda"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        let v = ObjectVars::with_hash("sda", "D41D8CD98F00B204E9800998ECF8427E");
        put(&engine, &v, b"raw", "1.0");
        let mut obj = engine
            .new_object(&ObjectVars::with_hash("sda", "d41d8cd98f00b204e9800998ecf8427e"), true, None)
            .unwrap();
        assert!(obj.exists());
    }

    #[test]
    fn malformed_hash_is_error() {
        let (_dir, config) = setup(&["sda"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        let err = engine
            .new_object(&ObjectVars::with_hash("sda", "abc"), true, None)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Types(_)));
    }

    #[test]
    #[should_panic(expected = "unknown device")]
    fn unknown_device_panics() {
        let (_dir, config) = setup(&["sda"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        let _ = engine.new_object(&vars("sdz", "o"), true, None);
    }

    #[test]
    fn empty_partition_listing() {
        let (_dir, config) = setup(&["sda"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        let v = vars("sda", "anything");
        let hash = derive_hash(&v, "", "changeme").unwrap();
        let partition = hash.partition(10).unwrap();

        let mut listing = engine.partition_listing(&v, None).unwrap();
        let mut out = Vec::new();
        listing.copy(&mut [&mut out]).unwrap();
        let expected = format!("{partition}\n");
        assert_eq!(out, expected.as_bytes());
        assert_eq!(listing.content_length(), expected.len() as i64);
        assert!(listing.metadata().unwrap().contains_key(X_TIMESTAMP));
    }

    #[test]
    fn listing_includes_stored_record() {
        let (_dir, config) = setup(&["sda"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        let v = vars("sda", "listed");
        put(&engine, &v, b"here", "1500000000.00000");
        let hash = derive_hash(&v, "", "changeme").unwrap();

        let mut listing = engine.partition_listing(&v, None).unwrap();
        let mut out = Vec::new();
        listing.copy(&mut [&mut out]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], hash.partition(10).unwrap().to_string());
        assert!(lines[1].starts_with(&format!("{hash} 1500000000000000000 live ")));
    }

    #[test]
    fn reclaim_keeps_recent_tombstones() {
        let (_dir, mut config) = setup(&["sda"]);
        config.reclaim_age = 3600;
        let engine = IndexDbEngine::open(&config).unwrap();

        let old = vars("sda", "old");
        let recent = vars("sda", "recent");
        engine
            .new_object(&old, false, None)
            .unwrap()
            .delete(&meta(&[(X_TIMESTAMP, "1000000000.00000")]))
            .unwrap();
        let now = Timestamp::now().canonical();
        engine
            .new_object(&recent, false, None)
            .unwrap()
            .delete(&meta(&[(X_TIMESTAMP, now.as_str())]))
            .unwrap();

        assert_eq!(engine.reclaim().unwrap(), 1);
        assert!(engine.new_object(&old, false, None).unwrap().try_exists().is_err());
        assert!(!engine.new_object(&recent, false, None).unwrap().try_exists().unwrap());
    }

    #[tokio::test]
    async fn tracker_reaches_handles() {
        let (_dir, config) = setup(&["sda"]);
        let engine = IndexDbEngine::open(&config).unwrap();
        let tracker = TaskTracker::new();

        let obj = engine
            .new_object(&vars("sda", "o"), true, Some(tracker.clone()))
            .unwrap();
        let listing = engine
            .partition_listing(&vars("sda", "o"), Some(tracker.clone()))
            .unwrap();
        obj.tracker().unwrap().spawn(async {});
        listing.tracker().unwrap().spawn(async {});
        tracker.close();
        tracker.wait().await;
        assert!(tracker.is_empty());
    }
}
