use std::path::{Path, PathBuf};
use std::time::Duration;

use kestrel_types::ring_part_power;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::registry::INDEX_DB_ENGINE;

/// One week, the default tombstone reclaim age.
pub const ONE_WEEK_SECS: u64 = 7 * 24 * 60 * 60;

/// Object engine configuration, usually read from a TOML file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Registered engine name to construct.
    pub engine: String,
    /// Root directory holding one subdirectory per storage device.
    pub devices: PathBuf,
    /// Optional separate root for index databases.
    pub dbs: Option<PathBuf>,
    /// Bytes that must stay free on a device after staging a payload.
    pub fallocate_reserve: u64,
    /// Seconds a tombstone is kept before it may be purged.
    pub reclaim_age: u64,
    /// Salt prepended when deriving object identities.
    pub hash_path_prefix: String,
    /// Salt appended when deriving object identities.
    pub hash_path_suffix: String,
    /// Number of partitions in the object ring.
    pub partition_count: u64,
    /// Storage policy served by this engine.
    pub policy: PolicyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: INDEX_DB_ENGINE.to_string(),
            devices: PathBuf::from("/srv/node"),
            dbs: None,
            fallocate_reserve: 0,
            reclaim_age: ONE_WEEK_SECS,
            hash_path_prefix: String::new(),
            hash_path_suffix: String::new(),
            partition_count: 1024,
            policy: PolicyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> EngineResult<()> {
        if self.partition_count == 0 {
            return Err(EngineError::Config("partition_count must be at least 1".into()));
        }
        if self.policy.subdirs == 0 {
            return Err(EngineError::Config("subdirs must be at least 1".into()));
        }
        let rpp = self.ring_part_power();
        if self.policy.db_part_power > rpp {
            return Err(EngineError::Config(format!(
                "db_part_power {} exceeds ring part power {rpp}",
                self.policy.db_part_power
            )));
        }
        Ok(())
    }

    /// Leading hash bits needed to address every ring partition.
    pub fn ring_part_power(&self) -> u32 {
        ring_part_power(self.partition_count)
    }

    /// Tombstone reclaim age as a duration.
    pub fn reclaim_age(&self) -> Duration {
        Duration::from_secs(self.reclaim_age)
    }
}

/// Per-policy storage options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Policy index; selects the on-device directory.
    pub index: u32,
    /// Leading hash bits selecting an index database shard.
    pub db_part_power: u32,
    /// Number of payload subdirectories per device.
    pub subdirs: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            index: 0,
            db_part_power: 0,
            subdirs: 64,
        }
    }
}

impl PolicyConfig {
    /// Directory name this policy uses on each device.
    pub fn dir_name(&self) -> String {
        match self.index {
            0 => "objects".to_string(),
            n => format!("objects-{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = EngineConfig::default();
        assert_eq!(c.engine, "index.db");
        assert_eq!(c.devices, PathBuf::from("/srv/node"));
        assert!(c.dbs.is_none());
        assert_eq!(c.fallocate_reserve, 0);
        assert_eq!(c.reclaim_age(), Duration::from_secs(604_800));
        assert_eq!(c.policy.db_part_power, 0);
        assert_eq!(c.policy.subdirs, 64);
        assert_eq!(c.ring_part_power(), 10);
    }

    #[test]
    fn parse_toml_with_policy() {
        let c = EngineConfig::from_toml_str(
            r#"
            devices = "/mnt/disks"
            dbs = "/mnt/ssd"
            fallocate_reserve = 1048576
            hash_path_suffix = "changeme"
            partition_count = 256

            [policy]
            index = 2
            db_part_power = 4
            "#,
        )
        .unwrap();
        assert_eq!(c.devices, PathBuf::from("/mnt/disks"));
        assert_eq!(c.dbs, Some(PathBuf::from("/mnt/ssd")));
        assert_eq!(c.fallocate_reserve, 1_048_576);
        assert_eq!(c.reclaim_age, ONE_WEEK_SECS);
        assert_eq!(c.ring_part_power(), 8);
        assert_eq!(c.policy.db_part_power, 4);
        assert_eq!(c.policy.subdirs, 64);
        assert_eq!(c.policy.dir_name(), "objects-2");
    }

    #[test]
    fn unparseable_numbers_are_config_errors() {
        let err = EngineConfig::from_toml_str("[policy]\ndb_part_power = \"lots\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        let err = EngineConfig::from_toml_str("reclaim_age = -1").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn validate_rejects_oversized_db_part_power() {
        let err =
            EngineConfig::from_toml_str("partition_count = 4\n[policy]\ndb_part_power = 3")
                .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn validate_rejects_zero_counts() {
        assert!(EngineConfig::from_toml_str("partition_count = 0").is_err());
        assert!(EngineConfig::from_toml_str("[policy]\nsubdirs = 0").is_err());
    }

    #[test]
    fn policy_zero_dir() {
        assert_eq!(PolicyConfig::default().dir_name(), "objects");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = EngineConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
