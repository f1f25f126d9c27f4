//! Free-space reserve checks for staged payloads.

use std::path::Path;

use sysinfo::Disks;
use tracing::debug;

use crate::error::{IndexDbError, IndexDbResult};

/// Ensure writing `expected_size` bytes under `dir` keeps at least `reserve`
/// bytes free on the disk that holds it.
///
/// A zero reserve disables the check. When no mounted disk can be matched to
/// `dir` the check passes.
pub fn check_reserve(dir: &Path, expected_size: i64, reserve: u64) -> IndexDbResult<()> {
    if reserve == 0 {
        return Ok(());
    }
    let dir = dir.canonicalize()?;
    let disks = Disks::new_with_refreshed_list();
    let available = disks
        .list()
        .iter()
        .filter(|disk| dir.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space());

    let Some(available) = available else {
        debug!(dir = ?dir, "no disk matched; skipping reserve check");
        return Ok(());
    };
    let needed = reserve.saturating_add(expected_size.max(0) as u64);
    if available < needed {
        return Err(IndexDbError::InsufficientSpace {
            path: dir,
            available,
            needed,
        });
    }
    Ok(())
}
