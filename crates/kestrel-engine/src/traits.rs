use std::io::Write;

use kestrel_types::{Metadata, ObjectVars};
use tokio_util::task::TaskTracker;

use crate::error::EngineResult;

/// One addressable stored item, valid for the duration of a single request.
///
/// The `try_*` accessors are the primary contract and report load failures.
/// [`metadata`](Self::metadata), [`content_length`](Self::content_length) and
/// [`exists`](Self::exists) are sentinel wrappers for callers without an
/// error channel: a failed load reads as absent metadata, `-1`, and `false`.
/// Note that `false` from `exists` cannot distinguish a tombstone from a
/// failed lookup; use [`try_exists`](Self::try_exists) when that matters.
pub trait Object: Send {
    /// The object's metadata, loading the record if needed.
    fn try_metadata(&mut self) -> EngineResult<&Metadata>;

    /// Value of `Content-Length`, or `-1` when missing or not a base-10 integer.
    fn try_content_length(&mut self) -> EngineResult<i64>;

    /// Whether the object is loaded and not a tombstone.
    fn try_exists(&mut self) -> EngineResult<bool>;

    /// Metadata, or `None` if the record could not be loaded.
    fn metadata(&mut self) -> Option<&Metadata> {
        self.try_metadata().ok()
    }

    /// Content length, or `-1` on any problem.
    fn content_length(&mut self) -> i64 {
        self.try_content_length().unwrap_or(-1)
    }

    /// Existence, or `false` if the record could not be loaded.
    fn exists(&mut self) -> bool {
        self.try_exists().unwrap_or(false)
    }

    /// Stream the whole payload to every writer in `dsts`.
    ///
    /// A write or read failure mid-stream is reported as
    /// [`EngineError::PartialCopy`](crate::EngineError::PartialCopy) with the
    /// byte count already delivered.
    fn copy(&mut self, dsts: &mut [&mut dyn Write]) -> EngineResult<u64>;

    /// Stream payload bytes `start..end` to `dst`.
    fn copy_range(&mut self, dst: &mut dyn Write, start: u64, end: u64) -> EngineResult<u64>;

    /// Stage a new payload of `expected_size` bytes (negative if unknown).
    ///
    /// Any previously staged payload on this handle is discarded first.
    fn set_data(&mut self, expected_size: i64) -> EngineResult<&mut dyn Write>;

    /// Publish the staged payload (if any) together with `metadata`.
    fn commit(&mut self, metadata: &Metadata) -> EngineResult<()>;

    /// Update metadata; identical to [`commit`](Self::commit) at this layer.
    fn commit_metadata(&mut self, metadata: &Metadata) -> EngineResult<()>;

    /// Write a tombstone. `metadata` must carry `X-Timestamp`.
    fn delete(&mut self, metadata: &Metadata) -> EngineResult<()>;

    /// Discard any staged payload that was never committed. Idempotent.
    fn close(&mut self) -> EngineResult<()>;

    /// Hook for corruption handling; always succeeds here.
    fn quarantine(&mut self) -> EngineResult<()>;

    /// Short human-readable description for logs.
    fn repr(&self) -> String;

    /// Caller-owned tracker for deferred work, if one was supplied.
    fn tracker(&self) -> Option<&TaskTracker>;
}

/// A storage backend that resolves request variables to object handles.
pub trait ObjectEngine: Send + Sync {
    /// Handle for the object named by `vars`.
    ///
    /// # Panics
    ///
    /// Panics if `vars.device` is not a device this engine owns. Routing a
    /// request to a foreign device is a caller bug, not a runtime condition.
    fn new_object(
        &self,
        vars: &ObjectVars,
        need_data: bool,
        tracker: Option<TaskTracker>,
    ) -> EngineResult<Box<dyn Object>>;

    /// Read-only handle whose payload lists every record in the partition
    /// that the object named by `vars` falls in.
    ///
    /// # Panics
    ///
    /// Panics on an unknown device, like [`new_object`](Self::new_object).
    fn partition_listing(
        &self,
        vars: &ObjectVars,
        tracker: Option<TaskTracker>,
    ) -> EngineResult<Box<dyn Object>>;

    /// Purge tombstones older than the reclaim age on every device.
    fn reclaim(&self) -> EngineResult<usize>;
}
