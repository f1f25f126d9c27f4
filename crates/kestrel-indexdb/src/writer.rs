use std::fs;
use std::io::{self, Write};
use std::path::Path;

use kestrel_types::ObjectHash;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{IndexDbError, IndexDbResult};
use crate::traits::AtomicFileWriter;

/// Payload staged in a temporary file inside the device's temp directory.
///
/// The file is removed when the writer is abandoned or dropped, and renamed
/// into place when published.
pub struct TempFileWriter {
    file: NamedTempFile,
    written: u64,
}

impl TempFileWriter {
    /// Create a fresh temporary file for `hash` under `dir`.
    pub fn create_in(dir: &Path, hash: &ObjectHash) -> IndexDbResult<Self> {
        fs::create_dir_all(dir)?;
        let prefix = format!("{hash}.");
        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)?;
        debug!(hash = %hash, path = ?file.path(), "staged temp file");
        Ok(Self { file, written: 0 })
    }
}

impl Write for TempFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl AtomicFileWriter for TempFileWriter {
    fn temp_path(&self) -> &Path {
        self.file.path()
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }

    fn publish(self: Box<Self>, dest: &Path) -> IndexDbResult<()> {
        let Self { mut file, written } = *self;
        file.flush()?;
        file.as_file().sync_all()?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        file.persist(dest)
            .map_err(|e| IndexDbError::Io(e.error))?;
        debug!(path = ?dest, bytes = written, "published payload");
        Ok(())
    }

    fn abandon(self: Box<Self>) -> IndexDbResult<()> {
        let Self { file, .. } = *self;
        let path = file.path().to_path_buf();
        file.close()?;
        debug!(path = ?path, "abandoned temp file");
        Ok(())
    }
}

impl std::fmt::Debug for TempFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempFileWriter")
            .field("path", &self.file.path())
            .field("written", &self.written)
            .finish()
    }
}
