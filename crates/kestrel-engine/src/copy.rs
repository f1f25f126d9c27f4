//! Streaming helpers for payload reads.

use std::io::{self, Read, Write};

use thiserror::Error;

const BUF_SIZE: usize = 64 * 1024;

/// A stream copy that failed part way through.
#[derive(Debug, Error)]
#[error("copy failed after {written} bytes: {source}")]
pub struct PartialCopy {
    /// Bytes delivered to every destination before the failure.
    pub written: u64,
    #[source]
    pub source: io::Error,
}

/// Stream everything from `src` into every writer in `dsts`.
///
/// Each destination receives identical bytes. Returns the number of bytes
/// read from `src` (and written to each destination). On failure the error
/// carries the count that reached every destination.
pub fn copy_to_all(src: &mut dyn Read, dsts: &mut [&mut dyn Write]) -> Result<u64, PartialCopy> {
    let mut buf = vec![0u8; BUF_SIZE];
    let mut written = 0u64;
    let fail = |written, source| PartialCopy { written, source };
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(fail(written, e)),
        };
        for dst in dsts.iter_mut() {
            dst.write_all(&buf[..n]).map_err(|e| fail(written, e))?;
        }
        written += n as u64;
    }
    Ok(written)
}

/// Stream exactly `len` bytes from `src` into `dst`.
///
/// Fails with `UnexpectedEof` if `src` ends early.
pub fn copy_exact(src: &mut dyn Read, len: u64, dst: &mut dyn Write) -> io::Result<u64> {
    let written = io::copy(&mut src.take(len), dst)?;
    if written < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("payload ended after {written} of {len} bytes"),
        ));
    }
    Ok(written)
}
