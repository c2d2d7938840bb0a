//! Temp file + rename writes.
//!
//! The temp file lives next to the destination so the final rename never
//! crosses a file system. Readers see either the previous file or the
//! complete new one.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::PersistError;

/// Replace `path` with `bytes` atomically, creating parent directories.
///
/// # Errors
///
/// Returns [`PersistError::Io`] if the directory, the temp file or the
/// rename fails. The destination is untouched on error.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| PersistError::Io { source: err.error })?;

    debug!(path = %path.display(), bytes = bytes.len(), "Atomic write complete");
    Ok(())
}
