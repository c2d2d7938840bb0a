//! Causal log export as JSON lines.

use std::path::Path;

use tracing::info;

use lockstep_ledger::{CausalRecord, CausalRecorder};

use crate::atomic::atomic_write;
use crate::error::PersistError;

/// Write every causal record to `path`, one JSON object per line, in
/// append order. Returns the number of records written.
///
/// # Errors
///
/// Returns [`PersistError::Serialization`] or [`PersistError::Io`].
pub fn export_causal_log(recorder: &CausalRecorder, path: &Path) -> Result<usize, PersistError> {
    let mut out = String::new();
    for record in recorder.records() {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    atomic_write(path, out.as_bytes())?;
    info!(path = %path.display(), records = recorder.len(), "Causal log exported");
    Ok(recorder.len())
}

/// Read an exported causal log back, re-checking every link.
///
/// # Errors
///
/// Returns [`PersistError::Line`] for unparsable lines and
/// [`PersistError::Causal`] if the records do not form a valid log.
pub fn read_causal_log(path: &Path) -> Result<CausalRecorder, PersistError> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: CausalRecord = serde_json::from_str(line).map_err(|source| PersistError::Line {
            path: path.display().to_string(),
            line: index.saturating_add(1),
            source,
        })?;
        records.push(record);
    }
    Ok(CausalRecorder::from_records(records)?)
}
