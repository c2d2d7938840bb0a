//! Replay log and divergence detection.
//!
//! One JSON line per applied frame: the sealed Output Buffer, the
//! isolated plugin failures and the resulting state hash. Feeding the
//! buffers back through [`FrameDriver::step_replayed`] from the same
//! starting save must reproduce every hash; the first frame that does not
//! is reported as a [`Divergence`].

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use lockstep_core::{FrameDriver, FrameReport, PluginFailure};
use lockstep_types::Output;
use lockstep_world::StateHash;

use crate::error::PersistError;

/// One frame of the replay log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// Tick that was evaluated.
    pub tick: u64,
    /// Sealed Output Buffer.
    pub outputs: Vec<Output>,
    /// Isolated plugin failures.
    #[serde(default)]
    pub failures: Vec<PluginFailure>,
    /// Hash of the state after the frame.
    pub state_hash: StateHash,
}

impl From<&FrameReport> for ReplayRecord {
    fn from(report: &FrameReport) -> Self {
        Self {
            tick: report.tick,
            outputs: report.outputs.clone(),
            failures: report.failures.clone(),
            state_hash: report.state_hash,
        }
    }
}

/// Appends frames to a replay log.
#[derive(Debug)]
pub struct ReplayWriter {
    path: PathBuf,
    out: BufWriter<File>,
    frames: u64,
}

impl ReplayWriter {
    /// Start a new log at `path`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`] if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, PersistError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(File::create(path)?),
            frames: 0,
        })
    }

    /// Append one applied frame.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Serialization`] or [`PersistError::Io`].
    pub fn append(&mut self, report: &FrameReport) -> Result<(), PersistError> {
        serde_json::to_writer(&mut self.out, &ReplayRecord::from(report))?;
        self.out.write_all(b"\n")?;
        self.frames = self.frames.saturating_add(1);
        Ok(())
    }

    /// Frames written so far.
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Log location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and sync the log to disk.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`].
    pub fn finish(mut self) -> Result<PathBuf, PersistError> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        info!(path = %self.path.display(), frames = self.frames, "Replay log closed");
        Ok(self.path)
    }
}

/// Read every record of a replay log. Blank lines are skipped.
///
/// # Errors
///
/// Returns [`PersistError::Line`] naming the first unparsable line.
pub fn read_replay(path: &Path) -> Result<Vec<ReplayRecord>, PersistError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| PersistError::Line {
            path: path.display().to_string(),
            line: index.saturating_add(1),
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// The first frame whose replayed hash differs from the recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    /// Tick that was evaluated.
    pub tick: u64,
    /// Hash in the log.
    pub expected: StateHash,
    /// Hash the replay produced.
    pub actual: StateHash,
}

/// Result of [`verify_replay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayVerdict {
    /// Every frame reproduced its hash.
    Verified {
        /// Frames replayed.
        frames: u64,
        /// Hash after the last frame, if any frame was replayed.
        final_hash: Option<StateHash>,
    },
    /// Replay stopped at the first mismatch.
    Diverged(Divergence),
}

/// Replay `records` on `driver`, which must start at the first record's
/// tick, and compare every state hash.
///
/// # Errors
///
/// Returns [`PersistError::ReplayGap`] if a record does not follow the
/// driver's tick and [`PersistError::Frame`] if a replayed frame fails.
/// A hash mismatch is not an error; it is reported as
/// [`ReplayVerdict::Diverged`].
pub fn verify_replay(
    driver: &mut FrameDriver,
    records: Vec<ReplayRecord>,
) -> Result<ReplayVerdict, PersistError> {
    let mut frames: u64 = 0;
    let mut final_hash = None;
    for record in records {
        if record.tick != driver.tick() {
            return Err(PersistError::ReplayGap {
                expected: driver.tick(),
                found: record.tick,
            });
        }
        let report = driver.step_replayed(record.outputs, record.failures)?;
        if report.state_hash != record.state_hash {
            let divergence = Divergence {
                tick: record.tick,
                expected: record.state_hash,
                actual: report.state_hash,
            };
            warn!(
                tick = divergence.tick,
                expected = %divergence.expected,
                actual = %divergence.actual,
                "Replay diverged"
            );
            return Ok(ReplayVerdict::Diverged(divergence));
        }
        frames = frames.saturating_add(1);
        final_hash = Some(report.state_hash);
    }
    info!(frames, "Replay verified");
    Ok(ReplayVerdict::Verified { frames, final_hash })
}
