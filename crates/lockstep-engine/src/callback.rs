//! Frame callback that records a battle while it runs.
//!
//! After each applied frame the [`RecordingCallback`] appends the frame to
//! the replay log, takes a periodic save when one is due, and lets the
//! [`BattleMonitor`] decide whether the battle is over. A persistence
//! failure ends the run; the error is kept for the caller to report.

use std::path::PathBuf;

use lockstep_content::BattleMonitor;
use lockstep_core::frame::{FrameDriver, FrameReport};
use lockstep_core::runner::{FrameCallback, FrameVerdict};
use lockstep_persist::{PersistError, ReplayWriter, SaveFile, save_state};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Where a battle's saves go and how often.
#[derive(Debug, Clone)]
pub struct SavePlan {
    /// Directory holding every save of the run.
    pub dir: PathBuf,
    /// File name prefix, usually the battle name.
    pub prefix: String,
    /// Save every N ticks (0 = none while running).
    pub every_n_ticks: u64,
    /// Run the saves belong to.
    pub run_id: Uuid,
}

impl SavePlan {
    /// Save path for `tick`.
    pub fn path_for(&self, tick: u64) -> PathBuf {
        self.dir.join(format!("{}-tick-{tick}.json", self.prefix))
    }

    /// Path of the exported causal log.
    pub fn causal_log(&self) -> PathBuf {
        self.dir.join(format!("{}-causal.jsonl", self.prefix))
    }

    const fn due(&self, tick: u64) -> bool {
        tick > 0 && matches!(tick.checked_rem(self.every_n_ticks), Some(0))
    }
}

/// Callback that bridges the frame loop to the run artifacts.
pub struct RecordingCallback {
    monitor: BattleMonitor,
    replay: ReplayWriter,
    saves: SavePlan,
    failure: Option<PersistError>,
}

impl RecordingCallback {
    /// Record into `replay` and save according to `saves`.
    pub const fn new(monitor: BattleMonitor, replay: ReplayWriter, saves: SavePlan) -> Self {
        Self {
            monitor,
            replay,
            saves,
            failure: None,
        }
    }

    /// Hand back the monitor and replay writer, or the first persistence
    /// failure seen during the run.
    ///
    /// # Errors
    ///
    /// Returns the [`PersistError`] that ended the run, if any.
    pub fn into_parts(self) -> Result<(BattleMonitor, ReplayWriter), PersistError> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        Ok((self.monitor, self.replay))
    }

    fn record(&mut self, report: &FrameReport, driver: &FrameDriver) -> Result<(), PersistError> {
        self.replay.append(report)?;
        let tick = driver.tick();
        if self.saves.due(tick) {
            let path = self.saves.path_for(tick);
            save_state(&path, &SaveFile::capture(driver, self.saves.run_id))?;
            info!(tick, path = %path.display(), "Periodic save written");
        }
        Ok(())
    }
}

impl FrameCallback for RecordingCallback {
    fn on_frame(&mut self, report: &FrameReport, driver: &FrameDriver) -> FrameVerdict {
        if let Err(err) = self.record(report, driver) {
            error!(tick = report.tick, error = %err, "Recording failed, stopping the battle");
            self.failure = Some(err);
            return FrameVerdict::Finish("recording failed".to_owned());
        }
        debug!(
            tick = report.tick,
            events = report.events.len(),
            hash = %report.state_hash,
            "Frame recorded"
        );
        self.monitor.on_frame(report, driver)
    }
}
