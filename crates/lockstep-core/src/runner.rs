//! Async frame loop with operator controls.
//!
//! [`run_frames`] wraps [`FrameDriver::step`] with pause/resume, clean
//! stop, a tick limit, a per-frame callback and wall-clock pacing.
//!
//! Frames are CPU-bound. On a multi-threaded runtime each step runs inside
//! [`tokio::task::block_in_place`] so other tasks (signal handlers, the
//! operator) keep their worker; on a current-thread runtime the step runs
//! inline.

use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};

use crate::frame::{FrameDriver, FrameError, FrameReport};
use crate::operator::{OperatorState, RunEndReason};

/// Errors that end a run abnormally.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A frame failed.
    #[error("frame error: {source}")]
    Frame {
        /// The underlying frame error.
        #[from]
        source: FrameError,
    },
}

/// What the callback wants after a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameVerdict {
    /// Keep going.
    Continue,
    /// End the run with this reason.
    Finish(String),
}

/// Called after every applied frame.
pub trait FrameCallback: Send {
    /// Inspect the frame and decide whether the run continues.
    fn on_frame(&mut self, report: &FrameReport, driver: &FrameDriver) -> FrameVerdict;
}

/// A callback that never ends the run.
#[derive(Debug, Default)]
pub struct NoOpCallback;

impl FrameCallback for NoOpCallback {
    fn on_frame(&mut self, _report: &FrameReport, _driver: &FrameDriver) -> FrameVerdict {
        FrameVerdict::Continue
    }
}

/// How a run ended.
#[derive(Debug)]
pub struct RunSummary {
    /// Why the run ended.
    pub end_reason: RunEndReason,
    /// The last applied frame, if any.
    pub last_report: Option<FrameReport>,
    /// Frames applied by this run.
    pub frames: u64,
}

/// Run frames until the callback finishes the run, the tick limit is
/// reached, or a stop is requested.
///
/// # Errors
///
/// Returns [`RunnerError::Frame`] for any frame failure other than a
/// cancellation, which ends the run as [`RunEndReason::OperatorStop`].
pub async fn run_frames(
    driver: &mut FrameDriver,
    operator: &Arc<OperatorState>,
    callback: &mut dyn FrameCallback,
) -> Result<RunSummary, RunnerError> {
    let mut last_report: Option<FrameReport> = None;
    let mut frames: u64 = 0;

    info!(
        start_tick = driver.tick(),
        max_ticks = operator.max_ticks(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Run starting"
    );

    let end_reason = loop {
        if operator.is_paused() {
            info!("Run paused, waiting for resume");
            operator.wait_if_paused().await;
            info!("Run resumed");
        }
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            break RunEndReason::OperatorStop;
        }
        if operator.tick_limit_reached(driver.tick()) {
            info!(tick = driver.tick(), "Tick limit reached");
            break RunEndReason::MaxTicksReached;
        }

        let report = match step_off_executor(driver) {
            Ok(report) => report,
            Err(FrameError::Cancelled { .. }) => break RunEndReason::OperatorStop,
            Err(err) => return Err(err.into()),
        };
        frames = frames.saturating_add(1);

        let verdict = callback.on_frame(&report, driver);
        last_report = Some(report);
        if let FrameVerdict::Finish(reason) = verdict {
            info!(tick = driver.tick(), reason = %reason, "Run finished by callback");
            break RunEndReason::Finished(reason);
        }

        let interval_ms = operator.tick_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        }
    };

    operator.set_end_reason(end_reason.clone()).await;
    Ok(RunSummary {
        end_reason,
        last_report,
        frames,
    })
}

/// Step `driver` without holding a runtime worker hostage.
fn step_off_executor(driver: &mut FrameDriver) -> Result<FrameReport, FrameError> {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| driver.step()),
        _ => driver.step(),
    }
}

/// Log the end of a run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        reason = ?summary.end_reason,
        frames = summary.frames,
        final_tick = summary.last_report.as_ref().map(|r| r.tick),
        final_hash = summary.last_report.as_ref().map(|r| r.state_hash.to_hex()),
        "Run ended"
    );
    if summary.last_report.is_none() {
        warn!("Run ended with no frames applied");
    }
}
