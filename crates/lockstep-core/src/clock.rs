//! Frame phase machine and the phase schedule.
//!
//! Every frame walks `Idle -> Snapshotting -> Evaluating -> Resolving ->
//! Applying -> Idle`. The clock refuses any other transition, so a driver
//! bug surfaces as a [`ClockError`] instead of a half-applied frame. An
//! aborted frame may return to `Idle` from any phase before `Applying`
//! completes.
//!
//! The schedule decides which named phases are active on a tick. A plugin
//! runs on a tick when at least one of its declared phases is active.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use lockstep_types::PhaseName;

use crate::config::PhaseConfig;

/// Errors raised by the frame clock.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// A transition outside the frame order was attempted.
    #[error("illegal frame transition {from} -> {to}")]
    IllegalTransition {
        /// Phase the clock was in.
        from: FramePhase,
        /// Phase that was requested.
        to: FramePhase,
    },

    /// The phase schedule is unusable.
    #[error("invalid phase configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Where a frame currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePhase {
    /// Between frames.
    Idle,
    /// Building the read-only view.
    Snapshotting,
    /// Running plugins.
    Evaluating,
    /// Running resolvers against the next state.
    Resolving,
    /// Committing the next state and the causal records.
    Applying,
}

impl FramePhase {
    /// The phase that legally follows this one.
    pub const fn successor(self) -> Self {
        match self {
            Self::Idle => Self::Snapshotting,
            Self::Snapshotting => Self::Evaluating,
            Self::Evaluating => Self::Resolving,
            Self::Resolving => Self::Applying,
            Self::Applying => Self::Idle,
        }
    }
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Snapshotting => "snapshotting",
            Self::Evaluating => "evaluating",
            Self::Resolving => "resolving",
            Self::Applying => "applying",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledPhase {
    name: PhaseName,
    every_n_ticks: u64,
    offset: u64,
}

/// Phase machine plus the named phase schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameClock {
    phase: FramePhase,
    schedule: Vec<ScheduledPhase>,
}

impl FrameClock {
    /// Build a clock from the configured phases.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] when no phase is configured,
    /// a name repeats, a period is zero, or an offset is not smaller than
    /// its period.
    pub fn new(phases: &[PhaseConfig]) -> Result<Self, ClockError> {
        if phases.is_empty() {
            return Err(ClockError::InvalidConfig {
                reason: "at least one phase must be configured".to_owned(),
            });
        }
        let mut seen = BTreeSet::new();
        let mut schedule = Vec::with_capacity(phases.len());
        for phase in phases {
            if !seen.insert(phase.name.clone()) {
                return Err(ClockError::InvalidConfig {
                    reason: format!("phase {} configured twice", phase.name),
                });
            }
            if phase.every_n_ticks == 0 {
                return Err(ClockError::InvalidConfig {
                    reason: format!("phase {} has every_n_ticks = 0", phase.name),
                });
            }
            if phase.offset >= phase.every_n_ticks {
                return Err(ClockError::InvalidConfig {
                    reason: format!(
                        "phase {} offset {} must be below every_n_ticks {}",
                        phase.name, phase.offset, phase.every_n_ticks
                    ),
                });
            }
            schedule.push(ScheduledPhase {
                name: phase.name.clone(),
                every_n_ticks: phase.every_n_ticks,
                offset: phase.offset,
            });
        }
        Ok(Self {
            phase: FramePhase::Idle,
            schedule,
        })
    }

    /// Current frame phase.
    pub const fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Whether `name` is a configured phase.
    pub fn knows(&self, name: &PhaseName) -> bool {
        self.schedule.iter().any(|p| &p.name == name)
    }

    /// Names of every configured phase.
    pub fn phase_names(&self) -> BTreeSet<PhaseName> {
        self.schedule.iter().map(|p| p.name.clone()).collect()
    }

    /// Phases active on `tick`.
    pub fn active_phases(&self, tick: u64) -> BTreeSet<PhaseName> {
        self.schedule
            .iter()
            .filter(|p| tick.checked_rem(p.every_n_ticks) == Some(p.offset))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Move to `to`, which must be the successor of the current phase.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::IllegalTransition`] for any other target.
    pub fn advance(&mut self, to: FramePhase) -> Result<(), ClockError> {
        if self.phase.successor() != to {
            return Err(ClockError::IllegalTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Abandon the frame in progress.
    pub fn abort(&mut self) {
        self.phase = FramePhase::Idle;
    }
}
