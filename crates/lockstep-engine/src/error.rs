//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every subsystem failure so the battle pipeline
//! can propagate with `?`; `main` converts it to `anyhow` at the edge.

use std::path::PathBuf;

use lockstep_content::ContentError;
use lockstep_core::clock::ClockError;
use lockstep_core::config::ConfigError;
use lockstep_core::runner::RunnerError;
use lockstep_core::scheduler::SchedulerError;
use lockstep_persist::PersistError;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The configured phases are unusable.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The plugin worker pool could not start.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },

    /// Content assembly or battle seeding failed.
    #[error("content error: {source}")]
    Content {
        /// The underlying content error.
        #[from]
        source: ContentError,
    },

    /// The battle package could not be read.
    #[error("cannot read battle package {}: {reason}", path.display())]
    Package {
        /// Package location.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The frame loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        source: Box<RunnerError>,
    },

    /// Writing or reading run artifacts failed.
    #[error("persistence error: {source}")]
    Persist {
        /// The underlying persistence error.
        #[from]
        source: PersistError,
    },
}

impl From<RunnerError> for EngineError {
    fn from(source: RunnerError) -> Self {
        Self::Runner {
            source: Box::new(source),
        }
    }
}
