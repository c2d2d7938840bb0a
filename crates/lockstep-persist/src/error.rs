//! Error types for the persistence layer.

use lockstep_core::FrameError;
use lockstep_ledger::CausalError;
use lockstep_world::{SchemaError, WorldError};

/// Errors raised while writing or reading run artifacts.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// File system access failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A save file or log record is not valid JSON for its type.
    #[error("serialization error: {source}")]
    Serialization {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// Saved components do not match the loaded schema.
    #[error("schema error: {source}")]
    Schema {
        /// The underlying schema error.
        #[from]
        source: SchemaError,
    },

    /// The saved state breaks a state store invariant.
    #[error("state error: {source}")]
    World {
        /// The underlying state store error.
        #[from]
        source: WorldError,
    },

    /// The saved causal log is inconsistent.
    #[error("causal log error: {source}")]
    Causal {
        /// The underlying ledger error.
        #[from]
        source: CausalError,
    },

    /// A replayed frame failed outright.
    #[error("replayed frame failed: {source}")]
    Frame {
        /// The frame failure.
        source: Box<FrameError>,
    },

    /// One line of a JSON-lines file could not be parsed.
    #[error("{path}:{line}: {source}")]
    Line {
        /// File being read.
        path: String,
        /// One-based line number.
        line: usize,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Replay records do not continue from the driver's tick.
    #[error("replay record for tick {found} does not follow tick {expected}")]
    ReplayGap {
        /// Tick the driver would evaluate next.
        expected: u64,
        /// Tick named by the record.
        found: u64,
    },
}

impl From<FrameError> for PersistError {
    fn from(source: FrameError) -> Self {
        Self::Frame {
            source: Box::new(source),
        }
    }
}
