//! Error types for the `lockstep-content` crate.

use lockstep_core::pipeline::PipelineError;
use lockstep_core::registry::RegistryError;
use lockstep_world::{SchemaError, WorldError};

/// Errors raised while assembling content or seeding a battle.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// The built-in schema failed to load.
    #[error("naval schema error: {source}")]
    Schema {
        /// The underlying schema error.
        #[from]
        source: SchemaError,
    },

    /// A plugin was rejected at registration.
    #[error("plugin registration failed: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },

    /// The resolver set does not fit the schema.
    #[error("resolver pipeline rejected: {source}")]
    Pipeline {
        /// The underlying pipeline error.
        #[from]
        source: PipelineError,
    },

    /// Seeding the world failed.
    #[error("world error: {source}")]
    World {
        /// The underlying state store error.
        #[from]
        source: WorldError,
    },

    /// The battle package is unusable.
    #[error("invalid battle package: {reason}")]
    InvalidPackage {
        /// What is wrong with it.
        reason: String,
    },
}
