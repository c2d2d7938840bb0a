//! State store, schema registry and world views for the Lockstep kernel.
//!
//! This crate owns everything about world state except *when* it changes:
//! entities and their components, the versioned schema registry that
//! defines what may be read and written, the immutable per-frame
//! [`WorldView`], and the [`NextState`] that resolvers write through
//! per-resolver overlays before the frame driver swaps it in.
//!
//! # Modules
//!
//! - [`entity`] -- [`Entity`] and the [`AttachRules`] seam to the plugin registry.
//! - [`error`] -- [`WorldError`] and [`SchemaError`].
//! - [`hash`] -- Canonical blake3 [`StateHash`].
//! - [`next`] -- [`NextState`] and [`NextStateHandle`] write overlays.
//! - [`schema`] -- [`SchemaRegistry`].
//! - [`spatial`] -- Uniform-grid [`SpatialIndex`] and its config.
//! - [`state`] -- [`WorldState`], the persistence unit.
//! - [`view`] -- [`WorldView`].

pub mod entity;
pub mod error;
pub mod hash;
pub mod next;
pub mod schema;
pub mod spatial;
pub mod state;
pub mod view;

pub use entity::{AttachRules, Entity};
pub use error::{SchemaError, WorldError};
pub use hash::{StateHash, state_hash};
pub use next::{NextState, NextStateHandle, WriteScope};
pub use schema::{ComponentSchema, FieldSchema, OutputSchema, SchemaRegistry};
pub use spatial::{SpatialConfig, SpatialIndex};
pub use state::WorldState;
pub use view::WorldView;
