//! Shared type definitions for the Lockstep simulation kernel.
//!
//! Everything that crosses a crate boundary lives here: identifiers,
//! field values, outputs, events, contract violations, and the battle
//! package boundary types. The crate holds data only; behavior lives in
//! `lockstep-world`, `lockstep-ledger` and `lockstep-core`.
//!
//! # Modules
//!
//! - [`ids`] -- Numeric and named identifier newtypes.
//! - [`value`] -- [`Value`], [`ValueKind`] and [`Component`].
//! - [`output`] -- [`Proposal`], [`Output`] and payload types.
//! - [`event`] -- [`Event`], [`EventDraft`] and causal references.
//! - [`violation`] -- [`ContractViolation`].
//! - [`battle`] -- Battle package input and outcome bundles.

pub mod battle;
pub mod event;
pub mod ids;
pub mod output;
pub mod value;
pub mod violation;

pub use battle::{BattleOutcome, BattlePackage, MapSpec, ReplayReference, ShipOutcome, ShipSnapshot, TeamSpec};
pub use event::{Cause, Event, EventDraft, EventOrigin};
pub use ids::{
    ComponentType, EntityId, EventId, EventType, FieldName, OutputId, OutputKey, OutputType,
    PhaseName, PluginId, ResolverId, Tag, TraceId,
};
pub use output::{
    DeltaKind, FieldOp, FieldWrite, Output, Payload, PayloadShape, Proposal, Reservation,
    SpawnRequest,
};
pub use value::{Component, Value, ValueKind};
pub use violation::ContractViolation;
