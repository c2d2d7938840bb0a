//! Outputs (proposals) and their payloads.
//!
//! A plugin returns [`Proposal`]s. The scheduler stamps each one with its
//! source entity, plugin and per-invocation sequence number; the Output
//! Buffer then assigns [`OutputId`]s and the result is an immutable
//! [`Output`]. Outputs are data until a resolver consumes them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{
    ComponentType, EntityId, EventId, FieldName, OutputId, OutputKey, OutputType, PluginId, Tag,
    TraceId,
};
use crate::value::{Component, Value};

/// One field update carried by a `field`-shaped output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldOp {
    /// Overwrite the field; last write in sort order wins.
    Set(Value),
    /// Additive delta; deltas accumulate by summation.
    Add(f64),
    /// Multiplicative delta; deltas accumulate by product.
    Mul(f64),
}

/// How a [`FieldOp`] combines with other writes to the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaKind {
    /// [`FieldOp::Set`].
    Overwrite,
    /// [`FieldOp::Add`].
    Additive,
    /// [`FieldOp::Mul`].
    Multiplicative,
}

impl FieldOp {
    /// The accumulation kind of this op.
    pub const fn kind(&self) -> DeltaKind {
        match self {
            Self::Set(_) => DeltaKind::Overwrite,
            Self::Add(_) => DeltaKind::Additive,
            Self::Mul(_) => DeltaKind::Multiplicative,
        }
    }
}

/// A proposed write to one field of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWrite {
    /// Entity whose component is written.
    pub target: EntityId,
    /// Component type.
    pub component: ComponentType,
    /// Field inside the component.
    pub field: FieldName,
    /// The update.
    pub op: FieldOp,
}

/// A claim on a contended capacity held by a provider entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Entity holding the capacity.
    pub provider: EntityId,
    /// Capacity field on the provider's capacity component.
    pub resource: FieldName,
    /// Amount requested. Grants are all-or-nothing.
    pub amount: f64,
    /// Higher priority is granted first.
    pub priority: i32,
}

/// Request to create a new entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Immutable classification tags.
    pub tags: BTreeSet<Tag>,
    /// Optional weak owner reference.
    pub owner: Option<EntityId>,
    /// Optional parent; the new entity is appended to the parent's children.
    pub parent: Option<EntityId>,
    /// Initial components, validated against the schema.
    pub components: BTreeMap<ComponentType, Component>,
    /// Plugins to attach.
    pub plugins: Vec<PluginId>,
}

/// The shape of a payload, as declared per output type in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    /// [`Payload::Field`].
    Field,
    /// [`Payload::Reserve`].
    Reserve,
    /// [`Payload::Spawn`].
    Spawn,
    /// [`Payload::Despawn`].
    Despawn,
    /// [`Payload::Command`].
    Command,
}

impl core::fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Field => "field",
            Self::Reserve => "reserve",
            Self::Spawn => "spawn",
            Self::Despawn => "despawn",
            Self::Command => "command",
        };
        f.write_str(name)
    }
}

/// Typed payload of an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Component field update.
    Field(FieldWrite),
    /// Capacity reservation.
    Reserve(Reservation),
    /// Entity creation.
    Spawn(SpawnRequest),
    /// Entity teardown.
    Despawn {
        /// Entity to remove.
        target: EntityId,
    },
    /// Domain command interpreted by the owning resolver.
    Command {
        /// Optional entity the command is aimed at.
        target: Option<EntityId>,
        /// Command arguments.
        args: Component,
    },
}

impl Payload {
    /// The shape of this payload.
    pub const fn shape(&self) -> PayloadShape {
        match self {
            Self::Field(_) => PayloadShape::Field,
            Self::Reserve(_) => PayloadShape::Reserve,
            Self::Spawn(_) => PayloadShape::Spawn,
            Self::Despawn { .. } => PayloadShape::Despawn,
            Self::Command { .. } => PayloadShape::Command,
        }
    }
}

/// What a plugin returns: a typed intent not yet placed in the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Output type discriminator.
    pub output_type: OutputType,
    /// Causal chain root. Must not be [`TraceId::EMPTY`].
    pub trace: TraceId,
    /// Event that triggered this proposal, if any.
    pub cause: Option<EventId>,
    /// The intent.
    pub payload: Payload,
}

/// An immutable, fully stamped proposal in the Output Buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Identifier, unique within the tick.
    pub id: OutputId,
    /// Output type discriminator.
    pub output_type: OutputType,
    /// Tick the output was produced in.
    pub tick: u64,
    /// Entity whose plugin emitted the output.
    pub source: EntityId,
    /// Emitting plugin.
    pub plugin: PluginId,
    /// Position in the emitting invocation's result list.
    pub seq: u32,
    /// Causal chain root.
    pub trace: TraceId,
    /// Upstream event, if any.
    pub cause: Option<EventId>,
    /// The intent.
    pub payload: Payload,
}

impl Output {
    /// Cross-tick key of this output.
    pub const fn key(&self) -> OutputKey {
        OutputKey {
            tick: self.tick,
            id: self.id,
        }
    }

    /// Entity the payload targets, falling back to the source entity.
    pub const fn target(&self) -> EntityId {
        match &self.payload {
            Payload::Field(w) => w.target,
            Payload::Reserve(r) => r.provider,
            Payload::Despawn { target } => *target,
            Payload::Command {
                target: Some(target),
                ..
            } => *target,
            Payload::Spawn(_) | Payload::Command { target: None, .. } => self.source,
        }
    }
}
