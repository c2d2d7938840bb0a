//! Events: facts emitted by resolvers (and the kernel) about what happened.

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, EventId, EventType, OutputKey, PluginId, ResolverId, TraceId};
use crate::output::Output;
use crate::value::{Component, Value};

/// The record an event points back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Cause {
    /// An output resolved in the same frame.
    Output(OutputKey),
    /// An earlier event.
    Event(EventId),
}

/// Who produced an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventOrigin {
    /// A resolver in the pipeline.
    Resolver(ResolverId),
    /// A failed plugin invocation (diagnostic).
    Plugin(PluginId),
}

/// An event before the kernel assigns its [`EventId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Event type discriminator.
    pub event_type: EventType,
    /// Entity the event is about.
    pub subject: EntityId,
    /// Causal chain root.
    pub trace: TraceId,
    /// Upstream record. `None` only for diagnostics.
    pub cause: Option<Cause>,
    /// Event data.
    pub data: Component,
}

impl EventDraft {
    /// Start an event caused by `output`, inheriting its trace.
    pub fn caused_by(output: &Output, event_type: impl Into<EventType>, subject: EntityId) -> Self {
        Self {
            event_type: event_type.into(),
            subject,
            trace: output.trace,
            cause: Some(Cause::Output(output.key())),
            data: Component::new(),
        }
    }

    /// Builder-style data field.
    #[must_use]
    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.data = self.data.with(field, value);
        self
    }
}

/// An immutable event in the frame's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier, unique for the simulation.
    pub id: EventId,
    /// Event type discriminator.
    pub event_type: EventType,
    /// Tick the event happened in.
    pub tick: u64,
    /// Entity the event is about.
    pub subject: EntityId,
    /// Producer.
    pub origin: EventOrigin,
    /// Causal chain root.
    pub trace: TraceId,
    /// Upstream record.
    pub cause: Option<Cause>,
    /// Event data.
    pub data: Component,
}

impl Event {
    /// Finalize a draft.
    pub fn from_draft(draft: EventDraft, id: EventId, tick: u64, origin: EventOrigin) -> Self {
        Self {
            id,
            event_type: draft.event_type,
            tick,
            subject: draft.subject,
            origin,
            trace: draft.trace,
            cause: draft.cause,
            data: draft.data,
        }
    }

    /// Whether this event records an isolated plugin failure.
    pub const fn is_diagnostic(&self) -> bool {
        matches!(self.origin, EventOrigin::Plugin(_))
    }
}
