//! Log entries of the causal chain.

use serde::{Deserialize, Serialize};

use lockstep_types::{
    Cause, EntityId, Event, EventId, EventType, Output, OutputKey, OutputType, PluginId, TraceId,
};

/// One entry of the append-only causal log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum CausalRecord {
    /// A resolved output.
    Output {
        /// Cross-tick key.
        key: OutputKey,
        /// Output type.
        output_type: OutputType,
        /// Emitting entity.
        source: EntityId,
        /// Emitting plugin.
        plugin: PluginId,
        /// Chain root.
        trace: TraceId,
        /// Triggering event, if any.
        cause: Option<EventId>,
    },
    /// An applied event.
    Event {
        /// Identifier.
        id: EventId,
        /// Tick it happened in.
        tick: u64,
        /// Event type.
        event_type: EventType,
        /// Entity it is about.
        subject: EntityId,
        /// Chain root.
        trace: TraceId,
        /// Upstream record.
        cause: Option<Cause>,
        /// Whether this records an isolated plugin failure.
        diagnostic: bool,
    },
}

impl CausalRecord {
    /// Trace shared by every record of the chain.
    pub const fn trace(&self) -> TraceId {
        match self {
            Self::Output { trace, .. } | Self::Event { trace, .. } => *trace,
        }
    }

    /// Tick the record belongs to.
    pub const fn tick(&self) -> u64 {
        match self {
            Self::Output { key, .. } => key.tick,
            Self::Event { tick, .. } => *tick,
        }
    }

    /// Whether this is a root output (an output with no cause).
    pub const fn is_root(&self) -> bool {
        matches!(self, Self::Output { cause: None, .. })
    }
}

impl From<&Output> for CausalRecord {
    fn from(output: &Output) -> Self {
        Self::Output {
            key: output.key(),
            output_type: output.output_type.clone(),
            source: output.source,
            plugin: output.plugin.clone(),
            trace: output.trace,
            cause: output.cause,
        }
    }
}

impl From<&Event> for CausalRecord {
    fn from(event: &Event) -> Self {
        Self::Event {
            id: event.id,
            tick: event.tick,
            event_type: event.event_type.clone(),
            subject: event.subject,
            trace: event.trace,
            cause: event.cause,
            diagnostic: event.is_diagnostic(),
        }
    }
}
