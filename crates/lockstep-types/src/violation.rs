//! Contract violations: fatal breaches of plugin or resolver contracts.
//!
//! A violation is never coerced into a recoverable error. Whoever detects
//! one aborts the frame and reports it with enough context (entity, plugin
//! or resolver, tick) to find the offending unit.

use crate::ids::{
    ComponentType, EntityId, EventId, EventType, FieldName, OutputType, PluginId, ResolverId, Tag,
    TraceId,
};

/// A fatal contract breach.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// A plugin read a component outside its declared read set.
    #[error("plugin {plugin} on entity {entity} read undeclared component {component} at tick {tick}")]
    UndeclaredRead {
        /// Offending plugin.
        plugin: PluginId,
        /// Entity the plugin was invoked for.
        entity: EntityId,
        /// Tick of the invocation.
        tick: u64,
        /// Component that was read.
        component: ComponentType,
    },

    /// A plugin emitted an output type outside its declared emit set.
    #[error("plugin {plugin} on entity {entity} emitted undeclared output {output_type} at tick {tick}")]
    UndeclaredEmit {
        /// Offending plugin.
        plugin: PluginId,
        /// Entity the plugin was invoked for.
        entity: EntityId,
        /// Tick of the invocation.
        tick: u64,
        /// Output type that was emitted.
        output_type: OutputType,
    },

    /// An output carried the empty trace identifier.
    #[error("plugin {plugin} on entity {entity} emitted {output_type} without a trace at tick {tick}")]
    MissingTrace {
        /// Offending plugin.
        plugin: PluginId,
        /// Entity the plugin was invoked for.
        entity: EntityId,
        /// Tick of the invocation.
        tick: u64,
        /// Output type that lacked a trace.
        output_type: OutputType,
    },

    /// An output named a cause event that is not in the causal log.
    #[error("plugin {plugin} on entity {entity} cited unknown event {cause} at tick {tick}")]
    UnknownCause {
        /// Offending plugin.
        plugin: PluginId,
        /// Entity the plugin was invoked for.
        entity: EntityId,
        /// Tick of the invocation.
        tick: u64,
        /// The cited event.
        cause: EventId,
    },

    /// An output's trace differs from the trace of the event it cites.
    #[error(
        "plugin {plugin} on entity {entity} cited event {cause} with trace {actual}, expected {expected} at tick {tick}"
    )]
    TraceMismatch {
        /// Offending plugin.
        plugin: PluginId,
        /// Entity the plugin was invoked for.
        entity: EntityId,
        /// Tick of the invocation.
        tick: u64,
        /// The cited event.
        cause: EventId,
        /// Trace of the cited event.
        expected: TraceId,
        /// Trace on the output.
        actual: TraceId,
    },

    /// Additive and multiplicative deltas targeted the same field in one frame.
    #[error(
        "resolver {resolver} received mixed additive and multiplicative deltas for {entity}.{component}.{field} at tick {tick}"
    )]
    MixedDeltaKinds {
        /// Resolver that detected the conflict.
        resolver: ResolverId,
        /// Target entity.
        entity: EntityId,
        /// Target component.
        component: ComponentType,
        /// Target field.
        field: FieldName,
        /// Tick of the frame.
        tick: u64,
    },

    /// A resolver wrote a component type it does not own.
    #[error("resolver {resolver} wrote unowned component {component} on entity {entity} at tick {tick}")]
    UnownedWrite {
        /// Offending resolver.
        resolver: ResolverId,
        /// Target entity.
        entity: EntityId,
        /// Component type written.
        component: ComponentType,
        /// Tick of the frame.
        tick: u64,
    },

    /// A plugin was attached to an entity lacking its required tags.
    #[error("plugin {plugin} cannot attach to entity {entity}: missing tags {missing:?}")]
    AttachRejected {
        /// Plugin being attached.
        plugin: PluginId,
        /// Target entity.
        entity: EntityId,
        /// Required tags the entity lacks.
        missing: Vec<Tag>,
    },

    /// An output payload does not match its schema.
    #[error("plugin {plugin} on entity {entity} emitted malformed {output_type} at tick {tick}: {reason}")]
    MalformedOutput {
        /// Offending plugin.
        plugin: PluginId,
        /// Entity the plugin was invoked for.
        entity: EntityId,
        /// Tick of the invocation.
        tick: u64,
        /// Output type.
        output_type: OutputType,
        /// What did not match.
        reason: String,
    },

    /// A resolver produced an event with no cause or no trace.
    #[error("resolver {resolver} emitted {event_type} without causal metadata at tick {tick}")]
    UncausedEvent {
        /// Offending resolver.
        resolver: ResolverId,
        /// Event type.
        event_type: EventType,
        /// Tick of the frame.
        tick: u64,
    },
}
