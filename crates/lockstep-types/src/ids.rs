//! Type-safe identifier wrappers.
//!
//! Numeric identifiers ([`EntityId`], [`OutputId`], [`EventId`],
//! [`TraceId`]) are allocated by the kernel from monotonic counters and are
//! never reused. Named identifiers ([`PluginId`], [`ComponentType`], ...)
//! come from content and schema files; their `Ord` is plain byte order of
//! the name, which is what every deterministic sort in the kernel uses.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around a `u64` counter value.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw counter value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the raw counter value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

/// Generates a newtype wrapper around an owned name.
macro_rules! define_name {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }
    };
}

define_id! {
    /// Unique identifier of an entity for the whole lifetime of a simulation.
    EntityId
}

define_id! {
    /// Identifier of an output, unique within the tick that produced it.
    OutputId
}

define_id! {
    /// Identifier of an event, unique for the whole simulation.
    EventId
}

define_id! {
    /// Root identifier of a causal chain.
    ///
    /// The zero value is reserved as "no trace" and is rejected wherever a
    /// trace is mandatory.
    TraceId
}

impl TraceId {
    /// The reserved empty trace.
    pub const EMPTY: Self = Self(0);

    /// Whether this is the reserved empty trace.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

define_name! {
    /// Identifier of a plugin implementation.
    PluginId
}

define_name! {
    /// Identifier of a resolver implementation.
    ResolverId
}

define_name! {
    /// Classification tag fixed on an entity at creation.
    Tag
}

define_name! {
    /// Component type identifier, as named in the schema registry.
    ComponentType
}

define_name! {
    /// Field name inside a component.
    FieldName
}

define_name! {
    /// Output type discriminator, as named in the schema registry.
    OutputType
}

define_name! {
    /// Event type discriminator, as named in the schema registry.
    EventType
}

define_name! {
    /// Name of a scheduling phase.
    PhaseName
}

/// Key that identifies an output across ticks.
///
/// [`OutputId`] is only unique within a tick, so the causal log and the
/// event cause field carry the tick alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputKey {
    /// Tick the output was produced in.
    pub tick: u64,
    /// Identifier within that tick.
    pub id: OutputId,
}

impl core::fmt::Display for OutputKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.tick, self.id)
    }
}
