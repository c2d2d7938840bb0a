//! Error types for the `lockstep-world` crate.

use lockstep_types::{ComponentType, ContractViolation, EntityId, FieldName, OutputType, PluginId, ValueKind};

/// Errors raised while loading or applying a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Failed to read the schema file from disk.
    #[error("failed to read schema file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse the schema YAML.
    #[error("failed to parse schema YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A component type is not in the registry.
    #[error("unknown component type: {0}")]
    UnknownComponent(ComponentType),

    /// An output type is not in the registry.
    #[error("unknown output type: {0}")]
    UnknownOutput(OutputType),

    /// A field is not declared for its component type.
    #[error("unknown field {field} on component {component}")]
    UnknownField {
        /// Component type.
        component: ComponentType,
        /// Undeclared field.
        field: FieldName,
    },

    /// A required field without a default is absent.
    #[error("missing field {field} on component {component} (no default declared)")]
    MissingField {
        /// Component type.
        component: ComponentType,
        /// Absent field.
        field: FieldName,
    },

    /// A field holds a value of the wrong kind.
    #[error("field {component}.{field} expects {expected}, found {found}")]
    KindMismatch {
        /// Component type.
        component: ComponentType,
        /// Field name.
        field: FieldName,
        /// Declared kind.
        expected: ValueKind,
        /// Kind found in the data.
        found: ValueKind,
    },

    /// A float field would hold NaN or an infinity.
    #[error("field {component}.{field} must be finite, found {value}")]
    NonFinite {
        /// Component type.
        component: ComponentType,
        /// Field name.
        field: FieldName,
        /// Offending value.
        value: f64,
    },

    /// The schema document itself is inconsistent.
    #[error("invalid schema: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },

    /// Data was produced under a different schema version.
    #[error("schema version mismatch: registry is v{expected}, data is v{found}")]
    VersionMismatch {
        /// Version of the loaded registry.
        expected: u32,
        /// Version recorded in the data.
        found: u32,
    },
}

impl From<serde_yml::Error> for SchemaError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Errors that can occur during state store operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The entity does not exist (never existed or was despawned).
    #[error("entity not found: {0}")]
    UnknownEntity(EntityId),

    /// The entity exists but lacks the component.
    #[error("entity {entity} has no {component} component")]
    MissingComponent {
        /// The entity.
        entity: EntityId,
        /// The absent component type.
        component: ComponentType,
    },

    /// An entity id was inserted twice.
    #[error("duplicate entity id: {0}")]
    DuplicateEntity(EntityId),

    /// A spawn request named a plugin nobody registered.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(PluginId),

    /// Schema validation failed.
    #[error("schema error: {source}")]
    Schema {
        /// The underlying schema error.
        #[from]
        source: SchemaError,
    },

    /// A resolver broke its write contract.
    #[error("contract violation: {source}")]
    Contract {
        /// The violation.
        #[from]
        source: ContractViolation,
    },

    /// An identifier counter would overflow.
    #[error("identifier counter overflow")]
    IdOverflow,

    /// Restored state is internally inconsistent.
    #[error("inconsistent state: {reason}")]
    Inconsistent {
        /// What is inconsistent.
        reason: String,
    },
}
