//! The schema registry: data-driven contracts for components and outputs.
//!
//! The registry is loaded once from YAML at process start and shared
//! read-only behind an `Arc`. It answers three questions for the kernel:
//!
//! - which fields (and kinds) a component type has, and which resolver
//!   owns it,
//! - what payload shape and canonical rank an output type has,
//! - which event types exist.
//!
//! # Document format
//!
//! ```yaml
//! version: 1
//! components:
//!   Thermal:
//!     owner: fields
//!     fields:
//!       heat: { kind: float, default: 0.0 }
//! outputs:
//!   ApplyModifier: { rank: 20, shape: field, component: Thermal }
//! events: [ModifierApplied]
//! ```
//!
//! Validation never coerces: a value of the wrong kind is an error, and a
//! missing field is only filled when the schema declares a default.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use lockstep_types::{
    Component, ComponentType, EventType, FieldName, FieldOp, OutputType, Payload, PayloadShape,
    ResolverId, Value, ValueKind,
};

use crate::error::SchemaError;

/// Declared shape of one component field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Kind every value of this field must have.
    pub kind: ValueKind,
    /// Value used when the field is absent.
    pub default: Option<Value>,
}

/// Declared shape of one component type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSchema {
    /// The single resolver allowed to write this component type.
    pub owner: ResolverId,
    /// Field declarations.
    pub fields: BTreeMap<FieldName, FieldSchema>,
}

/// Declared shape of one output type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSchema {
    /// Canonical rank: first component of the resolution sort key.
    pub rank: u32,
    /// Payload shape.
    pub shape: PayloadShape,
    /// Target component, required for `field` outputs.
    #[serde(default)]
    pub component: Option<ComponentType>,
}

/// Scalar default as written in YAML; converted using the declared kind.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefaultLiteral {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    kind: ValueKind,
    #[serde(default)]
    default: Option<DefaultLiteral>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawComponent {
    owner: ResolverId,
    #[serde(default)]
    fields: BTreeMap<FieldName, RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchema {
    version: u32,
    #[serde(default)]
    components: BTreeMap<ComponentType, RawComponent>,
    #[serde(default)]
    outputs: BTreeMap<OutputType, OutputSchema>,
    #[serde(default)]
    events: BTreeSet<EventType>,
}

/// Immutable, versioned registry of component, output and event schemas.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRegistry {
    version: u32,
    components: BTreeMap<ComponentType, ComponentSchema>,
    outputs: BTreeMap<OutputType, OutputSchema>,
    events: BTreeSet<EventType>,
}

impl SchemaRegistry {
    /// Load a registry from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Io`] if the file cannot be read, or any
    /// error [`parse`](Self::parse) returns.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and check a registry from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Yaml`] on malformed YAML and
    /// [`SchemaError::Invalid`] when the document is inconsistent
    /// (bad defaults, duplicate ranks, dangling component references).
    pub fn parse(yaml: &str) -> Result<Self, SchemaError> {
        let raw: RawSchema = serde_yml::from_str(yaml)?;

        let mut components = BTreeMap::new();
        for (ctype, raw_component) in raw.components {
            let mut fields = BTreeMap::new();
            for (field, raw_field) in raw_component.fields {
                let default = raw_field
                    .default
                    .map(|lit| convert_default(&ctype, &field, raw_field.kind, lit))
                    .transpose()?;
                fields.insert(
                    field,
                    FieldSchema {
                        kind: raw_field.kind,
                        default,
                    },
                );
            }
            components.insert(
                ctype,
                ComponentSchema {
                    owner: raw_component.owner,
                    fields,
                },
            );
        }

        let mut ranks = BTreeMap::new();
        for (otype, schema) in &raw.outputs {
            if let Some(previous) = ranks.insert(schema.rank, otype.clone()) {
                return Err(SchemaError::Invalid {
                    reason: format!(
                        "output types {previous} and {otype} share rank {}",
                        schema.rank
                    ),
                });
            }
            match (schema.shape, &schema.component) {
                (PayloadShape::Field, None) => {
                    return Err(SchemaError::Invalid {
                        reason: format!("field output {otype} does not name a component"),
                    });
                }
                (PayloadShape::Field, Some(ctype)) if !components.contains_key(ctype) => {
                    return Err(SchemaError::Invalid {
                        reason: format!("output {otype} targets unknown component {ctype}"),
                    });
                }
                (PayloadShape::Field, Some(_)) => {}
                (_, Some(ctype)) if !components.contains_key(ctype) => {
                    return Err(SchemaError::Invalid {
                        reason: format!("output {otype} names unknown component {ctype}"),
                    });
                }
                _ => {}
            }
        }

        Ok(Self {
            version: raw.version,
            components,
            outputs: raw.outputs,
            events: raw.events,
        })
    }

    /// Schema version.
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Look up a component schema.
    pub fn component(&self, ctype: &ComponentType) -> Option<&ComponentSchema> {
        self.components.get(ctype)
    }

    /// Iterate component schemas in name order.
    pub fn components(&self) -> impl Iterator<Item = (&ComponentType, &ComponentSchema)> {
        self.components.iter()
    }

    /// Look up an output schema.
    pub fn output(&self, otype: &OutputType) -> Option<&OutputSchema> {
        self.outputs.get(otype)
    }

    /// Iterate output schemas in name order.
    pub fn outputs(&self) -> impl Iterator<Item = (&OutputType, &OutputSchema)> {
        self.outputs.iter()
    }

    /// Canonical rank of an output type.
    pub fn rank(&self, otype: &OutputType) -> Option<u32> {
        self.outputs.get(otype).map(|s| s.rank)
    }

    /// Whether an event type is declared.
    pub fn has_event(&self, etype: &EventType) -> bool {
        self.events.contains(etype)
    }

    /// Resolver that owns a component type.
    pub fn owner_of(&self, ctype: &ComponentType) -> Option<&ResolverId> {
        self.components.get(ctype).map(|c| &c.owner)
    }

    /// Validate a component against its schema and return it normalized.
    ///
    /// Absent fields take their declared default; a field without a
    /// default must be present. Unknown fields and kind mismatches fail.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found, in field-name order.
    pub fn validate_component(
        &self,
        ctype: &ComponentType,
        component: &Component,
    ) -> Result<Component, SchemaError> {
        let schema = self
            .components
            .get(ctype)
            .ok_or_else(|| SchemaError::UnknownComponent(ctype.clone()))?;

        for (field, value) in component.fields() {
            let declared = schema.fields.get(field).ok_or_else(|| SchemaError::UnknownField {
                component: ctype.clone(),
                field: field.clone(),
            })?;
            check_kind(ctype, field, declared.kind, value)?;
        }

        let mut normalized = component.clone();
        for (field, declared) in &schema.fields {
            if normalized.get(field.as_str()).is_none() {
                let default = declared.default.clone().ok_or_else(|| SchemaError::MissingField {
                    component: ctype.clone(),
                    field: field.clone(),
                })?;
                normalized.set(field.clone(), default);
            }
        }
        Ok(normalized)
    }

    /// Build a component from declared defaults only.
    ///
    /// # Errors
    ///
    /// Fails if the type is unknown or a field has no default.
    pub fn default_component(&self, ctype: &ComponentType) -> Result<Component, SchemaError> {
        self.validate_component(ctype, &Component::new())
    }

    /// Check that `value` may be stored in `ctype.field`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownComponent`], [`SchemaError::UnknownField`],
    /// [`SchemaError::KindMismatch`] or [`SchemaError::NonFinite`].
    pub fn validate_value(
        &self,
        ctype: &ComponentType,
        field: &FieldName,
        value: &Value,
    ) -> Result<(), SchemaError> {
        let kind = self.field_kind(ctype, field)?;
        check_kind(ctype, field, kind, value)
    }

    /// Declared kind of `ctype.field`.
    ///
    /// # Errors
    ///
    /// Fails if the component or the field is unknown.
    pub fn field_kind(&self, ctype: &ComponentType, field: &FieldName) -> Result<ValueKind, SchemaError> {
        let schema = self
            .components
            .get(ctype)
            .ok_or_else(|| SchemaError::UnknownComponent(ctype.clone()))?;
        schema
            .fields
            .get(field)
            .map(|f| f.kind)
            .ok_or_else(|| SchemaError::UnknownField {
                component: ctype.clone(),
                field: field.clone(),
            })
    }

    /// Check a payload against its output type's schema.
    ///
    /// Returns a human-readable reason on mismatch; the caller wraps it in
    /// a `MalformedOutput` violation with the emitting plugin's context.
    pub fn validate_payload(&self, otype: &OutputType, payload: &Payload) -> Result<(), String> {
        let schema = self
            .outputs
            .get(otype)
            .ok_or_else(|| format!("output type {otype} is not in the schema"))?;
        if schema.shape != payload.shape() {
            return Err(format!(
                "expected a {} payload, found {}",
                schema.shape,
                payload.shape()
            ));
        }
        match payload {
            Payload::Field(write) => {
                if schema.component.as_ref() != Some(&write.component) {
                    return Err(format!(
                        "{otype} may only target {}, found {}",
                        schema
                            .component
                            .as_ref()
                            .map_or("<none>", ComponentType::as_str),
                        write.component
                    ));
                }
                let kind = self
                    .field_kind(&write.component, &write.field)
                    .map_err(|e| e.to_string())?;
                match &write.op {
                    FieldOp::Set(value) => {
                        check_kind(&write.component, &write.field, kind, value).map_err(|e| e.to_string())
                    }
                    FieldOp::Add(delta) | FieldOp::Mul(delta) if kind != ValueKind::Float => Err(
                        format!(
                            "delta {delta} on non-float field {}.{}",
                            write.component, write.field
                        ),
                    ),
                    FieldOp::Add(delta) | FieldOp::Mul(delta) if !delta.is_finite() => {
                        Err(format!("non-finite delta on {}.{}", write.component, write.field))
                    }
                    FieldOp::Add(_) | FieldOp::Mul(_) => Ok(()),
                }
            }
            Payload::Reserve(reservation) => {
                if reservation.amount.is_finite() && reservation.amount >= 0.0 {
                    Ok(())
                } else {
                    Err(format!("invalid reservation amount {}", reservation.amount))
                }
            }
            Payload::Spawn(request) => {
                for (ctype, component) in &request.components {
                    self.validate_component(ctype, component)
                        .map_err(|e| e.to_string())?;
                }
                Ok(())
            }
            Payload::Despawn { .. } | Payload::Command { .. } => Ok(()),
        }
    }

    /// Fail unless `found` equals this registry's version.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::VersionMismatch`].
    pub const fn check_version(&self, found: u32) -> Result<(), SchemaError> {
        if found == self.version {
            Ok(())
        } else {
            Err(SchemaError::VersionMismatch {
                expected: self.version,
                found,
            })
        }
    }
}

fn check_kind(
    ctype: &ComponentType,
    field: &FieldName,
    expected: ValueKind,
    value: &Value,
) -> Result<(), SchemaError> {
    if value.kind() != expected {
        return Err(SchemaError::KindMismatch {
            component: ctype.clone(),
            field: field.clone(),
            expected,
            found: value.kind(),
        });
    }
    match value {
        Value::Float(v) if !v.is_finite() => Err(SchemaError::NonFinite {
            component: ctype.clone(),
            field: field.clone(),
            value: *v,
        }),
        _ => Ok(()),
    }
}

/// Convert a YAML default using the declared kind.
///
/// Integer literals are accepted for float fields since YAML authors write
/// `0` for `0.0`; every other mismatch is rejected.
#[allow(clippy::cast_precision_loss)]
fn convert_default(
    ctype: &ComponentType,
    field: &FieldName,
    kind: ValueKind,
    literal: DefaultLiteral,
) -> Result<Value, SchemaError> {
    let value = match (kind, literal) {
        (ValueKind::Bool, DefaultLiteral::Bool(v)) => Value::Bool(v),
        (ValueKind::Int, DefaultLiteral::Int(v)) => Value::Int(v),
        (ValueKind::Float, DefaultLiteral::Float(v)) => Value::Float(v),
        (ValueKind::Float, DefaultLiteral::Int(v)) => Value::Float(v as f64),
        (ValueKind::Text, DefaultLiteral::Text(v)) => Value::Text(v),
        (ValueKind::Entity, DefaultLiteral::Int(v)) => {
            let Ok(raw) = u64::try_from(v) else {
                return Err(SchemaError::Invalid {
                    reason: format!("default for {ctype}.{field} is a negative entity id"),
                });
            };
            Value::Entity(raw.into())
        }
        (kind, literal) => {
            return Err(SchemaError::Invalid {
                reason: format!("default {literal:?} for {ctype}.{field} is not a {kind}"),
            });
        }
    };
    Ok(value)
}
