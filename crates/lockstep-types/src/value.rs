//! Field values and components.
//!
//! Components are plain data: a map from [`FieldName`] to [`Value`]. What
//! fields a component type has, and what kind each field holds, is decided
//! by the schema registry, not by Rust types. Values serialize externally
//! tagged (`{"Float": 1.5}`) so a saved `Int` never reloads as a `Float`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, FieldName};

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Free text.
    Text(String),
    /// Reference to another entity (a lookup relation, not ownership).
    Entity(EntityId),
}

/// The kind of a [`Value`], as declared in the schema registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// [`Value::Bool`].
    Bool,
    /// [`Value::Int`].
    Int,
    /// [`Value::Float`].
    Float,
    /// [`Value::Text`].
    Text,
    /// [`Value::Entity`].
    Entity,
}

impl core::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Entity => "entity",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Return the kind of this value.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Entity(_) => ValueKind::Entity,
        }
    }

    /// Return the float payload, if this is a [`Value::Float`].
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Return the boolean payload, if this is a [`Value::Bool`].
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Return the integer payload, if this is a [`Value::Int`].
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Return the entity reference, if this is a [`Value::Entity`].
    pub const fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(v) => Some(*v),
            _ => None,
        }
    }

    /// Return the text payload, if this is a [`Value::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// A component: a named bag of typed fields with no behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Component {
    fields: BTreeMap<FieldName, Value>,
}

impl Component {
    /// Create an empty component.
    pub const fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with(mut self, field: impl Into<FieldName>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Look up a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(&FieldName::from(field))
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, field: FieldName, value: Value) -> Option<Value> {
        self.fields.insert(field, value)
    }

    /// Float field shortcut.
    pub fn float(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_float)
    }

    /// Boolean field shortcut.
    pub fn bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Integer field shortcut.
    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_int)
    }

    /// Entity reference shortcut.
    pub fn entity(&self, field: &str) -> Option<EntityId> {
        self.get(field).and_then(Value::as_entity)
    }

    /// Iterate fields in ascending name order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldName, &Value)> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the component has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(FieldName, Value)> for Component {
    fn from_iter<I: IntoIterator<Item = (FieldName, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn values_keep_their_kind_through_json() {
        let json = serde_json::to_string(&Value::Int(3)).unwrap();
        assert_eq!(json, r#"{"Int":3}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), ValueKind::Int);
    }

    #[test]
    fn component_accessors_are_kind_strict() {
        let c = Component::new()
            .with("hp", Value::Float(10.0))
            .with("alive", Value::Bool(true))
            .with("ammo", Value::Int(4));
        assert_eq!(c.float("hp"), Some(10.0));
        assert_eq!(c.bool("alive"), Some(true));
        assert_eq!(c.int("ammo"), Some(4));
        assert_eq!(c.float("ammo"), None);
        assert!(c.get("missing").is_none());
    }

    #[test]
    fn component_fields_iterate_in_name_order() {
        let c = Component::new()
            .with("z", Value::Bool(false))
            .with("a", Value::Bool(true));
        let names: Vec<&str> = c.fields().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["a", "z"]);
    }

    #[test]
    fn float_fields_survive_json_bit_for_bit() {
        let mut rng = StdRng::seed_from_u64(17);
        for round in 0..200 {
            let mut c = Component::new();
            for i in 0..100 {
                let scale = if i % 2 == 0 { 1000.0 } else { 1.0e-3 };
                c = c.with(format!("f{i}"), Value::Float(rng.random::<f64>() * scale));
            }
            let json = serde_json::to_string(&c).unwrap();
            let back: Component = serde_json::from_str(&json).unwrap();
            for ((name, before), (_, after)) in c.fields().zip(back.fields()) {
                let (Value::Float(a), Value::Float(b)) = (before, after) else {
                    panic!("{name} changed kind in round {round}");
                };
                assert_eq!(a.to_bits(), b.to_bits(), "{name} drifted in round {round}");
            }
        }
    }
}
