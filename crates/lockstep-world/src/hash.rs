//! Canonical state hashing.
//!
//! The hash covers the tick, the root seed, both id counters and every
//! entity (tags, relations, plugins, components) in ascending id order.
//! Floats are hashed by bit pattern so `-0.0` and `0.0` differ, as they
//! would in a byte-for-byte comparison of saved state.

use serde::{Deserialize, Serialize};

use lockstep_types::Value;

use crate::state::WorldState;

/// A 32-byte blake3 digest of a [`WorldState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StateHash([u8; 32]);

impl StateHash {
    /// Raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }
}

impl core::fmt::Display for StateHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<StateHash> for String {
    fn from(hash: StateHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for StateHash {
    type Error = String;

    fn try_from(hex: String) -> Result<Self, Self::Error> {
        blake3::Hash::from_hex(hex.as_bytes())
            .map(|h| Self(*h.as_bytes()))
            .map_err(|e| format!("invalid state hash {hex}: {e}"))
    }
}

/// Hash a state over its canonical byte encoding.
pub fn state_hash(state: &WorldState) -> StateHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"lockstep-state-v1");
    hasher.update(&state.tick().to_le_bytes());
    hasher.update(&state.root_seed().to_le_bytes());
    hasher.update(&state.next_entity_id().to_le_bytes());
    hasher.update(&state.next_event_id().to_le_bytes());
    hash_len(&mut hasher, state.len());
    for entity in state.entities() {
        hasher.update(&entity.id().into_inner().to_le_bytes());
        hash_len(&mut hasher, entity.tags().len());
        for tag in entity.tags() {
            hash_str(&mut hasher, tag.as_str());
        }
        hash_opt_id(&mut hasher, entity.owner().map(|e| e.into_inner()));
        hash_opt_id(&mut hasher, entity.parent().map(|e| e.into_inner()));
        hash_len(&mut hasher, entity.children().len());
        for child in entity.children() {
            hasher.update(&child.into_inner().to_le_bytes());
        }
        hash_len(&mut hasher, entity.plugins().len());
        for plugin in entity.plugins() {
            hash_str(&mut hasher, plugin.as_str());
        }
        hash_len(&mut hasher, entity.components().len());
        for (ctype, component) in entity.components() {
            hash_str(&mut hasher, ctype.as_str());
            hash_len(&mut hasher, component.len());
            for (field, value) in component.fields() {
                hash_str(&mut hasher, field.as_str());
                hash_value(&mut hasher, value);
            }
        }
    }
    StateHash(*hasher.finalize().as_bytes())
}

fn hash_len(hasher: &mut blake3::Hasher, len: usize) {
    hasher.update(&u64::try_from(len).unwrap_or(u64::MAX).to_le_bytes());
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hash_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn hash_opt_id(hasher: &mut blake3::Hasher, id: Option<u64>) {
    match id {
        Some(raw) => {
            hasher.update(&[1]);
            hasher.update(&raw.to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn hash_value(hasher: &mut blake3::Hasher, value: &Value) {
    match value {
        Value::Bool(v) => {
            hasher.update(&[0, u8::from(*v)]);
        }
        Value::Int(v) => {
            hasher.update(&[1]);
            hasher.update(&v.to_le_bytes());
        }
        Value::Float(v) => {
            hasher.update(&[2]);
            hasher.update(&v.to_bits().to_le_bytes());
        }
        Value::Text(v) => {
            hasher.update(&[3]);
            hash_str(hasher, v);
        }
        Value::Entity(v) => {
            hasher.update(&[4]);
            hasher.update(&v.into_inner().to_le_bytes());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_seed_and_tick() {
        let a = state_hash(&WorldState::new(1));
        let b = state_hash(&WorldState::new(2));
        assert_ne!(a, b);
        let mut c = WorldState::new(1);
        c.advance_tick().unwrap();
        assert_ne!(a, state_hash(&c));
        assert_eq!(a, state_hash(&WorldState::new(1)));
    }

    #[test]
    fn hash_round_trips_through_hex() {
        let h = state_hash(&WorldState::new(5));
        let json = serde_json::to_string(&h).unwrap();
        let back: StateHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
        assert_eq!(h.to_hex().len(), 64);
    }
}
