//! The state store: every entity plus the kernel counters.
//!
//! [`WorldState`] is the persistence unit. Entities are held behind `Arc`
//! so the Next State can start as a cheap structural copy of the Current
//! State and only clone the entities a resolver actually touches.
//!
//! Entity and event identifiers come from monotonic counters stored here;
//! a retired identifier is never handed out again.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use lockstep_types::{ComponentType, EntityId, EventId, SpawnRequest, Tag};

use crate::entity::{AttachRules, Entity};
use crate::error::WorldError;
use crate::schema::SchemaRegistry;

/// Full world state at a frame boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    tick: u64,
    root_seed: u64,
    next_entity_id: u64,
    next_event_id: u64,
    entities: BTreeMap<EntityId, Arc<Entity>>,
}

impl WorldState {
    /// Create an empty world at tick 0.
    pub const fn new(root_seed: u64) -> Self {
        Self {
            tick: 0,
            root_seed,
            next_entity_id: 1,
            next_event_id: 1,
            entities: BTreeMap::new(),
        }
    }

    /// Rebuild a state from persisted parts, checking its invariants.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateEntity`] or
    /// [`WorldError::Inconsistent`] when ids collide, exceed the counter,
    /// or relations point at entities that do not exist.
    pub fn from_parts(
        tick: u64,
        root_seed: u64,
        next_entity_id: u64,
        next_event_id: u64,
        entities: Vec<Entity>,
    ) -> Result<Self, WorldError> {
        if next_entity_id == 0 || next_event_id == 0 {
            return Err(WorldError::Inconsistent {
                reason: "identifier counters start at 1".to_owned(),
            });
        }
        let mut map = BTreeMap::new();
        for entity in entities {
            let id = entity.id();
            if id.into_inner() == 0 || id.into_inner() >= next_entity_id {
                return Err(WorldError::Inconsistent {
                    reason: format!("entity {id} is outside the allocated range"),
                });
            }
            if map.insert(id, Arc::new(entity)).is_some() {
                return Err(WorldError::DuplicateEntity(id));
            }
        }
        for entity in map.values() {
            let dangling = entity
                .parent()
                .into_iter()
                .chain(entity.children().iter().copied())
                .find(|rel| !map.contains_key(rel));
            if let Some(rel) = dangling {
                return Err(WorldError::Inconsistent {
                    reason: format!("entity {} references missing entity {rel}", entity.id()),
                });
            }
        }
        Ok(Self {
            tick,
            root_seed,
            next_entity_id,
            next_event_id,
            entities: map,
        })
    }

    /// Tick counter: the number of frames applied so far.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Root seed of every random stream.
    pub const fn root_seed(&self) -> u64 {
        self.root_seed
    }

    /// Next entity id that will be allocated.
    pub const fn next_entity_id(&self) -> u64 {
        self.next_entity_id
    }

    /// Next event id that will be allocated.
    pub const fn next_event_id(&self) -> u64 {
        self.next_event_id
    }

    /// Entity lookup.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id).map(AsRef::as_ref)
    }

    /// Whether the entity is alive.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Iterate entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().map(AsRef::as_ref)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether there are no live entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Advance the tick counter by one.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::IdOverflow`] at `u64::MAX`.
    pub fn advance_tick(&mut self) -> Result<u64, WorldError> {
        self.tick = self.tick.checked_add(1).ok_or(WorldError::IdOverflow)?;
        Ok(self.tick)
    }

    /// Reserve the next entity id.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::IdOverflow`] when the counter is exhausted.
    pub fn allocate_entity_id(&mut self) -> Result<EntityId, WorldError> {
        let id = self.next_entity_id;
        self.next_entity_id = id.checked_add(1).ok_or(WorldError::IdOverflow)?;
        Ok(EntityId::new(id))
    }

    /// Reserve the next event id.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::IdOverflow`] when the counter is exhausted.
    pub fn allocate_event_id(&mut self) -> Result<EventId, WorldError> {
        let id = self.next_event_id;
        self.next_event_id = id.checked_add(1).ok_or(WorldError::IdOverflow)?;
        Ok(EventId::new(id))
    }

    /// Create an entity directly, outside any frame.
    ///
    /// Used to seed a world before the first frame (for example from a
    /// battle package). Inside a frame, entities are only created through
    /// resolver writes.
    ///
    /// # Errors
    ///
    /// Fails on schema violations, rejected plugin attachments, a missing
    /// parent, or counter exhaustion. Nothing is inserted on failure.
    pub fn spawn(
        &mut self,
        request: &SpawnRequest,
        schema: &SchemaRegistry,
        rules: &dyn AttachRules,
    ) -> Result<EntityId, WorldError> {
        if let Some(parent) = request.parent {
            if !self.contains(parent) {
                return Err(WorldError::UnknownEntity(parent));
            }
        }
        let id = EntityId::new(self.next_entity_id);
        let entity = build_entity(id, request, schema, rules)?;
        self.allocate_entity_id()?;
        self.insert_built(entity);
        Ok(id)
    }

    /// Insert a built entity and link it under its parent. A parent that
    /// is gone by now (despawned earlier in the frame) leaves a root.
    pub(crate) fn insert_built(&mut self, mut entity: Entity) {
        let id = entity.id();
        if let Some(parent) = entity.parent() {
            match self.entities.get_mut(&parent) {
                Some(p) => Arc::make_mut(p).push_child(id),
                None => entity.set_parent(None),
            }
        }
        self.entities.insert(id, Arc::new(entity));
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id).map(Arc::make_mut)
    }

    /// Remove an entity, release its storage and detach its relations.
    ///
    /// Children survive and become roots. Returns whether anything was
    /// removed.
    pub(crate) fn remove(&mut self, id: EntityId) -> bool {
        let Some(removed) = self.entities.remove(&id) else {
            return false;
        };
        if let Some(parent) = removed.parent() {
            if let Some(p) = self.entity_mut(parent) {
                p.remove_child(id);
            }
        }
        for child in removed.children() {
            if let Some(c) = self.entity_mut(*child) {
                c.set_parent(None);
            }
        }
        true
    }

    /// Ids of entities carrying `tag`, ascending.
    pub fn ids_with_tag(&self, tag: &Tag) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.tags().contains(tag))
            .map(|e| e.id())
            .collect()
    }

    /// Component lookup that never fails.
    pub fn component(&self, id: EntityId, ctype: &ComponentType) -> Option<&lockstep_types::Component> {
        self.entity(id).and_then(|e| e.component(ctype))
    }
}

/// Build a validated entity from a spawn request.
pub(crate) fn build_entity(
    id: EntityId,
    request: &SpawnRequest,
    schema: &SchemaRegistry,
    rules: &dyn AttachRules,
) -> Result<Entity, WorldError> {
    let tags: BTreeSet<Tag> = request.tags.clone();
    let mut entity = Entity::new(id, tags);
    entity.set_owner(request.owner);
    entity.set_parent(request.parent);
    for (ctype, component) in &request.components {
        entity.insert_component(schema, ctype.clone(), component)?;
    }
    for plugin in &request.plugins {
        entity.attach_plugin(plugin.clone(), rules)?;
    }
    Ok(entity)
}
