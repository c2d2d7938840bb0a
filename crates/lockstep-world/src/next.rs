//! Next State and per-resolver write overlays.
//!
//! The Next State starts each frame as a structural copy of the Current
//! State (entity `Arc`s are shared until written). Resolvers never write
//! it directly: each one gets a [`NextStateHandle`] whose reads see the
//! Current State plus that resolver's own writes, and nothing else. When
//! the resolver returns successfully its overlay is merged into the Next
//! State. A resolver therefore never observes another resolver's writes
//! within the same frame.
//!
//! Merge order is resolver order, so the outcome is deterministic. Writes
//! to an entity that an earlier resolver despawned are dropped at merge.

use std::collections::{BTreeMap, BTreeSet};

use lockstep_types::{
    Component, ComponentType, ContractViolation, EntityId, FieldName, ResolverId, SpawnRequest, Value,
};
use tracing::debug;

use crate::entity::{AttachRules, Entity};
use crate::error::WorldError;
use crate::schema::SchemaRegistry;
use crate::state::{WorldState, build_entity};

/// The state being built for the end of the current frame.
#[derive(Debug, Clone)]
pub struct NextState {
    state: WorldState,
}

/// Writes staged by one resolver.
#[derive(Debug, Default)]
struct Overlay {
    writes: BTreeMap<(EntityId, ComponentType), Component>,
    spawned: BTreeMap<EntityId, Entity>,
    despawned: BTreeSet<EntityId>,
}

/// What one resolver is allowed to write.
#[derive(Debug, Clone, Copy)]
pub struct WriteScope<'a> {
    /// Resolver identity, for violation reports.
    pub resolver: &'a ResolverId,
    /// Component types the resolver owns.
    pub owns: &'a BTreeSet<ComponentType>,
}

impl NextState {
    /// Start a Next State from the Current State.
    pub fn from_current(current: &WorldState) -> Self {
        Self {
            state: current.clone(),
        }
    }

    /// Read-only access to the merged Next State.
    pub const fn state(&self) -> &WorldState {
        &self.state
    }

    /// Open a write overlay for one resolver.
    pub fn handle<'a>(
        &'a mut self,
        current: &'a WorldState,
        scope: WriteScope<'a>,
        schema: &'a SchemaRegistry,
        rules: &'a dyn AttachRules,
    ) -> NextStateHandle<'a> {
        NextStateHandle {
            next: self,
            current,
            scope,
            schema,
            rules,
            overlay: Overlay::default(),
        }
    }

    /// Reserve an event id from the Next State's counter.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::IdOverflow`] when the counter is exhausted.
    pub fn allocate_event_id(&mut self) -> Result<lockstep_types::EventId, WorldError> {
        self.state.allocate_event_id()
    }

    /// Advance the tick counter and hand back the finished state.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::IdOverflow`] at the end of the tick range.
    pub fn finish(mut self) -> Result<WorldState, WorldError> {
        self.state.advance_tick()?;
        Ok(self.state)
    }

    fn merge(&mut self, overlay: Overlay) {
        for (_, entity) in overlay.spawned {
            self.state.insert_built(entity);
        }
        let mut dropped = 0_usize;
        for ((id, ctype), component) in overlay.writes {
            match self.state.entity_mut(id) {
                Some(entity) => entity.put_component(ctype, component),
                None => dropped = dropped.saturating_add(1),
            }
        }
        for id in overlay.despawned {
            self.state.remove(id);
        }
        if dropped > 0 {
            debug!(dropped, "dropped writes to despawned entities");
        }
    }
}

/// One resolver's view of, and write path into, the Next State.
pub struct NextStateHandle<'a> {
    next: &'a mut NextState,
    current: &'a WorldState,
    scope: WriteScope<'a>,
    schema: &'a SchemaRegistry,
    rules: &'a dyn AttachRules,
    overlay: Overlay,
}

impl NextStateHandle<'_> {
    /// Tick of the frame being resolved.
    pub const fn tick(&self) -> u64 {
        self.current.tick()
    }

    /// Whether the entity is alive from this resolver's point of view.
    pub fn contains(&self, id: EntityId) -> bool {
        !self.overlay.despawned.contains(&id)
            && (self.overlay.spawned.contains_key(&id) || self.current.contains(id))
    }

    /// Entity as this resolver sees it (Current State or own spawn).
    ///
    /// Component values may be stale with respect to this resolver's own
    /// writes; use [`component`](Self::component) for those.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        if self.overlay.despawned.contains(&id) {
            return None;
        }
        self.overlay
            .spawned
            .get(&id)
            .or_else(|| self.current.entity(id))
    }

    /// Component as this resolver sees it: own writes first, then Current.
    pub fn component(&self, id: EntityId, ctype: &ComponentType) -> Option<&Component> {
        if self.overlay.despawned.contains(&id) {
            return None;
        }
        if let Some(written) = self.overlay.writes.get(&(id, ctype.clone())) {
            return Some(written);
        }
        self.entity(id).and_then(|e| e.component(ctype))
    }

    /// Overwrite one field.
    ///
    /// # Errors
    ///
    /// [`ContractViolation::UnownedWrite`] if the resolver does not own the
    /// component type, [`WorldError::UnknownEntity`] /
    /// [`WorldError::MissingComponent`] if there is nothing to write, and
    /// a schema error if the value has the wrong kind.
    pub fn set_field(
        &mut self,
        id: EntityId,
        ctype: &ComponentType,
        field: &FieldName,
        value: Value,
    ) -> Result<(), WorldError> {
        self.check_owner(id, ctype)?;
        self.schema.validate_value(ctype, field, &value)?;
        let mut component = self
            .component(id, ctype)
            .cloned()
            .ok_or_else(|| self.absent(id, ctype))?;
        component.set(field.clone(), value);
        self.overlay.writes.insert((id, ctype.clone()), component);
        Ok(())
    }

    /// Replace (or add) a whole component.
    ///
    /// # Errors
    ///
    /// Same ownership and schema checks as [`set_field`](Self::set_field);
    /// the entity must exist.
    pub fn put_component(
        &mut self,
        id: EntityId,
        ctype: &ComponentType,
        component: &Component,
    ) -> Result<(), WorldError> {
        self.check_owner(id, ctype)?;
        if !self.contains(id) {
            return Err(WorldError::UnknownEntity(id));
        }
        let normalized = self.schema.validate_component(ctype, component)?;
        self.overlay.writes.insert((id, ctype.clone()), normalized);
        Ok(())
    }

    /// Create an entity. The id is allocated immediately and never reused.
    ///
    /// # Errors
    ///
    /// Fails on schema violations, rejected plugin attachments, an unknown
    /// parent, or counter exhaustion.
    pub fn spawn(&mut self, request: &SpawnRequest) -> Result<EntityId, WorldError> {
        if let Some(parent) = request.parent {
            if !self.contains(parent) {
                return Err(WorldError::UnknownEntity(parent));
            }
        }
        let id = EntityId::new(self.next.state.next_entity_id());
        let entity = build_entity(id, request, self.schema, self.rules)?;
        self.next.state.allocate_entity_id()?;
        self.overlay.spawned.insert(id, entity);
        Ok(id)
    }

    /// Tear an entity down at merge time. Returns `false` if it was
    /// already gone.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.overlay.despawned.insert(id);
        self.overlay.writes.retain(|(e, _), _| *e != id);
        true
    }

    /// Merge this overlay into the Next State.
    pub fn commit(self) {
        let Self { next, overlay, .. } = self;
        next.merge(overlay);
    }

    fn check_owner(&self, id: EntityId, ctype: &ComponentType) -> Result<(), WorldError> {
        if self.scope.owns.contains(ctype) {
            Ok(())
        } else {
            Err(ContractViolation::UnownedWrite {
                resolver: self.scope.resolver.clone(),
                entity: id,
                component: ctype.clone(),
                tick: self.tick(),
            }
            .into())
        }
    }

    fn absent(&self, id: EntityId, ctype: &ComponentType) -> WorldError {
        if self.contains(id) {
            WorldError::MissingComponent {
                entity: id,
                component: ctype.clone(),
            }
        } else {
            WorldError::UnknownEntity(id)
        }
    }
}
