//! Immutable, frame-scoped world views.
//!
//! A [`WorldView`] pins one `Arc<WorldState>` together with the frame seed,
//! the frame's spatial index, the schema registry and the previous frame's
//! events. Building one costs an index pass over positioned entities; the
//! state itself is shared, never copied. There is no mutable access path:
//! every accessor hands out shared references only, so the view can be
//! sent to any number of parallel workers.

use std::sync::Arc;

use lockstep_types::{Component, ComponentType, EntityId, Event, Tag, Value};

use crate::entity::Entity;
use crate::schema::SchemaRegistry;
use crate::spatial::{SpatialConfig, SpatialIndex};
use crate::state::WorldState;

/// Point-in-time, read-only projection of the state store.
#[derive(Debug, Clone)]
pub struct WorldView {
    state: Arc<WorldState>,
    frame_seed: u64,
    spatial: Arc<SpatialIndex>,
    schema: Arc<SchemaRegistry>,
    events: Arc<[Event]>,
}

impl WorldView {
    /// Freeze `state` for one frame.
    pub fn build(
        state: Arc<WorldState>,
        frame_seed: u64,
        schema: Arc<SchemaRegistry>,
        spatial: &SpatialConfig,
        events: Arc<[Event]>,
    ) -> Self {
        let index = SpatialIndex::build(&state, spatial);
        Self {
            state,
            frame_seed,
            spatial: Arc::new(index),
            schema,
            events,
        }
    }

    /// Tick the frame is evaluating.
    pub fn tick(&self) -> u64 {
        self.state.tick()
    }

    /// Seed of this frame, derived from the root seed and tick.
    pub const fn frame_seed(&self) -> u64 {
        self.frame_seed
    }

    /// The frozen state.
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// The schema registry.
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Events applied by the previous frame.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Lookup by id.
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.state.entity(id)
    }

    /// All entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.state.entities()
    }

    /// Entities carrying `tag`, in ascending id order.
    pub fn by_tag<'a>(&'a self, tag: &'a Tag) -> impl Iterator<Item = &'a Entity> + 'a {
        self.state.entities().filter(move |e| e.tags().contains(tag))
    }

    /// Component lookup; `None` when the entity or component is absent.
    pub fn component(&self, id: EntityId, ctype: &ComponentType) -> Option<&Component> {
        self.state.component(id, ctype)
    }

    /// Field lookup; `None` when any step is absent.
    pub fn field(&self, id: EntityId, ctype: &ComponentType, field: &str) -> Option<&Value> {
        self.component(id, ctype).and_then(|c| c.get(field))
    }

    /// Component the spatial index reads positions from.
    pub fn position_component(&self) -> &ComponentType {
        self.spatial.position_component()
    }

    /// Indexed position of an entity.
    pub fn position(&self, id: EntityId) -> Option<(f64, f64)> {
        self.spatial.position(id)
    }

    /// Entities within `radius` of a point, nearest first, ties by id.
    pub fn within_radius(&self, x: f64, y: f64, radius: f64) -> Vec<EntityId> {
        self.spatial.within_radius(x, y, radius)
    }

    /// Entities inside an inclusive box, ascending id.
    pub fn within_box(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<EntityId> {
        self.spatial.within_box(min_x, min_y, max_x, max_y)
    }
}
