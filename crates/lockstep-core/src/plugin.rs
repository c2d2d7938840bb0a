//! The plugin capability interface.
//!
//! A plugin is a pure function of the frame's [`WorldView`] and one entity.
//! It sees the world through a [`PluginView`] that enforces its declared
//! read set, and it builds proposals through a [`PluginContext`] that
//! stamps trace ids deterministically.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use rand_chacha::ChaCha8Rng;

use lockstep_types::{
    Component, ComponentType, ContractViolation, EntityId, Event, EventType, OutputType, Payload,
    PhaseName, PluginId, Proposal, Tag, Value,
};
use lockstep_world::{Entity, WorldView};

use crate::rng::{self, StreamPurpose};

/// Static metadata of a plugin, checked at registration, attach time and
/// on every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDeclaration {
    /// Plugin identifier; also its position in the per-entity order.
    pub id: PluginId,
    /// Tags an entity must carry for the plugin to attach and run.
    pub required_tags: BTreeSet<Tag>,
    /// Component types the plugin may read.
    pub reads: BTreeSet<ComponentType>,
    /// Output types the plugin may emit.
    pub emits: BTreeSet<OutputType>,
    /// Event types the plugin sees from the previous frame.
    pub observes: BTreeSet<EventType>,
    /// Phases the plugin runs in.
    pub phases: BTreeSet<PhaseName>,
}

impl PluginDeclaration {
    /// Empty declaration for `id`, in no phase.
    pub fn new(id: impl Into<PluginId>) -> Self {
        Self {
            id: id.into(),
            required_tags: BTreeSet::new(),
            reads: BTreeSet::new(),
            emits: BTreeSet::new(),
            observes: BTreeSet::new(),
            phases: BTreeSet::new(),
        }
    }

    /// Require a tag.
    #[must_use]
    pub fn requires(mut self, tag: impl Into<Tag>) -> Self {
        self.required_tags.insert(tag.into());
        self
    }

    /// Declare a readable component type.
    #[must_use]
    pub fn reads(mut self, ctype: impl Into<ComponentType>) -> Self {
        self.reads.insert(ctype.into());
        self
    }

    /// Declare an emittable output type.
    #[must_use]
    pub fn emits(mut self, otype: impl Into<OutputType>) -> Self {
        self.emits.insert(otype.into());
        self
    }

    /// Declare an observed event type.
    #[must_use]
    pub fn observes(mut self, etype: impl Into<EventType>) -> Self {
        self.observes.insert(etype.into());
        self
    }

    /// Add a phase.
    #[must_use]
    pub fn in_phase(mut self, phase: impl Into<PhaseName>) -> Self {
        self.phases.insert(phase.into());
        self
    }
}

/// An isolated plugin failure. The invocation's proposals are discarded
/// and a diagnostic event is recorded; the frame continues.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// An input the plugin needs is absent.
    #[error("entity {entity} has no {component}")]
    MissingInput {
        /// Entity that lacks the component.
        entity: EntityId,
        /// Missing component type.
        component: ComponentType,
    },

    /// Any other failure.
    #[error("{reason}")]
    Failed {
        /// Human-readable explanation.
        reason: String,
    },
}

/// A pure, declaration-bound module evaluated once per (entity, plugin)
/// pair per active frame.
pub trait Plugin: Send + Sync {
    /// Static metadata.
    fn declaration(&self) -> &PluginDeclaration;

    /// Evaluate on `ctx.entity()` and return proposals.
    ///
    /// # Errors
    ///
    /// Any error isolates this invocation only.
    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError>;
}

/// Structural part of an entity, without component access.
///
/// Component data goes through [`PluginView::component`] so that every
/// read is checked against the declaration.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a>(&'a Entity);

impl<'a> EntityRef<'a> {
    /// Entity id.
    pub const fn id(&self) -> EntityId {
        self.0.id()
    }

    /// Classification tags.
    pub const fn tags(&self) -> &'a BTreeSet<Tag> {
        self.0.tags()
    }

    /// Whether the entity carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.0.has_tag(tag)
    }

    /// Weak owner reference.
    pub const fn owner(&self) -> Option<EntityId> {
        self.0.owner()
    }

    /// Parent entity.
    pub const fn parent(&self) -> Option<EntityId> {
        self.0.parent()
    }

    /// Children in insertion order.
    pub fn children(&self) -> &'a [EntityId] {
        self.0.children()
    }

    /// Attached plugins in id order.
    pub fn plugins(&self) -> &'a [PluginId] {
        self.0.plugins()
    }
}

/// Read-set-enforcing window onto the frame's [`WorldView`].
///
/// An undeclared read returns `None` and records an
/// [`ContractViolation::UndeclaredRead`]; the scheduler turns the first
/// recorded violation into a fatal frame error after the invocation.
pub struct PluginView<'a> {
    view: &'a WorldView,
    declaration: &'a PluginDeclaration,
    entity: EntityId,
    violation: RefCell<Option<ContractViolation>>,
}

impl<'a> PluginView<'a> {
    /// Window for `declaration` evaluated on `entity`.
    pub const fn new(view: &'a WorldView, declaration: &'a PluginDeclaration, entity: EntityId) -> Self {
        Self {
            view,
            declaration,
            entity,
            violation: RefCell::new(None),
        }
    }

    /// Entity the plugin is evaluated on.
    pub const fn entity_id(&self) -> EntityId {
        self.entity
    }

    /// Tick being evaluated.
    pub fn tick(&self) -> u64 {
        self.view.tick()
    }

    /// Structural lookup by id.
    pub fn entity(&self, id: EntityId) -> Option<EntityRef<'a>> {
        self.view.entity(id).map(EntityRef)
    }

    /// The evaluated entity itself.
    pub fn this(&self) -> Option<EntityRef<'a>> {
        self.entity(self.entity)
    }

    /// Entities carrying `tag`, ascending by id.
    pub fn by_tag(&self, tag: &Tag) -> Vec<EntityRef<'a>> {
        let view: &'a WorldView = self.view;
        view.entities()
            .filter(|e| e.tags().contains(tag))
            .map(EntityRef)
            .collect()
    }

    /// Component lookup, checked against the declared read set.
    pub fn component(&self, id: EntityId, ctype: &ComponentType) -> Option<&'a Component> {
        if !self.may_read(ctype) {
            return None;
        }
        self.view.component(id, ctype)
    }

    /// One field of a component, checked like [`component`](Self::component).
    pub fn field(&self, id: EntityId, ctype: &ComponentType, field: &str) -> Option<&'a Value> {
        self.component(id, ctype).and_then(|c| c.get(field))
    }

    /// A float field, checked like [`component`](Self::component).
    pub fn float(&self, id: EntityId, ctype: &ComponentType, field: &str) -> Option<f64> {
        self.field(id, ctype, field).and_then(Value::as_float)
    }

    /// Positioned entities within `radius`, nearest first, ties by id.
    ///
    /// Spatial queries read positions, so they need the position component
    /// in the read set; without it the result is empty and the read is
    /// recorded as undeclared.
    pub fn within_radius(&self, x: f64, y: f64, radius: f64) -> Vec<EntityId> {
        if !self.may_read(self.view.position_component()) {
            return Vec::new();
        }
        self.view.within_radius(x, y, radius)
    }

    /// Positioned entities inside the box, ascending by id. Checked like
    /// [`within_radius`](Self::within_radius).
    pub fn within_box(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<EntityId> {
        if !self.may_read(self.view.position_component()) {
            return Vec::new();
        }
        self.view.within_box(min_x, min_y, max_x, max_y)
    }

    /// Previous frame's events of the declared `observes` types.
    pub fn events(&self) -> impl Iterator<Item = &'a Event> + '_ {
        self.view
            .events()
            .iter()
            .filter(|e| self.declaration.observes.contains(&e.event_type))
    }

    /// The first contract violation recorded during the invocation.
    pub fn take_violation(&self) -> Option<ContractViolation> {
        self.violation.borrow_mut().take()
    }

    fn may_read(&self, ctype: &ComponentType) -> bool {
        if self.declaration.reads.contains(ctype) {
            return true;
        }
        self.record(ContractViolation::UndeclaredRead {
            plugin: self.declaration.id.clone(),
            entity: self.entity,
            tick: self.view.tick(),
            component: ctype.clone(),
        });
        false
    }

    fn record(&self, violation: ContractViolation) {
        let mut slot = self.violation.borrow_mut();
        if slot.is_none() {
            *slot = Some(violation);
        }
    }
}

/// Per-invocation helpers: identity, RNG stream and proposal builders.
#[derive(Debug)]
pub struct PluginContext {
    entity: EntityId,
    plugin: PluginId,
    tick: u64,
    frame_seed: u64,
    next_trace: Cell<u32>,
}

impl PluginContext {
    /// Context for `plugin` on `entity` in the frame seeded by `frame_seed`.
    pub const fn new(entity: EntityId, plugin: PluginId, tick: u64, frame_seed: u64) -> Self {
        Self {
            entity,
            plugin,
            tick,
            frame_seed,
            next_trace: Cell::new(0),
        }
    }

    /// Entity the plugin is evaluated on.
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// The running plugin.
    pub const fn plugin(&self) -> &PluginId {
        &self.plugin
    }

    /// Tick being evaluated.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// This invocation's random stream. Every call starts the stream over,
    /// so create it once per invocation.
    pub fn rng(&self) -> ChaCha8Rng {
        rng::stream(
            self.frame_seed,
            StreamPurpose::Plugin {
                entity: self.entity,
                plugin: &self.plugin,
            },
        )
    }

    /// A root proposal with a fresh trace.
    pub fn propose(&self, output_type: impl Into<OutputType>, payload: Payload) -> Proposal {
        let seq = self.next_trace.get();
        self.next_trace.set(seq.saturating_add(1));
        Proposal {
            output_type: output_type.into(),
            trace: rng::trace_id(self.frame_seed, self.entity, &self.plugin, seq),
            cause: None,
            payload,
        }
    }

    /// A proposal triggered by `event`, continuing its chain.
    pub fn propose_caused_by(
        &self,
        event: &Event,
        output_type: impl Into<OutputType>,
        payload: Payload,
    ) -> Proposal {
        Proposal {
            output_type: output_type.into(),
            trace: event.trace,
            cause: Some(event.id),
            payload,
        }
    }
}
