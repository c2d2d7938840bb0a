//! Shared fixtures for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lockstep_types::{
    Component, ComponentType, EntityId, FieldOp, FieldWrite, Payload, PhaseName, PluginId, Proposal,
    SpawnRequest, Tag,
};
use lockstep_world::{SchemaRegistry, SpatialConfig, WorldState, WorldView};

use crate::clock::FrameClock;
use crate::config::PhaseConfig;
use crate::frame::{DriverParts, FrameDriver};
use crate::pipeline::ResolverPipeline;
use crate::plugin::{Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
use crate::registry::PluginRegistry;
use crate::resolver::{Resolver, ResolverDeclaration};
use crate::resolvers::{FieldResolver, LifecycleResolver, ReservationResolver};
use crate::rng;
use crate::scheduler::PluginScheduler;

pub(crate) const SCHEMA: &str = r"
version: 1
components:
  Transform:
    owner: fields
    fields:
      x: { kind: float, default: 0 }
      y: { kind: float, default: 0 }
  Thermal:
    owner: fields
    fields:
      heat: { kind: float, default: 0 }
  Relay:
    owner: fields
    fields:
      bandwidth: { kind: float, default: 10 }
  Magazine:
    owner: ammo
    fields:
      rounds: { kind: float, default: 3 }
  CombatState:
    owner: fields
    fields:
      hp: { kind: float, default: 10 }
  InventoryState:
    owner: fields
    fields:
      cargo: { kind: int, default: 0 }
outputs:
  SetPosition: { rank: 10, shape: field, component: Transform }
  ApplyModifier: { rank: 20, shape: field, component: Thermal }
  ReserveBandwidth: { rank: 30, shape: reserve }
  DrawAmmo: { rank: 35, shape: reserve }
  SpawnDrone: { rank: 40, shape: spawn }
  Scuttle: { rank: 50, shape: despawn }
events:
  - ModifierApplied
  - ReservationGranted
  - ReservationDenied
  - EntitySpawned
  - EntityDespawned
  - SpawnRejected
";

pub(crate) fn schema() -> SchemaRegistry {
    SchemaRegistry::parse(SCHEMA).unwrap()
}

pub(crate) fn clock() -> FrameClock {
    FrameClock::new(&[
        PhaseConfig {
            name: PhaseName::from("default"),
            every_n_ticks: 1,
            offset: 0,
        },
        PhaseConfig {
            name: PhaseName::from("sensors"),
            every_n_ticks: 5,
            offset: 0,
        },
    ])
    .unwrap()
}

pub(crate) fn resolvers() -> Vec<Arc<dyn Resolver>> {
    vec![
        Arc::new(
            FieldResolver::new(
                ResolverDeclaration::new("fields", 10)
                    .handles("SetPosition")
                    .handles("ApplyModifier")
                    .owns("Transform")
                    .owns("Thermal")
                    .owns("Relay")
                    .owns("CombatState")
                    .owns("InventoryState"),
            )
            .emitting("ModifierApplied"),
        ),
        Arc::new(ReservationResolver::new(
            ResolverDeclaration::new("reservations", 20).handles("ReserveBandwidth"),
            "Relay",
        )),
        Arc::new(ReservationResolver::new(
            ResolverDeclaration::new("ammo", 25)
                .handles("DrawAmmo")
                .owns("Magazine"),
            "Magazine",
        )),
        Arc::new(LifecycleResolver::new(
            ResolverDeclaration::new("lifecycle", 30)
                .handles("SpawnDrone")
                .handles("Scuttle"),
        )),
    ]
}

type TickFn =
    dyn Fn(&PluginView<'_>, &PluginContext) -> Result<Vec<Proposal>, PluginError> + Send + Sync;

/// A plugin defined by a closure.
pub(crate) struct FnPlugin {
    declaration: PluginDeclaration,
    tick: Box<TickFn>,
}

impl FnPlugin {
    pub(crate) fn new<F>(declaration: PluginDeclaration, tick: F) -> Self
    where
        F: Fn(&PluginView<'_>, &PluginContext) -> Result<Vec<Proposal>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            declaration,
            tick: Box::new(tick),
        }
    }
}

impl Plugin for FnPlugin {
    fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError> {
        (self.tick)(view, ctx)
    }
}

pub(crate) fn heat_write(target: EntityId, op: FieldOp) -> Payload {
    Payload::Field(FieldWrite {
        target,
        component: ComponentType::from("Thermal"),
        field: "heat".into(),
        op,
    })
}

/// A world under construction.
pub(crate) struct World {
    pub(crate) schema: Arc<SchemaRegistry>,
    pub(crate) clock: FrameClock,
    pub(crate) registry: PluginRegistry,
    pub(crate) state: WorldState,
}

impl World {
    pub(crate) fn new() -> Self {
        Self {
            schema: Arc::new(schema()),
            clock: clock(),
            registry: PluginRegistry::new(),
            state: WorldState::new(42),
        }
    }

    pub(crate) fn register(&mut self, plugin: impl Plugin + 'static) {
        self.registry
            .register(Arc::new(plugin), &self.schema, &self.clock)
            .unwrap();
    }

    pub(crate) fn spawn(&mut self, request: &SpawnRequest) -> EntityId {
        self.state.spawn(request, &self.schema, &self.registry).unwrap()
    }

    pub(crate) fn tagged(&mut self, tag: &str, plugins: &[&str]) -> EntityId {
        self.spawn(&SpawnRequest {
            tags: BTreeSet::from([Tag::from(tag)]),
            plugins: plugins.iter().map(|p| PluginId::from(*p)).collect(),
            ..SpawnRequest::default()
        })
    }

    pub(crate) fn ship(&mut self, plugins: &[&str]) -> EntityId {
        self.ship_with(plugins, Vec::new())
    }

    pub(crate) fn ship_with(&mut self, plugins: &[&str], extra: Vec<(&str, Component)>) -> EntityId {
        let mut components: BTreeMap<ComponentType, Component> = ["Transform", "Thermal", "Relay", "Magazine"]
            .into_iter()
            .map(|c| (ComponentType::from(c), Component::new()))
            .collect();
        components.extend(extra.into_iter().map(|(c, v)| (ComponentType::from(c), v)));
        self.spawn(&SpawnRequest {
            tags: BTreeSet::from([Tag::from("ship")]),
            components,
            plugins: plugins.iter().map(|p| PluginId::from(*p)).collect(),
            ..SpawnRequest::default()
        })
    }

    pub(crate) fn view(&self) -> WorldView {
        WorldView::build(
            Arc::new(self.state.clone()),
            rng::frame_seed(self.state.root_seed(), self.state.tick()),
            Arc::clone(&self.schema),
            &SpatialConfig::default(),
            Arc::from(Vec::new()),
        )
    }

    pub(crate) fn pipeline(&self) -> ResolverPipeline {
        ResolverPipeline::new(resolvers(), &self.schema).unwrap()
    }

    pub(crate) fn driver(self, scheduler: PluginScheduler) -> FrameDriver {
        let pipeline = self.pipeline();
        FrameDriver::new(
            DriverParts {
                schema: self.schema,
                registry: Arc::new(self.registry),
                pipeline,
                scheduler,
                clock: self.clock,
                spatial: SpatialConfig::default(),
            },
            self.state,
        )
    }
}
