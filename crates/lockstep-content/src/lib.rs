//! Reference naval-combat content for the Lockstep kernel.
//!
//! The kernel knows nothing about ships. This crate supplies everything a
//! battle needs on top of it:
//!
//! - the component, output and event schema ([`naval_schema`]),
//! - the scheduling phases its plugins run in ([`phases`]),
//! - the plugins ([`plugins`]) and resolvers ([`resolvers`]),
//! - battle setup and outcome reporting ([`battle`]).

pub mod battle;
pub mod error;
pub mod names;
pub mod plugins;
pub mod resolvers;

use std::sync::Arc;

use lockstep_core::clock::FrameClock;
use lockstep_core::config::PhaseConfig;
use lockstep_core::pipeline::ResolverPipeline;
use lockstep_core::registry::PluginRegistry;
use lockstep_core::resolver::{Resolver, ResolverDeclaration};
use lockstep_core::resolvers::{FieldResolver, LifecycleResolver, ReservationResolver};
use lockstep_types::{MapSpec, PhaseName};
use lockstep_world::{SchemaError, SchemaRegistry};

pub use battle::{BattleMonitor, Roster, ShipEntry, build_outcome, seed_battle, surviving_teams};
pub use error::ContentError;
pub use resolvers::{CombatResolver, MotionResolver};

use crate::names::{
    ADJUST_HEAT, ALLEGIANCE, COMMS_PHASE, DEFAULT_PHASE, FIRE_WEAPON, HELM, HULL, MAINTENANCE_PHASE,
    MOTION, RELAY, REPAIR, RESERVE_BANDWIDTH, SCUTTLE, SENSOR, SENSORS_PHASE, SET_TRACK, SET_VELOCITY,
    STATUS, THERMAL, TRANSFORM, WEAPON,
};

/// The naval schema document, version 1.
pub const NAVAL_SCHEMA: &str = include_str!("../schema/naval.yaml");

/// Parse [`NAVAL_SCHEMA`].
///
/// # Errors
///
/// Only fails if the bundled document is broken.
pub fn naval_schema() -> Result<SchemaRegistry, SchemaError> {
    SchemaRegistry::parse(NAVAL_SCHEMA)
}

/// Phases the naval plugins are declared in.
///
/// Sensors sweep every other tick; damage control and comms share a
/// five-tick period at different offsets.
pub fn phases() -> Vec<PhaseConfig> {
    [
        (DEFAULT_PHASE, 1, 0),
        (SENSORS_PHASE, 2, 0),
        (MAINTENANCE_PHASE, 5, 0),
        (COMMS_PHASE, 5, 2),
    ]
    .into_iter()
    .map(|(name, every_n_ticks, offset)| PhaseConfig {
        name: PhaseName::from(name),
        every_n_ticks,
        offset,
    })
    .collect()
}

/// The naval resolvers, unordered.
///
/// | Resolver | Priority | Handles | Owns |
/// |---|---|---|---|
/// | `motion` | 10 | `SetVelocity` | `Transform`, `Motion` |
/// | `combat` | 20 | `FireWeapon`, `Repair` | `Hull`, `Weapon` |
/// | `fields` | 30 | `SetTrack`, `AdjustHeat` | sensor, heat and bookkeeping components |
/// | `reservations` | 40 | `ReserveBandwidth` | nothing; relay bandwidth renews every frame |
/// | `lifecycle` | 50 | `Scuttle` | nothing |
pub fn resolvers(map: MapSpec, tick_duration_ms: u64) -> Vec<Arc<dyn Resolver>> {
    let motion = ResolverDeclaration::new("motion", 10)
        .handles(SET_VELOCITY)
        .owns(TRANSFORM)
        .owns(MOTION);
    let combat = ResolverDeclaration::new("combat", 20)
        .handles(FIRE_WEAPON)
        .handles(REPAIR)
        .owns(HULL)
        .owns(WEAPON);
    let fields = [HELM, STATUS, ALLEGIANCE, SENSOR, THERMAL, RELAY]
        .into_iter()
        .fold(
            ResolverDeclaration::new("fields", 30)
                .handles(SET_TRACK)
                .handles(ADJUST_HEAT),
            |decl, component| decl.owns(component),
        );
    let reservations = ResolverDeclaration::new("reservations", 40).handles(RESERVE_BANDWIDTH);
    let lifecycle = ResolverDeclaration::new("lifecycle", 50).handles(SCUTTLE);

    vec![
        Arc::new(MotionResolver::new(motion, tick_duration_ms, map)),
        Arc::new(CombatResolver::new(combat)),
        Arc::new(FieldResolver::new(fields)),
        Arc::new(ReservationResolver::new(reservations, RELAY)),
        Arc::new(LifecycleResolver::new(lifecycle)),
    ]
}

/// Ordered and validated naval pipeline.
///
/// # Errors
///
/// Returns [`ContentError::Pipeline`] if the resolvers disagree with
/// `schema`.
pub fn pipeline(schema: &SchemaRegistry, map: MapSpec, tick_duration_ms: u64) -> Result<ResolverPipeline, ContentError> {
    Ok(ResolverPipeline::new(resolvers(map, tick_duration_ms), schema)?)
}

/// Registry holding every naval plugin.
///
/// # Errors
///
/// Returns [`ContentError::Registry`] if a plugin declaration does not
/// fit `schema` or `clock`.
pub fn registry(schema: &SchemaRegistry, clock: &FrameClock) -> Result<PluginRegistry, ContentError> {
    let mut registry = PluginRegistry::new();
    for plugin in plugins::all() {
        registry.register(plugin, schema, clock)?;
    }
    Ok(registry)
}
