//! Battle package boundary types.
//!
//! A [`BattlePackage`] is consumed once when a battle is set up; a
//! [`BattleOutcome`] is produced once when it ends. Neither takes part in
//! the frame loop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, EventType};

/// Immutable input bundle for one battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BattlePackage {
    /// Battle name, echoed in the outcome.
    pub name: String,
    /// Root seed of every random stream in the battle.
    pub seed: u64,
    /// Simulated milliseconds per tick.
    pub tick_duration_ms: u64,
    /// Hard tick limit (0 = until one team remains).
    #[serde(default)]
    pub max_ticks: u64,
    /// Play area.
    pub map: MapSpec,
    /// Participating teams.
    pub teams: Vec<TeamSpec>,
}

/// Rectangular play area with the origin at one corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapSpec {
    /// Extent along x.
    pub width: f64,
    /// Extent along y.
    pub height: f64,
}

/// One team and its ships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamSpec {
    /// Team name, also used as the `team:<name>` tag.
    pub name: String,
    /// Ships at battle start.
    pub ships: Vec<ShipSnapshot>,
}

/// Starting state of one ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipSnapshot {
    /// Ship name, echoed in the outcome.
    pub name: String,
    /// Starting x position.
    pub x: f64,
    /// Starting y position.
    pub y: f64,
    /// Starting heading in radians.
    #[serde(default)]
    pub heading: f64,
    /// Maximum speed in units per second.
    pub max_speed: f64,
    /// Hull points.
    pub hull: f64,
    /// Rounds carried.
    pub ammo: i64,
    /// Weapon range.
    pub weapon_range: f64,
    /// Damage per hit.
    pub weapon_damage: f64,
    /// Sensor range.
    pub sensor_range: f64,
    /// Waypoint the helm steers toward.
    #[serde(default)]
    pub waypoint: Option<(f64, f64)>,
    /// Whether the ship starts mid layer-transition.
    #[serde(default)]
    pub transitioning: bool,
}

/// Output bundle produced when a battle ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleOutcome {
    /// Battle name from the package.
    pub name: String,
    /// Ticks simulated.
    pub ticks: u64,
    /// Sole surviving team, if any.
    pub winner: Option<String>,
    /// Per-ship results in package order.
    pub ships: Vec<ShipOutcome>,
    /// Count of events per event type over the whole battle.
    pub event_summary: BTreeMap<EventType, u64>,
    /// Where to find the replay.
    pub replay: ReplayReference,
}

/// Result for one ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipOutcome {
    /// Ship name from the package.
    pub name: String,
    /// Team name from the package.
    pub team: String,
    /// Entity the ship was simulated as.
    pub entity: EntityId,
    /// Whether the ship was still afloat at the end.
    pub survived: bool,
    /// Remaining hull points (0 when destroyed or removed).
    pub hull: f64,
}

/// Pointer to the replay artifacts of a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReference {
    /// Path of the replay log.
    pub log: String,
    /// Hex state hash after the final frame.
    pub final_hash: String,
}
