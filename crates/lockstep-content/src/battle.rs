//! Battle setup and outcome reporting.
//!
//! [`seed_battle`] turns a [`BattlePackage`] into a tick-0 world;
//! [`BattleMonitor`] watches the frames and ends the run once at most one
//! team is still afloat; [`build_outcome`] assembles the report.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use lockstep_core::frame::{FrameDriver, FrameReport};
use lockstep_core::runner::{FrameCallback, FrameVerdict};
use lockstep_types::{
    BattleOutcome, BattlePackage, Component, ComponentType, EntityId, EventType, PluginId,
    ReplayReference, ShipOutcome, ShipSnapshot, SpawnRequest, Tag, Value,
};
use lockstep_world::{AttachRules, SchemaRegistry, WorldState};

use crate::error::ContentError;
use crate::names::{
    ALLEGIANCE, COMMAND, HELM, HULL, MOTION, PLATFORM, RELAY, RELAY_TAG, SENSOR, SHIP, STATUS,
    THERMAL, TRANSFORM, WEAPON,
};

/// Plugins attached to every ship.
pub const SHIP_PLUGINS: [&str; 6] = ["helm", "sensor", "fire_control", "coolant", "comms", "damage_control"];

/// Plugins attached to the fleet command platform.
pub const COMMAND_PLUGINS: [&str; 1] = ["salvage"];

/// One ship and the entity it was seeded as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipEntry {
    /// Ship name from the package.
    pub name: String,
    /// Team name from the package.
    pub team: String,
    /// Entity id.
    pub entity: EntityId,
}

/// Entities created by [`seed_battle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    /// Fleet command platform running salvage.
    pub command: EntityId,
    /// Communications relay at the map center.
    pub relay: EntityId,
    /// Ships in package order.
    pub ships: Vec<ShipEntry>,
}

/// Validate `package` and build the world it describes.
///
/// Entities are created in a fixed order: the command platform, the
/// relay, then every ship team by team in package order.
///
/// # Errors
///
/// Returns [`ContentError::InvalidPackage`] for packages that cannot be
/// simulated and [`ContentError::World`] if a spawn is rejected.
pub fn seed_battle(
    package: &BattlePackage,
    schema: &SchemaRegistry,
    rules: &dyn AttachRules,
) -> Result<(WorldState, Roster), ContentError> {
    validate(package)?;
    let mut state = WorldState::new(package.seed);

    let command = state.spawn(
        &request(&[PLATFORM, COMMAND], Vec::new(), &COMMAND_PLUGINS),
        schema,
        rules,
    )?;

    let ship_count = package.teams.iter().map(|t| t.ships.len()).sum::<usize>();
    let bandwidth = f64::from(u32::try_from(ship_count / 2).unwrap_or(u32::MAX)).max(1.0);
    let relay = state.spawn(
        &request(
            &[PLATFORM, RELAY_TAG],
            vec![
                (
                    TRANSFORM,
                    Component::new()
                        .with("x", Value::Float(package.map.width / 2.0))
                        .with("y", Value::Float(package.map.height / 2.0)),
                ),
                (RELAY, Component::new().with("bandwidth", Value::Float(bandwidth))),
            ],
            &[],
        ),
        schema,
        rules,
    )?;

    let mut ships = Vec::with_capacity(ship_count);
    for team in &package.teams {
        let team_tag = format!("team:{}", team.name);
        for ship in &team.ships {
            let mut req = request(&[SHIP], ship_components(&team.name, ship), &SHIP_PLUGINS);
            req.tags.insert(Tag::from(team_tag.as_str()));
            req.owner = Some(command);
            let entity = state.spawn(&req, schema, rules)?;
            ships.push(ShipEntry {
                name: ship.name.clone(),
                team: team.name.clone(),
                entity,
            });
        }
    }

    info!(
        battle = %package.name,
        teams = package.teams.len(),
        ships = ships.len(),
        seed = package.seed,
        "Battle seeded"
    );
    Ok((state, Roster { command, relay, ships }))
}

fn validate(package: &BattlePackage) -> Result<(), ContentError> {
    let invalid = |reason: String| Err(ContentError::InvalidPackage { reason });
    if package.tick_duration_ms == 0 {
        return invalid("tick_duration_ms must be positive".to_owned());
    }
    let has_area = package.map.width > 0.0 && package.map.height > 0.0;
    if !has_area {
        return invalid(format!("map {}x{} has no area", package.map.width, package.map.height));
    }
    if package.teams.len() < 2 {
        return invalid("a battle needs at least two teams".to_owned());
    }
    let mut teams = BTreeSet::new();
    for team in &package.teams {
        if !teams.insert(team.name.as_str()) {
            return invalid(format!("team {} listed twice", team.name));
        }
        if team.ships.is_empty() {
            return invalid(format!("team {} has no ships", team.name));
        }
        let mut names = BTreeSet::new();
        for ship in &team.ships {
            if !names.insert(ship.name.as_str()) {
                return invalid(format!("ship {} appears twice in team {}", ship.name, team.name));
            }
            let on_map = (0.0..=package.map.width).contains(&ship.x) && (0.0..=package.map.height).contains(&ship.y);
            if !on_map {
                return invalid(format!("ship {} starts off the map", ship.name));
            }
            if ship.hull <= 0.0 || ship.max_speed < 0.0 || ship.ammo < 0 {
                return invalid(format!("ship {} has negative or empty stats", ship.name));
            }
        }
    }
    Ok(())
}

fn request(tags: &[&str], components: Vec<(&str, Component)>, plugins: &[&str]) -> SpawnRequest {
    SpawnRequest {
        tags: tags.iter().map(|t| Tag::from(*t)).collect(),
        components: components
            .into_iter()
            .map(|(ctype, c)| (ComponentType::from(ctype), c))
            .collect(),
        plugins: plugins.iter().map(|p| PluginId::from(*p)).collect(),
        ..SpawnRequest::default()
    }
}

fn ship_components(team: &str, ship: &ShipSnapshot) -> Vec<(&'static str, Component)> {
    let (has_waypoint, (wx, wy)) = ship.waypoint.map_or((false, (0.0, 0.0)), |w| (true, w));
    vec![
        (
            TRANSFORM,
            Component::new()
                .with("x", Value::Float(ship.x))
                .with("y", Value::Float(ship.y))
                .with("heading", Value::Float(ship.heading)),
        ),
        (MOTION, Component::new().with("max_speed", Value::Float(ship.max_speed))),
        (
            HELM,
            Component::new()
                .with("has_waypoint", Value::Bool(has_waypoint))
                .with("waypoint_x", Value::Float(wx))
                .with("waypoint_y", Value::Float(wy)),
        ),
        (STATUS, Component::new().with("transitioning", Value::Bool(ship.transitioning))),
        (
            ALLEGIANCE,
            Component::new()
                .with("team", Value::Text(team.to_owned()))
                .with("name", Value::Text(ship.name.clone())),
        ),
        (SENSOR, Component::new().with("range", Value::Float(ship.sensor_range))),
        (THERMAL, Component::new()),
        (
            HULL,
            Component::new()
                .with("hp", Value::Float(ship.hull))
                .with("max_hp", Value::Float(ship.hull)),
        ),
        (
            WEAPON,
            Component::new()
                .with("range", Value::Float(ship.weapon_range))
                .with("damage", Value::Float(ship.weapon_damage))
                .with("ammo", Value::Int(ship.ammo)),
        ),
    ]
}

fn afloat(state: &WorldState, id: EntityId) -> bool {
    state
        .component(id, &ComponentType::from(HULL))
        .and_then(|h| h.bool("destroyed"))
        == Some(false)
}

/// Teams with at least one ship still afloat.
pub fn surviving_teams(state: &WorldState, roster: &Roster) -> BTreeSet<String> {
    roster
        .ships
        .iter()
        .filter(|s| afloat(state, s.entity))
        .map(|s| s.team.clone())
        .collect()
}

/// Frame callback that tallies events and ends the battle once at most
/// one team is afloat.
#[derive(Debug, Clone)]
pub struct BattleMonitor {
    roster: Roster,
    summary: BTreeMap<EventType, u64>,
}

impl BattleMonitor {
    /// Monitor for the ships in `roster`.
    pub const fn new(roster: Roster) -> Self {
        Self {
            roster,
            summary: BTreeMap::new(),
        }
    }

    /// Ships being watched.
    pub const fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Events seen so far, per type.
    pub const fn summary(&self) -> &BTreeMap<EventType, u64> {
        &self.summary
    }

    /// Count `report`'s events and decide whether the battle is over.
    pub fn observe(&mut self, report: &FrameReport, state: &WorldState) -> FrameVerdict {
        for event in &report.events {
            let count = self.summary.entry(event.event_type.clone()).or_insert(0);
            *count = count.saturating_add(1);
        }
        let teams = surviving_teams(state, &self.roster);
        let mut remaining = teams.iter();
        match (remaining.next(), remaining.next()) {
            (None, _) => FrameVerdict::Finish("no ships remain afloat".to_owned()),
            (Some(team), None) => FrameVerdict::Finish(format!("team {team} holds the field")),
            (Some(_), Some(_)) => FrameVerdict::Continue,
        }
    }
}

impl FrameCallback for BattleMonitor {
    fn on_frame(&mut self, report: &FrameReport, driver: &FrameDriver) -> FrameVerdict {
        self.observe(report, driver.state())
    }
}

/// Assemble the battle report from the final state.
///
/// Ships appear in package order. A ship that was sunk and salvaged
/// reports zero hull.
pub fn build_outcome(
    package: &BattlePackage,
    monitor: &BattleMonitor,
    state: &WorldState,
    replay: ReplayReference,
) -> BattleOutcome {
    let hull = ComponentType::from(HULL);
    let ships = monitor
        .roster
        .ships
        .iter()
        .map(|entry| {
            let survived = afloat(state, entry.entity);
            let hp = state
                .component(entry.entity, &hull)
                .and_then(|h| h.float("hp"))
                .filter(|_| survived)
                .unwrap_or(0.0);
            ShipOutcome {
                name: entry.name.clone(),
                team: entry.team.clone(),
                entity: entry.entity,
                survived,
                hull: hp,
            }
        })
        .collect();

    let teams = surviving_teams(state, &monitor.roster);
    let winner = if teams.len() == 1 {
        teams.into_iter().next()
    } else {
        None
    };

    BattleOutcome {
        name: package.name.clone(),
        ticks: state.tick(),
        winner,
        ships,
        event_summary: monitor.summary.clone(),
        replay,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use lockstep_core::clock::FrameClock;
    use lockstep_core::registry::PluginRegistry;
    use lockstep_types::{MapSpec, TeamSpec};

    use super::*;
    use crate::{naval_schema, phases, registry};

    pub(crate) fn snapshot(name: &str, x: f64, y: f64) -> ShipSnapshot {
        ShipSnapshot {
            name: name.to_owned(),
            x,
            y,
            heading: 0.0,
            max_speed: 10.0,
            hull: 30.0,
            ammo: 10,
            weapon_range: 300.0,
            weapon_damage: 10.0,
            sensor_range: 500.0,
            waypoint: None,
            transitioning: false,
        }
    }

    pub(crate) fn package() -> BattlePackage {
        BattlePackage {
            name: "strait".to_owned(),
            seed: 11,
            tick_duration_ms: 100,
            max_ticks: 200,
            map: MapSpec {
                width: 1000.0,
                height: 1000.0,
            },
            teams: vec![
                TeamSpec {
                    name: "red".to_owned(),
                    ships: vec![snapshot("Vigil", 400.0, 500.0), snapshot("Warden", 400.0, 540.0)],
                },
                TeamSpec {
                    name: "blue".to_owned(),
                    ships: vec![snapshot("Lancer", 600.0, 500.0)],
                },
            ],
        }
    }

    fn setup() -> (SchemaRegistry, PluginRegistry) {
        let schema = naval_schema().unwrap();
        let clock = FrameClock::new(&phases()).unwrap();
        let registry = registry(&schema, &clock).unwrap();
        (schema, registry)
    }

    #[test]
    fn seeding_creates_platforms_then_ships() {
        let (schema, registry) = setup();
        let (state, roster) = seed_battle(&package(), &schema, &registry).unwrap();

        assert_eq!(roster.command, EntityId::new(1));
        assert_eq!(roster.relay, EntityId::new(2));
        let ids: Vec<u64> = roster.ships.iter().map(|s| s.entity.into_inner()).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(state.tick(), 0);

        let lancer = state.entity(EntityId::new(5)).unwrap();
        assert!(lancer.tags().contains(&Tag::from("team:blue")));
        assert_eq!(lancer.owner(), Some(roster.command));
        assert_eq!(lancer.plugins().len(), SHIP_PLUGINS.len());
        let hull = lancer.component(&ComponentType::from(HULL)).unwrap();
        assert_eq!(hull.get("max_hp"), Some(&Value::Float(30.0)));

        let bandwidth = state
            .component(roster.relay, &ComponentType::from(RELAY))
            .and_then(|r| r.float("bandwidth"))
            .unwrap();
        assert!((bandwidth - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unusable_packages_are_rejected() {
        let (schema, registry) = setup();
        let mut lonely = package();
        lonely.teams.truncate(1);
        let mut off_map = package();
        off_map.teams.first_mut().unwrap().ships.first_mut().unwrap().x = -1.0;
        let mut twins = package();
        twins.teams.first_mut().unwrap().ships.push(snapshot("Vigil", 10.0, 10.0));
        let mut frozen = package();
        frozen.tick_duration_ms = 0;

        for bad in [lonely, off_map, twins, frozen] {
            assert!(matches!(
                seed_battle(&bad, &schema, &registry),
                Err(ContentError::InvalidPackage { .. })
            ));
        }
    }

    #[test]
    fn outcome_reports_sunk_ships_and_the_winner() {
        let (schema, registry) = setup();
        let package = package();
        let (mut state, roster) = seed_battle(&package, &schema, &registry).unwrap();
        let lancer = roster.ships.last().unwrap().entity;
        let sunk = Component::new()
            .with("hp", Value::Float(0.0))
            .with("max_hp", Value::Float(30.0))
            .with("destroyed", Value::Bool(true));
        let mut entities: Vec<_> = state.entities().cloned().collect();
        for entity in &mut entities {
            if entity.id() == lancer {
                entity.insert_component(&schema, ComponentType::from(HULL), &sunk).unwrap();
            }
        }
        state = WorldState::from_parts(9, state.root_seed(), state.next_entity_id(), 1, entities).unwrap();

        assert_eq!(surviving_teams(&state, &roster), BTreeSet::from(["red".to_owned()]));
        let monitor = BattleMonitor::new(roster);
        let replay = ReplayReference {
            log: "replay.jsonl".to_owned(),
            final_hash: String::new(),
        };
        let outcome = build_outcome(&package, &monitor, &state, replay);
        assert_eq!(outcome.winner.as_deref(), Some("red"));
        assert_eq!(outcome.ticks, 9);
        let last = outcome.ships.last().unwrap();
        assert!(!last.survived);
        assert!(last.hull.abs() < 1e-9);
        assert!(outcome.ships.first().unwrap().survived);
    }
}
