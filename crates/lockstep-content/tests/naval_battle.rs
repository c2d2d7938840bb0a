//! End-to-end battles on the naval content.
//!
//! These drive the real frame driver with the bundled schema, plugins and
//! resolvers, so they cover plugin scheduling, resolution order, salvage
//! reacting to destroyed hulls, and determinism across schedulers.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use lockstep_content::{BattleMonitor, Roster, naval_schema, phases, pipeline, registry, seed_battle};
use lockstep_core::clock::FrameClock;
use lockstep_core::config::SchedulerConfig;
use lockstep_core::frame::{DriverParts, FrameDriver, FrameReport};
use lockstep_core::operator::{OperatorState, RunEndReason};
use lockstep_core::runner::{FrameVerdict, run_frames};
use lockstep_core::scheduler::PluginScheduler;
use lockstep_ledger::AuditResult;
use lockstep_types::{
    BattlePackage, Cause, EventType, MapSpec, ShipSnapshot, TeamSpec,
};
use lockstep_world::SpatialConfig;

fn ship(name: &str, x: f64, y: f64) -> ShipSnapshot {
    ShipSnapshot {
        name: name.to_owned(),
        x,
        y,
        heading: 0.0,
        max_speed: 12.0,
        hull: 30.0,
        ammo: 12,
        weapon_range: 300.0,
        weapon_damage: 10.0,
        sensor_range: 600.0,
        waypoint: None,
        transitioning: false,
    }
}

fn package() -> BattlePackage {
    BattlePackage {
        name: "narrows".to_owned(),
        seed: 2024,
        tick_duration_ms: 100,
        max_ticks: 300,
        map: MapSpec {
            width: 1000.0,
            height: 1000.0,
        },
        teams: vec![
            TeamSpec {
                name: "red".to_owned(),
                ships: vec![ship("Vigil", 420.0, 500.0), ship("Warden", 420.0, 560.0)],
            },
            TeamSpec {
                name: "blue".to_owned(),
                ships: vec![ship("Lancer", 600.0, 520.0)],
            },
        ],
    }
}

fn driver(package: &BattlePackage, scheduler: PluginScheduler) -> (FrameDriver, Roster) {
    let schema = naval_schema().unwrap();
    let clock = FrameClock::new(&phases()).unwrap();
    let registry = registry(&schema, &clock).unwrap();
    let (state, roster) = seed_battle(package, &schema, &registry).unwrap();
    let pipeline = pipeline(&schema, package.map, package.tick_duration_ms).unwrap();
    let parts = DriverParts {
        schema: Arc::new(schema),
        registry: Arc::new(registry),
        pipeline,
        scheduler,
        clock,
        spatial: SpatialConfig::default(),
    };
    (FrameDriver::new(parts, state), roster)
}

/// Step until the monitor calls the battle, returning every report.
fn fight(driver: &mut FrameDriver, monitor: &mut BattleMonitor, limit: u64) -> Vec<FrameReport> {
    let mut reports = Vec::new();
    for _ in 0..limit {
        let report = driver.step().unwrap();
        let verdict = monitor.observe(&report, driver.state());
        reports.push(report);
        if matches!(verdict, FrameVerdict::Finish(_)) {
            break;
        }
    }
    reports
}

#[test]
fn two_ships_outgun_one() {
    let package = package();
    let (mut driver, roster) = driver(&package, PluginScheduler::sequential());
    let mut monitor = BattleMonitor::new(roster);
    let reports = fight(&mut driver, &mut monitor, package.max_ticks);

    assert!(driver.tick() < package.max_ticks, "battle never ended");
    let lancer = monitor.roster().ships.last().unwrap().entity;
    let destroyed = EventType::from("EntityDestroyed");
    let last = reports.last().unwrap();
    assert!(
        last.events
            .iter()
            .any(|e| e.event_type == destroyed && e.subject == lancer)
    );
    assert!(monitor.summary().get(&EventType::from("WeaponFired")).copied().unwrap_or(0) >= 3);
    assert!(matches!(driver.recorder().audit(), AuditResult::Complete { .. }));
}

#[test]
fn salvage_scuttles_the_wreck_on_the_next_frame() {
    let package = package();
    let (mut driver, roster) = driver(&package, PluginScheduler::sequential());
    let mut monitor = BattleMonitor::new(roster);
    let reports = fight(&mut driver, &mut monitor, package.max_ticks);
    let destroyed = reports
        .last()
        .unwrap()
        .events
        .iter()
        .find(|e| e.event_type == EventType::from("EntityDestroyed"))
        .cloned()
        .unwrap();

    let next = driver.step().unwrap();
    let despawned = next
        .events
        .iter()
        .find(|e| e.event_type == EventType::from("EntityDespawned"))
        .unwrap();
    assert_eq!(despawned.subject, destroyed.subject);
    assert_eq!(despawned.trace, destroyed.trace);
    assert!(!driver.state().contains(destroyed.subject));

    let scuttle = next
        .outputs
        .iter()
        .find(|o| o.output_type.as_str() == "Scuttle")
        .unwrap();
    assert_eq!(scuttle.cause, Some(destroyed.id));
    assert_eq!(despawned.cause, Some(Cause::Output(scuttle.key())));
}

#[test]
fn parallel_and_sequential_battles_match_frame_for_frame() {
    let package = package();
    let (mut sequential, roster) = driver(&package, PluginScheduler::sequential());
    let config = SchedulerConfig {
        parallel: true,
        worker_threads: 4,
        plugin_timeout_ms: 0,
    };
    let (mut parallel, _) = driver(&package, PluginScheduler::new(&config).unwrap());

    let mut monitor = BattleMonitor::new(roster);
    let left = fight(&mut sequential, &mut monitor, 60);
    for report in &left {
        let other = parallel.step().unwrap();
        assert_eq!(report.state_hash, other.state_hash, "diverged at tick {}", report.tick);
        assert_eq!(report.events, other.events);
    }
}

#[tokio::test]
async fn the_runner_stops_when_one_team_remains() {
    let package = package();
    let (mut driver, roster) = driver(&package, PluginScheduler::sequential());
    let operator = Arc::new(OperatorState::new(0, package.max_ticks));
    let mut monitor = BattleMonitor::new(roster);

    let summary = run_frames(&mut driver, &operator, &mut monitor).await.unwrap();

    assert!(matches!(summary.end_reason, RunEndReason::Finished(_)));
    assert_eq!(summary.frames, driver.tick());
    assert_eq!(operator.end_reason().await, Some(summary.end_reason));
}
