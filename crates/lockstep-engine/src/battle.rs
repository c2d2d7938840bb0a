//! Battle orchestration: package in, outcome out.
//!
//! [`run_battle`] seeds the naval content from a [`BattlePackage`], drives
//! it to the end under operator control and leaves behind a tick-0 save,
//! periodic saves, the replay log, the exported causal log and the outcome
//! document. [`verify_battle`] replays a log against a fresh seeding (or a
//! save) and reports the first divergent tick.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lockstep_content::{
    BattleMonitor, ContentError, Roster, build_outcome, naval_schema, pipeline, registry,
    seed_battle,
};
use lockstep_core::clock::FrameClock;
use lockstep_core::config::KernelConfig;
use lockstep_core::frame::{DriverParts, FrameDriver};
use lockstep_core::operator::OperatorState;
use lockstep_core::runner::{log_run_end, run_frames};
use lockstep_core::scheduler::PluginScheduler;
use lockstep_persist::{
    PersistError, ReplayVerdict, ReplayWriter, SaveFile, atomic_write, export_causal_log,
    load_state, read_replay, save_state, verify_replay,
};
use lockstep_types::{BattleOutcome, BattlePackage, ReplayReference};
use lockstep_world::{WorldState, state_hash};
use tracing::info;
use uuid::Uuid;

use crate::callback::{RecordingCallback, SavePlan};
use crate::error::EngineError;

/// A seeded battle that has not run yet.
pub struct Setup {
    /// Everything the driver needs besides the state.
    pub parts: DriverParts,
    /// World at tick 0.
    pub state: WorldState,
    /// Ships and platforms the seeding created.
    pub roster: Roster,
}

/// Read a battle package from JSON.
///
/// # Errors
///
/// Returns [`EngineError::Package`] if the file is unreadable or is not a
/// well-formed package.
pub fn read_package(path: &Path) -> Result<BattlePackage, EngineError> {
    let bytes = std::fs::read(path).map_err(|e| EngineError::Package {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::Package {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Tick limit for `package`: its own limit when set, otherwise the
/// configured one (0 = until the battle is decided).
pub const fn tick_limit(config: &KernelConfig, package: &BattlePackage) -> u64 {
    if package.max_ticks > 0 {
        package.max_ticks
    } else {
        config.simulation.max_ticks
    }
}

/// Load the naval content and seed `package` into a fresh world.
///
/// # Errors
///
/// Fails if the configured phases are unusable, the content does not fit
/// the schema, the package is invalid, or the worker pool cannot start.
pub fn prepare(config: &KernelConfig, package: &BattlePackage) -> Result<Setup, EngineError> {
    let schema = naval_schema().map_err(ContentError::from)?;
    let clock = FrameClock::new(&config.phases)?;
    let registry = registry(&schema, &clock)?;
    let (state, roster) = seed_battle(package, &schema, &registry)?;
    let pipeline = pipeline(&schema, package.map, package.tick_duration_ms)?;
    let scheduler = PluginScheduler::new(&config.scheduler)?;

    info!(
        battle = %package.name,
        seed = package.seed,
        ships = roster.ships.len(),
        parallel = scheduler.is_parallel(),
        "Battle prepared"
    );

    Ok(Setup {
        parts: DriverParts {
            schema: Arc::new(schema),
            registry: Arc::new(registry),
            pipeline,
            scheduler,
            clock,
            spatial: config.spatial.clone(),
        },
        state,
        roster,
    })
}

/// Run `package` to completion and write the outcome to `outcome_path`.
///
/// # Errors
///
/// Fails on any setup error, a structural frame failure, or when an
/// artifact cannot be written.
pub async fn run_battle(
    config: &KernelConfig,
    package: &BattlePackage,
    replay_log: &Path,
    outcome_path: &Path,
    operator: &Arc<OperatorState>,
) -> Result<BattleOutcome, EngineError> {
    // 1. Seed the world.
    let Setup {
        parts,
        state,
        roster,
    } = prepare(config, package)?;

    // 2. Save tick 0 so the run can be replayed from disk.
    let saves = SavePlan {
        dir: config.persistence.snapshot_dir.clone(),
        prefix: package.name.clone(),
        every_n_ticks: config.persistence.snapshot_every_n_ticks,
        run_id: Uuid::new_v4(),
    };
    let initial = saves.path_for(0);
    save_state(&initial, &SaveFile::initial(&state, &parts.schema, saves.run_id))?;
    info!(run_id = %saves.run_id, path = %initial.display(), "Initial save written");

    // 3. Run frames, recording each one.
    let mut driver = FrameDriver::new(parts, state).with_operator(Arc::clone(operator));
    let replay = ReplayWriter::create(replay_log)?;
    let mut callback = RecordingCallback::new(BattleMonitor::new(roster), replay, saves.clone());
    let summary = run_frames(&mut driver, operator, &mut callback).await?;
    log_run_end(&summary);
    let (monitor, replay) = callback.into_parts()?;

    // 4. Final artifacts.
    let final_save = saves.path_for(driver.tick());
    save_state(&final_save, &SaveFile::capture(&driver, saves.run_id))?;
    let exported = export_causal_log(driver.recorder(), &saves.causal_log())?;
    let log = replay.finish()?;

    let reference = ReplayReference {
        log: log.display().to_string(),
        final_hash: state_hash(driver.state()).to_hex(),
    };
    let outcome = build_outcome(package, &monitor, driver.state(), reference);
    let json = serde_json::to_vec_pretty(&outcome).map_err(PersistError::from)?;
    atomic_write(outcome_path, &json)?;

    info!(
        battle = %outcome.name,
        ticks = outcome.ticks,
        winner = outcome.winner.as_deref().unwrap_or("none"),
        causal_records = exported,
        save = %final_save.display(),
        outcome = %outcome_path.display(),
        "Battle complete"
    );
    Ok(outcome)
}

/// Replay `replay_log` and compare every state hash.
///
/// Replay starts from the freshly seeded package, or from `save` when one
/// is given; records older than the starting tick are skipped.
///
/// # Errors
///
/// Fails on setup errors, unreadable artifacts, a gap in the log, or a
/// replayed frame that cannot be applied. A hash mismatch is reported in
/// the verdict, not as an error.
pub fn verify_battle(
    config: &KernelConfig,
    package: &BattlePackage,
    replay_log: &Path,
    save: Option<&Path>,
) -> Result<ReplayVerdict, EngineError> {
    let Setup { parts, state, .. } = prepare(config, package)?;
    let mut driver = match save {
        Some(path) => {
            let restored = load_state(path, &parts.schema)?;
            info!(
                run_id = %restored.run_id,
                tick = restored.state.tick(),
                "Replaying from save"
            );
            FrameDriver::new(parts, restored.state)
                .with_history(restored.recorder, restored.last_events)
        }
        None => FrameDriver::new(parts, state),
    };

    let start = driver.tick();
    let records: Vec<_> = read_replay(replay_log)?
        .into_iter()
        .filter(|r| r.tick >= start)
        .collect();
    info!(start, frames = records.len(), log = %replay_log.display(), "Verifying replay");
    Ok(verify_replay(&mut driver, records)?)
}

/// Default outcome location next to the saves.
pub fn default_outcome_path(config: &KernelConfig, package: &BattlePackage) -> PathBuf {
    config
        .persistence
        .snapshot_dir
        .join(format!("{}-outcome.json", package.name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use lockstep_content::phases;
    use lockstep_types::{MapSpec, ShipSnapshot, TeamSpec};

    use super::*;

    fn ship(name: &str, x: f64, y: f64) -> ShipSnapshot {
        ShipSnapshot {
            name: name.to_owned(),
            x,
            y,
            heading: 0.0,
            max_speed: 10.0,
            hull: 30.0,
            ammo: 20,
            weapon_range: 300.0,
            weapon_damage: 10.0,
            sensor_range: 600.0,
            waypoint: None,
            transitioning: false,
        }
    }

    fn package() -> BattlePackage {
        BattlePackage {
            name: "sound".to_owned(),
            seed: 99,
            tick_duration_ms: 100,
            max_ticks: 200,
            map: MapSpec {
                width: 800.0,
                height: 800.0,
            },
            teams: vec![
                TeamSpec {
                    name: "north".to_owned(),
                    ships: vec![ship("Osprey", 300.0, 400.0), ship("Kestrel", 300.0, 450.0)],
                },
                TeamSpec {
                    name: "south".to_owned(),
                    ships: vec![ship("Marlin", 500.0, 420.0)],
                },
            ],
        }
    }

    fn config(dir: &Path) -> KernelConfig {
        let mut config = KernelConfig::default();
        config.phases = phases();
        config.scheduler.worker_threads = 2;
        config.persistence.snapshot_dir = dir.join("saves");
        config.persistence.snapshot_every_n_ticks = 4;
        config
    }

    #[test]
    fn package_limit_wins_over_config() {
        let mut config = KernelConfig::default();
        config.simulation.max_ticks = 50;
        let mut pkg = package();
        assert_eq!(tick_limit(&config, &pkg), 200);
        pkg.max_ticks = 0;
        assert_eq!(tick_limit(&config, &pkg), 50);
    }

    #[test]
    fn malformed_packages_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{\"name\": 3}").unwrap();
        let err = read_package(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn a_recorded_battle_verifies_from_scratch_and_from_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let pkg = package();
        let replay = dir.path().join("replay.jsonl");
        let outcome_path = default_outcome_path(&config, &pkg);
        let operator = Arc::new(OperatorState::new(0, tick_limit(&config, &pkg)));

        let outcome = run_battle(&config, &pkg, &replay, &outcome_path, &operator)
            .await
            .unwrap();
        assert!(outcome.winner.is_some());
        assert!(outcome.ticks > 4);
        let written: BattleOutcome =
            serde_json::from_slice(&std::fs::read(&outcome_path).unwrap()).unwrap();
        assert_eq!(written, outcome);

        let verdict = verify_battle(&config, &pkg, &replay, None).unwrap();
        let ReplayVerdict::Verified { frames, final_hash } = verdict else {
            panic!("replay diverged: {verdict:?}");
        };
        assert_eq!(frames, outcome.ticks);
        assert_eq!(final_hash.unwrap().to_hex(), outcome.replay.final_hash);

        let mid = config.persistence.snapshot_dir.join("sound-tick-4.json");
        let from_save = verify_battle(&config, &pkg, &replay, Some(mid.as_path())).unwrap();
        assert!(matches!(
            from_save,
            ReplayVerdict::Verified { frames, .. } if frames == outcome.ticks.saturating_sub(4)
        ));
    }

    #[tokio::test]
    async fn a_stop_request_ends_the_run_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let pkg = package();
        let operator = Arc::new(OperatorState::new(0, 0));
        operator.request_stop();

        let outcome = run_battle(
            &config,
            &pkg,
            &dir.path().join("replay.jsonl"),
            &dir.path().join("outcome.json"),
            &operator,
        )
        .await
        .unwrap();
        assert_eq!(outcome.ticks, 0);
        assert_eq!(outcome.winner, None);
        assert!(outcome.ships.iter().all(|s| s.survived));
    }
}
