//! The persistence unit.
//!
//! A save holds everything needed to resume a run bit-for-bit: the
//! Current State with its identifier counters, the events of the last
//! applied frame (plugins observe them next frame) and the durable causal
//! log. Loading re-validates every component against the schema, so a
//! save written under another schema version is refused and a field of
//! the wrong kind fails loudly instead of being coerced.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use lockstep_core::FrameDriver;
use lockstep_ledger::{CausalRecord, CausalRecorder};
use lockstep_types::Event;
use lockstep_world::{Entity, SchemaError, SchemaRegistry, WorldState};

use crate::atomic::atomic_write;
use crate::error::PersistError;

/// On-disk save layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
    /// Version of the schema the components were written under.
    pub schema_version: u32,
    /// Run this save belongs to.
    pub run_id: Uuid,
    /// Wall-clock time of the save. Not part of the simulation.
    pub saved_at: DateTime<Utc>,
    /// Frames applied so far.
    pub tick: u64,
    /// Root seed of every random stream.
    pub root_seed: u64,
    /// Next entity id to allocate.
    pub next_entity_id: u64,
    /// Next event id to allocate.
    pub next_event_id: u64,
    /// Every live entity in id order.
    pub entities: Vec<Entity>,
    /// Events of the last applied frame.
    #[serde(default)]
    pub last_events: Vec<Event>,
    /// Durable causal log.
    #[serde(default)]
    pub causal: Vec<CausalRecord>,
}

impl SaveFile {
    /// Capture the driver between frames.
    pub fn capture(driver: &FrameDriver, run_id: Uuid) -> Self {
        let state = driver.state();
        Self {
            schema_version: driver.schema().version(),
            run_id,
            saved_at: Utc::now(),
            tick: state.tick(),
            root_seed: state.root_seed(),
            next_entity_id: state.next_entity_id(),
            next_event_id: state.next_event_id(),
            entities: state.entities().cloned().collect(),
            last_events: driver.last_events().to_vec(),
            causal: driver.recorder().records().to_vec(),
        }
    }

    /// Capture a state that has no frame history yet, such as a freshly
    /// seeded battle.
    pub fn initial(state: &WorldState, schema: &SchemaRegistry, run_id: Uuid) -> Self {
        Self {
            schema_version: schema.version(),
            run_id,
            saved_at: Utc::now(),
            tick: state.tick(),
            root_seed: state.root_seed(),
            next_entity_id: state.next_entity_id(),
            next_event_id: state.next_event_id(),
            entities: state.entities().cloned().collect(),
            last_events: Vec::new(),
            causal: Vec::new(),
        }
    }
}

/// A validated save, ready for
/// [`FrameDriver::with_history`](lockstep_core::FrameDriver::with_history).
#[derive(Debug)]
pub struct Restored {
    /// Run the save belongs to.
    pub run_id: Uuid,
    /// When the save was written.
    pub saved_at: DateTime<Utc>,
    /// Rebuilt Current State.
    pub state: WorldState,
    /// Rebuilt causal log.
    pub recorder: CausalRecorder,
    /// Events of the last applied frame.
    pub last_events: Vec<Event>,
}

/// Write `save` to `path` as pretty JSON, atomically.
///
/// # Errors
///
/// Returns [`PersistError::Serialization`] or [`PersistError::Io`].
pub fn save_state(path: &Path, save: &SaveFile) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(save)?;
    atomic_write(path, &json)?;
    info!(
        path = %path.display(),
        tick = save.tick,
        entities = save.entities.len(),
        run_id = %save.run_id,
        "State saved"
    );
    Ok(())
}

/// Read and validate a save against `schema`.
///
/// # Errors
///
/// - [`SchemaError::VersionMismatch`] (as [`PersistError::Schema`]) when
///   the save was written under another schema version,
/// - [`PersistError::Schema`] when a component does not validate,
/// - [`PersistError::World`] when ids or relations are inconsistent,
/// - [`PersistError::Causal`] when the causal log does not hold together.
pub fn load_state(path: &Path, schema: &SchemaRegistry) -> Result<Restored, PersistError> {
    let text = std::fs::read_to_string(path)?;
    let save: SaveFile = serde_json::from_str(&text)?;
    if save.schema_version != schema.version() {
        return Err(SchemaError::VersionMismatch {
            expected: schema.version(),
            found: save.schema_version,
        }
        .into());
    }

    let mut entities = save.entities;
    for entity in &mut entities {
        entity.normalize(schema)?;
    }
    let state = WorldState::from_parts(
        save.tick,
        save.root_seed,
        save.next_entity_id,
        save.next_event_id,
        entities,
    )?;
    let recorder = CausalRecorder::from_records(save.causal)?;

    info!(
        path = %path.display(),
        tick = state.tick(),
        entities = state.len(),
        run_id = %save.run_id,
        "State loaded"
    );
    Ok(Restored {
        run_id: save.run_id,
        saved_at: save.saved_at,
        state,
        recorder,
        last_events: save.last_events,
    })
}
