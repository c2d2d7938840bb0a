//! Frame Driver: Snapshotting -> Evaluating -> Resolving -> Applying.
//!
//! The driver owns the Current State behind an `Arc`, the causal log and
//! the previous frame's events. A frame works on a [`WorldView`] of the
//! Current State and a private [`NextState`]; nothing the driver owns is
//! touched until Applying, and Applying only swaps in values that were
//! fully built beforehand. Any [`FrameError`] therefore leaves the driver
//! exactly as it was after the last applied frame, which is also the only
//! point at which the engine can be re-entered.

use std::sync::Arc;

use tracing::{debug, info};

use lockstep_ledger::{CausalError, CausalRecorder};
use lockstep_types::{
    Component, ContractViolation, Event, EventDraft, EventId, EventOrigin, EventType, Output, Value,
};
use lockstep_world::{
    NextState, SchemaRegistry, SpatialConfig, StateHash, WorldError, WorldState, WorldView,
    state_hash,
};

use crate::buffer::OutputBuffer;
use crate::clock::{FrameClock, FramePhase};
use crate::operator::OperatorState;
use crate::pipeline::ResolverPipeline;
use crate::registry::PluginRegistry;
use crate::resolver::ResolveError;
use crate::rng;
use crate::scheduler::{PluginFailure, PluginScheduler};

type Recorded = (Vec<Output>, Vec<PluginFailure>);

/// Event type of the diagnostic recorded for an isolated plugin failure.
pub const PLUGIN_FAILED: &str = "PluginFailed";

/// Why a frame was abandoned. The driver state is unchanged.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A plugin, resolver or output broke a contract.
    #[error("contract violation in frame {tick}: {violation}")]
    Contract {
        /// Tick being evaluated.
        tick: u64,
        /// The violation.
        violation: ContractViolation,
    },

    /// A phase failed for a reason other than a contract breach.
    #[error("{phase} failed, state remains at tick {last_good_tick}: {reason}")]
    Structural {
        /// Phase that failed.
        phase: FramePhase,
        /// Tick counter of the Current State left in force.
        last_good_tick: u64,
        /// What went wrong.
        reason: String,
    },

    /// A stop request arrived before Applying.
    #[error("frame {tick} cancelled before applying (during {phase})")]
    Cancelled {
        /// Tick being evaluated.
        tick: u64,
        /// Phase that had just completed.
        phase: FramePhase,
    },
}

/// What one applied frame produced.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Tick that was evaluated; the state counter is now `tick + 1`.
    pub tick: u64,
    /// Sealed Output Buffer, in id order.
    pub outputs: Vec<Output>,
    /// Diagnostics first, then resolver events in pipeline order.
    pub events: Vec<Event>,
    /// Isolated plugin failures, one diagnostic event each.
    pub failures: Vec<PluginFailure>,
    /// Hash of the new Current State.
    pub state_hash: StateHash,
}

/// Everything a driver needs besides the initial state.
#[derive(Debug)]
pub struct DriverParts {
    /// Immutable schema registry.
    pub schema: Arc<SchemaRegistry>,
    /// Registered plugins.
    pub registry: Arc<PluginRegistry>,
    /// Ordered resolvers.
    pub pipeline: ResolverPipeline,
    /// Plugin evaluation strategy.
    pub scheduler: PluginScheduler,
    /// Phase machine and schedule.
    pub clock: FrameClock,
    /// Spatial index settings.
    pub spatial: SpatialConfig,
}

/// Orchestrates frames over one simulation.
#[derive(Debug)]
pub struct FrameDriver {
    current: Arc<WorldState>,
    parts: DriverParts,
    recorder: CausalRecorder,
    last_events: Arc<[Event]>,
    operator: Option<Arc<OperatorState>>,
}

impl FrameDriver {
    /// Driver starting from `state` with an empty causal log.
    pub fn new(parts: DriverParts, state: WorldState) -> Self {
        Self {
            current: Arc::new(state),
            parts,
            recorder: CausalRecorder::new(),
            last_events: Arc::from(Vec::new()),
            operator: None,
        }
    }

    /// Resume with a restored causal log and the events the restored
    /// state's last frame produced.
    #[must_use]
    pub fn with_history(mut self, recorder: CausalRecorder, last_events: Vec<Event>) -> Self {
        self.recorder = recorder;
        self.last_events = Arc::from(last_events);
        self
    }

    /// Honor stop requests from `operator` between phases.
    #[must_use]
    pub fn with_operator(mut self, operator: Arc<OperatorState>) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Current State.
    pub fn state(&self) -> &WorldState {
        &self.current
    }

    /// Shared handle to the Current State.
    pub fn current(&self) -> Arc<WorldState> {
        Arc::clone(&self.current)
    }

    /// Frames applied so far (the next tick to evaluate).
    pub fn tick(&self) -> u64 {
        self.current.tick()
    }

    /// Durable causal log.
    pub const fn recorder(&self) -> &CausalRecorder {
        &self.recorder
    }

    /// Events of the last applied frame.
    pub fn last_events(&self) -> &[Event] {
        &self.last_events
    }

    /// Schema registry.
    pub fn schema(&self) -> &SchemaRegistry {
        &self.parts.schema
    }

    /// Plugin registry.
    pub fn registry(&self) -> &PluginRegistry {
        &self.parts.registry
    }

    /// Current frame phase (`Idle` between frames).
    pub const fn phase(&self) -> FramePhase {
        self.parts.clock.phase()
    }

    /// Run one frame with plugin evaluation.
    ///
    /// # Errors
    ///
    /// See [`FrameError`]; the driver is unchanged on error.
    pub fn step(&mut self) -> Result<FrameReport, FrameError> {
        self.run_frame(None)
    }

    /// Run one frame with a recorded Output Buffer and the recorded plugin
    /// failures in place of plugin evaluation. Every other phase runs as
    /// usual.
    ///
    /// # Errors
    ///
    /// See [`FrameError`]; the driver is unchanged on error.
    pub fn step_replayed(
        &mut self,
        outputs: Vec<Output>,
        failures: Vec<PluginFailure>,
    ) -> Result<FrameReport, FrameError> {
        self.run_frame(Some((outputs, failures)))
    }

    fn run_frame(&mut self, recorded: Option<Recorded>) -> Result<FrameReport, FrameError> {
        let result = self.run_phases(recorded);
        if result.is_err() {
            self.parts.clock.abort();
        }
        result
    }

    fn run_phases(&mut self, recorded: Option<Recorded>) -> Result<FrameReport, FrameError> {
        let tick = self.current.tick();
        let structural = |phase: FramePhase, reason: String| FrameError::Structural {
            phase,
            last_good_tick: tick,
            reason,
        };
        let contract = |violation: ContractViolation| FrameError::Contract { tick, violation };

        // Snapshotting
        self.enter(FramePhase::Snapshotting, tick)?;
        let frame_seed = rng::frame_seed(self.current.root_seed(), tick);
        let view = WorldView::build(
            Arc::clone(&self.current),
            frame_seed,
            Arc::clone(&self.parts.schema),
            &self.parts.spatial,
            Arc::clone(&self.last_events),
        );

        // Evaluating
        self.enter(FramePhase::Evaluating, tick)?;
        let (buffer, failures) = match recorded {
            Some((outputs, failures)) => {
                let buffer = OutputBuffer::from_recorded(tick, outputs)
                    .map_err(|e| structural(FramePhase::Evaluating, e.to_string()))?;
                (buffer, failures)
            }
            None => {
                let active = self.parts.clock.active_phases(tick);
                let evaluation = self
                    .parts
                    .scheduler
                    .evaluate(&view, &self.parts.registry, &active)
                    .map_err(contract)?;
                let buffer = OutputBuffer::seal(tick, evaluation.pending)
                    .map_err(|e| structural(FramePhase::Evaluating, e.to_string()))?;
                (buffer, evaluation.failures)
            }
        };
        for output in buffer.outputs() {
            self.recorder.validate_output(output).map_err(contract)?;
        }
        self.check_cancelled(tick, FramePhase::Evaluating)?;

        // Resolving
        self.enter(FramePhase::Resolving, tick)?;
        let mut next = NextState::from_current(&self.current);
        let staged = self
            .parts
            .pipeline
            .run(&view, &buffer, &mut next, self.parts.registry.as_ref())
            .map_err(|failure| match failure.error {
                ResolveError::Contract(violation) => contract(violation),
                other => structural(
                    FramePhase::Resolving,
                    format!("resolver {}: {other}", failure.resolver),
                ),
            })?;

        let world = |e: WorldError| structural(FramePhase::Resolving, e.to_string());
        let mut events = Vec::with_capacity(failures.len().saturating_add(staged.len()));
        for failure in &failures {
            let id = next.allocate_event_id().map_err(world)?;
            events.push(diagnostic(failure, id, tick, frame_seed));
        }
        for (resolver, draft) in staged {
            let id = next.allocate_event_id().map_err(world)?;
            events.push(Event::from_draft(draft, id, tick, EventOrigin::Resolver(resolver)));
        }
        self.recorder
            .validate_frame(buffer.outputs(), &events)
            .map_err(|e| match e {
                CausalError::Contract { source } => contract(source),
                other => structural(FramePhase::Resolving, other.to_string()),
            })?;
        self.check_cancelled(tick, FramePhase::Resolving)?;

        // Applying
        self.enter(FramePhase::Applying, tick)?;
        let state = next
            .finish()
            .map_err(|e| structural(FramePhase::Applying, e.to_string()))?;
        let hash = state_hash(&state);
        self.recorder
            .append_frame(buffer.outputs(), &events)
            .map_err(|e| structural(FramePhase::Applying, e.to_string()))?;
        self.current = Arc::new(state);
        self.last_events = Arc::from(events.as_slice());
        self.enter(FramePhase::Idle, tick)?;

        info!(
            tick,
            outputs = buffer.len(),
            events = events.len(),
            diagnostics = failures.len(),
            entities = self.current.len(),
            hash = %hash,
            "Frame applied"
        );
        Ok(FrameReport {
            tick,
            outputs: buffer.into_outputs(),
            events,
            failures,
            state_hash: hash,
        })
    }

    fn enter(&mut self, phase: FramePhase, tick: u64) -> Result<(), FrameError> {
        self.parts
            .clock
            .advance(phase)
            .map_err(|e| FrameError::Structural {
                phase,
                last_good_tick: tick,
                reason: e.to_string(),
            })?;
        debug!(tick, %phase, "Frame phase");
        Ok(())
    }

    fn check_cancelled(&self, tick: u64, phase: FramePhase) -> Result<(), FrameError> {
        if self.operator.as_ref().is_some_and(|o| o.is_stop_requested()) {
            info!(tick, %phase, "Frame cancelled before applying");
            return Err(FrameError::Cancelled { tick, phase });
        }
        Ok(())
    }
}

fn diagnostic(failure: &PluginFailure, id: EventId, tick: u64, frame_seed: u64) -> Event {
    let draft = EventDraft {
        event_type: EventType::from(PLUGIN_FAILED),
        subject: failure.entity,
        trace: rng::trace_id(frame_seed, failure.entity, &failure.plugin, u32::MAX),
        cause: None,
        data: Component::new()
            .with("plugin", Value::Text(failure.plugin.to_string()))
            .with("reason", Value::Text(failure.reason.clone())),
    };
    Event::from_draft(draft, id, tick, EventOrigin::Plugin(failure.plugin.clone()))
}
