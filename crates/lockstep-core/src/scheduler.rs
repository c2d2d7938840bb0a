//! Plugin Scheduler: deterministic fan-out of (entity, plugin) pairs.
//!
//! Pairs are enumerated by ascending entity id, then plugin id. With a
//! worker pool they run on rayon; without one they run in order on the
//! calling thread. Either way the results are walked in pair order
//! afterwards, so the first violation reported and the failure list are
//! the same regardless of which worker finished first.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lockstep_types::{ContractViolation, EntityId, OutputType, PhaseName, PluginId, Proposal};
use lockstep_world::WorldView;

use crate::buffer::PendingOutput;
use crate::config::SchedulerConfig;
use crate::plugin::{Plugin, PluginContext, PluginView};
use crate::registry::PluginRegistry;

/// Errors raised while building the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The rayon pool could not be created.
    #[error("failed to build worker pool: {source}")]
    Pool {
        /// The underlying rayon error.
        #[from]
        source: rayon::ThreadPoolBuildError,
    },
}

/// An isolated plugin failure. Recorded with the outputs so a replay
/// reproduces the diagnostic events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginFailure {
    /// Entity the plugin ran on.
    pub entity: EntityId,
    /// The failed plugin.
    pub plugin: PluginId,
    /// Error text, panic message or timeout note.
    pub reason: String,
}

/// Result of one Evaluating phase.
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Validated proposals from successful invocations.
    pub pending: Vec<PendingOutput>,
    /// Failed invocations, in pair order.
    pub failures: Vec<PluginFailure>,
    /// Number of pairs invoked.
    pub invocations: usize,
}

enum Invocation {
    Proposed(Vec<Proposal>),
    Failed(String),
    Violated(ContractViolation),
}

/// Runs plugins over a frozen view.
#[derive(Debug)]
pub struct PluginScheduler {
    pool: Option<rayon::ThreadPool>,
    timeout: Option<Duration>,
}

impl PluginScheduler {
    /// Build from config.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Pool`] if the worker pool cannot start.
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let pool = if config.parallel {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.worker_threads)
                    .thread_name(|i| format!("lockstep-plugin-{i}"))
                    .build()?,
            )
        } else {
            None
        };
        let timeout = (config.plugin_timeout_ms > 0)
            .then(|| Duration::from_millis(config.plugin_timeout_ms));
        Ok(Self { pool, timeout })
    }

    /// A scheduler that evaluates on the calling thread with no timeout.
    ///
    /// With a timeout configured, an invocation is measured after it
    /// returns: an overrun discards its proposals and records a failure,
    /// but a plugin that never returns is never interrupted.
    pub const fn sequential() -> Self {
        Self {
            pool: None,
            timeout: None,
        }
    }

    /// Whether pairs run on a worker pool.
    pub const fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Every runnable pair for the active phases, in evaluation order.
    pub fn pairs(
        view: &WorldView,
        registry: &PluginRegistry,
        active: &BTreeSet<PhaseName>,
    ) -> Vec<(EntityId, Arc<dyn Plugin>)> {
        let mut pairs = Vec::new();
        for entity in view.entities() {
            for id in entity.plugins() {
                let Some(plugin) = registry.get(id) else {
                    warn!(entity = %entity.id(), plugin = %id, "attached plugin is not registered");
                    continue;
                };
                let declaration = plugin.declaration();
                if !declaration.required_tags.is_subset(entity.tags()) {
                    continue;
                }
                if declaration.phases.is_disjoint(active) {
                    continue;
                }
                pairs.push((entity.id(), Arc::clone(plugin)));
            }
        }
        pairs
    }

    /// Run every active pair against `view`.
    ///
    /// # Errors
    ///
    /// Returns the first contract violation in pair order: an undeclared
    /// read, an undeclared emit, or a payload that does not match its
    /// output schema.
    pub fn evaluate(
        &self,
        view: &WorldView,
        registry: &PluginRegistry,
        active: &BTreeSet<PhaseName>,
    ) -> Result<Evaluation, ContractViolation> {
        let pairs = Self::pairs(view, registry, active);
        let timeout = self.timeout;
        let run = |(entity, plugin): &(EntityId, Arc<dyn Plugin>)| {
            invoke(view, plugin.as_ref(), *entity, timeout)
        };
        let results: Vec<Invocation> = match &self.pool {
            Some(pool) => pool.install(|| pairs.par_iter().map(run).collect()),
            None => pairs.iter().map(run).collect(),
        };

        let mut evaluation = Evaluation {
            invocations: pairs.len(),
            ..Evaluation::default()
        };
        for ((entity, plugin), result) in pairs.iter().zip(results) {
            let declaration = plugin.declaration();
            match result {
                Invocation::Violated(violation) => return Err(violation),
                Invocation::Failed(reason) => {
                    warn!(
                        tick = view.tick(),
                        entity = %entity,
                        plugin = %declaration.id,
                        reason = %reason,
                        "Plugin invocation failed; outputs discarded"
                    );
                    evaluation.failures.push(PluginFailure {
                        entity: *entity,
                        plugin: declaration.id.clone(),
                        reason,
                    });
                }
                Invocation::Proposed(proposals) => {
                    for (index, proposal) in proposals.into_iter().enumerate() {
                        check_proposal(view, &declaration.id, &declaration.emits, *entity, &proposal)?;
                        let Ok(seq) = u32::try_from(index) else {
                            return Err(ContractViolation::MalformedOutput {
                                plugin: declaration.id.clone(),
                                entity: *entity,
                                tick: view.tick(),
                                output_type: proposal.output_type,
                                reason: "too many proposals from one invocation".to_owned(),
                            });
                        };
                        evaluation.pending.push(PendingOutput {
                            source: *entity,
                            plugin: declaration.id.clone(),
                            seq,
                            proposal,
                        });
                    }
                }
            }
        }
        debug!(
            tick = view.tick(),
            invocations = evaluation.invocations,
            proposals = evaluation.pending.len(),
            failures = evaluation.failures.len(),
            "Evaluation complete"
        );
        Ok(evaluation)
    }
}

/// Run one pair. The timeout is checked post hoc, once `tick` returns.
fn invoke(view: &WorldView, plugin: &dyn Plugin, entity: EntityId, timeout: Option<Duration>) -> Invocation {
    let declaration = plugin.declaration();
    let plugin_view = PluginView::new(view, declaration, entity);
    let ctx = PluginContext::new(entity, declaration.id.clone(), view.tick(), view.frame_seed());
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| plugin.tick(&plugin_view, &ctx)));
    let elapsed = started.elapsed();

    if let Some(violation) = plugin_view.take_violation() {
        return Invocation::Violated(violation);
    }
    match outcome {
        Ok(Ok(_)) if timeout.is_some_and(|limit| elapsed > limit) => Invocation::Failed(format!(
            "timed out after {} ms",
            elapsed.as_millis()
        )),
        Ok(Ok(proposals)) => Invocation::Proposed(proposals),
        Ok(Err(err)) => Invocation::Failed(err.to_string()),
        Err(payload) => Invocation::Failed(format!("panicked: {}", panic_message(&*payload))),
    }
}

fn check_proposal(
    view: &WorldView,
    plugin: &PluginId,
    emits: &BTreeSet<OutputType>,
    entity: EntityId,
    proposal: &Proposal,
) -> Result<(), ContractViolation> {
    if !emits.contains(&proposal.output_type) {
        return Err(ContractViolation::UndeclaredEmit {
            plugin: plugin.clone(),
            entity,
            tick: view.tick(),
            output_type: proposal.output_type.clone(),
        });
    }
    view.schema()
        .validate_payload(&proposal.output_type, &proposal.payload)
        .map_err(|reason| ContractViolation::MalformedOutput {
            plugin: plugin.clone(),
            entity,
            tick: view.tick(),
            output_type: proposal.output_type.clone(),
            reason,
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use lockstep_types::{Component, ComponentType, FieldOp, FieldWrite, Payload, Tag, Value};

    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::plugin::{PluginDeclaration, PluginError};
    use crate::testing::{FnPlugin, World, heat_write};

    fn active() -> BTreeSet<PhaseName> {
        BTreeSet::from([PhaseName::from("default")])
    }

    fn parallel() -> PluginScheduler {
        PluginScheduler::new(&SchedulerConfig {
            parallel: true,
            worker_threads: 4,
            plugin_timeout_ms: 0,
        })
        .unwrap()
    }

    fn heater() -> FnPlugin {
        FnPlugin::new(
            PluginDeclaration::new("heater")
                .requires("ship")
                .reads("Thermal")
                .emits("ApplyModifier")
                .in_phase("default"),
            |view, ctx| {
                let heat = view
                    .float(ctx.entity(), &ComponentType::from("Thermal"), "heat")
                    .unwrap_or_default();
                Ok(vec![ctx.propose("ApplyModifier", heat_write(ctx.entity(), FieldOp::Add(heat + 1.0)))])
            },
        )
    }

    #[test]
    fn pairs_follow_entity_then_plugin_order() {
        let mut world = World::new();
        world.register(heater());
        world.register(FnPlugin::new(
            PluginDeclaration::new("alpha").in_phase("default"),
            |_, _| Ok(Vec::new()),
        ));
        let b = world.ship(&["alpha", "heater"]);
        let a = world.ship(&["heater", "alpha"]);
        world.tagged("buoy", &["alpha"]);
        let view = world.view();
        let pairs: Vec<(EntityId, String)> = PluginScheduler::pairs(&view, &world.registry, &active())
            .into_iter()
            .map(|(e, p)| (e, p.declaration().id.to_string()))
            .collect();
        assert_eq!(pairs.first().map(|p| p.0), Some(b));
        assert_eq!(
            pairs.iter().filter(|p| p.0 == a).map(|p| p.1.as_str()).collect::<Vec<_>>(),
            vec!["alpha", "heater"]
        );
        assert_eq!(pairs.len(), 5);
    }

    #[test]
    fn inactive_phase_skips_plugin() {
        let mut world = World::new();
        world.register(heater());
        world.ship(&["heater"]);
        let view = world.view();
        let none = BTreeSet::from([PhaseName::from("sensors")]);
        assert!(PluginScheduler::pairs(&view, &world.registry, &none).is_empty());
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut world = World::new();
        world.register(heater());
        for _ in 0..64 {
            world.ship(&["heater"]);
        }
        let view = world.view();
        let seq = PluginScheduler::sequential()
            .evaluate(&view, &world.registry, &active())
            .unwrap();
        let par = parallel().evaluate(&view, &world.registry, &active()).unwrap();
        assert_eq!(seq.pending, par.pending);
        assert_eq!(seq.invocations, 64);
    }

    #[test]
    fn undeclared_read_is_fatal_and_identifies_plugin() {
        let mut world = World::new();
        world.register(FnPlugin::new(
            PluginDeclaration::new("snoop")
                .reads("CombatState")
                .in_phase("default"),
            |view, ctx| {
                let _ = view.component(ctx.entity(), &ComponentType::from("InventoryState"));
                Ok(Vec::new())
            },
        ));
        let id = world.ship(&["snoop"]);
        let view = world.view();
        let err = parallel().evaluate(&view, &world.registry, &active()).unwrap_err();
        match err {
            ContractViolation::UndeclaredRead {
                plugin,
                entity,
                component,
                ..
            } => {
                assert_eq!(plugin.as_str(), "snoop");
                assert_eq!(entity, id);
                assert_eq!(component.as_str(), "InventoryState");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn spatial_queries_need_the_position_component() {
        let mut world = World::new();
        world.register(FnPlugin::new(
            PluginDeclaration::new("radar").reads("Thermal").in_phase("default"),
            |view, _ctx| {
                let _ = view.within_radius(0.0, 0.0, 50.0);
                Ok(Vec::new())
            },
        ));
        let id = world.ship(&["radar"]);
        let view = world.view();
        let err = PluginScheduler::sequential()
            .evaluate(&view, &world.registry, &active())
            .unwrap_err();
        assert!(matches!(
            err,
            ContractViolation::UndeclaredRead { entity, ref component, .. }
                if entity == id && component.as_str() == "Transform"
        ));
    }

    #[test]
    fn declared_spatial_queries_see_neighbours() {
        let mut world = World::new();
        world.register(FnPlugin::new(
            PluginDeclaration::new("radar")
                .reads("Transform")
                .emits("ApplyModifier")
                .in_phase("default"),
            |view, ctx| {
                let near = view.within_radius(0.0, 0.0, 50.0);
                let boxed = view.within_box(-1.0, -1.0, 1.0, 1.0);
                let tagged = view.by_tag(&Tag::from("ship"));
                if near.len() == 2 && boxed.len() == 2 && tagged.len() == 2 {
                    Ok(vec![ctx.propose("ApplyModifier", heat_write(ctx.entity(), FieldOp::Add(1.0)))])
                } else {
                    Ok(Vec::new())
                }
            },
        ));
        world.ship(&["radar"]);
        world.ship(&[]);
        let view = world.view();
        let batch = PluginScheduler::sequential()
            .evaluate(&view, &world.registry, &active())
            .unwrap();
        assert_eq!(batch.invocations, 1);
        assert_eq!(batch.pending.len(), 1);
    }

    #[test]
    fn undeclared_emit_is_fatal() {
        let mut world = World::new();
        world.register(FnPlugin::new(
            PluginDeclaration::new("rogue").in_phase("default"),
            |_, ctx| Ok(vec![ctx.propose("ApplyModifier", heat_write(ctx.entity(), FieldOp::Add(1.0)))]),
        ));
        world.ship(&["rogue"]);
        let view = world.view();
        let err = PluginScheduler::sequential()
            .evaluate(&view, &world.registry, &active())
            .unwrap_err();
        assert!(matches!(err, ContractViolation::UndeclaredEmit { .. }));
    }

    #[test]
    fn malformed_payload_is_fatal() {
        let mut world = World::new();
        world.register(FnPlugin::new(
            PluginDeclaration::new("typo").emits("ApplyModifier").in_phase("default"),
            |_, ctx| {
                Ok(vec![ctx.propose(
                    "ApplyModifier",
                    Payload::Field(FieldWrite {
                        target: ctx.entity(),
                        component: "Thermal".into(),
                        field: "heat".into(),
                        op: FieldOp::Set(Value::Text("hot".to_owned())),
                    }),
                )])
            },
        ));
        world.ship(&["typo"]);
        let view = world.view();
        let err = PluginScheduler::sequential()
            .evaluate(&view, &world.registry, &active())
            .unwrap_err();
        assert!(matches!(err, ContractViolation::MalformedOutput { .. }));
    }

    #[test]
    fn failures_are_isolated() {
        let mut world = World::new();
        world.register(heater());
        world.register(FnPlugin::new(
            PluginDeclaration::new("flaky").in_phase("default"),
            |_, _| Err(PluginError::Failed { reason: "sensor offline".to_owned() }),
        ));
        world.register(FnPlugin::new(
            PluginDeclaration::new("crashy").in_phase("default"),
            |_, _| panic!("boom"),
        ));
        world.ship(&["crashy", "flaky", "heater"]);
        world.ship(&["heater"]);
        let view = world.view();
        let evaluation = parallel().evaluate(&view, &world.registry, &active()).unwrap();
        assert_eq!(evaluation.pending.len(), 2);
        let reasons: Vec<&str> = evaluation.failures.iter().map(|f| f.reason.as_str()).collect();
        assert_eq!(reasons, vec!["panicked: boom", "sensor offline"]);
    }

    #[test]
    fn slow_plugin_times_out() {
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);
        let mut world = World::new();
        world.register(FnPlugin::new(
            PluginDeclaration::new("slow").in_phase("default").emits("ApplyModifier"),
            move |_, ctx| {
                std::thread::sleep(Duration::from_millis(30));
                done.store(true, Ordering::SeqCst);
                Ok(vec![ctx.propose("ApplyModifier", heat_write(ctx.entity(), FieldOp::Add(1.0)))])
            },
        ));
        world.ship(&["slow"]);
        let view = world.view();
        let scheduler = PluginScheduler::new(&SchedulerConfig {
            parallel: false,
            worker_threads: 0,
            plugin_timeout_ms: 1,
        })
        .unwrap();
        let evaluation = scheduler.evaluate(&view, &world.registry, &active()).unwrap();
        // The overrun is only noticed once the call has run to completion.
        assert!(finished.load(Ordering::SeqCst));
        assert!(evaluation.pending.is_empty());
        assert_eq!(evaluation.failures.len(), 1);
        assert!(evaluation.failures.iter().all(|f| f.reason.starts_with("timed out")));
    }

    #[test]
    fn plugins_are_pure_outside_their_read_set() {
        let evaluate = |hp: f64| {
            let mut world = World::new();
            world.register(heater());
            world.ship_with(&["heater"], vec![("CombatState", Component::new().with("hp", Value::Float(hp)))]);
            PluginScheduler::sequential()
                .evaluate(&world.view(), &world.registry, &active())
                .unwrap()
                .pending
        };
        let reference = evaluate(10.0);
        assert_eq!(evaluate(10.0), reference);
        assert_eq!(evaluate(-3.5), reference);
    }
}
