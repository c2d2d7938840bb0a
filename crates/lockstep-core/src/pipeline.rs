//! Resolver Pipeline: strictly serial adjudication of the Output Buffer.
//!
//! Resolvers run in ascending `(priority, id)` order. Each receives the
//! outputs whose type it handles, in resolution order, writes through its
//! own overlay, and has that overlay merged into the Next State only after
//! it returns successfully. Its events join the frame's event log but are
//! not visible to later resolvers in the same frame.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use lockstep_types::{ComponentType, ContractViolation, EventDraft, Output, OutputType, ResolverId};
use lockstep_world::{AttachRules, NextState, SchemaRegistry, WorldView, WriteScope};

use crate::buffer::OutputBuffer;
use crate::resolver::{ResolveError, Resolver};
use crate::rng::{self, StreamPurpose};

/// Errors raised while assembling the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Two resolvers share an id.
    #[error("resolver {0} registered twice")]
    DuplicateResolver(ResolverId),

    /// Two resolvers claim the same component type.
    #[error("component {component} owned by both {first} and {second}")]
    DuplicateOwner {
        /// Contested component type.
        component: ComponentType,
        /// First claimant.
        first: ResolverId,
        /// Second claimant.
        second: ResolverId,
    },

    /// A resolver claims a component the schema assigns elsewhere.
    #[error("resolver {resolver} claims {component}, but the schema names owner {expected}")]
    OwnerMismatch {
        /// Claiming resolver.
        resolver: ResolverId,
        /// Component type.
        component: ComponentType,
        /// Owner according to the schema (empty if unknown component).
        expected: String,
    },

    /// The schema's owner for a component is not in the pipeline.
    #[error("component {component} has owner {owner}, which is not in the pipeline")]
    MissingOwner {
        /// Component type.
        component: ComponentType,
        /// Owner named by the schema.
        owner: ResolverId,
    },

    /// A resolver handles an output type the schema does not define.
    #[error("resolver {resolver} handles unknown output type {output_type}")]
    UnknownOutput {
        /// Offending resolver.
        resolver: ResolverId,
        /// Unknown output type.
        output_type: OutputType,
    },

    /// An output type in the schema reaches no resolver.
    #[error("output type {0} is handled by no resolver")]
    UnhandledOutput(OutputType),
}

/// A resolver failed mid-pipeline. Nothing from the frame is committed.
#[derive(Debug, thiserror::Error)]
#[error("resolver {resolver} failed: {error}")]
pub struct StageFailure {
    /// The failing resolver.
    pub resolver: ResolverId,
    /// What went wrong.
    pub error: ResolveError,
}

/// Events produced by one pipeline run, tagged with their resolver.
pub type StagedEvents = Vec<(ResolverId, EventDraft)>;

/// The ordered resolver stages.
#[derive(Clone)]
pub struct ResolverPipeline {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl fmt::Debug for ResolverPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|r| &r.declaration().id))
            .finish()
    }
}

impl ResolverPipeline {
    /// Order resolvers and check ownership and routing against the schema.
    ///
    /// # Errors
    ///
    /// See [`PipelineError`].
    pub fn new(
        mut resolvers: Vec<Arc<dyn Resolver>>,
        schema: &SchemaRegistry,
    ) -> Result<Self, PipelineError> {
        resolvers.sort_by(|a, b| {
            let (a, b) = (a.declaration(), b.declaration());
            (a.priority, &a.id).cmp(&(b.priority, &b.id))
        });

        let mut ids = BTreeSet::new();
        let mut owners: BTreeMap<&ComponentType, &ResolverId> = BTreeMap::new();
        let mut handled: BTreeSet<&OutputType> = BTreeSet::new();
        for resolver in &resolvers {
            let decl = resolver.declaration();
            if !ids.insert(&decl.id) {
                return Err(PipelineError::DuplicateResolver(decl.id.clone()));
            }
            for component in &decl.owns {
                if let Some(first) = owners.insert(component, &decl.id) {
                    return Err(PipelineError::DuplicateOwner {
                        component: component.clone(),
                        first: first.clone(),
                        second: decl.id.clone(),
                    });
                }
                if schema.owner_of(component) != Some(&decl.id) {
                    return Err(PipelineError::OwnerMismatch {
                        resolver: decl.id.clone(),
                        component: component.clone(),
                        expected: schema
                            .owner_of(component)
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                    });
                }
            }
            for otype in &decl.handles {
                if schema.output(otype).is_none() {
                    return Err(PipelineError::UnknownOutput {
                        resolver: decl.id.clone(),
                        output_type: otype.clone(),
                    });
                }
                handled.insert(otype);
            }
        }
        for (component, component_schema) in schema.components() {
            if !owners.contains_key(component) {
                return Err(PipelineError::MissingOwner {
                    component: component.clone(),
                    owner: component_schema.owner.clone(),
                });
            }
        }
        if let Some((otype, _)) = schema.outputs().find(|(o, _)| !handled.contains(o)) {
            return Err(PipelineError::UnhandledOutput(otype.clone()));
        }
        Ok(Self { resolvers })
    }

    /// Resolvers in execution order.
    pub fn resolvers(&self) -> &[Arc<dyn Resolver>] {
        &self.resolvers
    }

    /// Run every stage over `buffer`, writing into `next`.
    ///
    /// # Errors
    ///
    /// Returns the first [`StageFailure`]. Overlays of earlier stages may
    /// already be merged into `next`, so the caller must discard it.
    pub fn run(
        &self,
        view: &WorldView,
        buffer: &OutputBuffer,
        next: &mut NextState,
        rules: &dyn AttachRules,
    ) -> Result<StagedEvents, StageFailure> {
        let ordered = buffer.resolution_order(view.schema());
        let mut staged = Vec::new();
        for resolver in &self.resolvers {
            let decl = resolver.declaration();
            let fail = |error: ResolveError| StageFailure {
                resolver: decl.id.clone(),
                error,
            };
            let routed: Vec<&Output> = ordered
                .iter()
                .copied()
                .filter(|o| decl.handles.contains(&o.output_type))
                .collect();
            let mut stream = rng::stream(view.frame_seed(), StreamPurpose::Resolver(&decl.id));
            let scope = WriteScope {
                resolver: &decl.id,
                owns: &decl.owns,
            };
            let mut handle = next.handle(view.state(), scope, view.schema(), rules);
            let drafts = resolver
                .resolve(&routed, view, &mut handle, &mut stream)
                .map_err(fail)?;
            for draft in &drafts {
                check_draft(view, &decl.id, draft).map_err(fail)?;
            }
            handle.commit();
            debug!(
                tick = view.tick(),
                resolver = %decl.id,
                outputs = routed.len(),
                events = drafts.len(),
                "Resolver stage committed"
            );
            staged.extend(drafts.into_iter().map(|d| (decl.id.clone(), d)));
        }
        Ok(staged)
    }
}

fn check_draft(view: &WorldView, resolver: &ResolverId, draft: &EventDraft) -> Result<(), ResolveError> {
    if draft.trace.is_empty() || draft.cause.is_none() {
        return Err(ContractViolation::UncausedEvent {
            resolver: resolver.clone(),
            event_type: draft.event_type.clone(),
            tick: view.tick(),
        }
        .into());
    }
    if !view.schema().has_event(&draft.event_type) {
        return Err(ResolveError::Failed {
            reason: format!("event type {} is not in the schema", draft.event_type),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use rand_chacha::ChaCha8Rng;

    use lockstep_types::{
        ComponentType, EntityId, FieldOp, Payload, Proposal, Reservation, SpawnRequest, Tag, TraceId,
        Value,
    };
    use lockstep_world::{NextStateHandle, state_hash};

    use super::*;
    use crate::buffer::PendingOutput;
    use crate::resolver::ResolverDeclaration;
    use crate::resolvers::FieldResolver;
    use crate::testing::{World, heat_write, resolvers, schema};

    fn pending(source: EntityId, plugin: &str, otype: &str, payload: Payload) -> PendingOutput {
        PendingOutput {
            source,
            plugin: plugin.into(),
            seq: 0,
            proposal: Proposal {
                output_type: otype.into(),
                trace: TraceId::new(source.into_inner().saturating_add(1)),
                cause: None,
                payload,
            },
        }
    }

    fn names(pipeline: &ResolverPipeline) -> Vec<&str> {
        pipeline
            .resolvers()
            .iter()
            .map(|r| r.declaration().id.as_str())
            .collect()
    }

    #[test]
    fn orders_by_priority_then_id() {
        let mut stages = resolvers();
        stages.reverse();
        let pipeline = ResolverPipeline::new(stages, &schema()).unwrap();
        assert_eq!(names(&pipeline), vec!["fields", "reservations", "ammo", "lifecycle"]);
    }

    #[test]
    fn rejects_two_owners() {
        let mut stages = resolvers();
        stages.push(Arc::new(FieldResolver::new(
            ResolverDeclaration::new("rogue", 50).owns("Thermal"),
        )));
        let err = ResolverPipeline::new(stages, &schema()).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateOwner { .. }), "{err}");
    }

    #[test]
    fn rejects_owner_not_named_by_schema() {
        let stages: Vec<Arc<dyn Resolver>> = vec![Arc::new(FieldResolver::new(
            ResolverDeclaration::new("fields", 0).owns("Magazine"),
        ))];
        let err = ResolverPipeline::new(stages, &schema()).unwrap_err();
        assert!(matches!(err, PipelineError::OwnerMismatch { .. }), "{err}");
    }

    #[test]
    fn rejects_missing_owner_and_unhandled_outputs() {
        let without_ammo: Vec<Arc<dyn Resolver>> = resolvers()
            .into_iter()
            .filter(|r| r.declaration().id.as_str() != "ammo")
            .collect();
        let err = ResolverPipeline::new(without_ammo, &schema()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingOwner { .. }), "{err}");

        let without_lifecycle: Vec<Arc<dyn Resolver>> = resolvers()
            .into_iter()
            .filter(|r| r.declaration().id.as_str() != "lifecycle")
            .collect();
        let err = ResolverPipeline::new(without_lifecycle, &schema()).unwrap_err();
        assert!(matches!(err, PipelineError::UnhandledOutput(_)), "{err}");
    }

    fn mixed_buffer(world: &mut World) -> (EntityId, OutputBuffer) {
        let a = world.ship(&[]);
        let b = world.ship(&[]);
        let relay = world.ship(&[]);
        let buffer = OutputBuffer::seal(
            0,
            vec![
                pending(a, "helm", "ApplyModifier", heat_write(a, FieldOp::Add(0.5))),
                pending(b, "helm", "ApplyModifier", heat_write(a, FieldOp::Add(0.25))),
                pending(
                    a,
                    "comms",
                    "ReserveBandwidth",
                    Payload::Reserve(Reservation {
                        provider: relay,
                        resource: "bandwidth".into(),
                        amount: 6.0,
                        priority: 0,
                    }),
                ),
                pending(
                    b,
                    "comms",
                    "ReserveBandwidth",
                    Payload::Reserve(Reservation {
                        provider: relay,
                        resource: "bandwidth".into(),
                        amount: 6.0,
                        priority: 0,
                    }),
                ),
                pending(
                    b,
                    "factory",
                    "SpawnDrone",
                    Payload::Spawn(SpawnRequest {
                        tags: [Tag::from("drone")].into(),
                        ..SpawnRequest::default()
                    }),
                ),
            ],
        )
        .unwrap();
        (a, buffer)
    }

    #[test]
    fn replaying_a_buffer_is_idempotent() {
        let mut world = World::new();
        let (a, buffer) = mixed_buffer(&mut world);
        let view = world.view();
        let pipeline = world.pipeline();
        let run = || {
            let mut next = NextState::from_current(view.state());
            let events = pipeline.run(&view, &buffer, &mut next, &world.registry).unwrap();
            (events, state_hash(&next.finish().unwrap()))
        };
        let (events, hash) = run();
        for _ in 0..5 {
            assert_eq!(run(), (events.clone(), hash));
        }
        let types: Vec<&str> = events.iter().map(|(_, e)| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["ModifierApplied", "ReservationGranted", "ReservationDenied", "EntitySpawned"]
        );
        let mut next = NextState::from_current(view.state());
        pipeline.run(&view, &buffer, &mut next, &world.registry).unwrap();
        let heat = next
            .state()
            .component(a, &ComponentType::from("Thermal"))
            .and_then(|c| c.float("heat"))
            .unwrap();
        assert!((heat - 0.75).abs() < 1e-9);
        assert_eq!(next.state().len(), 4);
    }

    struct Observer {
        declaration: ResolverDeclaration,
        target: EntityId,
        seen: Mutex<Vec<f64>>,
    }

    impl Resolver for Observer {
        fn declaration(&self) -> &ResolverDeclaration {
            &self.declaration
        }

        fn resolve(
            &self,
            _outputs: &[&Output],
            _view: &WorldView,
            next: &mut NextStateHandle<'_>,
            _rng: &mut ChaCha8Rng,
        ) -> Result<Vec<EventDraft>, ResolveError> {
            let heat = next
                .component(self.target, &ComponentType::from("Thermal"))
                .and_then(|c| c.float("heat"))
                .unwrap_or(f64::NAN);
            self.seen.lock().unwrap().push(heat);
            Ok(Vec::new())
        }
    }

    #[test]
    fn later_stages_do_not_see_earlier_writes() {
        let mut world = World::new();
        let (a, buffer) = mixed_buffer(&mut world);
        let observer = Arc::new(Observer {
            declaration: ResolverDeclaration::new("observer", 99),
            target: a,
            seen: Mutex::new(Vec::new()),
        });
        let mut stages = resolvers();
        stages.push(Arc::clone(&observer) as Arc<dyn Resolver>);
        let pipeline = ResolverPipeline::new(stages, &world.schema).unwrap();
        let view = world.view();
        let mut next = NextState::from_current(view.state());
        pipeline.run(&view, &buffer, &mut next, &world.registry).unwrap();
        let seen = observer.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen.iter().all(|h| h.abs() < 1e-9));
    }

    struct Silent(ResolverDeclaration);

    impl Resolver for Silent {
        fn declaration(&self) -> &ResolverDeclaration {
            &self.0
        }

        fn resolve(
            &self,
            outputs: &[&Output],
            _view: &WorldView,
            _next: &mut NextStateHandle<'_>,
            _rng: &mut ChaCha8Rng,
        ) -> Result<Vec<EventDraft>, ResolveError> {
            Ok(outputs
                .iter()
                .map(|o| {
                    let mut draft = EventDraft::caused_by(o, "ModifierApplied", o.source);
                    draft.cause = None;
                    draft.with("note", Value::Text("orphan".to_owned()))
                })
                .collect())
        }
    }

    #[test]
    fn uncaused_resolver_events_are_violations() {
        let mut world = World::new();
        let (_, buffer) = mixed_buffer(&mut world);
        let stages: Vec<Arc<dyn Resolver>> = resolvers()
            .into_iter()
            .map(|r| {
                if r.declaration().id.as_str() == "lifecycle" {
                    Arc::new(Silent(r.declaration().clone())) as Arc<dyn Resolver>
                } else {
                    r
                }
            })
            .collect();
        let pipeline = ResolverPipeline::new(stages, &world.schema).unwrap();
        let view = world.view();
        let mut next = NextState::from_current(view.state());
        let failure = pipeline.run(&view, &buffer, &mut next, &world.registry).unwrap_err();
        assert_eq!(failure.resolver.as_str(), "lifecycle");
        assert!(matches!(
            failure.error,
            ResolveError::Contract(ContractViolation::UncausedEvent { .. })
        ));
    }
}
