//! Entity creation and teardown.

use rand_chacha::ChaCha8Rng;

use lockstep_types::{EventDraft, EventType, Output, Payload, Value};
use lockstep_world::{NextStateHandle, WorldError, WorldView};

use crate::resolver::{ResolveError, Resolver, ResolverDeclaration};

/// Applies `spawn` and `despawn` payloads.
///
/// A spawn whose parent is gone is rejected with an event instead of
/// failing the frame; a despawn of an entity that is already gone is a
/// no-op. Any other spawn failure (schema, attach rules) aborts the frame.
#[derive(Debug, Clone)]
pub struct LifecycleResolver {
    declaration: ResolverDeclaration,
    spawned: EventType,
    despawned: EventType,
    rejected: EventType,
}

impl LifecycleResolver {
    /// Resolver emitting `EntitySpawned`, `EntityDespawned` and
    /// `SpawnRejected`.
    pub fn new(declaration: ResolverDeclaration) -> Self {
        Self {
            declaration,
            spawned: EventType::from("EntitySpawned"),
            despawned: EventType::from("EntityDespawned"),
            rejected: EventType::from("SpawnRejected"),
        }
    }
}

impl Resolver for LifecycleResolver {
    fn declaration(&self) -> &ResolverDeclaration {
        &self.declaration
    }

    fn resolve(
        &self,
        outputs: &[&Output],
        _view: &WorldView,
        next: &mut NextStateHandle<'_>,
        _rng: &mut ChaCha8Rng,
    ) -> Result<Vec<EventDraft>, ResolveError> {
        let mut events = Vec::new();
        for output in outputs {
            match &output.payload {
                Payload::Spawn(request) => match next.spawn(request) {
                    Ok(id) => events.push(
                        EventDraft::caused_by(output, self.spawned.clone(), id)
                            .with("source", Value::Entity(output.source)),
                    ),
                    Err(WorldError::UnknownEntity(parent)) => events.push(
                        EventDraft::caused_by(output, self.rejected.clone(), output.source)
                            .with("parent", Value::Entity(parent)),
                    ),
                    Err(other) => return Err(other.into()),
                },
                Payload::Despawn { target } => {
                    if next.despawn(*target) {
                        events.push(EventDraft::caused_by(output, self.despawned.clone(), *target));
                    }
                }
                _ => {}
            }
        }
        Ok(events)
    }
}
