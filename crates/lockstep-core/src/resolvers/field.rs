//! Applies `field` payloads with the overwrite/additive/multiplicative rules.

use std::collections::BTreeMap;

use rand_chacha::ChaCha8Rng;
use tracing::debug;

use lockstep_types::{
    ComponentType, ContractViolation, EntityId, EventDraft, EventType, FieldName, FieldOp, Output,
    Payload, Value,
};
use lockstep_world::{NextStateHandle, WorldView};

use crate::conflict::{self, FoldError};
use crate::resolver::{ResolveError, Resolver, ResolverDeclaration};

/// Folds every routed field write per `(entity, component, field)` and
/// writes the result once.
///
/// Writes to an entity that lacks the component (or no longer exists) are
/// dropped. With [`emitting`](Self::emitting) set, one event per written
/// field is emitted, caused by the last output in resolution order.
#[derive(Debug, Clone)]
pub struct FieldResolver {
    declaration: ResolverDeclaration,
    applied: Option<EventType>,
}

impl FieldResolver {
    /// Resolver for `declaration`, emitting no events.
    pub const fn new(declaration: ResolverDeclaration) -> Self {
        Self {
            declaration,
            applied: None,
        }
    }

    /// Emit `event` for every written field.
    #[must_use]
    pub fn emitting(mut self, event: impl Into<EventType>) -> Self {
        self.applied = Some(event.into());
        self
    }
}

type FieldKey = (EntityId, ComponentType, FieldName);

impl Resolver for FieldResolver {
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
        let mut groups: BTreeMap<FieldKey, Vec<(&Output, &FieldOp)>> = BTreeMap::new();
        for output in outputs {
            if let Payload::Field(write) = &output.payload {
                groups
                    .entry((write.target, write.component.clone(), write.field.clone()))
                    .or_default()
                    .push((output, &write.op));
            }
        }

        let mut events = Vec::new();
        for ((entity, component, field), writes) in groups {
            let Some(base) = next
                .component(entity, &component)
                .and_then(|c| c.get(field.as_str()))
                .cloned()
            else {
                debug!(%entity, %component, %field, writes = writes.len(), "dropping writes to absent field");
                continue;
            };
            let ops: Vec<&FieldOp> = writes.iter().map(|(_, op)| *op).collect();
            let value = conflict::fold_field_ops(&base, &ops).map_err(|err| match err {
                FoldError::MixedDeltaKinds => ResolveError::from(ContractViolation::MixedDeltaKinds {
                    resolver: self.declaration.id.clone(),
                    entity,
                    component: component.clone(),
                    field: field.clone(),
                    tick: next.tick(),
                }),
                FoldError::NotNumeric { .. } | FoldError::NonFinite(_) => ResolveError::Failed {
                    reason: format!("{entity}.{component}.{field}: {err}"),
                },
            })?;
            next.set_field(entity, &component, &field, value)?;
            if let (Some(event_type), Some((last, _))) = (&self.applied, writes.last()) {
                events.push(
                    EventDraft::caused_by(last, event_type.clone(), entity)
                        .with("component", Value::Text(component.to_string()))
                        .with("field", Value::Text(field.to_string())),
                );
            }
        }
        Ok(events)
    }
}
