//! All-or-nothing reservations against provider capacity fields.

use std::collections::{BTreeMap, BTreeSet};

use rand_chacha::ChaCha8Rng;

use lockstep_types::{
    ComponentType, EntityId, EventDraft, EventType, FieldName, Output, OutputKey, Payload, Value,
};
use lockstep_world::{NextStateHandle, WorldView};

use crate::conflict::{self, Grant, ReservationClaim};
use crate::resolver::{ResolveError, Resolver, ResolverDeclaration};

/// Settles `reserve` payloads against a capacity component.
///
/// Capacity is read from `provider.<capacity component>.<resource>`. When
/// this resolver also owns the capacity component, granted amounts are
/// deducted and persist (ammunition); otherwise capacity renews every
/// frame (bandwidth).
#[derive(Debug, Clone)]
pub struct ReservationResolver {
    declaration: ResolverDeclaration,
    capacity: ComponentType,
    granted: EventType,
    denied: EventType,
}

impl ReservationResolver {
    /// Resolver reading capacity from `capacity`, emitting
    /// `ReservationGranted` and `ReservationDenied`.
    pub fn new(declaration: ResolverDeclaration, capacity: impl Into<ComponentType>) -> Self {
        Self {
            declaration,
            capacity: capacity.into(),
            granted: EventType::from("ReservationGranted"),
            denied: EventType::from("ReservationDenied"),
        }
    }

    fn consumes(&self) -> bool {
        self.declaration.owns.contains(&self.capacity)
    }
}

impl Resolver for ReservationResolver {
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
        let mut by_key: BTreeMap<OutputKey, &Output> = BTreeMap::new();
        let mut claims = Vec::new();
        for output in outputs {
            if let Payload::Reserve(reservation) = &output.payload {
                by_key.insert(output.key(), output);
                claims.push(ReservationClaim {
                    output: output.key(),
                    claimant: output.source,
                    provider: reservation.provider,
                    resource: reservation.resource.clone(),
                    amount: reservation.amount,
                    priority: reservation.priority,
                });
            }
        }
        if claims.is_empty() {
            return Ok(Vec::new());
        }

        let mut capacity: BTreeMap<(EntityId, FieldName), f64> = BTreeMap::new();
        for claim in &claims {
            let available = next
                .component(claim.provider, &self.capacity)
                .and_then(|c| c.float(claim.resource.as_str()))
                .unwrap_or(0.0);
            capacity.insert((claim.provider, claim.resource.clone()), available);
        }

        let plan = conflict::grant_reservations(capacity, &claims);
        let mut drawn: BTreeSet<(EntityId, FieldName)> = BTreeSet::new();
        let mut events = Vec::with_capacity(plan.decisions.len());
        for (claim, grant) in &plan.decisions {
            let Some(output) = by_key.get(&claim.output) else {
                continue;
            };
            let draft = match grant {
                Grant::Granted => {
                    drawn.insert((claim.provider, claim.resource.clone()));
                    EventDraft::caused_by(output, self.granted.clone(), claim.claimant)
                }
                Grant::Denied { available } => {
                    EventDraft::caused_by(output, self.denied.clone(), claim.claimant)
                        .with("available", Value::Float(*available))
                }
            };
            events.push(
                draft
                    .with("provider", Value::Entity(claim.provider))
                    .with("resource", Value::Text(claim.resource.to_string()))
                    .with("amount", Value::Float(claim.amount)),
            );
        }

        if self.consumes() {
            for (provider, resource) in drawn {
                if let Some(left) = plan.remaining.get(&(provider, resource.clone())) {
                    next.set_field(provider, &self.capacity, &resource, Value::Float(*left))?;
                }
            }
        }
        Ok(events)
    }
}
