//! Comms: books relay bandwidth on the nearest relay.

use lockstep_core::plugin::{Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
use lockstep_types::{EntityId, Payload, Proposal, Reservation, Tag};

use super::{afloat, distance, position};
use crate::names::{COMMS_PHASE, HULL, RELAY_TAG, RESERVE_BANDWIDTH, SHIP, TRANSFORM};

/// Bandwidth one ship books per comms window.
pub const BANDWIDTH_PER_SHIP: f64 = 1.0;

/// Reserves bandwidth each `comms` phase; relays grant all-or-nothing.
pub struct CommsPlugin {
    declaration: PluginDeclaration,
}

impl CommsPlugin {
    /// Plugin with its static declaration.
    pub fn new() -> Self {
        Self {
            declaration: PluginDeclaration::new("comms")
                .requires(SHIP)
                .reads(TRANSFORM)
                .reads(HULL)
                .emits(RESERVE_BANDWIDTH)
                .in_phase(COMMS_PHASE),
        }
    }
}

impl Default for CommsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for CommsPlugin {
    fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError> {
        let me = ctx.entity();
        let Some(here) = position(view, me).filter(|_| afloat(view, me)) else {
            return Ok(Vec::new());
        };
        let nearest = view
            .by_tag(&Tag::from(RELAY_TAG))
            .into_iter()
            .filter_map(|relay| position(view, relay.id()).map(|p| (distance(here, p), relay.id())))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let Some((_, provider)) = nearest else {
            return Ok(Vec::new());
        };
        Ok(vec![reserve(ctx, provider)])
    }
}

fn reserve(ctx: &PluginContext, provider: EntityId) -> Proposal {
    ctx.propose(
        RESERVE_BANDWIDTH,
        Payload::Reserve(Reservation {
            provider,
            resource: "bandwidth".into(),
            amount: BANDWIDTH_PER_SHIP,
            priority: 0,
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lockstep_types::{Component, Value};

    use super::*;
    use crate::plugins::fixture::Sea;

    fn relay(sea: &mut Sea, x: f64) -> EntityId {
        sea.spawn(
            &["platform", "relay"],
            vec![
                ("Transform", Component::new().with("x", Value::Float(x))),
                ("Relay", Component::new().with("bandwidth", Value::Float(2.0))),
            ],
            &[],
        )
    }

    #[test]
    fn books_the_nearest_relay() {
        let mut sea = Sea::new();
        let _far = relay(&mut sea, 500.0);
        let near = relay(&mut sea, -100.0);
        let me = sea.ship("blue", 0.0, 0.0, Vec::new());
        let view = sea.view();
        let proposals = sea.run(&view, &CommsPlugin::new(), me);
        assert!(matches!(
            proposals.first().map(|p| &p.payload),
            Some(Payload::Reserve(r)) if r.provider == near
        ));
    }

    #[test]
    fn silent_without_relays() {
        let mut sea = Sea::new();
        let me = sea.ship("blue", 0.0, 0.0, Vec::new());
        let view = sea.view();
        assert!(sea.run(&view, &CommsPlugin::new(), me).is_empty());
    }
}
