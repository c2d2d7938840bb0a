//! Naval plugins.
//!
//! | Plugin | Runs on | Phase | Proposes |
//! |---|---|---|---|
//! | [`helm`] | ships | default | `SetVelocity` toward the waypoint or the tracked target |
//! | [`sensor`] | ships | sensors | `SetTrack` on the nearest hostile in range |
//! | [`fire_control`] | ships | default | `FireWeapon` at the track, `AdjustHeat` |
//! | [`coolant`] | ships | default | `AdjustHeat` shedding heat |
//! | [`comms`] | ships | comms | `ReserveBandwidth` on the nearest relay |
//! | [`damage_control`] | ships | maintenance | `Repair` while out of contact |
//! | [`salvage`] | fleet command | default | `Scuttle` for every destroyed hull |

pub mod comms;
pub mod coolant;
pub mod damage_control;
pub mod fire_control;
pub mod helm;
pub mod salvage;
pub mod sensor;

use std::sync::Arc;

use lockstep_core::plugin::{Plugin, PluginError, PluginView};
use lockstep_types::{ComponentType, EntityId, Value};

use crate::names::{HULL, TRANSFORM};

pub use comms::CommsPlugin;
pub use coolant::CoolantPlugin;
pub use damage_control::DamageControlPlugin;
pub use fire_control::FireControlPlugin;
pub use helm::HelmPlugin;
pub use salvage::SalvagePlugin;
pub use sensor::SensorPlugin;

/// Every naval plugin, ready for registration.
pub fn all() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(CommsPlugin::new()),
        Arc::new(CoolantPlugin::new()),
        Arc::new(DamageControlPlugin::new()),
        Arc::new(FireControlPlugin::new()),
        Arc::new(HelmPlugin::new()),
        Arc::new(SalvagePlugin::new()),
        Arc::new(SensorPlugin::new()),
    ]
}

fn value<'a>(
    view: &PluginView<'a>,
    id: EntityId,
    component: &str,
    field: &str,
) -> Option<&'a Value> {
    view.field(id, &ComponentType::from(component), field)
}

pub(crate) fn float(view: &PluginView<'_>, id: EntityId, component: &str, field: &str) -> Option<f64> {
    value(view, id, component, field).and_then(Value::as_float)
}

pub(crate) fn flag(view: &PluginView<'_>, id: EntityId, component: &str, field: &str) -> Option<bool> {
    value(view, id, component, field).and_then(Value::as_bool)
}

pub(crate) fn int(view: &PluginView<'_>, id: EntityId, component: &str, field: &str) -> Option<i64> {
    value(view, id, component, field).and_then(Value::as_int)
}

pub(crate) fn entity(view: &PluginView<'_>, id: EntityId, component: &str, field: &str) -> Option<EntityId> {
    value(view, id, component, field).and_then(Value::as_entity)
}

pub(crate) fn text<'a>(
    view: &PluginView<'a>,
    id: EntityId,
    component: &str,
    field: &str,
) -> Option<&'a str> {
    value(view, id, component, field).and_then(Value::as_text)
}

/// A float the plugin cannot work without.
pub(crate) fn required(
    view: &PluginView<'_>,
    id: EntityId,
    component: &str,
    field: &str,
) -> Result<f64, PluginError> {
    float(view, id, component, field).ok_or_else(|| PluginError::MissingInput {
        entity: id,
        component: ComponentType::from(component),
    })
}

/// Position read through the declared `Transform` access.
pub(crate) fn position(view: &PluginView<'_>, id: EntityId) -> Option<(f64, f64)> {
    Some((float(view, id, TRANSFORM, "x")?, float(view, id, TRANSFORM, "y")?))
}

/// A hull that is still in the fight. Entities without a hull never are.
pub(crate) fn afloat(view: &PluginView<'_>, id: EntityId) -> bool {
    flag(view, id, HULL, "destroyed") == Some(false)
}

pub(crate) fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (b.0 - a.0).hypot(b.1 - a.1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fixture {
    //! A small naval world for plugin tests.

    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    use lockstep_core::clock::FrameClock;
    use lockstep_core::plugin::{Plugin, PluginContext, PluginView};
    use lockstep_core::registry::PluginRegistry;
    use lockstep_core::rng;
    use lockstep_types::{Component, ComponentType, EntityId, PluginId, Proposal, SpawnRequest, Tag, Value};
    use lockstep_world::{SchemaRegistry, SpatialConfig, WorldState, WorldView};

    use crate::{naval_schema, phases};

    pub(crate) struct Sea {
        pub(crate) schema: Arc<SchemaRegistry>,
        pub(crate) registry: PluginRegistry,
        pub(crate) state: WorldState,
    }

    impl Sea {
        pub(crate) fn new() -> Self {
            let schema = Arc::new(naval_schema().unwrap());
            let clock = FrameClock::new(&phases()).unwrap();
            let mut registry = PluginRegistry::new();
            for plugin in super::all() {
                registry.register(plugin, &schema, &clock).unwrap();
            }
            Self {
                schema,
                registry,
                state: WorldState::new(7),
            }
        }

        pub(crate) fn spawn(&mut self, tags: &[&str], components: Vec<(&str, Component)>, plugins: &[&str]) -> EntityId {
            let request = SpawnRequest {
                tags: tags.iter().map(|t| Tag::from(*t)).collect::<BTreeSet<_>>(),
                components: components
                    .into_iter()
                    .map(|(c, v)| (ComponentType::from(c), v))
                    .collect::<BTreeMap<_, _>>(),
                plugins: plugins.iter().map(|p| PluginId::from(*p)).collect(),
                ..SpawnRequest::default()
            };
            self.state.spawn(&request, &self.schema, &self.registry).unwrap()
        }

        /// A ship of `team` at `(x, y)` with every naval component.
        pub(crate) fn ship(&mut self, team: &str, x: f64, y: f64, extra: Vec<(&str, Component)>) -> EntityId {
            let mut components: BTreeMap<&str, Component> = [
                "Motion", "Helm", "Status", "Sensor", "Thermal", "Hull", "Weapon",
            ]
            .into_iter()
            .map(|c| (c, Component::new()))
            .collect();
            components.insert(
                "Transform",
                Component::new().with("x", Value::Float(x)).with("y", Value::Float(y)),
            );
            components.insert("Allegiance", Component::new().with("team", Value::Text(team.to_owned())));
            components.extend(extra);
            self.spawn(&["ship"], components.into_iter().collect(), &[])
        }

        pub(crate) fn view(&self) -> WorldView {
            WorldView::build(
                Arc::new(self.state.clone()),
                rng::frame_seed(self.state.root_seed(), self.state.tick()),
                Arc::clone(&self.schema),
                &SpatialConfig::default(),
                Arc::from(Vec::new()),
            )
        }

        /// Evaluate `plugin` on `entity` against `view`, asserting no
        /// contract violation was recorded.
        pub(crate) fn run(&self, view: &WorldView, plugin: &dyn Plugin, entity: EntityId) -> Vec<Proposal> {
            let decl = plugin.declaration();
            let window = PluginView::new(view, decl, entity);
            let ctx = PluginContext::new(entity, decl.id.clone(), view.tick(), view.frame_seed());
            let proposals = plugin.tick(&window, &ctx).unwrap();
            assert!(window.take_violation().is_none());
            proposals
        }
    }
}
