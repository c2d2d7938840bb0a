//! Sensor: keeps the track on the nearest hostile hull in range.

use lockstep_core::plugin::{Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
use lockstep_types::{ComponentType, EntityId, FieldOp, FieldWrite, Payload, Proposal, Value};

use super::{afloat, entity, flag, required, text};
use crate::names::{ALLEGIANCE, HULL, SENSOR, SENSORS_PHASE, SET_TRACK, SHIP, TRANSFORM};

/// Sweeps on the `sensors` phase and proposes track changes only.
pub struct SensorPlugin {
    declaration: PluginDeclaration,
}

impl SensorPlugin {
    /// Plugin with its static declaration.
    pub fn new() -> Self {
        Self {
            declaration: PluginDeclaration::new("sensor")
                .requires(SHIP)
                .reads(TRANSFORM)
                .reads(SENSOR)
                .reads(ALLEGIANCE)
                .reads(HULL)
                .emits(SET_TRACK)
                .in_phase(SENSORS_PHASE),
        }
    }
}

impl Default for SensorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn set(ctx: &PluginContext, field: &str, value: Value) -> Proposal {
    ctx.propose(
        SET_TRACK,
        Payload::Field(FieldWrite {
            target: ctx.entity(),
            component: ComponentType::from(SENSOR),
            field: field.into(),
            op: FieldOp::Set(value),
        }),
    )
}

impl Plugin for SensorPlugin {
    fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError> {
        let me = ctx.entity();
        let locked = flag(view, me, SENSOR, "locked") == Some(true);
        if !afloat(view, me) {
            return Ok(if locked {
                vec![set(ctx, "locked", Value::Bool(false))]
            } else {
                Vec::new()
            });
        }
        let (x, y) = (required(view, me, TRANSFORM, "x")?, required(view, me, TRANSFORM, "y")?);
        let range = required(view, me, SENSOR, "range")?;
        let team = text(view, me, ALLEGIANCE, "team").unwrap_or_default();

        let hostile = |id: &EntityId| {
            *id != me
                && afloat(view, *id)
                && text(view, *id, ALLEGIANCE, "team").is_some_and(|t| !t.is_empty() && t != team)
        };
        let nearest = view.within_radius(x, y, range).into_iter().find(hostile);
        let track = entity(view, me, SENSOR, "track");

        Ok(match nearest {
            Some(target) if locked && track == Some(target) => Vec::new(),
            Some(target) => vec![
                set(ctx, "track", Value::Entity(target)),
                set(ctx, "locked", Value::Bool(true)),
            ],
            None if locked => vec![set(ctx, "locked", Value::Bool(false))],
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lockstep_types::Component;

    use super::*;
    use crate::plugins::fixture::Sea;

    fn writes(proposals: &[Proposal]) -> Vec<(String, Value)> {
        proposals
            .iter()
            .filter_map(|p| match &p.payload {
                Payload::Field(FieldWrite {
                    field,
                    op: FieldOp::Set(v),
                    ..
                }) => Some((field.to_string(), v.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn locks_nearest_hostile_and_ignores_friends() {
        let mut sea = Sea::new();
        let me = sea.ship("blue", 0.0, 0.0, Vec::new());
        let _friend = sea.ship("blue", 10.0, 0.0, Vec::new());
        let far = sea.ship("red", 400.0, 0.0, Vec::new());
        let near = sea.ship("red", 0.0, 300.0, Vec::new());
        let _beyond = sea.ship("red", 900.0, 0.0, Vec::new());
        let view = sea.view();
        let proposals = sea.run(&view, &SensorPlugin::new(), me);
        assert_eq!(
            writes(&proposals),
            vec![
                ("track".to_owned(), Value::Entity(near)),
                ("locked".to_owned(), Value::Bool(true)),
            ]
        );
        assert_ne!(near, far);
    }

    #[test]
    fn keeps_quiet_while_track_is_current() {
        let mut sea = Sea::new();
        let target = sea.ship("red", 100.0, 0.0, Vec::new());
        let me = sea.ship(
            "blue",
            0.0,
            0.0,
            vec![(
                "Sensor",
                Component::new()
                    .with("locked", Value::Bool(true))
                    .with("track", Value::Entity(target)),
            )],
        );
        let view = sea.view();
        assert!(sea.run(&view, &SensorPlugin::new(), me).is_empty());
    }

    #[test]
    fn drops_lock_when_target_is_gone() {
        let mut sea = Sea::new();
        let wreck = sea.ship(
            "red",
            100.0,
            0.0,
            vec![("Hull", Component::new().with("destroyed", Value::Bool(true)))],
        );
        let me = sea.ship(
            "blue",
            0.0,
            0.0,
            vec![(
                "Sensor",
                Component::new()
                    .with("locked", Value::Bool(true))
                    .with("track", Value::Entity(wreck)),
            )],
        );
        let view = sea.view();
        let proposals = sea.run(&view, &SensorPlugin::new(), me);
        assert_eq!(writes(&proposals), vec![("locked".to_owned(), Value::Bool(false))]);
    }
}
