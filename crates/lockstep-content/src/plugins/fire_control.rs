//! Fire control: engages the tracked target when the weapon is ready.

use lockstep_core::plugin::{Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
use lockstep_types::{Component, ComponentType, FieldOp, FieldWrite, Payload, Proposal};

use super::{afloat, distance, entity, flag, float, int, position, required};
use crate::names::{
    ADJUST_HEAT, DEFAULT_PHASE, FIRE_WEAPON, HULL, SENSOR, SHIP, THERMAL, TRANSFORM, WEAPON,
};

/// Heat added by one shot.
pub const HEAT_PER_SHOT: f64 = 1.5;

/// Proposes a shot and its heat cost.
///
/// The plugin only checks what it can see: lock, range, readiness and
/// heat. Operating mode is the combat resolver's business.
pub struct FireControlPlugin {
    declaration: PluginDeclaration,
}

impl FireControlPlugin {
    /// Plugin with its static declaration.
    pub fn new() -> Self {
        Self {
            declaration: PluginDeclaration::new("fire_control")
                .requires(SHIP)
                .reads(TRANSFORM)
                .reads(SENSOR)
                .reads(WEAPON)
                .reads(THERMAL)
                .reads(HULL)
                .emits(FIRE_WEAPON)
                .emits(ADJUST_HEAT)
                .in_phase(DEFAULT_PHASE),
        }
    }
}

impl Default for FireControlPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for FireControlPlugin {
    fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError> {
        let me = ctx.entity();
        if !afloat(view, me) || flag(view, me, SENSOR, "locked") != Some(true) {
            return Ok(Vec::new());
        }
        let Some(target) = entity(view, me, SENSOR, "track").filter(|t| afloat(view, *t)) else {
            return Ok(Vec::new());
        };
        let ready = int(view, me, WEAPON, "cooldown") == Some(0)
            && int(view, me, WEAPON, "ammo").is_some_and(|a| a > 0);
        let heat = float(view, me, THERMAL, "heat").unwrap_or_default();
        let limit = required(view, me, THERMAL, "limit")?;
        if !ready || heat + HEAT_PER_SHOT > limit {
            return Ok(Vec::new());
        }
        let range = required(view, me, WEAPON, "range")?;
        let (Some(here), Some(there)) = (position(view, me), position(view, target)) else {
            return Ok(Vec::new());
        };
        if distance(here, there) > range {
            return Ok(Vec::new());
        }
        Ok(vec![
            ctx.propose(
                FIRE_WEAPON,
                Payload::Command {
                    target: Some(target),
                    args: Component::new(),
                },
            ),
            ctx.propose(
                ADJUST_HEAT,
                Payload::Field(FieldWrite {
                    target: me,
                    component: ComponentType::from(THERMAL),
                    field: "heat".into(),
                    op: FieldOp::Add(HEAT_PER_SHOT),
                }),
            ),
        ])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lockstep_types::{EntityId, Value};

    use super::*;
    use crate::plugins::fixture::Sea;

    fn locked_on(target: EntityId) -> (&'static str, Component) {
        (
            "Sensor",
            Component::new()
                .with("locked", Value::Bool(true))
                .with("track", Value::Entity(target)),
        )
    }

    #[test]
    fn fires_when_ready_and_in_range() {
        let mut sea = Sea::new();
        let target = sea.ship("red", 250.0, 0.0, Vec::new());
        let me = sea.ship("blue", 0.0, 0.0, vec![locked_on(target)]);
        let view = sea.view();
        let proposals = sea.run(&view, &FireControlPlugin::new(), me);
        let types: Vec<&str> = proposals.iter().map(|p| p.output_type.as_str()).collect();
        assert_eq!(types, vec![FIRE_WEAPON, ADJUST_HEAT]);
        assert!(matches!(
            proposals.first().map(|p| &p.payload),
            Some(Payload::Command { target: Some(t), .. }) if *t == target
        ));
        let traces: Vec<_> = proposals.iter().map(|p| p.trace).collect();
        assert_ne!(traces.first(), traces.last(), "each proposal roots its own chain");
    }

    #[test]
    fn holds_fire_out_of_range_cooling_or_hot() {
        let mut sea = Sea::new();
        let far = sea.ship("red", 350.0, 0.0, Vec::new());
        let near = sea.ship("red", 0.0, 50.0, Vec::new());
        let out_of_range = sea.ship("blue", 0.0, 0.0, vec![locked_on(far)]);
        let cooling = sea.ship(
            "blue",
            0.0,
            0.0,
            vec![
                locked_on(near),
                ("Weapon", Component::new().with("cooldown", Value::Int(2))),
            ],
        );
        let hot = sea.ship(
            "blue",
            0.0,
            0.0,
            vec![
                locked_on(near),
                ("Thermal", Component::new().with("heat", Value::Float(9.0))),
            ],
        );
        let dry = sea.ship(
            "blue",
            0.0,
            0.0,
            vec![locked_on(near), ("Weapon", Component::new().with("ammo", Value::Int(0)))],
        );
        let view = sea.view();
        for ship in [out_of_range, cooling, hot, dry] {
            assert!(sea.run(&view, &FireControlPlugin::new(), ship).is_empty(), "{ship}");
        }
    }
}
