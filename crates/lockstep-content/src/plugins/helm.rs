//! Helm: steers toward the waypoint, or closes on the tracked target.

use lockstep_core::plugin::{Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
use lockstep_types::{Component, Payload, Proposal, Value};

use super::{afloat, distance, entity, flag, float, position, required};
use crate::names::{DEFAULT_PHASE, HELM, HULL, MOTION, SENSOR, SET_VELOCITY, SHIP, TRANSFORM, WEAPON};

/// Distance at which a waypoint counts as reached.
pub const ARRIVAL_RADIUS: f64 = 5.0;

/// Fraction of weapon range the helm closes to before holding position.
pub const STANDOFF: f64 = 0.8;

/// Velocity changes smaller than this are not proposed.
const VELOCITY_EPSILON: f64 = 1e-6;

/// Sets the ship's velocity each frame.
pub struct HelmPlugin {
    declaration: PluginDeclaration,
}

impl HelmPlugin {
    /// Plugin with its static declaration.
    pub fn new() -> Self {
        Self {
            declaration: PluginDeclaration::new("helm")
                .requires(SHIP)
                .reads(TRANSFORM)
                .reads(MOTION)
                .reads(HELM)
                .reads(SENSOR)
                .reads(WEAPON)
                .reads(HULL)
                .emits(SET_VELOCITY)
                .in_phase(DEFAULT_PHASE),
        }
    }
}

impl Default for HelmPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for HelmPlugin {
    fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError> {
        let me = ctx.entity();
        if !afloat(view, me) {
            return Ok(Vec::new());
        }
        let here = (required(view, me, TRANSFORM, "x")?, required(view, me, TRANSFORM, "y")?);
        let max_speed = required(view, me, MOTION, "max_speed")?;

        let destination = if flag(view, me, HELM, "has_waypoint") == Some(true) {
            Some((
                (required(view, me, HELM, "waypoint_x")?, required(view, me, HELM, "waypoint_y")?),
                ARRIVAL_RADIUS,
            ))
        } else if flag(view, me, SENSOR, "locked") == Some(true) {
            let range = float(view, me, WEAPON, "range").unwrap_or_default();
            entity(view, me, SENSOR, "track")
                .and_then(|target| position(view, target))
                .map(|there| (there, range * STANDOFF))
        } else {
            None
        };

        let (vx, vy) = match destination {
            Some((there, hold_within)) => {
                let gap = distance(here, there);
                if gap <= hold_within || gap <= f64::EPSILON {
                    (0.0, 0.0)
                } else {
                    let speed = max_speed.min(gap);
                    ((there.0 - here.0) / gap * speed, (there.1 - here.1) / gap * speed)
                }
            }
            None => (0.0, 0.0),
        };

        let current = (
            float(view, me, MOTION, "vx").unwrap_or_default(),
            float(view, me, MOTION, "vy").unwrap_or_default(),
        );
        if (vx - current.0).abs() < VELOCITY_EPSILON && (vy - current.1).abs() < VELOCITY_EPSILON {
            return Ok(Vec::new());
        }
        Ok(vec![ctx.propose(
            SET_VELOCITY,
            Payload::Command {
                target: Some(me),
                args: Component::new()
                    .with("vx", Value::Float(vx))
                    .with("vy", Value::Float(vy)),
            },
        )])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::plugins::fixture::Sea;

    fn velocity(proposal: &Proposal) -> (f64, f64) {
        let Payload::Command { args, .. } = &proposal.payload else {
            return (f64::NAN, f64::NAN);
        };
        (args.float("vx").unwrap(), args.float("vy").unwrap())
    }

    #[test]
    fn steers_toward_waypoint_at_max_speed() {
        let mut sea = Sea::new();
        let ship = sea.ship(
            "blue",
            0.0,
            0.0,
            vec![(
                "Helm",
                Component::new()
                    .with("has_waypoint", Value::Bool(true))
                    .with("waypoint_x", Value::Float(300.0))
                    .with("waypoint_y", Value::Float(400.0)),
            )],
        );
        let view = sea.view();
        let proposals = sea.run(&view, &HelmPlugin::new(), ship);
        assert_eq!(proposals.len(), 1);
        let (vx, vy) = velocity(proposals.first().unwrap());
        assert!((vx - 6.0).abs() < 1e-9);
        assert!((vy - 8.0).abs() < 1e-9);
    }

    #[test]
    fn holds_at_standoff_from_track() {
        let mut sea = Sea::new();
        let target = sea.ship("red", 200.0, 0.0, Vec::new());
        let ship = sea.ship(
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
        assert!(
            sea.run(&view, &HelmPlugin::new(), ship).is_empty(),
            "already within 80% of weapon range and stopped"
        );
    }

    #[test]
    fn wrecks_do_not_steer() {
        let mut sea = Sea::new();
        let ship = sea.ship(
            "blue",
            0.0,
            0.0,
            vec![
                ("Hull", Component::new().with("destroyed", Value::Bool(true))),
                ("Motion", Component::new().with("vx", Value::Float(3.0))),
            ],
        );
        let view = sea.view();
        assert!(sea.run(&view, &HelmPlugin::new(), ship).is_empty());
    }
}
