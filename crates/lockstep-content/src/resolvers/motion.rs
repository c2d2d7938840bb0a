//! Motion: velocity commands and fixed-step integration.

use std::collections::BTreeMap;
use std::time::Duration;

use rand_chacha::ChaCha8Rng;

use lockstep_core::resolver::{ResolveError, Resolver, ResolverDeclaration};
use lockstep_types::{ComponentType, EntityId, EventDraft, FieldName, MapSpec, Output, Payload, Value};
use lockstep_world::{Entity, NextStateHandle, WorldView};

use crate::names::{HULL, MOTION, TRANSFORM};

/// Applies `SetVelocity` commands, then moves every entity with a
/// `Motion` and a `Transform` by `velocity * dt`.
///
/// Per target, the last command in resolution order wins. Velocities are
/// clamped to the entity's `max_speed`, positions to the map. Wrecks are
/// brought to a stop. Emits no events.
#[derive(Debug, Clone)]
pub struct MotionResolver {
    declaration: ResolverDeclaration,
    dt: f64,
    bounds: MapSpec,
}

impl MotionResolver {
    /// Resolver integrating with a step of `tick_duration_ms` of simulated
    /// time inside `bounds`.
    pub fn new(declaration: ResolverDeclaration, tick_duration_ms: u64, bounds: MapSpec) -> Self {
        Self {
            declaration,
            dt: Duration::from_millis(tick_duration_ms).as_secs_f64(),
            bounds,
        }
    }

    /// Simulated seconds per frame.
    pub const fn dt(&self) -> f64 {
        self.dt
    }
}

fn clamp_speed(vx: f64, vy: f64, max_speed: f64) -> (f64, f64) {
    let speed = vx.hypot(vy);
    if speed <= max_speed || speed <= f64::EPSILON {
        (vx, vy)
    } else {
        (vx / speed * max_speed, vy / speed * max_speed)
    }
}

impl Resolver for MotionResolver {
    fn declaration(&self) -> &ResolverDeclaration {
        &self.declaration
    }

    fn resolve(
        &self,
        outputs: &[&Output],
        view: &WorldView,
        next: &mut NextStateHandle<'_>,
        _rng: &mut ChaCha8Rng,
    ) -> Result<Vec<EventDraft>, ResolveError> {
        let motion = ComponentType::from(MOTION);
        let transform = ComponentType::from(TRANSFORM);
        let hull = ComponentType::from(HULL);
        let field = |name: &str| FieldName::from(name);

        let mut orders: BTreeMap<EntityId, (f64, f64)> = BTreeMap::new();
        for output in outputs {
            if let Payload::Command { target, args } = &output.payload {
                let target = target.unwrap_or(output.source);
                let (Some(vx), Some(vy)) = (args.float("vx"), args.float("vy")) else {
                    return Err(ResolveError::Failed {
                        reason: format!("SetVelocity output {} lacks vx/vy", output.id),
                    });
                };
                orders.insert(target, (vx, vy));
            }
        }

        let movers: Vec<EntityId> = view
            .entities()
            .filter(|e| e.component(&motion).is_some() && e.component(&transform).is_some())
            .map(Entity::id)
            .collect();
        for id in movers {
            let Some(state) = next.component(id, &motion) else {
                continue;
            };
            let max_speed = state.float("max_speed").unwrap_or_default();
            let wrecked = next
                .component(id, &hull)
                .and_then(|h| h.bool("destroyed"))
                .unwrap_or(false);
            let current = (
                state.float("vx").unwrap_or_default(),
                state.float("vy").unwrap_or_default(),
            );
            let (vx, vy) = if wrecked {
                (0.0, 0.0)
            } else {
                let (vx, vy) = orders.get(&id).copied().unwrap_or(current);
                clamp_speed(vx, vy, max_speed)
            };
            if (vx - current.0).abs() > f64::EPSILON || (vy - current.1).abs() > f64::EPSILON {
                next.set_field(id, &motion, &field("vx"), Value::Float(vx))?;
                next.set_field(id, &motion, &field("vy"), Value::Float(vy))?;
            }
            if vx.hypot(vy) <= f64::EPSILON {
                continue;
            }

            let Some(pose) = next.component(id, &transform) else {
                continue;
            };
            let x = pose.float("x").unwrap_or_default();
            let y = pose.float("y").unwrap_or_default();
            let nx = vx.mul_add(self.dt, x).clamp(0.0, self.bounds.width);
            let ny = vy.mul_add(self.dt, y).clamp(0.0, self.bounds.height);
            next.set_field(id, &transform, &field("x"), Value::Float(nx))?;
            next.set_field(id, &transform, &field("y"), Value::Float(ny))?;
            next.set_field(id, &transform, &field("heading"), Value::Float(vy.atan2(vx)))?;
        }
        Ok(Vec::new())
    }
}
