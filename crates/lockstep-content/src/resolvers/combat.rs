//! Weapons fire, damage and repairs.
//!
//! The combat resolver is the single writer of `Hull` and `Weapon`. Every
//! frame it first counts weapon cooldowns down, then settles `FireWeapon`
//! commands in resolution order and finally `Repair` commands. Each
//! command reads the hull and weapon state left by the commands before it
//! in the same frame, so a second shot from the same mount is refused as
//! reloading and a hull sunk by the first shot cannot be hit again.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use lockstep_core::resolver::{ResolveError, Resolver, ResolverDeclaration};
use lockstep_types::{ComponentType, EntityId, EventDraft, FieldName, Output, Payload, Value};
use lockstep_world::{NextStateHandle, WorldView};

use crate::names::{
    DAMAGE_DEALT, ENTITY_DESTROYED, FIRE_REJECTED, FIRE_WEAPON, HULL, REPAIR, REPAIRED, STATUS,
    WEAPON, WEAPON_FIRED,
};

// ---------------------------------------------------------------------------
// Rejection reasons
// ---------------------------------------------------------------------------

/// Shooter is gone or sunk.
pub const SHOOTER_UNAVAILABLE: &str = "shooter_unavailable";
/// Shooter is changing layers and cannot fire.
pub const TRANSITIONING: &str = "transitioning";
/// Magazine is empty.
pub const OUT_OF_AMMO: &str = "out_of_ammo";
/// Weapon has not reloaded yet.
pub const RELOADING: &str = "reloading";
/// Target does not exist.
pub const NO_TARGET: &str = "no_target";
/// Target is already sunk.
pub const TARGET_DESTROYED: &str = "target_destroyed";
/// Target is beyond weapon range.
pub const OUT_OF_RANGE: &str = "out_of_range";

// ---------------------------------------------------------------------------
// CombatResolver
// ---------------------------------------------------------------------------

/// Settles `FireWeapon` and `Repair` commands.
#[derive(Debug, Clone)]
pub struct CombatResolver {
    declaration: ResolverDeclaration,
    hull: ComponentType,
    weapon: ComponentType,
    status: ComponentType,
}

impl CombatResolver {
    /// Resolver with the given declaration. The declaration must own
    /// `Hull` and `Weapon`.
    pub fn new(declaration: ResolverDeclaration) -> Self {
        Self {
            declaration,
            hull: ComponentType::from(HULL),
            weapon: ComponentType::from(WEAPON),
            status: ComponentType::from(STATUS),
        }
    }
}

impl Resolver for CombatResolver {
    fn declaration(&self) -> &ResolverDeclaration {
        &self.declaration
    }

    fn resolve(
        &self,
        outputs: &[&Output],
        view: &WorldView,
        next: &mut NextStateHandle<'_>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<EventDraft>, ResolveError> {
        self.reload(view, next)?;

        let mut events = Vec::new();
        for output in outputs.iter().filter(|o| o.output_type.as_str() == FIRE_WEAPON) {
            events.extend(self.fire(output, view, next, rng)?);
        }
        for output in outputs.iter().filter(|o| o.output_type.as_str() == REPAIR) {
            events.extend(self.repair(output, next)?);
        }
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Internal resolution
// ---------------------------------------------------------------------------

impl CombatResolver {
    fn reload(&self, view: &WorldView, next: &mut NextStateHandle<'_>) -> Result<(), ResolveError> {
        let cooling: Vec<(EntityId, i64)> = view
            .entities()
            .filter_map(|e| {
                let cooldown = e.component(&self.weapon)?.int("cooldown")?;
                (cooldown > 0).then_some((e.id(), cooldown))
            })
            .collect();
        for (id, cooldown) in cooling {
            next.set_field(
                id,
                &self.weapon,
                &FieldName::from("cooldown"),
                Value::Int(cooldown.saturating_sub(1)),
            )?;
        }
        Ok(())
    }

    fn fire(
        &self,
        output: &Output,
        view: &WorldView,
        next: &mut NextStateHandle<'_>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<EventDraft>, ResolveError> {
        let shooter = output.source;
        let Payload::Command {
            target: Some(target),
            ..
        } = &output.payload
        else {
            return Ok(vec![rejected(output, NO_TARGET, None)]);
        };
        let target = *target;

        if let Some(reason) = self.check_shot(shooter, target, view, next) {
            debug!(%shooter, %target, reason, "Fire rejected");
            return Ok(vec![rejected(output, reason, Some(target))]);
        }

        let Some(weapon) = next.component(shooter, &self.weapon).cloned() else {
            return Ok(vec![rejected(output, SHOOTER_UNAVAILABLE, Some(target))]);
        };
        let ammo = weapon.int("ammo").unwrap_or_default();
        let reload = weapon.int("reload_ticks").unwrap_or_default().max(0);
        next.set_field(shooter, &self.weapon, &FieldName::from("ammo"), Value::Int(ammo.saturating_sub(1)))?;
        next.set_field(shooter, &self.weapon, &FieldName::from("cooldown"), Value::Int(reload))?;

        let roll: f64 = rng.random();
        let hit = roll < weapon.float("accuracy").unwrap_or_default();
        let mut events = vec![
            EventDraft::caused_by(output, WEAPON_FIRED, shooter)
                .with("target", Value::Entity(target))
                .with("hit", Value::Bool(hit))
                .with("roll", Value::Float(roll)),
        ];
        if !hit {
            return Ok(events);
        }

        let damage = weapon.float("damage").unwrap_or_default().max(0.0);
        let hp = next
            .component(target, &self.hull)
            .and_then(|h| h.float("hp"))
            .unwrap_or_default();
        let remaining = (hp - damage).max(0.0);
        next.set_field(target, &self.hull, &FieldName::from("hp"), Value::Float(remaining))?;
        events.push(
            EventDraft::caused_by(output, DAMAGE_DEALT, target)
                .with("by", Value::Entity(shooter))
                .with("amount", Value::Float(hp - remaining))
                .with("remaining", Value::Float(remaining)),
        );
        if remaining <= 0.0 {
            next.set_field(target, &self.hull, &FieldName::from("destroyed"), Value::Bool(true))?;
            events.push(EventDraft::caused_by(output, ENTITY_DESTROYED, target).with("by", Value::Entity(shooter)));
        }
        Ok(events)
    }

    /// First reason the shot cannot be taken, if any.
    fn check_shot(
        &self,
        shooter: EntityId,
        target: EntityId,
        view: &WorldView,
        next: &NextStateHandle<'_>,
    ) -> Option<&'static str> {
        if !self.afloat(shooter, next) || next.component(shooter, &self.weapon).is_none() {
            return Some(SHOOTER_UNAVAILABLE);
        }
        let transitioning = next
            .component(shooter, &self.status)
            .and_then(|s| s.bool("transitioning"))
            .unwrap_or(false);
        if transitioning {
            return Some(TRANSITIONING);
        }
        let weapon = next.component(shooter, &self.weapon)?;
        if weapon.int("ammo").unwrap_or_default() <= 0 {
            return Some(OUT_OF_AMMO);
        }
        if weapon.int("cooldown").unwrap_or_default() > 0 {
            return Some(RELOADING);
        }
        if next.component(target, &self.hull).is_none() {
            return Some(NO_TARGET);
        }
        if !self.afloat(target, next) {
            return Some(TARGET_DESTROYED);
        }
        let range = weapon.float("range").unwrap_or_default();
        match (view.position(shooter), view.position(target)) {
            (Some(a), Some(b)) if (b.0 - a.0).hypot(b.1 - a.1) <= range => None,
            _ => Some(OUT_OF_RANGE),
        }
    }

    fn repair(&self, output: &Output, next: &mut NextStateHandle<'_>) -> Result<Option<EventDraft>, ResolveError> {
        let Payload::Command { target, args } = &output.payload else {
            return Ok(None);
        };
        let target = target.unwrap_or(output.source);
        if !self.afloat(target, next) {
            return Ok(None);
        }
        let Some(hull) = next.component(target, &self.hull) else {
            return Ok(None);
        };
        let hp = hull.float("hp").unwrap_or_default();
        let max_hp = hull.float("max_hp").unwrap_or(hp);
        let amount = args.float("amount").unwrap_or_default().max(0.0);
        let repaired = (hp + amount).min(max_hp);
        if repaired <= hp {
            return Ok(None);
        }
        next.set_field(target, &self.hull, &FieldName::from("hp"), Value::Float(repaired))?;
        Ok(Some(
            EventDraft::caused_by(output, REPAIRED, target)
                .with("amount", Value::Float(repaired - hp))
                .with("hp", Value::Float(repaired)),
        ))
    }

    fn afloat(&self, id: EntityId, next: &NextStateHandle<'_>) -> bool {
        next.component(id, &self.hull)
            .and_then(|h| h.bool("destroyed"))
            .is_some_and(|destroyed| !destroyed)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rejected(output: &Output, reason: &str, target: Option<EntityId>) -> EventDraft {
    let draft = EventDraft::caused_by(output, FIRE_REJECTED, output.source).with("reason", Value::Text(reason.to_owned()));
    match target {
        Some(target) => draft.with("target", Value::Entity(target)),
        None => draft,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lockstep_types::Component;
    use lockstep_world::WorldState;

    use super::*;
    use crate::plugins::fixture::Sea;
    use crate::resolvers::harness::{command, resolve};

    fn combat() -> CombatResolver {
        CombatResolver::new(
            ResolverDeclaration::new("combat", 20)
                .handles(FIRE_WEAPON)
                .handles(REPAIR)
                .owns(HULL)
                .owns(WEAPON),
        )
    }

    fn gun(accuracy: f64) -> (&'static str, Component) {
        (WEAPON, Component::new().with("accuracy", Value::Float(accuracy)))
    }

    fn fire(sea: &Sea, id: u64, shooter: EntityId, target: EntityId) -> Output {
        command(sea, id, shooter, FIRE_WEAPON, Some(target), Component::new())
    }

    fn field<'a>(state: &'a WorldState, id: EntityId, ctype: &str, field: &str) -> &'a Value {
        state.component(id, &ComponentType::from(ctype)).unwrap().get(field).unwrap()
    }

    fn types(events: &[EventDraft]) -> Vec<&str> {
        events.iter().map(|e| e.event_type.as_str()).collect()
    }

    fn reason(event: &EventDraft) -> &str {
        event.data.get("reason").and_then(Value::as_text).unwrap()
    }

    #[test]
    fn a_hit_damages_the_target_and_spends_a_round() {
        let mut sea = Sea::new();
        let shooter = sea.ship("red", 0.0, 0.0, vec![gun(1.0)]);
        let target = sea.ship("blue", 100.0, 0.0, vec![]);
        let out = fire(&sea, 1, shooter, target);
        let (state, events) = resolve(&sea, &combat(), &[out]);

        assert_eq!(types(&events), vec![WEAPON_FIRED, DAMAGE_DEALT]);
        assert_eq!(field(&state, shooter, WEAPON, "ammo"), &Value::Int(19));
        assert_eq!(field(&state, shooter, WEAPON, "cooldown"), &Value::Int(3));
        assert_eq!(field(&state, target, HULL, "hp"), &Value::Float(90.0));
        assert!(events.iter().all(|e| e.cause.is_some()));
    }

    #[test]
    fn a_miss_still_spends_a_round() {
        let mut sea = Sea::new();
        let shooter = sea.ship("red", 0.0, 0.0, vec![gun(0.0)]);
        let target = sea.ship("blue", 100.0, 0.0, vec![]);
        let out = fire(&sea, 1, shooter, target);
        let (state, events) = resolve(&sea, &combat(), &[out]);

        assert_eq!(types(&events), vec![WEAPON_FIRED]);
        assert_eq!(events.first().unwrap().data.get("hit"), Some(&Value::Bool(false)));
        assert_eq!(field(&state, shooter, WEAPON, "ammo"), &Value::Int(19));
        assert_eq!(field(&state, target, HULL, "hp"), &Value::Float(100.0));
    }

    #[test]
    fn lethal_damage_destroys_and_blocks_follow_up_shots() {
        let mut sea = Sea::new();
        let first = sea.ship("red", 0.0, 0.0, vec![gun(1.0)]);
        let second = sea.ship("red", 0.0, 50.0, vec![gun(1.0)]);
        let target = sea.ship(
            "blue",
            100.0,
            0.0,
            vec![(HULL, Component::new().with("hp", Value::Float(4.0)))],
        );
        let outs = [fire(&sea, 1, first, target), fire(&sea, 2, second, target)];
        let (state, events) = resolve(&sea, &combat(), &outs);

        assert_eq!(
            types(&events),
            vec![WEAPON_FIRED, DAMAGE_DEALT, ENTITY_DESTROYED, FIRE_REJECTED]
        );
        assert_eq!(reason(events.last().unwrap()), TARGET_DESTROYED);
        assert_eq!(field(&state, target, HULL, "destroyed"), &Value::Bool(true));
        assert_eq!(field(&state, target, HULL, "hp"), &Value::Float(0.0));
        assert_eq!(field(&state, second, WEAPON, "ammo"), &Value::Int(20));
    }

    #[test]
    fn a_second_shot_in_one_frame_is_reloading() {
        let mut sea = Sea::new();
        let shooter = sea.ship("red", 0.0, 0.0, vec![gun(0.0)]);
        let target = sea.ship("blue", 100.0, 0.0, vec![]);
        let outs = [fire(&sea, 1, shooter, target), fire(&sea, 2, shooter, target)];
        let (state, events) = resolve(&sea, &combat(), &outs);

        assert_eq!(types(&events), vec![WEAPON_FIRED, FIRE_REJECTED]);
        assert_eq!(reason(events.last().unwrap()), RELOADING);
        assert_eq!(field(&state, shooter, WEAPON, "ammo"), &Value::Int(19));
    }

    #[test]
    fn refusals_leave_the_magazine_alone() {
        let mut sea = Sea::new();
        let far = sea.ship("red", 0.0, 0.0, vec![]);
        let diving = sea.ship(
            "red",
            0.0,
            10.0,
            vec![(STATUS, Component::new().with("transitioning", Value::Bool(true)))],
        );
        let dry = sea.ship("red", 0.0, 20.0, vec![(WEAPON, Component::new().with("ammo", Value::Int(0)))]);
        let target = sea.ship("blue", 250.0, 200.0, vec![]);
        let near = sea.ship("blue", 50.0, 0.0, vec![]);
        let outs = [
            fire(&sea, 1, far, target),
            fire(&sea, 2, diving, near),
            fire(&sea, 3, dry, near),
        ];
        let (state, events) = resolve(&sea, &combat(), &outs);

        let reasons: Vec<&str> = events.iter().map(reason).collect();
        assert_eq!(reasons, vec![OUT_OF_RANGE, TRANSITIONING, OUT_OF_AMMO]);
        assert_eq!(field(&state, far, WEAPON, "ammo"), &Value::Int(20));
        assert_eq!(field(&state, diving, WEAPON, "ammo"), &Value::Int(20));
    }

    #[test]
    fn cooldowns_count_down_every_frame() {
        let mut sea = Sea::new();
        let ship = sea.ship("red", 0.0, 0.0, vec![(WEAPON, Component::new().with("cooldown", Value::Int(2)))]);
        let (state, events) = resolve(&sea, &combat(), &[]);
        assert!(events.is_empty());
        assert_eq!(field(&state, ship, WEAPON, "cooldown"), &Value::Int(1));
    }

    #[test]
    fn repairs_stop_at_max_hp() {
        let mut sea = Sea::new();
        let ship = sea.ship("red", 0.0, 0.0, vec![(HULL, Component::new().with("hp", Value::Float(98.0)))]);
        let args = Component::new().with("amount", Value::Float(5.0));
        let out = command(&sea, 1, ship, REPAIR, Some(ship), args);
        let (state, events) = resolve(&sea, &combat(), &[out]);

        assert_eq!(types(&events), vec![REPAIRED]);
        assert_eq!(events.first().unwrap().data.get("amount"), Some(&Value::Float(2.0)));
        assert_eq!(field(&state, ship, HULL, "hp"), &Value::Float(100.0));
    }
}
