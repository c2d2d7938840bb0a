//! Damage control: patches the hull while no target is locked.

use lockstep_core::plugin::{Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
use lockstep_types::{Component, Payload, Proposal, Value};

use super::{afloat, flag, required};
use crate::names::{HULL, MAINTENANCE_PHASE, REPAIR, SENSOR, SHIP};

/// Hit points requested per maintenance window.
pub const REPAIR_AMOUNT: f64 = 5.0;

/// Proposes a repair on each `maintenance` phase.
pub struct DamageControlPlugin {
    declaration: PluginDeclaration,
}

impl DamageControlPlugin {
    /// Plugin with its static declaration.
    pub fn new() -> Self {
        Self {
            declaration: PluginDeclaration::new("damage_control")
                .requires(SHIP)
                .reads(HULL)
                .reads(SENSOR)
                .emits(REPAIR)
                .in_phase(MAINTENANCE_PHASE),
        }
    }
}

impl Default for DamageControlPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DamageControlPlugin {
    fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError> {
        let me = ctx.entity();
        if !afloat(view, me) || flag(view, me, SENSOR, "locked") == Some(true) {
            return Ok(Vec::new());
        }
        if required(view, me, HULL, "hp")? >= required(view, me, HULL, "max_hp")? {
            return Ok(Vec::new());
        }
        Ok(vec![ctx.propose(
            REPAIR,
            Payload::Command {
                target: Some(me),
                args: Component::new().with("amount", Value::Float(REPAIR_AMOUNT)),
            },
        )])
    }
}
