//! Coolant: sheds weapon heat every frame.

use lockstep_core::plugin::{Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
use lockstep_types::{ComponentType, FieldOp, FieldWrite, Payload, Proposal};

use super::required;
use crate::names::{ADJUST_HEAT, DEFAULT_PHASE, SHIP, THERMAL};

/// Proposes a negative heat delta of at most the ship's dissipation.
///
/// Heat deltas from fire control and coolant are both additive, so they
/// fold into one write.
pub struct CoolantPlugin {
    declaration: PluginDeclaration,
}

impl CoolantPlugin {
    /// Plugin with its static declaration.
    pub fn new() -> Self {
        Self {
            declaration: PluginDeclaration::new("coolant")
                .requires(SHIP)
                .reads(THERMAL)
                .emits(ADJUST_HEAT)
                .in_phase(DEFAULT_PHASE),
        }
    }
}

impl Default for CoolantPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for CoolantPlugin {
    fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError> {
        let me = ctx.entity();
        let heat = required(view, me, THERMAL, "heat")?;
        let shed = required(view, me, THERMAL, "dissipation")?.min(heat);
        if shed <= 0.0 {
            return Ok(Vec::new());
        }
        Ok(vec![ctx.propose(
            ADJUST_HEAT,
            Payload::Field(FieldWrite {
                target: me,
                component: ComponentType::from(THERMAL),
                field: "heat".into(),
                op: FieldOp::Add(-shed),
            }),
        )])
    }
}
