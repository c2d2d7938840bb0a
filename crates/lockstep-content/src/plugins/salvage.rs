//! Salvage: clears wrecks one frame after they are destroyed.

use lockstep_core::plugin::{Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
use lockstep_types::{Payload, Proposal};

use crate::names::{COMMAND, DEFAULT_PHASE, ENTITY_DESTROYED, SCUTTLE};

/// Runs on the fleet command platform and reacts to `EntityDestroyed`.
///
/// Every proposal continues the destroyed event's causal chain.
pub struct SalvagePlugin {
    declaration: PluginDeclaration,
}

impl SalvagePlugin {
    /// Plugin with its static declaration.
    pub fn new() -> Self {
        Self {
            declaration: PluginDeclaration::new("salvage")
                .requires(COMMAND)
                .observes(ENTITY_DESTROYED)
                .emits(SCUTTLE)
                .in_phase(DEFAULT_PHASE),
        }
    }
}

impl Default for SalvagePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for SalvagePlugin {
    fn declaration(&self) -> &PluginDeclaration {
        &self.declaration
    }

    fn tick(&self, view: &PluginView<'_>, ctx: &PluginContext) -> Result<Vec<Proposal>, PluginError> {
        Ok(view
            .events()
            .map(|event| {
                ctx.propose_caused_by(
                    event,
                    SCUTTLE,
                    Payload::Despawn {
                        target: event.subject,
                    },
                )
            })
            .collect())
    }
}
