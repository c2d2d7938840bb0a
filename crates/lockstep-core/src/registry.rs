//! Explicit plugin registry: plugin id -> implementation.
//!
//! Declarations are checked against the schema registry and the phase
//! schedule once, at registration. The registry then serves as the
//! [`AttachRules`] for entity attachment.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use lockstep_types::{PluginId, Tag};
use lockstep_world::{AttachRules, SchemaRegistry};

use crate::clock::FrameClock;
use crate::plugin::{Plugin, PluginDeclaration};

/// Errors raised while registering a plugin.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A plugin with this id is already registered.
    #[error("plugin {0} registered twice")]
    Duplicate(PluginId),

    /// The declaration references something the schema or schedule does
    /// not know.
    #[error("plugin {plugin} declares unknown {kind} {name}")]
    Unknown {
        /// Offending plugin.
        plugin: PluginId,
        /// What kind of name it is (component, output type, ...).
        kind: &'static str,
        /// The unknown name.
        name: String,
    },

    /// The plugin belongs to no phase and would never run.
    #[error("plugin {0} declares no phase")]
    NoPhase(PluginId),
}

/// All registered plugins, keyed and iterated by id.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: BTreeMap<PluginId, Arc<dyn Plugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.plugins.keys()).finish()
    }
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and add a plugin.
    ///
    /// # Errors
    ///
    /// See [`RegistryError`].
    pub fn register(
        &mut self,
        plugin: Arc<dyn Plugin>,
        schema: &SchemaRegistry,
        clock: &FrameClock,
    ) -> Result<(), RegistryError> {
        let declaration = plugin.declaration();
        if self.plugins.contains_key(&declaration.id) {
            return Err(RegistryError::Duplicate(declaration.id.clone()));
        }
        check_declaration(declaration, schema, clock)?;
        self.plugins.insert(declaration.id.clone(), plugin);
        Ok(())
    }

    /// Implementation for `id`.
    pub fn get(&self, id: &PluginId) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(id)
    }

    /// Declaration for `id`.
    pub fn declaration(&self, id: &PluginId) -> Option<&PluginDeclaration> {
        self.plugins.get(id).map(|p| p.declaration())
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &PluginId> {
        self.plugins.keys()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl AttachRules for PluginRegistry {
    fn required_tags(&self, plugin: &PluginId) -> Option<&BTreeSet<Tag>> {
        self.declaration(plugin).map(|d| &d.required_tags)
    }
}

fn check_declaration(
    declaration: &PluginDeclaration,
    schema: &SchemaRegistry,
    clock: &FrameClock,
) -> Result<(), RegistryError> {
    let unknown = |kind: &'static str, name: &dyn fmt::Display| RegistryError::Unknown {
        plugin: declaration.id.clone(),
        kind,
        name: name.to_string(),
    };
    if let Some(ctype) = declaration
        .reads
        .iter()
        .find(|c| schema.component(c).is_none())
    {
        return Err(unknown("component", ctype));
    }
    if let Some(otype) = declaration.emits.iter().find(|o| schema.output(o).is_none()) {
        return Err(unknown("output type", otype));
    }
    if let Some(etype) = declaration.observes.iter().find(|e| !schema.has_event(e)) {
        return Err(unknown("event type", etype));
    }
    if declaration.phases.is_empty() {
        return Err(RegistryError::NoPhase(declaration.id.clone()));
    }
    if let Some(phase) = declaration.phases.iter().find(|p| !clock.knows(p)) {
        return Err(unknown("phase", phase));
    }
    Ok(())
}
