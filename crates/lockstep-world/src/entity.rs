//! Entities: identity, immutable tags, components and plugin attachments.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use lockstep_types::{Component, ComponentType, ContractViolation, EntityId, PluginId, Tag};

use crate::error::{SchemaError, WorldError};
use crate::schema::SchemaRegistry;

/// Lookup of plugin attachment requirements.
///
/// Implemented by the plugin registry; the world crate only needs to know
/// which tags a plugin requires to reject attachments.
pub trait AttachRules: Send + Sync {
    /// Required tags of `plugin`, or `None` if the plugin is unknown.
    fn required_tags(&self, plugin: &PluginId) -> Option<&BTreeSet<Tag>>;
}

/// A simulation entity.
///
/// Tags are fixed at creation: there is no API to change them. The plugin
/// list is kept sorted by plugin id no matter the attachment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    tags: BTreeSet<Tag>,
    #[serde(default)]
    owner: Option<EntityId>,
    #[serde(default)]
    parent: Option<EntityId>,
    #[serde(default)]
    components: BTreeMap<ComponentType, Component>,
    #[serde(default)]
    plugins: Vec<PluginId>,
    #[serde(default)]
    children: Vec<EntityId>,
}

impl Entity {
    /// Create an entity with no components, plugins or relations.
    pub const fn new(id: EntityId, tags: BTreeSet<Tag>) -> Self {
        Self {
            id,
            tags,
            owner: None,
            parent: None,
            components: BTreeMap::new(),
            plugins: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Identity.
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Classification tags.
    pub const fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    /// Whether the entity carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&Tag::from(tag))
    }

    /// Weak owner reference.
    pub const fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    /// Parent in the entity hierarchy.
    pub const fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Children, in attachment order.
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Attached plugins, sorted by id.
    pub fn plugins(&self) -> &[PluginId] {
        &self.plugins
    }

    /// Component lookup.
    pub fn component(&self, ctype: &ComponentType) -> Option<&Component> {
        self.components.get(ctype)
    }

    /// All components in type order.
    pub const fn components(&self) -> &BTreeMap<ComponentType, Component> {
        &self.components
    }

    /// Set the weak owner reference.
    pub const fn set_owner(&mut self, owner: Option<EntityId>) {
        self.owner = owner;
    }

    /// Insert or replace a component without validation.
    ///
    /// Used by the write overlay after it has validated the value.
    pub(crate) fn put_component(&mut self, ctype: ComponentType, component: Component) {
        self.components.insert(ctype, component);
    }

    /// Insert a component after validating it against the schema.
    ///
    /// # Errors
    ///
    /// Returns the [`SchemaError`] from validation.
    pub fn insert_component(
        &mut self,
        schema: &SchemaRegistry,
        ctype: ComponentType,
        component: &Component,
    ) -> Result<(), SchemaError> {
        let normalized = schema.validate_component(&ctype, component)?;
        self.components.insert(ctype, normalized);
        Ok(())
    }

    /// Attach a plugin if the entity carries every tag it requires.
    ///
    /// Attaching an already attached plugin is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownPlugin`] for unregistered plugins and a
    /// [`ContractViolation::AttachRejected`] listing the missing tags.
    pub fn attach_plugin(&mut self, plugin: PluginId, rules: &dyn AttachRules) -> Result<(), WorldError> {
        let required = rules
            .required_tags(&plugin)
            .ok_or_else(|| WorldError::UnknownPlugin(plugin.clone()))?;
        let missing: Vec<Tag> = required.difference(&self.tags).cloned().collect();
        if !missing.is_empty() {
            return Err(ContractViolation::AttachRejected {
                plugin,
                entity: self.id,
                missing,
            }
            .into());
        }
        if let Err(pos) = self.plugins.binary_search(&plugin) {
            self.plugins.insert(pos, plugin);
        }
        Ok(())
    }

    pub(crate) const fn set_parent(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }

    pub(crate) fn push_child(&mut self, child: EntityId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: EntityId) {
        self.children.retain(|c| *c != child);
    }

    /// Re-establish invariants on an entity restored from storage.
    ///
    /// Sorts and de-duplicates the plugin list and validates every
    /// component (missing fields default, kind mismatches fail).
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found.
    pub fn normalize(&mut self, schema: &SchemaRegistry) -> Result<(), SchemaError> {
        self.plugins.sort();
        self.plugins.dedup();
        let mut normalized = BTreeMap::new();
        for (ctype, component) in &self.components {
            normalized.insert(ctype.clone(), schema.validate_component(ctype, component)?);
        }
        self.components = normalized;
        Ok(())
    }
}
