//! The resolver capability interface.

use std::collections::BTreeSet;

use rand_chacha::ChaCha8Rng;

use lockstep_types::{ComponentType, ContractViolation, EventDraft, Output, OutputType, ResolverId};
use lockstep_world::{NextStateHandle, WorldError, WorldView};

/// Static metadata of a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverDeclaration {
    /// Resolver identifier; breaks priority ties.
    pub id: ResolverId,
    /// Lower runs first.
    pub priority: i32,
    /// Output types routed to this resolver.
    pub handles: BTreeSet<OutputType>,
    /// Component types this resolver alone may write.
    pub owns: BTreeSet<ComponentType>,
}

impl ResolverDeclaration {
    /// Declaration with no routes and no owned components.
    pub fn new(id: impl Into<ResolverId>, priority: i32) -> Self {
        Self {
            id: id.into(),
            priority,
            handles: BTreeSet::new(),
            owns: BTreeSet::new(),
        }
    }

    /// Route an output type here.
    #[must_use]
    pub fn handles(mut self, otype: impl Into<OutputType>) -> Self {
        self.handles.insert(otype.into());
        self
    }

    /// Claim write ownership of a component type.
    #[must_use]
    pub fn owns(mut self, ctype: impl Into<ComponentType>) -> Self {
        self.owns.insert(ctype.into());
        self
    }
}

/// Failures inside a resolver. A contract violation aborts the frame as
/// such; anything else is a structural failure of the Resolving phase.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The resolver or its inputs broke a contract.
    #[error("{0}")]
    Contract(#[from] ContractViolation),

    /// A state store operation failed.
    #[error("state store error: {source}")]
    World {
        /// The underlying error.
        source: WorldError,
    },

    /// Any other failure.
    #[error("{reason}")]
    Failed {
        /// Human-readable explanation.
        reason: String,
    },
}

impl From<WorldError> for ResolveError {
    fn from(source: WorldError) -> Self {
        match source {
            WorldError::Contract { source } => Self::Contract(source),
            other => Self::World { source: other },
        }
    }
}

/// A serial, priority-ordered adjudicator that turns routed outputs into
/// Next State writes and events.
pub trait Resolver: Send + Sync {
    /// Static metadata.
    fn declaration(&self) -> &ResolverDeclaration;

    /// Resolve this frame's routed outputs.
    ///
    /// `outputs` are in resolution order and may be empty; resolvers with
    /// per-frame upkeep run regardless. `view` is the frame's Current
    /// State, `next` sees only this resolver's own writes on top of it,
    /// and `rng` is scoped to this resolver and frame.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole frame without committing anything.
    fn resolve(
        &self,
        outputs: &[&Output],
        view: &WorldView,
        next: &mut NextStateHandle<'_>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<EventDraft>, ResolveError>;
}
