//! Frame driver, plugin scheduler, resolver pipeline and RNG streams.
//!
//! One frame turns the Current State into the next one:
//!
//! 1. **Snapshotting** ([`frame`]): freeze the Current State into a
//!    `WorldView` and derive the frame seed ([`rng`]).
//! 2. **Evaluating** ([`scheduler`]): run every active (entity, plugin)
//!    pair, in parallel when configured, and seal the proposals into the
//!    [`buffer::OutputBuffer`].
//! 3. **Resolving** ([`pipeline`]): run resolvers serially over the sorted
//!    buffer; [`conflict`] holds the rules they share and [`resolvers`]
//!    the generic ones.
//! 4. **Applying**: swap in the Next State, append to the causal log and
//!    advance the tick.
//!
//! [`runner`] drives frames in an async loop under [`operator`] control;
//! [`config`] loads the kernel settings.

pub mod buffer;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod frame;
pub mod operator;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod resolvers;
pub mod rng;
pub mod runner;
pub mod scheduler;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing;

pub use buffer::{OutputBuffer, PendingOutput};
pub use clock::{FrameClock, FramePhase};
pub use config::KernelConfig;
pub use frame::{DriverParts, FrameDriver, FrameError, FrameReport};
pub use operator::{OperatorState, RunEndReason};
pub use pipeline::ResolverPipeline;
pub use plugin::{EntityRef, Plugin, PluginContext, PluginDeclaration, PluginError, PluginView};
pub use registry::PluginRegistry;
pub use resolver::{ResolveError, Resolver, ResolverDeclaration};
pub use runner::{FrameCallback, FrameVerdict, RunSummary, run_frames};
pub use scheduler::{PluginFailure, PluginScheduler};
