//! Naval resolvers.
//!
//! The generic field, reservation and lifecycle resolvers come from the
//! kernel; this module adds the two that know about ships.

pub mod combat;
pub mod motion;

pub use combat::CombatResolver;
pub use motion::MotionResolver;
