//! Kernel-generic resolvers for the payload shapes the kernel defines.

mod field;
mod lifecycle;
mod reservation;

pub use field::FieldResolver;
pub use lifecycle::LifecycleResolver;
pub use reservation::ReservationResolver;
