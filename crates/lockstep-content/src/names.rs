//! Component, output, event, tag and phase names used by the naval content.
//!
//! These must agree with `schema/naval.yaml`; the schema is the authority
//! and registration fails loudly when a name drifts.

/// Position and heading.
pub const TRANSFORM: &str = "Transform";
/// Velocity and speed limit.
pub const MOTION: &str = "Motion";
/// Navigation orders.
pub const HELM: &str = "Helm";
/// Operating mode flags.
pub const STATUS: &str = "Status";
/// Team and display name.
pub const ALLEGIANCE: &str = "Allegiance";
/// Detection range and current track.
pub const SENSOR: &str = "Sensor";
/// Weapon heat.
pub const THERMAL: &str = "Thermal";
/// Communications capacity of a relay.
pub const RELAY: &str = "Relay";
/// Hit points.
pub const HULL: &str = "Hull";
/// Armament and ammunition.
pub const WEAPON: &str = "Weapon";

/// Command: set a velocity vector.
pub const SET_VELOCITY: &str = "SetVelocity";
/// Field write on the sensor track.
pub const SET_TRACK: &str = "SetTrack";
/// Field delta on weapon heat.
pub const ADJUST_HEAT: &str = "AdjustHeat";
/// Command: fire the weapon at a target.
pub const FIRE_WEAPON: &str = "FireWeapon";
/// Command: restore hit points.
pub const REPAIR: &str = "Repair";
/// Reservation of relay bandwidth.
pub const RESERVE_BANDWIDTH: &str = "ReserveBandwidth";
/// Removal of a wreck.
pub const SCUTTLE: &str = "Scuttle";

/// A shot was taken.
pub const WEAPON_FIRED: &str = "WeaponFired";
/// A fire command was refused.
pub const FIRE_REJECTED: &str = "FireRejected";
/// A hull lost hit points.
pub const DAMAGE_DEALT: &str = "DamageDealt";
/// A hull reached zero.
pub const ENTITY_DESTROYED: &str = "EntityDestroyed";
/// A hull regained hit points.
pub const REPAIRED: &str = "Repaired";

/// Combat vessels.
pub const SHIP: &str = "ship";
/// Static installations.
pub const PLATFORM: &str = "platform";
/// The fleet command platform that clears wrecks.
pub const COMMAND: &str = "command";
/// Communication relays.
pub const RELAY_TAG: &str = "relay";

/// Every frame.
pub const DEFAULT_PHASE: &str = "default";
/// Sensor sweeps.
pub const SENSORS_PHASE: &str = "sensors";
/// Repairs.
pub const MAINTENANCE_PHASE: &str = "maintenance";
/// Relay traffic.
pub const COMMS_PHASE: &str = "comms";
