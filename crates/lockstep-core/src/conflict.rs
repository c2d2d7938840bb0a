//! Conflict rules shared by every resolver.
//!
//! Two kinds of contention are settled here, both as pure functions over
//! outputs already in resolution order:
//!
//! 1. **Field writes**: overwrites apply in order (last write wins),
//!    additive deltas sum, multiplicative deltas multiply. Additive and
//!    multiplicative deltas on the same field in one frame are a contract
//!    violation, never a silently computed result.
//! 2. **Reservations**: claims on a provider's capacity are granted by
//!    descending priority, then earliest emission (tick, output id), then
//!    ascending claimant id. Grants are all-or-nothing.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use lockstep_types::{EntityId, FieldName, FieldOp, OutputKey, Value, ValueKind};

/// Why a field's writes could not be folded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FoldError {
    /// Additive and multiplicative deltas target the same field.
    #[error("additive and multiplicative deltas on the same field")]
    MixedDeltaKinds,

    /// A delta met a non-float value.
    #[error("delta applied to a {found} value")]
    NotNumeric {
        /// Kind of the value the delta met.
        found: ValueKind,
    },

    /// The folded value is NaN or an infinity.
    #[error("deltas folded to the non-finite value {0}")]
    NonFinite(f64),
}

/// Fold `ops`, in resolution order, onto `base`.
///
/// # Errors
///
/// [`FoldError::MixedDeltaKinds`] when both delta kinds are present, even
/// if an overwrite separates them; [`FoldError::NotNumeric`] when a delta
/// meets a non-float value; [`FoldError::NonFinite`] when the result
/// overflows or is NaN.
pub fn fold_field_ops(base: &Value, ops: &[&FieldOp]) -> Result<Value, FoldError> {
    let additive = ops.iter().any(|op| matches!(op, FieldOp::Add(_)));
    let multiplicative = ops.iter().any(|op| matches!(op, FieldOp::Mul(_)));
    if additive && multiplicative {
        return Err(FoldError::MixedDeltaKinds);
    }
    let mut value = base.clone();
    for op in ops {
        value = match op {
            FieldOp::Set(v) => v.clone(),
            FieldOp::Add(delta) => Value::Float(numeric(&value)? + delta),
            FieldOp::Mul(factor) => Value::Float(numeric(&value)? * factor),
        };
    }
    match value {
        Value::Float(v) if !v.is_finite() => Err(FoldError::NonFinite(v)),
        _ => Ok(value),
    }
}

fn numeric(value: &Value) -> Result<f64, FoldError> {
    value.as_float().ok_or(FoldError::NotNumeric { found: value.kind() })
}

/// One claim on a provider's capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationClaim {
    /// Output that carried the claim.
    pub output: OutputKey,
    /// Entity whose plugin emitted the claim.
    pub claimant: EntityId,
    /// Entity holding the capacity.
    pub provider: EntityId,
    /// Capacity field.
    pub resource: FieldName,
    /// Requested amount.
    pub amount: f64,
    /// Higher is served first.
    pub priority: i32,
}

/// Decision for one claim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Grant {
    /// The full amount was granted.
    Granted,
    /// Nothing was granted.
    Denied {
        /// Capacity left when the claim was considered.
        available: f64,
    },
}

/// Decisions in grant order plus what is left of each pool.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantPlan<'a> {
    /// Every claim with its decision, in the order they were considered.
    pub decisions: Vec<(&'a ReservationClaim, Grant)>,
    /// Remaining capacity per (provider, resource).
    pub remaining: BTreeMap<(EntityId, FieldName), f64>,
}

/// Settle `claims` against `capacity`.
///
/// A pool missing from `capacity` has zero capacity.
pub fn grant_reservations(
    mut capacity: BTreeMap<(EntityId, FieldName), f64>,
    claims: &[ReservationClaim],
) -> GrantPlan<'_> {
    let mut ordered: Vec<&ReservationClaim> = claims.iter().collect();
    ordered.sort_by_key(|c| (Reverse(c.priority), c.output.tick, c.output.id, c.claimant));

    let mut decisions = Vec::with_capacity(ordered.len());
    for claim in ordered {
        let pool = capacity
            .entry((claim.provider, claim.resource.clone()))
            .or_insert(0.0);
        if claim.amount <= *pool {
            *pool -= claim.amount;
            decisions.push((claim, Grant::Granted));
        } else {
            decisions.push((claim, Grant::Denied { available: *pool }));
        }
    }
    GrantPlan {
        decisions,
        remaining: capacity,
    }
}
