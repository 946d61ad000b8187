//! The seam between the decision engine and whatever executes casts.

use crate::ability::Ability;
use crate::clock::Timestamp;
use crate::error::DispatchError;

/// Outcome of an attempted cast. Guard rejections are ordinary outcomes,
/// not errors; the scheduler logs them and moves on to the next candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    /// The cast was dispatched and timers were frozen.
    Cast,
    /// Still inside the reuse window.
    NotReusable,
    /// The caster is busy and the ability cannot queue or interrupt.
    CasterBusy,
    /// Already being maintained on the same target.
    Maintained,
}

impl CastOutcome {
    pub fn was_cast(self) -> bool {
        matches!(self, CastOutcome::Cast)
    }
}

/// Delivers a cast command to the owning client.
///
/// On success, returns the delivery latency in seconds; the latency is folded
/// into the frozen casting time so follow-up predicates account for it.
pub trait CastDispatch: Send + Sync {
    fn dispatch(&self, ability: &Ability, now: Timestamp) -> Result<f64, DispatchError>;
}

/// Dispatch that always succeeds instantly. Used for bookkeeping-only
/// ability variants and in tests.
#[derive(Debug, Default)]
pub struct InstantDispatch;

impl CastDispatch for InstantDispatch {
    fn dispatch(&self, _ability: &Ability, _now: Timestamp) -> Result<f64, DispatchError> {
        Ok(0.0)
    }
}
