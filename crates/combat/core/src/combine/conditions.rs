//! Stock [`CombineCondition`](super::CombineCondition)s used by requests.

use crate::ability::Ability;
use crate::clock::Timestamp;
use crate::combine::VisitResult;

/// Accepts abilities whose duration is still running.
pub fn is_running(ability: &Ability, now: Timestamp) -> VisitResult {
    if !ability.is_duration_expired(now) {
        VisitResult::Accept
    } else {
        VisitResult::Reject
    }
}

/// Accepts abilities whose timer gates would pass a cast right now.
pub fn is_reusable(ability: &Ability, now: Timestamp) -> VisitResult {
    if ability.is_reusable(now) {
        VisitResult::Accept
    } else {
        VisitResult::Reject
    }
}

/// A running member counts toward the quota without being offered again;
/// everything else must be reusable.
pub fn is_reusable_or_running(ability: &Ability, now: Timestamp) -> VisitResult {
    if !ability.is_duration_expired(now) {
        VisitResult::AcceptAndSkip
    } else if ability.is_reusable(now) {
        VisitResult::Accept
    } else {
        VisitResult::Reject
    }
}

/// A running member poisons the whole group; the rest must be reusable.
pub fn is_reusable_and_not_running(ability: &Ability, now: Timestamp) -> VisitResult {
    if !ability.is_duration_expired(now) {
        VisitResult::RejectAll
    } else if ability.is_reusable(now) {
        VisitResult::Accept
    } else {
        VisitResult::Reject
    }
}
