//! Mutable timer state shared by every variant of one caster's ability.
//!
//! Variants made with [`Ability::with_target`](super::Ability::with_target)
//! alias the same [`SharedTimers`] slot through the [`SharedTimerRegistry`],
//! so a cast recorded on one variant gates reuse on all of them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ability::AbilityKey;
use crate::clock::Timestamp;

/// Timings frozen at the moment of a successful cast. Predicates evaluated
/// later read these instead of recomputing, so effects that expire mid-cast
/// cannot shift windows that already started.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectiveTimings {
    pub casting: f64,
    pub reuse: f64,
    pub recovery: f64,
    pub duration: f64,
}

/// Per-ability mutable timer state.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SharedTimers {
    pub last_cast_time: Option<Timestamp>,
    /// Previous cast time, kept so an unconfirmed cast can be revoked.
    pub previous_last_cast_time: Option<Timestamp>,
    pub last_confirm_time: Option<Timestamp>,
    /// When the running effect was last observed to expire.
    pub last_expired_time: Option<Timestamp>,
    /// Target of the most recent cast, any variant.
    pub last_target: Option<String>,
    pub frozen: Option<EffectiveTimings>,
}

impl SharedTimers {
    pub fn has_been_cast(&self) -> bool {
        self.last_cast_time.is_some()
    }

    /// Seconds the last instance actually ran, if both ends were observed.
    pub fn actual_duration(&self) -> Option<f64> {
        match (self.last_cast_time, self.last_expired_time) {
            (Some(cast), Some(expired)) if expired >= cast => Some(expired.since(cast)),
            _ => None,
        }
    }
}

/// Duration bookkeeping private to one targeted variant. Consulted when the
/// shared state was last written by a different variant.
#[derive(Debug, Clone, Default)]
pub struct VariantTimes {
    pub last_cast_for_target: Option<Timestamp>,
    pub expired_for_target: Option<Timestamp>,
}

/// Arena of [`SharedTimers`] slots keyed by [`AbilityKey`]. Ability handles
/// acquire their slot at build time; persistence exports and restores the
/// whole arena.
#[derive(Debug, Default)]
pub struct SharedTimerRegistry {
    slots: Mutex<HashMap<AbilityKey, Arc<Mutex<SharedTimers>>>>,
}

impl SharedTimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `key`, creating it on first use.
    pub fn acquire(&self, key: &AbilityKey) -> Arc<Mutex<SharedTimers>> {
        let mut slots = self.slots.lock().unwrap();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Snapshot of every slot, for persistence.
    pub fn export(&self) -> Vec<(AbilityKey, SharedTimers)> {
        let slots = self.slots.lock().unwrap();
        slots
            .iter()
            .map(|(key, slot)| (key.clone(), slot.lock().unwrap().clone()))
            .collect()
    }

    /// Overwrites (or creates) the slot for `key` with persisted state.
    pub fn restore(&self, key: AbilityKey, timers: SharedTimers) {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entry(key).or_default();
        *slot.lock().unwrap() = timers;
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caster::CasterId;

    fn key(name: &str) -> AbilityKey {
        AbilityKey::new(CasterId(1), name.into())
    }

    #[test]
    fn acquire_aliases_one_slot_per_key() {
        let registry = SharedTimerRegistry::new();
        let a = registry.acquire(&key("ward"));
        let b = registry.acquire(&key("ward"));
        assert!(Arc::ptr_eq(&a, &b));
        let c = registry.acquire(&key("smite"));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn restore_replaces_slot_contents_in_place() {
        let registry = SharedTimerRegistry::new();
        let slot = registry.acquire(&key("ward"));
        registry.restore(
            key("ward"),
            SharedTimers {
                last_cast_time: Some(Timestamp(42.0)),
                ..SharedTimers::default()
            },
        );
        assert_eq!(slot.lock().unwrap().last_cast_time, Some(Timestamp(42.0)));
    }

    #[test]
    fn actual_duration_requires_expiry_after_cast() {
        let mut timers = SharedTimers::default();
        assert_eq!(timers.actual_duration(), None);
        timers.last_cast_time = Some(Timestamp(10.0));
        timers.last_expired_time = Some(Timestamp(25.0));
        assert_eq!(timers.actual_duration(), Some(15.0));
        timers.last_expired_time = Some(Timestamp(5.0));
        assert_eq!(timers.actual_duration(), None);
    }
}
