//! The per-ability timer state machine.
//!
//! An [`Ability`] is a cheap-to-clone handle over one caster's ability,
//! optionally pinned to a target. Retargeted variants share one
//! [`SharedTimers`] slot, so casting any variant gates reuse on all of them,
//! while duration expiry is tracked per variant.
//!
//! All effective timings are computed through the effect engine and then
//! padded with the safety margins from [`constants`](crate::constants). At
//! the moment of a successful cast the computed timings are frozen into the
//! shared slot; every later window predicate reads the frozen values, so an
//! effect expiring mid-cast cannot shift a window that already started.

mod data;
mod dispatch;
mod shared;

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

pub use data::{
    AbilityCensus, AbilityFlags, AbilityId, AbilityKey, AbilityProfile, AbilityTier, VariantKey,
};
pub use dispatch::{CastDispatch, CastOutcome, InstantDispatch};
pub use shared::{EffectiveTimings, SharedTimerRegistry, SharedTimers, VariantTimes};

use crate::caster::{Caster, CasterStatus};
use crate::clock::Timestamp;
use crate::constants::{
    ABILITY_CASTING_SAFETY, ABILITY_RECOVERY_SAFETY, ABILITY_REUSE_SAFETY,
    INTERRUPT_CASTING_THRESHOLD,
};
use crate::effect::{EffectBuilder, EffectKind, EffectTarget, EffectsManager};
use crate::error::DispatchError;

struct AbilityInner {
    key: AbilityKey,
    shared_key: AbilityKey,
    caster: Arc<Caster>,
    target: Option<String>,
    census: AbilityCensus,
    profile: AbilityProfile,
    shared: Arc<Mutex<SharedTimers>>,
    variant: Mutex<VariantTimes>,
    action: Arc<dyn CastDispatch>,
    effects: Arc<EffectsManager>,
    effect_template: Option<Arc<EffectBuilder>>,
}

/// Handle to one caster's ability, optionally pinned to a target.
#[derive(Clone)]
pub struct Ability {
    inner: Arc<AbilityInner>,
}

impl Ability {
    pub fn builder(caster: Arc<Caster>, id: impl Into<AbilityId>) -> AbilityBuilder {
        AbilityBuilder::new(caster, id.into())
    }

    pub fn id(&self) -> &AbilityId {
        &self.inner.key.ability
    }

    pub fn key(&self) -> &AbilityKey {
        &self.inner.key
    }

    /// Key of the timer slot; differs from [`key`](Self::key) for abilities
    /// that share reuse with their upgrade line.
    pub fn shared_key(&self) -> &AbilityKey {
        &self.inner.shared_key
    }

    pub fn variant_key(&self) -> VariantKey {
        VariantKey {
            caster: self.inner.key.caster,
            ability: self.inner.key.ability.clone(),
            target: self.inner.target.clone(),
        }
    }

    pub fn caster(&self) -> &Arc<Caster> {
        &self.inner.caster
    }

    pub fn target(&self) -> Option<&str> {
        self.inner.target.as_deref()
    }

    pub fn census(&self) -> &AbilityCensus {
        &self.inner.census
    }

    pub fn profile(&self) -> &AbilityProfile {
        &self.inner.profile
    }

    fn effect_target(&self) -> EffectTarget {
        EffectTarget::Ability(self.clone())
    }

    /// Effective priority after priority-scope effects.
    pub fn priority(&self) -> i64 {
        let base = self.inner.profile.priority + self.inner.profile.priority_adjust;
        self.inner
            .effects
            .modified_value(EffectKind::Priority, base as f64, &self.effect_target())
            .round() as i64
    }

    // ------------------------------------------------------------------
    // Effective timings.
    // ------------------------------------------------------------------

    /// Casting time after effects, plus per-ability overhead, the given
    /// extra dispatch latency, and the casting safety margin.
    fn effective_casting(&self, extra: f64) -> f64 {
        let target = self.effect_target();
        let mut casting = self.inner.effects.modified_value(
            EffectKind::BaseCasting,
            self.inner.census.casting,
            &target,
        );
        if !self.inner.profile.has(AbilityFlags::CANNOT_MODIFY) {
            let speed = self
                .inner
                .effects
                .modified_value(EffectKind::CastingSpeed, 0.0, &target);
            casting /= 1.0 + speed / 100.0;
        }
        casting + self.inner.profile.overhead + extra + ABILITY_CASTING_SAFETY
    }

    fn effective_reuse(&self) -> f64 {
        let target = self.effect_target();
        let mut reuse = self.inner.effects.modified_value(
            EffectKind::BaseReuse,
            self.inner.census.reuse,
            &target,
        );
        if !self.inner.profile.has(AbilityFlags::CANNOT_MODIFY) {
            let speed = self
                .inner
                .effects
                .modified_value(EffectKind::ReuseSpeed, 0.0, &target);
            reuse /= 1.0 + speed / 100.0;
        }
        reuse + ABILITY_REUSE_SAFETY
    }

    fn effective_recovery(&self) -> f64 {
        let mut recovery = self.inner.census.recovery;
        if !self.inner.profile.has(AbilityFlags::CANNOT_MODIFY) {
            let speed = self.inner.effects.modified_value(
                EffectKind::RecoverySpeed,
                0.0,
                &self.effect_target(),
            );
            recovery /= 1.0 + speed / 100.0;
        }
        recovery + ABILITY_RECOVERY_SAFETY
    }

    fn effective_duration(&self) -> f64 {
        self.inner.effects.modified_value(
            EffectKind::Duration,
            self.inner.census.duration,
            &self.effect_target(),
        )
    }

    fn frozen(&self) -> Option<EffectiveTimings> {
        self.inner.shared.lock().unwrap().frozen
    }

    /// Casting window in seconds, frozen at the last cast when available.
    pub fn casting_secs(&self) -> f64 {
        match self.frozen() {
            Some(t) => t.casting,
            None => self.effective_casting(0.0),
        }
    }

    pub fn reuse_secs(&self) -> f64 {
        match self.frozen() {
            Some(t) => t.reuse,
            None => self.effective_reuse(),
        }
    }

    pub fn recovery_secs(&self) -> f64 {
        match self.frozen() {
            Some(t) => t.recovery,
            None => self.effective_recovery(),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        match self.frozen() {
            Some(t) => t.duration,
            None => self.effective_duration(),
        }
    }

    /// Seconds from a cast until the ability can be cast again. Casting time
    /// always counts; maintained abilities also wait out the running
    /// duration, preferring the observed one over the computed one.
    pub fn reuse_secs_from_cast(&self) -> f64 {
        let mut total = self.reuse_secs() + self.casting_secs();
        if self.inner.profile.has(AbilityFlags::MAINTAINED) {
            let actual = self.inner.shared.lock().unwrap().actual_duration();
            let duration = actual.unwrap_or_else(|| self.duration_secs());
            if duration > 0.0 {
                total += duration;
            }
        }
        total
    }

    pub fn is_permanent(&self) -> bool {
        self.inner.census.is_permanent()
    }

    // ------------------------------------------------------------------
    // Window predicates.
    // ------------------------------------------------------------------

    fn last_cast_time(&self) -> Option<Timestamp> {
        self.inner.shared.lock().unwrap().last_cast_time
    }

    pub fn has_been_cast(&self) -> bool {
        self.last_cast_time().is_some()
    }

    pub fn is_casting(&self, now: Timestamp) -> bool {
        match self.last_cast_time() {
            Some(cast) => now <= cast + self.casting_secs(),
            None => false,
        }
    }

    pub fn is_recovering(&self, now: Timestamp) -> bool {
        match self.last_cast_time() {
            Some(cast) => {
                let casting_end = cast + self.casting_secs();
                now > casting_end && now <= casting_end + self.recovery_secs()
            }
            None => false,
        }
    }

    pub fn is_after_recovery(&self, now: Timestamp) -> bool {
        match self.last_cast_time() {
            Some(cast) => now > cast + self.casting_secs() + self.recovery_secs(),
            None => true,
        }
    }

    pub fn is_reuse_expired(&self, now: Timestamp) -> bool {
        match self.last_cast_time() {
            Some(cast) => now > cast + self.reuse_secs_from_cast(),
            None => true,
        }
    }

    /// Whether a cast attempt would pass the timer gates right now.
    pub fn is_reusable(&self, now: Timestamp) -> bool {
        if !self.has_been_cast() {
            return true;
        }
        if self.inner.profile.has(AbilityFlags::CAST_WHEN_REUSING) {
            self.is_after_recovery(now)
        } else {
            self.is_reuse_expired(now)
        }
    }

    /// Seconds until the reuse gate opens; zero when already reusable.
    pub fn remaining_reuse_wait(&self, now: Timestamp) -> f64 {
        match self.last_cast_time() {
            Some(cast) => (cast + self.reuse_secs_from_cast()).since(now).max(0.0),
            None => 0.0,
        }
    }

    /// Cast and expiry times relevant to this variant's target. Falls back
    /// to the per-variant record when the shared slot was last written by a
    /// variant aimed elsewhere.
    fn variant_times(&self) -> (Option<Timestamp>, Option<Timestamp>) {
        let shared = self.inner.shared.lock().unwrap();
        if shared.last_target == self.inner.target {
            (shared.last_cast_time, shared.last_expired_time)
        } else {
            drop(shared);
            let variant = self.inner.variant.lock().unwrap();
            (variant.last_cast_for_target, variant.expired_for_target)
        }
    }

    pub fn is_duration_expired(&self, now: Timestamp) -> bool {
        if !self.has_been_cast() {
            return true;
        }
        if self.is_permanent() {
            return false;
        }
        let (cast, expired) = self.variant_times();
        let Some(cast) = cast else {
            return true;
        };
        if let Some(expired) = expired {
            if expired >= cast {
                return true;
            }
        }
        now > cast + self.duration_secs()
    }

    /// Seconds of duration left on this variant's target; zero when expired.
    pub fn remaining_duration(&self, now: Timestamp) -> f64 {
        if self.is_duration_expired(now) {
            return 0.0;
        }
        match self.variant_times().0 {
            Some(cast) => (cast + self.duration_secs()).since(now).max(0.0),
            None => 0.0,
        }
    }

    pub fn is_in_duration_or_casting(&self, now: Timestamp) -> bool {
        self.is_casting(now) || !self.is_duration_expired(now)
    }

    /// A maintained ability that is still running on this variant's target.
    pub fn is_being_maintained(&self, now: Timestamp) -> bool {
        self.inner.profile.has(AbilityFlags::MAINTAINED) && !self.is_duration_expired(now)
    }

    /// Whether casting this ability may take over from `current`, the
    /// caster's in-flight ability.
    pub fn is_overriding(&self, current: Option<&Ability>, now: Timestamp) -> bool {
        let Some(current) = current else {
            return true;
        };
        if current.is_after_recovery(now) {
            return true;
        }
        let flags = self.inner.profile.flags;
        if flags.contains(AbilityFlags::CAST_WHEN_CASTING)
            && !flags.contains(AbilityFlags::CANCEL_SPELLCAST)
        {
            return true;
        }
        flags.contains(AbilityFlags::CANCEL_SPELLCAST) && self.priority() > current.priority()
    }

    /// Whether the caster's status and life state allow this ability at all.
    pub fn is_permitted_in_caster_state(&self) -> bool {
        let caster = &self.inner.caster;
        if caster.status() < CasterStatus::Zoned {
            return false;
        }
        if caster.is_alive() {
            self.inner.profile.has(AbilityFlags::CAST_WHEN_ALIVE)
        } else {
            self.inner.profile.has(AbilityFlags::CAST_WHEN_DEAD)
        }
    }

    // ------------------------------------------------------------------
    // Casting lifecycle.
    // ------------------------------------------------------------------

    /// Attempts the cast: runs the timer and busyness gates, dispatches the
    /// command, and on success freezes effective timings at `now`.
    pub fn cast(&self, now: Timestamp) -> Result<CastOutcome, DispatchError> {
        let flags = self.inner.profile.flags;
        if !self.is_reusable(now) {
            debug!(target: "combat::ability", ability = %self, "cast gated on reuse");
            return Ok(CastOutcome::NotReusable);
        }
        let busy = self.inner.caster.is_busy(now);
        if busy
            && !flags.contains(AbilityFlags::CAST_WHEN_CASTING)
            && !flags.contains(AbilityFlags::CANCEL_SPELLCAST)
        {
            debug!(target: "combat::ability", ability = %self, "cast gated on busy caster");
            return Ok(CastOutcome::CasterBusy);
        }
        if flags.contains(AbilityFlags::MAINTAINED) && !self.is_duration_expired(now) {
            let same_target = self.inner.shared.lock().unwrap().last_target == self.inner.target;
            if same_target {
                debug!(target: "combat::ability", ability = %self, "already maintained on target");
                return Ok(CastOutcome::Maintained);
            }
        }
        if busy && flags.contains(AbilityFlags::CANCEL_SPELLCAST) {
            if let Some(current) = self.inner.caster.last_cast_ability() {
                current.interrupted(now);
            }
        }

        let extra = self.inner.action.dispatch(self, now)?;
        let timings = EffectiveTimings {
            casting: self.effective_casting(extra),
            reuse: self.effective_reuse(),
            recovery: self.effective_recovery(),
            duration: self.effective_duration(),
        };
        {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.previous_last_cast_time = shared.last_cast_time;
            shared.last_cast_time = Some(now);
            shared.last_expired_time = None;
            shared.last_target = self.inner.target.clone();
            shared.frozen = Some(timings);
        }
        {
            let mut variant = self.inner.variant.lock().unwrap();
            variant.last_cast_for_target = Some(now);
            variant.expired_for_target = None;
        }
        if !busy
            || flags.contains(AbilityFlags::CANCEL_SPELLCAST)
            || !flags.contains(AbilityFlags::CAST_WHEN_CASTING)
        {
            self.inner.caster.set_last_cast_ability(Some(self.clone()));
        }
        if let Some(template) = &self.inner.effect_template {
            let starts_at = if timings.casting > 0.0 {
                now + timings.casting
            } else {
                now
            };
            self.inner
                .effects
                .schedule(template.instantiate(self, starts_at), now);
        }
        debug!(target: "combat::ability", ability = %self, %now, "cast");
        Ok(CastOutcome::Cast)
    }

    /// Accepts an authoritative casting-started observation at `when`.
    ///
    /// Observations are deduplicated: one is accepted when a full reuse
    /// window passed since the previous confirmation, or when it is the
    /// first confirmation after a fresh cast.
    pub fn confirm_casting_started(&self, when: Timestamp) -> bool {
        let reuse = self.reuse_secs();
        let mut shared = self.inner.shared.lock().unwrap();
        let Some(last_cast) = shared.last_cast_time else {
            return false;
        };
        let accepted = match shared.last_confirm_time {
            None => true,
            Some(confirm) => {
                when.since(confirm) >= reuse || (when > last_cast && last_cast > confirm)
            }
        };
        if accepted {
            shared.last_confirm_time = Some(when);
        }
        accepted
    }

    /// Accepts a casting-completed observation by back-dating it to the
    /// start of the casting window.
    pub fn confirm_casting_completed(&self, when: Timestamp) -> bool {
        let casting = self.casting_secs();
        self.confirm_casting_started(when - casting)
    }

    /// Rolls back the last recorded cast when no confirmation arrived within
    /// `max_confirm_delay` seconds. Returns whether a rollback happened.
    pub fn revoke_last_cast_if_not_confirmed(
        &self,
        max_confirm_delay: f64,
        now: Timestamp,
    ) -> bool {
        let mut shared = self.inner.shared.lock().unwrap();
        let Some(last_cast) = shared.last_cast_time else {
            return false;
        };
        if let Some(confirm) = shared.last_confirm_time {
            if confirm >= last_cast {
                return false;
            }
        }
        if now <= last_cast + max_confirm_delay {
            return false;
        }
        warn!(target: "combat::ability", ability = %self, "cast never confirmed, revoking");
        shared.last_cast_time = shared.previous_last_cast_time.take();
        true
    }

    /// Handles an observed interrupt. Only acts while still early in the
    /// casting window; reverts the recorded cast and drops the pending
    /// effect start.
    pub fn interrupted(&self, now: Timestamp) {
        let within_window = {
            let shared = self.inner.shared.lock().unwrap();
            match (shared.last_cast_time, shared.frozen) {
                (Some(cast), Some(t)) => now <= cast + INTERRUPT_CASTING_THRESHOLD * t.casting,
                _ => false,
            }
        };
        if !within_window {
            return;
        }
        debug!(target: "combat::ability", ability = %self, "cast interrupted, reverting");
        self.inner.effects.cancel_pending_from(&self.variant_key());
        let mut shared = self.inner.shared.lock().unwrap();
        shared.last_cast_time = shared.previous_last_cast_time.take();
    }

    /// Records an observed duration expiry for this variant's target.
    pub fn expire_duration(&self, when: Timestamp) {
        {
            let mut variant = self.inner.variant.lock().unwrap();
            variant.expired_for_target = Some(when);
        }
        let mut shared = self.inner.shared.lock().unwrap();
        if shared.last_target == self.inner.target {
            shared.last_expired_time = Some(when);
        }
    }

    // ------------------------------------------------------------------
    // Variants.
    // ------------------------------------------------------------------

    /// Variant of this ability pinned to `target`, sharing the same timer
    /// slot but tracking duration for its own target.
    pub fn with_target(&self, target: impl Into<String>) -> Ability {
        let target = Some(target.into());
        if self.inner.target == target {
            return self.clone();
        }
        self.make_variant(target, self.inner.profile.clone())
    }

    /// Variant with its base priority replaced.
    pub fn with_priority(&self, priority: i64) -> Ability {
        let mut profile = self.inner.profile.clone();
        profile.priority = priority;
        self.make_variant(self.inner.target.clone(), profile)
    }

    /// Variant with a priority adjustment applied on top of the base.
    pub fn with_priority_adjust(&self, adjust: i64) -> Ability {
        let mut profile = self.inner.profile.clone();
        profile.priority_adjust = adjust;
        self.make_variant(self.inner.target.clone(), profile)
    }

    fn make_variant(&self, target: Option<String>, profile: AbilityProfile) -> Ability {
        Ability {
            inner: Arc::new(AbilityInner {
                key: self.inner.key.clone(),
                shared_key: self.inner.shared_key.clone(),
                caster: Arc::clone(&self.inner.caster),
                target,
                census: self.inner.census.clone(),
                profile,
                shared: Arc::clone(&self.inner.shared),
                variant: Mutex::new(VariantTimes::default()),
                action: Arc::clone(&self.inner.action),
                effects: Arc::clone(&self.inner.effects),
                effect_template: self.inner.effect_template.clone(),
            }),
        }
    }
}

impl PartialEq for Ability {
    fn eq(&self, other: &Self) -> bool {
        self.variant_key() == other.variant_key()
    }
}

impl Eq for Ability {}

impl fmt::Debug for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ability")
            .field("key", &self.inner.key)
            .field("target", &self.inner.target)
            .finish()
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.variant_key())
    }
}

/// Builder for [`Ability`] handles.
pub struct AbilityBuilder {
    caster: Arc<Caster>,
    id: AbilityId,
    target: Option<String>,
    census: AbilityCensus,
    profile: AbilityProfile,
    action: Arc<dyn CastDispatch>,
    effects: Option<Arc<EffectsManager>>,
    registry: Option<Arc<SharedTimerRegistry>>,
    effect_template: Option<Arc<EffectBuilder>>,
}

impl AbilityBuilder {
    fn new(caster: Arc<Caster>, id: AbilityId) -> Self {
        Self {
            caster,
            id,
            target: None,
            census: AbilityCensus::default(),
            profile: AbilityProfile::default(),
            action: Arc::new(InstantDispatch),
            effects: None,
            registry: None,
            effect_template: None,
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn census(mut self, census: AbilityCensus) -> Self {
        self.census = census;
        self
    }

    pub fn profile(mut self, profile: AbilityProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn dispatch(mut self, action: Arc<dyn CastDispatch>) -> Self {
        self.action = action;
        self
    }

    pub fn effects(mut self, effects: Arc<EffectsManager>) -> Self {
        self.effects = Some(effects);
        self
    }

    pub fn registry(mut self, registry: Arc<SharedTimerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Effect granted by a successful cast, started once casting completes.
    pub fn effect_template(mut self, template: Arc<EffectBuilder>) -> Self {
        self.effect_template = Some(template);
        self
    }

    pub fn build(self) -> Ability {
        let key = AbilityKey::new(self.caster.id(), self.id);
        let shared_key = match &self.profile.shared_id {
            Some(id) => AbilityKey::new(self.caster.id(), id.clone()),
            None => key.clone(),
        };
        let shared = match &self.registry {
            Some(registry) => registry.acquire(&shared_key),
            None => Arc::default(),
        };
        Ability {
            inner: Arc::new(AbilityInner {
                key,
                shared_key,
                caster: self.caster,
                target: self.target,
                census: self.census,
                profile: self.profile,
                shared,
                variant: Mutex::new(VariantTimes::default()),
                action: self.action,
                effects: self
                    .effects
                    .unwrap_or_else(|| Arc::new(EffectsManager::new())),
                effect_template: self.effect_template,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caster::{CasterId, GroupId};

    fn caster() -> Arc<Caster> {
        Caster::new(CasterId(1), "aelin", GroupId::MAIN, 10)
    }

    fn census(casting: f64, reuse: f64, recovery: f64, duration: f64) -> AbilityCensus {
        AbilityCensus {
            casting,
            reuse,
            recovery,
            duration,
            ..AbilityCensus::default()
        }
    }

    fn ability(caster: &Arc<Caster>, id: &str, census_: AbilityCensus) -> Ability {
        Ability::builder(Arc::clone(caster), id)
            .census(census_)
            .build()
    }

    #[test]
    fn never_cast_ability_is_reusable_and_expired() {
        let a = ability(&caster(), "smite", census(2.0, 10.0, 0.5, -1.0));
        let now = Timestamp(100.0);
        assert!(a.is_reusable(now));
        assert!(a.is_duration_expired(now));
        assert!(a.is_after_recovery(now));
        assert!(!a.is_casting(now));
    }

    #[test]
    fn cast_freezes_timings_and_walks_the_windows() {
        let c = caster();
        let a = ability(&c, "smite", census(2.0, 10.0, 0.5, -1.0));
        let t0 = Timestamp(100.0);
        assert_eq!(a.cast(t0).unwrap(), CastOutcome::Cast);

        // casting = 2.0 + 0.14 safety, recovery = 0.5 + 0.22 safety
        assert!(a.is_casting(Timestamp(102.0)));
        assert!(!a.is_casting(Timestamp(102.2)));
        assert!(a.is_recovering(Timestamp(102.5)));
        assert!(a.is_after_recovery(Timestamp(102.9)));

        // reuse from cast = (10.0 + 0.2) + (2.0 + 0.14)
        assert!(!a.is_reusable(Timestamp(112.3)));
        assert!(a.is_reusable(Timestamp(112.4)));
        assert!(c.is_busy(Timestamp(102.5)));
        assert!(!c.is_busy(Timestamp(103.0)));
    }

    #[test]
    fn busy_caster_blocks_second_ability() {
        let c = caster();
        let a = ability(&c, "smite", census(2.0, 10.0, 0.5, -1.0));
        let b = ability(&c, "mend", census(1.0, 5.0, 0.5, -1.0));
        assert_eq!(a.cast(Timestamp(100.0)).unwrap(), CastOutcome::Cast);
        assert_eq!(b.cast(Timestamp(100.5)).unwrap(), CastOutcome::CasterBusy);
        assert_eq!(b.cast(Timestamp(103.0)).unwrap(), CastOutcome::Cast);
    }

    #[test]
    fn cast_when_casting_queues_without_stealing_busyness() {
        let c = caster();
        let a = ability(&c, "smite", census(2.0, 10.0, 0.5, -1.0));
        let mut profile = AbilityProfile::default();
        profile.flags |= AbilityFlags::CAST_WHEN_CASTING;
        let b = Ability::builder(Arc::clone(&c), "instant")
            .census(census(0.0, 5.0, 0.0, -1.0))
            .profile(profile)
            .build();
        a.cast(Timestamp(100.0)).unwrap();
        assert_eq!(b.cast(Timestamp(100.5)).unwrap(), CastOutcome::Cast);
        // busyness still tracks the original cast
        assert_eq!(
            c.last_cast_ability().map(|a| a.id().clone()),
            Some(AbilityId::from("smite"))
        );
    }

    #[test]
    fn maintained_rejects_recast_on_same_target_only() {
        let c = caster();
        let mut profile = AbilityProfile::default();
        profile.flags |= AbilityFlags::MAINTAINED | AbilityFlags::CAST_WHEN_REUSING;
        let base = Ability::builder(Arc::clone(&c), "ward")
            .census(census(1.0, 2.0, 0.2, 60.0))
            .profile(profile)
            .build();
        let on_a = base.with_target("tamsin");
        let on_b = base.with_target("rook");
        assert_eq!(on_a.cast(Timestamp(100.0)).unwrap(), CastOutcome::Cast);
        assert_eq!(on_a.cast(Timestamp(110.0)).unwrap(), CastOutcome::Maintained);
        assert_eq!(on_b.cast(Timestamp(110.0)).unwrap(), CastOutcome::Cast);
    }

    #[test]
    fn maintained_reuse_folds_in_observed_duration() {
        let c = caster();
        let mut profile = AbilityProfile::default();
        profile.flags |= AbilityFlags::MAINTAINED;
        let a = Ability::builder(Arc::clone(&c), "ward")
            .census(census(1.0, 2.0, 0.2, 60.0))
            .profile(profile)
            .build();
        a.cast(Timestamp(100.0)).unwrap();
        // computed duration dominates until an expiry is observed
        assert!(!a.is_reuse_expired(Timestamp(110.0)));
        a.expire_duration(Timestamp(105.0));
        // observed run of 5s: reuse = 2.2 + casting 1.14 + 5.0
        assert!(a.is_reuse_expired(Timestamp(108.4)));
    }

    #[test]
    fn duration_tracked_per_target_variant() {
        let c = caster();
        let base = ability(&c, "blessing", census(1.0, 2.0, 0.2, 30.0));
        let on_a = base.with_target("tamsin");
        let on_b = base.with_target("rook");
        on_a.cast(Timestamp(100.0)).unwrap();
        assert!(!on_a.is_duration_expired(Timestamp(120.0)));
        // never cast on rook
        assert!(on_b.is_duration_expired(Timestamp(120.0)));

        on_b.cast(Timestamp(130.0)).unwrap();
        // shared slot now points at rook; tamsin variant falls back to its
        // own record from t=100, expiring at t=130
        assert!(!on_a.is_duration_expired(Timestamp(125.0)));
        assert!(on_a.is_duration_expired(Timestamp(131.0)));
        assert!(!on_b.is_duration_expired(Timestamp(155.0)));
    }

    #[test]
    fn variants_share_reuse_timers() {
        let c = caster();
        let base = ability(&c, "bolt", census(1.0, 20.0, 0.2, -1.0));
        let on_a = base.with_target("gnoll");
        let on_b = base.with_target("kobold");
        on_a.cast(Timestamp(100.0)).unwrap();
        assert!(!on_b.is_reusable(Timestamp(110.0)));
    }

    #[test]
    fn confirm_dedup_accepts_first_then_gates_on_reuse() {
        let a = ability(&caster(), "smite", census(2.0, 10.0, 0.5, -1.0));
        a.cast(Timestamp(100.0)).unwrap();
        assert!(a.confirm_casting_started(Timestamp(100.3)));
        // replayed observation within the reuse window is dropped
        assert!(!a.confirm_casting_started(Timestamp(100.6)));
        // a fresh cast opens the gate again
        a.cast(Timestamp(113.0)).unwrap();
        assert!(a.confirm_casting_started(Timestamp(113.2)));
    }

    #[test]
    fn unconfirmed_cast_is_revoked_after_grace() {
        let a = ability(&caster(), "smite", census(2.0, 10.0, 0.5, -1.0));
        a.cast(Timestamp(100.0)).unwrap();
        assert!(!a.revoke_last_cast_if_not_confirmed(3.0, Timestamp(102.0)));
        assert!(a.revoke_last_cast_if_not_confirmed(3.0, Timestamp(103.5)));
        // rolled back to never-cast: reusable immediately
        assert!(a.is_reusable(Timestamp(103.5)));
        // nothing left to revoke
        assert!(!a.revoke_last_cast_if_not_confirmed(3.0, Timestamp(110.0)));
    }

    #[test]
    fn confirmed_cast_survives_revoke() {
        let a = ability(&caster(), "smite", census(2.0, 10.0, 0.5, -1.0));
        a.cast(Timestamp(100.0)).unwrap();
        a.confirm_casting_started(Timestamp(100.4));
        assert!(!a.revoke_last_cast_if_not_confirmed(3.0, Timestamp(110.0)));
        assert!(!a.is_reusable(Timestamp(105.0)));
    }

    #[test]
    fn early_interrupt_reverts_late_interrupt_sticks() {
        let a = ability(&caster(), "smite", census(2.0, 10.0, 0.5, -1.0));
        a.cast(Timestamp(100.0)).unwrap();
        // 80% of 2.14s casting = 1.712s; past that the cast stands
        a.interrupted(Timestamp(102.0));
        assert!(!a.is_reusable(Timestamp(103.0)));

        a.cast(Timestamp(120.0)).unwrap();
        a.interrupted(Timestamp(121.0));
        assert!(a.is_reusable(Timestamp(121.0)));
    }

    #[test]
    fn overriding_respects_cancel_and_priority() {
        let c = caster();
        let running = ability(&c, "longcast", census(5.0, 10.0, 0.5, -1.0));
        running.cast(Timestamp(100.0)).unwrap();
        let now = Timestamp(101.0);

        let plain = ability(&c, "plain", census(1.0, 1.0, 0.1, -1.0));
        assert!(!plain.is_overriding(Some(&running), now));

        let mut queued_profile = AbilityProfile::default();
        queued_profile.flags |= AbilityFlags::CAST_WHEN_CASTING;
        let queued = Ability::builder(Arc::clone(&c), "queued")
            .profile(queued_profile)
            .build();
        assert!(queued.is_overriding(Some(&running), now));

        let mut canceller_profile = AbilityProfile::default();
        canceller_profile.flags |= AbilityFlags::CANCEL_SPELLCAST;
        canceller_profile.priority = 100;
        let canceller = Ability::builder(Arc::clone(&c), "emergency")
            .profile(canceller_profile.clone())
            .build();
        assert!(canceller.is_overriding(Some(&running), now));

        canceller_profile.priority = -5;
        let weak = Ability::builder(Arc::clone(&c), "weak")
            .profile(canceller_profile)
            .build();
        assert!(!weak.is_overriding(Some(&running), now));

        // once recovery clears, anything overrides
        assert!(plain.is_overriding(Some(&running), Timestamp(106.0)));
    }

    #[test]
    fn shared_id_aliases_upgrade_line_timers() {
        let c = caster();
        let registry = Arc::new(SharedTimerRegistry::new());
        let mut profile = AbilityProfile::default();
        profile.shared_id = Some(AbilityId::from("heal-line"));
        let rank1 = Ability::builder(Arc::clone(&c), "heal-i")
            .census(census(1.0, 6.0, 0.2, -1.0))
            .profile(profile.clone())
            .registry(Arc::clone(&registry))
            .build();
        let rank2 = Ability::builder(Arc::clone(&c), "heal-ii")
            .census(census(1.0, 6.0, 0.2, -1.0))
            .profile(profile)
            .registry(Arc::clone(&registry))
            .build();
        rank1.cast(Timestamp(100.0)).unwrap();
        assert!(!rank2.is_reusable(Timestamp(103.0)));
        assert_eq!(registry.len(), 1);
    }
}
