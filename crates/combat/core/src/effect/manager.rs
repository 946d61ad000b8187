//! Registry of pending and active effects, and the value cascade.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::ability::{AbilityFlags, VariantKey};
use crate::caster::CasterId;
use crate::clock::Timestamp;
use crate::effect::{Effect, EffectKind, EffectScope, EffectTarget};

struct ActiveEffect {
    effect: Arc<Effect>,
    expires_at: Option<Timestamp>,
}

#[derive(Default)]
struct ManagerState {
    active: Vec<ActiveEffect>,
    pending: Vec<Effect>,
}

/// Effects that started or expired during one [`EffectsManager::sweep`].
#[derive(Default)]
pub struct EffectSweep {
    pub started: Vec<Arc<Effect>>,
    pub expired: Vec<Arc<Effect>>,
}

/// Owns every live and scheduled [`Effect`] and computes modified timing
/// values through the scope cascade.
#[derive(Default)]
pub struct EffectsManager {
    state: Mutex<ManagerState>,
}

impl EffectsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates `effect` now, replacing any live effect with the same key.
    pub fn add_effect(&self, effect: Effect, now: Timestamp) -> Arc<Effect> {
        let mut state = self.state.lock().unwrap();
        Self::activate(&mut state, effect.with_start(now), now)
    }

    /// Queues `effect` to start at its own `starts_at`; effects already due
    /// are activated immediately.
    pub fn schedule(&self, effect: Effect, now: Timestamp) {
        let mut state = self.state.lock().unwrap();
        if effect.starts_at() <= now {
            Self::activate(&mut state, effect, now);
        } else {
            debug!(target: "combat::effect", effect = %effect, starts_at = %effect.starts_at(), "effect scheduled");
            state.pending.push(effect);
        }
    }

    fn activate(state: &mut ManagerState, effect: Effect, now: Timestamp) -> Arc<Effect> {
        let key = effect.key();
        state.active.retain(|a| a.effect.key() != key);
        let expires_at = (effect.duration() > 0.0).then(|| now + effect.duration());
        let effect = Arc::new(effect);
        debug!(target: "combat::effect", effect = %effect, "effect started");
        state.active.push(ActiveEffect {
            effect: Arc::clone(&effect),
            expires_at,
        });
        effect
    }

    /// Advances effect lifecycles to `now`: expires elapsed effects and
    /// starts pending ones that are due. Called once per scheduler tick.
    pub fn sweep(&self, now: Timestamp) -> EffectSweep {
        let mut sweep = EffectSweep::default();
        let mut state = self.state.lock().unwrap();

        let mut kept = Vec::with_capacity(state.active.len());
        for active in state.active.drain(..) {
            match active.expires_at {
                Some(expires) if expires <= now => {
                    debug!(target: "combat::effect", effect = %active.effect, "effect expired");
                    sweep.expired.push(active.effect);
                }
                _ => kept.push(active),
            }
        }
        state.active = kept;

        let due: Vec<Effect> = {
            let (due, waiting): (Vec<_>, Vec<_>) = state
                .pending
                .drain(..)
                .partition(|e| e.starts_at() <= now);
            state.pending = waiting;
            due
        };
        for effect in due {
            let started_at = effect.starts_at();
            let key = effect.key();
            state.active.retain(|a| a.effect.key() != key);
            let expires_at = (effect.duration() > 0.0).then(|| started_at + effect.duration());
            let effect = Arc::new(effect);
            debug!(target: "combat::effect", effect = %effect, "effect started");
            state.active.push(ActiveEffect {
                effect: Arc::clone(&effect),
                expires_at,
            });
            sweep.started.push(effect);
        }
        sweep
    }

    /// Drops scheduled-but-not-started effects granted by `source`. Returns
    /// whether anything was dropped; used when a cast is interrupted.
    pub fn cancel_pending_from(&self, source: &VariantKey) -> bool {
        let mut state = self.state.lock().unwrap();
        let before = state.pending.len();
        state
            .pending
            .retain(|e| e.source_variant() != Some(source));
        before != state.pending.len()
    }

    /// Cancels live and scheduled effects matching `predicate`. Returns how
    /// many were cancelled.
    pub fn cancel_effects(&self, predicate: impl Fn(&Effect) -> bool) -> usize {
        let mut state = self.state.lock().unwrap();
        let before = state.active.len() + state.pending.len();
        state.active.retain(|a| {
            let drop = predicate(&a.effect);
            if drop {
                debug!(target: "combat::effect", effect = %a.effect, "effect cancelled");
            }
            !drop
        });
        state.pending.retain(|e| !predicate(e));
        before - (state.active.len() + state.pending.len())
    }

    /// A dead caster stops sustaining its raid- and group-wide effects.
    pub fn on_caster_death(&self, caster: CasterId) -> usize {
        self.cancel_effects(|e| {
            e.sourced_by_caster(caster)
                && matches!(e.scope(), EffectScope::Raid | EffectScope::Group)
        })
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().unwrap().active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Computes the effective value of `kind` for `target`.
    ///
    /// Applicable effects cascade widest scope first: raid, group, player,
    /// then ability. The first `Set` modifier wins outright. Abilities
    /// flagged `CANNOT_MODIFY` only see ability-scope effects. A negative
    /// base is returned untouched; a value the ability does not have cannot
    /// be granted by modifiers.
    pub fn modified_value(&self, kind: EffectKind, base: f64, target: &EffectTarget) -> f64 {
        if base < 0.0 && kind == EffectKind::Duration {
            return base;
        }
        let cannot_modify = target
            .ability()
            .is_some_and(|a| a.profile().has(AbilityFlags::CANNOT_MODIFY));
        let tiers: &[fn(&EffectScope) -> bool] = if matches!(target, EffectTarget::Npc(_)) {
            &[|s| matches!(s, EffectScope::NonPlayer(_))]
        } else if cannot_modify {
            &[|s| matches!(s, EffectScope::Ability(_))]
        } else {
            &[
                |s| matches!(s, EffectScope::Raid),
                |s| matches!(s, EffectScope::Group),
                |s| matches!(s, EffectScope::Player(_)),
                |s| matches!(s, EffectScope::Ability(_)),
            ]
        };

        let mut value = base;
        let state = self.state.lock().unwrap();
        'cascade: for tier in tiers {
            for active in state.active.iter().filter(|a| tier(a.effect.scope())) {
                if !active.effect.applies_to(target) {
                    continue;
                }
                for step in active.effect.mods_for(kind) {
                    let (next, done) = step.apply(value, base);
                    value = next;
                    if done {
                        break 'cascade;
                    }
                }
            }
        }
        drop(state);
        Self::clamp(kind, base, value)
    }

    fn clamp(kind: EffectKind, base: f64, value: f64) -> f64 {
        match kind {
            EffectKind::Duration => {
                if base > 0.0 {
                    value.min(2.0 * base)
                } else {
                    value
                }
            }
            EffectKind::CastingSpeed | EffectKind::ReuseSpeed | EffectKind::RecoverySpeed => {
                value.clamp(-50.0, 100.0)
            }
            EffectKind::BaseCasting | EffectKind::BaseReuse => value.max(0.0),
            EffectKind::Priority => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::{Ability, AbilityCensus};
    use crate::caster::{Caster, GroupId};
    use crate::effect::EffectMod;
    use crate::effect::EffectSource;

    fn caster(id: u32, group: GroupId) -> std::sync::Arc<Caster> {
        Caster::new(CasterId(id), format!("caster{id}"), group, 0)
    }

    fn effect(name: &str, scope: EffectScope, source: &std::sync::Arc<Caster>) -> Effect {
        Effect::new(
            name,
            scope,
            vec![(EffectKind::CastingSpeed, EffectMod::Add(20.0))],
            -1.0,
            EffectSource::Caster(std::sync::Arc::clone(source)),
        )
    }

    fn ability_for(caster: &std::sync::Arc<Caster>, effects: &std::sync::Arc<EffectsManager>) -> Ability {
        Ability::builder(std::sync::Arc::clone(caster), "bolt")
            .census(AbilityCensus {
                casting: 3.0,
                reuse: 10.0,
                duration: 30.0,
                ..AbilityCensus::default()
            })
            .effects(std::sync::Arc::clone(effects))
            .build()
    }

    #[test]
    fn scopes_cascade_widest_first() {
        let effects = std::sync::Arc::new(EffectsManager::new());
        let src = caster(1, GroupId::MAIN);
        let tgt = caster(2, GroupId::MAIN);
        let ability = ability_for(&tgt, &effects);
        let target = EffectTarget::Ability(ability);
        let now = Timestamp(0.0);

        effects.add_effect(effect("raidwide", EffectScope::Raid, &src), now);
        effects.add_effect(effect("groupwide", EffectScope::Group, &src), now);
        effects.add_effect(
            effect("personal", EffectScope::Player(CasterId(2)), &src),
            now,
        );
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &target),
            60.0
        );
        // other players are outside the player scope
        let other = ability_for(&caster(3, GroupId::MAIN), &effects);
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &EffectTarget::Ability(other)),
            40.0
        );
    }

    #[test]
    fn set_modifier_is_final() {
        let effects = EffectsManager::new();
        let src = caster(1, GroupId::MAIN);
        let tgt = caster(2, GroupId::MAIN);
        let effects = std::sync::Arc::new(effects);
        let target = EffectTarget::Ability(ability_for(&tgt, &effects));
        let now = Timestamp(0.0);

        effects.add_effect(
            Effect::new(
                "lockdown",
                EffectScope::Raid,
                vec![(EffectKind::CastingSpeed, EffectMod::Set(25.0))],
                -1.0,
                EffectSource::Caster(std::sync::Arc::clone(&src)),
            ),
            now,
        );
        effects.add_effect(effect("groupwide", EffectScope::Group, &src), now);
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &target),
            25.0
        );
    }

    #[test]
    fn speed_values_clamp_and_duration_caps_at_double() {
        let effects = std::sync::Arc::new(EffectsManager::new());
        let src = caster(1, GroupId::MAIN);
        let target = EffectTarget::Ability(ability_for(&src, &effects));
        let now = Timestamp(0.0);

        effects.add_effect(
            Effect::new(
                "overcharged",
                EffectScope::Raid,
                vec![
                    (EffectKind::CastingSpeed, EffectMod::Add(500.0)),
                    (EffectKind::Duration, EffectMod::Multiply(4.0)),
                ],
                -1.0,
                EffectSource::Caster(std::sync::Arc::clone(&src)),
            ),
            now,
        );
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &target),
            100.0
        );
        assert_eq!(effects.modified_value(EffectKind::Duration, 30.0, &target), 60.0);
        // a negative base never gains a duration
        assert_eq!(effects.modified_value(EffectKind::Duration, -1.0, &target), -1.0);
    }

    #[test]
    fn group_scope_requires_same_group() {
        let effects = std::sync::Arc::new(EffectsManager::new());
        let src = caster(1, GroupId::FIRST);
        let mate = caster(2, GroupId::FIRST);
        let stranger = caster(3, GroupId::SECOND);
        let now = Timestamp(0.0);
        effects.add_effect(effect("groupwide", EffectScope::Group, &src), now);

        let mate_target = EffectTarget::Ability(ability_for(&mate, &effects));
        let stranger_target = EffectTarget::Ability(ability_for(&stranger, &effects));
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &mate_target),
            20.0
        );
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &stranger_target),
            0.0
        );
    }

    #[test]
    fn cannot_modify_sees_only_ability_scope() {
        use crate::ability::{AbilityFlags, AbilityProfile};

        let effects = std::sync::Arc::new(EffectsManager::new());
        let src = caster(1, GroupId::MAIN);
        let mut profile = AbilityProfile::default();
        profile.flags |= AbilityFlags::CANNOT_MODIFY;
        let ability = Ability::builder(std::sync::Arc::clone(&src), "fixed")
            .census(AbilityCensus {
                casting: 3.0,
                ..AbilityCensus::default()
            })
            .profile(profile)
            .effects(std::sync::Arc::clone(&effects))
            .build();
        let now = Timestamp(0.0);
        effects.add_effect(effect("raidwide", EffectScope::Raid, &src), now);
        effects.add_effect(
            Effect::new(
                "focus",
                EffectScope::Ability(ability.key().clone()),
                vec![(EffectKind::BaseCasting, EffectMod::Add(-1.0))],
                -1.0,
                EffectSource::Caster(std::sync::Arc::clone(&src)),
            ),
            now,
        );
        let target = EffectTarget::Ability(ability);
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &target),
            0.0
        );
        assert_eq!(
            effects.modified_value(EffectKind::BaseCasting, 3.0, &target),
            2.0
        );
    }

    #[test]
    fn sweep_starts_due_effects_and_expires_elapsed_ones() {
        let effects = std::sync::Arc::new(EffectsManager::new());
        let src = caster(1, GroupId::MAIN);
        let target = EffectTarget::Ability(ability_for(&src, &effects));

        let timed = Effect::new(
            "haste",
            EffectScope::Raid,
            vec![(EffectKind::CastingSpeed, EffectMod::Add(50.0))],
            10.0,
            EffectSource::Caster(std::sync::Arc::clone(&src)),
        )
        .with_start(Timestamp(5.0));
        effects.schedule(timed, Timestamp(0.0));
        assert_eq!(effects.pending_count(), 1);

        let sweep = effects.sweep(Timestamp(2.0));
        assert!(sweep.started.is_empty());
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &target),
            0.0
        );

        let sweep = effects.sweep(Timestamp(5.0));
        assert_eq!(sweep.started.len(), 1);
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &target),
            50.0
        );

        // lifetime counts from the scheduled start, not the sweep
        let sweep = effects.sweep(Timestamp(15.0));
        assert_eq!(sweep.expired.len(), 1);
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &target),
            0.0
        );
    }

    #[test]
    fn same_key_replaces_rather_than_stacks() {
        let effects = std::sync::Arc::new(EffectsManager::new());
        let src = caster(1, GroupId::MAIN);
        let target = EffectTarget::Ability(ability_for(&src, &effects));
        let now = Timestamp(0.0);
        effects.add_effect(effect("haste", EffectScope::Raid, &src), now);
        effects.add_effect(effect("haste", EffectScope::Raid, &src), now);
        assert_eq!(effects.active_count(), 1);
        assert_eq!(
            effects.modified_value(EffectKind::CastingSpeed, 0.0, &target),
            20.0
        );
    }

    #[test]
    fn dead_caster_drops_wide_effects_keeps_personal_ones() {
        let effects = std::sync::Arc::new(EffectsManager::new());
        let src = caster(1, GroupId::MAIN);
        let now = Timestamp(0.0);
        effects.add_effect(effect("raidwide", EffectScope::Raid, &src), now);
        effects.add_effect(effect("groupwide", EffectScope::Group, &src), now);
        effects.add_effect(
            effect("personal", EffectScope::Player(CasterId(1)), &src),
            now,
        );
        assert_eq!(effects.on_caster_death(CasterId(1)), 2);
        assert_eq!(effects.active_count(), 1);
    }

    #[test]
    fn interrupt_drops_pending_effect_start() {
        let effects = std::sync::Arc::new(EffectsManager::new());
        let src = caster(1, GroupId::MAIN);
        let ability = ability_for(&src, &effects);
        let pending = Effect::new(
            "buff",
            EffectScope::Player(CasterId(1)),
            vec![],
            10.0,
            EffectSource::Caster(std::sync::Arc::clone(&src)),
        )
        .with_source_variant(ability.variant_key())
        .with_start(Timestamp(3.0));
        effects.schedule(pending, Timestamp(0.0));
        assert!(effects.cancel_pending_from(&ability.variant_key()));
        assert!(!effects.cancel_pending_from(&ability.variant_key()));
        assert_eq!(effects.sweep(Timestamp(5.0)).started.len(), 0);
    }
}
