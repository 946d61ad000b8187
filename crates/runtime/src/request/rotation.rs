//! Target-ranked rotations: spread one ability (wards, intercepts, heals
//! over time) across the most endangered targets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use combat_core::constants::PERMANENT_DURATION_SCORE;
use combat_core::{
    Ability, AbilityBag, AbilityKey, AbilityResolver, AbilitySource, CasterId, Combatant, Filter,
    Roster, TargetRanking, Timestamp, VariantKey,
};
use tracing::trace;

use super::{Request, RequestCore};

/// Supplies a snapshot of live combatants for ranking, typically backed by
/// the parsed combat log.
pub type BattlefieldSource = Arc<dyn Fn() -> Vec<Combatant> + Send + Sync>;

/// Re-ranks live targets each time its cache invalidates, materializes one
/// ability variant per `(caster, target)` pair, and offers the ready ones
/// according to two independent policy flags.
///
/// Without stacking, each target keeps at most one running instance and the
/// instance closest to expiry picks the caster. With recasting, an idle
/// caster tops up its own shortest-remaining running instance instead of
/// going idle.
pub struct RotationWithTargetRanking {
    core: RequestCore,
    ranker: Box<dyn TargetRanking>,
    battlefield: BattlefieldSource,
    roster: Arc<Roster>,
    exclude_self: bool,
    allow_stacking: bool,
    allow_recasting: bool,
    produced: HashMap<VariantKey, Ability>,
    cache: Option<Vec<Ability>>,
    cache_keys: HashSet<VariantKey>,
}

impl RotationWithTargetRanking {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        ranker: Box<dyn TargetRanking>,
        battlefield: BattlefieldSource,
        roster: Arc<Roster>,
        exclude_self: bool,
        duration: f64,
    ) -> Self {
        // one untargeted base variant per caster's ability
        let mut seen: HashSet<AbilityKey> = HashSet::new();
        let mut resolved = Vec::new();
        for source in sources {
            for ability in resolver.resolve(&source) {
                if seen.insert(ability.key().clone()) {
                    resolved.push(ability);
                }
            }
        }
        let mut core = RequestCore::from_resolved(resolved, duration);
        let name = format!("rotation: [{}]", core.task().description());
        core.task_mut().set_description(name);
        Self {
            core,
            ranker,
            battlefield,
            roster,
            exclude_self,
            allow_stacking: false,
            allow_recasting: false,
            produced: HashMap::new(),
            cache: None,
            cache_keys: HashSet::new(),
        }
    }

    pub fn allow_stacking(mut self) -> Self {
        self.allow_stacking = true;
        self
    }

    pub fn allow_recasting(mut self) -> Self {
        self.allow_recasting = true;
        self
    }

    fn invalidate(&mut self) {
        self.cache = None;
        self.cache_keys.clear();
    }

    fn ranked_targets(&self, permitted: &[Ability]) -> Vec<String> {
        let combatants: Vec<Combatant> = (self.battlefield)();
        let mut targets = self.ranker.rank(&combatants);
        // casters zoned with the rotation are valid fallback targets; ranked
        // names keep their order in front
        let mut zones: HashSet<String> = HashSet::new();
        for ability in permitted {
            zones.insert(ability.caster().zone());
        }
        for zone in zones {
            for name in self.roster.caster_names_in_zone(&zone) {
                if !targets.contains(&name) {
                    targets.push(name);
                }
            }
        }
        targets
    }

    fn build_cache(&mut self, now: Timestamp) -> Option<Vec<Ability>> {
        let permitted_filter = Filter::permitted_caster_state();
        let all_permitted: Vec<Ability> = self
            .core
            .resolved()
            .iter()
            .filter(|a| permitted_filter.test(a))
            .cloned()
            .collect();
        if !all_permitted.iter().any(|a| a.is_reusable(now)) {
            return None;
        }
        let targets = self.ranked_targets(&all_permitted);
        if targets.is_empty() {
            return None;
        }
        Some(self.candidates_for_targets(&targets, &all_permitted, now))
    }

    fn candidates_for_targets(
        &mut self,
        targets: &[String],
        all_permitted: &[Ability],
        now: Timestamp,
    ) -> Vec<Ability> {
        let mut by_key: HashMap<VariantKey, Ability> = HashMap::new();
        let mut scores: HashMap<VariantKey, f64> = HashMap::new();
        let mut ready_by_target: HashMap<&str, HashSet<VariantKey>> = HashMap::new();
        let mut running_by_target: HashMap<&str, HashSet<VariantKey>> = HashMap::new();
        let mut ready_by_caster: HashMap<CasterId, HashSet<VariantKey>> = HashMap::new();
        let mut running_by_caster: HashMap<CasterId, HashSet<VariantKey>> = HashMap::new();
        for target in targets {
            ready_by_target.insert(target, HashSet::new());
            running_by_target.insert(target, HashSet::new());
        }
        let mut available_casters: HashSet<CasterId> = HashSet::new();
        for ability in all_permitted {
            let caster = ability.caster();
            ready_by_caster.entry(caster.id()).or_default();
            running_by_caster.entry(caster.id()).or_default();
            if !caster.is_busy(now) {
                available_casters.insert(caster.id());
            }
        }

        for ability in all_permitted {
            let caster = ability.caster();
            for target in targets {
                if self.exclude_self && target == caster.name() {
                    continue;
                }
                let targeted = self
                    .produced
                    .entry(VariantKey {
                        caster: caster.id(),
                        ability: ability.id().clone(),
                        target: Some(target.clone()),
                    })
                    .or_insert_with(|| ability.with_target(target.clone()))
                    .clone();
                let key = targeted.variant_key();
                let score = if targeted.is_permanent() && !targeted.is_duration_expired(now) {
                    PERMANENT_DURATION_SCORE
                } else {
                    targeted.remaining_duration(now).max(0.0)
                };
                let is_running = targeted.is_casting(now) || score > 0.0;
                scores.insert(key.clone(), score);
                by_key.insert(key.clone(), targeted);
                if is_running {
                    trace!(ability = %key, "running on target");
                    running_by_target
                        .get_mut(target.as_str())
                        .map(|s| s.insert(key.clone()));
                    running_by_caster
                        .get_mut(&caster.id())
                        .map(|s| s.insert(key));
                } else if ability.is_reusable(now) {
                    trace!(ability = %key, "ready for target");
                    ready_by_target
                        .get_mut(target.as_str())
                        .map(|s| s.insert(key.clone()));
                    ready_by_caster.get_mut(&caster.id()).map(|s| s.insert(key));
                }
            }
        }

        match (self.allow_stacking, self.allow_recasting) {
            (true, false) => {}
            (true, true) => {
                Self::recast_running_when_idle(
                    &available_casters,
                    &mut ready_by_target,
                    &mut ready_by_caster,
                    &running_by_caster,
                    &scores,
                    &by_key,
                    now,
                );
            }
            (false, false) => {
                for target in targets {
                    Self::drop_ready_when_target_covered(
                        target,
                        &mut ready_by_target,
                        &mut ready_by_caster,
                        &running_by_target,
                        &by_key,
                    );
                    Self::keep_one_caster_per_target(
                        target,
                        &mut ready_by_target,
                        &mut ready_by_caster,
                        &scores,
                        &by_key,
                    );
                }
            }
            (false, true) => {
                for target in targets {
                    Self::drop_ready_when_target_covered(
                        target,
                        &mut ready_by_target,
                        &mut ready_by_caster,
                        &running_by_target,
                        &by_key,
                    );
                    Self::recast_running_when_idle(
                        &available_casters,
                        &mut ready_by_target,
                        &mut ready_by_caster,
                        &running_by_caster,
                        &scores,
                        &by_key,
                        now,
                    );
                    if ready_by_target
                        .get(target.as_str())
                        .is_none_or(|s| s.is_empty())
                    {
                        continue;
                    }
                    Self::keep_one_caster_per_target(
                        target,
                        &mut ready_by_target,
                        &mut ready_by_caster,
                        &scores,
                        &by_key,
                    );
                }
            }
        }

        let mut candidates: Vec<Ability> = Vec::new();
        for caster in &available_casters {
            if let Some(keys) = ready_by_caster.get(caster) {
                for key in keys {
                    if let Some(ability) = by_key.get(key) {
                        candidates.push(ability.clone());
                    }
                }
            }
        }
        candidates
    }

    /// No-stacking rule: anything already running on the target drops all of
    /// that target's ready candidates.
    fn drop_ready_when_target_covered(
        target: &str,
        ready_by_target: &mut HashMap<&str, HashSet<VariantKey>>,
        ready_by_caster: &mut HashMap<CasterId, HashSet<VariantKey>>,
        running_by_target: &HashMap<&str, HashSet<VariantKey>>,
        by_key: &HashMap<VariantKey, Ability>,
    ) {
        if running_by_target.get(target).is_none_or(|s| s.is_empty()) {
            return;
        }
        let Some(ready) = ready_by_target.get_mut(target) else {
            return;
        };
        for key in ready.drain() {
            if let Some(ability) = by_key.get(&key)
                && let Some(set) = ready_by_caster.get_mut(&ability.caster().id())
            {
                set.remove(&key);
            }
        }
    }

    /// Keeps only candidates from the caster whose instance on the target
    /// has the lowest score, so the most urgent refresher wins the target.
    fn keep_one_caster_per_target(
        target: &str,
        ready_by_target: &mut HashMap<&str, HashSet<VariantKey>>,
        ready_by_caster: &mut HashMap<CasterId, HashSet<VariantKey>>,
        scores: &HashMap<VariantKey, f64>,
        by_key: &HashMap<VariantKey, Ability>,
    ) {
        let Some(ready) = ready_by_target.get_mut(target) else {
            return;
        };
        let chosen: Option<CasterId> = ready
            .iter()
            .min_by(|a, b| {
                let sa = scores.get(*a).copied().unwrap_or(f64::INFINITY);
                let sb = scores.get(*b).copied().unwrap_or(f64::INFINITY);
                sa.total_cmp(&sb)
            })
            .and_then(|key| by_key.get(key))
            .map(|a| a.caster().id());
        let Some(chosen) = chosen else {
            return;
        };
        let mut kept = HashSet::new();
        for key in ready.drain() {
            let Some(ability) = by_key.get(&key) else {
                continue;
            };
            if ability.caster().id() == chosen {
                kept.insert(key);
            } else if let Some(set) = ready_by_caster.get_mut(&ability.caster().id()) {
                set.remove(&key);
            }
        }
        *ready = kept;
    }

    /// Recasting rule: a caster with nothing ready re-offers its running
    /// instance with the shortest remaining duration, provided the shared
    /// reuse timer allows it.
    fn recast_running_when_idle(
        available_casters: &HashSet<CasterId>,
        ready_by_target: &mut HashMap<&str, HashSet<VariantKey>>,
        ready_by_caster: &mut HashMap<CasterId, HashSet<VariantKey>>,
        running_by_caster: &HashMap<CasterId, HashSet<VariantKey>>,
        scores: &HashMap<VariantKey, f64>,
        by_key: &HashMap<VariantKey, Ability>,
        now: Timestamp,
    ) {
        for caster in available_casters {
            if ready_by_caster.get(caster).is_some_and(|s| !s.is_empty()) {
                continue;
            }
            let Some(running) = running_by_caster.get(caster) else {
                continue;
            };
            let best = running
                .iter()
                .filter(|key| {
                    by_key
                        .get(*key)
                        .is_some_and(|ability| ability.is_reusable(now))
                })
                .min_by(|a, b| {
                    let sa = scores.get(*a).copied().unwrap_or(f64::INFINITY);
                    let sb = scores.get(*b).copied().unwrap_or(f64::INFINITY);
                    sa.total_cmp(&sb)
                });
            let Some(best) = best else {
                continue;
            };
            if let Some(target) = &best.target
                && let Some(set) = ready_by_target.get_mut(target.as_str())
            {
                set.insert(best.clone());
            }
            if let Some(set) = ready_by_caster.get_mut(caster) {
                set.insert(best.clone());
            }
        }
    }
}

impl Request for RotationWithTargetRanking {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn is_resolved(&self, ability: &Ability) -> bool {
        // rotations own every targeted variant they produced
        self.produced.contains_key(&ability.variant_key()) || self.core.contains(ability)
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        if self.cache_keys.contains(&ability.variant_key()) {
            self.invalidate();
        }
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        if let Some(cached) = &self.cache {
            let filtered = self.core.filtered(cached);
            if filtered.is_empty() {
                self.invalidate();
            } else {
                return AbilityBag::from_abilities(filtered);
            }
        }
        let Some(fresh) = self.build_cache(now) else {
            return AbilityBag::new();
        };
        if fresh.is_empty() {
            return AbilityBag::new();
        }
        self.cache_keys = fresh.iter().map(|a| a.variant_key()).collect();
        let filtered = self.core.filtered(&fresh);
        self.cache = Some(fresh);
        AbilityBag::from_abilities(filtered)
    }
}
