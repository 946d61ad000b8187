//! Requests driven by a combinator expression.

use combat_core::conditions;
use combat_core::{
    Ability, AbilityBag, AbilityResolver, Combine, CombineReducer, Filter, ResolvedCombine,
    Timestamp,
};
use tracing::debug;

use super::composite::cascade_lifecycle;
use super::{CastAllAndExpirePermanently, Request, RequestCore};

/// How eagerly a [`RequestCombine`] recasts its expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecastMode {
    /// Recast only when nothing matching the expression is running.
    Lazy,
    /// Recast whenever the expression holds on reusable, not-running
    /// members, even while another member is mid-duration.
    Greedy,
}

/// Evaluates a combinator expression each tick and spawns a one-shot inner
/// request for whatever set of abilities the expression accepted.
pub struct RequestCombine {
    core: RequestCore,
    children: Vec<Box<dyn Request>>,
    resolved: ResolvedCombine,
    mode: RecastMode,
}

impl RequestCombine {
    pub fn new(
        combine: &Combine,
        resolver: &dyn AbilityResolver,
        mode: RecastMode,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::named(format!("combine[{mode:?}]"), duration),
            children: Vec::new(),
            resolved: combine.resolve(resolver),
            mode,
        }
    }

    fn children_bag(&mut self, now: Timestamp) -> AbilityBag {
        let mut result = AbilityBag::new();
        for child in &mut self.children {
            if child.is_expired(now) {
                continue;
            }
            result.add_bag(child.available_abilities(now));
        }
        result
    }

    fn evaluate(&self, now: Timestamp) -> (bool, Vec<Ability>) {
        let veto = self.core.filter();
        match self.mode {
            RecastMode::Lazy => {
                let (running, _) =
                    self.resolved
                        .get_by_condition_filtered(&conditions::is_running, veto, now);
                if running {
                    debug!("previous combine members still running");
                    return (false, Vec::new());
                }
                self.resolved
                    .get_by_condition_filtered(&conditions::is_reusable_or_running, veto, now)
            }
            RecastMode::Greedy => self.resolved.get_by_condition_filtered(
                &conditions::is_reusable_and_not_running,
                veto,
                now,
            ),
        }
    }
}

impl Request for RequestCombine {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    cascade_lifecycle!();

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        if let Some(current) = self.children.last()
            && !current.is_expired(now)
        {
            debug!("previous combine selection still casting");
            return self.children_bag(now);
        }
        self.children.clear();

        let (accept, to_cast) = self.evaluate(now);
        if !accept || to_cast.is_empty() {
            return AbilityBag::new();
        }
        let mut inner =
            CastAllAndExpirePermanently::from_resolved(to_cast, self.core.task().duration());
        inner.set_filter(self.core.filter().cloned());
        inner.start(now);
        inner.notify_started(now);
        self.children.push(Box::new(inner));
        self.children_bag(now)
    }
}

/// Reducer for alternative-choice groups that keeps only the least busy
/// caster's reusable members, so one instance runs at a time pool-wide.
pub struct NonOverlappingDurationReducer;

impl CombineReducer for NonOverlappingDurationReducer {
    fn reduce(&self, abilities: Vec<Ability>, limit: usize, now: Timestamp) -> Vec<Ability> {
        let bag = AbilityBag::from_abilities(abilities);
        let mut reduced = bag
            .by_reusable(now)
            .one_of_least_busy_caster(now)
            .abilities();
        reduced.truncate(limit);
        reduced
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use combat_core::{
        AbilityCensus, AbilityProfile, AbilitySource, Caster, CasterId, GroupId, Roster,
    };

    use super::*;


    fn buff(caster: &Arc<Caster>, id: &str) -> Ability {
        Ability::builder(Arc::clone(caster), id)
            .census(AbilityCensus {
                casting: 1.0,
                reuse: 60.0,
                recovery: 0.3,
                duration: 10.0,
                ..AbilityCensus::default()
            })
            .profile(AbilityProfile::default())
            .build()
    }

    fn sources(ids: &[&str]) -> Vec<AbilitySource> {
        ids.iter().map(|id| (*id).into()).collect()
    }

    #[test]
    fn lazy_offers_idle_members_while_one_runs() {
        let start = Timestamp(100.0);
        let druid = Caster::new(CasterId(1), "druid", GroupId::MAIN, 0);
        let aura = buff(&druid, "aura");
        let boon = buff(&druid, "boon");
        let mut roster = Roster::new();
        roster.register_ability(aura.clone());
        roster.register_ability(boon.clone());

        aura.cast(start).unwrap();
        let now = start + 2.0;

        let combine = Combine::and(sources(&["aura", "boon"]));
        let mut request = RequestCombine::new(&combine, &roster, RecastMode::Lazy, 300.0);
        request.start(now);
        request.notify_started(now);

        // aura is mid-duration so it counts toward the group quota without
        // being offered again
        let bag = request.available_abilities(now);
        assert_eq!(bag.len(), 1);
        let offered = bag.abilities().remove(0);
        assert_eq!(offered.id().0, "boon");

        offered.cast(now).unwrap();
        request.notify_casting(&offered, now);

        // the spawned selection is exhausted and both members are now running
        assert!(request.available_abilities(now + 1.0).is_empty());
        assert!(request.available_abilities(now + 2.0).is_empty());
    }

    #[test]
    fn greedy_waits_for_the_whole_group() {
        let start = Timestamp(100.0);
        let druid = Caster::new(CasterId(1), "druid", GroupId::MAIN, 0);
        let aura = buff(&druid, "aura");
        let boon = buff(&druid, "boon");
        let mut roster = Roster::new();
        roster.register_ability(aura.clone());
        roster.register_ability(boon.clone());

        let combine = Combine::and(sources(&["aura", "boon"]));
        let mut request = RequestCombine::new(&combine, &roster, RecastMode::Greedy, 300.0);
        request.start(start);
        request.notify_started(start);

        // with everything idle and reusable the whole group is offered
        assert_eq!(request.available_abilities(start).len(), 2);

        aura.cast(start).unwrap();

        // a single running member poisons the greedy group
        let mut fresh = RequestCombine::new(&combine, &roster, RecastMode::Greedy, 300.0);
        fresh.start(start + 2.0);
        fresh.notify_started(start + 2.0);
        assert!(fresh.available_abilities(start + 2.0).is_empty());
    }
}
