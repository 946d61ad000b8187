//! The scheduler core: lanes of running and delayed requests, filters and
//! hooks, plus the per-tick cast pipeline.
//!
//! [`TaskController`] is synchronous and single-threaded by construction;
//! the async [`worker`] owns one instance and serializes ticks against
//! command handling.

mod worker;

pub use worker::{Command, ProcessorHandle, ProcessorWorker, spawn};

use combat_core::constants::PRIORITY_SELECTION_MARGIN;
use combat_core::{Ability, AbilityBag, CastOutcome, Filter, Timestamp};
use tracing::{debug, warn};

use crate::request::Request;
use crate::task::{ExpireHook, FilterTask, Task};

/// What a single pass of the cast pipeline did.
#[derive(Default)]
pub struct TickReport {
    /// Abilities whose cast was dispatched this pass, at most one per caster.
    pub casts: Vec<Ability>,
    /// Casters whose cast attempt returned an error.
    pub failures: usize,
}

/// Anything the controller schedules: its lifecycle lives in a [`Task`] and
/// it reacts to promotion and expiry.
trait Scheduled {
    fn task(&self) -> &Task;
    fn task_mut(&mut self) -> &mut Task;
    fn is_expired(&self, now: Timestamp) -> bool {
        self.task().is_expired(now)
    }
    fn restart(&mut self, now: Timestamp);
    fn promote(&mut self, now: Timestamp);
    fn retire(&mut self, now: Timestamp);
}

impl Scheduled for Box<dyn Request> {
    fn task(&self) -> &Task {
        self.core().task()
    }

    fn task_mut(&mut self) -> &mut Task {
        self.core_mut().task_mut()
    }

    // requests may widen expiry, e.g. when their remaining set drains
    fn is_expired(&self, now: Timestamp) -> bool {
        Request::is_expired(self.as_ref(), now)
    }

    fn restart(&mut self, now: Timestamp) {
        Request::restart(self.as_mut(), now);
    }

    fn promote(&mut self, now: Timestamp) {
        self.notify_started(now);
    }

    fn retire(&mut self, now: Timestamp) {
        self.notify_expired(now);
    }
}

impl Scheduled for FilterTask {
    fn task(&self) -> &Task {
        FilterTask::task(self)
    }

    fn task_mut(&mut self) -> &mut Task {
        FilterTask::task_mut(self)
    }

    fn restart(&mut self, now: Timestamp) {
        self.task_mut().restart(now);
    }

    fn promote(&mut self, now: Timestamp) {
        self.task_mut().acknowledge_started(now);
    }

    fn retire(&mut self, now: Timestamp) {
        self.task_mut().acknowledge_expired(now);
    }
}

impl Scheduled for ExpireHook {
    fn task(&self) -> &Task {
        ExpireHook::task(self)
    }

    fn task_mut(&mut self) -> &mut Task {
        ExpireHook::task_mut(self)
    }

    fn restart(&mut self, now: Timestamp) {
        self.task_mut().restart(now);
    }

    fn promote(&mut self, now: Timestamp) {
        self.task_mut().acknowledge_started(now);
    }

    fn retire(&mut self, now: Timestamp) {
        if self.task_mut().acknowledge_expired(now) {
            self.fire();
        }
    }
}

/// One pair of running and delayed lists. Newly added items always pass
/// through the delayed list so the start notification happens in exactly
/// one place, at promotion.
struct Lane<T: Scheduled> {
    running: Vec<T>,
    delayed: Vec<T>,
}

impl<T: Scheduled> Lane<T> {
    fn new() -> Self {
        Self {
            running: Vec::new(),
            delayed: Vec::new(),
        }
    }

    /// Adds an item, deduplicating by description: a matching scheduled item
    /// is restarted in place and the incoming one is dropped.
    fn add(&mut self, mut item: T, now: Timestamp) {
        let description = item.task().description().to_owned();
        let in_running = self
            .running
            .iter()
            .position(|t| t.task().description() == description);
        let in_delayed = self
            .delayed
            .iter()
            .position(|t| t.task().description() == description);
        if let (Some(_), Some(delayed)) = (in_running, in_delayed) {
            warn!(task = %description, "scheduled in both lanes, dropping delayed copy");
            self.delayed.remove(delayed);
        }
        if let Some(index) = in_running {
            self.running[index].restart(now);
            return;
        }
        if let Some(index) = in_delayed {
            self.delayed[index].restart(now);
            return;
        }
        item.task_mut().start(now);
        self.delayed.push(item);
    }

    /// Promotes delayed items whose delay elapsed and retires expired
    /// running items. Returns the descriptions of retired items.
    fn prepare(&mut self, now: Timestamp) -> Vec<String> {
        for delayed in &self.delayed {
            let description = delayed.task().description();
            if self
                .running
                .iter()
                .any(|t| t.task().description() == description)
            {
                warn!(task = %description, "running while a delayed copy waits");
            }
        }
        let mut index = 0;
        while index < self.delayed.len() {
            if self.delayed[index].task().is_in_delay(now) {
                index += 1;
                continue;
            }
            let mut item = self.delayed.remove(index);
            item.promote(now);
            self.running.push(item);
        }
        let mut retired = Vec::new();
        let mut index = 0;
        while index < self.running.len() {
            if !self.running[index].is_expired(now) {
                index += 1;
                continue;
            }
            let mut item = self.running.remove(index);
            retired.push(item.task().description().to_owned());
            item.retire(now);
        }
        retired
    }

    fn expire_all(&mut self) {
        for item in self
            .running
            .iter_mut()
            .chain(self.delayed.iter_mut())
            .filter(|t| !t.task().is_persistent())
        {
            item.task_mut().expire();
        }
    }

    fn is_in_delay(&self, description: &str, now: Timestamp) -> bool {
        self.delayed
            .iter()
            .any(|t| t.task().description() == description && t.task().is_in_delay(now))
    }
}

/// Owns the three scheduling lanes and runs the cast pipeline over the
/// running requests.
pub struct TaskController {
    requests: Lane<Box<dyn Request>>,
    filters: Lane<FilterTask>,
    hooks: Lane<ExpireHook>,
}

impl TaskController {
    pub fn new() -> Self {
        Self {
            requests: Lane::new(),
            filters: Lane::new(),
            hooks: Lane::new(),
        }
    }

    pub fn add_request(&mut self, request: Box<dyn Request>, now: Timestamp) {
        debug!(request = %request.description(), "request scheduled");
        self.requests.add(request, now);
    }

    pub fn add_filter(&mut self, filter: FilterTask, now: Timestamp) {
        debug!(filter = %filter.task().description(), "filter scheduled");
        self.filters.add(filter, now);
    }

    pub fn add_hook(&mut self, hook: ExpireHook, now: Timestamp) {
        self.hooks.add(hook, now);
    }

    pub fn request_in_delay(&self, description: &str, now: Timestamp) -> bool {
        self.requests.is_in_delay(description, now)
    }

    /// Moves every lane forward: promotions and expirations. Returns the
    /// descriptions of requests that expired, for event publication.
    pub fn prepare(&mut self, now: Timestamp) -> Vec<String> {
        let expired = self.requests.prepare(now);
        self.filters.prepare(now);
        self.hooks.prepare(now);
        expired
    }

    /// Expires every non-persistent scheduled item. The next prepare pass
    /// delivers the expiry notifications.
    pub fn expire_all(&mut self) {
        self.requests.expire_all();
        self.filters.expire_all();
        self.hooks.expire_all();
    }

    /// Runs the cast pipeline once: collect wanted abilities from running
    /// requests, pick at most one per caster, dispatch, and notify every
    /// running request of each confirmed cast.
    ///
    /// `veto` is ANDed with the running filter tasks; `only` restricts the
    /// collection phase to a single request, for immediate execution.
    pub fn process(
        &mut self,
        now: Timestamp,
        veto: Option<Filter>,
        only: Option<&str>,
    ) -> TickReport {
        let mut combined = veto;
        for filter_task in &self.filters.running {
            let filter = filter_task.filter().clone();
            combined = Some(match combined {
                Some(existing) => existing.and(filter),
                None => filter,
            });
        }

        let mut wanted = AbilityBag::new();
        for request in &mut self.requests.running {
            if only.is_some_and(|d| request.description() != d) {
                continue;
            }
            request.set_filter(combined.clone());
            wanted.add_bag(request.available_abilities(now));
        }

        let mut report = TickReport::default();
        for (_, bag) in wanted.by_reusable(now).map_by_caster() {
            let abilities = bag.abilities();
            let Some(first) = abilities.first() else {
                continue;
            };
            let last_cast = first.caster().last_cast_ability();
            let candidates = bag
                .by_can_override(last_cast.as_ref(), now)
                .by_priority_in_range(PRIORITY_SELECTION_MARGIN)
                .by_general_preference(now, 3)
                .abilities();
            for ability in candidates {
                match ability.cast(now) {
                    Ok(CastOutcome::Cast) => {
                        report.casts.push(ability);
                        break;
                    }
                    Ok(outcome) => {
                        debug!(ability = %ability, ?outcome, "cast declined");
                    }
                    Err(err) => {
                        warn!(ability = %ability, error = %err, "cast dispatch failed");
                        report.failures += 1;
                        break;
                    }
                }
            }
        }

        for ability in &report.casts {
            for request in &mut self.requests.running {
                request.notify_casting(ability, now);
            }
        }
        report
    }
}

impl Default for TaskController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use combat_core::{
        Ability, AbilityCensus, AbilityProfile, Caster, CasterId, GroupId, Timestamp,
    };

    use super::*;
    use crate::request::CastAnyWhenReady;
    use crate::task::FilterTask;

    fn caster(id: u32) -> Arc<Caster> {
        Caster::new(CasterId(id), format!("caster{id}"), GroupId::MAIN, 0)
    }

    fn ability(caster: &Arc<Caster>, id: &str, priority: i64) -> Ability {
        let mut profile = AbilityProfile::default();
        profile.priority = priority;
        Ability::builder(Arc::clone(caster), id)
            .census(AbilityCensus {
                casting: 1.0,
                reuse: 5.0,
                recovery: 0.3,
                duration: -1.0,
                ..AbilityCensus::default()
            })
            .profile(profile)
            .build()
    }

    fn ready_request(abilities: Vec<Ability>, duration: f64) -> Box<dyn Request> {
        Box::new(CastAnyWhenReady::from_resolved(abilities, duration))
    }

    #[test]
    fn one_cast_per_caster_per_pass() {
        let now = Timestamp(100.0);
        let c1 = caster(1);
        let c2 = caster(2);
        let mut controller = TaskController::new();
        controller.add_request(
            ready_request(
                vec![
                    ability(&c1, "smite", 10),
                    ability(&c1, "mend", 100),
                    ability(&c2, "ward", 0),
                ],
                30.0,
            ),
            now,
        );
        controller.prepare(now);
        let report = controller.process(now, None, None);
        assert_eq!(report.casts.len(), 2);
        assert_eq!(report.failures, 0);
        let mine: Vec<_> = report
            .casts
            .iter()
            .filter(|a| a.caster().id() == CasterId(1))
            .collect();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id().as_str(), "mend");
    }

    #[test]
    fn running_filters_are_anded_onto_requests() {
        let now = Timestamp(100.0);
        let c1 = caster(1);
        let mut controller = TaskController::new();
        controller.add_request(
            ready_request(
                vec![ability(&c1, "smite", 10), ability(&c1, "mend", 20)],
                30.0,
            ),
            now,
        );
        controller.add_filter(
            FilterTask::new(
                Filter::new("no-mend", |a| a.id().as_str() != "mend"),
                "no-mend",
                30.0,
            ),
            now,
        );
        controller.prepare(now);
        let report = controller.process(now, None, None);
        assert_eq!(report.casts.len(), 1);
        assert_eq!(report.casts[0].id().as_str(), "smite");
    }

    #[test]
    fn veto_filter_applies_without_filter_tasks() {
        let now = Timestamp(100.0);
        let c1 = caster(1);
        let mut controller = TaskController::new();
        controller.add_request(ready_request(vec![ability(&c1, "smite", 10)], 30.0), now);
        controller.prepare(now);
        let veto = Filter::new("veto-smite", |a| a.id().as_str() != "smite");
        let report = controller.process(now, Some(veto), None);
        assert!(report.casts.is_empty());
    }

    #[test]
    fn delayed_request_waits_for_promotion() {
        let now = Timestamp(100.0);
        let c1 = caster(1);
        let mut request = ready_request(vec![ability(&c1, "smite", 10)], 30.0);
        request.core_mut().task_mut().delay_next_start(5.0);
        let description = request.description();
        let mut controller = TaskController::new();
        controller.add_request(request, now);
        assert!(controller.request_in_delay(&description, now));
        controller.prepare(now);
        assert!(controller.process(now, None, None).casts.is_empty());
        let later = now + 5.1;
        controller.prepare(later);
        assert_eq!(controller.process(later, None, None).casts.len(), 1);
    }

    #[test]
    fn expired_requests_are_retired_by_description() {
        let now = Timestamp(100.0);
        let c1 = caster(1);
        let mut controller = TaskController::new();
        controller.add_request(ready_request(vec![ability(&c1, "smite", 10)], 10.0), now);
        controller.prepare(now);
        let expired = controller.prepare(now + 11.0);
        assert_eq!(expired.len(), 1);
        assert!(expired[0].contains("smite"));
        assert!(controller.process(now + 11.0, None, None).casts.is_empty());
    }

    #[test]
    fn readding_a_running_request_restarts_it_in_place() {
        let now = Timestamp(100.0);
        let c1 = caster(1);
        let mut controller = TaskController::new();
        controller.add_request(ready_request(vec![ability(&c1, "smite", 10)], 10.0), now);
        controller.prepare(now);
        let later = now + 8.0;
        controller.add_request(ready_request(vec![ability(&c1, "smite", 10)], 10.0), later);
        let expired = controller.prepare(later + 5.0);
        assert!(expired.is_empty());
        let expired = controller.prepare(later + 11.0);
        assert_eq!(expired.len(), 1);
    }

    #[test]
    fn expire_hook_fires_once_on_retirement() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&fired);
        let now = Timestamp(100.0);
        let mut controller = TaskController::new();
        controller.add_hook(
            ExpireHook::new(
                move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                },
                "cleanup",
                5.0,
            ),
            now,
        );
        controller.prepare(now);
        controller.prepare(now + 6.0);
        controller.prepare(now + 7.0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
