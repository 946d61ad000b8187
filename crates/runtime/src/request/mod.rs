//! Cast requests: duration-bounded policies that report, each tick, which
//! abilities they currently want cast.
//!
//! Every request owns a [`Task`] for lifecycle and a set of abilities
//! resolved once at construction. The scheduler injects the global
//! acceptance filter before querying [`Request::available_abilities`]; the
//! policy behind that one method is the entire behavioral contract of each
//! concrete type.

mod combine;
mod composite;
mod rotation;

pub use combine::{NonOverlappingDurationReducer, RecastMode, RequestCombine};
pub use composite::{CascadeRequest, CompositeRequest, DynamicRequestProxy};
pub use rotation::{BattlefieldSource, RotationWithTargetRanking};

use std::collections::HashSet;
use std::fmt::Write as _;

use combat_core::{
    Ability, AbilityBag, AbilityResolver, AbilitySource, Filter, GroupId, Timestamp, VariantKey,
};
use tracing::debug;

use crate::task::Task;

/// Shared state of every request: lifecycle task, resolved abilities, and
/// the scheduler-injected acceptance filter.
pub struct RequestCore {
    task: Task,
    resolved: Vec<Ability>,
    resolved_keys: HashSet<VariantKey>,
    filter: Option<Filter>,
}

impl RequestCore {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        let resolved: Vec<Ability> = sources
            .into_iter()
            .flat_map(|source| resolver.resolve(&source))
            .collect();
        let mut description = String::new();
        for ability in &resolved {
            if !description.is_empty() {
                description.push_str(", ");
            }
            let _ = write!(description, "{ability}");
        }
        if description.is_empty() {
            description.push_str("request");
        }
        Self::from_resolved_with_description(description, resolved, duration)
    }

    /// For requests built from already-resolved abilities, such as the inner
    /// casting request a combine spawns.
    pub fn from_resolved(resolved: Vec<Ability>, duration: f64) -> Self {
        let mut description = resolved
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        if description.is_empty() {
            description.push_str("request");
        }
        Self::from_resolved_with_description(description, resolved, duration)
    }

    pub fn named(description: impl Into<String>, duration: f64) -> Self {
        Self {
            task: Task::new(description, duration),
            resolved: Vec::new(),
            resolved_keys: HashSet::new(),
            filter: None,
        }
    }

    fn from_resolved_with_description(
        description: String,
        resolved: Vec<Ability>,
        duration: f64,
    ) -> Self {
        let resolved_keys = resolved.iter().map(|a| a.variant_key()).collect();
        Self {
            task: Task::new(description, duration),
            resolved,
            resolved_keys,
            filter: None,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut Task {
        &mut self.task
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter;
    }

    pub fn resolved(&self) -> &[Ability] {
        &self.resolved
    }

    pub fn contains(&self, ability: &Ability) -> bool {
        self.resolved_keys.contains(&ability.variant_key())
    }

    /// Whether the scheduler's filter accepts the ability. No filter set
    /// means everything is accepted.
    pub fn accepts(&self, ability: &Ability) -> bool {
        self.filter.as_ref().is_none_or(|f| f.test(ability))
    }

    pub fn filtered<'a>(&self, abilities: impl IntoIterator<Item = &'a Ability>) -> Vec<Ability> {
        abilities
            .into_iter()
            .filter(|a| self.accepts(a))
            .cloned()
            .collect()
    }

    /// All resolved abilities that pass the filter.
    pub fn base_bag(&self) -> AbilityBag {
        AbilityBag::from_abilities(self.filtered(&self.resolved))
    }
}

/// A scheduler-owned cast policy. Default lifecycle methods delegate to the
/// core task; composites override them to cascade to children.
pub trait Request: Send {
    fn core(&self) -> &RequestCore;
    fn core_mut(&mut self) -> &mut RequestCore;

    /// The abilities this request wants cast right now.
    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag;

    /// Called for every confirmed cast on any running request.
    fn notify_casting(&mut self, _ability: &Ability, _now: Timestamp) {}

    fn description(&self) -> String {
        self.core().task.description().to_owned()
    }

    fn is_resolved(&self, ability: &Ability) -> bool {
        self.core().contains(ability)
    }

    fn set_filter(&mut self, filter: Option<Filter>) {
        self.core_mut().set_filter(filter);
    }

    fn start(&mut self, now: Timestamp) {
        self.core_mut().task.start(now);
    }

    fn restart(&mut self, now: Timestamp) {
        self.core_mut().task.restart(now);
    }

    fn extend(&mut self, duration: Option<f64>, now: Timestamp) {
        self.core_mut().task.extend(duration, now);
    }

    fn expire(&mut self) {
        self.core_mut().task.expire();
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        self.core().task.is_expired(now)
    }

    fn notify_started(&mut self, now: Timestamp) {
        if self.core_mut().task.acknowledge_started(now) {
            self.on_start(now);
        }
    }

    fn notify_expired(&mut self, now: Timestamp) {
        if self.core_mut().task.acknowledge_expired(now) {
            self.on_expire(now);
        }
    }

    fn on_start(&mut self, _now: Timestamp) {}

    fn on_expire(&mut self, _now: Timestamp) {}
}

/// Casts a single ability on the least busy caster, then expires.
pub struct CastOneAndExpire {
    core: RequestCore,
    finished: bool,
}

impl CastOneAndExpire {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::new(sources, resolver, duration),
            finished: false,
        }
    }
}

impl Request for CastOneAndExpire {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn on_expire(&mut self, _now: Timestamp) {
        self.finished = false;
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        if self.core.contains(ability) {
            self.finished = true;
            self.core.task.expire();
        }
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        if self.finished {
            self.core.task.expire();
            return AbilityBag::new();
        }
        self.core.base_bag().one_of_least_busy_caster(now)
    }
}

/// Like [`CastOneAndExpire`], but expires after `n` confirmed casts.
pub struct CastNAndExpire {
    core: RequestCore,
    budget: u32,
    remaining_casts: u32,
}

impl CastNAndExpire {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        n: u32,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::new(sources, resolver, duration),
            budget: n,
            remaining_casts: n,
        }
    }
}

impl Request for CastNAndExpire {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn on_expire(&mut self, _now: Timestamp) {
        self.remaining_casts = self.budget;
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        if self.core.contains(ability) {
            self.remaining_casts = self.remaining_casts.saturating_sub(1);
        }
        if self.remaining_casts == 0 {
            self.core.task.expire();
        }
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        if self.remaining_casts == 0 {
            self.core.task.expire();
            return AbilityBag::new();
        }
        self.core.base_bag().one_of_least_busy_caster(now)
    }
}

/// Offers every resolved ability for the whole duration; any of them may be
/// cast whenever it is ready.
pub struct CastAnyWhenReady {
    core: RequestCore,
}

impl CastAnyWhenReady {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::new(sources, resolver, duration),
        }
    }

    pub fn from_resolved(resolved: Vec<Ability>, duration: f64) -> Self {
        Self {
            core: RequestCore::from_resolved(resolved, duration),
        }
    }
}

impl Request for CastAnyWhenReady {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn available_abilities(&mut self, _now: Timestamp) -> AbilityBag {
        self.core.base_bag()
    }
}

/// [`CastAnyWhenReady`] gated to at most one cast per period.
pub struct CastAnyWhenReadyEveryNSec {
    core: RequestCore,
    period: f64,
    last_cast: Option<Timestamp>,
}

impl CastAnyWhenReadyEveryNSec {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        period: f64,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::new(sources, resolver, duration),
            period,
            last_cast: None,
        }
    }
}

impl Request for CastAnyWhenReadyEveryNSec {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn notify_casting(&mut self, ability: &Ability, now: Timestamp) {
        if self.core.contains(ability) {
            self.last_cast = Some(now);
        }
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        match self.last_cast {
            Some(last) if now.since(last) <= self.period => AbilityBag::new(),
            _ => self.core.base_bag(),
        }
    }
}

/// Casts every resolved ability once, in any order. Expires when the
/// remaining set empties out; a restart refills it.
pub struct CastAllAndExpire {
    core: RequestCore,
    remaining: Vec<Ability>,
}

impl CastAllAndExpire {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        let core = RequestCore::new(sources, resolver, duration);
        let remaining = core.resolved().to_vec();
        Self { core, remaining }
    }
}

impl Request for CastAllAndExpire {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn on_expire(&mut self, _now: Timestamp) {
        self.remaining = self.core.resolved().to_vec();
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        let key = ability.variant_key();
        self.remaining.retain(|a| a.variant_key() != key);
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        self.core.task.is_expired(now) || self.core.filtered(&self.remaining).is_empty()
    }

    fn available_abilities(&mut self, _now: Timestamp) -> AbilityBag {
        let filtered = self.core.filtered(&self.remaining);
        if filtered.is_empty() {
            self.core.task.expire();
            return AbilityBag::new();
        }
        AbilityBag::from_abilities(filtered)
    }
}

/// Casts every resolved ability once, then goes permanently inert: no
/// restart or extension revives it. Used by scripts and spawned sub-requests.
pub struct CastAllAndExpirePermanently {
    core: RequestCore,
    remaining: Vec<Ability>,
    exhausted: bool,
}

impl CastAllAndExpirePermanently {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        let core = RequestCore::new(sources, resolver, duration);
        let remaining = core.resolved().to_vec();
        Self {
            core,
            remaining,
            exhausted: false,
        }
    }

    pub fn from_resolved(abilities: Vec<Ability>, duration: f64) -> Self {
        let core = RequestCore::from_resolved(abilities, duration);
        let remaining = core.resolved().to_vec();
        Self {
            core,
            remaining,
            exhausted: false,
        }
    }
}

impl Request for CastAllAndExpirePermanently {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn start(&mut self, now: Timestamp) {
        if !self.exhausted {
            self.core.task.start(now);
        }
    }

    fn restart(&mut self, now: Timestamp) {
        if !self.exhausted {
            self.core.task.restart(now);
        }
    }

    fn extend(&mut self, duration: Option<f64>, now: Timestamp) {
        if !self.exhausted {
            self.core.task.extend(duration, now);
        }
    }

    fn notify_started(&mut self, now: Timestamp) {
        if self.exhausted {
            return;
        }
        if self.core.task.acknowledge_started(now) {
            self.on_start(now);
        }
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        if self.exhausted {
            return;
        }
        let key = ability.variant_key();
        self.remaining.retain(|a| a.variant_key() != key);
    }

    fn is_expired(&self, now: Timestamp) -> bool {
        self.exhausted || self.core.task.is_expired(now)
    }

    fn available_abilities(&mut self, _now: Timestamp) -> AbilityBag {
        if self.exhausted {
            return AbilityBag::new();
        }
        let filtered = self.core.filtered(&self.remaining);
        if filtered.is_empty() {
            self.core.task.expire();
            self.exhausted = true;
            return AbilityBag::new();
        }
        AbilityBag::from_abilities(filtered)
    }
}

/// Casts every resolved ability once, then refills the remaining set and
/// cycles forever.
pub struct CastAllAndRestart {
    core: RequestCore,
    remaining: Vec<Ability>,
}

impl CastAllAndRestart {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        let core = RequestCore::new(sources, resolver, duration);
        let remaining = core.resolved().to_vec();
        Self { core, remaining }
    }
}

impl Request for CastAllAndRestart {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        let key = ability.variant_key();
        self.remaining.retain(|a| a.variant_key() != key);
    }

    fn available_abilities(&mut self, _now: Timestamp) -> AbilityBag {
        let mut filtered = self.core.filtered(&self.remaining);
        if filtered.is_empty() {
            debug!(request = %self.core.task.description(), "cycle complete, refilling");
            self.remaining = self.core.resolved().to_vec();
            filtered = self.core.filtered(&self.remaining);
        }
        AbilityBag::from_abilities(filtered)
    }
}

/// Ordered sequence requiring exact in-order casting. The head is offered
/// unconditionally; out-of-sequence casts are ignored.
pub struct CastStrictSequenceAndExpire {
    core: RequestCore,
    remaining: Vec<Ability>,
}

impl CastStrictSequenceAndExpire {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        let core = RequestCore::new(sources, resolver, duration);
        let remaining = core.resolved().to_vec();
        Self { core, remaining }
    }
}

impl Request for CastStrictSequenceAndExpire {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn on_expire(&mut self, _now: Timestamp) {
        self.remaining = self.core.resolved().to_vec();
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        if let Some(head) = self.remaining.first()
            && head.variant_key() == ability.variant_key()
        {
            self.remaining.remove(0);
        }
        if self.remaining.is_empty() {
            self.core.task.expire();
        }
    }

    fn available_abilities(&mut self, _now: Timestamp) -> AbilityBag {
        match self.remaining.first() {
            Some(head) => AbilityBag::from_abilities([head.clone()]),
            None => {
                self.core.task.expire();
                AbilityBag::new()
            }
        }
    }
}

/// Ordered sequence that skips past filtered-out items instead of blocking
/// on them. A cast of any remaining member advances the sequence past it.
pub struct CastSequenceAndExpire {
    core: RequestCore,
    remaining: Vec<Ability>,
}

impl CastSequenceAndExpire {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        let core = RequestCore::new(sources, resolver, duration);
        let remaining = core.resolved().to_vec();
        Self { core, remaining }
    }
}

impl Request for CastSequenceAndExpire {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn on_expire(&mut self, _now: Timestamp) {
        self.remaining = self.core.resolved().to_vec();
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        let key = ability.variant_key();
        if let Some(idx) = self.remaining.iter().position(|a| a.variant_key() == key) {
            self.remaining.drain(..=idx);
        }
    }

    fn available_abilities(&mut self, _now: Timestamp) -> AbilityBag {
        match self.core.filtered(&self.remaining).into_iter().next() {
            Some(first) => AbilityBag::from_abilities([first]),
            None => {
                self.core.task.expire();
                AbilityBag::new()
            }
        }
    }
}

/// Maintains buffs by offering only candidates whose duration has expired.
pub struct RecastWhenDurationExpired {
    core: RequestCore,
}

impl RecastWhenDurationExpired {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::new(sources, resolver, duration),
        }
    }
}

impl Request for RecastWhenDurationExpired {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        self.core.base_bag().by_duration_expired(now)
    }
}

/// Keeps at most one instance of the effect running across the whole
/// candidate pool. Nothing is offered while any candidate is casting or in
/// duration within `overlap` seconds.
pub struct NonOverlappingDuration {
    core: RequestCore,
    overlap: f64,
}

impl NonOverlappingDuration {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        overlap: f64,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::new(sources, resolver, duration),
            overlap,
        }
    }
}

impl Request for NonOverlappingDuration {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        let all = self.core.base_bag();
        if !all.by_in_duration_or_casting(now + self.overlap).is_empty() {
            return AbilityBag::new();
        }
        all.by_reusable(now).one_of_least_busy_caster(now)
    }
}

/// One non-overlapping instance per caster group, with all MAIN-flagged
/// sub-groups merged into one pool.
pub struct NonOverlappingDurationByGroup {
    core: RequestCore,
    overlap: f64,
}

impl NonOverlappingDurationByGroup {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        overlap: f64,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::new(sources, resolver, duration),
            overlap,
        }
    }

    fn groups_of(bag: &AbilityBag) -> HashSet<GroupId> {
        bag.abilities()
            .iter()
            .map(|a| a.caster().group().merged_main())
            .collect()
    }
}

impl Request for NonOverlappingDurationByGroup {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        let available = self.core.base_bag();
        let available_groups = Self::groups_of(&available);
        let running_groups = Self::groups_of(&available.by_in_duration_or_casting(now + self.overlap));
        let groups_to_cast: Vec<GroupId> = available_groups
            .difference(&running_groups)
            .copied()
            .collect();
        if groups_to_cast.is_empty() {
            return AbilityBag::new();
        }
        // one ability per group, or several would get cast on different casters
        let reusable = self.core.base_bag().by_reusable(now);
        let mut result = AbilityBag::new();
        for group in groups_to_cast {
            let best = reusable
                .abilities()
                .into_iter()
                .filter(|a| a.caster().group().merged_main() == group)
                .max_by_key(|a| a.priority());
            if let Some(ability) = best {
                result.add(ability);
            }
        }
        result
    }
}

/// Casts the single best candidate, by general preference, then expires.
pub struct CastBestAndExpire {
    core: RequestCore,
}

impl CastBestAndExpire {
    pub fn new(
        sources: impl IntoIterator<Item = AbilitySource>,
        resolver: &dyn AbilityResolver,
        duration: f64,
    ) -> Self {
        Self {
            core: RequestCore::new(sources, resolver, duration),
        }
    }
}

impl Request for CastBestAndExpire {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn notify_casting(&mut self, ability: &Ability, _now: Timestamp) {
        if self.core.contains(ability) {
            self.core.task.expire();
        }
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        if self.core.task.is_expired(now) {
            return AbilityBag::new();
        }
        let ready = self.core.base_bag().by_reusable(now);
        if ready.is_empty() {
            return AbilityBag::new();
        }
        let mut castable = AbilityBag::new();
        for (_, abilities) in ready.map_by_caster() {
            let current = abilities
                .abilities()
                .first()
                .and_then(|a| a.caster().last_cast_ability());
            let can_cast = abilities.by_can_override(current.as_ref(), now);
            if !can_cast.is_empty() {
                castable.add_bag(can_cast);
            }
        }
        if castable.is_empty() {
            return AbilityBag::new();
        }
        castable.by_general_preference(now, 1)
    }
}

/// Caches candidates between ticks until one of them is cast. The builder
/// recomputes the set; the cache keeps selection stable while it is valid.
pub struct RequestWithShortCache {
    core: RequestCore,
    cache: Option<Vec<Ability>>,
    cache_keys: HashSet<VariantKey>,
    builder: Box<dyn FnMut(Timestamp) -> Vec<Ability> + Send>,
}

impl RequestWithShortCache {
    pub fn new(
        description: impl Into<String>,
        duration: f64,
        builder: impl FnMut(Timestamp) -> Vec<Ability> + Send + 'static,
    ) -> Self {
        Self {
            core: RequestCore::named(description, duration),
            cache: None,
            cache_keys: HashSet::new(),
            builder: Box::new(builder),
        }
    }

    fn invalidate(&mut self) {
        self.cache = None;
        self.cache_keys.clear();
    }
}

impl Request for RequestWithShortCache {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn is_resolved(&self, ability: &Ability) -> bool {
        self.cache_keys.contains(&ability.variant_key())
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
        let fresh = (self.builder)(now);
        if fresh.is_empty() {
            return AbilityBag::new();
        }
        self.cache_keys = fresh.iter().map(|a| a.variant_key()).collect();
        let filtered = self.core.filtered(&fresh);
        self.cache = Some(fresh);
        AbilityBag::from_abilities(filtered)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use combat_core::{AbilityCensus, AbilityProfile, Caster, CasterId, Roster};

    use super::*;

    fn caster(id: u32, group: GroupId) -> Arc<Caster> {
        Caster::new(CasterId(id), format!("caster{id}"), group, 0)
    }

    fn ability(caster: &Arc<Caster>, id: &str, duration: f64) -> Ability {
        Ability::builder(Arc::clone(caster), id)
            .census(AbilityCensus {
                casting: 1.0,
                reuse: 30.0,
                recovery: 0.3,
                duration,
                ..AbilityCensus::default()
            })
            .profile(AbilityProfile::default())
            .build()
    }

    fn roster_of(abilities: &[Ability]) -> Roster {
        let mut roster = Roster::new();
        for ability in abilities {
            roster.register_ability(ability.clone());
        }
        roster
    }

    fn sources(ids: &[&str]) -> Vec<AbilitySource> {
        ids.iter().map(|id| (*id).into()).collect()
    }

    #[test]
    fn cast_one_expires_after_its_first_cast() {
        let now = Timestamp(50.0);
        let c1 = caster(1, GroupId::MAIN);
        let roster = roster_of(&[ability(&c1, "smite", -1.0)]);
        let mut request = CastOneAndExpire::new(sources(&["smite"]), &roster, 30.0);
        request.start(now);
        request.notify_started(now);

        let bag = request.available_abilities(now);
        assert_eq!(bag.len(), 1);
        let offered = bag.abilities().remove(0);
        request.notify_casting(&offered, now);
        assert!(request.is_expired(now));
        assert!(request.available_abilities(now).is_empty());
    }

    #[test]
    fn periodic_request_goes_quiet_between_periods() {
        let now = Timestamp(50.0);
        let c1 = caster(1, GroupId::MAIN);
        let smite = ability(&c1, "smite", -1.0);
        let roster = roster_of(&[smite.clone()]);
        let mut request =
            CastAnyWhenReadyEveryNSec::new(sources(&["smite"]), &roster, 10.0, 120.0);
        request.start(now);

        assert!(!request.available_abilities(now).is_empty());
        request.notify_casting(&smite, now);
        assert!(request.available_abilities(now + 5.0).is_empty());
        assert!(!request.available_abilities(now + 10.5).is_empty());
    }

    #[test]
    fn cast_all_and_restart_refills_once_drained() {
        let now = Timestamp(0.0);
        let c1 = caster(1, GroupId::MAIN);
        let c2 = caster(2, GroupId::MAIN);
        let first = ability(&c1, "rally", -1.0);
        let second = ability(&c2, "strike", -1.0);
        let roster = roster_of(&[first.clone(), second.clone()]);
        let mut request = CastAllAndRestart::new(sources(&["rally", "strike"]), &roster, 300.0);
        request.start(now);

        assert_eq!(request.available_abilities(now).len(), 2);
        request.notify_casting(&first, now);
        assert_eq!(request.available_abilities(now).len(), 1);
        request.notify_casting(&second, now);
        // the drained cycle refills instead of expiring
        assert_eq!(request.available_abilities(now).len(), 2);
        assert!(!request.is_expired(now));
    }

    #[test]
    fn sequence_advances_past_any_cast_member() {
        let now = Timestamp(0.0);
        let c1 = caster(1, GroupId::MAIN);
        let abilities: Vec<Ability> = ["one", "two", "three"]
            .iter()
            .map(|id| ability(&c1, id, -1.0))
            .collect();
        let roster = roster_of(&abilities);
        let mut request =
            CastSequenceAndExpire::new(sources(&["one", "two", "three"]), &roster, 60.0);
        request.start(now);

        request.notify_casting(&abilities[1], now);
        let bag = request.available_abilities(now);
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.abilities()[0].id().as_str(), "three");
    }

    #[test]
    fn strict_sequence_ignores_out_of_order_casts() {
        let now = Timestamp(0.0);
        let c1 = caster(1, GroupId::MAIN);
        let abilities: Vec<Ability> = ["one", "two"]
            .iter()
            .map(|id| ability(&c1, id, -1.0))
            .collect();
        let roster = roster_of(&abilities);
        let mut request = CastStrictSequenceAndExpire::new(sources(&["one", "two"]), &roster, 60.0);
        request.start(now);

        request.notify_casting(&abilities[1], now);
        let bag = request.available_abilities(now);
        assert_eq!(bag.abilities()[0].id().as_str(), "one");
    }

    #[test]
    fn recast_offers_only_duration_expired_members() {
        let now = Timestamp(0.0);
        let c1 = caster(1, GroupId::MAIN);
        let c2 = caster(2, GroupId::MAIN);
        let buff_a = ability(&c1, "bulwark", 10.0);
        let buff_b = ability(&c2, "bulwark", 10.0);
        let roster = roster_of(&[buff_a.clone(), buff_b.clone()]);
        let mut request = RecastWhenDurationExpired::new(sources(&["bulwark"]), &roster, 600.0);
        request.start(now);

        // never-cast members count as expired and are offered
        assert_eq!(request.available_abilities(now).len(), 2);
        buff_a.cast(now).unwrap();
        assert_eq!(request.available_abilities(now + 5.0).len(), 1);
        assert_eq!(request.available_abilities(now + 11.0).len(), 2);
    }

    #[test]
    fn group_policy_offers_one_per_uncovered_group() {
        let now = Timestamp(0.0);
        let main = caster(1, GroupId::MAIN);
        let second = caster(2, GroupId::SECOND);
        let ward_main = ability(&main, "ward", 10.0);
        let ward_second = ability(&second, "ward", 10.0);
        let roster = roster_of(&[ward_main.clone(), ward_second.clone()]);
        let mut request =
            NonOverlappingDurationByGroup::new(sources(&["ward"]), &roster, 1.0, 600.0);
        request.start(now);

        assert_eq!(request.available_abilities(now).len(), 2);
        ward_main.cast(now).unwrap();
        let bag = request.available_abilities(now + 3.0);
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.abilities()[0].caster().id(), CasterId(2));
    }

    #[test]
    fn composite_unions_only_live_children() {
        let now = Timestamp(0.0);
        let c1 = caster(1, GroupId::MAIN);
        let c2 = caster(2, GroupId::MAIN);
        let rally = ability(&c1, "rally", -1.0);
        let strike = ability(&c2, "strike", -1.0);
        let roster = roster_of(&[rally.clone(), strike.clone()]);
        let short = CastAnyWhenReady::new(sources(&["rally"]), &roster, 5.0);
        let long = CastAnyWhenReady::new(sources(&["strike"]), &roster, 60.0);
        let mut composite = CompositeRequest::new(
            "opening",
            vec![Box::new(short), Box::new(long)],
            None,
        );
        composite.start(now);
        composite.notify_started(now);

        // children were aligned to the longest duration
        assert_eq!(composite.available_abilities(now).len(), 2);
        assert_eq!(composite.available_abilities(now + 30.0).len(), 2);
    }

    #[test]
    fn proxy_gate_silences_the_inner_request() {
        let now = Timestamp(0.0);
        let c1 = caster(1, GroupId::MAIN);
        let rally = ability(&c1, "rally", -1.0);
        let roster = roster_of(&[rally]);
        let mut proxy = DynamicRequestProxy::new("proxied", 60.0);
        proxy.set_request(Some(Box::new(CastAnyWhenReady::new(
            sources(&["rally"]),
            &roster,
            60.0,
        ))));
        proxy.set_gate(|| false);
        proxy.start(now);
        assert!(proxy.available_abilities(now).is_empty());

        proxy.set_gate(|| true);
        assert_eq!(proxy.available_abilities(now).len(), 1);
    }
}
