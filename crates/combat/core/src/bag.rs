//! A filterable collection of ability handles with ranking operators.
//!
//! Bags nest: a bag holds leaf abilities plus child bags, and an optional
//! [`Filter`] applied lazily whenever contents are read. All ranking
//! operators work on the filtered view and return new flat bags, so they
//! chain without mutating the source.

use std::collections::HashMap;

use crate::ability::{Ability, VariantKey};
use crate::caster::CasterId;
use crate::clock::Timestamp;
use crate::constants::{
    ABILITY_CASTING_SAFETY, ABILITY_REUSE_SAFETY, PERMANENT_DURATION_SCORE, READYUP_MIN_PERIOD,
};
use crate::filter::Filter;

#[derive(Clone, Default)]
pub struct AbilityBag {
    abilities: Vec<Ability>,
    children: Vec<AbilityBag>,
    filter: Option<Filter>,
}

impl AbilityBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_abilities(abilities: impl IntoIterator<Item = Ability>) -> Self {
        Self {
            abilities: abilities.into_iter().collect(),
            children: Vec::new(),
            filter: None,
        }
    }

    pub fn add(&mut self, ability: Ability) {
        self.abilities.push(ability);
    }

    pub fn add_bag(&mut self, child: AbilityBag) {
        self.children.push(child);
    }

    pub fn set_filter(&mut self, filter: Option<Filter>) {
        self.filter = filter;
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The filtered view: own leaves plus every child's view, all narrowed
    /// by this bag's filter.
    pub fn abilities(&self) -> Vec<Ability> {
        let mut out: Vec<Ability> = Vec::new();
        let passes = |a: &Ability| self.filter.as_ref().is_none_or(|f| f.test(a));
        out.extend(self.abilities.iter().filter(|a| passes(a)).cloned());
        for child in &self.children {
            out.extend(child.abilities().into_iter().filter(|a| passes(a)));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.abilities().is_empty()
    }

    pub fn len(&self) -> usize {
        self.abilities().len()
    }

    /// Groups the view by caster, deduplicating identical variants within
    /// each caster; a later duplicate replaces the earlier one. Casters keep
    /// the order they first appear in the view.
    pub fn map_by_caster(&self) -> Vec<(CasterId, AbilityBag)> {
        let mut order: Vec<CasterId> = Vec::new();
        let mut grouped: HashMap<CasterId, Vec<Ability>> = HashMap::new();
        let mut seen: HashMap<VariantKey, (CasterId, usize)> = HashMap::new();
        for ability in self.abilities() {
            let caster = ability.caster().id();
            let key = ability.variant_key();
            match seen.get(&key) {
                Some((owner, index)) => {
                    if let Some(slot) = grouped.get_mut(owner).and_then(|l| l.get_mut(*index)) {
                        *slot = ability.clone();
                    }
                }
                None => {
                    if !grouped.contains_key(&caster) {
                        order.push(caster);
                    }
                    let list = grouped.entry(caster).or_default();
                    seen.insert(key, (caster, list.len()));
                    list.push(ability);
                }
            }
        }
        order
            .into_iter()
            .map(|id| {
                let list = grouped.remove(&id).unwrap_or_default();
                (id, AbilityBag::from_abilities(list))
            })
            .collect()
    }

    /// Abilities of the single least busy caster represented in the view.
    /// Ties keep the caster seen first, so repeated calls at the same time
    /// agree on the winner.
    pub fn one_of_least_busy_caster(&self, now: Timestamp) -> AbilityBag {
        let mut grouped = self.map_by_caster();
        let mut best: Option<usize> = None;
        for (index, (_, bag)) in grouped.iter().enumerate() {
            let Some(candidate) = bag.abilities().first().cloned() else {
                continue;
            };
            match best {
                None => best = Some(index),
                Some(current) => {
                    let current_caster = grouped[current].1.abilities()[0].caster().clone();
                    if current_caster.is_busier_than(candidate.caster(), now) {
                        best = Some(index);
                    }
                }
            }
        }
        match best {
            Some(index) => grouped.swap_remove(index).1,
            None => AbilityBag::new(),
        }
    }

    /// All abilities sharing the maximum effective priority.
    pub fn by_max_priority(&self) -> AbilityBag {
        let scored: Vec<(i64, Ability)> =
            self.abilities().into_iter().map(|a| (a.priority(), a)).collect();
        let Some(max) = scored.iter().map(|(p, _)| *p).max() else {
            return AbilityBag::new();
        };
        AbilityBag::from_abilities(
            scored
                .into_iter()
                .filter(|(p, _)| *p == max)
                .map(|(_, a)| a),
        )
    }

    /// Abilities with priority within `range` below the view's maximum.
    pub fn by_priority_in_range(&self, range: i64) -> AbilityBag {
        let scored: Vec<(i64, Ability)> =
            self.abilities().into_iter().map(|a| (a.priority(), a)).collect();
        let Some(max) = scored.iter().map(|(p, _)| *p).max() else {
            return AbilityBag::new();
        };
        AbilityBag::from_abilities(
            scored
                .into_iter()
                .filter(|(p, _)| *p >= max - range)
                .map(|(_, a)| a),
        )
    }

    /// All abilities sharing the shortest casting time.
    pub fn by_shortest_cast_time(&self) -> AbilityBag {
        let scored: Vec<(f64, Ability)> = self
            .abilities()
            .into_iter()
            .map(|a| (a.casting_secs(), a))
            .collect();
        let Some(min) = scored
            .iter()
            .map(|(c, _)| *c)
            .min_by(|a, b| a.total_cmp(b))
        else {
            return AbilityBag::new();
        };
        AbilityBag::from_abilities(
            scored
                .into_iter()
                .filter(|(c, _)| *c == min)
                .map(|(_, a)| a),
        )
    }

    pub fn by_reusable(&self, now: Timestamp) -> AbilityBag {
        AbilityBag::from_abilities(
            self.abilities().into_iter().filter(|a| a.is_reusable(now)),
        )
    }

    pub fn by_duration_expired(&self, now: Timestamp) -> AbilityBag {
        AbilityBag::from_abilities(
            self.abilities()
                .into_iter()
                .filter(|a| a.is_duration_expired(now)),
        )
    }

    pub fn by_in_duration_or_casting(&self, now: Timestamp) -> AbilityBag {
        AbilityBag::from_abilities(
            self.abilities()
                .into_iter()
                .filter(|a| a.is_in_duration_or_casting(now)),
        )
    }

    /// Abilities allowed to take over from `current`, a caster's in-flight
    /// cast.
    pub fn by_can_override(&self, current: Option<&Ability>, now: Timestamp) -> AbilityBag {
        AbilityBag::from_abilities(
            self.abilities()
                .into_iter()
                .filter(|a| a.is_overriding(current, now)),
        )
    }

    /// The `count` generally most worthwhile abilities to cast next.
    ///
    /// Prefers abilities whose duration has run out; scores the rest by how
    /// much uptime a cast buys (duration plus recharge period) per second
    /// of casting, shaded by relative priority.
    pub fn by_general_preference(&self, now: Timestamp, count: usize) -> AbilityBag {
        let all = self.abilities();
        if all.is_empty() {
            return AbilityBag::new();
        }
        let expired: Vec<Ability> = all
            .iter()
            .filter(|a| a.is_duration_expired(now))
            .cloned()
            .collect();
        let pool = if expired.is_empty() { all } else { expired };

        let priorities: Vec<i64> = pool.iter().map(|a| a.priority()).collect();
        let min = priorities.iter().copied().min().unwrap_or(0);
        let max = priorities.iter().copied().max().unwrap_or(0);
        let spread = (max - min) as f64;

        let mut scored: Vec<(f64, Ability)> = pool
            .into_iter()
            .zip(priorities)
            .map(|(a, priority)| {
                let factor = ((priority - min) as f64 / (spread + 1.0)) * 0.5 + 0.5;
                let duration = if a.duration_secs() < 0.0 {
                    PERMANENT_DURATION_SCORE
                } else {
                    a.duration_secs()
                };
                let period =
                    (a.census().reuse + ABILITY_REUSE_SAFETY).max(READYUP_MIN_PERIOD);
                let casting = a.census().casting + ABILITY_CASTING_SAFETY;
                (factor * (duration + period) / casting, a)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        AbilityBag::from_abilities(scored.into_iter().take(count).map(|(_, a)| a))
    }
}

impl FromIterator<Ability> for AbilityBag {
    fn from_iter<T: IntoIterator<Item = Ability>>(iter: T) -> Self {
        AbilityBag::from_abilities(iter)
    }
}
