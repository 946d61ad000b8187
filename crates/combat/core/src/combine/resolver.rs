//! Resolution of [`AbilitySource`]s into concrete ability handles.

use std::collections::HashSet;

use crate::ability::{Ability, AbilityKey};
use crate::caster::Roster;
use crate::combine::AbilitySource;
use crate::filter::Filter;

/// Turns a source into the ability handles it denotes. Group sources are
/// flattened to their leaves.
pub trait AbilityResolver: Send + Sync {
    fn resolve(&self, source: &AbilitySource) -> Vec<Ability>;
}

impl AbilityResolver for Roster {
    fn resolve(&self, source: &AbilitySource) -> Vec<Ability> {
        match source {
            AbilitySource::Id(id) => self.abilities_by_id(id.clone()),
            AbilitySource::Keyed(key) => self
                .abilities()
                .iter()
                .find(|a| a.key() == key)
                .cloned()
                .into_iter()
                .collect(),
            AbilitySource::Group(combine) => combine.resolve(self).abilities(),
        }
    }
}

/// Decorator narrowing another resolver's results with a [`Filter`].
pub struct FilteredResolver<'a> {
    inner: &'a dyn AbilityResolver,
    filter: Filter,
}

impl<'a> FilteredResolver<'a> {
    pub fn new(inner: &'a dyn AbilityResolver, filter: Filter) -> Self {
        Self { inner, filter }
    }
}

impl AbilityResolver for FilteredResolver<'_> {
    fn resolve(&self, source: &AbilitySource) -> Vec<Ability> {
        self.inner
            .resolve(source)
            .into_iter()
            .filter(|a| self.filter.test(a))
            .collect()
    }
}

/// Decorator that retargets and reprioritizes resolved abilities.
///
/// Duplicate handles for the same ability key are collapsed before the
/// variants are produced, so one cast command per key remains.
pub struct VariantResolver<'a> {
    inner: &'a dyn AbilityResolver,
    target: Option<String>,
    priority: Option<i64>,
    priority_adjust: Option<i64>,
}

impl<'a> VariantResolver<'a> {
    pub fn new(inner: &'a dyn AbilityResolver) -> Self {
        Self {
            inner,
            target: None,
            priority: None,
            priority_adjust: None,
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn priority_adjust(mut self, adjust: i64) -> Self {
        self.priority_adjust = Some(adjust);
        self
    }
}

impl AbilityResolver for VariantResolver<'_> {
    fn resolve(&self, source: &AbilitySource) -> Vec<Ability> {
        let mut seen: HashSet<AbilityKey> = HashSet::new();
        self.inner
            .resolve(source)
            .into_iter()
            .filter(|a| seen.insert(a.key().clone()))
            .map(|a| {
                let mut a = a;
                if let Some(target) = &self.target {
                    a = a.with_target(target.clone());
                }
                if let Some(priority) = self.priority {
                    a = a.with_priority(priority);
                }
                if let Some(adjust) = self.priority_adjust {
                    a = a.with_priority_adjust(adjust);
                }
                a
            })
            .collect()
    }
}
