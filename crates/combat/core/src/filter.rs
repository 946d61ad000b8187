//! Composable ability predicates.
//!
//! A [`Filter`] is a cheap-to-clone predicate over [`Ability`] handles.
//! Scheduler tasks install filters to narrow which abilities a request may
//! offer; combinators build them up with [`and`](Filter::and),
//! [`or`](Filter::or) and [`not`](Filter::not). Each filter carries a label
//! so installed filter stacks show up readably in logs.

use std::fmt;
use std::sync::Arc;

use crate::ability::{Ability, AbilityFlags, AbilityId};
use crate::caster::CasterId;

type Predicate = dyn Fn(&Ability) -> bool + Send + Sync;

#[derive(Clone)]
pub struct Filter {
    label: Arc<str>,
    predicate: Arc<Predicate>,
}

impl Filter {
    pub fn new(
        label: impl Into<String>,
        predicate: impl Fn(&Ability) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into().into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn test(&self, ability: &Ability) -> bool {
        (self.predicate)(ability)
    }

    pub fn accept_all() -> Self {
        Self::new("all", |_| true)
    }

    pub fn accept_none() -> Self {
        Self::new("none", |_| false)
    }

    pub fn and(self, other: Filter) -> Filter {
        let label = format!("({} & {})", self.label, other.label);
        Filter::new(label, move |a| self.test(a) && other.test(a))
    }

    pub fn or(self, other: Filter) -> Filter {
        let label = format!("({} | {})", self.label, other.label);
        Filter::new(label, move |a| self.test(a) || other.test(a))
    }

    pub fn not(self) -> Filter {
        let label = format!("!{}", self.label);
        Filter::new(label, move |a| !self.test(a))
    }

    /// Conjunction of all given filters; empty input accepts everything.
    pub fn and_all(filters: impl IntoIterator<Item = Filter>) -> Filter {
        filters
            .into_iter()
            .fold(Filter::accept_all(), |acc, f| acc.and(f))
    }

    // ------------------------------------------------------------------
    // Common filters.
    // ------------------------------------------------------------------

    pub fn by_caster(id: CasterId) -> Filter {
        Filter::new(format!("caster={id}"), move |a| a.caster().id() == id)
    }

    pub fn by_caster_name(name: impl Into<String>) -> Filter {
        let name = name.into();
        Filter::new(format!("caster={name}"), move |a| a.caster().name() == name)
    }

    pub fn by_id(id: impl Into<AbilityId>) -> Filter {
        let id = id.into();
        Filter::new(format!("ability={id}"), move |a| a.id() == &id)
    }

    pub fn by_ids(ids: impl IntoIterator<Item = AbilityId>) -> Filter {
        let ids: Vec<AbilityId> = ids.into_iter().collect();
        Filter::new("ability-set", move |a| ids.contains(a.id()))
    }

    pub fn by_target(target: impl Into<String>) -> Filter {
        let target = target.into();
        Filter::new(format!("target={target}"), move |a| {
            a.target() == Some(target.as_str())
        })
    }

    pub fn by_min_priority(min: i64) -> Filter {
        Filter::new(format!("priority>={min}"), move |a| a.priority() >= min)
    }

    pub fn by_flags(flags: AbilityFlags) -> Filter {
        Filter::new(format!("flags={flags:?}"), move |a| {
            a.profile().flags.contains(flags)
        })
    }

    pub fn beneficial() -> Filter {
        Filter::new("beneficial", |a| a.census().beneficial)
    }

    /// Caster is zoned and the ability is allowed in its life state.
    pub fn permitted_caster_state() -> Filter {
        Filter::new("permitted", |a| a.is_permitted_in_caster_state())
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({})", self.label)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::AbilityCensus;
    use crate::caster::{Caster, CasterStatus, GroupId};

    fn ability(caster_id: u32, id: &str) -> Ability {
        let caster = Caster::new(
            CasterId(caster_id),
            format!("caster{caster_id}"),
            GroupId::MAIN,
            0,
        );
        Ability::builder(caster, id)
            .census(AbilityCensus::default())
            .build()
    }

    #[test]
    fn combinators_compose() {
        let a = ability(1, "smite");
        let b = ability(2, "smite");
        let f = Filter::by_caster(CasterId(1)).and(Filter::by_id("smite"));
        assert!(f.test(&a));
        assert!(!f.test(&b));
        assert!(f.clone().not().test(&b));
        assert!(Filter::by_caster(CasterId(2))
            .or(Filter::by_caster(CasterId(1)))
            .test(&a));
    }

    #[test]
    fn and_all_of_nothing_accepts() {
        let a = ability(1, "smite");
        assert!(Filter::and_all([]).test(&a));
        assert!(!Filter::and_all([Filter::accept_none()]).test(&a));
    }

    #[test]
    fn permitted_caster_state_follows_status_and_life() {
        let a = ability(1, "smite");
        let f = Filter::permitted_caster_state();
        assert!(f.test(&a));
        a.caster().set_alive(false);
        assert!(!f.test(&a));
        a.caster().set_alive(true);
        a.caster().set_status(CasterStatus::Online);
        assert!(!f.test(&a));
    }

    #[test]
    fn labels_render_composition() {
        let f = Filter::by_caster(CasterId(1)).and(Filter::beneficial().not());
        assert_eq!(f.to_string(), "(caster=caster#1 & !beneficial)");
    }
}
