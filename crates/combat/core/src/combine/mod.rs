//! Declarative cast-group algebra.
//!
//! A [`Combine`] describes which abilities belong together and how many of
//! them must hold: `AND` wants every member, `ATLEAST`/`ATMOST`/`EXACT`
//! count members, `XOR` and `OR` are the one-member shorthands. Resolving a
//! combine against an [`AbilityResolver`] produces a [`ResolvedCombine`]
//! bound to concrete ability handles; evaluation walks the tree with a
//! [`CombineCondition`] and yields the abilities to offer.

pub mod conditions;
mod resolver;

use std::fmt;
use std::sync::Arc;

pub use resolver::{AbilityResolver, FilteredResolver, VariantResolver};

use crate::ability::{Ability, AbilityId, AbilityKey};
use crate::clock::Timestamp;
use crate::filter::Filter;

/// How a [`CombineCondition`] judged one member ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    /// Counts toward the quota and is offered for casting.
    Accept,
    /// Counts toward the quota but is not offered.
    AcceptAndSkip,
    /// Not counted either way.
    Ignore,
    /// Does not count; fails an `AND` group.
    Reject,
    /// Fails the whole group immediately.
    RejectAll,
}

/// Per-ability judgement used while evaluating a resolved combine.
pub trait CombineCondition: Send + Sync {
    fn visit(&self, ability: &Ability, now: Timestamp) -> VisitResult;
}

impl<F> CombineCondition for F
where
    F: Fn(&Ability, Timestamp) -> VisitResult + Send + Sync,
{
    fn visit(&self, ability: &Ability, now: Timestamp) -> VisitResult {
        self(ability, now)
    }
}

/// Narrows accepted members down to a group's limit.
pub trait CombineReducer: Send + Sync {
    fn reduce(&self, abilities: Vec<Ability>, limit: usize, now: Timestamp) -> Vec<Ability>;
}

/// Default reducer: the first `limit` accepted members, in tree order.
pub struct FirstUpToLimit;

impl CombineReducer for FirstUpToLimit {
    fn reduce(&self, mut abilities: Vec<Ability>, limit: usize, _now: Timestamp) -> Vec<Ability> {
        abilities.truncate(limit);
        abilities
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    And,
    AtLeast,
    AtMost,
    Exact,
}

impl fmt::Display for CombineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineOp::And => f.write_str("and"),
            CombineOp::AtLeast => f.write_str("atleast"),
            CombineOp::AtMost => f.write_str("atmost"),
            CombineOp::Exact => f.write_str("exact"),
        }
    }
}

/// Where a combine member comes from, before resolution.
#[derive(Debug, Clone)]
pub enum AbilitySource {
    /// Every caster's copy of the ability.
    Id(AbilityId),
    /// One specific caster's copy.
    Keyed(AbilityKey),
    /// A nested group.
    Group(Combine),
}

impl From<AbilityId> for AbilitySource {
    fn from(id: AbilityId) -> Self {
        AbilitySource::Id(id)
    }
}

impl From<&str> for AbilitySource {
    fn from(id: &str) -> Self {
        AbilitySource::Id(id.into())
    }
}

impl From<AbilityKey> for AbilitySource {
    fn from(key: AbilityKey) -> Self {
        AbilitySource::Keyed(key)
    }
}

impl From<Combine> for AbilitySource {
    fn from(combine: Combine) -> Self {
        AbilitySource::Group(combine)
    }
}

/// Unresolved cast-group description.
#[derive(Clone)]
pub struct Combine {
    op: CombineOp,
    limit: usize,
    items: Vec<AbilitySource>,
    reducer: Option<Arc<dyn CombineReducer>>,
}

impl Combine {
    fn new(op: CombineOp, limit: usize, items: impl IntoIterator<Item = AbilitySource>) -> Self {
        Self {
            op,
            limit,
            items: items.into_iter().collect(),
            reducer: None,
        }
    }

    pub fn and(items: impl IntoIterator<Item = AbilitySource>) -> Self {
        Self::new(CombineOp::And, 0, items)
    }

    pub fn at_least(limit: usize, items: impl IntoIterator<Item = AbilitySource>) -> Self {
        Self::new(CombineOp::AtLeast, limit, items)
    }

    pub fn at_most(limit: usize, items: impl IntoIterator<Item = AbilitySource>) -> Self {
        Self::new(CombineOp::AtMost, limit, items)
    }

    pub fn exact(limit: usize, items: impl IntoIterator<Item = AbilitySource>) -> Self {
        Self::new(CombineOp::Exact, limit, items)
    }

    /// One of the members at most.
    pub fn xor(items: impl IntoIterator<Item = AbilitySource>) -> Self {
        Self::at_most(1, items)
    }

    /// At least one of the members.
    pub fn or(items: impl IntoIterator<Item = AbilitySource>) -> Self {
        Self::at_least(1, items)
    }

    pub fn with_reducer(mut self, reducer: Arc<dyn CombineReducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    /// Binds the group to concrete ability handles. A plain member that
    /// resolves to copies on several casters becomes an implicit one-of
    /// group, inheriting this group's reducer.
    pub fn resolve(&self, resolver: &dyn AbilityResolver) -> ResolvedCombine {
        let reducer = self
            .reducer
            .clone()
            .unwrap_or_else(|| Arc::new(FirstUpToLimit));
        let items = self
            .items
            .iter()
            .map(|item| match item {
                AbilitySource::Group(combine) => {
                    let mut child = combine.clone();
                    if child.reducer.is_none() {
                        child.reducer = Some(Arc::clone(&reducer));
                    }
                    ResolvedNode::Group(child.resolve(resolver))
                }
                source => {
                    let mut resolved = resolver.resolve(source);
                    if resolved.len() == 1 {
                        ResolvedNode::Ability(resolved.remove(0))
                    } else {
                        ResolvedNode::Group(ResolvedCombine {
                            op: CombineOp::AtMost,
                            limit: 1,
                            items: resolved.into_iter().map(ResolvedNode::Ability).collect(),
                            reducer: Arc::clone(&reducer),
                        })
                    }
                }
            })
            .collect();
        ResolvedCombine {
            op: self.op,
            limit: self.limit,
            items,
            reducer,
        }
    }
}

impl fmt::Debug for Combine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combine")
            .field("op", &self.op)
            .field("limit", &self.limit)
            .field("items", &self.items.len())
            .finish()
    }
}

enum ResolvedNode {
    Ability(Ability),
    Group(ResolvedCombine),
}

/// A [`Combine`] bound to concrete ability handles.
pub struct ResolvedCombine {
    op: CombineOp,
    limit: usize,
    items: Vec<ResolvedNode>,
    reducer: Arc<dyn CombineReducer>,
}

impl ResolvedCombine {
    /// Every leaf ability in the tree, in order.
    pub fn abilities(&self) -> Vec<Ability> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<Ability>) {
        for item in &self.items {
            match item {
                ResolvedNode::Ability(a) => out.push(a.clone()),
                ResolvedNode::Group(g) => g.collect(out),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Evaluates the tree under `condition`. Returns whether the group's
    /// quota held and the members to offer.
    pub fn get_by_condition(
        &self,
        condition: &dyn CombineCondition,
        now: Timestamp,
    ) -> (bool, Vec<Ability>) {
        self.eval(condition, None, now)
    }

    /// Like [`get_by_condition`](Self::get_by_condition), with a veto filter
    /// applied to leaves; vetoed members are skipped, not counted.
    pub fn get_by_condition_filtered(
        &self,
        condition: &dyn CombineCondition,
        veto: Option<&Filter>,
        now: Timestamp,
    ) -> (bool, Vec<Ability>) {
        self.eval(condition, veto, now)
    }

    fn eval(
        &self,
        condition: &dyn CombineCondition,
        veto: Option<&Filter>,
        now: Timestamp,
    ) -> (bool, Vec<Ability>) {
        let mut offered: Vec<Ability> = Vec::new();
        let mut count = 0usize;
        let mut quota_met = false;
        for item in &self.items {
            match item {
                ResolvedNode::Ability(ability) => {
                    if let Some(veto) = veto {
                        if !veto.test(ability) {
                            continue;
                        }
                    }
                    match condition.visit(ability, now) {
                        VisitResult::Accept => {
                            count += 1;
                            offered.push(ability.clone());
                        }
                        VisitResult::AcceptAndSkip => count += 1,
                        VisitResult::Ignore => {}
                        VisitResult::Reject => {
                            if self.op == CombineOp::And {
                                return (false, Vec::new());
                            }
                        }
                        VisitResult::RejectAll => return (false, Vec::new()),
                    }
                }
                ResolvedNode::Group(group) => {
                    let (ok, members) = group.eval(condition, veto, now);
                    if ok {
                        count += 1;
                        offered.extend(members);
                    } else if self.op == CombineOp::And {
                        return (false, Vec::new());
                    }
                }
            }
            quota_met = match self.op {
                CombineOp::And => count > 0,
                // a single member satisfies an at-most group even when more
                // follow; the reducer trims the overshoot
                CombineOp::AtMost => count >= 1,
                CombineOp::AtLeast | CombineOp::Exact => count >= self.limit,
            };
        }
        if !quota_met {
            return (false, Vec::new());
        }
        let offered = match self.op {
            CombineOp::AtMost | CombineOp::Exact => {
                self.reducer.reduce(offered, self.limit, now)
            }
            _ => offered,
        };
        (true, offered)
    }
}

impl fmt::Debug for ResolvedCombine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCombine")
            .field("op", &self.op)
            .field("limit", &self.limit)
            .field("items", &self.items.len())
            .finish()
    }
}
