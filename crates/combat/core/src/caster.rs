//! Actor roster: who can cast, how busy they are, and how they group up.
//!
//! A [`Caster`] is the engine-side view of one controlled character. Busyness
//! is derived, not stored: a caster is busy while its last cast ability has
//! not cleared recovery. The [`Roster`] owns all casters and their registered
//! abilities and doubles as the standard ability resolver.

use std::fmt;
use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::ability::{Ability, AbilityId};
use crate::clock::Timestamp;

/// Stable identifier of a caster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CasterId(pub u32);

impl fmt::Display for CasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caster#{}", self.0)
    }
}

bitflags! {
    /// Group membership flags. Sub-groups carrying [`GroupId::MAIN`] are
    /// treated as one logical group by per-group policies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct GroupId: u8 {
        const MAIN   = 1 << 0;
        const FIRST  = 1 << 1;
        const SECOND = 1 << 2;
        const THIRD  = 1 << 3;
    }
}

impl GroupId {
    /// Collapses all MAIN-flagged sub-groups into plain MAIN.
    pub fn merged_main(self) -> GroupId {
        if self.contains(GroupId::MAIN) {
            GroupId::MAIN
        } else {
            self
        }
    }

    pub fn is_same_group(self, other: GroupId) -> bool {
        self.merged_main() == other.merged_main()
    }
}

/// Connection/zone state of a caster, in ascending order of readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum CasterStatus {
    Offline,
    Online,
    Zoned,
}

#[derive(Debug)]
struct CasterState {
    status: CasterStatus,
    alive: bool,
    zone: String,
    group: GroupId,
    last_cast: Option<Ability>,
    last_interrupt: Timestamp,
}

/// One controlled character. Cheap to share via `Arc`; mutable status lives
/// behind an internal mutex so abilities and the scheduler see one view.
pub struct Caster {
    id: CasterId,
    name: String,
    /// Static tie-breaker for busyness comparisons between idle casters.
    class_business: u32,
    state: Mutex<CasterState>,
}

impl Caster {
    pub fn new(id: CasterId, name: impl Into<String>, group: GroupId, class_business: u32) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            class_business,
            state: Mutex::new(CasterState {
                status: CasterStatus::Zoned,
                alive: true,
                zone: String::new(),
                group,
                last_cast: None,
                last_interrupt: Timestamp(f64::MIN),
            }),
        })
    }

    pub fn id(&self) -> CasterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> CasterStatus {
        self.state.lock().unwrap().status
    }

    pub fn set_status(&self, status: CasterStatus) {
        self.state.lock().unwrap().status = status;
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().unwrap().alive
    }

    pub fn set_alive(&self, alive: bool) {
        self.state.lock().unwrap().alive = alive;
    }

    pub fn zone(&self) -> String {
        self.state.lock().unwrap().zone.clone()
    }

    pub fn set_zone(&self, zone: impl Into<String>) {
        self.state.lock().unwrap().zone = zone.into();
    }

    pub fn group(&self) -> GroupId {
        self.state.lock().unwrap().group
    }

    pub fn set_group(&self, group: GroupId) {
        self.state.lock().unwrap().group = group;
    }

    pub fn in_group_with(&self, other: &Caster) -> bool {
        self.group().is_same_group(other.group())
    }

    pub fn last_cast_ability(&self) -> Option<Ability> {
        self.state.lock().unwrap().last_cast.clone()
    }

    pub fn set_last_cast_ability(&self, ability: Option<Ability>) {
        self.state.lock().unwrap().last_cast = ability;
    }

    /// Busy while the last cast ability has not cleared its recovery window.
    pub fn is_busy(&self, now: Timestamp) -> bool {
        let last_cast = self.last_cast_ability();
        match last_cast {
            Some(ability) => !ability.is_after_recovery(now),
            None => false,
        }
    }

    /// Ordering used by least-busy selection: a busy caster outranks an idle
    /// one; between equally busy casters the static class weight decides.
    pub fn is_busier_than(&self, other: &Caster, now: Timestamp) -> bool {
        let self_busy = self.is_busy(now);
        if self_busy == other.is_busy(now) {
            return self.class_business > other.class_business;
        }
        self_busy
    }

    /// Propagates an interrupt to the in-flight cast. Rapid repeats within
    /// one second are collapsed, the log parser tends to emit bursts.
    pub fn interrupted(&self, now: Timestamp) {
        let last_cast = {
            let mut state = self.state.lock().unwrap();
            if now.since(state.last_interrupt) < 1.0 {
                return;
            }
            state.last_interrupt = now;
            state.last_cast.clone()
        };
        if let Some(ability) = last_cast {
            ability.interrupted(now);
        }
    }
}

impl PartialEq for Caster {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Caster {}

impl fmt::Debug for Caster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caster")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for Caster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Registry of all casters and their abilities.
#[derive(Default)]
pub struct Roster {
    casters: Vec<Arc<Caster>>,
    abilities: Vec<Ability>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_caster(&mut self, caster: Arc<Caster>) {
        if !self.casters.iter().any(|c| c.id() == caster.id()) {
            self.casters.push(caster);
        }
    }

    pub fn register_ability(&mut self, ability: Ability) {
        self.add_caster(ability.caster().clone());
        self.abilities.push(ability);
    }

    pub fn casters(&self) -> &[Arc<Caster>] {
        &self.casters
    }

    pub fn abilities(&self) -> &[Ability] {
        &self.abilities
    }

    pub fn caster_by_name(&self, name: &str) -> Option<&Arc<Caster>> {
        self.casters.iter().find(|c| c.name() == name)
    }

    /// All registered abilities with the given id, across casters.
    pub fn abilities_by_id(&self, id: AbilityId) -> Vec<Ability> {
        self.abilities
            .iter()
            .filter(|a| a.id() == &id)
            .cloned()
            .collect()
    }

    /// Names of casters currently in the given zone.
    pub fn caster_names_in_zone(&self, zone: &str) -> Vec<String> {
        self.casters
            .iter()
            .filter(|c| c.zone() == zone && c.status() >= CasterStatus::Online)
            .map(|c| c.name().to_string())
            .collect()
    }
}
