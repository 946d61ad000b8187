//! Scoped timing modifiers granted by casts or observed from the game.
//!
//! An [`Effect`] modifies one or more timing values ([`EffectKind`]) for
//! whatever its [`EffectScope`] covers. Scopes are layered: when a value is
//! computed for an ability, applicable effects cascade raid, then group,
//! then player, then ability scope; a `Set` modifier is final and stops the
//! cascade.

mod builder;
mod manager;

use std::fmt;
use std::sync::Arc;

pub use builder::EffectBuilder;
pub use manager::{EffectSweep, EffectsManager};

use crate::ability::{Ability, AbilityKey, VariantKey};
use crate::caster::{Caster, CasterId, CasterStatus};
use crate::clock::Timestamp;

/// Which timing value an effect modifier changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EffectKind {
    Duration,
    BaseCasting,
    BaseReuse,
    CastingSpeed,
    ReuseSpeed,
    RecoverySpeed,
    Priority,
}

/// One modifier step. `Multiply` adds a fraction of the unmodified base, so
/// stacked multipliers accumulate additively instead of compounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectMod {
    Add(f64),
    Multiply(f64),
    /// Forces the value and ends the cascade.
    Set(f64),
}

impl EffectMod {
    /// Applies the step; returns the new value and whether it is final.
    pub fn apply(self, current: f64, base: f64) -> (f64, bool) {
        match self {
            EffectMod::Add(v) => (current + v, false),
            EffectMod::Multiply(v) => (current + base * v, false),
            EffectMod::Set(v) => (v, true),
        }
    }
}

/// What an effect covers, from widest to narrowest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectScope {
    /// Every zoned caster.
    Raid,
    /// Zoned casters grouped with the effect's source.
    Group,
    /// One caster.
    Player(CasterId),
    /// One caster's ability line.
    Ability(AbilityKey),
    /// A non-player combatant.
    NonPlayer(String),
}

impl fmt::Display for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectScope::Raid => f.write_str("raid"),
            EffectScope::Group => f.write_str("group"),
            EffectScope::Player(id) => write!(f, "player:{id}"),
            EffectScope::Ability(key) => write!(f, "ability:{key}"),
            EffectScope::NonPlayer(name) => write!(f, "npc:{name}"),
        }
    }
}

/// The entity a value is being computed for.
#[derive(Clone)]
pub enum EffectTarget {
    Caster(Arc<Caster>),
    Npc(String),
    Ability(Ability),
}

impl EffectTarget {
    pub fn caster(&self) -> Option<&Arc<Caster>> {
        match self {
            EffectTarget::Caster(c) => Some(c),
            EffectTarget::Ability(a) => Some(a.caster()),
            EffectTarget::Npc(_) => None,
        }
    }

    pub fn ability(&self) -> Option<&Ability> {
        match self {
            EffectTarget::Ability(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for EffectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectTarget::Caster(c) => write!(f, "{c}"),
            EffectTarget::Npc(name) => write!(f, "npc:{name}"),
            EffectTarget::Ability(a) => write!(f, "{a}"),
        }
    }
}

/// Who granted an effect.
#[derive(Clone)]
pub enum EffectSource {
    Caster(Arc<Caster>),
    Npc(String),
}

impl EffectSource {
    fn caster(&self) -> Option<&Arc<Caster>> {
        match self {
            EffectSource::Caster(c) => Some(c),
            EffectSource::Npc(_) => None,
        }
    }
}

/// A live (or scheduled) timing modifier.
pub struct Effect {
    name: String,
    scope: EffectScope,
    mods: Vec<(EffectKind, EffectMod)>,
    /// Lifetime in seconds once started; non-positive means until cancelled.
    duration: f64,
    source: EffectSource,
    /// Granting ability variant, when the effect came from a cast.
    source_variant: Option<VariantKey>,
    starts_at: Timestamp,
}

impl Effect {
    pub fn new(
        name: impl Into<String>,
        scope: EffectScope,
        mods: Vec<(EffectKind, EffectMod)>,
        duration: f64,
        source: EffectSource,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            mods,
            duration,
            source,
            source_variant: None,
            starts_at: Timestamp::ZERO,
        }
    }

    pub fn with_source_variant(mut self, variant: VariantKey) -> Self {
        self.source_variant = Some(variant);
        self
    }

    pub fn with_start(mut self, starts_at: Timestamp) -> Self {
        self.starts_at = starts_at;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &EffectScope {
        &self.scope
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn source(&self) -> &EffectSource {
        &self.source
    }

    pub fn source_variant(&self) -> Option<&VariantKey> {
        self.source_variant.as_ref()
    }

    pub fn starts_at(&self) -> Timestamp {
        self.starts_at
    }

    /// Dedup key: one effect per name and scope may be live at a time.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.scope)
    }

    pub fn mods_for(&self, kind: EffectKind) -> impl Iterator<Item = EffectMod> + '_ {
        self.mods
            .iter()
            .filter(move |(k, _)| *k == kind)
            .map(|(_, m)| *m)
    }

    pub fn sourced_by_caster(&self, id: CasterId) -> bool {
        self.source.caster().map(|c| c.id()) == Some(id)
    }

    /// Whether this effect covers `target` right now.
    pub fn applies_to(&self, target: &EffectTarget) -> bool {
        match &self.scope {
            EffectScope::Raid => {
                let Some(source) = self.source.caster() else {
                    return false;
                };
                let Some(target) = target.caster() else {
                    return false;
                };
                source.status() >= CasterStatus::Zoned && target.status() >= CasterStatus::Zoned
            }
            EffectScope::Group => {
                let Some(target_caster) = target.caster() else {
                    return false;
                };
                match self.source.caster() {
                    // an npc-granted group effect follows the target around
                    None => target_caster.status() >= CasterStatus::Zoned,
                    Some(source) => {
                        source.status() >= CasterStatus::Zoned
                            && target_caster.status() >= CasterStatus::Zoned
                            && source.in_group_with(target_caster)
                    }
                }
            }
            EffectScope::Player(id) => target.caster().map(|c| c.id()) == Some(*id),
            EffectScope::Ability(key) => target.ability().map(Ability::key) == Some(key),
            EffectScope::NonPlayer(name) => match target {
                EffectTarget::Npc(npc) => npc == name,
                _ => false,
            },
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("duration", &self.duration)
            .finish()
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
