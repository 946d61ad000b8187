//! Static ability data: identity keys, census timings, and behavior flags.
//!
//! Census constants are the base timings as published by the game data; the
//! profile carries the hand-tuned behavior configuration for the scheduler.
//! Both are immutable once an ability is built, all mutable timing state
//! lives in [`SharedTimers`](super::SharedTimers).

use std::fmt;

use bitflags::bitflags;

use crate::caster::CasterId;

/// Identity of an ability template, shared by all casters that know it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityId(pub String);

impl AbilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AbilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AbilityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique key of one caster's ability: all variants of it share timers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityKey {
    pub caster: CasterId,
    pub ability: AbilityId,
}

impl AbilityKey {
    pub fn new(caster: CasterId, ability: AbilityId) -> Self {
        Self { caster, ability }
    }
}

impl fmt::Display for AbilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.caster, self.ability)
    }
}

/// Variant key: one caster's ability pointed at one target. Duration and
/// expiry are tracked per variant; casting/reuse are shared per [`AbilityKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub caster: CasterId,
    pub ability: AbilityId,
    pub target: Option<String>,
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}/{}@{}", self.caster, self.ability, target),
            None => write!(f, "{}/{}", self.caster, self.ability),
        }
    }
}

/// Quality tier of the learned ability, ascending.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, strum::Display, strum::EnumString,
)]
pub enum AbilityTier {
    #[default]
    Apprentice,
    Journeyman,
    Adept,
    Expert,
    Master,
    Grandmaster,
    Ancient,
    Celestial,
}

/// Base timings and classification from the game's ability census.
#[derive(Debug, Clone)]
pub struct AbilityCensus {
    /// Cast time in seconds.
    pub casting: f64,
    /// Recharge time in seconds, counted from the end of casting.
    pub reuse: f64,
    /// Recovery time in seconds after casting completes.
    pub recovery: f64,
    /// Effect duration in seconds; negative means no duration.
    pub duration: f64,
    /// Marked by census as never expiring regardless of duration.
    pub does_not_expire: bool,
    pub beneficial: bool,
    pub max_targets: u32,
    pub tier: AbilityTier,
    pub level: u32,
}

impl Default for AbilityCensus {
    fn default() -> Self {
        Self {
            casting: 0.0,
            reuse: 0.0,
            recovery: 0.0,
            duration: -1.0,
            does_not_expire: false,
            beneficial: true,
            max_targets: 1,
            tier: AbilityTier::default(),
            level: 0,
        }
    }
}

impl AbilityCensus {
    pub fn is_permanent(&self) -> bool {
        self.duration < 0.0 || self.does_not_expire
    }
}

bitflags! {
    /// Behavior switches consulted by cast guards and the scheduler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AbilityFlags: u16 {
        /// Recasting dispels the running instance; reuse folds in duration.
        const MAINTAINED        = 1 << 0;
        /// May be queued while the caster is busy casting something else.
        const CAST_WHEN_CASTING = 1 << 1;
        /// Gated on recovery only, not on the full reuse window.
        const CAST_WHEN_REUSING = 1 << 2;
        /// Only ability-scope effects may modify its timings.
        const CANNOT_MODIFY     = 1 << 3;
        /// Casting it interrupts whatever the caster is doing.
        const CANCEL_SPELLCAST  = 1 << 4;
        const CAST_WHEN_ALIVE   = 1 << 5;
        const CAST_WHEN_DEAD    = 1 << 6;
        const RESURRECT         = 1 << 7;
        const EXPIRE_ON_MOVE    = 1 << 8;
        const EXPIRE_ON_ATTACK  = 1 << 9;
    }
}

/// Hand-tuned scheduler configuration for one ability.
#[derive(Debug, Clone)]
pub struct AbilityProfile {
    pub priority: i64,
    pub priority_adjust: i64,
    /// Extra per-ability cast latency added to the effective casting time.
    pub overhead: f64,
    pub flags: AbilityFlags,
    /// Timer-sharing override: abilities in one upgrade line share reuse.
    pub shared_id: Option<AbilityId>,
}

impl Default for AbilityProfile {
    fn default() -> Self {
        Self {
            priority: 0,
            priority_adjust: 0,
            overhead: 0.0,
            flags: AbilityFlags::CAST_WHEN_ALIVE,
            shared_id: None,
        }
    }
}

impl AbilityProfile {
    pub fn has(&self, flags: AbilityFlags) -> bool {
        self.flags.contains(flags)
    }
}
