//! Pure ability-scheduling and combat-decision logic.
//!
//! `combat-core` defines the timer state machine for castable abilities, the
//! scoped effect-modifier engine, the filterable [`AbilityBag`] collection,
//! the declarative combinator algebra ([`Combine`]/[`ResolvedCombine`]), and
//! the target-ranking strategies. Everything here is synchronous and takes
//! time as an explicit [`Timestamp`] argument; the runtime crate owns the
//! clock, the tick loop, and all I/O.
pub mod ability;
pub mod bag;
pub mod caster;
pub mod clock;
pub mod combine;
pub mod constants;
pub mod effect;
pub mod error;
pub mod filter;
pub mod ranking;

pub use ability::{
    Ability, AbilityCensus, AbilityFlags, AbilityId, AbilityKey, AbilityProfile, AbilityTier,
    CastDispatch, CastOutcome, SharedTimerRegistry, SharedTimers, VariantKey,
};
pub use bag::AbilityBag;
pub use caster::{Caster, CasterId, CasterStatus, GroupId, Roster};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use combine::{
    AbilityResolver, AbilitySource, Combine, CombineCondition, CombineReducer, ResolvedCombine,
    VisitResult, conditions,
};
pub use effect::{
    Effect, EffectBuilder, EffectKind, EffectMod, EffectScope, EffectTarget, EffectsManager,
};
pub use error::{DispatchError, EngineError, Result};
pub use filter::Filter;
pub use ranking::{Combatant, RankingByHealNeed, RankingByIncomingDamage, TargetRanking};
