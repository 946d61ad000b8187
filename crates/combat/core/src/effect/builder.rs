//! Reusable effect definitions.
//!
//! An [`EffectBuilder`] is the static description of what a cast grants;
//! [`instantiate`](EffectBuilder::instantiate) stamps out a live [`Effect`]
//! bound to the casting ability.

use crate::ability::Ability;
use crate::clock::Timestamp;
use crate::effect::{Effect, EffectKind, EffectMod, EffectScope, EffectSource};

/// Static definition of an effect an ability grants on cast.
#[derive(Debug, Clone)]
pub struct EffectBuilder {
    name: String,
    scope: EffectScope,
    mods: Vec<(EffectKind, EffectMod)>,
    duration: f64,
}

impl EffectBuilder {
    pub fn new(name: impl Into<String>, scope: EffectScope) -> Self {
        Self {
            name: name.into(),
            scope,
            mods: Vec::new(),
            duration: -1.0,
        }
    }

    /// Lifetime of the instantiated effect in seconds. Non-positive means
    /// it lasts until cancelled.
    pub fn duration(mut self, secs: f64) -> Self {
        self.duration = secs;
        self
    }

    pub fn modify(mut self, kind: EffectKind, step: EffectMod) -> Self {
        self.mods.push((kind, step));
        self
    }

    /// Builds the live effect for a cast of `source`, starting at `starts_at`
    /// (normally the end of the casting window).
    pub fn instantiate(&self, source: &Ability, starts_at: Timestamp) -> Effect {
        Effect::new(
            self.name.clone(),
            self.scope.clone(),
            self.mods.clone(),
            self.duration,
            EffectSource::Caster(source.caster().clone()),
        )
        .with_source_variant(source.variant_key())
        .with_start(starts_at)
    }
}
