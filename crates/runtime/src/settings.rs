//! Runtime-mutable engine settings.
//!
//! Requests and the processor observe these by polling a snapshot each tick,
//! never by reaching into global state. Consumers mutate them through
//! [`SettingsHandle::update`].

use std::sync::{Arc, RwLock};

use combat_core::AbilityId;

/// Engine-wide toggles, initialized once at startup and mutable at runtime.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Master switch for the cast phase of the tick. Task bookkeeping and
    /// effect sweeps keep running while this is off.
    pub enable_casting: bool,
    /// Abilities excluded from every selection, on top of active filters.
    pub disabled_abilities: Vec<AbilityId>,
    /// How long an unconfirmed optimistic cast may stay on the books before
    /// its reuse timer is rolled back.
    pub confirm_grace_secs: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enable_casting: true,
            disabled_abilities: Vec::new(),
            confirm_grace_secs: 2.0,
        }
    }
}

/// Cloneable handle to shared settings.
#[derive(Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<EngineSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> EngineSettings {
        self.inner.read().unwrap().clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut EngineSettings)) {
        let mut settings = self.inner.write().unwrap();
        apply(&mut settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_are_visible_to_later_snapshots() {
        let handle = SettingsHandle::default();
        assert!(handle.snapshot().enable_casting);
        handle.update(|s| s.enable_casting = false);
        assert!(!handle.snapshot().enable_casting);
    }
}
