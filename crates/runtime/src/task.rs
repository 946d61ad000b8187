//! Duration-bounded task lifecycle shared by requests, filters, and hooks.
//!
//! A task moves `NotStarted -> Running -> Expired`, optionally through a
//! start delay, and may be restarted from any state. Notification flags
//! guarantee that start and expiry observers fire exactly once per
//! activation even when the same task participates in several composites.

use combat_core::{Filter, Timestamp};
use tracing::{debug, warn};

/// Lifecycle state for a scheduler-owned unit of work. Negative duration
/// means the task never self-expires.
#[derive(Debug, Clone)]
pub struct Task {
    description: String,
    duration: f64,
    expires_at: Option<Timestamp>,
    next_delay: f64,
    delay_until: Option<Timestamp>,
    forced_expire: bool,
    start_notified: bool,
    expire_notified: bool,
    was_started: bool,
    persistent: bool,
}

impl Task {
    pub fn new(description: impl Into<String>, duration: f64) -> Self {
        Self {
            description: description.into(),
            duration,
            expires_at: None,
            next_delay: 0.0,
            delay_until: None,
            forced_expire: false,
            start_notified: false,
            expire_notified: false,
            was_started: false,
            persistent: false,
        }
    }

    /// Persistent tasks survive [`clear`](crate::ProcessorHandle::clear).
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Applies the next time the duration is started.
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn was_started(&self) -> bool {
        self.was_started
    }

    /// Delays the next `start` by `delay` seconds.
    pub fn delay_next_start(&mut self, delay: f64) {
        self.next_delay = delay;
    }

    pub fn is_in_delay(&self, now: Timestamp) -> bool {
        match self.delay_until {
            Some(until) => now < until,
            None => false,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        if self.forced_expire {
            return true;
        }
        if self.duration < 0.0 {
            return false;
        }
        match self.expires_at {
            Some(at) => now > at,
            None => false,
        }
    }

    pub fn remaining_duration(&self, now: Timestamp) -> Option<f64> {
        if self.is_expired(now) {
            return None;
        }
        let at = self.expires_at?;
        if at < now {
            return None;
        }
        Some(at.since(now))
    }

    fn reset_start_flags(&mut self) {
        self.next_delay = 0.0;
        self.forced_expire = false;
        if self.expire_notified {
            self.start_notified = false;
        }
        self.expire_notified = false;
    }

    pub fn start(&mut self, now: Timestamp) {
        self.was_started = true;
        self.delay_until = Some(now + self.next_delay);
        self.expires_at = Some(now + self.duration + self.next_delay);
        self.reset_start_flags();
    }

    /// Clears expiry and extends the duration without arming a new delay.
    pub fn restart(&mut self, now: Timestamp) {
        self.reset_start_flags();
        self.extend(None, now);
    }

    /// Pushes the expiry further out, never closer in. No-op when the task
    /// is expired, still in its start delay, or was never started.
    pub fn extend(&mut self, duration: Option<f64>, now: Timestamp) {
        if self.is_expired(now) || self.is_in_delay(now) || !self.was_started {
            return;
        }
        let duration = duration.unwrap_or(self.duration);
        let new_expiry = now + duration;
        if self.expires_at.is_none_or(|at| at < new_expiry) {
            self.expires_at = Some(new_expiry);
        }
    }

    pub fn expire(&mut self) {
        self.forced_expire = true;
    }

    /// Records the start notification. Returns whether the observer hook
    /// should fire; repeated calls for one activation return false.
    pub fn acknowledge_started(&mut self, now: Timestamp) -> bool {
        if self.is_in_delay(now) {
            warn!(task = %self.description, "notify_started while still in delay");
        }
        if self.start_notified || self.expire_notified {
            // same task reachable through several composite parents
            debug!(task = %self.description, "start already notified");
            return false;
        }
        self.start_notified = true;
        true
    }

    /// Records the expiry notification. The hook fires only once, and only
    /// for activations that were started.
    pub fn acknowledge_expired(&mut self, now: Timestamp) -> bool {
        if !self.is_expired(now) {
            warn!(task = %self.description, "notify_expired on a live task");
        }
        if self.expire_notified {
            debug!(task = %self.description, "expiry already notified");
            return false;
        }
        if !self.start_notified {
            return false;
        }
        self.expire_notified = true;
        true
    }

    pub fn is_running(&self) -> bool {
        self.start_notified && !self.expire_notified
    }
}

/// A [`Task`] carrying an ability-acceptance predicate. While running, its
/// filter is ANDed into every request's candidate set.
#[derive(Clone)]
pub struct FilterTask {
    task: Task,
    filter: Filter,
}

impl FilterTask {
    pub fn new(filter: Filter, description: impl Into<String>, duration: f64) -> Self {
        Self {
            task: Task::new(description, duration),
            filter,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut Task {
        &mut self.task
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

/// A [`Task`] that runs a callback once when it expires.
pub struct ExpireHook {
    task: Task,
    hook: Box<dyn FnMut() + Send>,
}

impl ExpireHook {
    pub fn new(
        hook: impl FnMut() + Send + 'static,
        description: impl Into<String>,
        duration: f64,
    ) -> Self {
        Self {
            task: Task::new(description, duration),
            hook: Box::new(hook),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut Task {
        &mut self.task
    }

    pub(crate) fn fire(&mut self) {
        (self.hook)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_through_delay_and_expiry() {
        let mut task = Task::new("buff window", 10.0);
        task.delay_next_start(2.0);
        task.start(Timestamp(100.0));

        assert!(task.is_in_delay(Timestamp(101.0)));
        assert!(!task.is_in_delay(Timestamp(102.5)));
        assert!(!task.is_expired(Timestamp(111.0)));
        assert!(task.is_expired(Timestamp(112.5)));
    }

    #[test]
    fn negative_duration_never_self_expires() {
        let mut task = Task::new("standing filter", -1.0);
        task.start(Timestamp(0.0));
        assert!(!task.is_expired(Timestamp(1e9)));
        task.expire();
        assert!(task.is_expired(Timestamp(0.1)));
    }

    #[test]
    fn extend_only_pushes_expiry_later() {
        let mut task = Task::new("t", 10.0);
        task.start(Timestamp(0.0));

        task.extend(Some(5.0), Timestamp(1.0));
        assert!(!task.is_expired(Timestamp(9.0)));

        task.extend(Some(20.0), Timestamp(1.0));
        assert!(!task.is_expired(Timestamp(20.0)));
        assert!(task.is_expired(Timestamp(21.5)));
    }

    #[test]
    fn extend_ignores_expired_delayed_and_unstarted_tasks() {
        let mut never_started = Task::new("t1", 10.0);
        never_started.extend(Some(10.0), Timestamp(0.0));
        assert!(!never_started.was_started());

        let mut expired = Task::new("t2", 1.0);
        expired.start(Timestamp(0.0));
        expired.extend(Some(100.0), Timestamp(5.0));
        assert!(expired.is_expired(Timestamp(5.0)));

        let mut delayed = Task::new("t3", 10.0);
        delayed.delay_next_start(5.0);
        delayed.start(Timestamp(0.0));
        delayed.extend(Some(100.0), Timestamp(1.0));
        assert!(delayed.is_expired(Timestamp(16.0)));
    }

    #[test]
    fn notifications_fire_exactly_once_per_activation() {
        let mut task = Task::new("t", 1.0);
        task.start(Timestamp(0.0));

        assert!(task.acknowledge_started(Timestamp(0.0)));
        assert!(!task.acknowledge_started(Timestamp(0.0)));
        assert!(task.is_running());

        assert!(task.acknowledge_expired(Timestamp(2.0)));
        assert!(!task.acknowledge_expired(Timestamp(2.0)));
        assert!(!task.is_running());

        // restart clears the flags for a new activation
        task.start(Timestamp(10.0));
        assert!(task.acknowledge_started(Timestamp(10.0)));
        assert!(task.acknowledge_expired(Timestamp(12.0)));
    }

    #[test]
    fn expiry_notification_requires_a_started_activation() {
        let mut task = Task::new("t", 1.0);
        task.start(Timestamp(0.0));
        assert!(!task.acknowledge_expired(Timestamp(2.0)));
    }

    #[test]
    fn restart_extends_without_new_delay() {
        let mut task = Task::new("t", 10.0);
        task.start(Timestamp(0.0));
        assert!(task.acknowledge_started(Timestamp(0.5)));

        task.restart(Timestamp(5.0));
        assert!(!task.is_in_delay(Timestamp(5.0)));
        assert!(!task.is_expired(Timestamp(14.0)));
        assert!(task.is_expired(Timestamp(15.5)));
    }
}
