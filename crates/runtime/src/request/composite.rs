//! Requests that own child requests and cascade lifecycle calls to them.

use combat_core::{Ability, AbilityBag, Filter, Timestamp};

use super::{Request, RequestCore};

fn align_durations(requests: &mut [Box<dyn Request>], duration: Option<f64>) -> f64 {
    let duration = duration.unwrap_or_else(|| {
        requests
            .iter()
            .map(|r| r.core().task().duration())
            .fold(-1.0, f64::max)
    });
    for request in requests.iter_mut() {
        request.core_mut().task_mut().set_duration(duration);
    }
    duration
}

macro_rules! cascade_lifecycle {
    () => {
        fn set_filter(&mut self, filter: Option<Filter>) {
            self.core.set_filter(filter.clone());
            for child in &mut self.children {
                child.set_filter(filter.clone());
            }
        }

        fn is_resolved(&self, ability: &Ability) -> bool {
            self.children.iter().any(|c| c.is_resolved(ability))
        }

        fn start(&mut self, now: Timestamp) {
            self.core.task_mut().start(now);
            for child in &mut self.children {
                child.start(now);
            }
        }

        fn restart(&mut self, now: Timestamp) {
            self.core.task_mut().restart(now);
            for child in &mut self.children {
                child.restart(now);
            }
        }

        fn extend(&mut self, duration: Option<f64>, now: Timestamp) {
            self.core.task_mut().extend(duration, now);
            for child in &mut self.children {
                child.extend(duration, now);
            }
        }

        fn expire(&mut self) {
            self.core.task_mut().expire();
            for child in &mut self.children {
                child.expire();
            }
        }

        fn notify_started(&mut self, now: Timestamp) {
            self.core.task_mut().acknowledge_started(now);
            for child in &mut self.children {
                child.notify_started(now);
            }
        }

        fn notify_expired(&mut self, now: Timestamp) {
            self.core.task_mut().acknowledge_expired(now);
            for child in &mut self.children {
                child.notify_expired(now);
            }
        }

        fn notify_casting(&mut self, ability: &Ability, now: Timestamp) {
            for child in &mut self.children {
                child.notify_casting(ability, now);
            }
        }
    };
}

pub(super) use cascade_lifecycle;

/// Offers the union of all live children's candidates.
pub struct CompositeRequest {
    core: RequestCore,
    children: Vec<Box<dyn Request>>,
}

impl CompositeRequest {
    pub fn new(
        description: impl Into<String>,
        mut children: Vec<Box<dyn Request>>,
        duration: Option<f64>,
    ) -> Self {
        let duration = align_durations(&mut children, duration);
        Self {
            core: RequestCore::named(description, duration),
            children,
        }
    }

    /// Adopts a child mid-flight: it inherits duration and filter, and
    /// starts immediately unless the composite already expired.
    pub fn add_request(&mut self, mut child: Box<dyn Request>, now: Timestamp) {
        child
            .core_mut()
            .task_mut()
            .set_duration(self.core.task().duration());
        child.set_filter(self.core.filter().cloned());
        if !self.core.task().is_expired(now) {
            child.start(now);
            child.notify_started(now);
        }
        self.children.push(child);
    }

    pub fn clear_expired_children(&mut self, now: Timestamp) {
        self.children.retain(|c| !c.is_expired(now));
    }
}

impl Request for CompositeRequest {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    cascade_lifecycle!();

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        let mut result = AbilityBag::new();
        for child in &mut self.children {
            if child.is_expired(now) {
                continue;
            }
            result.add_bag(child.available_abilities(now));
        }
        result
    }
}

/// Offers the first live child's reusable candidates, in declaration order.
/// Later children only get a turn when every earlier one has nothing ready.
pub struct CascadeRequest {
    core: RequestCore,
    children: Vec<Box<dyn Request>>,
}

impl CascadeRequest {
    pub fn new(
        description: impl Into<String>,
        mut children: Vec<Box<dyn Request>>,
        duration: Option<f64>,
    ) -> Self {
        let duration = align_durations(&mut children, duration);
        Self {
            core: RequestCore::named(description, duration),
            children,
        }
    }
}

impl Request for CascadeRequest {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    cascade_lifecycle!();

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        for child in &mut self.children {
            if child.is_expired(now) {
                continue;
            }
            let bag = child.available_abilities(now);
            if bag.is_empty() {
                continue;
            }
            let reusable = bag.by_reusable(now);
            if !reusable.is_empty() {
                return reusable;
            }
        }
        AbilityBag::new()
    }
}

/// Forwards to a swappable target request while keeping its own duration
/// management. An optional gate condition can silence the target.
pub struct DynamicRequestProxy {
    core: RequestCore,
    inner: Option<Box<dyn Request>>,
    gate: Option<Box<dyn Fn() -> bool + Send>>,
}

impl DynamicRequestProxy {
    pub fn new(description: impl Into<String>, duration: f64) -> Self {
        Self {
            core: RequestCore::named(description, duration),
            inner: None,
            gate: None,
        }
    }

    pub fn set_request(&mut self, request: Option<Box<dyn Request>>) {
        if let Some(request) = &request {
            let duration = request.core().task().duration();
            self.core.task_mut().set_duration(duration);
        }
        self.inner = request;
    }

    pub fn set_gate(&mut self, gate: impl Fn() -> bool + Send + 'static) {
        self.gate = Some(Box::new(gate));
    }
}

impl Request for DynamicRequestProxy {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }

    fn set_filter(&mut self, filter: Option<Filter>) {
        self.core.set_filter(filter.clone());
        if let Some(inner) = &mut self.inner {
            inner.set_filter(filter);
        }
    }

    fn is_resolved(&self, ability: &Ability) -> bool {
        self.inner.as_ref().is_some_and(|r| r.is_resolved(ability))
    }

    fn start(&mut self, now: Timestamp) {
        self.core.task_mut().start(now);
        if let Some(inner) = &mut self.inner {
            inner.start(now);
        }
    }

    fn restart(&mut self, now: Timestamp) {
        self.core.task_mut().restart(now);
        if let Some(inner) = &mut self.inner {
            inner.restart(now);
        }
    }

    fn extend(&mut self, duration: Option<f64>, now: Timestamp) {
        self.core.task_mut().extend(duration, now);
        if let Some(inner) = &mut self.inner {
            inner.extend(duration, now);
        }
    }

    fn expire(&mut self) {
        self.core.task_mut().expire();
        if let Some(inner) = &mut self.inner {
            inner.expire();
        }
    }

    fn notify_started(&mut self, now: Timestamp) {
        self.core.task_mut().acknowledge_started(now);
        if let Some(inner) = &mut self.inner {
            inner.notify_started(now);
        }
    }

    fn notify_expired(&mut self, now: Timestamp) {
        self.core.task_mut().acknowledge_expired(now);
        if let Some(inner) = &mut self.inner {
            if !inner.is_expired(now) {
                inner.expire();
            }
            inner.notify_expired(now);
        }
    }

    fn notify_casting(&mut self, ability: &Ability, now: Timestamp) {
        if let Some(inner) = &mut self.inner {
            inner.notify_casting(ability, now);
        }
    }

    fn available_abilities(&mut self, now: Timestamp) -> AbilityBag {
        let Some(inner) = &mut self.inner else {
            return AbilityBag::new();
        };
        if let Some(gate) = &self.gate
            && !gate()
        {
            return AbilityBag::new();
        }
        inner.available_abilities(now)
    }
}
