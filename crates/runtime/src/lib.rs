//! Async scheduling runtime on top of [`combat_core`].
//!
//! Responsibilities:
//! - Task lifecycle: delayed starts, durations, exactly-once start and
//!   expiry notifications ([`task`])
//! - Cast request policies, from one-shot casts to target-ranked rotations
//!   ([`request`])
//! - The tick loop: lane bookkeeping, the per-caster cast pipeline, and the
//!   async worker that owns it all ([`processor`])
//! - Topic-based event publication for observers ([`events`])
//! - Runtime-tunable settings shared with the worker ([`settings`])
//! - Persistence of shared reuse timers and waypoint maps ([`store`])

pub mod error;
pub mod events;
pub mod processor;
pub mod request;
pub mod settings;
pub mod store;
pub mod task;

pub use error::{Result, RuntimeError, StoreError};
pub use events::{AbilityEvent, EffectEvent, Event, EventBus, SchedulerEvent, Topic};
pub use processor::{Command, ProcessorHandle, ProcessorWorker, TaskController, TickReport, spawn};
pub use request::{
    BattlefieldSource, CascadeRequest, CastAllAndExpire, CastAllAndExpirePermanently,
    CastAllAndRestart, CastAnyWhenReady, CastAnyWhenReadyEveryNSec, CastBestAndExpire,
    CastNAndExpire, CastOneAndExpire, CastSequenceAndExpire, CastStrictSequenceAndExpire,
    CompositeRequest, DynamicRequestProxy, NonOverlappingDuration, NonOverlappingDurationByGroup,
    NonOverlappingDurationReducer, RecastMode, RecastWhenDurationExpired, Request, RequestCombine,
    RequestCore, RequestWithShortCache, RotationWithTargetRanking,
};
pub use settings::{EngineSettings, SettingsHandle};
pub use store::{GraphStore, TimerStore};
pub use task::{ExpireHook, FilterTask, Task};
