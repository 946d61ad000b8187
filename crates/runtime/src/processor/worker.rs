//! Async ownership of the scheduler: one task owns the [`TaskController`]
//! and serializes ticks against commands with `select!`.

use std::sync::Arc;
use std::time::Duration;

use combat_core::constants::{MAX_ERROR_COUNT, PROCESSOR_TICK};
use combat_core::{
    Ability, AbilityId, AbilityKey, CasterId, Clock, EffectsManager, Filter, Roster, Timestamp,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::TaskController;
use crate::error::{Result, RuntimeError};
use crate::events::{AbilityEvent, EffectEvent, Event, EventBus, SchedulerEvent, Topic};
use crate::request::Request;
use crate::settings::SettingsHandle;
use crate::task::{ExpireHook, FilterTask};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 100;

/// Extra wait after a tick with dispatch failures, so a flapping client
/// gets room to recover before the next attempt.
const FAILURE_BACKOFF_SECS: f64 = 2.0;

pub enum Command {
    RunRequest {
        request: Box<dyn Request>,
        immediate: bool,
        reply: oneshot::Sender<()>,
    },
    RunFilter {
        filter: FilterTask,
    },
    RunHook {
        hook: ExpireHook,
    },
    Pause {
        reply: oneshot::Sender<bool>,
    },
    Resume {
        reply: oneshot::Sender<bool>,
    },
    Clear,
    ConfirmCasting {
        key: AbilityKey,
        when: Timestamp,
        completed: bool,
        reply: oneshot::Sender<bool>,
    },
    CasterDeath {
        caster: CasterId,
    },
}

/// Owns the controller and every shared engine collaborator for the life of
/// the scheduler. Dropped when the command channel closes.
pub struct ProcessorWorker {
    tasks: TaskController,
    roster: Arc<Roster>,
    effects: Arc<EffectsManager>,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<Command>,
    events: EventBus,
    settings: SettingsHandle,
    paused: bool,
    error_streak: u32,
    pending_confirms: Vec<(Ability, Timestamp)>,
}

/// Starts the scheduler worker and returns a cloneable handle to it.
pub fn spawn(
    roster: Arc<Roster>,
    effects: Arc<EffectsManager>,
    clock: Arc<dyn Clock>,
    settings: SettingsHandle,
) -> (ProcessorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let events = EventBus::with_capacity(EVENT_BUFFER);
    let worker = ProcessorWorker {
        tasks: TaskController::new(),
        roster,
        effects,
        clock,
        commands: rx,
        events: events.clone(),
        settings,
        paused: false,
        error_streak: 0,
        pending_confirms: Vec::new(),
    };
    let join = tokio::spawn(worker.run());
    (ProcessorHandle { tx, events }, join)
}

impl ProcessorWorker {
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(PROCESSOR_TICK));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("scheduler worker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.on_tick() {
                        TickVerdict::Ok => {}
                        TickVerdict::Failing => {
                            tokio::time::sleep(Duration::from_secs_f64(FAILURE_BACKOFF_SECS))
                                .await;
                        }
                        TickVerdict::Stop => break,
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("command channel closed, stopping worker");
                            break;
                        }
                    }
                }
            }
        }
        info!("scheduler worker stopped");
    }

    fn on_tick(&mut self) -> TickVerdict {
        let now = self.clock.now();
        for description in self.tasks.prepare(now) {
            self.events
                .publish(Event::Scheduler(SchedulerEvent::RequestExpired {
                    description,
                }));
        }
        let sweep = self.effects.sweep(now);
        for effect in sweep.started {
            self.events.publish(Event::Effect(EffectEvent::Started {
                effect: effect.key(),
            }));
        }
        for effect in sweep.expired {
            self.events.publish(Event::Effect(EffectEvent::Expired {
                effect: effect.key(),
            }));
        }
        let settings = self.settings.snapshot();
        self.revoke_stale_casts(settings.confirm_grace_secs, now);
        if self.paused || !settings.enable_casting {
            return TickVerdict::Ok;
        }
        let veto = Self::veto_filter(&settings.disabled_abilities);
        let report = self.tasks.process(now, veto, None);
        for ability in &report.casts {
            self.pending_confirms.push((ability.clone(), now));
            self.events.publish(Event::Ability(AbilityEvent::Cast {
                ability: ability.to_string(),
            }));
        }
        if report.failures == 0 {
            self.error_streak = 0;
            return TickVerdict::Ok;
        }
        self.error_streak += 1;
        if self.error_streak >= MAX_ERROR_COUNT {
            error!(streak = self.error_streak, "too many failing ticks, stopping scheduler");
            self.events
                .publish(Event::Scheduler(SchedulerEvent::Stopped {
                    reason: "consecutive cast failures".to_owned(),
                }));
            return TickVerdict::Stop;
        }
        warn!(streak = self.error_streak, "tick had cast failures");
        TickVerdict::Failing
    }

    fn veto_filter(disabled: &[AbilityId]) -> Option<Filter> {
        if disabled.is_empty() {
            return None;
        }
        Some(Filter::by_ids(disabled.iter().cloned()).not())
    }

    /// Rolls back optimistic casts that outlived the confirmation grace
    /// window without an observation from the client.
    fn revoke_stale_casts(&mut self, grace: f64, now: Timestamp) {
        let mut index = 0;
        while index < self.pending_confirms.len() {
            let (_, cast_at) = &self.pending_confirms[index];
            if now.since(*cast_at) <= grace {
                index += 1;
                continue;
            }
            let (ability, _) = self.pending_confirms.remove(index);
            if ability.revoke_last_cast_if_not_confirmed(grace, now) {
                warn!(ability = %ability, "cast never confirmed, reuse rolled back");
                self.events
                    .publish(Event::Ability(AbilityEvent::CastRevoked {
                        ability: ability.to_string(),
                    }));
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        let now = self.clock.now();
        match command {
            Command::RunRequest {
                request,
                immediate,
                reply,
            } => {
                let description = request.description();
                self.tasks.add_request(request, now);
                if immediate && !self.paused && !self.tasks.request_in_delay(&description, now) {
                    for expired in self.tasks.prepare(now) {
                        self.events
                            .publish(Event::Scheduler(SchedulerEvent::RequestExpired {
                                description: expired,
                            }));
                    }
                    let settings = self.settings.snapshot();
                    if settings.enable_casting {
                        let veto = Self::veto_filter(&settings.disabled_abilities);
                        let report = self.tasks.process(now, veto, Some(&description));
                        for ability in &report.casts {
                            self.pending_confirms.push((ability.clone(), now));
                            self.events.publish(Event::Ability(AbilityEvent::Cast {
                                ability: ability.to_string(),
                            }));
                        }
                    }
                }
                if reply.send(()).is_err() {
                    debug!("reply channel closed for request command");
                }
            }
            Command::RunFilter { filter } => {
                self.tasks.add_filter(filter, now);
            }
            Command::RunHook { hook } => {
                self.tasks.add_hook(hook, now);
            }
            Command::Pause { reply } => {
                let was_paused = std::mem::replace(&mut self.paused, true);
                if !was_paused {
                    self.events.publish(Event::Scheduler(SchedulerEvent::Paused));
                }
                if reply.send(was_paused).is_err() {
                    debug!("reply channel closed for pause command");
                }
            }
            Command::Resume { reply } => {
                let was_paused = std::mem::replace(&mut self.paused, false);
                if was_paused {
                    self.events
                        .publish(Event::Scheduler(SchedulerEvent::Resumed));
                }
                if reply.send(was_paused).is_err() {
                    debug!("reply channel closed for resume command");
                }
            }
            Command::Clear => {
                debug!("expiring all scheduled tasks");
                self.tasks.expire_all();
            }
            Command::ConfirmCasting {
                key,
                when,
                completed,
                reply,
            } => {
                let accepted = self.confirm_casting(&key, when, completed);
                if reply.send(accepted).is_err() {
                    debug!("reply channel closed for confirm command");
                }
            }
            Command::CasterDeath { caster } => {
                let cancelled = self.effects.on_caster_death(caster);
                if cancelled > 0 {
                    info!(%caster, cancelled, "caster death cancelled effects");
                }
                if let Some(caster) = self
                    .roster
                    .casters()
                    .iter()
                    .find(|c| c.id() == caster)
                {
                    caster.interrupted(now);
                }
            }
        }
    }

    fn confirm_casting(&mut self, key: &AbilityKey, when: Timestamp, completed: bool) -> bool {
        let Some(ability) = self.roster.abilities().iter().find(|a| a.key() == key) else {
            warn!(%key, "casting observation for unknown ability");
            return false;
        };
        let accepted = if completed {
            ability.confirm_casting_completed(when)
        } else {
            ability.confirm_casting_started(when)
        };
        if accepted {
            self.pending_confirms
                .retain(|(pending, _)| pending.key() != key);
            self.events
                .publish(Event::Ability(AbilityEvent::CastConfirmed {
                    ability: ability.to_string(),
                }));
        }
        accepted
    }
}

enum TickVerdict {
    Ok,
    Failing,
    Stop,
}

/// Cloneable handle to a running [`ProcessorWorker`].
#[derive(Clone)]
pub struct ProcessorHandle {
    tx: mpsc::Sender<Command>,
    events: EventBus,
}

impl ProcessorHandle {
    /// Schedules a request. With `immediate` the request is also processed
    /// right away instead of waiting for the next tick.
    pub async fn run_request(&self, request: Box<dyn Request>, immediate: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::RunRequest {
                request,
                immediate,
                reply,
            })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;
        rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    pub async fn run_filter(&self, filter: FilterTask) -> Result<()> {
        self.tx
            .send(Command::RunFilter { filter })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)
    }

    pub async fn run_hook(&self, hook: ExpireHook) -> Result<()> {
        self.tx
            .send(Command::RunHook { hook })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)
    }

    /// Pauses the cast phase. Returns whether the scheduler was already
    /// paused.
    pub async fn pause(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Pause { reply })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;
        rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Resumes the cast phase. Returns whether the scheduler was paused.
    pub async fn resume(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Resume { reply })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;
        rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Expires every non-persistent request, filter and hook.
    pub async fn clear(&self) -> Result<()> {
        self.tx
            .send(Command::Clear)
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)
    }

    /// Feeds an authoritative casting observation back into the timers.
    pub async fn confirm_casting(
        &self,
        key: AbilityKey,
        when: Timestamp,
        completed: bool,
    ) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ConfirmCasting {
                key,
                when,
                completed,
                reply,
            })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;
        rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    pub async fn caster_death(&self, caster: CasterId) -> Result<()> {
        self.tx
            .send(Command::CasterDeath { caster })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.events.subscribe(topic)
    }
}
