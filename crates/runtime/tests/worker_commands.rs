//! Command-path tests against a spawned scheduler worker.

use std::sync::Arc;

use combat_core::{
    Ability, AbilityCensus, AbilityKey, AbilityProfile, Caster, CasterId, EffectsManager, GroupId,
    ManualClock, Roster, Timestamp,
};
use runtime::{
    AbilityEvent, CastAnyWhenReady, EngineSettings, Event, SettingsHandle, Topic, spawn,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn caster(id: u32, name: &str) -> Arc<Caster> {
    Caster::new(CasterId(id), name, GroupId::MAIN, 0)
}

fn instant(caster: &Arc<Caster>, id: &str) -> Ability {
    Ability::builder(Arc::clone(caster), id)
        .census(AbilityCensus {
            casting: 1.0,
            reuse: 30.0,
            recovery: 0.3,
            duration: -1.0,
            ..AbilityCensus::default()
        })
        .profile(AbilityProfile::default())
        .build()
}

fn setup(abilities: &[Ability]) -> (Arc<Roster>, Arc<ManualClock>, SettingsHandle) {
    let mut roster = Roster::new();
    for ability in abilities {
        roster.register_ability(ability.clone());
    }
    (
        Arc::new(roster),
        Arc::new(ManualClock::new(Timestamp(100.0))),
        SettingsHandle::new(EngineSettings::default()),
    )
}

#[tokio::test]
async fn immediate_request_casts_and_publishes() {
    init_tracing();
    let healer = caster(1, "healer");
    let mend = instant(&healer, "mend");
    let (roster, clock, settings) = setup(&[mend.clone()]);
    let effects = Arc::new(EffectsManager::new());
    let (handle, _join) = spawn(roster, effects, clock, settings);

    let mut events = handle.subscribe(Topic::Ability);
    let request = CastAnyWhenReady::from_resolved(vec![mend.clone()], 30.0);
    handle.run_request(Box::new(request), true).await.unwrap();

    // the reply arrives after the command is fully handled, so the cast
    // event is already queued
    let event = events.try_recv().unwrap();
    assert!(matches!(event, Event::Ability(AbilityEvent::Cast { .. })));
    assert!(mend.has_been_cast());
}

#[tokio::test]
async fn pause_gates_immediate_casts_until_resume() {
    init_tracing();
    let healer = caster(1, "healer");
    let mend = instant(&healer, "mend");
    let (roster, clock, settings) = setup(&[mend.clone()]);
    let effects = Arc::new(EffectsManager::new());
    let (handle, _join) = spawn(roster, effects, clock, settings);

    assert!(!handle.pause().await.unwrap());
    assert!(handle.pause().await.unwrap());

    let mut events = handle.subscribe(Topic::Ability);
    let request = CastAnyWhenReady::from_resolved(vec![mend.clone()], 30.0);
    handle.run_request(Box::new(request), true).await.unwrap();
    assert!(events.try_recv().is_err());
    assert!(!mend.has_been_cast());

    assert!(handle.resume().await.unwrap());
    assert!(!handle.resume().await.unwrap());
}

#[tokio::test]
async fn disabled_abilities_are_vetoed() {
    init_tracing();
    let healer = caster(1, "healer");
    let mend = instant(&healer, "mend");
    let (roster, clock, settings) = setup(&[mend.clone()]);
    settings.update(|s| s.disabled_abilities.push("mend".into()));
    let effects = Arc::new(EffectsManager::new());
    let (handle, _join) = spawn(roster, effects, clock, settings);

    let request = CastAnyWhenReady::from_resolved(vec![mend.clone()], 30.0);
    handle.run_request(Box::new(request), true).await.unwrap();
    assert!(!mend.has_been_cast());
}

#[tokio::test]
async fn casting_confirmations_go_to_known_abilities_only() {
    init_tracing();
    let healer = caster(1, "healer");
    let mend = instant(&healer, "mend");
    let (roster, clock, settings) = setup(&[mend.clone()]);
    let effects = Arc::new(EffectsManager::new());
    let (handle, _join) = spawn(roster, effects, clock.clone(), settings);

    let request = CastAnyWhenReady::from_resolved(vec![mend.clone()], 30.0);
    handle.run_request(Box::new(request), true).await.unwrap();
    assert!(mend.has_been_cast());

    clock.advance(0.5);
    let accepted = handle
        .confirm_casting(mend.key().clone(), Timestamp(100.5), false)
        .await
        .unwrap();
    assert!(accepted);

    let unknown = AbilityKey::new(CasterId(9), "void".into());
    let accepted = handle
        .confirm_casting(unknown, Timestamp(100.5), false)
        .await
        .unwrap();
    assert!(!accepted);
}
