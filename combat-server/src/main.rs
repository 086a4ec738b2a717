use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;

use combat_core::attack::AttackType;
use combat_core::combat::actor::{ActorStats, CombatActor};
use combat_core::combat::weapons::WeaponProfile;
use combat_core::combat::ActorId;
use combat_core::logging::LoggingPlugin;
use combat_core::settings::hotreload::SettingsReloadPlugin;
use combat_core::{CombatSettings, SettingsHandle};

use combat_server::{CombatRequest, CombatServerPlugin, HostSession, ObservedNotification, RequestedAction};

const TICK_RATE: f64 = 20.0;

const DUELIST: ActorId = ActorId(1);
const SPARRING: ActorId = ActorId(2);

fn main() -> anyhow::Result<()> {
    let mut app = App::new();
    app.add_plugins(LoggingPlugin::from_env());

    // Settings: first CLI argument, else DUEL_SETTINGS, else built-in defaults
    let settings_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DUEL_SETTINGS").ok())
        .map(PathBuf::from);
    let settings = match &settings_path {
        Some(path) => {
            let settings = CombatSettings::load(path)
                .with_context(|| format!("loading combat settings from {}", path.display()))?;
            info!("Combat settings loaded from {}", path.display());
            settings
        }
        None => CombatSettings::default(),
    };
    let handle = SettingsHandle::new(settings);

    info!("Starting duel combat server at {} Hz", TICK_RATE);

    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
            1.0 / TICK_RATE,
        ))),
    )
    .insert_resource(handle.clone())
    .insert_resource(HostSession::new(handle))
    .add_plugins(CombatServerPlugin)
    .add_systems(Startup, spawn_demo_duel)
    .add_systems(Update, (drive_sparring_partner, report_outcomes));

    if let Some(path) = settings_path {
        app.add_plugins(SettingsReloadPlugin { path });
    }

    app.run();
    Ok(())
}

fn spawn_demo_duel(mut session: ResMut<HostSession>) {
    session.spawn_actor(
        CombatActor::new(DUELIST, ActorStats::default()),
        WeaponProfile::sword(),
    );
    session.spawn_actor(
        CombatActor::new(SPARRING, ActorStats::default())
            .at(Vec3::new(1.5, 0.0, 0.0), std::f32::consts::PI),
        WeaponProfile::spear(),
    );
}

/// Scripted exchange: the duelist swings every second, the sparring
/// partner alternates between parrying and taking the hit.
fn drive_sparring_partner(
    time: Res<Time>,
    mut requests: EventWriter<CombatRequest>,
    mut timer: Local<f32>,
    mut round: Local<u32>,
) {
    *timer += time.delta_secs();
    if *timer < 1.0 {
        return;
    }
    *timer = 0.0;
    *round += 1;

    let now = time.elapsed_secs();
    if *round % 2 == 0 {
        requests.send(CombatRequest {
            actor: SPARRING,
            sequence: *round,
            client_time: now,
            action: RequestedAction::Parry,
        });
    }
    requests.send(CombatRequest {
        actor: DUELIST,
        sequence: *round,
        client_time: now,
        action: RequestedAction::Attack {
            attack_type: AttackType::Light,
            claimed_combo: 1,
        },
    });
}

fn report_outcomes(mut observed: EventReader<ObservedNotification>, mut session: ResMut<HostSession>) {
    for ObservedNotification(notification) in observed.read() {
        info!("{:?}", notification);
    }
    let dead: Vec<ActorId> = session
        .authority()
        .actor_ids()
        .filter(|id| session.authority().record(*id).is_some_and(|r| r.is_dead()))
        .collect();
    for id in dead {
        session.authority_mut().respawn(id);
    }
}
