//! Bevy wiring for a hosted duel.

use bevy::prelude::*;

use combat_core::combat::notifications::CombatNotification;
use combat_core::SettingsHandle;

use crate::protocol::CombatRequest;
use crate::session::HostSession;

/// Outcome replayed by the host's observer, for presentation systems.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct ObservedNotification(pub CombatNotification);

/// Seconds between metrics log lines.
#[derive(Resource, Debug, Clone, Copy)]
pub struct MetricsLogInterval(pub f32);

impl Default for MetricsLogInterval {
    fn default() -> Self {
        Self(30.0)
    }
}

/// Runs a [`HostSession`] off the app clock. Local requests are sent as
/// [`CombatRequest`] events.
pub struct CombatServerPlugin;

impl Plugin for CombatServerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SettingsHandle>()
            .init_resource::<MetricsLogInterval>()
            .add_event::<CombatRequest>()
            .add_event::<ObservedNotification>()
            .add_systems(Startup, start_session)
            .add_systems(
                Update,
                (submit_local_requests, step_session, log_metrics).chain(),
            );
    }
}

fn start_session(
    mut commands: Commands,
    settings: Res<SettingsHandle>,
    existing: Option<Res<HostSession>>,
) {
    if existing.is_none() {
        commands.insert_resource(HostSession::new(settings.clone()));
    }
    info!("Combat authority ready");
}

fn submit_local_requests(
    mut requests: EventReader<CombatRequest>,
    session: Option<ResMut<HostSession>>,
) {
    let Some(mut session) = session else {
        return;
    };
    for request in requests.read() {
        if let Err(e) = session.submit(request) {
            warn!("{} request #{} not sent: {}", request.actor, request.sequence, e);
        }
    }
}

fn step_session(
    time: Res<Time>,
    session: Option<ResMut<HostSession>>,
    mut observed: EventWriter<ObservedNotification>,
) {
    let Some(mut session) = session else {
        return;
    };
    let report = session.step(time.delta_secs());
    if report.rejected > 0 || report.decode_errors > 0 {
        debug!(
            "step: {} applied, {} rejected, {} undecodable",
            report.applied, report.rejected, report.decode_errors
        );
    }
    for notification in session.observer_mut().drain_notifications() {
        observed.send(ObservedNotification(notification));
    }
}

fn log_metrics(
    time: Res<Time>,
    interval: Res<MetricsLogInterval>,
    session: Option<Res<HostSession>>,
    mut elapsed: Local<f32>,
) {
    let Some(session) = session else {
        return;
    };
    *elapsed += time.delta_secs();
    if *elapsed < interval.0 {
        return;
    }
    *elapsed = 0.0;
    let metrics = session.metrics().to_json();
    info!(
        "tick {} | {} requests ({} rejected) | {} hits | {:.1} req/s",
        metrics.ticks,
        metrics.requests_received,
        metrics.requests_rejected,
        metrics.hits_resolved,
        metrics.rps
    );
    debug!("metrics {}", session.metrics().render_json());
}
