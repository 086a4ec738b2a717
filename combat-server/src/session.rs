//! Host session: the authority, its transport and the host's own observer in
//! one process.
//!
//! One [`HostSession::step`] drains queued requests, advances the authority,
//! broadcasts what it produced and replays those messages into the local
//! observer through the same wire path remote observers use.

use std::sync::Arc;

use bevy::prelude::*;

use combat_core::combat::actor::CombatActor;
use combat_core::combat::weapons::WeaponProfile;
use combat_core::SettingsHandle;

use crate::authority::{CombatAuthority, RequestOutcome};
use crate::metrics::ServerMetrics;
use crate::observer::CombatObserver;
use crate::protocol::{CombatRequest, WireError};
use crate::transport::{ChannelClient, ChannelServer, ClientTransport, ServerTransport};

/// What one step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub applied: u32,
    pub rejected: u32,
    pub decode_errors: u32,
    pub messages_sent: u32,
    pub observer_errors: u32,
}

#[derive(Resource)]
pub struct HostSession {
    authority: CombatAuthority,
    server: ChannelServer,
    local: ChannelClient,
    observer: CombatObserver,
}

impl HostSession {
    pub fn new(settings: SettingsHandle) -> Self {
        Self::with_metrics(settings, ServerMetrics::new())
    }

    pub fn with_metrics(settings: SettingsHandle, metrics: Arc<ServerMetrics>) -> Self {
        let mut server = ChannelServer::new();
        let local = server.connect();
        Self {
            authority: CombatAuthority::new(settings.clone(), metrics),
            server,
            local,
            observer: CombatObserver::new(settings),
        }
    }

    pub fn authority(&self) -> &CombatAuthority {
        &self.authority
    }

    pub fn authority_mut(&mut self) -> &mut CombatAuthority {
        &mut self.authority
    }

    pub fn observer(&self) -> &CombatObserver {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut CombatObserver {
        &mut self.observer
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        self.authority.metrics()
    }

    pub fn spawn_actor(&mut self, actor: CombatActor, weapon: WeaponProfile) -> bool {
        self.authority.spawn_actor(actor, weapon)
    }

    /// Open a link for a remote client.
    pub fn connect(&mut self) -> ChannelClient {
        self.server.connect()
    }

    /// Queue a request from the host's own player.
    pub fn submit(&mut self, request: &CombatRequest) -> Result<(), WireError> {
        self.local.send_request(request)
    }

    pub fn step(&mut self, dt: f32) -> StepReport {
        let mut report = StepReport::default();

        loop {
            match self.server.recv_request() {
                Ok(Some(request)) => match self.authority.handle_request(&request) {
                    RequestOutcome::Applied { .. } => report.applied += 1,
                    RequestOutcome::Rejected(_) => report.rejected += 1,
                },
                Ok(None) => break,
                Err(WireError::Decode(e)) => {
                    warn!("Dropping undecodable request frame: {}", e);
                    self.authority.metrics().record_decode_error();
                    report.decode_errors += 1;
                }
                Err(e) => {
                    error!("Request link failed: {}", e);
                    break;
                }
            }
        }

        self.authority.tick(dt);

        for message in self.authority.drain_outbox() {
            match self.server.broadcast(&message) {
                Ok(_) => report.messages_sent += 1,
                Err(e) => error!("Broadcast failed: {}", e),
            }
        }

        loop {
            match self.local.recv_message() {
                Ok(Some(message)) => {
                    if let Err(e) = self.observer.apply(&message) {
                        warn!("Local observer rejected message: {}", e);
                        report.observer_errors += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Local observer link failed: {}", e);
                    report.observer_errors += 1;
                    break;
                }
            }
        }

        report
    }
}
