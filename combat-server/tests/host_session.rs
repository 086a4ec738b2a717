//! End-to-end duels through the wire: remote clients send bincode requests,
//! the host resolves them and every observer replays the same outcomes.

use std::f32::consts::PI;
use std::io::Write;

use bevy::math::Vec3;

use combat_core::attack::AttackType;
use combat_core::combat::actor::{ActorStats, CombatActor};
use combat_core::combat::notifications::CombatNotification;
use combat_core::combat::weapons::WeaponProfile;
use combat_core::combat::ActorId;
use combat_core::{CombatSettings, CombatStateKind, SettingsHandle};

use combat_server::transport::{ChannelClient, ClientTransport};
use combat_server::{
    CombatBroadcast, CombatObserver, CombatRequest, HostSession, RejectReason, RequestedAction,
    ServerMessage,
};

const A: ActorId = ActorId(1);
const B: ActorId = ActorId(2);

struct Remote {
    link: ChannelClient,
    observer: CombatObserver,
    received: Vec<ServerMessage>,
}

impl Remote {
    fn pump(&mut self) {
        while let Some(message) = self.link.recv_message().unwrap() {
            self.observer.apply(&message).unwrap();
            self.received.push(message);
        }
    }
}

fn host(settings: SettingsHandle) -> (HostSession, Remote) {
    let mut session = HostSession::new(settings.clone());
    let remote = Remote {
        link: session.connect(),
        observer: CombatObserver::new(settings),
        received: Vec::new(),
    };
    session.spawn_actor(
        CombatActor::new(A, ActorStats::default()),
        WeaponProfile::sword(),
    );
    session.spawn_actor(
        CombatActor::new(B, ActorStats::default()).at(Vec3::new(1.5, 0.0, 0.0), PI),
        WeaponProfile::sword(),
    );
    (session, remote)
}

fn request(actor: ActorId, sequence: u32, action: RequestedAction) -> CombatRequest {
    CombatRequest {
        actor,
        sequence,
        client_time: 0.0,
        action,
    }
}

fn light(claimed_combo: u32) -> RequestedAction {
    RequestedAction::Attack {
        attack_type: AttackType::Light,
        claimed_combo,
    }
}

fn run(session: &mut HostSession, remote: &mut Remote, seconds: f32) {
    let steps = (seconds / 0.05).round() as usize;
    for _ in 0..steps {
        session.step(0.05);
        remote.pump();
    }
}

fn combo_indices(messages: &[ServerMessage]) -> Vec<u32> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Broadcast(entry) => match entry.payload {
                CombatBroadcast::AttackStarted { combo_index, .. } => Some(combo_index),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

#[test]
fn remote_combo_follows_server_not_claim() {
    // Two swings 50 ms apart: the second restarts the first
    let settings = SettingsHandle::new(CombatSettings {
        allow_swing_restart: true,
        ..CombatSettings::default()
    });
    let (mut session, mut remote) = host(settings);

    remote.link.send_request(&request(A, 1, light(4))).unwrap();
    run(&mut session, &mut remote, 0.05);
    remote.link.send_request(&request(A, 2, light(4))).unwrap();
    run(&mut session, &mut remote, 0.05);

    assert_eq!(combo_indices(&remote.received), vec![1, 2]);
    assert_eq!(remote.observer.record(A).unwrap().combo_index, 2);
}

#[test]
fn replayed_request_applied_once() {
    let (mut session, mut remote) = host(SettingsHandle::default());
    let attack = request(A, 7, light(1));

    remote.link.send_request(&attack).unwrap();
    remote.link.send_request(&attack).unwrap();
    run(&mut session, &mut remote, 0.05);

    assert_eq!(combo_indices(&remote.received), vec![1]);
    assert_eq!(session.metrics().rejected(RejectReason::Stale), 1);
}

#[test]
fn observers_agree_with_authority() {
    let (mut session, mut remote) = host(SettingsHandle::default());

    remote.link.send_request(&request(A, 1, light(1))).unwrap();
    run(&mut session, &mut remote, 1.0);

    let hits: Vec<f32> = remote
        .observer
        .drain_notifications()
        .into_iter()
        .filter_map(|n| match n {
            CombatNotification::DamageLanded { target: B, amount, .. } => Some(amount),
            _ => None,
        })
        .collect();
    assert_eq!(hits, vec![30.0]);

    for id in [A, B] {
        assert_eq!(remote.observer.record(id), session.authority().record(id));
        assert_eq!(session.observer().record(id), session.authority().record(id));
    }
    assert!(session.authority().log().verify_all());
}

#[test]
fn parry_with_latency_allowance_staggers_attacker() {
    let (mut session, mut remote) = host(SettingsHandle::default());

    remote
        .link
        .send_request(&request(B, 1, RequestedAction::Parry))
        .unwrap();
    run(&mut session, &mut remote, 0.15);
    // Swing lands 0.30s after the parry opened: outside the local window,
    // inside the server's widened one.
    remote.link.send_request(&request(A, 1, light(1))).unwrap();
    run(&mut session, &mut remote, 0.3);

    let notes = remote.observer.drain_notifications();
    assert!(notes.contains(&CombatNotification::ParrySucceeded {
        defender: B,
        attacker: A,
    }));
    assert_eq!(
        remote.observer.record(A).unwrap().state,
        CombatStateKind::Staggered
    );
    assert_eq!(remote.observer.record(B).unwrap().health, 100.0);
}

#[test]
fn redelivered_messages_are_idempotent() {
    let (mut session, mut remote) = host(SettingsHandle::default());
    remote.link.send_request(&request(A, 1, light(1))).unwrap();
    run(&mut session, &mut remote, 0.5);

    let mut fresh = CombatObserver::new(SettingsHandle::default());
    for message in &remote.received {
        fresh.apply(message).unwrap();
    }
    let first_pass = fresh.drain_notifications();
    for message in &remote.received {
        assert!(!fresh.apply(message).unwrap());
    }
    assert!(fresh.drain_notifications().is_empty());
    assert!(!first_pass.is_empty());
    assert_eq!(fresh.record(B), remote.observer.record(B));
}

#[test]
fn late_joiner_catches_up_from_log() {
    let (mut session, mut remote) = host(SettingsHandle::default());
    remote.link.send_request(&request(A, 1, light(1))).unwrap();
    run(&mut session, &mut remote, 0.5);

    let mut late = CombatObserver::new(SettingsHandle::default());
    for entry in session.authority().log().since(0) {
        late.apply(&ServerMessage::Broadcast(entry.clone())).unwrap();
    }
    assert_eq!(late.next_seq(), session.authority().log().next_seq());
}

#[test]
fn dead_actor_requests_dropped() {
    let (mut session, mut remote) = host(SettingsHandle::default());
    let mut seq = 0;
    while !session.authority().record(B).unwrap().is_dead() && seq < 12 {
        seq += 1;
        remote.link.send_request(&request(A, seq, light(1))).unwrap();
        run(&mut session, &mut remote, 0.7);
    }
    assert!(remote.observer.record(B).unwrap().is_dead());

    remote
        .link
        .send_request(&request(B, 1, RequestedAction::Block { held: true }))
        .unwrap();
    run(&mut session, &mut remote, 0.05);
    assert_eq!(session.metrics().rejected(RejectReason::Dead), 1);
}

#[test]
fn settings_file_widens_parry_window() {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .unwrap();
    let settings = CombatSettings {
        parry_window: 0.40,
        ..CombatSettings::default()
    };
    file.write_all(settings.to_json().as_bytes()).unwrap();
    file.flush().unwrap();

    let loaded = CombatSettings::load(file.path()).unwrap();
    let handle = SettingsHandle::new(loaded);
    let (mut session, mut remote) = host(handle);

    remote
        .link
        .send_request(&request(B, 1, RequestedAction::Parry))
        .unwrap();
    run(&mut session, &mut remote, 0.3);
    remote.link.send_request(&request(A, 1, light(1))).unwrap();
    run(&mut session, &mut remote, 0.3);

    // Window is 0.40 + 0.02 + 0.12: the hit at 0.45s is still parried
    assert_eq!(remote.observer.record(B).unwrap().health, 100.0);
    assert_eq!(
        remote.observer.record(A).unwrap().state,
        CombatStateKind::Staggered
    );
}
