use std::f32::consts::PI;

use bevy::math::Vec3;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use combat_core::attack::AttackType;
use combat_core::combat::actor::{ActorStats, CombatActor};
use combat_core::combat::weapons::WeaponProfile;
use combat_core::combat::ActorId;
use combat_core::SettingsHandle;

use combat_server::metrics::ServerMetrics;
use combat_server::protocol::{decode, encode};
use combat_server::{CombatAuthority, CombatRequest, HostSession, RequestedAction};

fn duel() -> CombatAuthority {
    let mut authority = CombatAuthority::new(SettingsHandle::default(), ServerMetrics::new());
    authority.spawn_actor(
        CombatActor::new(ActorId(1), ActorStats::default()),
        WeaponProfile::sword(),
    );
    authority.spawn_actor(
        CombatActor::new(ActorId(2), ActorStats::default()).at(Vec3::new(1.5, 0.0, 0.0), PI),
        WeaponProfile::sword(),
    );
    authority
}

fn attack(sequence: u32) -> CombatRequest {
    CombatRequest {
        actor: ActorId(1),
        sequence,
        client_time: 0.0,
        action: RequestedAction::Attack {
            attack_type: AttackType::Light,
            claimed_combo: 1,
        },
    }
}

fn bench_handle_request(c: &mut Criterion) {
    c.bench_function("authority_attack_and_resolve", |b| {
        b.iter_batched(
            duel,
            |mut authority| {
                authority.handle_request(black_box(&attack(1)));
                for _ in 0..4 {
                    authority.tick(0.05);
                }
                black_box(authority.drain_outbox())
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("authority_stale_rejection", |b| {
        let mut authority = duel();
        authority.handle_request(&attack(1000));
        b.iter(|| authority.handle_request(black_box(&attack(1))))
    });
}

fn bench_wire(c: &mut Criterion) {
    let request = attack(42);
    c.bench_function("request_encode_decode", |b| {
        b.iter(|| {
            let bytes = encode(black_box(&request)).unwrap_or_default();
            black_box(decode::<CombatRequest>(&bytes).ok())
        })
    });
}

fn bench_session_step(c: &mut Criterion) {
    c.bench_function("host_session_second_of_combat", |b| {
        b.iter_batched(
            || {
                let mut session = HostSession::new(SettingsHandle::default());
                session.spawn_actor(
                    CombatActor::new(ActorId(1), ActorStats::default()),
                    WeaponProfile::sword(),
                );
                session.spawn_actor(
                    CombatActor::new(ActorId(2), ActorStats::default())
                        .at(Vec3::new(1.5, 0.0, 0.0), PI),
                    WeaponProfile::sword(),
                );
                session
            },
            |mut session| {
                for seq in 0..20u32 {
                    if seq % 10 == 0 {
                        let _ = session.submit(&attack(seq + 1));
                    }
                    session.step(0.05);
                }
                black_box(session.observer().next_seq())
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_handle_request, bench_wire, bench_session_step);
criterion_main!(benches);
