use bevy::math::Vec3;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use combat_core::attack::AttackType;
use combat_core::combat::actor::{ActorStats, CombatActor};
use combat_core::combat::damage::DamageEvent;
use combat_core::combat::defense::DefenseWindowTracker;
use combat_core::combat::hitbox::{sweep_targets, LayerMask, SpatialIndex};
use combat_core::combat::poise::PoiseArbitrator;
use combat_core::combat::weapons::WeaponProfile;
use combat_core::resolution::{resolve_hit, HitTarget};
use combat_core::{ActorId, CombatSettings, CombatStateMachine, SettingsHandle};

fn bench_resolution(c: &mut Criterion) {
    let settings = CombatSettings::default();
    let event = DamageEvent::new(ActorId(1), 20.0, 15.0);

    c.bench_function("resolve_hit_unmitigated", |b| {
        b.iter(|| {
            let mut actor = CombatActor::new(ActorId(2), ActorStats::default());
            let mut defense = DefenseWindowTracker::new();
            let mut poise = PoiseArbitrator::new();
            resolve_hit(
                HitTarget {
                    actor: &mut actor,
                    defense: &mut defense,
                    poise: &mut poise,
                    hyper_armor: false,
                },
                black_box(&event),
                0.0,
                &settings,
            )
        })
    });

    c.bench_function("resolve_hit_blocked", |b| {
        b.iter(|| {
            let mut actor = CombatActor::new(ActorId(2), ActorStats::default());
            let mut defense = DefenseWindowTracker::new();
            defense.set_block(true);
            let mut poise = PoiseArbitrator::new();
            resolve_hit(
                HitTarget {
                    actor: &mut actor,
                    defense: &mut defense,
                    poise: &mut poise,
                    hyper_armor: false,
                },
                black_box(&event),
                0.0,
                &settings,
            )
        })
    });
}

fn bench_machine(c: &mut Criterion) {
    let handle = SettingsHandle::default();
    let sword = WeaponProfile::sword();

    c.bench_function("machine_tick_attacking", |b| {
        let mut machine = CombatStateMachine::new(
            CombatActor::new(ActorId(1), ActorStats::default()),
            handle.clone(),
        );
        b.iter(|| {
            if !machine.attack_controller().is_attacking() {
                machine.try_attack(AttackType::Light, &sword);
            }
            machine.update(black_box(1.0 / 60.0));
            machine.drain_notifications();
            machine.drain_animation_commands();
        })
    });

    c.bench_function("machine_on_hit_and_respawn", |b| {
        let mut machine = CombatStateMachine::new(
            CombatActor::new(ActorId(1), ActorStats::default()),
            handle.clone(),
        );
        b.iter(|| {
            let result = machine.on_hit(black_box(&event_for(&machine)));
            if result.killed {
                machine.respawn();
            }
            machine.drain_notifications();
        })
    });
}

fn event_for(machine: &CombatStateMachine) -> DamageEvent {
    DamageEvent::new(ActorId(9), 12.0, 8.0).with_hit(machine.actor().position, Vec3::X)
}

fn bench_sweep(c: &mut Criterion) {
    let mut index = SpatialIndex::new();
    for i in 0..64u64 {
        let angle = i as f32 * 0.1;
        let radius = 0.5 + (i % 8) as f32 * 0.4;
        index.upsert(
            ActorId(i + 2),
            Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius),
            LayerMask::ACTORS,
        );
    }
    let sword = WeaponProfile::sword();

    c.bench_function("sweep_targets_64_actors", |b| {
        b.iter(|| sweep_targets(&index, ActorId(1), black_box(Vec3::ZERO), 0.0, &sword))
    });
}

criterion_group!(benches, bench_resolution, bench_machine, bench_sweep);
criterion_main!(benches);
