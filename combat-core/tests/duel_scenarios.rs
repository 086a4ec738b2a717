//! End-to-end duel scenarios
//!
//! Drives two machines against each other the way a game loop would:
//! swing, wait for the hitbox, build the outgoing hit, feed it to the
//! defender.

use std::f32::consts::PI;

use bevy::math::Vec3;
use combat_core::attack::{AttackPhase, AttackType};
use combat_core::combat::actor::{ActorStats, CombatActor};
use combat_core::combat::damage::DamageEvent;
use combat_core::combat::notifications::CombatNotification;
use combat_core::combat::weapons::WeaponProfile;
use combat_core::poise::HitReaction;
use combat_core::{ActorId, CombatSettings, CombatStateKind, CombatStateMachine, SettingsHandle};

const DT: f32 = 1.0 / 100.0;

fn fighter(id: u64, position: Vec3, facing: f32, settings: &SettingsHandle) -> CombatStateMachine {
    CombatStateMachine::new(
        CombatActor::new(ActorId(id), ActorStats::default()).at(position, facing),
        settings.clone(),
    )
}

/// Attacker at the origin facing +X, defender 1.5m ahead facing back.
fn face_off(settings: &SettingsHandle) -> (CombatStateMachine, CombatStateMachine) {
    (
        fighter(1, Vec3::ZERO, 0.0, settings),
        fighter(2, Vec3::new(1.5, 0.0, 0.0), PI, settings),
    )
}

fn run(machines: &mut [&mut CombatStateMachine], seconds: f32) {
    let steps = (seconds / DT).round() as usize;
    for _ in 0..steps {
        for machine in machines.iter_mut() {
            machine.update(DT);
        }
    }
}

fn run_until_hitbox(attacker: &mut CombatStateMachine, defender: &mut CombatStateMachine) {
    for _ in 0..200 {
        if attacker.attack_controller().is_hitbox_active() {
            return;
        }
        attacker.update(DT);
        defender.update(DT);
    }
    panic!("hitbox never opened");
}

#[test]
fn parry_inside_window_staggers_nothing_and_opens_counter() {
    let settings = SettingsHandle::default();
    let (mut attacker, mut defender) = face_off(&settings);

    assert!(defender.try_parry());
    run(&mut [&mut attacker, &mut defender], 0.15);
    let result = defender.on_hit(&DamageEvent::new(ActorId(1), 25.0, 20.0));
    assert!(result.was_parried());
    assert!(result.attacker_staggered);
    assert_eq!(defender.actor().health.current(), 100.0);

    attacker.force_change_state(CombatStateKind::Staggered);
    assert_eq!(attacker.current_state(), CombatStateKind::Staggered);
    assert!(defender.snapshot().can_counter);
}

#[test]
fn parry_after_window_resolves_normally() {
    let settings = SettingsHandle::default();
    let (mut attacker, mut defender) = face_off(&settings);

    assert!(defender.try_parry());
    run(&mut [&mut attacker, &mut defender], 0.25);
    let result = defender.on_hit(&DamageEvent::new(ActorId(1), 25.0, 5.0));
    assert!(!result.was_parried());
    assert_eq!(result.final_damage, 25.0);
    assert_eq!(defender.actor().health.current(), 75.0);
}

#[test]
fn dodge_with_too_little_stamina_does_nothing() {
    let settings = SettingsHandle::default();
    let mut actor = CombatActor::new(ActorId(1), ActorStats::default());
    actor.stamina.set(20.0);
    let mut machine = CombatStateMachine::new(actor, settings);

    assert!(!machine.try_dodge(Vec3::X));
    assert_eq!(machine.current_state(), CombatStateKind::Idle);
    assert_eq!(machine.actor().stamina.current(), 20.0);

    machine.update(DT);
    assert_eq!(machine.actor().position, Vec3::ZERO);
}

#[test]
fn dodge_through_swing_avoids_damage() {
    let settings = SettingsHandle::default();
    let (mut attacker, mut defender) = face_off(&settings);
    let sword = WeaponProfile::sword();

    assert!(attacker.try_attack(AttackType::Light, &sword));
    run_until_hitbox(&mut attacker, &mut defender);
    assert!(defender.try_dodge(Vec3::Z));
    defender.update(0.06);

    let hit = attacker.outgoing_hit(&defender.snapshot()).unwrap();
    let result = defender.on_hit(&hit);
    assert!(result.was_dodged());
    assert!(result.perfect_dodge);
    assert_eq!(defender.actor().health.current(), 100.0);
    assert!(defender
        .drain_notifications()
        .iter()
        .any(|n| matches!(n, CombatNotification::PerfectDodge { .. })));
}

#[test]
fn blocked_hit_rounds_and_keeps_guard() {
    let settings = SettingsHandle::default();
    let (_, mut defender) = face_off(&settings);

    assert!(defender.set_block(true));
    let result = defender.on_hit(&DamageEvent::new(ActorId(1), 10.0, 10.0));
    assert!(result.was_blocked());
    assert!(!result.guard_broken);
    assert_eq!(result.final_damage, 3.0);
    assert_eq!(defender.current_state(), CombatStateKind::Blocking);
    assert_eq!(defender.actor().stamina.current(), 85.0);
}

#[test]
fn heavy_hit_breaks_guard_and_leaves_brief_invincibility() {
    let settings = SettingsHandle::default();
    let (_, mut defender) = face_off(&settings);

    defender.set_block(true);
    let result = defender.on_hit(&DamageEvent::new(ActorId(1), 70.0, 10.0));
    assert!(result.guard_broken);
    assert_eq!(result.reaction, HitReaction::Stagger);
    assert_eq!(defender.current_state(), CombatStateKind::Staggered);

    let follow_up = defender.on_hit(&DamageEvent::new(ActorId(1), 10.0, 10.0));
    assert!(follow_up.was_dodged());

    assert!(defender.defense().guard().is_broken());
    assert!(!defender.set_block(true));
}

#[test]
fn combo_chain_scales_damage() {
    let settings = SettingsHandle::default();
    let (mut attacker, mut defender) = face_off(&settings);
    let sword = WeaponProfile::sword();

    attacker.try_attack(AttackType::Light, &sword);
    run_until_hitbox(&mut attacker, &mut defender);
    let first = attacker.outgoing_hit(&defender.snapshot()).unwrap();

    while attacker.attack_controller().current_phase() != AttackPhase::ComboWindow {
        attacker.update(DT);
    }
    assert!(attacker.try_attack(AttackType::Light, &sword));
    assert_eq!(attacker.snapshot().combo_index, 2);
    run_until_hitbox(&mut attacker, &mut defender);
    let second = attacker.outgoing_hit(&defender.snapshot()).unwrap();

    // Second swing: 1.1x swing multiplier on top of one combo step
    let step = CombatSettings::default().combo_damage_step;
    let expected = first.base_damage * 1.1 * (1.0 + step);
    assert!((second.base_damage - expected).abs() < 1e-3);
}

#[test]
fn combo_resets_after_idle_gap() {
    let settings = SettingsHandle::default();
    let (mut attacker, mut defender) = face_off(&settings);
    let sword = WeaponProfile::sword();

    attacker.try_attack(AttackType::Light, &sword);
    run(&mut [&mut attacker, &mut defender], 3.0);
    assert_eq!(attacker.current_state(), CombatStateKind::Idle);

    attacker.try_attack(AttackType::Light, &sword);
    assert_eq!(attacker.snapshot().combo_index, 1);
}

#[test]
fn backstab_is_critical() {
    let settings = SettingsHandle::default();
    let sword = WeaponProfile::sword();
    let mut attacker = fighter(1, Vec3::ZERO, 0.0, &settings);
    // Defender ahead of the attacker, looking away, sturdy enough to live
    let mut defender = CombatStateMachine::new(
        CombatActor::new(
            ActorId(2),
            ActorStats {
                max_health: 300.0,
                ..ActorStats::default()
            },
        )
        .at(Vec3::new(1.5, 0.0, 0.0), 0.0),
        settings.clone(),
    );

    attacker.try_attack(AttackType::Light, &sword);
    run_until_hitbox(&mut attacker, &mut defender);
    let hit = attacker.outgoing_hit(&defender.snapshot()).unwrap();
    assert!(hit.flags.critical && hit.flags.backstab);

    let result = defender.on_hit(&hit);
    assert!(result.final_damage > 30.0 * 1.4);
    assert!(result.reaction.interrupts());
}

#[test]
fn riposte_after_parry() {
    let settings = SettingsHandle::default();
    let sword = WeaponProfile::sword();
    let (mut attacker, mut defender) = face_off(&settings);

    defender.try_parry();
    let result = defender.on_hit(&DamageEvent::new(ActorId(1), 20.0, 10.0));
    assert!(result.attacker_staggered);
    attacker.force_stagger(1.0);

    assert!(defender.try_attack(AttackType::Light, &sword));
    run_until_hitbox(&mut defender, &mut attacker);
    let riposte = defender.outgoing_hit(&attacker.snapshot()).unwrap();
    assert!(riposte.flags.riposte);
    assert!(riposte.flags.ignores_poise);
}

#[test]
fn lethal_hit_kills_once() {
    let settings = SettingsHandle::default();
    let (_, mut defender) = face_off(&settings);

    let result = defender.on_hit(&DamageEvent::new(ActorId(1), 500.0, 0.0));
    assert!(result.killed);
    assert_eq!(defender.current_state(), CombatStateKind::Dead);

    let deaths = defender
        .drain_notifications()
        .into_iter()
        .filter(|n| matches!(n, CombatNotification::CharacterDied { .. }))
        .count();
    assert_eq!(deaths, 1);

    defender.on_hit(&DamageEvent::new(ActorId(1), 500.0, 0.0));
    assert!(defender.drain_notifications().is_empty());
}

#[test]
fn settings_swap_applies_to_next_parry() {
    let settings = SettingsHandle::default();
    let (mut attacker, mut defender) = face_off(&settings);

    settings
        .replace(CombatSettings {
            parry_window: 0.30,
            ..CombatSettings::default()
        })
        .unwrap();

    defender.try_parry();
    run(&mut [&mut attacker, &mut defender], 0.25);
    let result = defender.on_hit(&DamageEvent::new(ActorId(1), 20.0, 10.0));
    assert!(result.was_parried());
}
