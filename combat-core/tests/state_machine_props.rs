//! Property-based tests using proptest
//!
//! Invariants that must hold for ANY sequence of inputs:
//! - Requested transitions succeed exactly when legal and not a no-op
//! - Health and stamina stay inside their pools
//! - Zero health always means Dead
//! - Attack and dodge bookkeeping never outlives its state
//! - Combo damage scaling follows the linear step

use bevy::math::Vec3;
use combat_core::attack::AttackType;
use combat_core::combat::actor::{ActorStats, CombatActor, ResourcePool};
use combat_core::combat::damage::{outgoing_damage, AttackAngle, DamageEvent};
use combat_core::combat::notifications::AnimationEvent;
use combat_core::combat::weapons::WeaponProfile;
use combat_core::{ActorId, CombatSettings, CombatStateKind, CombatStateMachine, SettingsHandle, SkillSpec};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Action {
    Attack(AttackType),
    Block(bool),
    Parry,
    Dodge(f32),
    Hit { damage: f32, poise: f32 },
    Skill,
    Marker(AnimationEvent),
    Request(CombatStateKind),
    Tick(f32),
}

fn attack_type() -> impl Strategy<Value = AttackType> {
    prop_oneof![
        Just(AttackType::Light),
        Just(AttackType::Heavy),
        Just(AttackType::Special),
    ]
}

fn state_kind() -> impl Strategy<Value = CombatStateKind> {
    (0usize..CombatStateKind::ALL.len()).prop_map(|i| CombatStateKind::ALL[i])
}

fn marker() -> impl Strategy<Value = AnimationEvent> {
    prop_oneof![
        Just(AnimationEvent::AttackStart),
        Just(AnimationEvent::HitboxEnable),
        Just(AnimationEvent::HitboxDisable),
        Just(AnimationEvent::AttackEnd),
        Just(AnimationEvent::ComboWindowOpen),
        Just(AnimationEvent::ComboWindowClose),
        Just(AnimationEvent::DodgeEnd),
        Just(AnimationEvent::StaggerEnd),
    ]
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        attack_type().prop_map(Action::Attack),
        any::<bool>().prop_map(Action::Block),
        Just(Action::Parry),
        (0.0f32..std::f32::consts::TAU).prop_map(Action::Dodge),
        (0.0f32..60.0, 0.0f32..80.0).prop_map(|(damage, poise)| Action::Hit { damage, poise }),
        Just(Action::Skill),
        marker().prop_map(Action::Marker),
        state_kind().prop_map(Action::Request),
        (0.0f32..0.25).prop_map(Action::Tick),
    ]
}

fn machine() -> CombatStateMachine {
    CombatStateMachine::new(
        CombatActor::new(ActorId(1), ActorStats::default()),
        SettingsHandle::default(),
    )
}

fn apply(machine: &mut CombatStateMachine, action: &Action, sword: &WeaponProfile) {
    match action {
        Action::Attack(kind) => {
            machine.try_attack(*kind, sword);
        }
        Action::Block(held) => {
            machine.set_block(*held);
        }
        Action::Parry => {
            machine.try_parry();
        }
        Action::Dodge(angle) => {
            machine.try_dodge(Vec3::new(angle.cos(), 0.0, angle.sin()));
        }
        Action::Hit { damage, poise } => {
            machine.on_hit(&DamageEvent::new(ActorId(2), *damage, *poise));
        }
        Action::Skill => {
            machine.try_use_skill(&SkillSpec::new("Whirlwind", 0.8, 20.0));
        }
        Action::Marker(event) => machine.on_animation_event(*event),
        Action::Request(target) => {
            machine.try_change_state(*target);
        }
        Action::Tick(dt) => machine.update(*dt),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_requested_transition_matches_legality(
        setup in prop::collection::vec(action(), 0..30),
        target in state_kind(),
    ) {
        let sword = WeaponProfile::sword();
        let mut m = machine();
        for action in &setup {
            apply(&mut m, action, &sword);
        }

        let before = m.current_state();
        let legal = m.can_transition_to(target) && target != before;
        let accepted = m.try_change_state(target);

        prop_assert_eq!(accepted, legal);
        if accepted {
            prop_assert_eq!(m.current_state(), target);
        } else {
            prop_assert_eq!(m.current_state(), before);
        }
    }

    #[test]
    fn prop_pools_stay_bounded(actions in prop::collection::vec(action(), 1..80)) {
        let sword = WeaponProfile::sword();
        let mut m = machine();
        for action in &actions {
            apply(&mut m, action, &sword);

            let snap = m.snapshot();
            prop_assert!(snap.health >= 0.0 && snap.health <= snap.max_health);
            prop_assert!(snap.stamina >= 0.0 && snap.stamina <= snap.max_stamina);
            prop_assert!(snap.poise >= 0.0 && snap.poise <= snap.max_poise);
            if snap.health <= 0.0 {
                prop_assert_eq!(snap.state, CombatStateKind::Dead);
            }
        }
    }

    #[test]
    fn prop_transient_windows_belong_to_their_state(
        actions in prop::collection::vec(action(), 1..80),
    ) {
        let sword = WeaponProfile::sword();
        let mut m = machine();
        for action in &actions {
            apply(&mut m, action, &sword);

            if m.attack_controller().is_attacking() {
                prop_assert_eq!(m.current_state(), CombatStateKind::Attacking);
            }
            if m.defense().is_dodging() {
                prop_assert_eq!(m.current_state(), CombatStateKind::Dodging);
            }
        }
    }

    #[test]
    fn prop_combo_damage_scales_linearly(base in 1.0f32..200.0, combo in 1u32..8) {
        let settings = CombatSettings::default();
        let damage = outgoing_damage(base, combo, AttackAngle::Front, &settings);
        let expected = base * (1.0 + (combo - 1) as f32 * settings.combo_damage_step);
        prop_assert!((damage - expected).abs() < 1e-3);
        prop_assert!(damage >= base);
    }

    #[test]
    fn prop_consume_is_all_or_nothing(max in 1.0f32..200.0, current in 0.0f32..200.0, cost in 0.0f32..250.0) {
        let mut pool = ResourcePool::with_current(max, current);
        let before = pool.current();
        let ok = pool.consume(cost);

        prop_assert_eq!(ok, before >= cost);
        if ok {
            prop_assert!((pool.current() - (before - cost)).abs() < 1e-3);
        } else {
            prop_assert_eq!(pool.current(), before);
        }
    }
}
