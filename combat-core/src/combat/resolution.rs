//! Hit resolution pipeline shared by the local state machine and the
//! network authority.
//!
//! 1. Defensive routing (invincibility, parry, block / guard break)
//! 2. Health application
//! 3. Death check
//! 4. Poise arbitration for hits that got through unmitigated

use super::actor::CombatActor;
use super::damage::{DamageEvent, DamageResult, DefenseOutcome};
use super::defense::DefenseWindowTracker;
use super::poise::{HitReaction, PoiseArbitrator};
use crate::settings::CombatSettings;

/// Everything about the defender the pipeline needs besides its pools.
pub struct HitTarget<'a> {
    pub actor: &'a mut CombatActor,
    pub defense: &'a mut DefenseWindowTracker,
    pub poise: &'a mut PoiseArbitrator,
    /// Heavy attack in its active frames
    pub hyper_armor: bool,
}

/// Resolve `event` against `target` at time `now`.
///
/// The returned result names the reaction the owner has to apply: death,
/// a guard-break stagger, or a poise reaction. Attacker stagger on parry is
/// reported through [`DamageResult::attacker_staggered`].
pub fn resolve_hit(
    target: HitTarget<'_>,
    event: &DamageEvent,
    now: f32,
    settings: &CombatSettings,
) -> DamageResult {
    let HitTarget {
        actor,
        defense,
        poise,
        hyper_armor,
    } = target;

    if !actor.is_alive() {
        return DamageResult::ignored();
    }

    let mut result = defense.process_incoming_damage(event, actor, now, settings);
    if matches!(
        result.outcome,
        DefenseOutcome::Dodged | DefenseOutcome::Parried
    ) {
        return result;
    }

    actor.health.drain(result.final_damage);
    if !actor.is_alive() {
        result.killed = true;
        return result;
    }

    result.reaction = if result.guard_broken {
        HitReaction::Stagger
    } else if result.was_blocked() {
        poise.chip(&mut actor.poise, settings.block_poise_cost, now);
        HitReaction::None
    } else {
        poise.apply(
            &mut actor.poise,
            event.poise_damage,
            hyper_armor,
            event.flags.ignores_poise,
            now,
            settings,
        )
    };

    result
}

/// Stagger length the owner should apply for `result`, if any.
pub fn stagger_duration(result: &DamageResult, settings: &CombatSettings) -> Option<f32> {
    if result.killed {
        None
    } else if result.guard_broken {
        Some(settings.guard_break_stagger_duration)
    } else if result.reaction.interrupts() {
        Some(result.reaction.duration(settings))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::actor::ActorStats;
    use crate::combat::damage::DamageFlags;
    use crate::combat::ActorId;

    struct Defender {
        actor: CombatActor,
        defense: DefenseWindowTracker,
        poise: PoiseArbitrator,
    }

    impl Defender {
        fn new() -> Self {
            Self {
                actor: CombatActor::new(ActorId(2), ActorStats::default()),
                defense: DefenseWindowTracker::new(),
                poise: PoiseArbitrator::new(),
            }
        }

        fn take(&mut self, event: &DamageEvent, now: f32, hyper_armor: bool) -> DamageResult {
            let settings = CombatSettings::default();
            resolve_hit(
                HitTarget {
                    actor: &mut self.actor,
                    defense: &mut self.defense,
                    poise: &mut self.poise,
                    hyper_armor,
                },
                event,
                now,
                &settings,
            )
        }
    }

    #[test]
    fn test_invincible_takes_nothing() {
        let mut defender = Defender::new();
        defender.actor.invincible = true;
        let result = defender.take(&DamageEvent::new(ActorId(1), 50.0, 50.0), 0.0, false);
        assert!(result.was_dodged());
        assert_eq!(result.final_damage, 0.0);
        assert_eq!(defender.actor.health.current(), 100.0);
        assert_eq!(defender.actor.poise.current(), 100.0);
    }

    #[test]
    fn test_unmitigated_applies_health_and_poise() {
        let mut defender = Defender::new();
        let result = defender.take(&DamageEvent::new(ActorId(1), 30.0, 20.0), 0.0, false);
        assert_eq!(result.final_damage, 30.0);
        assert_eq!(result.reaction, HitReaction::Flinch);
        assert_eq!(defender.actor.health.current(), 70.0);
        assert_eq!(defender.actor.poise.current(), 80.0);
    }

    #[test]
    fn test_blocked_hit_chips_poise_without_reaction() {
        let mut defender = Defender::new();
        defender.defense.set_block(true);
        let result = defender.take(&DamageEvent::new(ActorId(1), 10.0, 90.0), 0.0, false);
        assert!(result.was_blocked());
        assert_eq!(result.reaction, HitReaction::None);
        assert_eq!(defender.actor.health.current(), 97.0);
        assert_eq!(defender.actor.poise.current(), 90.0);
    }

    #[test]
    fn test_lethal_hit_kills_and_skips_poise() {
        let mut defender = Defender::new();
        defender.actor.health.set(10.0);
        let result = defender.take(&DamageEvent::new(ActorId(1), 25.0, 90.0), 0.0, false);
        assert!(result.killed);
        assert_eq!(result.reaction, HitReaction::None);
        assert!(!defender.actor.is_alive());
        assert_eq!(stagger_duration(&result, &CombatSettings::default()), None);

        let again = defender.take(&DamageEvent::new(ActorId(1), 25.0, 90.0), 0.1, false);
        assert_eq!(again, DamageResult::ignored());
    }

    #[test]
    fn test_guard_break_staggers() {
        let mut defender = Defender::new();
        defender.actor.stamina.set(5.0);
        defender.defense.set_block(true);
        let result = defender.take(&DamageEvent::new(ActorId(1), 20.0, 5.0), 0.0, false);
        assert!(result.guard_broken);
        assert_eq!(result.final_damage, 20.0);
        assert_eq!(
            stagger_duration(&result, &CombatSettings::default()),
            Some(1.5)
        );
    }

    #[test]
    fn test_critical_breaks_poise_through_hyper_armor_only_at_knockback() {
        let mut defender = Defender::new();
        let flags = DamageFlags {
            critical: true,
            riposte: true,
            ignores_poise: true,
            ..Default::default()
        };
        let event = DamageEvent::new(ActorId(1), 10.0, 30.0).with_flags(flags);

        // ratio 0.3 breaks into Stagger, hyper-armor suppresses it
        let result = defender.take(&event, 0.0, true);
        assert_eq!(result.reaction, HitReaction::None);

        let result = defender.take(&event, 0.1, false);
        assert_eq!(result.reaction, HitReaction::Stagger);
    }
}
