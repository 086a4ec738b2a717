//! Damage records: the immutable incoming hit and the single-use result.
//!
//! ```text
//! attacker resolution → DamageEvent → defender pipeline
//!   invincible? → Dodged
//!   parry open? → Parried (attacker staggered)
//!   blocking?   → Blocked (reduced) or guard break (full damage)
//!   otherwise   → unmitigated, poise arbitration
//! → DamageResult
//! ```

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::poise::HitReaction;
use super::ActorId;
use crate::settings::CombatSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Element {
    #[default]
    Physical,
    Fire,
    Ice,
    Lightning,
    Poison,
    Holy,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HitZone {
    #[default]
    Body,
    Head,
    Limb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageFlags {
    pub critical: bool,
    pub backstab: bool,
    pub riposte: bool,
    pub ignores_poise: bool,
}

/// One incoming hit. Consumed exactly once by the defender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageEvent {
    pub attacker: ActorId,
    pub base_damage: f32,
    pub element: Element,
    pub poise_damage: f32,
    pub hit_zone: HitZone,
    pub flags: DamageFlags,
    pub hit_point: Vec3,
    pub direction: Vec3,
}

impl DamageEvent {
    pub fn new(attacker: ActorId, base_damage: f32, poise_damage: f32) -> Self {
        Self {
            attacker,
            base_damage,
            element: Element::Physical,
            poise_damage,
            hit_zone: HitZone::Body,
            flags: DamageFlags::default(),
            hit_point: Vec3::ZERO,
            direction: Vec3::ZERO,
        }
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.element = element;
        self
    }

    pub fn with_flags(mut self, flags: DamageFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_hit(mut self, point: Vec3, direction: Vec3) -> Self {
        self.hit_point = point;
        self.direction = direction;
        self
    }
}

/// Which defensive layer consumed the hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DefenseOutcome {
    #[default]
    None,
    Blocked,
    Parried,
    Dodged,
}

/// Outcome of resolving one [`DamageEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DamageResult {
    pub final_damage: f32,
    pub outcome: DefenseOutcome,
    pub guard_broken: bool,
    pub perfect_dodge: bool,
    /// A parry landed: the attacker must be forced into Staggered
    pub attacker_staggered: bool,
    pub reaction: HitReaction,
    pub killed: bool,
}

impl DamageResult {
    pub fn unmitigated(damage: f32) -> Self {
        Self {
            final_damage: damage.max(0.0),
            ..Default::default()
        }
    }

    pub fn dodged(perfect: bool) -> Self {
        Self {
            outcome: DefenseOutcome::Dodged,
            perfect_dodge: perfect,
            ..Default::default()
        }
    }

    pub fn parried() -> Self {
        Self {
            outcome: DefenseOutcome::Parried,
            attacker_staggered: true,
            ..Default::default()
        }
    }

    pub fn blocked(damage: f32) -> Self {
        Self {
            final_damage: damage.max(0.0),
            outcome: DefenseOutcome::Blocked,
            ..Default::default()
        }
    }

    /// Hit landed on an actor that cannot take damage (already dead).
    pub fn ignored() -> Self {
        Self::default()
    }

    pub fn was_blocked(&self) -> bool {
        self.outcome == DefenseOutcome::Blocked
    }

    pub fn was_parried(&self) -> bool {
        self.outcome == DefenseOutcome::Parried
    }

    pub fn was_dodged(&self) -> bool {
        self.outcome == DefenseOutcome::Dodged
    }
}

/// Attack angle relative to the target's facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackAngle {
    Front, // within ~45° of facing
    Side,
    Back, // behind target
}

impl AttackAngle {
    /// Classify from attacker position to target position/facing (yaw, 0 = +X)
    pub fn classify(attacker_pos: Vec3, target_pos: Vec3, target_facing: f32) -> Self {
        let to_attacker = (attacker_pos - target_pos).normalize_or_zero();
        let target_forward = Vec3::new(target_facing.cos(), 0.0, target_facing.sin());
        let dot = to_attacker.dot(target_forward);

        if dot > 0.707 {
            AttackAngle::Front
        } else if dot < -0.707 {
            AttackAngle::Back
        } else {
            AttackAngle::Side
        }
    }

    pub fn damage_multiplier(&self, settings: &CombatSettings) -> f32 {
        match self {
            AttackAngle::Front => settings.front_damage_multiplier,
            AttackAngle::Side => settings.side_damage_multiplier,
            AttackAngle::Back => settings.back_damage_multiplier,
        }
    }
}

/// Outgoing damage before the defender's pipeline: base × angle × combo.
pub fn outgoing_damage(
    base_damage: f32,
    combo_index: u32,
    angle: AttackAngle,
    settings: &CombatSettings,
) -> f32 {
    let combo_mult = 1.0 + combo_index.saturating_sub(1) as f32 * settings.combo_damage_step;
    base_damage * angle.damage_multiplier(settings) * combo_mult
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_classification() {
        // Target at origin facing +Z, attacker in front
        let front = AttackAngle::classify(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_2,
        );
        assert_eq!(front, AttackAngle::Front);

        let back = AttackAngle::classify(
            Vec3::new(0.0, 0.0, -5.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_2,
        );
        assert_eq!(back, AttackAngle::Back);

        let side = AttackAngle::classify(
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_2,
        );
        assert_eq!(side, AttackAngle::Side);
    }

    #[test]
    fn test_outgoing_damage_combo_and_angle() {
        let settings = CombatSettings::default();
        let first = outgoing_damage(50.0, 1, AttackAngle::Front, &settings);
        assert!((first - 50.0).abs() < 0.01);

        // 50 * 1.4 (back) * 1.3 (third hit)
        let third = outgoing_damage(50.0, 3, AttackAngle::Back, &settings);
        assert!((third - 50.0 * 1.4 * 1.3).abs() < 0.01);
    }

    #[test]
    fn test_result_outcome_flags() {
        assert!(DamageResult::dodged(true).was_dodged());
        assert!(DamageResult::parried().was_parried());
        assert!(DamageResult::parried().attacker_staggered);
        assert!(DamageResult::blocked(3.0).was_blocked());
        let plain = DamageResult::unmitigated(12.0);
        assert!(!plain.was_blocked() && !plain.was_parried() && !plain.was_dodged());
    }
}
