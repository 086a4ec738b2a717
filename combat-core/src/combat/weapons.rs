//! Weapon profiles: per-attack-type timing, damage and reach.
//!
//! Each profile carries a combo chain of named swings. The chain length is
//! the weapon's max combo unless an explicit override is set.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::attack::AttackType;
use crate::settings::CombatSettings;

/// Per-attack-type value table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerAttack<T> {
    pub light: T,
    pub heavy: T,
    pub special: T,
}

impl<T: Copy> PerAttack<T> {
    pub fn get(&self, attack_type: AttackType) -> T {
        match attack_type {
            AttackType::Light => self.light,
            AttackType::Heavy => self.heavy,
            AttackType::Special => self.special,
        }
    }
}

/// A single swing in a combo chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboSwing {
    pub name: String,
    pub damage_mult: f32,
}

#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponProfile {
    pub name: String,
    pub base_damage: f32,
    /// Damage multiplier per attack type, applied before combo scaling
    pub damage_mult: PerAttack<f32>,
    /// Full swing length in seconds at speed 1.0
    pub attack_duration: PerAttack<f32>,
    pub poise_damage: PerAttack<f32>,
    pub animation_speed: f32,
    /// Overrides the chain length when set
    pub max_combo_override: Option<u32>,
    pub reach: f32,
    /// Full sweep arc in degrees, centred on the wielder's facing
    pub sweep_angle: f32,
    pub combo_chain: Vec<ComboSwing>,
}

impl WeaponProfile {
    /// Effective swing length after the animation speed multiplier.
    pub fn duration(&self, attack_type: AttackType) -> f32 {
        let speed = if self.animation_speed > 0.0 {
            self.animation_speed
        } else {
            1.0
        };
        self.attack_duration.get(attack_type) / speed
    }

    pub fn max_combo(&self, settings: &CombatSettings) -> u32 {
        self.max_combo_override
            .or_else(|| u32::try_from(self.combo_chain.len()).ok().filter(|n| *n > 0))
            .unwrap_or(settings.default_max_combo)
            .max(1)
    }

    /// Swing for a 1-based combo index, wrapping over the chain.
    pub fn swing(&self, combo_index: u32) -> Option<&ComboSwing> {
        if self.combo_chain.is_empty() {
            return None;
        }
        let slot = combo_index.saturating_sub(1) as usize % self.combo_chain.len();
        self.combo_chain.get(slot)
    }

    /// Base damage of one swing before angle and combo scaling.
    pub fn swing_damage(&self, attack_type: AttackType, combo_index: u32) -> f32 {
        let swing_mult = self.swing(combo_index).map_or(1.0, |s| s.damage_mult);
        self.base_damage * self.damage_mult.get(attack_type) * swing_mult
    }

    /// Animation clip for a swing, e.g. `sword_light_2`.
    pub fn clip_name(&self, attack_type: AttackType, combo_index: u32) -> String {
        format!(
            "{}_{}_{}",
            self.name.to_lowercase(),
            attack_type.as_str(),
            combo_index
        )
    }

    /// True if `target` lies within reach and the sweep arc.
    pub fn covers(&self, origin: Vec3, facing: f32, target: Vec3) -> bool {
        let offset = Vec3::new(target.x - origin.x, 0.0, target.z - origin.z);
        let distance = offset.length();
        if distance > self.reach {
            return false;
        }
        if distance <= f32::EPSILON {
            return true;
        }
        let forward = Vec3::new(facing.cos(), 0.0, facing.sin());
        let half_arc = (self.sweep_angle * 0.5).to_radians();
        forward.angle_between(offset) <= half_arc
    }

    pub fn sword() -> Self {
        Self {
            name: "Sword".into(),
            base_damage: 30.0,
            damage_mult: PerAttack {
                light: 1.0,
                heavy: 1.6,
                special: 2.2,
            },
            attack_duration: PerAttack {
                light: 0.6,
                heavy: 1.1,
                special: 1.4,
            },
            poise_damage: PerAttack {
                light: 15.0,
                heavy: 35.0,
                special: 45.0,
            },
            animation_speed: 1.0,
            max_combo_override: None,
            reach: 2.2,
            sweep_angle: 120.0,
            combo_chain: vec![
                swing("Horizontal Slash", 1.0),
                swing("Diagonal Cut", 1.1),
                swing("Rising Strike", 1.2),
                swing("Overhead Finisher", 1.5),
            ],
        }
    }

    pub fn spear() -> Self {
        Self {
            name: "Spear".into(),
            base_damage: 25.0,
            damage_mult: PerAttack {
                light: 1.0,
                heavy: 1.5,
                special: 2.0,
            },
            attack_duration: PerAttack {
                light: 0.7,
                heavy: 1.2,
                special: 1.5,
            },
            poise_damage: PerAttack {
                light: 12.0,
                heavy: 30.0,
                special: 40.0,
            },
            animation_speed: 1.1,
            max_combo_override: None,
            reach: 3.5,
            sweep_angle: 40.0,
            combo_chain: vec![
                swing("Quick Thrust", 1.0),
                swing("Double Thrust", 1.15),
                swing("Lunge", 1.4),
            ],
        }
    }

    pub fn hammer() -> Self {
        Self {
            name: "Hammer".into(),
            base_damage: 45.0,
            damage_mult: PerAttack {
                light: 1.0,
                heavy: 1.7,
                special: 2.4,
            },
            attack_duration: PerAttack {
                light: 1.0,
                heavy: 1.6,
                special: 2.0,
            },
            poise_damage: PerAttack {
                light: 30.0,
                heavy: 60.0,
                special: 80.0,
            },
            animation_speed: 0.9,
            max_combo_override: None,
            reach: 2.5,
            sweep_angle: 150.0,
            combo_chain: vec![swing("Wide Swing", 1.0), swing("Ground Slam", 1.6)],
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sword" => Some(Self::sword()),
            "spear" => Some(Self::spear()),
            "hammer" => Some(Self::hammer()),
            _ => None,
        }
    }
}

fn swing(name: &str, damage_mult: f32) -> ComboSwing {
    ComboSwing {
        name: name.into(),
        damage_mult,
    }
}
