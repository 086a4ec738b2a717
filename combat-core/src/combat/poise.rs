//! Poise and hyper-armor arbitration.
//!
//! Poise absorbs unmitigated hits. Each hit's effective poise damage, as a
//! fraction of max poise, picks a reaction from the ascending thresholds.
//! While the pool holds, the worst outcome is a flinch; once it breaks the
//! actor is staggered at least, and the pool refills.

use serde::{Deserialize, Serialize};

use super::actor::ResourcePool;
use crate::settings::CombatSettings;

/// Hit reactions in strict priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum HitReaction {
    #[default]
    None,
    Flinch,
    Stagger,
    HeavyStagger,
    Knockback,
    Knockdown,
}

impl HitReaction {
    /// Reactions that interrupt the actor and force the Staggered state.
    pub fn interrupts(&self) -> bool {
        *self >= HitReaction::Stagger
    }

    /// How long the forced stagger lasts. Zero for non-interrupting reactions.
    pub fn duration(&self, settings: &CombatSettings) -> f32 {
        match self {
            HitReaction::None | HitReaction::Flinch => 0.0,
            HitReaction::Stagger => settings.stagger_duration,
            HitReaction::HeavyStagger => settings.heavy_stagger_duration,
            HitReaction::Knockback => settings.knockback_duration,
            HitReaction::Knockdown => settings.knockdown_duration,
        }
    }

    /// Highest reaction whose threshold `ratio` reaches.
    pub fn from_ratio(ratio: f32, settings: &CombatSettings) -> Self {
        if ratio >= settings.knockdown_threshold {
            HitReaction::Knockdown
        } else if ratio >= settings.knockback_threshold {
            HitReaction::Knockback
        } else if ratio >= settings.heavy_stagger_threshold {
            HitReaction::HeavyStagger
        } else if ratio >= settings.stagger_threshold {
            HitReaction::Stagger
        } else if ratio >= settings.flinch_threshold {
            HitReaction::Flinch
        } else {
            HitReaction::None
        }
    }

    pub fn animation_clip(&self) -> Option<&'static str> {
        match self {
            HitReaction::None => None,
            HitReaction::Flinch => Some("hit_flinch"),
            HitReaction::Stagger => Some("hit_stagger"),
            HitReaction::HeavyStagger => Some("hit_heavy_stagger"),
            HitReaction::Knockback => Some("hit_knockback"),
            HitReaction::Knockdown => Some("hit_knockdown"),
        }
    }
}

/// Tracks poise-damage timing for regeneration. The pool itself lives on
/// the actor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoiseArbitrator {
    last_poise_damage: Option<f32>,
}

impl PoiseArbitrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `poise_damage` to `pool` and pick the reaction.
    pub fn apply(
        &mut self,
        pool: &mut ResourcePool,
        poise_damage: f32,
        hyper_armor: bool,
        ignores_poise: bool,
        now: f32,
        settings: &CombatSettings,
    ) -> HitReaction {
        let effective = if hyper_armor {
            poise_damage * (1.0 - settings.hyper_armor_poise_reduction)
        } else {
            poise_damage
        }
        .max(0.0);

        let ratio = if pool.max() > 0.0 {
            effective / pool.max()
        } else {
            1.0
        };

        pool.drain(effective);
        if effective > 0.0 {
            self.last_poise_damage = Some(now);
        }

        let broken = pool.is_empty() || ignores_poise;
        let reaction = if broken {
            pool.refill();
            HitReaction::from_ratio(ratio, settings).max(HitReaction::Stagger)
        } else if ratio >= settings.flinch_threshold {
            HitReaction::Flinch
        } else {
            HitReaction::None
        };

        if hyper_armor && reaction < HitReaction::Knockback {
            HitReaction::None
        } else {
            reaction
        }
    }

    /// Flat poise cost with no reaction (blocked hits).
    pub fn chip(&mut self, pool: &mut ResourcePool, amount: f32, now: f32) {
        if pool.drain(amount) > 0.0 {
            self.last_poise_damage = Some(now);
        }
    }

    pub fn regenerate(
        &self,
        pool: &mut ResourcePool,
        now: f32,
        dt: f32,
        settings: &CombatSettings,
    ) {
        let rested = self
            .last_poise_damage
            .map_or(true, |t| now - t >= settings.poise_regen_delay);
        if rested {
            pool.restore(settings.poise_regen_rate * dt);
        }
    }

    pub fn reset(&mut self) {
        self.last_poise_damage = None;
    }
}
