//! Actor vitals: health, poise and stamina pools plus placement.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::ActorId;
use crate::settings::CombatSettings;

/// A clamped `current / max` pair. `current` never leaves `[0, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    current: f32,
    max: f32,
}

impl ResourcePool {
    pub fn new(max: f32) -> Self {
        let max = max.max(0.0);
        Self { current: max, max }
    }

    pub fn with_current(max: f32, current: f32) -> Self {
        let mut pool = Self::new(max);
        pool.set(current);
        pool
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn fraction(&self) -> f32 {
        if self.max > 0.0 {
            self.current / self.max
        } else {
            0.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current <= 0.0
    }

    pub fn is_full(&self) -> bool {
        self.current >= self.max
    }

    pub fn set(&mut self, value: f32) {
        self.current = if value.is_finite() {
            value.clamp(0.0, self.max)
        } else {
            0.0
        };
    }

    /// All-or-nothing spend. Leaves the pool untouched and returns false
    /// when `current < cost`.
    pub fn consume(&mut self, cost: f32) -> bool {
        let cost = cost.max(0.0);
        if self.current >= cost {
            self.current = (self.current - cost).clamp(0.0, self.max);
            true
        } else {
            false
        }
    }

    /// Saturating removal. Returns the amount actually removed.
    pub fn drain(&mut self, amount: f32) -> f32 {
        let removed = amount.max(0.0).min(self.current);
        self.current -= removed;
        removed
    }

    /// Returns the amount actually added.
    pub fn restore(&mut self, amount: f32) -> f32 {
        let added = amount.max(0.0).min(self.max - self.current);
        self.current += added;
        added
    }

    pub fn refill(&mut self) {
        self.current = self.max;
    }
}

/// Initial vitals for spawning an actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActorStats {
    pub max_health: f32,
    pub max_poise: f32,
    pub max_stamina: f32,
}

impl Default for ActorStats {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            max_poise: 100.0,
            max_stamina: 100.0,
        }
    }
}

/// The entity under control. Owned by exactly one state machine, whether
/// it runs locally or on the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatActor {
    pub id: ActorId,
    pub health: ResourcePool,
    pub poise: ResourcePool,
    pub stamina: ResourcePool,
    pub position: Vec3,
    /// Yaw in radians, 0 = +X
    pub facing: f32,
    /// Externally granted invulnerability (spawn protection, cutscenes)
    pub invincible: bool,
    last_stamina_use: Option<f32>,
}

impl CombatActor {
    pub fn new(id: ActorId, stats: ActorStats) -> Self {
        Self {
            id,
            health: ResourcePool::new(stats.max_health),
            poise: ResourcePool::new(stats.max_poise),
            stamina: ResourcePool::new(stats.max_stamina),
            position: Vec3::ZERO,
            facing: 0.0,
            invincible: false,
            last_stamina_use: None,
        }
    }

    pub fn at(mut self, position: Vec3, facing: f32) -> Self {
        self.position = position;
        self.facing = facing;
        self
    }

    pub fn is_alive(&self) -> bool {
        !self.health.is_empty()
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(self.facing.cos(), 0.0, self.facing.sin())
    }

    /// Spend stamina for an action; stamps the regen delay on success.
    pub fn spend_stamina(&mut self, cost: f32, now: f32) -> bool {
        if self.stamina.consume(cost) {
            if cost > 0.0 {
                self.last_stamina_use = Some(now);
            }
            true
        } else {
            false
        }
    }

    /// Stamina removed by blocked hits also delays regeneration.
    pub fn drain_stamina(&mut self, amount: f32, now: f32) -> f32 {
        self.last_stamina_use = Some(now);
        self.stamina.drain(amount)
    }

    pub fn regenerate_stamina(&mut self, now: f32, dt: f32, settings: &CombatSettings) {
        let rested = self
            .last_stamina_use
            .map_or(true, |t| now - t >= settings.stamina_regen_delay);
        if rested {
            self.stamina.restore(settings.stamina_regen_rate * dt);
        }
    }

    /// Restore every pool to full (respawn).
    pub fn revive(&mut self) {
        self.health.refill();
        self.poise.refill();
        self.stamina.refill();
        self.last_stamina_use = None;
    }
}
