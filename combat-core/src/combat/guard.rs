//! Guard state and the block / guard-break arbitration.

use serde::{Deserialize, Serialize};

use super::actor::CombatActor;
use crate::settings::CombatSettings;

/// Guard lifecycle. `Broken` and `Recovering` refuse new guard requests.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum GuardState {
    #[default]
    Open,
    Guarding,
    Broken { until: f32 },
    Recovering { until: f32 },
}

/// Outcome of a hit taken on the guard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BlockOutcome {
    Absorbed { final_damage: f32, stamina_cost: f32 },
    GuardBroken { final_damage: f32 },
}

/// Stamina a blocked hit of `damage` costs.
pub fn guard_stamina_damage(damage: f32, settings: &CombatSettings) -> f32 {
    damage.max(0.0) * settings.guard_stamina_damage_ratio
}

/// True iff blocking `damage` with `stamina` left breaks the guard.
pub fn breaks_guard(damage: f32, stamina: f32, settings: &CombatSettings) -> bool {
    guard_stamina_damage(damage, settings) >= stamina
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardArbitrator {
    state: GuardState,
}

impl GuardArbitrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_guarding(&self) -> bool {
        self.state == GuardState::Guarding
    }

    pub fn is_broken(&self) -> bool {
        matches!(
            self.state,
            GuardState::Broken { .. } | GuardState::Recovering { .. }
        )
    }

    /// Raise or lower the guard. Refused while broken or recovering.
    pub fn set_guard_state(&mut self, guarding: bool) -> bool {
        match self.state {
            GuardState::Broken { .. } | GuardState::Recovering { .. } => false,
            _ => {
                self.state = if guarding {
                    GuardState::Guarding
                } else {
                    GuardState::Open
                };
                true
            }
        }
    }

    /// Resolve a hit against a raised guard. Stamina is always consumed from
    /// `actor`; on a break it goes to zero and the full damage passes.
    pub fn absorb(
        &mut self,
        actor: &mut CombatActor,
        damage: f32,
        now: f32,
        settings: &CombatSettings,
    ) -> BlockOutcome {
        let stamina_cost = guard_stamina_damage(damage, settings);

        if stamina_cost >= actor.stamina.current() {
            actor.drain_stamina(actor.stamina.current(), now);
            self.state = GuardState::Broken {
                until: now + settings.guard_break_stagger_duration,
            };
            BlockOutcome::GuardBroken {
                final_damage: damage.max(0.0),
            }
        } else {
            actor.drain_stamina(stamina_cost, now);
            let final_damage = (damage * (1.0 - settings.block_damage_reduction))
                .round()
                .max(0.0);
            BlockOutcome::Absorbed {
                final_damage,
                stamina_cost,
            }
        }
    }

    /// Advance Broken → Recovering → Open.
    pub fn update(&mut self, now: f32, settings: &CombatSettings) {
        match self.state {
            GuardState::Broken { until } if now >= until => {
                self.state = GuardState::Recovering {
                    until: until + settings.guard_recovery_duration,
                };
            }
            GuardState::Recovering { until } if now >= until => {
                self.state = GuardState::Open;
            }
            _ => {}
        }
    }

    /// Drop the guard if raised. Broken guards keep their timers.
    pub fn lower(&mut self) {
        if self.state == GuardState::Guarding {
            self.state = GuardState::Open;
        }
    }

    pub fn reset(&mut self) {
        self.state = GuardState::Open;
    }
}
