//! Attack phase controller.
//!
//! ```text
//! None → WindUp → Active → Recovery → ComboWindow → None
//!                 hitbox on  hitbox off  deadline extended
//! ```
//!
//! Animation markers drive the phases once any marker for the current attack
//! has arrived. Until then a fallback timer advances them at fixed fractions
//! of the weapon's swing length. Phases never skip: a marker that would jump
//! ahead is ignored, and the timer steps through every intermediate phase.

use serde::{Deserialize, Serialize};

use super::combo::ComboTracker;
use super::notifications::AnimationEvent;
use super::weapons::WeaponProfile;
use crate::settings::CombatSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackType {
    Light,
    Heavy,
    Special,
}

impl AttackType {
    pub fn stamina_cost(&self, settings: &CombatSettings) -> f32 {
        match self {
            AttackType::Light => settings.light_attack_stamina_cost,
            AttackType::Heavy => settings.heavy_attack_stamina_cost,
            AttackType::Special => settings.special_attack_stamina_cost,
        }
    }

    /// Server-side delay between accepting the attack and detecting hits.
    pub fn hit_delay(&self, settings: &CombatSettings) -> f32 {
        match self {
            AttackType::Light => settings.hit_delay_light,
            AttackType::Heavy => settings.hit_delay_heavy,
            AttackType::Special => settings.hit_delay_special,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::Light => "light",
            AttackType::Heavy => "heavy",
            AttackType::Special => "special",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttackPhase {
    #[default]
    None,
    WindUp,
    Active,
    Recovery,
    ComboWindow,
}

impl AttackPhase {
    pub fn next(&self) -> AttackPhase {
        match self {
            AttackPhase::None => AttackPhase::WindUp,
            AttackPhase::WindUp => AttackPhase::Active,
            AttackPhase::Active => AttackPhase::Recovery,
            AttackPhase::Recovery => AttackPhase::ComboWindow,
            AttackPhase::ComboWindow => AttackPhase::None,
        }
    }

    pub fn ordinal(&self) -> u8 {
        match self {
            AttackPhase::None => 0,
            AttackPhase::WindUp => 1,
            AttackPhase::Active => 2,
            AttackPhase::Recovery => 3,
            AttackPhase::ComboWindow => 4,
        }
    }

    /// Phase a marker moves to, if it is a phase marker at all.
    fn from_marker(event: AnimationEvent) -> Option<AttackPhase> {
        match event {
            AnimationEvent::AttackStart => Some(AttackPhase::WindUp),
            AnimationEvent::HitboxEnable => Some(AttackPhase::Active),
            AnimationEvent::HitboxDisable => Some(AttackPhase::Recovery),
            AnimationEvent::ComboWindowOpen => Some(AttackPhase::ComboWindow),
            AnimationEvent::ComboWindowClose | AnimationEvent::AttackEnd => {
                Some(AttackPhase::None)
            }
            AnimationEvent::DodgeEnd | AnimationEvent::StaggerEnd => None,
        }
    }
}

/// What advances the phases of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseDriver {
    AnimationMarkers,
    FallbackTimer,
}

/// One attack in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackAttempt {
    pub attack_type: AttackType,
    pub combo_index: u32,
    pub phase: AttackPhase,
    pub start_time: f32,
    /// Swing length after the animation speed multiplier
    pub duration: f32,
    pub driver: PhaseDriver,
    pub poise_damage: f32,
    pub damage: f32,
}

impl AttackAttempt {
    pub fn elapsed(&self, now: f32) -> f32 {
        (now - self.start_time).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelKind {
    /// Player-requested; only allowed once the swing has committed
    Voluntary,
    /// Interrupts (stagger, death); always allowed
    Forced,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttackPhaseController {
    current: Option<AttackAttempt>,
    combo: ComboTracker,
    hitbox_active: bool,
}

impl AttackPhaseController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or chain) an attack. Returns the combo index it was given.
    pub fn execute_attack(
        &mut self,
        attack_type: AttackType,
        weapon: &WeaponProfile,
        now: f32,
        settings: &CombatSettings,
    ) -> u32 {
        self.hitbox_active = false;
        let combo_index = self.combo.advance(
            now,
            weapon.max_combo(settings),
            settings.combo_reset_duration,
        );

        self.current = Some(AttackAttempt {
            attack_type,
            combo_index,
            phase: AttackPhase::WindUp,
            start_time: now,
            duration: weapon.duration(attack_type).max(f32::EPSILON),
            driver: PhaseDriver::FallbackTimer,
            poise_damage: weapon.poise_damage.get(attack_type),
            damage: weapon.swing_damage(attack_type, combo_index),
        });
        combo_index
    }

    /// Abort the attack in flight. Voluntary cancels are refused before the
    /// swing reaches Recovery.
    pub fn cancel_current_attack(&mut self, kind: CancelKind) -> bool {
        if self.current.is_none() {
            return false;
        }
        if kind == CancelKind::Voluntary && !self.can_dodge_cancel() {
            return false;
        }
        self.disable_hitbox();
        self.current = None;
        true
    }

    pub fn enable_hitbox(&mut self) {
        if self.current.is_some() {
            self.hitbox_active = true;
        }
    }

    pub fn disable_hitbox(&mut self) {
        self.hitbox_active = false;
    }

    pub fn current_phase(&self) -> AttackPhase {
        self.current
            .as_ref()
            .map_or(AttackPhase::None, |attack| attack.phase)
    }

    pub fn current_attack(&self) -> Option<&AttackAttempt> {
        self.current.as_ref()
    }

    pub fn is_attacking(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_hyper_armor_active(&self) -> bool {
        self.current.as_ref().is_some_and(|attack| {
            attack.attack_type == AttackType::Heavy && attack.phase == AttackPhase::Active
        })
    }

    pub fn can_dodge_cancel(&self) -> bool {
        matches!(
            self.current_phase(),
            AttackPhase::Recovery | AttackPhase::ComboWindow
        )
    }

    pub fn is_hitbox_active(&self) -> bool {
        self.hitbox_active
    }

    pub fn combo(&self) -> &ComboTracker {
        &self.combo
    }

    /// Apply an animation marker. Returns the phase entered, if any.
    pub fn on_marker(
        &mut self,
        event: AnimationEvent,
        now: f32,
        settings: &CombatSettings,
    ) -> Option<AttackPhase> {
        let target = AttackPhase::from_marker(event)?;
        let attack = self.current.as_mut()?;

        if event == AnimationEvent::AttackStart && attack.phase == AttackPhase::WindUp {
            attack.driver = PhaseDriver::AnimationMarkers;
            return None;
        }
        if attack.phase.next() != target {
            tracing::trace!(
                "Ignoring {:?} marker in {:?} phase",
                event,
                attack.phase
            );
            return None;
        }

        attack.driver = PhaseDriver::AnimationMarkers;
        self.enter_phase(target, now, settings);
        Some(target)
    }

    /// Advance the fallback timer. Returns every phase entered, in order.
    pub fn update(&mut self, now: f32, settings: &CombatSettings) -> Vec<AttackPhase> {
        let mut entered = Vec::new();
        let Some(attack) = self.current.as_ref() else {
            self.combo.expire(now);
            return entered;
        };
        if attack.driver != PhaseDriver::FallbackTimer {
            return entered;
        }

        let target = timer_phase(attack.elapsed(now) / attack.duration, settings);
        // None is the end of the swing, not a step backwards
        if target != AttackPhase::None && target.ordinal() < attack.phase.ordinal() {
            return entered;
        }
        while self.current.is_some() && self.current_phase() != target {
            let next = self.current_phase().next();
            self.enter_phase(next, now, settings);
            entered.push(next);
        }
        entered
    }

    /// Clear the attack and the combo chain (death, respawn).
    pub fn reset(&mut self) {
        self.cancel_current_attack(CancelKind::Forced);
        self.combo.reset();
    }

    fn enter_phase(&mut self, phase: AttackPhase, now: f32, settings: &CombatSettings) {
        match phase {
            AttackPhase::Active => self.enable_hitbox(),
            AttackPhase::Recovery => self.disable_hitbox(),
            AttackPhase::ComboWindow => {
                self.combo.extend(now, settings.combo_reset_duration);
            }
            AttackPhase::None => {
                self.disable_hitbox();
                self.current = None;
                return;
            }
            AttackPhase::WindUp => {}
        }
        if let Some(attack) = self.current.as_mut() {
            attack.phase = phase;
        }
    }
}

fn timer_phase(fraction: f32, settings: &CombatSettings) -> AttackPhase {
    if fraction < settings.windup_end_fraction {
        AttackPhase::WindUp
    } else if fraction < settings.active_end_fraction {
        AttackPhase::Active
    } else if fraction < settings.recovery_end_fraction {
        AttackPhase::Recovery
    } else if fraction < 1.0 {
        AttackPhase::ComboWindow
    } else {
        AttackPhase::None
    }
}
