//! Block, parry and dodge windows.
//!
//! - Block: held; reduces damage and drains stamina until the guard breaks
//! - Parry: a tap opens a short window that negates the next hit and
//!   staggers the attacker
//! - Dodge: eased displacement with an invincibility interval; hits at the
//!   start of the interval count as a perfect dodge
//!
//! Incoming hits are routed invincibility → parry → block → unmitigated.
//! A dodge supersedes block and parry; a parry supersedes block.
//!
//! The same tracker runs on the network authority, where it is latency
//! aware: each parry window opened there is widened by the current
//! `network_latency_allowance`.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::actor::CombatActor;
use super::damage::{DamageEvent, DamageResult};
use super::guard::{BlockOutcome, GuardArbitrator};
use crate::settings::CombatSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DefenseState {
    #[default]
    None,
    Blocking,
    Parrying,
    Dodging,
}

/// Why a defensive request did or did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefenseAttempt {
    Started,
    /// Another window or a broken guard is in the way; worth retrying
    Busy,
    InsufficientStamina,
}

impl DefenseAttempt {
    pub fn is_started(&self) -> bool {
        *self == DefenseAttempt::Started
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefenseKind {
    Parry,
    Dodge,
}

/// A timed defensive window. Offsets are relative to `start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefenseWindow {
    pub kind: DefenseKind,
    pub start: f32,
    pub duration: f32,
    pub iframe_start: f32,
    pub iframe_duration: f32,
    pub perfect_window: f32,
}

impl DefenseWindow {
    pub fn parry(start: f32, latency_allowance: f32, settings: &CombatSettings) -> Self {
        Self {
            kind: DefenseKind::Parry,
            start,
            duration: settings.effective_parry_window() + latency_allowance,
            iframe_start: 0.0,
            iframe_duration: 0.0,
            perfect_window: 0.0,
        }
    }

    pub fn dodge(start: f32, settings: &CombatSettings) -> Self {
        Self {
            kind: DefenseKind::Dodge,
            start,
            duration: settings.dodge_duration,
            iframe_start: settings.iframe_start,
            iframe_duration: settings.iframe_duration,
            perfect_window: settings.perfect_dodge_window,
        }
    }

    pub fn elapsed(&self, now: f32) -> f32 {
        now - self.start
    }

    pub fn is_open(&self, now: f32) -> bool {
        let t = self.elapsed(now);
        (0.0..=self.duration).contains(&t)
    }

    pub fn in_iframes(&self, now: f32) -> bool {
        let t = self.elapsed(now);
        self.iframe_duration > 0.0
            && (self.iframe_start..=self.iframe_start + self.iframe_duration).contains(&t)
    }

    pub fn in_perfect_window(&self, now: f32) -> bool {
        let t = self.elapsed(now);
        self.perfect_window > 0.0
            && (self.iframe_start..=self.iframe_start + self.perfect_window).contains(&t)
    }
}

/// Ease-out cubic: fast start, soft landing.
pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DodgeMotion {
    pub origin: Vec3,
    pub direction: Vec3,
    pub distance: f32,
    pub duration: f32,
}

impl DodgeMotion {
    pub fn position_at(&self, elapsed: f32) -> Vec3 {
        let t = if self.duration > 0.0 {
            elapsed / self.duration
        } else {
            1.0
        };
        self.origin + self.direction * self.distance * ease_out_cubic(t)
    }

    pub fn destination(&self) -> Vec3 {
        self.origin + self.direction * self.distance
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefenseWindowTracker {
    latency_aware: bool,
    block_held: bool,
    parry: Option<DefenseWindow>,
    dodge: Option<(DefenseWindow, DodgeMotion)>,
    counter_until: Option<f32>,
    invincible_until: Option<f32>,
    guard: GuardArbitrator,
}

impl DefenseWindowTracker {
    /// Tracker for local play.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker for the network authority. Parry windows absorb client
    /// round-trip by `settings.network_latency_allowance`, read when each
    /// window opens.
    pub fn latency_aware() -> Self {
        Self {
            latency_aware: true,
            ..Self::default()
        }
    }

    pub fn is_latency_aware(&self) -> bool {
        self.latency_aware
    }

    /// Extra parry time under `settings`; zero for local play.
    pub fn latency_allowance(&self, settings: &CombatSettings) -> f32 {
        if self.latency_aware {
            settings.network_latency_allowance.max(0.0)
        } else {
            0.0
        }
    }

    pub fn set_block(&mut self, held: bool) -> DefenseAttempt {
        if !held {
            self.block_held = false;
            self.guard.lower();
            return DefenseAttempt::Started;
        }
        if self.dodge.is_some() || !self.guard.set_guard_state(true) {
            return DefenseAttempt::Busy;
        }
        self.block_held = true;
        DefenseAttempt::Started
    }

    pub fn try_parry(
        &mut self,
        actor: &mut CombatActor,
        now: f32,
        settings: &CombatSettings,
    ) -> DefenseAttempt {
        if self.dodge.is_some()
            || self.guard.is_broken()
            || self.parry.is_some_and(|w| w.is_open(now))
        {
            return DefenseAttempt::Busy;
        }
        if !actor.spend_stamina(settings.parry_stamina_cost, now) {
            return DefenseAttempt::InsufficientStamina;
        }

        let window = DefenseWindow::parry(now, self.latency_allowance(settings), settings);
        trace!(
            "{} parry window open for {:.3}s",
            actor.id,
            window.duration
        );
        self.parry = Some(window);
        DefenseAttempt::Started
    }

    /// Start a dodge. A zero `direction` dodges away from the facing.
    pub fn try_dodge(
        &mut self,
        direction: Vec3,
        actor: &mut CombatActor,
        now: f32,
        settings: &CombatSettings,
    ) -> DefenseAttempt {
        if self.dodge.is_some() || self.guard.is_broken() {
            return DefenseAttempt::Busy;
        }
        if !actor.spend_stamina(settings.dodge_stamina_cost, now) {
            return DefenseAttempt::InsufficientStamina;
        }

        let flat = Vec3::new(direction.x, 0.0, direction.z);
        let direction = if flat.length_squared() > f32::EPSILON {
            flat.normalize()
        } else {
            -actor.forward()
        };

        self.parry = None;
        self.block_held = false;
        self.guard.lower();
        self.dodge = Some((
            DefenseWindow::dodge(now, settings),
            DodgeMotion {
                origin: actor.position,
                direction,
                distance: settings.dodge_distance,
                duration: settings.dodge_duration,
            },
        ));
        DefenseAttempt::Started
    }

    /// Route one hit through the defensive layers. Health is not touched
    /// here; stamina is (block drain and guard break).
    pub fn process_incoming_damage(
        &mut self,
        event: &DamageEvent,
        actor: &mut CombatActor,
        now: f32,
        settings: &CombatSettings,
    ) -> DamageResult {
        if actor.invincible || self.is_invincible(now) {
            let perfect = self
                .dodge
                .as_ref()
                .is_some_and(|(window, _)| window.in_perfect_window(now));
            return DamageResult::dodged(perfect);
        }

        if self.parry.is_some_and(|w| w.is_open(now)) {
            self.parry = None;
            self.counter_until = Some(now + settings.counter_window);
            return DamageResult::parried();
        }

        if self.is_blocking() {
            return match self.guard.absorb(actor, event.base_damage, now, settings) {
                BlockOutcome::Absorbed { final_damage, .. } => DamageResult::blocked(final_damage),
                BlockOutcome::GuardBroken { final_damage } => {
                    self.block_held = false;
                    self.invincible_until = Some(now + settings.guard_break_invincibility);
                    DamageResult {
                        guard_broken: true,
                        ..DamageResult::unmitigated(final_damage)
                    }
                }
            };
        }

        DamageResult::unmitigated(event.base_damage)
    }

    /// Advance timers and the dodge displacement. Returns true on the tick
    /// the dodge finishes.
    pub fn update(&mut self, actor: &mut CombatActor, now: f32, settings: &CombatSettings) -> bool {
        self.guard.update(now, settings);

        if self.parry.is_some_and(|w| !w.is_open(now)) {
            trace!("{} parry window elapsed", actor.id);
            self.parry = None;
        }
        if self.counter_until.is_some_and(|until| now > until) {
            self.counter_until = None;
        }
        if self.invincible_until.is_some_and(|until| now > until) {
            self.invincible_until = None;
        }

        let Some((window, motion)) = self.dodge else {
            return false;
        };
        let elapsed = window.elapsed(now);
        actor.position = motion.position_at(elapsed.min(motion.duration));
        if elapsed >= motion.duration {
            self.dodge = None;
            return true;
        }
        false
    }

    /// Land the dodge immediately (animation reported its end).
    pub fn finish_dodge(&mut self, actor: &mut CombatActor) -> bool {
        match self.dodge.take() {
            Some((_, motion)) => {
                actor.position = motion.destination();
                true
            }
            None => false,
        }
    }

    /// Stop the dodge where it is (dodge-attack cancel).
    pub fn cancel_dodge(&mut self) {
        self.dodge = None;
    }

    pub fn current_state(&self, now: f32) -> DefenseState {
        if self.dodge.is_some() {
            DefenseState::Dodging
        } else if self.parry.is_some_and(|w| w.is_open(now)) {
            DefenseState::Parrying
        } else if self.is_blocking() {
            DefenseState::Blocking
        } else {
            DefenseState::None
        }
    }

    pub fn is_invincible(&self, now: f32) -> bool {
        self.invincible_until.is_some_and(|until| now <= until)
            || self
                .dodge
                .as_ref()
                .is_some_and(|(window, _)| window.in_iframes(now))
    }

    pub fn can_counter_attack(&self, now: f32) -> bool {
        self.counter_until.is_some_and(|until| now <= until)
    }

    pub fn is_dodging(&self) -> bool {
        self.dodge.is_some()
    }

    pub fn is_blocking(&self) -> bool {
        self.block_held && self.dodge.is_none() && self.guard.is_guarding()
    }

    pub fn block_held(&self) -> bool {
        self.block_held
    }

    pub fn guard(&self) -> &GuardArbitrator {
        &self.guard
    }

    pub fn parry_window(&self) -> Option<&DefenseWindow> {
        self.parry.as_ref()
    }

    pub fn dodge_window(&self) -> Option<&DefenseWindow> {
        self.dodge.as_ref().map(|(window, _)| window)
    }

    /// End of the current parry window, if one is open.
    pub fn parry_window_end(&self) -> Option<f32> {
        self.parry.map(|w| w.start + w.duration)
    }

    /// Interrupt cleanup: close every window and drop the guard. A broken
    /// guard and its grace invincibility survive.
    pub fn reset(&mut self) {
        self.parry = None;
        self.dodge = None;
        self.block_held = false;
        self.counter_until = None;
        self.guard.lower();
    }

    /// Full reset (respawn).
    pub fn clear(&mut self) {
        self.reset();
        self.invincible_until = None;
        self.guard.reset();
    }
}
