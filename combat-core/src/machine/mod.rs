//! Per-actor combat state machine.
//!
//! The machine is the single owner of its actor's combat state. Each tick
//! runs, in order: attack phase controller → defense windows →
//! poise/guard/stamina → current state handler → completion → buffered
//! input retry → safety ceiling.
//!
//! Requested transitions go through the current handler's legality table.
//! Death and hard stagger bypass it as forced interrupts, which also reset
//! every transient attack and defense window.
//!
//! The network authority runs the same machine per actor, built with
//! [`CombatStateMachine::authoritative`]: illegal inputs are refused instead
//! of buffered, and parry windows include the latency allowance.

pub mod states;

use std::fmt;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::combat::actor::CombatActor;
use crate::combat::attack::{AttackPhase, AttackPhaseController, AttackType, CancelKind};
use crate::combat::buffer::{BufferedInput, InputBuffer};
use crate::combat::critical::{apply_critical, detect_critical};
use crate::combat::damage::{outgoing_damage, AttackAngle, DamageEvent, DamageResult};
use crate::combat::defense::{DefenseAttempt, DefenseState, DefenseWindowTracker};
use crate::combat::notifications::{
    AnimationCommand, AnimationEvent, CombatNotification, NotificationBuffer, NotificationSink,
};
use crate::combat::poise::{HitReaction, PoiseArbitrator};
use crate::combat::resolution::{resolve_hit, stagger_duration, HitTarget};
use crate::combat::weapons::WeaponProfile;
use crate::combat::ActorId;
use crate::settings::{CombatSettings, SettingsHandle};
use states::StateTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CombatStateKind {
    #[default]
    Idle,
    Attacking,
    Blocking,
    Dodging,
    Staggered,
    Recovering,
    UsingSkill,
    Dead,
}

impl CombatStateKind {
    pub const ALL: [CombatStateKind; 8] = [
        CombatStateKind::Idle,
        CombatStateKind::Attacking,
        CombatStateKind::Blocking,
        CombatStateKind::Dodging,
        CombatStateKind::Staggered,
        CombatStateKind::Recovering,
        CombatStateKind::UsingSkill,
        CombatStateKind::Dead,
    ];

    pub fn index(&self) -> usize {
        match self {
            CombatStateKind::Idle => 0,
            CombatStateKind::Attacking => 1,
            CombatStateKind::Blocking => 2,
            CombatStateKind::Dodging => 3,
            CombatStateKind::Staggered => 4,
            CombatStateKind::Recovering => 5,
            CombatStateKind::UsingSkill => 6,
            CombatStateKind::Dead => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CombatStateKind::Idle => "idle",
            CombatStateKind::Attacking => "attacking",
            CombatStateKind::Blocking => "blocking",
            CombatStateKind::Dodging => "dodging",
            CombatStateKind::Staggered => "staggered",
            CombatStateKind::Recovering => "recovering",
            CombatStateKind::UsingSkill => "using_skill",
            CombatStateKind::Dead => "dead",
        }
    }
}

impl fmt::Display for CombatStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timed skill. What the skill does is up to the caller; the machine only
/// owns its timing and cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSpec {
    pub name: String,
    pub duration: f32,
    pub stamina_cost: f32,
    pub animation: String,
}

impl SkillSpec {
    pub fn new(name: impl Into<String>, duration: f32, stamina_cost: f32) -> Self {
        let name = name.into();
        Self {
            animation: format!("skill_{}", name.to_lowercase()),
            name,
            duration,
            stamina_cost,
        }
    }
}

/// Read-only projection for cosmetic collaborators (UI, camera, scoring).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub state: CombatStateKind,
    pub health: f32,
    pub max_health: f32,
    pub poise: f32,
    pub max_poise: f32,
    pub stamina: f32,
    pub max_stamina: f32,
    pub invincible: bool,
    pub combo_index: u32,
    pub combo_deadline: Option<f32>,
    pub defense: DefenseState,
    pub attack_phase: AttackPhase,
    pub position: Vec3,
    pub facing: f32,
    pub can_counter: bool,
}

/// Mutable data shared by the state handlers.
pub struct CombatCore {
    actor: CombatActor,
    attack: AttackPhaseController,
    defense: DefenseWindowTracker,
    poise: PoiseArbitrator,
    buffer: InputBuffer,
    notifications: NotificationBuffer,
    animation: Vec<AnimationCommand>,
    settings: SettingsHandle,
    buffer_inputs: bool,
    now: f32,
    state_entered_at: f32,
    stagger_duration: f32,
    pending_stagger: Option<f32>,
    stagger_marker: bool,
    skill: Option<SkillSpec>,
}

impl CombatCore {
    fn new(actor: CombatActor, settings: SettingsHandle) -> Self {
        Self {
            actor,
            attack: AttackPhaseController::new(),
            defense: DefenseWindowTracker::new(),
            poise: PoiseArbitrator::new(),
            buffer: InputBuffer::new(),
            notifications: NotificationBuffer::default(),
            animation: Vec::new(),
            settings,
            buffer_inputs: true,
            now: 0.0,
            state_entered_at: 0.0,
            stagger_duration: 0.0,
            pending_stagger: None,
            stagger_marker: false,
            skill: None,
        }
    }

    pub fn actor(&self) -> &CombatActor {
        &self.actor
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn elapsed_in_state(&self) -> f32 {
        self.now - self.state_entered_at
    }

    fn resolve(&mut self, event: &DamageEvent) -> DamageResult {
        let settings = self.settings.current();
        let hyper_armor = self.attack.is_hyper_armor_active();
        resolve_hit(
            HitTarget {
                actor: &mut self.actor,
                defense: &mut self.defense,
                poise: &mut self.poise,
                hyper_armor,
            },
            event,
            self.now,
            &settings,
        )
    }
}

/// Internal outcome of an action attempt; decides buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionOutcome {
    Accepted,
    Illegal,
    Exhausted,
}

impl From<DefenseAttempt> for ActionOutcome {
    fn from(attempt: DefenseAttempt) -> Self {
        match attempt {
            DefenseAttempt::Started => ActionOutcome::Accepted,
            DefenseAttempt::Busy => ActionOutcome::Illegal,
            DefenseAttempt::InsufficientStamina => ActionOutcome::Exhausted,
        }
    }
}

#[derive(Component)]
pub struct CombatStateMachine {
    core: CombatCore,
    state: CombatStateKind,
    table: StateTable,
}

impl fmt::Debug for CombatStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombatStateMachine")
            .field("actor", &self.core.actor.id)
            .field("state", &self.state)
            .field("now", &self.core.now)
            .finish()
    }
}

impl CombatStateMachine {
    pub fn new(actor: CombatActor, settings: SettingsHandle) -> Self {
        Self {
            core: CombatCore::new(actor, settings),
            state: CombatStateKind::Idle,
            table: StateTable::new(),
        }
    }

    /// Machine for the network authority, with its clock starting at `now`.
    pub fn authoritative(actor: CombatActor, settings: SettingsHandle, now: f32) -> Self {
        let mut machine = Self::new(actor, settings);
        machine.core.defense = DefenseWindowTracker::latency_aware();
        machine.core.buffer_inputs = false;
        machine.core.now = now;
        machine.core.state_entered_at = now;
        machine
    }

    pub fn is_authoritative(&self) -> bool {
        !self.core.buffer_inputs
    }

    pub fn current_state(&self) -> CombatStateKind {
        self.state
    }

    pub fn actor(&self) -> &CombatActor {
        &self.core.actor
    }

    pub fn attack_controller(&self) -> &AttackPhaseController {
        &self.core.attack
    }

    pub fn defense(&self) -> &DefenseWindowTracker {
        &self.core.defense
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.core.settings
    }

    /// Machine clock in seconds since creation.
    pub fn now(&self) -> f32 {
        self.core.now
    }

    /// Place the actor (spawn, teleport). Movement itself is not owned here.
    pub fn place(&mut self, position: Vec3, facing: f32) {
        self.core.actor.position = position;
        self.core.actor.facing = facing;
    }

    /// Legality of `target` according to the current state's table.
    pub fn can_transition_to(&self, target: CombatStateKind) -> bool {
        self.table
            .handler(self.state)
            .can_transition_to(target, &self.core)
    }

    pub fn try_change_state(&mut self, target: CombatStateKind) -> bool {
        if target == self.state {
            return false;
        }
        if !self.can_transition_to(target) {
            trace!(
                "{} rejected transition {} -> {}",
                self.core.actor.id,
                self.state,
                target
            );
            return false;
        }
        self.transition(target);
        true
    }

    /// Unconditional transition for death, hard stagger and respawn.
    /// Resets every transient attack and defense window.
    pub fn force_change_state(&mut self, target: CombatStateKind) {
        if self.state == CombatStateKind::Dead && target != CombatStateKind::Idle {
            debug!(
                "{} is dead, ignoring forced {}",
                self.core.actor.id, target
            );
            return;
        }
        if self.state == target && target != CombatStateKind::Staggered {
            return;
        }
        if target == CombatStateKind::Dead {
            self.core.attack.reset();
        }
        self.interrupt(target);
    }

    /// Hard stagger for `duration` seconds.
    pub fn force_stagger(&mut self, duration: f32) {
        self.core.pending_stagger = Some(duration.max(0.0));
        self.force_change_state(CombatStateKind::Staggered);
    }

    /// Attacking, chaining from the running swing, is legal right now.
    pub fn can_attack(&self) -> bool {
        self.is_chaining() || self.can_transition_to(CombatStateKind::Attacking)
    }

    pub fn can_block(&self) -> bool {
        self.state == CombatStateKind::Blocking || self.can_transition_to(CombatStateKind::Blocking)
    }

    pub fn can_parry(&self) -> bool {
        matches!(
            self.state,
            CombatStateKind::Idle | CombatStateKind::Blocking
        )
    }

    pub fn can_dodge(&self) -> bool {
        self.can_transition_to(CombatStateKind::Dodging)
    }

    pub fn can_use_skill(&self) -> bool {
        self.can_transition_to(CombatStateKind::UsingSkill)
    }

    fn is_chaining(&self) -> bool {
        self.state == CombatStateKind::Attacking
            && (self.core.attack.current_phase() == AttackPhase::ComboWindow
                || self.core.settings.current().allow_swing_restart)
    }

    pub fn try_attack(&mut self, attack_type: AttackType, weapon: &WeaponProfile) -> bool {
        let settings = self.core.settings.current();
        let chaining = self.is_chaining();

        if !chaining && !self.can_transition_to(CombatStateKind::Attacking) {
            debug!(
                "{} attack rejected in {}",
                self.core.actor.id, self.state
            );
            return false;
        }
        let now = self.core.now;
        if !self
            .core
            .actor
            .spend_stamina(attack_type.stamina_cost(&settings), now)
        {
            debug!("{} attack rejected: stamina", self.core.actor.id);
            return false;
        }

        let combo_index = self
            .core
            .attack
            .execute_attack(attack_type, weapon, now, &settings);
        if chaining {
            self.core.state_entered_at = now;
        } else {
            self.transition(CombatStateKind::Attacking);
        }

        self.core.animation.push(AnimationCommand::Play(
            weapon.clip_name(attack_type, combo_index),
        ));
        self.core.animation.push(AnimationCommand::SetInt(
            "combo_index".into(),
            i32::try_from(combo_index).unwrap_or(i32::MAX),
        ));
        self.core.notifications.notify(CombatNotification::ComboAdvanced {
            actor: self.core.actor.id,
            combo_index,
        });
        true
    }

    /// Raise or lower the guard.
    pub fn set_block(&mut self, held: bool) -> bool {
        if held {
            return self.accept_or_buffer(BufferedInput::Block);
        }
        self.core.buffer.cancel_block();
        self.core.defense.set_block(false);
        if self.state == CombatStateKind::Blocking {
            self.try_change_state(CombatStateKind::Idle);
        }
        true
    }

    pub fn try_parry(&mut self) -> bool {
        self.accept_or_buffer(BufferedInput::Parry)
    }

    pub fn try_dodge(&mut self, direction: Vec3) -> bool {
        self.accept_or_buffer(BufferedInput::Dodge(direction))
    }

    pub fn try_use_skill(&mut self, skill: &SkillSpec) -> bool {
        if !self.can_use_skill() {
            return false;
        }
        let now = self.core.now;
        if !self.core.actor.spend_stamina(skill.stamina_cost, now) {
            return false;
        }
        self.core.skill = Some(skill.clone());
        self.transition(CombatStateKind::UsingSkill);
        true
    }

    /// Restore the actor and return it to Idle. Only valid when dead.
    pub fn respawn(&mut self) -> bool {
        if self.state != CombatStateKind::Dead {
            return false;
        }
        self.core.actor.revive();
        self.core.defense.clear();
        self.core.poise.reset();
        self.core.attack.reset();
        self.force_change_state(CombatStateKind::Idle);
        info!("{} respawned", self.core.actor.id);
        true
    }

    pub fn on_animation_event(&mut self, event: AnimationEvent) {
        self.table
            .handler(self.state)
            .on_animation_event(&mut self.core, event);
    }

    /// String form of [`Self::on_animation_event`]. Unknown markers are
    /// ignored and return false.
    pub fn on_animation_event_named(&mut self, name: &str) -> bool {
        match AnimationEvent::from_name(name) {
            Some(event) => {
                self.on_animation_event(event);
                true
            }
            None => {
                debug!("Unknown animation marker {:?}", name);
                false
            }
        }
    }

    /// Resolve an incoming hit and apply the resulting death or stagger.
    pub fn on_hit(&mut self, event: &DamageEvent) -> DamageResult {
        let settings = self.core.settings.current();
        let result = self
            .table
            .handler(self.state)
            .on_hit(&mut self.core, event);

        self.publish_hit(event, &result, &settings);

        if result.killed {
            self.force_change_state(CombatStateKind::Dead);
        } else if let Some(duration) = stagger_duration(&result, &settings) {
            self.force_stagger(duration);
        }
        result
    }

    /// Build the hit the current swing deals to `target`, with angle, combo
    /// and critical modifiers. `None` unless the hitbox is live.
    pub fn outgoing_hit(&self, target: &ActorSnapshot) -> Option<DamageEvent> {
        if !self.core.attack.is_hitbox_active() {
            return None;
        }
        self.swing_hit(target)
    }

    /// The hit the current swing deals to `target` whatever the hitbox says.
    /// The authority times its hits by delay rather than by hitbox.
    pub fn swing_hit(&self, target: &ActorSnapshot) -> Option<DamageEvent> {
        let attack = self.core.attack.current_attack()?;
        let settings = self.core.settings.current();
        let actor = &self.core.actor;

        let angle = AttackAngle::classify(actor.position, target.position, target.facing);
        let damage = outgoing_damage(attack.damage, attack.combo_index, angle, &settings);
        let event = DamageEvent::new(actor.id, damage, attack.poise_damage).with_hit(
            target.position,
            (target.position - actor.position).normalize_or_zero(),
        );

        let can_counter = self.core.defense.can_counter_attack(self.core.now);
        Some(
            match detect_critical(actor.position, can_counter, target, &settings) {
                Some(kind) => apply_critical(event, kind, &settings),
                None => event,
            },
        )
    }

    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.core.now += dt;
        let now = self.core.now;
        let settings = self.core.settings.current();

        for phase in self.core.attack.update(now, &settings) {
            self.core.animation.push(AnimationCommand::SetInt(
                "attack_phase".into(),
                i32::from(phase.ordinal()),
            ));
        }

        if self
            .core
            .defense
            .update(&mut self.core.actor, now, &settings)
        {
            trace!("{} dodge landed", self.core.actor.id);
        }

        if self.core.actor.is_alive() {
            self.core
                .poise
                .regenerate(&mut self.core.actor.poise, now, dt, &settings);
            if !self.core.defense.is_blocking() {
                self.core.actor.regenerate_stamina(now, dt, &settings);
            }
        }

        self.table.handler(self.state).update(&mut self.core, dt);

        let (complete, successor) = {
            let handler = self.table.handler(self.state);
            (handler.is_complete(&self.core), handler.successor())
        };
        if complete {
            self.transition(successor);
        }

        self.retry_buffered_input();
        self.enforce_ceiling(&settings);
    }

    pub fn snapshot(&self) -> ActorSnapshot {
        let actor = &self.core.actor;
        let now = self.core.now;
        ActorSnapshot {
            id: actor.id,
            state: self.state,
            health: actor.health.current(),
            max_health: actor.health.max(),
            poise: actor.poise.current(),
            max_poise: actor.poise.max(),
            stamina: actor.stamina.current(),
            max_stamina: actor.stamina.max(),
            invincible: actor.invincible || self.core.defense.is_invincible(now),
            combo_index: self.core.attack.combo().index(),
            combo_deadline: self.core.attack.combo().deadline(),
            defense: self.core.defense.current_state(now),
            attack_phase: self.core.attack.current_phase(),
            position: actor.position,
            facing: actor.facing,
            can_counter: self.core.defense.can_counter_attack(now),
        }
    }

    pub fn drain_notifications(&mut self) -> Vec<CombatNotification> {
        self.core.notifications.drain()
    }

    pub fn flush_notifications(&mut self, sink: &mut dyn NotificationSink) {
        self.core.notifications.flush_into(sink);
    }

    pub fn drain_animation_commands(&mut self) -> Vec<AnimationCommand> {
        std::mem::take(&mut self.core.animation)
    }

    fn transition(&mut self, target: CombatStateKind) {
        let from = self.state;
        self.table.handler(from).exit(&mut self.core);
        self.state = target;
        self.core.state_entered_at = self.core.now;
        self.table.handler(target).enter(&mut self.core);

        trace!("{} {} -> {}", self.core.actor.id, from, target);
        self.core.notifications.notify(CombatNotification::StateChanged {
            actor: self.core.actor.id,
            from,
            to: target,
        });
    }

    fn interrupt(&mut self, target: CombatStateKind) {
        self.core.attack.cancel_current_attack(CancelKind::Forced);
        self.core.defense.reset();
        self.core.buffer.clear();
        self.transition(target);
    }

    fn accept_or_buffer(&mut self, input: BufferedInput) -> bool {
        match self.attempt(input) {
            ActionOutcome::Accepted => {
                self.core.buffer.clear();
                true
            }
            ActionOutcome::Illegal if !self.core.buffer_inputs => {
                debug!(
                    "{} {:?} refused in {}",
                    self.core.actor.id, input, self.state
                );
                false
            }
            ActionOutcome::Illegal => {
                let settings = self.core.settings.current();
                debug!(
                    "{} buffering {:?} in {}",
                    self.core.actor.id, input, self.state
                );
                self.core.buffer.push(input, self.core.now, &settings);
                false
            }
            ActionOutcome::Exhausted => {
                debug!("{} {:?} rejected: stamina", self.core.actor.id, input);
                false
            }
        }
    }

    fn retry_buffered_input(&mut self) {
        let Some(input) = self.core.buffer.peek(self.core.now) else {
            return;
        };
        match self.attempt(input) {
            ActionOutcome::Accepted => {
                trace!("{} buffered {:?} applied", self.core.actor.id, input);
                self.core.buffer.clear();
            }
            ActionOutcome::Exhausted => self.core.buffer.clear(),
            ActionOutcome::Illegal => {}
        }
    }

    fn attempt(&mut self, input: BufferedInput) -> ActionOutcome {
        match input {
            BufferedInput::Block => self.attempt_block(),
            BufferedInput::Parry => self.attempt_parry(),
            BufferedInput::Dodge(direction) => self.attempt_dodge(direction),
        }
    }

    fn attempt_block(&mut self) -> ActionOutcome {
        if self.state == CombatStateKind::Blocking {
            return self.core.defense.set_block(true).into();
        }
        if !self.can_transition_to(CombatStateKind::Blocking) {
            return ActionOutcome::Illegal;
        }
        let outcome = ActionOutcome::from(self.core.defense.set_block(true));
        if outcome == ActionOutcome::Accepted {
            self.transition(CombatStateKind::Blocking);
        }
        outcome
    }

    fn attempt_parry(&mut self) -> ActionOutcome {
        if !self.can_parry() {
            return ActionOutcome::Illegal;
        }
        let settings = self.core.settings.current();
        let now = self.core.now;
        let outcome = ActionOutcome::from(self.core.defense.try_parry(
            &mut self.core.actor,
            now,
            &settings,
        ));
        if outcome == ActionOutcome::Accepted {
            self.core
                .animation
                .push(AnimationCommand::Play("parry".into()));
        }
        outcome
    }

    fn attempt_dodge(&mut self, direction: Vec3) -> ActionOutcome {
        if !self.can_dodge() {
            return ActionOutcome::Illegal;
        }
        let settings = self.core.settings.current();
        let now = self.core.now;
        let outcome = ActionOutcome::from(self.core.defense.try_dodge(
            direction,
            &mut self.core.actor,
            now,
            &settings,
        ));
        if outcome == ActionOutcome::Accepted {
            self.transition(CombatStateKind::Dodging);
        }
        outcome
    }

    fn publish_hit(&mut self, event: &DamageEvent, result: &DamageResult, settings: &CombatSettings) {
        let id = self.core.actor.id;
        let sink = &mut self.core.notifications;

        if result.was_dodged() {
            if result.perfect_dodge {
                debug!("{} perfect dodge against {}", id, event.attacker);
                sink.notify(CombatNotification::PerfectDodge { actor: id });
            }
            return;
        }
        if result.was_parried() {
            debug!("{} parried {}", id, event.attacker);
            sink.notify(CombatNotification::ParrySucceeded {
                defender: id,
                attacker: event.attacker,
            });
            sink.notify(CombatNotification::HitstopRequested {
                time_scale: settings.parry_hitstop_scale,
                duration: settings.parry_hitstop_duration,
            });
            return;
        }

        if result.final_damage > 0.0 {
            debug!(
                "{} took {:.1} from {} ({:?})",
                id, result.final_damage, event.attacker, result.outcome
            );
            sink.notify(CombatNotification::DamageLanded {
                target: id,
                attacker: event.attacker,
                amount: result.final_damage,
                outcome: result.outcome,
            });
        }
        if result.guard_broken {
            sink.notify(CombatNotification::GuardBroken { actor: id });
        }
        if result.killed {
            info!("{} killed by {}", id, event.attacker);
            sink.notify(CombatNotification::CharacterDied {
                actor: id,
                killer: Some(event.attacker),
            });
            return;
        }
        if result.reaction != HitReaction::None {
            sink.notify(CombatNotification::HitReaction {
                actor: id,
                reaction: result.reaction,
            });
            if result.reaction == HitReaction::Flinch {
                if let Some(clip) = result.reaction.animation_clip() {
                    self.core.animation.push(AnimationCommand::Play(clip.into()));
                }
            }
        }
    }

    fn enforce_ceiling(&mut self, settings: &CombatSettings) {
        let Some(nominal) = self
            .table
            .handler(self.state)
            .nominal_duration(&self.core)
        else {
            return;
        };
        let elapsed = self.core.elapsed_in_state();
        if elapsed <= nominal * settings.state_ceiling_multiplier {
            return;
        }

        warn!(
            "{} stuck in {} for {:.2}s (nominal {:.2}s), forcing Idle",
            self.core.actor.id, self.state, elapsed, nominal
        );
        self.core
            .notifications
            .notify(CombatNotification::AnomalyCorrected {
                actor: self.core.actor.id,
                state: self.state,
                elapsed,
            });
        self.interrupt(CombatStateKind::Idle);
    }
}
