//! Per-state behaviour. Handlers are stateless; everything they touch lives
//! in [`CombatCore`], so one table of handlers serves the whole life of a
//! machine.

use std::fmt;

use super::{CombatCore, CombatStateKind};
use crate::combat::attack::AttackPhase;
use crate::combat::damage::{DamageEvent, DamageResult};
use crate::combat::notifications::{AnimationCommand, AnimationEvent};

pub trait StateHandler: Send + Sync {
    fn kind(&self) -> CombatStateKind;

    fn enter(&self, _core: &mut CombatCore) {}

    fn update(&self, _core: &mut CombatCore, _dt: f32) {}

    fn exit(&self, _core: &mut CombatCore) {}

    fn can_transition_to(&self, target: CombatStateKind, core: &CombatCore) -> bool;

    fn on_hit(&self, core: &mut CombatCore, event: &DamageEvent) -> DamageResult {
        core.resolve(event)
    }

    fn on_animation_event(&self, _core: &mut CombatCore, _event: AnimationEvent) {}

    fn is_complete(&self, _core: &CombatCore) -> bool {
        false
    }

    /// Expected time in the state; `None` for open-ended states.
    fn nominal_duration(&self, _core: &CombatCore) -> Option<f32> {
        None
    }

    fn successor(&self) -> CombatStateKind {
        CombatStateKind::Idle
    }
}

/// One pre-built handler per state.
pub struct StateTable {
    handlers: [Box<dyn StateHandler>; 8],
}

impl StateTable {
    pub fn new() -> Self {
        Self {
            handlers: [
                Box::new(IdleState),
                Box::new(AttackingState),
                Box::new(BlockingState),
                Box::new(DodgingState),
                Box::new(StaggeredState),
                Box::new(RecoveringState),
                Box::new(UsingSkillState),
                Box::new(DeadState),
            ],
        }
    }

    pub fn handler(&self, kind: CombatStateKind) -> &dyn StateHandler {
        self.handlers[kind.index()].as_ref()
    }
}

impl Default for StateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.kind()))
            .finish()
    }
}

struct IdleState;

impl StateHandler for IdleState {
    fn kind(&self) -> CombatStateKind {
        CombatStateKind::Idle
    }

    fn can_transition_to(&self, target: CombatStateKind, _core: &CombatCore) -> bool {
        !matches!(target, CombatStateKind::Idle | CombatStateKind::Recovering)
    }
}

struct AttackingState;

impl StateHandler for AttackingState {
    fn kind(&self) -> CombatStateKind {
        CombatStateKind::Attacking
    }

    fn exit(&self, core: &mut CombatCore) {
        use crate::combat::attack::CancelKind;
        if core.attack.is_attacking()
            && !core.attack.cancel_current_attack(CancelKind::Voluntary)
        {
            core.attack.cancel_current_attack(CancelKind::Forced);
        }
    }

    fn can_transition_to(&self, target: CombatStateKind, core: &CombatCore) -> bool {
        match target {
            CombatStateKind::Dodging | CombatStateKind::Blocking | CombatStateKind::UsingSkill => {
                core.attack.can_dodge_cancel()
            }
            CombatStateKind::Idle => {
                !core.attack.is_attacking()
                    || core.attack.current_phase() == AttackPhase::ComboWindow
            }
            CombatStateKind::Staggered | CombatStateKind::Dead => true,
            CombatStateKind::Attacking | CombatStateKind::Recovering => false,
        }
    }

    fn on_animation_event(&self, core: &mut CombatCore, event: AnimationEvent) {
        let settings = core.settings.current();
        if let Some(phase) = core.attack.on_marker(event, core.now, &settings) {
            core.animation.push(AnimationCommand::SetInt(
                "attack_phase".into(),
                i32::from(phase.ordinal()),
            ));
        }
    }

    fn is_complete(&self, core: &CombatCore) -> bool {
        !core.attack.is_attacking()
    }

    fn nominal_duration(&self, core: &CombatCore) -> Option<f32> {
        core.attack.current_attack().map(|attack| attack.duration)
    }
}

struct BlockingState;

impl StateHandler for BlockingState {
    fn kind(&self) -> CombatStateKind {
        CombatStateKind::Blocking
    }

    fn enter(&self, core: &mut CombatCore) {
        core.animation
            .push(AnimationCommand::SetBool("blocking".into(), true));
    }

    fn exit(&self, core: &mut CombatCore) {
        core.defense.set_block(false);
        core.animation
            .push(AnimationCommand::SetBool("blocking".into(), false));
    }

    fn can_transition_to(&self, target: CombatStateKind, _core: &CombatCore) -> bool {
        matches!(
            target,
            CombatStateKind::Idle
                | CombatStateKind::Attacking
                | CombatStateKind::Dodging
                | CombatStateKind::Staggered
                | CombatStateKind::Dead
        )
    }

    fn is_complete(&self, core: &CombatCore) -> bool {
        !core.defense.block_held()
    }
}

struct DodgingState;

impl StateHandler for DodgingState {
    fn kind(&self) -> CombatStateKind {
        CombatStateKind::Dodging
    }

    fn enter(&self, core: &mut CombatCore) {
        core.animation.push(AnimationCommand::Play("dodge".into()));
    }

    fn exit(&self, core: &mut CombatCore) {
        core.defense.cancel_dodge();
    }

    fn can_transition_to(&self, target: CombatStateKind, core: &CombatCore) -> bool {
        match target {
            CombatStateKind::Idle | CombatStateKind::Dead => true,
            CombatStateKind::Attacking => core.settings.current().allow_dodge_attack,
            _ => false,
        }
    }

    fn on_animation_event(&self, core: &mut CombatCore, event: AnimationEvent) {
        if event == AnimationEvent::DodgeEnd {
            core.defense.finish_dodge(&mut core.actor);
        }
    }

    fn is_complete(&self, core: &CombatCore) -> bool {
        !core.defense.is_dodging()
    }

    fn nominal_duration(&self, core: &CombatCore) -> Option<f32> {
        Some(core.settings.current().dodge_duration)
    }
}

struct StaggeredState;

impl StateHandler for StaggeredState {
    fn kind(&self) -> CombatStateKind {
        CombatStateKind::Staggered
    }

    fn enter(&self, core: &mut CombatCore) {
        let default = core.settings.current().stagger_duration;
        core.stagger_duration = core.pending_stagger.take().unwrap_or(default);
        core.stagger_marker = false;
        core.animation.push(AnimationCommand::Play("stagger".into()));
    }

    fn can_transition_to(&self, target: CombatStateKind, _core: &CombatCore) -> bool {
        matches!(target, CombatStateKind::Recovering | CombatStateKind::Dead)
    }

    fn on_animation_event(&self, core: &mut CombatCore, event: AnimationEvent) {
        if event == AnimationEvent::StaggerEnd {
            core.stagger_marker = true;
        }
    }

    fn is_complete(&self, core: &CombatCore) -> bool {
        core.stagger_marker || core.elapsed_in_state() >= core.stagger_duration
    }

    fn nominal_duration(&self, core: &CombatCore) -> Option<f32> {
        Some(core.stagger_duration)
    }

    fn successor(&self) -> CombatStateKind {
        CombatStateKind::Recovering
    }
}

struct RecoveringState;

impl StateHandler for RecoveringState {
    fn kind(&self) -> CombatStateKind {
        CombatStateKind::Recovering
    }

    fn enter(&self, core: &mut CombatCore) {
        core.animation.push(AnimationCommand::Play("recover".into()));
    }

    fn can_transition_to(&self, target: CombatStateKind, _core: &CombatCore) -> bool {
        matches!(
            target,
            CombatStateKind::Idle
                | CombatStateKind::Dodging
                | CombatStateKind::Staggered
                | CombatStateKind::Dead
        )
    }

    fn is_complete(&self, core: &CombatCore) -> bool {
        core.elapsed_in_state() >= core.settings.current().recovering_duration
    }

    fn nominal_duration(&self, core: &CombatCore) -> Option<f32> {
        Some(core.settings.current().recovering_duration)
    }
}

struct UsingSkillState;

impl StateHandler for UsingSkillState {
    fn kind(&self) -> CombatStateKind {
        CombatStateKind::UsingSkill
    }

    fn enter(&self, core: &mut CombatCore) {
        if let Some(clip) = core.skill.as_ref().map(|skill| skill.animation.clone()) {
            core.animation.push(AnimationCommand::Play(clip));
        }
    }

    fn exit(&self, core: &mut CombatCore) {
        core.skill = None;
    }

    fn can_transition_to(&self, target: CombatStateKind, _core: &CombatCore) -> bool {
        matches!(
            target,
            CombatStateKind::Idle | CombatStateKind::Staggered | CombatStateKind::Dead
        )
    }

    fn is_complete(&self, core: &CombatCore) -> bool {
        core.skill
            .as_ref()
            .map_or(true, |skill| core.elapsed_in_state() >= skill.duration)
    }

    fn nominal_duration(&self, core: &CombatCore) -> Option<f32> {
        core.skill.as_ref().map(|skill| skill.duration)
    }
}

struct DeadState;

impl StateHandler for DeadState {
    fn kind(&self) -> CombatStateKind {
        CombatStateKind::Dead
    }

    fn enter(&self, core: &mut CombatCore) {
        core.animation.push(AnimationCommand::Play("death".into()));
    }

    fn can_transition_to(&self, target: CombatStateKind, core: &CombatCore) -> bool {
        target == CombatStateKind::Idle && core.actor.is_alive()
    }

    fn on_hit(&self, _core: &mut CombatCore, _event: &DamageEvent) -> DamageResult {
        DamageResult::ignored()
    }
}
