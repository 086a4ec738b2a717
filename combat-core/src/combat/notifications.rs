//! Outbound notifications and the animation seam.
//!
//! The combat core never calls into presentation directly. Cosmetic
//! collaborators (VFX, audio, camera shake, hitstop, style scoring) receive
//! [`CombatNotification`]s through a [`NotificationSink`]; animation playback
//! is requested as queued [`AnimationCommand`]s and phase markers flow back
//! in as [`AnimationEvent`]s.

use serde::{Deserialize, Serialize};

use super::damage::DefenseOutcome;
use super::poise::HitReaction;
use super::ActorId;
use crate::machine::CombatStateKind;

/// Fire-and-forget combat events for presentation collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatNotification {
    DamageLanded {
        target: ActorId,
        attacker: ActorId,
        amount: f32,
        outcome: DefenseOutcome,
    },
    ParrySucceeded {
        defender: ActorId,
        attacker: ActorId,
    },
    PerfectDodge {
        actor: ActorId,
    },
    GuardBroken {
        actor: ActorId,
    },
    CharacterDied {
        actor: ActorId,
        killer: Option<ActorId>,
    },
    HitReaction {
        actor: ActorId,
        reaction: HitReaction,
    },
    HitstopRequested {
        time_scale: f32,
        duration: f32,
    },
    StateChanged {
        actor: ActorId,
        from: CombatStateKind,
        to: CombatStateKind,
    },
    ComboAdvanced {
        actor: ActorId,
        combo_index: u32,
    },
    AnomalyCorrected {
        actor: ActorId,
        state: CombatStateKind,
        elapsed: f32,
    },
}

/// Receiver for [`CombatNotification`]s. Delivery must not fail or block.
pub trait NotificationSink {
    fn notify(&mut self, notification: CombatNotification);
}

impl NotificationSink for Vec<CombatNotification> {
    fn notify(&mut self, notification: CombatNotification) {
        self.push(notification);
    }
}

/// Pending notifications, drained once per frame by the owner.
#[derive(Debug, Clone, Default)]
pub struct NotificationBuffer {
    pending: Vec<CombatNotification>,
}

impl NotificationBuffer {
    pub fn drain(&mut self) -> Vec<CombatNotification> {
        std::mem::take(&mut self.pending)
    }

    /// Forward everything pending into another sink.
    pub fn flush_into(&mut self, sink: &mut dyn NotificationSink) {
        for notification in self.pending.drain(..) {
            sink.notify(notification);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CombatNotification> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl NotificationSink for NotificationBuffer {
    fn notify(&mut self, notification: CombatNotification) {
        self.pending.push(notification);
    }
}

/// Phase markers embedded in animation clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationEvent {
    AttackStart,
    HitboxEnable,
    HitboxDisable,
    AttackEnd,
    ComboWindowOpen,
    ComboWindowClose,
    DodgeEnd,
    StaggerEnd,
}

impl AnimationEvent {
    /// Parse a marker name. Accepts `PascalCase` and `snake_case`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "attackstart" => Some(Self::AttackStart),
            "hitboxenable" | "hitboxon" => Some(Self::HitboxEnable),
            "hitboxdisable" | "hitboxoff" => Some(Self::HitboxDisable),
            "attackend" => Some(Self::AttackEnd),
            "combowindowopen" => Some(Self::ComboWindowOpen),
            "combowindowclose" => Some(Self::ComboWindowClose),
            "dodgeend" => Some(Self::DodgeEnd),
            "staggerend" => Some(Self::StaggerEnd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AttackStart => "AttackStart",
            Self::HitboxEnable => "HitboxEnable",
            Self::HitboxDisable => "HitboxDisable",
            Self::AttackEnd => "AttackEnd",
            Self::ComboWindowOpen => "ComboWindowOpen",
            Self::ComboWindowClose => "ComboWindowClose",
            Self::DodgeEnd => "DodgeEnd",
            Self::StaggerEnd => "StaggerEnd",
        }
    }
}

/// Playback surface of an animation system.
pub trait AnimationDriver {
    fn play(&mut self, clip: &str);
    fn set_bool(&mut self, parameter: &str, value: bool);
    fn set_int(&mut self, parameter: &str, value: i32);
}

/// Deferred animation request, applied by whoever owns the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimationCommand {
    Play(String),
    SetBool(String, bool),
    SetInt(String, i32),
}

impl AnimationCommand {
    pub fn apply(&self, driver: &mut dyn AnimationDriver) {
        match self {
            Self::Play(clip) => driver.play(clip),
            Self::SetBool(parameter, value) => driver.set_bool(parameter, *value),
            Self::SetInt(parameter, value) => driver.set_int(parameter, *value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDriver {
        log: Vec<String>,
    }

    impl AnimationDriver for RecordingDriver {
        fn play(&mut self, clip: &str) {
            self.log.push(format!("play:{clip}"));
        }
        fn set_bool(&mut self, parameter: &str, value: bool) {
            self.log.push(format!("bool:{parameter}={value}"));
        }
        fn set_int(&mut self, parameter: &str, value: i32) {
            self.log.push(format!("int:{parameter}={value}"));
        }
    }

    #[test]
    fn test_event_from_name() {
        assert_eq!(
            AnimationEvent::from_name("HitboxEnable"),
            Some(AnimationEvent::HitboxEnable)
        );
        assert_eq!(
            AnimationEvent::from_name("combo_window_open"),
            Some(AnimationEvent::ComboWindowOpen)
        );
        assert_eq!(AnimationEvent::from_name("footstep"), None);
    }

    #[test]
    fn test_event_name_round_trips() {
        for event in [
            AnimationEvent::AttackStart,
            AnimationEvent::AttackEnd,
            AnimationEvent::DodgeEnd,
            AnimationEvent::StaggerEnd,
        ] {
            assert_eq!(AnimationEvent::from_name(event.name()), Some(event));
        }
    }

    #[test]
    fn test_commands_apply_to_driver() {
        let mut driver = RecordingDriver::default();
        AnimationCommand::Play("dodge".into()).apply(&mut driver);
        AnimationCommand::SetBool("blocking".into(), true).apply(&mut driver);
        AnimationCommand::SetInt("combo".into(), 2).apply(&mut driver);
        assert_eq!(
            driver.log,
            vec!["play:dodge", "bool:blocking=true", "int:combo=2"]
        );
    }

    #[test]
    fn test_buffer_flush() {
        let mut buffer = NotificationBuffer::default();
        buffer.notify(CombatNotification::PerfectDodge { actor: ActorId(1) });
        assert_eq!(buffer.len(), 1);

        let mut sink: Vec<CombatNotification> = Vec::new();
        buffer.flush_into(&mut sink);
        assert!(buffer.is_empty());
        assert_eq!(sink.len(), 1);
    }
}
