//! Critical attacks: ripostes against a staggered target after a parry, and
//! backstabs against a turned-away target.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::damage::{AttackAngle, DamageEvent, DamageFlags};
use crate::machine::{ActorSnapshot, CombatStateKind};
use crate::settings::CombatSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriticalKind {
    Riposte,
    Backstab,
}

/// Decide whether an attack from `attacker_pos` on `target` is critical.
/// Riposte takes priority over backstab.
pub fn detect_critical(
    attacker_pos: Vec3,
    attacker_can_counter: bool,
    target: &ActorSnapshot,
    settings: &CombatSettings,
) -> Option<CriticalKind> {
    if target.state == CombatStateKind::Dead {
        return None;
    }
    if attacker_can_counter && target.state == CombatStateKind::Staggered {
        return Some(CriticalKind::Riposte);
    }

    let in_range = attacker_pos.distance(target.position) <= settings.critical_range;
    let behind = AttackAngle::classify(attacker_pos, target.position, target.facing)
        == AttackAngle::Back;
    if in_range && behind {
        return Some(CriticalKind::Backstab);
    }
    None
}

/// Turn an ordinary hit into a critical one.
pub fn apply_critical(
    mut event: DamageEvent,
    kind: CriticalKind,
    settings: &CombatSettings,
) -> DamageEvent {
    event.base_damage *= settings.critical_damage_multiplier;
    event.flags = DamageFlags {
        critical: true,
        backstab: kind == CriticalKind::Backstab,
        riposte: kind == CriticalKind::Riposte,
        ignores_poise: true,
    };
    event
}
