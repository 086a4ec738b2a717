//! Wire protocol: requests from clients, messages from the authority
//!
//! Everything on the wire is bincode. Requests carry a per-actor sequence
//! number; the authority drops anything not newer than the last one it
//! applied. Client-claimed combo indices and positions are advisory only.

use bevy::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use combat_core::attack::AttackType;
use combat_core::combat::damage::DamageResult;
use combat_core::combat::ActorId;
use combat_core::SkillSpec;

use crate::broadcast::BroadcastEntry;
use crate::record::RecordChange;

// ============================================================================
// Requests
// ============================================================================

/// Action request sent from a client to the authority.
#[derive(Event, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CombatRequest {
    pub actor: ActorId,
    /// Per-actor sequence number (replay/duplicate protection)
    pub sequence: u32,
    /// Client clock when the input was made (diagnostics only)
    pub client_time: f32,
    pub action: RequestedAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestedAction {
    /// `claimed_combo` is what the client predicted; the server ignores it.
    Attack {
        attack_type: AttackType,
        claimed_combo: u32,
    },
    Block {
        held: bool,
    },
    Parry,
    Dodge {
        direction: [f32; 3],
    },
    Skill {
        skill: SkillSpec,
    },
}

/// Discriminant used for cooldowns, permissions and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Attack,
    Block,
    Parry,
    Dodge,
    Skill,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Attack,
        ActionKind::Block,
        ActionKind::Parry,
        ActionKind::Dodge,
        ActionKind::Skill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Attack => "attack",
            ActionKind::Block => "block",
            ActionKind::Parry => "parry",
            ActionKind::Dodge => "dodge",
            ActionKind::Skill => "skill",
        }
    }
}

impl RequestedAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            RequestedAction::Attack { .. } => ActionKind::Attack,
            RequestedAction::Block { .. } => ActionKind::Block,
            RequestedAction::Parry => ActionKind::Parry,
            RequestedAction::Dodge { .. } => ActionKind::Dodge,
            RequestedAction::Skill { .. } => ActionKind::Skill,
        }
    }
}

// ============================================================================
// Authority → observers
// ============================================================================

/// Outcome of one applied request or resolved hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatBroadcast {
    AttackStarted {
        actor: ActorId,
        attack_type: AttackType,
        combo_index: u32,
    },
    BlockChanged {
        actor: ActorId,
        held: bool,
    },
    ParryOpened {
        actor: ActorId,
        window_end: f32,
    },
    DodgeStarted {
        actor: ActorId,
        direction: [f32; 3],
    },
    SkillStarted {
        actor: ActorId,
        name: String,
    },
    HitResolved {
        attacker: ActorId,
        target: ActorId,
        result: DamageResult,
        critical: bool,
    },
    AttackerStaggered {
        attacker: ActorId,
        by: ActorId,
    },
}

impl CombatBroadcast {
    /// The actor whose action or hit this entry describes.
    pub fn subject(&self) -> ActorId {
        match self {
            CombatBroadcast::AttackStarted { actor, .. }
            | CombatBroadcast::BlockChanged { actor, .. }
            | CombatBroadcast::ParryOpened { actor, .. }
            | CombatBroadcast::DodgeStarted { actor, .. }
            | CombatBroadcast::SkillStarted { actor, .. } => *actor,
            CombatBroadcast::HitResolved { target, .. } => *target,
            CombatBroadcast::AttackerStaggered { attacker, .. } => *attacker,
        }
    }
}

/// Everything the authority pushes to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Broadcast(BroadcastEntry),
    Record(RecordChange),
}

// ============================================================================
// Codec
// ============================================================================

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode failed: {0}")]
    Encode(#[source] bincode::Error),
    #[error("decode failed: {0}")]
    Decode(#[source] bincode::Error),
    #[error("broadcast #{seq} failed its digest check")]
    DigestMismatch { seq: u64 },
    #[error("transport channel closed")]
    ChannelClosed,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    bincode::serialize(value).map_err(WireError::Encode)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    bincode::deserialize(bytes).map_err(WireError::Decode)
}

// ============================================================================
// Input sanitizing
// ============================================================================

/// Flatten and normalize a requested dodge direction. Non-finite input is
/// rejected; a zero vector is kept (dodge backwards).
pub fn sanitize_direction(direction: [f32; 3]) -> Option<Vec3> {
    let v = Vec3::from_array(direction);
    if !v.is_finite() {
        return None;
    }
    let flat = Vec3::new(v.x, 0.0, v.z);
    Some(flat.normalize_or_zero())
}

/// Normalize a yaw to `[0, TAU)`. Non-finite input becomes 0.
pub fn sanitize_facing(facing: f32) -> f32 {
    if !facing.is_finite() {
        return 0.0;
    }
    facing.rem_euclid(std::f32::consts::TAU)
}
