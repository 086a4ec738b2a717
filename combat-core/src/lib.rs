//! Duel Combat Core
//!
//! Deterministic combat resolution for real-time action duels:
//! - Per-actor combat state machine (idle, attacking, blocking, dodging, ...)
//! - Attack phases driven by animation markers with a fallback timer
//! - Parry, dodge and block windows with i-frames and perfect timing
//! - Poise, hyper armor and guard-break arbitration
//! - Combos, directional damage and critical attacks
//! - Hot-reloadable combat settings

pub mod combat;
pub mod logging;
pub mod machine;
pub mod settings;

pub use combat::{attack, defense, guard, poise, resolution};
pub use combat::{
    ActorId, AttackerStaggered, CombatNotificationEvent, CombatPlugin, IncomingHit,
};
pub use machine::{ActorSnapshot, CombatStateKind, CombatStateMachine, SkillSpec};
pub use settings::{CombatSettings, SettingsError, SettingsHandle};
