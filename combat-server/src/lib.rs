//! Duel Combat Server Library
//!
//! Network-authoritative combat for duels built on `combat_core`:
//! - Request validation and hit resolution (authority)
//! - Bincode wire protocol and an in-process channel transport
//! - Hash-chained broadcast log with revisioned per-actor records
//! - Observer replay into combat notifications
//! - Server metrics (Prometheus + JSON export)

pub mod authority;
pub mod broadcast;
pub mod metrics;
pub mod observer;
pub mod plugin;
pub mod protocol;
pub mod record;
pub mod session;
pub mod transport;

pub use authority::{CombatAuthority, RejectReason, RequestOutcome};
pub use broadcast::{BroadcastEntry, BroadcastLog};
pub use observer::CombatObserver;
pub use plugin::{CombatServerPlugin, ObservedNotification};
pub use protocol::{CombatBroadcast, CombatRequest, RequestedAction, ServerMessage, WireError};
pub use record::{NetworkCombatRecord, RecordChange, Role};
pub use session::HostSession;
