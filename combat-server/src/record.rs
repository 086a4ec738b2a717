//! Authoritative combat records and their observer-side replicas.
//!
//! The authority owns one [`NetworkCombatRecord`] per actor and is its only
//! writer. Every change goes out as a [`RecordChange`] carrying a per-actor
//! revision; replicas apply changes in revision order and refuse anything
//! else.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use combat_core::combat::ActorId;
use combat_core::{ActorSnapshot, CombatStateKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Validates requests and mutates canonical state
    Authority,
    /// Replays the authority's outcomes, never mutates
    Observer,
}

/// Server-owned mirror of one actor's combat state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkCombatRecord {
    pub actor: ActorId,
    pub state: CombatStateKind,
    pub health: f32,
    pub max_health: f32,
    pub poise: f32,
    pub max_poise: f32,
    pub stamina: f32,
    pub max_stamina: f32,
    pub invincible: bool,
    pub combo_index: u32,
    pub combo_window_end: Option<f32>,
    pub parry_window_end: Option<f32>,
    pub position: Vec3,
    pub facing: f32,
}

impl NetworkCombatRecord {
    pub fn is_dead(&self) -> bool {
        self.state == CombatStateKind::Dead
    }

    /// Projection for code that consumes local snapshots (UI, criticals).
    pub fn to_snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            id: self.actor,
            state: self.state,
            health: self.health,
            max_health: self.max_health,
            poise: self.poise,
            max_poise: self.max_poise,
            stamina: self.stamina,
            max_stamina: self.max_stamina,
            invincible: self.invincible,
            combo_index: self.combo_index,
            combo_deadline: self.combo_window_end,
            position: self.position,
            facing: self.facing,
            ..ActorSnapshot::default()
        }
    }
}

/// Ordered change notification for one actor's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub actor: ActorId,
    /// Strictly increasing per actor, starting at 1
    pub revision: u64,
    pub record: NetworkCombatRecord,
}

/// Access to a record according to the holder's role.
pub trait RecordHolder {
    fn role(&self) -> Role;
    fn record(&self) -> &NetworkCombatRecord;
    /// Writable access. `None` for anything but the authority.
    fn record_mut(&mut self) -> Option<&mut NetworkCombatRecord>;
}

/// Authority-side record with its revision counter.
#[derive(Debug, Clone)]
pub struct AuthoritativeRecord {
    record: NetworkCombatRecord,
    revision: u64,
    published: Option<NetworkCombatRecord>,
}

impl AuthoritativeRecord {
    pub fn new(record: NetworkCombatRecord) -> Self {
        Self {
            record,
            revision: 0,
            published: None,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Emit a change if the record differs from what was last published.
    pub fn publish(&mut self) -> Option<RecordChange> {
        if self.published.as_ref() == Some(&self.record) {
            return None;
        }
        self.revision += 1;
        self.published = Some(self.record.clone());
        Some(RecordChange {
            actor: self.record.actor,
            revision: self.revision,
            record: self.record.clone(),
        })
    }
}

impl RecordHolder for AuthoritativeRecord {
    fn role(&self) -> Role {
        Role::Authority
    }

    fn record(&self) -> &NetworkCombatRecord {
        &self.record
    }

    fn record_mut(&mut self) -> Option<&mut NetworkCombatRecord> {
        Some(&mut self.record)
    }
}

/// Observer-side copy, updated only through [`RecordChange`]s.
#[derive(Debug, Clone, Default)]
pub struct ReplicaRecord {
    record: NetworkCombatRecord,
    revision: u64,
}

impl ReplicaRecord {
    pub fn new(actor: ActorId) -> Self {
        Self {
            record: NetworkCombatRecord {
                actor,
                ..Default::default()
            },
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Apply a change. Stale, duplicate or foreign changes are ignored and
    /// return false.
    pub fn apply(&mut self, change: &RecordChange) -> bool {
        if change.actor != self.record.actor || change.revision <= self.revision {
            return false;
        }
        self.record = change.record.clone();
        self.revision = change.revision;
        true
    }
}

impl RecordHolder for ReplicaRecord {
    fn role(&self) -> Role {
        Role::Observer
    }

    fn record(&self) -> &NetworkCombatRecord {
        &self.record
    }

    fn record_mut(&mut self) -> Option<&mut NetworkCombatRecord> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(actor: u64, health: f32) -> NetworkCombatRecord {
        NetworkCombatRecord {
            actor: ActorId(actor),
            health,
            max_health: 100.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_publish_only_on_change() {
        let mut auth = AuthoritativeRecord::new(record(1, 100.0));
        let first = auth.publish().unwrap();
        assert_eq!(first.revision, 1);
        assert!(auth.publish().is_none());

        auth.record_mut().unwrap().health = 80.0;
        let second = auth.publish().unwrap();
        assert_eq!(second.revision, 2);
        assert_eq!(second.record.health, 80.0);
    }

    #[test]
    fn test_replica_applies_in_order() {
        let mut replica = ReplicaRecord::new(ActorId(1));
        let change = |revision, health| RecordChange {
            actor: ActorId(1),
            revision,
            record: record(1, health),
        };

        assert!(replica.apply(&change(1, 90.0)));
        assert!(replica.apply(&change(3, 70.0)));
        // Late arrival of an older revision
        assert!(!replica.apply(&change(2, 80.0)));
        assert!(!replica.apply(&change(3, 70.0)));
        assert_eq!(replica.record().health, 70.0);
        assert_eq!(replica.revision(), 3);
    }

    #[test]
    fn test_replica_rejects_foreign_actor() {
        let mut replica = ReplicaRecord::new(ActorId(1));
        let foreign = RecordChange {
            actor: ActorId(2),
            revision: 1,
            record: record(2, 10.0),
        };
        assert!(!replica.apply(&foreign));
        assert_eq!(replica.revision(), 0);
    }

    #[test]
    fn test_roles() {
        let mut replica = ReplicaRecord::new(ActorId(1));
        assert_eq!(replica.role(), Role::Observer);
        assert!(replica.record_mut().is_none());

        let mut auth = AuthoritativeRecord::new(record(1, 100.0));
        assert_eq!(auth.role(), Role::Authority);
        assert!(auth.record_mut().is_some());
    }
}
