//! Observer side of a networked duel.
//!
//! Observers never mutate combat state. They keep a replica per actor, replay
//! the broadcast log in order (verifying each entry's digest and its link to
//! the previous one) and turn authoritative outcomes into the same
//! [`CombatNotification`]s local play produces, so presentation code does not
//! care where a hit was resolved.

use std::collections::BTreeMap;

use bevy::prelude::*;

use combat_core::combat::notifications::{CombatNotification, NotificationBuffer, NotificationSink};
use combat_core::combat::poise::HitReaction;
use combat_core::combat::ActorId;
use combat_core::SettingsHandle;

use crate::broadcast::BroadcastEntry;
use crate::protocol::{CombatBroadcast, ServerMessage, WireError};
use crate::record::{NetworkCombatRecord, RecordChange, RecordHolder, ReplicaRecord};

pub struct CombatObserver {
    settings: SettingsHandle,
    replicas: BTreeMap<ActorId, ReplicaRecord>,
    next_seq: u64,
    last_digest: Option<u64>,
    notifications: NotificationBuffer,
}

impl CombatObserver {
    pub fn new(settings: SettingsHandle) -> Self {
        Self {
            settings,
            replicas: BTreeMap::new(),
            next_seq: 0,
            last_digest: None,
            notifications: NotificationBuffer::default(),
        }
    }

    pub fn record(&self, actor: ActorId) -> Option<&NetworkCombatRecord> {
        self.replicas.get(&actor).map(|replica| replica.record())
    }

    pub fn revision(&self, actor: ActorId) -> u64 {
        self.replicas.get(&actor).map_or(0, ReplicaRecord::revision)
    }

    /// Sequence number of the next broadcast entry this observer expects.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Apply one message. Returns false for duplicates and stale changes,
    /// which are ignored.
    pub fn apply(&mut self, message: &ServerMessage) -> Result<bool, WireError> {
        match message {
            ServerMessage::Record(change) => Ok(self.apply_change(change)),
            ServerMessage::Broadcast(entry) => self.apply_entry(entry),
        }
    }

    fn apply_change(&mut self, change: &RecordChange) -> bool {
        let replica = self
            .replicas
            .entry(change.actor)
            .or_insert_with(|| ReplicaRecord::new(change.actor));
        let before = replica.record().state;
        let had_record = replica.revision() > 0;
        if !replica.apply(change) {
            trace!(
                "{} revision {} ignored (at {})",
                change.actor,
                change.revision,
                replica.revision()
            );
            return false;
        }
        let after = change.record.state;
        if had_record && before != after {
            self.notifications.notify(CombatNotification::StateChanged {
                actor: change.actor,
                from: before,
                to: after,
            });
        }
        true
    }

    fn apply_entry(&mut self, entry: &BroadcastEntry) -> Result<bool, WireError> {
        if entry.seq < self.next_seq {
            return Ok(false);
        }
        if !entry.verify() {
            return Err(WireError::DigestMismatch { seq: entry.seq });
        }
        match self.last_digest {
            Some(last) if entry.seq == self.next_seq && entry.prev_digest != last => {
                return Err(WireError::DigestMismatch { seq: entry.seq });
            }
            Some(_) if entry.seq > self.next_seq => {
                warn!(
                    "broadcast gap: expected #{}, got #{}",
                    self.next_seq, entry.seq
                );
            }
            _ => {}
        }
        self.next_seq = entry.seq + 1;
        self.last_digest = Some(entry.digest);
        self.publish(&entry.payload);
        Ok(true)
    }

    fn publish(&mut self, payload: &CombatBroadcast) {
        let sink = &mut self.notifications;
        match payload {
            CombatBroadcast::AttackStarted {
                actor, combo_index, ..
            } => sink.notify(CombatNotification::ComboAdvanced {
                actor: *actor,
                combo_index: *combo_index,
            }),
            CombatBroadcast::HitResolved {
                attacker,
                target,
                result,
                ..
            } => {
                if result.was_dodged() {
                    if result.perfect_dodge {
                        sink.notify(CombatNotification::PerfectDodge { actor: *target });
                    }
                    return;
                }
                if result.was_parried() {
                    let settings = self.settings.current();
                    sink.notify(CombatNotification::ParrySucceeded {
                        defender: *target,
                        attacker: *attacker,
                    });
                    sink.notify(CombatNotification::HitstopRequested {
                        time_scale: settings.parry_hitstop_scale,
                        duration: settings.parry_hitstop_duration,
                    });
                    return;
                }
                if result.final_damage > 0.0 {
                    sink.notify(CombatNotification::DamageLanded {
                        target: *target,
                        attacker: *attacker,
                        amount: result.final_damage,
                        outcome: result.outcome,
                    });
                }
                if result.guard_broken {
                    sink.notify(CombatNotification::GuardBroken { actor: *target });
                }
                if result.killed {
                    sink.notify(CombatNotification::CharacterDied {
                        actor: *target,
                        killer: Some(*attacker),
                    });
                } else if result.reaction != HitReaction::None {
                    sink.notify(CombatNotification::HitReaction {
                        actor: *target,
                        reaction: result.reaction,
                    });
                }
            }
            CombatBroadcast::BlockChanged { .. }
            | CombatBroadcast::ParryOpened { .. }
            | CombatBroadcast::DodgeStarted { .. }
            | CombatBroadcast::SkillStarted { .. }
            | CombatBroadcast::AttackerStaggered { .. } => {}
        }
    }

    pub fn drain_notifications(&mut self) -> Vec<CombatNotification> {
        self.notifications.drain()
    }

    pub fn flush_notifications(&mut self, sink: &mut dyn NotificationSink) {
        self.notifications.flush_into(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastLog;
    use crate::record::AuthoritativeRecord;
    use combat_core::combat::damage::DamageResult;
    use combat_core::CombatStateKind;

    fn observer() -> CombatObserver {
        CombatObserver::new(SettingsHandle::default())
    }

    fn hit(damage: f32) -> CombatBroadcast {
        CombatBroadcast::HitResolved {
            attacker: ActorId(1),
            target: ActorId(2),
            result: DamageResult::unmitigated(damage),
            critical: false,
        }
    }

    #[test]
    fn test_replays_log_once() {
        let mut log = BroadcastLog::new();
        log.record(1, hit(30.0));
        log.record(2, hit(20.0));

        let mut obs = observer();
        for entry in log.entries() {
            assert!(obs.apply(&ServerMessage::Broadcast(entry.clone())).unwrap());
        }
        // Redelivery is a no-op
        for entry in log.entries() {
            assert!(!obs.apply(&ServerMessage::Broadcast(entry.clone())).unwrap());
        }

        let damage: Vec<f32> = obs
            .drain_notifications()
            .into_iter()
            .filter_map(|n| match n {
                CombatNotification::DamageLanded { amount, .. } => Some(amount),
                _ => None,
            })
            .collect();
        assert_eq!(damage, vec![30.0, 20.0]);
        assert_eq!(obs.next_seq(), 2);
    }

    #[test]
    fn test_tampered_entry_rejected() {
        let mut log = BroadcastLog::new();
        let mut entry = log.record(1, hit(30.0)).clone();
        entry.payload = hit(1.0);

        let mut obs = observer();
        let err = obs.apply(&ServerMessage::Broadcast(entry)).unwrap_err();
        assert!(matches!(err, WireError::DigestMismatch { seq: 0 }));
        assert!(obs.drain_notifications().is_empty());
    }

    #[test]
    fn test_broken_chain_rejected() {
        let mut log = BroadcastLog::new();
        let first = log.record(1, hit(30.0)).clone();
        // Valid on its own, but not chained to `first`
        let forged = BroadcastEntry::new(1, 2, hit(99.0), 12345);

        let mut obs = observer();
        obs.apply(&ServerMessage::Broadcast(first)).unwrap();
        assert!(matches!(
            obs.apply(&ServerMessage::Broadcast(forged)),
            Err(WireError::DigestMismatch { seq: 1 })
        ));
    }

    #[test]
    fn test_record_changes_emit_state_transitions() {
        let mut auth = AuthoritativeRecord::new(NetworkCombatRecord {
            actor: ActorId(2),
            health: 100.0,
            ..Default::default()
        });
        let mut obs = observer();

        let first = auth.publish().unwrap();
        assert!(obs.apply(&ServerMessage::Record(first.clone())).unwrap());

        auth.record_mut().unwrap().state = CombatStateKind::Staggered;
        let second = auth.publish().unwrap();
        assert!(obs.apply(&ServerMessage::Record(second)).unwrap());
        assert!(!obs.apply(&ServerMessage::Record(first)).unwrap());

        assert_eq!(
            obs.drain_notifications(),
            vec![CombatNotification::StateChanged {
                actor: ActorId(2),
                from: CombatStateKind::Idle,
                to: CombatStateKind::Staggered,
            }]
        );
        assert_eq!(obs.record(ActorId(2)).unwrap().state, CombatStateKind::Staggered);
        assert_eq!(obs.revision(ActorId(2)), 2);
    }

    #[test]
    fn test_parry_outcome_requests_hitstop() {
        let mut log = BroadcastLog::new();
        let entry = log
            .record(
                1,
                CombatBroadcast::HitResolved {
                    attacker: ActorId(1),
                    target: ActorId(2),
                    result: DamageResult::parried(),
                    critical: false,
                },
            )
            .clone();
        let mut obs = observer();
        obs.apply(&ServerMessage::Broadcast(entry)).unwrap();

        let notes = obs.drain_notifications();
        assert!(matches!(
            notes[0],
            CombatNotification::ParrySucceeded {
                defender: ActorId(2),
                attacker: ActorId(1)
            }
        ));
        assert!(matches!(notes[1], CombatNotification::HitstopRequested { .. }));
    }
}
