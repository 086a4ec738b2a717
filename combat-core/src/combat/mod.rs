//! Combat building blocks shared by local play and the network authority.
//!
//! Leaves first: [`actor`] vitals, [`damage`] records, [`poise`] and
//! [`guard`] arbitration, the [`attack`] phase controller, the [`defense`]
//! window tracker, and the [`resolution`] pipeline that ties them together.
//! [`CombatPlugin`] drives [`CombatStateMachine`] components from Bevy.

use std::fmt;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

pub mod actor;
pub mod attack;
pub mod buffer;
pub mod combo;
pub mod critical;
pub mod damage;
pub mod defense;
pub mod guard;
pub mod hitbox;
pub mod notifications;
pub mod poise;
pub mod resolution;
pub mod weapons;

use crate::machine::{CombatStateKind, CombatStateMachine};
use crate::settings::SettingsHandle;
use damage::DamageEvent;
use notifications::CombatNotification;

/// Stable actor identity shared across the network boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// A hit delivered to `target` this frame.
#[derive(Event, Debug, Clone)]
pub struct IncomingHit {
    pub target: Entity,
    pub event: DamageEvent,
}

/// Notification drained from a machine, tagged with its entity.
#[derive(Event, Debug, Clone)]
pub struct CombatNotificationEvent {
    pub entity: Entity,
    pub notification: CombatNotification,
}

/// A parry landed; the attacker has to be forced into Staggered.
#[derive(Event, Debug, Clone, Copy)]
pub struct AttackerStaggered {
    pub attacker: ActorId,
}

pub struct CombatPlugin;

impl Plugin for CombatPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SettingsHandle>()
            .add_event::<IncomingHit>()
            .add_event::<AttackerStaggered>()
            .add_event::<CombatNotificationEvent>()
            .add_systems(
                Update,
                (
                    tick_combatants,
                    resolve_incoming_hits,
                    apply_attacker_staggers,
                    forward_notifications,
                    sync_combatant_transforms,
                )
                    .chain(),
            );
    }
}

fn tick_combatants(time: Res<Time>, mut query: Query<&mut CombatStateMachine>) {
    let dt = time.delta_secs();
    for mut machine in &mut query {
        machine.update(dt);
    }
}

fn resolve_incoming_hits(
    mut hits: EventReader<IncomingHit>,
    mut query: Query<&mut CombatStateMachine>,
    mut staggers: EventWriter<AttackerStaggered>,
) {
    for hit in hits.read() {
        let Ok(mut machine) = query.get_mut(hit.target) else {
            debug!("Hit on {:?} dropped: no combatant", hit.target);
            continue;
        };
        let result = machine.on_hit(&hit.event);
        if result.attacker_staggered {
            staggers.send(AttackerStaggered {
                attacker: hit.event.attacker,
            });
        }
    }
}

fn apply_attacker_staggers(
    mut staggers: EventReader<AttackerStaggered>,
    mut query: Query<&mut CombatStateMachine>,
) {
    for stagger in staggers.read() {
        for mut machine in &mut query {
            if machine.actor().id == stagger.attacker {
                machine.force_change_state(CombatStateKind::Staggered);
            }
        }
    }
}

fn forward_notifications(
    mut query: Query<(Entity, &mut CombatStateMachine)>,
    mut events: EventWriter<CombatNotificationEvent>,
) {
    for (entity, mut machine) in &mut query {
        for notification in machine.drain_notifications() {
            events.send(CombatNotificationEvent {
                entity,
                notification,
            });
        }
    }
}

fn sync_combatant_transforms(mut query: Query<(&CombatStateMachine, &mut Transform)>) {
    for (machine, mut transform) in &mut query {
        let actor = machine.actor();
        transform.translation = actor.position;
        // Yaw 0 faces +X; Bevy's forward is -Z
        transform.rotation =
            Quat::from_rotation_y(-actor.facing - std::f32::consts::FRAC_PI_2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::actor::{ActorStats, CombatActor};

    #[test]
    fn test_actor_id_display() {
        assert_eq!(ActorId(7).to_string(), "actor#7");
        assert!(ActorId(1) < ActorId(2));
    }

    #[test]
    fn test_plugin_forwards_parry_stagger() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins).add_plugins(CombatPlugin);

        let settings = app.world().resource::<SettingsHandle>().clone();
        let attacker = app
            .world_mut()
            .spawn((
                CombatStateMachine::new(
                    CombatActor::new(ActorId(1), ActorStats::default()),
                    settings.clone(),
                ),
                Transform::default(),
            ))
            .id();
        let defender = app
            .world_mut()
            .spawn((
                CombatStateMachine::new(
                    CombatActor::new(ActorId(2), ActorStats::default()),
                    settings,
                ),
                Transform::default(),
            ))
            .id();

        assert!(app
            .world_mut()
            .get_mut::<CombatStateMachine>(defender)
            .unwrap()
            .try_parry());

        app.world_mut().send_event(IncomingHit {
            target: defender,
            event: DamageEvent::new(ActorId(1), 20.0, 10.0),
        });
        app.update();

        let attacker_state = app
            .world()
            .get::<CombatStateMachine>(attacker)
            .unwrap()
            .current_state();
        assert_eq!(attacker_state, CombatStateKind::Staggered);

        let defender_machine = app.world().get::<CombatStateMachine>(defender).unwrap();
        assert_eq!(defender_machine.actor().health.current(), 100.0);
    }
}
