//! Combat Resolution Server: the single mutator of networked combat state
//!
//! Request life cycle: Received → Validated → Applied → Broadcast.
//!
//! Validation drops a request (with a `debug!` reason and a metrics count)
//! unless the actor exists and is alive, the sequence number is newer than
//! the last applied one, the action's cooldown has elapsed, stamina covers
//! the cost and the actor's state machine permits the action. There is no
//! retry.
//!
//! Every actor is driven by an authoritative [`CombatStateMachine`], so
//! legality, windows and reactions are exactly those of local play. Attacks
//! take their combo index from that machine and resolve their hit after a
//! per-type delay, as a spatial sweep against the targets' machines, whose
//! parry windows carry the network latency allowance.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use combat_core::combat::actor::CombatActor;
use combat_core::combat::hitbox::{sweep_targets, LayerMask, SpatialIndex};
use combat_core::combat::weapons::WeaponProfile;
use combat_core::combat::ActorId;
use combat_core::logging::TimingSpan;
use combat_core::{
    ActorSnapshot, CombatSettings, CombatStateKind, CombatStateMachine, SettingsHandle,
};

use crate::broadcast::BroadcastLog;
use crate::metrics::ServerMetrics;
use crate::protocol::{
    sanitize_direction, sanitize_facing, ActionKind, CombatBroadcast, CombatRequest,
    RequestedAction, ServerMessage,
};
use crate::record::{AuthoritativeRecord, NetworkCombatRecord, RecordHolder};

/// Broadcast entries retained for late joiners.
const MAX_LOG_ENTRIES: usize = 4096;

/// Absorbs float drift when comparing a clock against a cooldown deadline.
const TIMER_SLACK: f32 = 1e-4;

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    UnknownActor,
    Dead,
    Stale,
    Cooldown,
    Stamina,
    Forbidden,
    Malformed,
}

impl RejectReason {
    pub const COUNT: usize = 7;

    pub const ALL: [RejectReason; RejectReason::COUNT] = [
        RejectReason::UnknownActor,
        RejectReason::Dead,
        RejectReason::Stale,
        RejectReason::Cooldown,
        RejectReason::Stamina,
        RejectReason::Forbidden,
        RejectReason::Malformed,
    ];

    pub fn index(&self) -> usize {
        match self {
            RejectReason::UnknownActor => 0,
            RejectReason::Dead => 1,
            RejectReason::Stale => 2,
            RejectReason::Cooldown => 3,
            RejectReason::Stamina => 4,
            RejectReason::Forbidden => 5,
            RejectReason::Malformed => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::UnknownActor => "unknown_actor",
            RejectReason::Dead => "dead",
            RejectReason::Stale => "stale",
            RejectReason::Cooldown => "cooldown",
            RejectReason::Stamina => "stamina",
            RejectReason::Forbidden => "forbidden",
            RejectReason::Malformed => "malformed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Applied; carries the sequence number of the broadcast entry
    Applied { broadcast_seq: u64 },
    Rejected(RejectReason),
}

impl RequestOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, RequestOutcome::Applied { .. })
    }
}

/// Whether `machine` allows `action` right now. Releasing a guard is always
/// allowed.
pub fn permits(machine: &CombatStateMachine, action: &RequestedAction) -> bool {
    match action {
        RequestedAction::Attack { .. } => machine.can_attack(),
        RequestedAction::Block { held: true } => machine.can_block(),
        RequestedAction::Block { held: false } => true,
        RequestedAction::Parry => machine.can_parry(),
        RequestedAction::Dodge { .. } => machine.can_dodge(),
        RequestedAction::Skill { .. } => machine.can_use_skill(),
    }
}

/// Sequence numbers compare modulo 2^32 so a long-lived client can wrap.
pub fn is_newer_sequence(sequence: u32, last: u32) -> bool {
    sequence != last && sequence.wrapping_sub(last) < u32::MAX / 2
}

fn action_cost(action: &RequestedAction, settings: &CombatSettings) -> f32 {
    match action {
        RequestedAction::Attack { attack_type, .. } => attack_type.stamina_cost(settings),
        RequestedAction::Block { .. } => 0.0,
        RequestedAction::Parry => settings.parry_stamina_cost,
        RequestedAction::Dodge { .. } => settings.dodge_stamina_cost,
        RequestedAction::Skill { skill } => skill.stamina_cost,
    }
}

fn action_cooldown(kind: ActionKind, settings: &CombatSettings) -> f32 {
    match kind {
        ActionKind::Attack => settings.attack_cooldown,
        ActionKind::Dodge => settings.dodge_cooldown,
        ActionKind::Parry => settings.parry_cooldown,
        ActionKind::Block | ActionKind::Skill => 0.0,
    }
}

// ============================================================================
// Per-actor server state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingHit {
    attacker: ActorId,
    due: f32,
    /// Start time of the swing that scheduled this hit
    attack_start: f32,
}

struct Applied {
    broadcast: CombatBroadcast,
    pending_hit: Option<PendingHit>,
    cancels_hits: bool,
}

struct ServerActor {
    machine: CombatStateMachine,
    weapon: WeaponProfile,
    last_sequence: Option<u32>,
    ready_at: HashMap<ActionKind, f32>,
    record: AuthoritativeRecord,
}

impl ServerActor {
    fn new(actor: CombatActor, weapon: WeaponProfile, settings: SettingsHandle, now: f32) -> Self {
        let record = AuthoritativeRecord::new(NetworkCombatRecord {
            actor: actor.id,
            ..Default::default()
        });
        let mut server_actor = Self {
            machine: CombatStateMachine::authoritative(actor, settings, now),
            weapon,
            last_sequence: None,
            ready_at: HashMap::new(),
            record,
        };
        server_actor.sync_record();
        server_actor
    }

    fn id(&self) -> ActorId {
        self.machine.actor().id
    }

    fn state(&self) -> CombatStateKind {
        self.machine.current_state()
    }

    fn validate(
        &self,
        request: &CombatRequest,
        now: f32,
        settings: &CombatSettings,
    ) -> Result<(), RejectReason> {
        if self.state() == CombatStateKind::Dead || !self.machine.actor().is_alive() {
            return Err(RejectReason::Dead);
        }
        if self
            .last_sequence
            .is_some_and(|last| !is_newer_sequence(request.sequence, last))
        {
            return Err(RejectReason::Stale);
        }
        let kind = request.action.kind();
        if self
            .ready_at
            .get(&kind)
            .is_some_and(|ready| now + TIMER_SLACK < *ready)
        {
            return Err(RejectReason::Cooldown);
        }
        if self.machine.actor().stamina.current() < action_cost(&request.action, settings) {
            return Err(RejectReason::Stamina);
        }
        if !permits(&self.machine, &request.action) {
            return Err(RejectReason::Forbidden);
        }
        Ok(())
    }

    /// Hand a validated action to the machine. A refusal at this point means
    /// a defensive window was busy.
    fn apply(
        &mut self,
        action: &RequestedAction,
        now: f32,
        settings: &CombatSettings,
    ) -> Result<Applied, RejectReason> {
        let id = self.id();
        let was_attacking = self.state() == CombatStateKind::Attacking;
        let (broadcast, pending_hit) = match action {
            RequestedAction::Attack {
                attack_type,
                claimed_combo,
            } => {
                if !self.machine.try_attack(*attack_type, &self.weapon) {
                    return Err(RejectReason::Forbidden);
                }
                let combo_index = self.machine.attack_controller().combo().index();
                if *claimed_combo != combo_index {
                    debug!(
                        "{} claimed combo {} but server says {}",
                        id, claimed_combo, combo_index
                    );
                }
                (
                    CombatBroadcast::AttackStarted {
                        actor: id,
                        attack_type: *attack_type,
                        combo_index,
                    },
                    Some(PendingHit {
                        attacker: id,
                        due: now + attack_type.hit_delay(settings),
                        attack_start: self.machine.now(),
                    }),
                )
            }
            RequestedAction::Block { held } => {
                if !self.machine.set_block(*held) {
                    return Err(RejectReason::Forbidden);
                }
                (CombatBroadcast::BlockChanged { actor: id, held: *held }, None)
            }
            RequestedAction::Parry => {
                if !self.machine.try_parry() {
                    return Err(RejectReason::Forbidden);
                }
                let window_end = self.machine.defense().parry_window_end().unwrap_or(now);
                (CombatBroadcast::ParryOpened { actor: id, window_end }, None)
            }
            RequestedAction::Dodge { direction } => {
                let dir = sanitize_direction(*direction).ok_or(RejectReason::Malformed)?;
                if !self.machine.try_dodge(dir) {
                    return Err(RejectReason::Forbidden);
                }
                (
                    CombatBroadcast::DodgeStarted {
                        actor: id,
                        direction: dir.to_array(),
                    },
                    None,
                )
            }
            RequestedAction::Skill { skill } => {
                if !(skill.duration.is_finite() && skill.duration > 0.0) {
                    return Err(RejectReason::Malformed);
                }
                if !self.machine.try_use_skill(skill) {
                    return Err(RejectReason::Forbidden);
                }
                (
                    CombatBroadcast::SkillStarted {
                        actor: id,
                        name: skill.name.clone(),
                    },
                    None,
                )
            }
        };
        let cancels_hits = pending_hit.is_some()
            || (was_attacking && self.state() != CombatStateKind::Attacking);
        Ok(Applied {
            broadcast,
            pending_hit,
            cancels_hits,
        })
    }

    /// Whether the attacker is still in the swing that scheduled `hit`.
    fn swing_matches(&self, hit: &PendingHit) -> bool {
        self.state() == CombatStateKind::Attacking
            && self
                .machine
                .attack_controller()
                .current_attack()
                .is_some_and(|attack| (attack.start_time - hit.attack_start).abs() <= f32::EPSILON)
    }

    fn update(&mut self, dt: f32) {
        self.machine.update(dt);
        self.discard_presentation();
    }

    /// Observers rebuild notifications from broadcasts; animation is a
    /// client concern.
    fn discard_presentation(&mut self) {
        self.machine.drain_notifications();
        self.machine.drain_animation_commands();
    }

    fn live_record(&self) -> NetworkCombatRecord {
        let snapshot = self.machine.snapshot();
        NetworkCombatRecord {
            actor: snapshot.id,
            state: snapshot.state,
            health: snapshot.health,
            max_health: snapshot.max_health,
            poise: snapshot.poise,
            max_poise: snapshot.max_poise,
            stamina: snapshot.stamina,
            max_stamina: snapshot.max_stamina,
            invincible: snapshot.invincible,
            combo_index: snapshot.combo_index,
            combo_window_end: snapshot.combo_deadline,
            parry_window_end: self.machine.defense().parry_window_end(),
            position: snapshot.position,
            facing: snapshot.facing,
        }
    }

    fn sync_record(&mut self) {
        let live = self.live_record();
        if let Some(record) = self.record.record_mut() {
            *record = live;
        }
    }
}

// ============================================================================
// Authority
// ============================================================================

pub struct CombatAuthority {
    settings: SettingsHandle,
    actors: BTreeMap<ActorId, ServerActor>,
    spatial: SpatialIndex,
    pending_hits: Vec<PendingHit>,
    log: BroadcastLog,
    outbox: Vec<ServerMessage>,
    metrics: Arc<ServerMetrics>,
    now: f32,
    tick: u64,
}

impl CombatAuthority {
    pub fn new(settings: SettingsHandle, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            settings,
            actors: BTreeMap::new(),
            spatial: SpatialIndex::new(),
            pending_hits: Vec::new(),
            log: BroadcastLog::new(),
            outbox: Vec::new(),
            metrics,
            now: 0.0,
            tick: 0,
        }
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn log(&self) -> &BroadcastLog {
        &self.log
    }

    /// Register an actor. Returns false if the id is taken.
    pub fn spawn_actor(&mut self, mut actor: CombatActor, weapon: WeaponProfile) -> bool {
        let id = actor.id;
        if self.actors.contains_key(&id) {
            return false;
        }
        actor.facing = sanitize_facing(actor.facing);
        self.spatial.upsert(id, actor.position, LayerMask::ACTORS);
        self.actors.insert(
            id,
            ServerActor::new(actor, weapon, self.settings.clone(), self.now),
        );
        info!("{} joined the duel", id);
        self.publish(id);
        true
    }

    pub fn remove_actor(&mut self, id: ActorId) -> bool {
        self.pending_hits.retain(|hit| hit.attacker != id);
        self.spatial.remove(id);
        self.actors.remove(&id).is_some()
    }

    /// Movement is owned elsewhere; the authority only takes the result.
    /// Facing is normalized to `[0, TAU)`.
    pub fn place(&mut self, id: ActorId, position: Vec3, facing: f32) -> bool {
        let Some(entry) = self.actors.get_mut(&id) else {
            return false;
        };
        if !position.is_finite() || !facing.is_finite() {
            return false;
        }
        entry.machine.place(position, sanitize_facing(facing));
        self.spatial.upsert(id, position, LayerMask::ACTORS);
        self.publish(id);
        true
    }

    pub fn add_obstacle(&mut self, center: Vec3, radius: f32) {
        self.spatial.add_obstacle(center, radius);
    }

    /// Bring a dead actor back at full vitals.
    pub fn respawn(&mut self, id: ActorId) -> bool {
        let Some(entry) = self.actors.get_mut(&id) else {
            return false;
        };
        if !entry.machine.respawn() {
            return false;
        }
        entry.ready_at.clear();
        entry.discard_presentation();
        self.publish(id);
        true
    }

    pub fn record(&self, id: ActorId) -> Option<&NetworkCombatRecord> {
        self.actors.get(&id).map(|entry| entry.record.record())
    }

    pub fn snapshot(&self, id: ActorId) -> Option<ActorSnapshot> {
        self.actors.get(&id).map(|entry| entry.machine.snapshot())
    }

    /// The machine driving `id`, for inspection.
    pub fn machine(&self, id: ActorId) -> Option<&CombatStateMachine> {
        self.actors.get(&id).map(|entry| &entry.machine)
    }

    pub fn actor_ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.actors.keys().copied()
    }

    /// Validate and apply one request at the current server time.
    pub fn handle_request(&mut self, request: &CombatRequest) -> RequestOutcome {
        self.metrics.record_received();
        let settings = self.settings.current();
        let now = self.now;

        let Some(entry) = self.actors.get_mut(&request.actor) else {
            return self.reject(request, RejectReason::UnknownActor);
        };
        let applied = entry
            .validate(request, now, &settings)
            .and_then(|()| entry.apply(&request.action, now, &settings));
        let applied = match applied {
            Ok(applied) => applied,
            Err(reason) => return self.reject(request, reason),
        };

        let kind = request.action.kind();
        entry.last_sequence = Some(request.sequence);
        entry
            .ready_at
            .insert(kind, now + action_cooldown(kind, &settings));

        if applied.cancels_hits {
            self.pending_hits
                .retain(|hit| hit.attacker != request.actor);
        }
        if let Some(hit) = applied.pending_hit {
            self.pending_hits.push(hit);
        }

        self.metrics.record_accepted();
        debug!(
            "{} #{} {} applied",
            request.actor,
            request.sequence,
            kind.as_str()
        );
        let broadcast_seq = self.emit(applied.broadcast);
        self.publish(request.actor);
        RequestOutcome::Applied { broadcast_seq }
    }

    /// Advance server time, resolve due hits and publish record changes.
    pub fn tick(&mut self, dt: f32) {
        let _span = TimingSpan::new("authority_tick");
        let dt = dt.max(0.0);
        self.now += dt;
        self.tick += 1;
        self.metrics.record_tick();
        let now = self.now;
        let settings = self.settings.current();

        for (id, entry) in self.actors.iter_mut() {
            entry.update(dt);
            self.spatial
                .upsert(*id, entry.machine.actor().position, LayerMask::ACTORS);
        }

        let (mut due, pending): (Vec<PendingHit>, Vec<PendingHit>) = self
            .pending_hits
            .drain(..)
            .partition(|hit| hit.due <= now + TIMER_SLACK);
        self.pending_hits = pending;
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.attacker.cmp(&b.attacker)));
        for hit in due {
            self.resolve_swing(hit, &settings);
        }

        let ids: Vec<ActorId> = self.actors.keys().copied().collect();
        for id in ids {
            self.publish(id);
        }
        self.log.compact(MAX_LOG_ENTRIES);
    }

    /// Everything queued for observers since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn resolve_swing(&mut self, hit: PendingHit, settings: &CombatSettings) {
        let Some((origin, facing, weapon)) = self
            .actors
            .get(&hit.attacker)
            .filter(|entry| entry.swing_matches(&hit))
            .map(|entry| {
                let actor = entry.machine.actor();
                (actor.position, actor.facing, entry.weapon.clone())
            })
        else {
            trace!("{} swing superseded before its hit", hit.attacker);
            return;
        };
        let targets = sweep_targets(&self.spatial, hit.attacker, origin, facing, &weapon);

        for target_hit in targets {
            let Some(snapshot) = self.snapshot(target_hit.id) else {
                continue;
            };
            if snapshot.state == CombatStateKind::Dead {
                continue;
            }
            let Some(event) = self
                .actors
                .get(&hit.attacker)
                .and_then(|entry| entry.machine.swing_hit(&snapshot))
            else {
                break;
            };
            let Some(target) = self.actors.get_mut(&target_hit.id) else {
                continue;
            };

            let result = target.machine.on_hit(&event);
            let interrupted = matches!(
                target.state(),
                CombatStateKind::Dead | CombatStateKind::Staggered
            );
            target.discard_presentation();
            if interrupted {
                self.pending_hits
                    .retain(|pending| pending.attacker != target_hit.id);
            }

            debug!(
                "{} hit {} for {:.1} ({:?})",
                hit.attacker, target_hit.id, result.final_damage, result.outcome
            );
            self.metrics.record_hit();
            self.emit(CombatBroadcast::HitResolved {
                attacker: hit.attacker,
                target: target_hit.id,
                result,
                critical: event.flags.critical,
            });

            if result.attacker_staggered {
                self.stagger_attacker(hit.attacker, target_hit.id, settings);
                break;
            }
        }
    }

    fn stagger_attacker(&mut self, attacker: ActorId, by: ActorId, settings: &CombatSettings) {
        let Some(entry) = self.actors.get_mut(&attacker) else {
            return;
        };
        if entry.state() == CombatStateKind::Dead {
            return;
        }
        entry.machine.force_stagger(settings.stagger_duration);
        entry.discard_presentation();
        self.pending_hits.retain(|hit| hit.attacker != attacker);
        debug!("{} parried by {}, staggered", attacker, by);
        self.emit(CombatBroadcast::AttackerStaggered { attacker, by });
    }

    fn reject(&self, request: &CombatRequest, reason: RejectReason) -> RequestOutcome {
        debug!(
            "{} #{} {} dropped: {}",
            request.actor,
            request.sequence,
            request.action.kind().as_str(),
            reason.as_str()
        );
        self.metrics.record_rejection(reason);
        RequestOutcome::Rejected(reason)
    }

    fn emit(&mut self, payload: CombatBroadcast) -> u64 {
        let entry = self.log.record(self.tick, payload).clone();
        let seq = entry.seq;
        self.outbox.push(ServerMessage::Broadcast(entry));
        self.metrics.record_broadcast();
        seq
    }

    fn publish(&mut self, id: ActorId) {
        let Some(entry) = self.actors.get_mut(&id) else {
            return;
        };
        entry.sync_record();
        if let Some(change) = entry.record.publish() {
            self.outbox.push(ServerMessage::Record(change));
            self.metrics.record_change();
        }
    }
}

impl std::fmt::Debug for CombatAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatAuthority")
            .field("actors", &self.actors.len())
            .field("pending_hits", &self.pending_hits.len())
            .field("log_len", &self.log.len())
            .field("now", &self.now)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
