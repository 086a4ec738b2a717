//! Hit detection against a spatial query seam.
//!
//! The combat core does not own physics. Whatever does (a physics engine, a
//! grid, the in-memory [`SpatialIndex`]) implements [`SpatialQuery`], and
//! swings are resolved as reach + sweep arc + line-of-sight filters on top.

use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::weapons::WeaponProfile;
use super::ActorId;

/// Collision layers a query may be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);
    pub const ACTORS: LayerMask = LayerMask(1);
    pub const PROPS: LayerMask = LayerMask(1 << 1);
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    pub fn intersects(&self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialHit {
    pub id: ActorId,
    pub position: Vec3,
    pub distance: f32,
}

pub trait SpatialQuery {
    /// Everything on `layer_filter` within `radius` of `origin`, nearest first.
    fn query_nearby(&self, origin: Vec3, radius: f32, layer_filter: LayerMask) -> Vec<SpatialHit>;
    fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool;
}

/// Sphere that blocks line of sight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub center: Vec3,
    pub radius: f32,
}

impl Obstacle {
    fn blocks(&self, from: Vec3, to: Vec3) -> bool {
        let segment = to - from;
        let length_sq = segment.length_squared();
        let t = if length_sq > f32::EPSILON {
            ((self.center - from).dot(segment) / length_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = from + segment * t;
        closest.distance_squared(self.center) < self.radius * self.radius
    }
}

/// Brute-force in-memory index. Fine for duels and small arenas.
#[derive(Resource, Debug, Clone, Default)]
pub struct SpatialIndex {
    entries: HashMap<ActorId, (Vec3, LayerMask)>,
    obstacles: Vec<Obstacle>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, id: ActorId, position: Vec3, layer: LayerMask) {
        self.entries.insert(id, (position, layer));
    }

    pub fn remove(&mut self, id: ActorId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn position(&self, id: ActorId) -> Option<Vec3> {
        self.entries.get(&id).map(|(pos, _)| *pos)
    }

    pub fn add_obstacle(&mut self, center: Vec3, radius: f32) {
        self.obstacles.push(Obstacle { center, radius });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SpatialQuery for SpatialIndex {
    fn query_nearby(&self, origin: Vec3, radius: f32, layer_filter: LayerMask) -> Vec<SpatialHit> {
        let mut hits: Vec<SpatialHit> = self
            .entries
            .iter()
            .filter(|(_, (_, layer))| layer.intersects(layer_filter))
            .map(|(id, (position, _))| SpatialHit {
                id: *id,
                position: *position,
                distance: position.distance(origin),
            })
            .filter(|hit| hit.distance <= radius)
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits
    }

    fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool {
        !self.obstacles.iter().any(|o| o.blocks(from, to))
    }
}

/// Actors a swing from `origin` facing `facing` connects with.
pub fn sweep_targets(
    query: &dyn SpatialQuery,
    attacker: ActorId,
    origin: Vec3,
    facing: f32,
    weapon: &WeaponProfile,
) -> Vec<SpatialHit> {
    query
        .query_nearby(origin, weapon.reach, LayerMask::ACTORS)
        .into_iter()
        .filter(|hit| hit.id != attacker)
        .filter(|hit| weapon.covers(origin, facing, hit.position))
        .filter(|hit| query.line_of_sight(origin, hit.position))
        .collect()
}

/// Lock-on helper: nearest visible actor inside a cone of `max_angle`
/// degrees (full arc) around the facing.
pub fn nearest_target(
    query: &dyn SpatialQuery,
    seeker: ActorId,
    origin: Vec3,
    facing: f32,
    radius: f32,
    max_angle: f32,
) -> Option<ActorId> {
    let forward = Vec3::new(facing.cos(), 0.0, facing.sin());
    let half_arc = (max_angle * 0.5).to_radians();

    query
        .query_nearby(origin, radius, LayerMask::ACTORS)
        .into_iter()
        .filter(|hit| hit.id != seeker)
        .find(|hit| {
            let offset = Vec3::new(hit.position.x - origin.x, 0.0, hit.position.z - origin.z);
            let in_cone =
                offset.length_squared() <= f32::EPSILON || forward.angle_between(offset) <= half_arc;
            in_cone && query.line_of_sight(origin, hit.position)
        })
        .map(|hit| hit.id)
}
