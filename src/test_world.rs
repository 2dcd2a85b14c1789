//! Hand-built scene of axis-aligned boxes for exercising the simulation in tests.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use bevy::math::Affine3A;
use bevy::prelude::*;

use crate::types::{
    BallisticsWorld, BodyState, DestroyableStats, EntityKind, GridInfo, HitResult, MaterialType,
    PreciseHit, SubpartParent,
};

pub(crate) struct Body {
    pub entity: Entity,
    pub min: Vec3,
    pub max: Vec3,
    pub kind: EntityKind,
    pub physics: bool,
    /// Reported by the broad-phase ray cast.
    pub broad_phase: bool,
    /// Answers exact intersection queries.
    pub precise: bool,
    /// World Y at and above which precise hits land in the head.
    pub head_above: Option<f32>,
    pub velocity: Vec3,
    pub mass: f32,
    pub parent: Option<Entity>,
}

#[derive(Default)]
pub(crate) struct TestWorld {
    ids: World,
    pub bodies: Vec<Body>,
    pub destroyables: HashMap<Entity, DestroyableStats>,
    pub grids: HashMap<Entity, (GridInfo, HashMap<IVec3, Entity>)>,
    pub subparts: HashMap<Entity, SubpartParent>,
    pub gun_owners: HashMap<Entity, Entity>,
    pub materials: HashMap<Entity, MaterialType>,
    pub rifles: HashSet<Entity>,
    pub silent_owners: HashSet<Entity>,
    pub ray_casts: Cell<usize>,
    pub prefetches: Cell<usize>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity handle with no geometry (weapons, actors, grid blocks).
    pub fn spawn_id(&mut self) -> Entity {
        self.ids.spawn_empty().id()
    }

    pub fn add_box(&mut self, min: Vec3, max: Vec3) -> Entity {
        let entity = self.spawn_id();
        self.bodies.push(Body {
            entity,
            min,
            max,
            kind: EntityKind::Generic,
            physics: true,
            broad_phase: true,
            precise: true,
            head_above: None,
            velocity: Vec3::ZERO,
            mass: 1.0e6,
            parent: None,
        });
        entity
    }

    /// Half-metre thick wall across the X axis starting at `x`.
    pub fn add_wall(&mut self, x: f32) -> Entity {
        self.add_box(Vec3::new(x, -10.0, -10.0), Vec3::new(x + 0.5, 10.0, 10.0))
    }

    pub fn add_destroyable_wall(&mut self, x: f32, stats: DestroyableStats) -> Entity {
        let wall = self.add_wall(x);
        self.destroyables.insert(wall, stats);
        wall
    }

    pub fn body_mut(&mut self, entity: Entity) -> &mut Body {
        self.bodies
            .iter_mut()
            .find(|b| b.entity == entity)
            .expect("entity has no body in the test world")
    }

    fn body_of(&self, entity: Entity) -> Option<&Body> {
        self.bodies.iter().find(|b| b.entity == entity)
    }

    pub fn ray_cast_count(&self) -> usize {
        self.ray_casts.get()
    }
}

/// Entry parameter and face normal of a segment against a box.
///
/// Only entries at or after the segment start count; a segment starting
/// inside the box is not a hit.
pub(crate) fn segment_enters_box(from: Vec3, to: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let delta = to - from;
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let (o, d, lo, hi) = (from[axis], delta[axis], min[axis], max[axis]);
        if d.abs() < 1e-9 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let t1 = (lo - o) / d;
        let t2 = (hi - o) / d;
        let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
        if near > t_enter {
            t_enter = near;
            normal = Vec3::ZERO;
            normal[axis] = -d.signum();
        }
        t_exit = t_exit.min(far);
    }

    if t_enter > t_exit || t_enter < 0.0 || t_enter > 1.0 {
        return None;
    }
    Some((t_enter, normal))
}

fn segment_overlaps_box(from: Vec3, to: Vec3, min: Vec3, max: Vec3) -> bool {
    let lo = from.min(to);
    let hi = from.max(to);
    lo.cmple(max).all() && hi.cmpge(min).all()
}

impl BallisticsWorld for TestWorld {
    fn cast_ray(&self, from: Vec3, to: Vec3) -> Option<HitResult> {
        self.ray_casts.set(self.ray_casts.get() + 1);
        let length = (to - from).length();
        self.bodies
            .iter()
            .filter(|b| b.broad_phase)
            .filter_map(|b| {
                segment_enters_box(from, to, b.min, b.max).map(|(t, normal)| HitResult {
                    entity: b.entity,
                    point: from.lerp(to, t),
                    normal,
                    distance: t * length,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn entities_on_segment(&self, from: Vec3, to: Vec3, out: &mut Vec<Entity>) {
        out.extend(
            self.bodies
                .iter()
                .filter(|b| segment_overlaps_box(from, to, b.min, b.max))
                .map(|b| b.entity),
        );
    }

    fn intersect_precise(&self, entity: Entity, from: Vec3, to: Vec3) -> Option<PreciseHit> {
        let body = self.body_of(entity).filter(|b| b.precise)?;
        let (t, normal) = segment_enters_box(from, to, body.min, body.max)?;
        let point = from.lerp(to, t);
        Some(PreciseHit {
            point,
            normal,
            head: body.head_above.is_some_and(|y| point.y >= y),
        })
    }

    fn entity_kind(&self, entity: Entity) -> EntityKind {
        if self.grids.contains_key(&entity) {
            return EntityKind::CellGrid;
        }
        self.body_of(entity).map_or(EntityKind::Generic, |b| b.kind)
    }

    fn has_physics(&self, entity: Entity) -> bool {
        self.body_of(entity).is_some_and(|b| b.physics)
    }

    fn body(&self, entity: Entity) -> BodyState {
        let top = self.top_most_parent(entity);
        self.body_of(top).map_or(
            BodyState {
                linear_velocity: Vec3::ZERO,
                mass: 1.0e6,
            },
            |b| BodyState {
                linear_velocity: b.velocity,
                mass: b.mass,
            },
        )
    }

    fn top_most_parent(&self, entity: Entity) -> Entity {
        let mut current = entity;
        for _ in 0..8 {
            let next = self
                .subparts
                .get(&current)
                .map(|s| s.parent)
                .or_else(|| self.body_of(current).and_then(|b| b.parent));
            match next {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    fn destroyable(&self, entity: Entity) -> Option<DestroyableStats> {
        self.destroyables.get(&entity).copied()
    }

    fn grid(&self, entity: Entity) -> Option<GridInfo> {
        self.grids.get(&entity).map(|(info, _)| *info)
    }

    fn grid_cell(&self, grid: Entity, cell: IVec3) -> Option<Entity> {
        self.grids.get(&grid)?.1.get(&cell).copied()
    }

    fn subpart_parent(&self, entity: Entity) -> Option<SubpartParent> {
        self.subparts.get(&entity).copied()
    }

    fn gun_owner(&self, entity: Entity) -> Option<Entity> {
        self.gun_owners.get(&entity).copied()
    }

    fn surface_material(&self, entity: Entity, _point: Vec3) -> Option<MaterialType> {
        self.materials.get(&entity).cloned()
    }

    fn is_handheld_rifle(&self, weapon: Entity) -> bool {
        self.rifles.contains(&weapon)
    }

    fn suppresses_impact_audio(&self, owner: Entity) -> bool {
        self.silent_owners.contains(&owner)
    }

    fn prefetch_ray(&self, _from: Vec3, _to: Vec3) {
        self.prefetches.set(self.prefetches.get() + 1);
    }
}

/// Grid info for an unrotated grid sitting at `origin`.
pub(crate) fn grid_at(origin: Vec3, cell_size: f32) -> GridInfo {
    GridInfo {
        world_to_local: Affine3A::from_translation(-origin),
        cell_size,
        destruction_enabled: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_enters_box_from_outside() {
        let hit = segment_enters_box(Vec3::ZERO, Vec3::X * 10.0, Vec3::new(4.0, -1.0, -1.0), Vec3::new(5.0, 1.0, 1.0));
        let (t, normal) = hit.unwrap();
        assert!((t - 0.4).abs() < 1e-6);
        assert_eq!(normal, Vec3::NEG_X);
    }

    #[test]
    fn test_segment_starting_inside_is_not_a_hit() {
        let hit = segment_enters_box(Vec3::new(4.5, 0.0, 0.0), Vec3::X * 10.0, Vec3::new(4.0, -1.0, -1.0), Vec3::new(5.0, 1.0, 1.0));
        assert!(hit.is_none());
    }
}
