//! Collision - two-tier hit detection, ignore policy and hit consequences.

#[cfg(feature = "dim3")]
use std::cell::{Cell, RefCell};

use bevy::prelude::*;

#[cfg(feature = "dim3")]
use avian3d::prelude::*;

use crate::components::Projectile;
#[cfg(feature = "dim3")]
use crate::components::{
    ArticulatedActor, CellGrid, Destroyable, GunOwner, HandheldRifle, StructuralCell, Subpart,
    SuppressImpactAudio, SurfaceMaterial, TargetKind,
};
use crate::resources::{AmmoDefinition, BallisticsConfig};
use crate::systems::surface::{resolve_impact, ImpactInput};
use crate::systems::vfx::dispatch_hit_effects;
use crate::types::{
    BallisticsEffects, BallisticsWorld, DamageType, DestroyableStats, EntityKind, HitInfo,
    HitOutcome, HitReport, ProjectileState, ProjectileType, SimulationContext,
};
#[cfg(feature = "dim3")]
use crate::types::{BodyState, GridInfo, HitResult, MaterialType, PreciseHit, SubpartParent};

/// Guards sub-part chains against cycles.
const MAX_PARENT_DEPTH: usize = 8;

impl Projectile {
    /// Nearest valid hit on the segment, or `None`.
    ///
    /// Tier 1 asks the broad phase for the first hit, skipping articulated
    /// actors. Tier 2 gathers every entity overlapping the segment and runs
    /// an exact intersection against each actor, and against everything else
    /// only when tier 1 found nothing valid. The closest valid candidate wins.
    pub(crate) fn find_hit<W>(&mut self, world: &W, from: Vec3, to: Vec3) -> Option<HitInfo>
    where
        W: BallisticsWorld + ?Sized,
    {
        let allow_headshots = self.ammo.as_deref().is_some_and(|ammo| ammo.head_shot);
        let mut best: Option<HitInfo> = None;

        if let Some(ray) = world.cast_ray(from, to) {
            if world.entity_kind(ray.entity) != EntityKind::ArticulatedActor {
                let candidate = HitInfo {
                    entity: ray.entity,
                    destroyable: resolve_destroyable(world, ray.entity, ray.point),
                    position: ray.point,
                    normal: ray.normal,
                    headshot: false,
                    distance_sq: ray.point.distance_squared(from),
                };
                if !self.is_ignored_hit(world, &candidate) {
                    best = Some(candidate);
                }
            }
        }
        let broad_phase_hit = best.is_some();

        let mut scratch = std::mem::take(&mut self.segment_scratch);
        scratch.clear();
        world.entities_on_segment(from, to, &mut scratch);

        for &entity in &scratch {
            let is_actor = world.entity_kind(entity) == EntityKind::ArticulatedActor;
            if !is_actor && broad_phase_hit {
                continue;
            }
            let Some(precise) = world.intersect_precise(entity, from, to) else {
                continue;
            };
            let distance_sq = precise.point.distance_squared(from);
            if best.as_ref().is_some_and(|b| b.distance_sq <= distance_sq) {
                continue;
            }
            let candidate = HitInfo {
                entity,
                destroyable: resolve_destroyable(world, entity, precise.point),
                position: precise.point,
                normal: precise.normal,
                headshot: precise.head && allow_headshots,
                distance_sq,
            };
            if !self.is_ignored_hit(world, &candidate) {
                best = Some(candidate);
            }
        }

        self.segment_scratch = scratch;
        best
    }

    /// Whether a candidate hit should be passed through.
    pub fn is_ignored_hit<W>(&self, world: &W, hit: &HitInfo) -> bool
    where
        W: BallisticsWorld + ?Sized,
    {
        if !world.has_physics(hit.entity) {
            return true;
        }
        if let Some(ignore) = self.ignore_entity {
            if hit.entity == ignore {
                return true;
            }
            // The wielder of a hand-held weapon.
            if world.gun_owner(ignore) == Some(hit.entity)
                && world.entity_kind(hit.entity) == EntityKind::ArticulatedActor
            {
                return true;
            }
        }
        // Exiting a surface, not entering it.
        if hit.normal.dot(self.direction) > 0.0 {
            return true;
        }
        hit.destroyable
            .is_some_and(|target| self.penetrated.contains(&target))
    }

    /// Applies every consequence of reaching a hit, then redirects the projectile.
    pub(crate) fn consume_hit<W, E>(
        &mut self,
        hit: HitInfo,
        world: &W,
        effects: &mut E,
        ctx: &mut SimulationContext,
        config: &BallisticsConfig,
    ) where
        W: BallisticsWorld + ?Sized,
        E: BallisticsEffects + ?Sized,
    {
        let Some(ammo) = self.ammo.clone() else {
            warn!("Projectile consumed a hit without ammunition; killing it");
            self.transition(ProjectileState::Killed);
            return;
        };

        dispatch_hit_effects(world, effects, &hit, &ammo, self.weapon, self.owner, self.direction);

        let hit_kind = world.entity_kind(hit.entity);
        if hit_kind == EntityKind::ArticulatedActor {
            effects.interrupt_shooting(hit.entity);
        }

        let target = hit
            .destroyable
            .and_then(|target| world.destroyable(target).map(|stats| (target, stats)));

        let (outcome, damage, velocity) = match target {
            None => {
                if hit_kind != EntityKind::TerrainVoxel {
                    warn!(
                        "Projectile hit {:?} ({:?}) with no destroyable target",
                        hit.entity, hit_kind
                    );
                }
                (HitOutcome::Absorbed, 0.0, Vec3::ZERO)
            }
            Some((target, stats)) => {
                let body = world.body(hit.entity);
                let impact = resolve_impact(
                    &ImpactInput {
                        normal: hit.normal,
                        projectile_velocity: self.velocity,
                        target_velocity: body.linear_velocity,
                        projectile_mass: self.mass,
                        target_mass: body.mass,
                        target: stats,
                        ammo_penetration: ammo.penetration,
                    },
                    config,
                );

                match impact.outcome {
                    HitOutcome::Deflected => self.transition(ProjectileState::Deflected),
                    HitOutcome::Penetrated => {
                        self.penetrated.insert(target);
                    }
                    _ => {}
                }

                let mut damage = impact.damage;
                if hit.headshot {
                    damage *= ammo.head_shot_multiplier();
                }
                if damage > 0.0 {
                    self.deliver_damage(world, effects, ctx, &ammo, target, &stats, &hit, damage);
                }

                if impact.impulse > 0.0 && !self.hits_own_structure(world, hit.entity) {
                    effects.apply_impulse(
                        world.top_most_parent(hit.entity),
                        hit.position,
                        impact.target_delta_velocity.normalize_or_zero(),
                        impact.impulse,
                    );
                }
                (impact.outcome, damage, impact.velocity)
            }
        };

        effects.record_hit(HitReport {
            target: hit.entity,
            destroyable: hit.destroyable,
            position: hit.position,
            normal: hit.normal,
            outcome,
            damage,
            headshot: hit.headshot,
        });

        self.hits.push(hit);
        self.velocity = velocity;
        self.speed = velocity.length();
        if self.speed > f32::EPSILON {
            self.direction = velocity / self.speed;
        }
        self.known_clearance = 0.0;
        self.next_hit = None;
    }

    #[allow(clippy::too_many_arguments)]
    fn deliver_damage<W, E>(
        &self,
        world: &W,
        effects: &mut E,
        ctx: &mut SimulationContext,
        ammo: &AmmoDefinition,
        target: Entity,
        stats: &DestroyableStats,
        hit: &HitInfo,
        damage: f32,
    ) where
        W: BallisticsWorld + ?Sized,
        E: BallisticsEffects + ?Sized,
    {
        if ctx.controlled_entity.is_some() && self.owner_absolute == ctx.controlled_entity {
            ctx.damage_dealt += damage;
        }
        if !ctx.authoritative {
            return;
        }

        let attacker = self.weapon.map(|weapon| subpart_owner(world, weapon));
        let kind = if world.entity_kind(target) == EntityKind::ArticulatedActor
            && ammo.projectile_type == ProjectileType::Bolt
        {
            DamageType::Bolt
        } else {
            DamageType::Bullet
        };
        effects.apply_damage(target, damage, kind, attacker);

        if let Some(structure) = stats.structure {
            effects.apply_structural_deformation(structure, hit.position, self.direction, damage);
        }
    }

    /// A turret never pushes the vehicle it is mounted on.
    fn hits_own_structure<W>(&self, world: &W, entity: Entity) -> bool
    where
        W: BallisticsWorld + ?Sized,
    {
        self.weapon
            .is_some_and(|weapon| world.top_most_parent(weapon) == world.top_most_parent(entity))
    }
}

/// Maps a raw hit to the unit that actually takes damage.
///
/// # Returns
/// * the entity itself when it is directly damageable
/// * the nearest occupied cell's block when it is a grid with destruction enabled
/// * the parent's resolution when it is a sub-part
/// * `None` otherwise (terrain, empty cells, decoration)
pub fn resolve_destroyable<W>(world: &W, entity: Entity, point: Vec3) -> Option<Entity>
where
    W: BallisticsWorld + ?Sized,
{
    let mut entity = entity;
    let mut point = point;
    for _ in 0..MAX_PARENT_DEPTH {
        if world.destroyable(entity).is_some() {
            return Some(entity);
        }
        if world.entity_kind(entity) == EntityKind::CellGrid {
            let grid = world.grid(entity)?;
            if !grid.destruction_enabled {
                return None;
            }
            let local = grid.world_to_local.transform_point3(point);
            let cell = nearest_occupied_cell(local, grid.cell_size, |cell| {
                world.grid_cell(entity, cell).is_some()
            })?;
            return world.grid_cell(entity, cell);
        }
        let parent = world.subpart_parent(entity)?;
        entity = parent.parent;
        point = parent.anchor;
    }
    warn!("Sub-part chain deeper than {MAX_PARENT_DEPTH} while resolving a destroyable");
    None
}

/// Occupied cell nearest to a grid-local position.
///
/// Cell `c` is centred at `c * cell_size`. The rounded cell is tried first,
/// then its 26 neighbours by distance.
pub fn nearest_occupied_cell(
    local: Vec3,
    cell_size: f32,
    occupied: impl Fn(IVec3) -> bool,
) -> Option<IVec3> {
    if cell_size <= 0.0 {
        return None;
    }
    let fractional = local / cell_size;
    let base = fractional.round().as_ivec3();
    if occupied(base) {
        return Some(base);
    }

    let mut best = None;
    let mut best_distance = f32::INFINITY;
    for x in -1..=1 {
        for y in -1..=1 {
            for z in -1..=1 {
                let cell = base + IVec3::new(x, y, z);
                if cell == base || !occupied(cell) {
                    continue;
                }
                let distance = cell.as_vec3().distance_squared(fractional);
                if distance < best_distance {
                    best_distance = distance;
                    best = Some(cell);
                }
            }
        }
    }
    best
}

/// Outermost owner of a chain of sub-parts, used for damage attribution.
pub fn subpart_owner<W>(world: &W, entity: Entity) -> Entity
where
    W: BallisticsWorld + ?Sized,
{
    let mut current = entity;
    for _ in 0..MAX_PARENT_DEPTH {
        match world.subpart_parent(current) {
            Some(parent) => current = parent.parent,
            None => break,
        }
    }
    current
}

/// Components the avian3d world view reads from hit entities.
#[cfg(feature = "dim3")]
pub type TargetQueryData = (
    Option<&'static TargetKind>,
    Option<&'static Destroyable>,
    Option<&'static StructuralCell>,
    Option<&'static CellGrid>,
    Option<&'static ArticulatedActor>,
    Option<&'static Subpart>,
    Option<&'static SurfaceMaterial>,
    Option<&'static GunOwner>,
    Has<HandheldRifle>,
    Has<SuppressImpactAudio>,
    Option<&'static GlobalTransform>,
);

/// Physics state the avian3d world view reads from bodies.
#[cfg(feature = "dim3")]
pub type BodyQueryData = (
    Has<Collider>,
    Option<&'static RigidBody>,
    Option<&'static LinearVelocity>,
    Option<&'static ComputedMass>,
);

/// [`BallisticsWorld`] backed by avian3d spatial queries and ECS components.
///
/// Entities without a `Collider` or `RigidBody` count as having no physics
/// and are passed through. Static and kinematic bodies weigh
/// `static_body_mass`.
///
/// The narrow-phase segment query runs once per segment: the overlapping
/// entity list and every exact intersection on that segment are answered
/// from one buffer, which is kept across ticks through
/// [`with_segment_buffer`](Self::with_segment_buffer).
#[cfg(feature = "dim3")]
pub struct PhysicsWorldView<'a, 'w, 's, 'qw, 'qs> {
    spatial: &'a SpatialQuery<'w, 's>,
    targets: &'a Query<'qw, 'qs, TargetQueryData>,
    bodies: &'a Query<'qw, 'qs, BodyQueryData>,
    config: &'a BallisticsConfig,
    segment_hits: RefCell<Vec<RayHitData>>,
    cached_segment: Cell<Option<(Vec3, Vec3)>>,
}

#[cfg(feature = "dim3")]
impl<'a, 'w, 's, 'qw, 'qs> PhysicsWorldView<'a, 'w, 's, 'qw, 'qs> {
    pub fn new(
        spatial: &'a SpatialQuery<'w, 's>,
        targets: &'a Query<'qw, 'qs, TargetQueryData>,
        bodies: &'a Query<'qw, 'qs, BodyQueryData>,
        config: &'a BallisticsConfig,
    ) -> Self {
        Self {
            spatial,
            targets,
            bodies,
            config,
            segment_hits: RefCell::new(Vec::new()),
            cached_segment: Cell::new(None),
        }
    }

    /// Reuses `buffer` for segment query results.
    pub fn with_segment_buffer(mut self, mut buffer: Vec<RayHitData>) -> Self {
        buffer.clear();
        self.segment_hits = RefCell::new(buffer);
        self
    }

    /// Gives the segment buffer back for the next tick.
    pub fn into_segment_buffer(self) -> Vec<RayHitData> {
        self.segment_hits.into_inner()
    }

    fn segment(from: Vec3, to: Vec3) -> Option<(Dir3, f32)> {
        let delta = to - from;
        let length = delta.length();
        Dir3::new(delta).ok().map(|direction| (direction, length))
    }

    /// Fills the buffer with every hit on the segment unless it already holds them.
    fn query_segment(&self, from: Vec3, to: Vec3) {
        if self.cached_segment.get() == Some((from, to)) {
            return;
        }
        let mut hits = self.segment_hits.borrow_mut();
        hits.clear();
        self.cached_segment.set(Some((from, to)));

        let Some((direction, length)) = Self::segment(from, to) else {
            return;
        };
        let cap = self.config.max_segment_hits as usize;
        self.spatial.ray_hits_callback(
            from,
            direction,
            length,
            true,
            &SpatialQueryFilter::default(),
            |hit| {
                hits.push(hit);
                hits.len() < cap
            },
        );
    }

    fn transform(&self, entity: Entity) -> Option<&GlobalTransform> {
        self.targets.get(entity).ok().and_then(|t| t.10)
    }
}

#[cfg(feature = "dim3")]
impl BallisticsWorld for PhysicsWorldView<'_, '_, '_, '_, '_> {
    fn cast_ray(&self, from: Vec3, to: Vec3) -> Option<HitResult> {
        let (direction, length) = Self::segment(from, to)?;
        self.spatial
            .cast_ray(from, direction, length, true, &SpatialQueryFilter::default())
            .map(|hit| HitResult {
                entity: hit.entity,
                point: from + *direction * hit.distance,
                normal: hit.normal,
                distance: hit.distance,
            })
    }

    fn entities_on_segment(&self, from: Vec3, to: Vec3, out: &mut Vec<Entity>) {
        self.query_segment(from, to);
        for hit in self.segment_hits.borrow().iter() {
            if !out.contains(&hit.entity) {
                out.push(hit.entity);
            }
        }
    }

    fn intersect_precise(&self, entity: Entity, from: Vec3, to: Vec3) -> Option<PreciseHit> {
        let (direction, _) = Self::segment(from, to)?;
        self.query_segment(from, to);
        let hit = self
            .segment_hits
            .borrow()
            .iter()
            .filter(|hit| hit.entity == entity)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .cloned()?;
        let point = from + *direction * hit.distance;

        let head = match (self.targets.get(entity).ok().and_then(|t| t.4), self.transform(entity)) {
            (Some(actor), Some(transform)) => {
                transform.affine().inverse().transform_point3(point).y >= actor.head_height
            }
            _ => false,
        };
        Some(PreciseHit {
            point,
            normal: hit.normal,
            head,
        })
    }

    fn entity_kind(&self, entity: Entity) -> EntityKind {
        let Ok((kind, _, _, grid, actor, ..)) = self.targets.get(entity) else {
            return EntityKind::Generic;
        };
        if let Some(kind) = kind {
            kind.0
        } else if grid.is_some() {
            EntityKind::CellGrid
        } else if actor.is_some() {
            EntityKind::ArticulatedActor
        } else {
            EntityKind::Generic
        }
    }

    fn has_physics(&self, entity: Entity) -> bool {
        self.bodies
            .get(entity)
            .is_ok_and(|(collider, body, ..)| collider || body.is_some())
    }

    fn body(&self, entity: Entity) -> BodyState {
        let static_body = BodyState {
            linear_velocity: Vec3::ZERO,
            mass: self.config.static_body_mass,
        };
        let Ok((_, body, velocity, mass)) = self.bodies.get(self.top_most_parent(entity)) else {
            return static_body;
        };
        let linear_velocity = velocity.map_or(Vec3::ZERO, |v| v.0);
        let mass = match (body, mass) {
            (Some(body), Some(mass)) if body.is_dynamic() => mass.value(),
            _ => self.config.static_body_mass,
        };
        BodyState {
            linear_velocity,
            mass: if mass.is_finite() && mass > 0.0 {
                mass
            } else {
                self.config.static_body_mass
            },
        }
    }

    fn top_most_parent(&self, entity: Entity) -> Entity {
        let mut current = entity;
        for _ in 0..MAX_PARENT_DEPTH {
            let Ok((_, _, cell, _, _, subpart, ..)) = self.targets.get(current) else {
                break;
            };
            match (subpart, cell) {
                (Some(subpart), _) => current = subpart.parent,
                (None, Some(cell)) => current = cell.grid,
                (None, None) => break,
            }
        }
        current
    }

    fn destroyable(&self, entity: Entity) -> Option<DestroyableStats> {
        let (_, destroyable, cell, ..) = self.targets.get(entity).ok()?;
        let destroyable = destroyable?;
        Some(DestroyableStats {
            integrity: destroyable.integrity,
            max_integrity: destroyable.max_integrity,
            projectile_resistance: destroyable.projectile_resistance,
            structure: cell.map(|cell| cell.grid),
            damage_ratio: destroyable.damage_ratio,
            deformation_ratio: destroyable.deformation_ratio,
        })
    }

    fn grid(&self, entity: Entity) -> Option<GridInfo> {
        let grid = self.targets.get(entity).ok()?.3?;
        let world_to_local = self
            .transform(entity)
            .map_or(bevy::math::Affine3A::IDENTITY, |t| t.affine().inverse());
        Some(GridInfo {
            world_to_local,
            cell_size: grid.cell_size,
            destruction_enabled: grid.destruction_enabled,
        })
    }

    fn grid_cell(&self, grid: Entity, cell: IVec3) -> Option<Entity> {
        self.targets.get(grid).ok()?.3?.cells.get(&cell).copied()
    }

    fn subpart_parent(&self, entity: Entity) -> Option<SubpartParent> {
        let subpart = self.targets.get(entity).ok()?.5?;
        let anchor = self
            .transform(subpart.parent)
            .map_or(Vec3::ZERO, |t| t.translation());
        Some(SubpartParent {
            parent: subpart.parent,
            anchor,
        })
    }

    fn gun_owner(&self, entity: Entity) -> Option<Entity> {
        self.targets.get(entity).ok()?.7.map(|owner| owner.0)
    }

    fn surface_material(&self, entity: Entity, _point: Vec3) -> Option<MaterialType> {
        self.targets
            .get(entity)
            .ok()?
            .6
            .map(|surface| surface.material.clone())
    }

    fn is_handheld_rifle(&self, weapon: Entity) -> bool {
        self.targets.get(weapon).is_ok_and(|t| t.8)
    }

    fn suppresses_impact_audio(&self, owner: Entity) -> bool {
        self.targets.get(owner).is_ok_and(|t| t.9)
    }
}
