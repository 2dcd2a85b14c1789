//! Projectile slot state and the world components the ballistics adapter reads.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bevy::prelude::*;

use crate::resources::AmmoDefinition;
use crate::types::{EntityKind, HitInfo, MaterialType, ProjectileState};

/// One pooled projectile.
///
/// Slots live inside [`crate::resources::ProjectilePool`] and are recycled
/// between shots. `start` sets every field explicitly; nothing relies on the
/// values a previous flight left behind. Buffers keep their capacity across
/// reuse and are only ever cleared.
#[derive(Debug)]
pub struct Projectile {
    pub(crate) state: ProjectileState,
    pub(crate) ammo: Option<Arc<AmmoDefinition>>,

    pub(crate) origin: Vec3,
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) direction: Vec3,
    pub(crate) speed: f32,
    /// Speed the ammunition was designed for, before variance.
    pub(crate) desired_speed: f32,
    /// Kinetic-energy-equivalent mass.
    pub(crate) mass: f32,
    pub(crate) max_trajectory: f32,
    pub(crate) distance_traveled: f32,

    /// Distance ahead already confirmed free of obstacles.
    pub(crate) known_clearance: f32,
    /// Hit found by a lookahead raycast but not reached yet.
    pub(crate) next_hit: Option<HitInfo>,

    /// Consumed hits, oldest first.
    pub(crate) hits: Vec<HitInfo>,
    pub(crate) penetrated: HashSet<Entity>,
    pub(crate) segment_scratch: Vec<Entity>,

    pub(crate) ignore_entity: Option<Entity>,
    pub(crate) weapon: Option<Entity>,
    pub(crate) owner: Option<Entity>,
    pub(crate) owner_absolute: Option<Entity>,

    pub(crate) deflected_ticks: u32,
    pub(crate) killed_extra_frames: u32,
    pub(crate) draw_trail: bool,

    pub(crate) started: bool,
    pub(crate) closed: bool,
}

impl Default for Projectile {
    /// An empty, closed slot.
    fn default() -> Self {
        Self {
            state: ProjectileState::KilledAndDrawn,
            ammo: None,
            origin: Vec3::ZERO,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            speed: 0.0,
            desired_speed: 0.0,
            mass: 0.0,
            max_trajectory: 0.0,
            distance_traveled: 0.0,
            known_clearance: 0.0,
            next_hit: None,
            hits: Vec::new(),
            penetrated: HashSet::new(),
            segment_scratch: Vec::new(),
            ignore_entity: None,
            weapon: None,
            owner: None,
            owner_absolute: None,
            deflected_ticks: 0,
            killed_extra_frames: 0,
            draw_trail: false,
            started: false,
            closed: true,
        }
    }
}

impl Projectile {
    pub fn state(&self) -> ProjectileState {
        self.state
    }

    pub fn ammo(&self) -> Option<&AmmoDefinition> {
        self.ammo.as_deref()
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn max_trajectory(&self) -> f32 {
        self.max_trajectory
    }

    pub fn distance_traveled(&self) -> f32 {
        self.distance_traveled
    }

    pub fn known_clearance(&self) -> f32 {
        self.known_clearance
    }

    pub fn pending_hit(&self) -> Option<&HitInfo> {
        self.next_hit.as_ref()
    }

    /// Consumed hits, oldest first.
    pub fn hits(&self) -> &[HitInfo] {
        &self.hits
    }

    pub fn has_penetrated(&self, target: Entity) -> bool {
        self.penetrated.contains(&target)
    }

    pub fn penetrated_count(&self) -> usize {
        self.penetrated.len()
    }

    pub fn draws_trail(&self) -> bool {
        self.draw_trail
    }

    pub fn owner(&self) -> Option<Entity> {
        self.owner
    }

    pub fn owner_absolute(&self) -> Option<Entity> {
        self.owner_absolute
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Visible trail length, shrinking as the projectile slows down.
    pub fn trail_length(&self) -> f32 {
        let Some(ammo) = self.ammo.as_deref() else {
            return 0.0;
        };
        if self.desired_speed <= f32::EPSILON {
            return 0.0;
        }
        40.0 * ammo.trail_scale * self.speed / self.desired_speed
    }

    /// Flight path from the current position back to the muzzle through every hit.
    pub fn path_points(&self) -> impl Iterator<Item = Vec3> + '_ {
        std::iter::once(self.position)
            .chain(self.hits.iter().rev().map(|hit| hit.position))
            .chain(std::iter::once(self.origin))
    }
}

/// Overrides the entity kind the ballistics adapter infers from components.
///
/// Needed for kinds that carry no other marker: loose debris, vegetation and
/// terrain.
#[derive(Component, Reflect, Clone, Copy, Debug, PartialEq, Eq)]
#[reflect(Component)]
pub struct TargetKind(pub EntityKind);

/// Something projectiles can damage.
///
/// # Example
/// ```
/// use bevy_projectile_ballistics::components::Destroyable;
///
/// let armor = Destroyable::new(500.0).with_projectile_resistance(40.0);
/// assert_eq!(armor.max_integrity, 500.0);
/// ```
#[derive(Component, Reflect, Clone, Debug)]
#[reflect(Component)]
pub struct Destroyable {
    pub integrity: f32,
    pub max_integrity: f32,
    /// Energy in damage units the surface turns away per unit of ammo penetration.
    pub projectile_resistance: f32,
    pub damage_ratio: f32,
    pub deformation_ratio: f32,
}

impl Default for Destroyable {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl Destroyable {
    pub fn new(integrity: f32) -> Self {
        Self {
            integrity,
            max_integrity: integrity,
            projectile_resistance: 0.0,
            damage_ratio: 1.0,
            deformation_ratio: 1.0,
        }
    }

    pub fn with_projectile_resistance(mut self, resistance: f32) -> Self {
        self.projectile_resistance = resistance;
        self
    }

    /// Partially built or damaged block.
    pub fn with_integrity(mut self, integrity: f32) -> Self {
        self.integrity = integrity.min(self.max_integrity);
        self
    }

    pub fn with_ratios(mut self, damage_ratio: f32, deformation_ratio: f32) -> Self {
        self.damage_ratio = damage_ratio;
        self.deformation_ratio = deformation_ratio;
        self
    }
}

/// Marks a block entity as one cell of a [`CellGrid`].
#[derive(Component, Reflect, Clone, Copy, Debug)]
#[reflect(Component)]
pub struct StructuralCell {
    pub grid: Entity,
    pub cell: IVec3,
}

/// Composite structure built from cubic cells.
///
/// `cells` maps every occupied integer cell to the block entity occupying it.
/// A block larger than one cell appears under each of its cells.
#[derive(Component, Clone, Debug)]
pub struct CellGrid {
    pub cell_size: f32,
    pub destruction_enabled: bool,
    pub cells: HashMap<IVec3, Entity>,
}

impl Default for CellGrid {
    fn default() -> Self {
        Self {
            cell_size: 2.5,
            destruction_enabled: true,
            cells: HashMap::new(),
        }
    }
}

impl CellGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            ..default()
        }
    }

    pub fn insert(&mut self, cell: IVec3, block: Entity) {
        self.cells.insert(cell, block);
    }

    /// Drops every cell occupied by `block`.
    pub fn remove_block(&mut self, block: Entity) {
        self.cells.retain(|_, occupant| *occupant != block);
    }
}

/// Animated actor. Hits at or above `head_height` (local Y) count as headshots.
#[derive(Component, Reflect, Clone, Copy, Debug)]
#[reflect(Component)]
pub struct ArticulatedActor {
    pub head_height: f32,
}

impl Default for ArticulatedActor {
    fn default() -> Self {
        Self { head_height: 1.5 }
    }
}

/// Detached moving piece of a larger structure (a piston head, a rotor top).
///
/// Damage to it is attributed to `parent`.
#[derive(Component, Reflect, Clone, Copy, Debug)]
#[reflect(Component)]
pub struct Subpart {
    pub parent: Entity,
}

/// Physical material used for impact audio, particles and decals.
#[derive(Component, Reflect, Clone, Debug)]
#[reflect(Component)]
pub struct SurfaceMaterial {
    pub material: MaterialType,
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self {
            material: MaterialType::METAL,
        }
    }
}

/// Actor holding this hand-held weapon.
#[derive(Component, Reflect, Clone, Copy, Debug)]
#[reflect(Component)]
pub struct GunOwner(pub Entity);

#[derive(Component, Reflect, Clone, Copy, Debug, Default)]
#[reflect(Component)]
pub struct HandheldRifle;

/// Owners carrying this marker fire silent projectiles (warheads).
#[derive(Component, Reflect, Clone, Copy, Debug, Default)]
#[reflect(Component)]
pub struct SuppressImpactAudio;
