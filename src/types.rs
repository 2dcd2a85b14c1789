//! Common types, hit records and collaborator traits for the ballistics system.
//!
//! The simulation core never talks to a physics engine directly. It reads the
//! world through [`BallisticsWorld`] and pushes every side effect through
//! [`BallisticsEffects`], so the same code runs against avian3d in an `App`
//! and against a hand-built scene in tests.

use std::borrow::Cow;
use std::sync::Arc;

use bevy::math::Affine3A;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::resources::AmmoDefinition;

/// Lifecycle state of a pooled projectile.
///
/// The ordering of the variants is the only legal direction of travel:
/// a projectile may skip states but never moves back to an earlier one.
///
/// # Variants
/// * `Active` - In flight, raycasting and resolving hits
/// * `Deflected` - Bounced off a surface; lives on for a fixed number of ticks
/// * `Killed` - No more physics; waiting for its final draw pass
/// * `KilledAndDrawn` - Terminal; the slot can be reclaimed
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Reflect)]
pub enum ProjectileState {
    #[default]
    Active,
    Deflected,
    Killed,
    KilledAndDrawn,
}

impl ProjectileState {
    /// True while the projectile still moves and collides.
    pub fn is_flying(self) -> bool {
        matches!(self, Self::Active | Self::Deflected)
    }
}

/// Closed set of entity kinds the simulation distinguishes.
///
/// Surface classification and destroyable resolution dispatch on this tag
/// instead of inspecting concrete component sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Reflect, Serialize, Deserialize)]
pub enum EntityKind {
    /// Composite structure made of discrete cells (a grid of blocks).
    CellGrid,
    /// Animated, skinned actor such as a player character.
    ArticulatedActor,
    /// Free-floating loose object.
    LooseDebris,
    /// Trees and bushes.
    Vegetation,
    /// Raw voxel terrain.
    TerrainVoxel,
    #[default]
    Generic,
}

/// Coarse classification of a struck surface, used to key particle effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub enum SurfaceImpact {
    Metal,
    Destructible,
    Indestructible,
    Character,
}

/// Material identifier used to key audio cues, particles and decals.
///
/// A thin string handle so content can define new materials without touching
/// the crate; the common ones are provided as constants.
///
/// # Example
/// ```
/// use bevy_projectile_ballistics::types::MaterialType;
///
/// let custom = MaterialType::new("Glass");
/// assert_ne!(custom, MaterialType::METAL);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
pub struct MaterialType(pub Cow<'static, str>);

impl MaterialType {
    pub const METAL: MaterialType = MaterialType(Cow::Borrowed("Metal"));
    pub const ROCK: MaterialType = MaterialType(Cow::Borrowed("Rock"));
    pub const WOOD: MaterialType = MaterialType(Cow::Borrowed("Wood"));
    pub const CHARACTER: MaterialType = MaterialType(Cow::Borrowed("Character"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Acoustic family of a projectile, first half of the impact audio key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum AmmoSoundType {
    ExplosiveBullet,
    RifleBullet,
    Bolt,
    GunBullet,
}

/// Kind of damage delivered to a destroyable target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub enum DamageType {
    Bullet,
    Bolt,
}

/// Projectile family from the ammunition definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum ProjectileType {
    #[default]
    Bullet,
    Bolt,
}

/// Hit result from a broad-phase raycast.
///
/// Contains the hit entity, world position, surface normal, and distance from
/// the ray origin.
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_projectile_ballistics::types::HitResult;
///
/// let hit_result = HitResult {
///     entity: Entity::PLACEHOLDER,
///     point: Vec3::ZERO,
///     normal: Vec3::Y,
///     distance: 10.0,
/// };
/// ```
#[derive(Clone, Debug)]
pub struct HitResult {
    /// Hit entity
    pub entity: Entity,
    /// World-space hit point
    pub point: Vec3,
    /// Surface normal
    pub normal: Vec3,
    /// Distance from ray origin
    pub distance: f32,
}

/// Result of an exact per-entity segment intersection.
#[derive(Clone, Copy, Debug)]
pub struct PreciseHit {
    pub point: Vec3,
    pub normal: Vec3,
    /// The intersection landed in the entity's head region.
    pub head: bool,
}

/// One resolved collision, as consumed by the projectile.
///
/// # Fields
/// * `entity` - Raw entity reported by the detector
/// * `destroyable` - Damageable unit resolved from the raw entity, if any
/// * `position` - World-space hit point
/// * `normal` - Surface normal at the hit point
/// * `headshot` - Precision hit, already gated by the ammunition definition
/// * `distance_sq` - Squared distance from the query origin
#[derive(Clone, Debug)]
pub struct HitInfo {
    pub entity: Entity,
    pub destroyable: Option<Entity>,
    pub position: Vec3,
    pub normal: Vec3,
    pub headshot: bool,
    pub distance_sq: f32,
}

/// Damage-model view of a destroyable target.
#[derive(Clone, Copy, Debug)]
pub struct DestroyableStats {
    pub integrity: f32,
    pub max_integrity: f32,
    /// Energy (in damage units) the surface can turn away per unit of ammo penetration.
    pub projectile_resistance: f32,
    /// Owning structure when the target is one cell of a composite.
    pub structure: Option<Entity>,
    pub damage_ratio: f32,
    pub deformation_ratio: f32,
}

impl DestroyableStats {
    /// Plain destroyable with full integrity and unit ratios.
    pub fn new(integrity: f32, projectile_resistance: f32) -> Self {
        Self {
            integrity,
            max_integrity: integrity,
            projectile_resistance,
            structure: None,
            damage_ratio: 1.0,
            deformation_ratio: 1.0,
        }
    }

    pub fn is_structural_cell(&self) -> bool {
        self.structure.is_some()
    }

    /// Integrity as seen by incoming energy, after damage and deformation ratios.
    pub fn resistance_adjusted_integrity(&self) -> f32 {
        if !self.is_structural_cell() {
            return self.integrity;
        }
        let ratio = self.damage_ratio * self.deformation_ratio;
        if ratio > f32::EPSILON {
            self.integrity / ratio
        } else {
            self.integrity
        }
    }
}

/// Geometry of a cell-grid structure.
#[derive(Clone, Copy, Debug)]
pub struct GridInfo {
    pub world_to_local: Affine3A,
    pub cell_size: f32,
    pub destruction_enabled: bool,
}

/// Link from a detached sub-part to the piece that owns it.
#[derive(Clone, Copy, Debug)]
pub struct SubpartParent {
    pub parent: Entity,
    /// World position of the parent, used to re-resolve the damaged cell.
    pub anchor: Vec3,
}

/// Linear state of the physical body behind a hit.
#[derive(Clone, Copy, Debug)]
pub struct BodyState {
    pub linear_velocity: Vec3,
    pub mass: f32,
}

/// Read-only access to the world a projectile flies through.
///
/// Every query is synchronous and must answer within the tick.
pub trait BallisticsWorld {
    /// Broad-phase ray cast returning the first hit between `from` and `to`.
    fn cast_ray(&self, from: Vec3, to: Vec3) -> Option<HitResult>;

    /// Every entity whose bounds overlap the segment. `out` arrives cleared.
    fn entities_on_segment(&self, from: Vec3, to: Vec3, out: &mut Vec<Entity>);

    /// Exact segment intersection against one entity's shape.
    fn intersect_precise(&self, entity: Entity, from: Vec3, to: Vec3) -> Option<PreciseHit>;

    fn entity_kind(&self, entity: Entity) -> EntityKind;

    /// Whether the entity has a physical body that can receive forces.
    fn has_physics(&self, entity: Entity) -> bool;

    /// Velocity and mass of the entity's top-most physical parent.
    fn body(&self, entity: Entity) -> BodyState;

    fn top_most_parent(&self, entity: Entity) -> Entity;

    /// Damage-model data when `entity` is directly damageable.
    fn destroyable(&self, entity: Entity) -> Option<DestroyableStats>;

    fn grid(&self, entity: Entity) -> Option<GridInfo>;

    /// Occupant of an integer cell of a grid.
    fn grid_cell(&self, grid: Entity, cell: IVec3) -> Option<Entity>;

    fn subpart_parent(&self, entity: Entity) -> Option<SubpartParent>;

    /// Actor holding the entity when it is a hand-held weapon.
    fn gun_owner(&self, entity: Entity) -> Option<Entity>;

    /// Configured physical material of an entity, sampled at `point` for terrain.
    fn surface_material(&self, entity: Entity, point: Vec3) -> Option<MaterialType>;

    fn is_handheld_rifle(&self, _weapon: Entity) -> bool {
        false
    }

    /// Owners such as warheads that should stay silent on impact.
    fn suppresses_impact_audio(&self, _owner: Entity) -> bool {
        false
    }

    /// Hint that a projectile is about to fly along this ray.
    fn prefetch_ray(&self, _from: Vec3, _to: Vec3) {}
}

/// Audio cue request for one impact.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpactSound {
    pub ammo: AmmoSoundType,
    pub material: MaterialType,
    /// Cue to use when `material` has none.
    pub fallback: Option<MaterialType>,
    pub position: Vec3,
}

/// Particle effect request for one impact.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpactParticles {
    pub surface: SurfaceImpact,
    pub material: MaterialType,
    pub position: Vec3,
    pub normal: Vec3,
    pub direction: Vec3,
    /// Effect name from the ammunition definition, if it names one.
    pub effect: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecalRequest {
    pub target: Entity,
    pub material: MaterialType,
    pub position: Vec3,
    pub normal: Vec3,
}

/// What a consumed hit did to the projectile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub enum HitOutcome {
    Deflected,
    Stopped,
    Penetrated,
    /// Struck something with no destroyable target; the projectile is spent.
    Absorbed,
}

/// Summary of a consumed hit, reported after its consequences were applied.
#[derive(Clone, Debug)]
pub struct HitReport {
    pub target: Entity,
    pub destroyable: Option<Entity>,
    pub position: Vec3,
    pub normal: Vec3,
    pub outcome: HitOutcome,
    pub damage: f32,
    pub headshot: bool,
}

/// Sink for every side effect a projectile produces.
///
/// Calls are fire-and-forget: nothing they do can feed back into the
/// projectile's state for the current tick.
pub trait BallisticsEffects {
    fn apply_damage(&mut self, target: Entity, amount: f32, kind: DamageType, attacker: Option<Entity>);

    fn apply_impulse(&mut self, entity: Entity, point: Vec3, direction: Vec3, magnitude: f32);

    fn apply_structural_deformation(&mut self, structure: Entity, point: Vec3, direction: Vec3, damage: f32);

    fn play_impact_audio(&mut self, sound: ImpactSound);

    fn emit_impact_particles(&mut self, particles: ImpactParticles);

    fn place_decal(&mut self, decal: DecalRequest);

    /// The hit actor flinches and stops firing.
    fn interrupt_shooting(&mut self, _actor: Entity) {}

    fn record_hit(&mut self, _report: HitReport) {}
}

/// Per-tick context handed to the simulation explicitly.
///
/// # Fields
/// * `authoritative` - This side commits damage
/// * `controlled_entity` - Locally controlled actor, for damage statistics
/// * `damage_dealt` - Damage dealt this tick by projectiles owned by `controlled_entity`
#[derive(Clone, Debug, Default)]
pub struct SimulationContext {
    pub authoritative: bool,
    pub controlled_entity: Option<Entity>,
    pub damage_dealt: f32,
}

impl SimulationContext {
    pub fn new(authoritative: bool, controlled_entity: Option<Entity>) -> Self {
        Self {
            authoritative,
            controlled_entity,
            damage_dealt: 0.0,
        }
    }
}

/// Launch parameters for a pooled projectile.
///
/// Builder-style helper collecting everything `Projectile::start` needs.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use bevy::prelude::*;
/// use bevy_projectile_ballistics::resources::AmmoDefinition;
/// use bevy_projectile_ballistics::types::ProjectileSpawnParams;
///
/// let params = ProjectileSpawnParams::new(Arc::new(AmmoDefinition::rifle()), Vec3::ZERO, Vec3::NEG_Z)
///     .with_weapon(Entity::PLACEHOLDER)
///     .with_initial_velocity(Vec3::X * 2.0);
/// assert_eq!(params.weapon, Some(Entity::PLACEHOLDER));
/// ```
#[derive(Clone)]
pub struct ProjectileSpawnParams {
    pub ammo: Arc<AmmoDefinition>,
    pub origin: Vec3,
    /// Launch direction (normalized by `new`).
    pub direction: Vec3,
    /// Velocity inherited from the shooter.
    pub initial_velocity: Vec3,
    /// Entity the projectile must never hit (usually the muzzle or barrel).
    pub ignore_entity: Option<Entity>,
    pub weapon: Option<Entity>,
    /// Immediate owner (weapon or turret).
    pub owner: Option<Entity>,
    /// Controlling actor.
    pub owner_absolute: Option<Entity>,
}

impl ProjectileSpawnParams {
    pub fn new(ammo: Arc<AmmoDefinition>, origin: Vec3, direction: Vec3) -> Self {
        Self {
            ammo,
            origin,
            direction: direction.normalize_or_zero(),
            initial_velocity: Vec3::ZERO,
            ignore_entity: None,
            weapon: None,
            owner: None,
            owner_absolute: None,
        }
    }

    pub fn with_initial_velocity(mut self, velocity: Vec3) -> Self {
        self.initial_velocity = velocity;
        self
    }

    pub fn with_ignore_entity(mut self, entity: Entity) -> Self {
        self.ignore_entity = Some(entity);
        self
    }

    pub fn with_weapon(mut self, weapon: Entity) -> Self {
        self.weapon = Some(weapon);
        self
    }

    /// Sets both owners; pass the same entity twice for a hand-held weapon.
    pub fn with_owners(mut self, owner: Entity, owner_absolute: Entity) -> Self {
        self.owner = Some(owner);
        self.owner_absolute = Some(owner_absolute);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order_is_monotonic() {
        assert!(ProjectileState::Active < ProjectileState::Deflected);
        assert!(ProjectileState::Deflected < ProjectileState::Killed);
        assert!(ProjectileState::Killed < ProjectileState::KilledAndDrawn);
        assert!(ProjectileState::Deflected.is_flying());
        assert!(!ProjectileState::Killed.is_flying());
    }

    #[test]
    fn test_resistance_adjusted_integrity() {
        let mut stats = DestroyableStats::new(100.0, 0.0);
        assert_eq!(stats.resistance_adjusted_integrity(), 100.0);

        // Ratios only apply to structural cells.
        stats.damage_ratio = 0.5;
        assert_eq!(stats.resistance_adjusted_integrity(), 100.0);

        stats.structure = Some(Entity::PLACEHOLDER);
        stats.deformation_ratio = 0.5;
        assert_eq!(stats.resistance_adjusted_integrity(), 400.0);

        stats.damage_ratio = 0.0;
        assert_eq!(stats.resistance_adjusted_integrity(), 100.0);
    }

    #[test]
    fn test_spawn_params_normalize_direction() {
        let params = ProjectileSpawnParams::new(
            Arc::new(AmmoDefinition::pistol()),
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -5.0),
        );
        assert!((params.direction.length() - 1.0).abs() < 1e-6);
        assert!(params.owner.is_none());
    }
}
