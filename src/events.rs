//! Events for the ballistics system.
//!
//! Note: In Bevy 0.18, buffered events use the `Message` trait instead of `Event`.
//! [`FireEvent`] is the only input; everything else reports what the
//! simulation did during a tick.

use std::sync::Arc;

use bevy::ecs::message::Message;
use bevy::prelude::*;

use crate::resources::AmmoDefinition;
use crate::systems::surface::DeformationProfile;
use crate::types::{
    DamageType, DecalRequest, HitOutcome, HitReport, ImpactParticles, ImpactSound,
    ProjectileSpawnParams,
};

/// Request to launch one projectile.
///
/// # Fields
/// * `ammo` - Index into the [`crate::resources::AmmoLibrary`]
/// * `origin` - World-space muzzle position
/// * `direction` - Launch direction (normalized by `new`)
/// * `initial_velocity` - Velocity inherited from the shooter
/// * `shooter` - Controlling actor, credited with the damage
/// * `owner` - Immediate owner (weapon or turret)
/// * `weapon` - Weapon entity, used for attribution and acoustics
/// * `ignore_entity` - Entity the projectile never hits (the muzzle)
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_projectile_ballistics::events::FireEvent;
///
/// let fire_event = FireEvent::new(1, Vec3::new(0.0, 1.5, 0.0), Vec3::Z)
///     .with_shooter(Entity::PLACEHOLDER)
///     .with_initial_velocity(Vec3::X * 3.0);
/// assert_eq!(fire_event.ammo, 1);
/// ```
#[derive(Message, Clone, Debug)]
pub struct FireEvent {
    pub ammo: usize,
    pub origin: Vec3,
    pub direction: Vec3,
    pub initial_velocity: Vec3,
    pub shooter: Option<Entity>,
    pub owner: Option<Entity>,
    pub weapon: Option<Entity>,
    pub ignore_entity: Option<Entity>,
}

impl FireEvent {
    pub fn new(ammo: usize, origin: Vec3, direction: Vec3) -> Self {
        Self {
            ammo,
            origin,
            direction: direction.normalize_or_zero(),
            initial_velocity: Vec3::ZERO,
            shooter: None,
            owner: None,
            weapon: None,
            ignore_entity: None,
        }
    }

    pub fn with_shooter(mut self, shooter: Entity) -> Self {
        self.shooter = Some(shooter);
        self
    }

    pub fn with_owner(mut self, owner: Entity) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_weapon(mut self, weapon: Entity) -> Self {
        self.weapon = Some(weapon);
        self
    }

    pub fn with_ignore_entity(mut self, entity: Entity) -> Self {
        self.ignore_entity = Some(entity);
        self
    }

    pub fn with_initial_velocity(mut self, velocity: Vec3) -> Self {
        self.initial_velocity = velocity;
        self
    }

    /// Launch parameters for the resolved ammunition definition.
    pub fn to_spawn_params(&self, ammo: Arc<AmmoDefinition>) -> ProjectileSpawnParams {
        ProjectileSpawnParams {
            ammo,
            origin: self.origin,
            direction: self.direction.normalize_or_zero(),
            initial_velocity: self.initial_velocity,
            ignore_entity: self.ignore_entity,
            weapon: self.weapon,
            owner: self.owner,
            owner_absolute: self.shooter,
        }
    }
}

/// A [`FireEvent`] that did not produce a projectile.
#[derive(Message, Clone, Debug)]
pub struct ShotRejected {
    pub shooter: Option<Entity>,
    pub reason: String,
}

/// A projectile consumed a hit.
///
/// Sent after the hit's damage and impulse were requested, whatever the
/// outcome. Useful for hit markers and statistics.
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_projectile_ballistics::events::HitEvent;
/// use bevy_projectile_ballistics::types::HitOutcome;
///
/// let hit_event = HitEvent {
///     target: Entity::PLACEHOLDER,
///     destroyable: None,
///     impact_point: Vec3::ZERO,
///     normal: Vec3::Y,
///     outcome: HitOutcome::Absorbed,
///     damage: 0.0,
///     headshot: false,
/// };
/// ```
#[derive(Message, Clone, Debug)]
pub struct HitEvent {
    /// Raw hit entity
    pub target: Entity,
    /// Unit that took the damage, if any
    pub destroyable: Option<Entity>,
    /// Impact point in world space
    pub impact_point: Vec3,
    /// Surface normal at impact
    pub normal: Vec3,
    pub outcome: HitOutcome,
    /// Damage dealt, after headshot scaling
    pub damage: f32,
    pub headshot: bool,
}

impl From<HitReport> for HitEvent {
    fn from(report: HitReport) -> Self {
        Self {
            target: report.target,
            destroyable: report.destroyable,
            impact_point: report.position,
            normal: report.normal,
            outcome: report.outcome,
            damage: report.damage,
            headshot: report.headshot,
        }
    }
}

/// Damage to commit to a destroyable target. Only sent on the authoritative side.
#[derive(Message, Clone, Debug)]
pub struct ProjectileDamageEvent {
    pub target: Entity,
    pub amount: f32,
    pub kind: DamageType,
    /// Outermost owner of the firing weapon.
    pub attacker: Option<Entity>,
}

/// Impulse to apply to the top-most physical parent of a hit entity.
#[derive(Message, Clone, Debug)]
pub struct ProjectileImpulseEvent {
    pub entity: Entity,
    pub point: Vec3,
    /// Unit direction of the target's velocity change
    pub direction: Vec3,
    /// Momentum (kg·m/s)
    pub magnitude: f32,
}

/// Dent to apply to a cell grid around a hit block.
#[derive(Message, Clone, Debug)]
pub struct StructuralDeformationEvent {
    pub structure: Entity,
    pub point: Vec3,
    pub direction: Vec3,
    pub damage: f32,
    pub profile: DeformationProfile,
}

#[derive(Message, Clone, Debug)]
pub struct ImpactSoundEvent(pub ImpactSound);

#[derive(Message, Clone, Debug)]
pub struct ImpactParticlesEvent(pub ImpactParticles);

#[derive(Message, Clone, Debug)]
pub struct DecalEvent(pub DecalRequest);

/// The actor was hit and should stop firing.
#[derive(Message, Clone, Debug)]
pub struct InterruptShootingEvent {
    pub actor: Entity,
}
