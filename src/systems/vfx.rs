//! Hit effects - surface classification and effect dispatch.
//!
//! The crate draws nothing itself. It decides which audio cue, particle
//! effect and decal a hit deserves and hands those requests to whoever
//! renders them, as messages.

use bevy::ecs::message::MessageWriter;
use bevy::prelude::*;

use crate::components::CellGrid;
use crate::events::{
    DecalEvent, HitEvent, ImpactParticlesEvent, ImpactSoundEvent, InterruptShootingEvent,
    ProjectileDamageEvent, ProjectileImpulseEvent, StructuralDeformationEvent,
};
use crate::resources::{AmmoDefinition, BallisticEffect, EffectQueue};
use crate::systems::collision::nearest_occupied_cell;
use crate::systems::surface::DeformationProfile;
use crate::types::{
    AmmoSoundType, BallisticsEffects, BallisticsWorld, DecalRequest, EntityKind, HitInfo,
    ImpactParticles, ImpactSound, MaterialType, ProjectileType, SurfaceImpact,
};

/// Surface classification and material of whatever was hit.
///
/// # Arguments
/// * `world` - World to read kinds and configured materials from
/// * `entity` - Raw hit entity
/// * `point` - World-space hit point (samples terrain and grid cells)
///
/// # Returns
/// The particle classification and the material keying audio and decals
pub fn classify_surface<W>(world: &W, entity: Entity, point: Vec3) -> (SurfaceImpact, MaterialType)
where
    W: BallisticsWorld + ?Sized,
{
    let configured = world.surface_material(entity, point);
    match world.entity_kind(entity) {
        EntityKind::TerrainVoxel => (
            SurfaceImpact::Destructible,
            configured.unwrap_or(MaterialType::ROCK),
        ),
        EntityKind::ArticulatedActor => (
            SurfaceImpact::Character,
            configured.unwrap_or(MaterialType::CHARACTER),
        ),
        EntityKind::Vegetation => (SurfaceImpact::Destructible, MaterialType::WOOD),
        EntityKind::CellGrid => {
            let material = cell_material(world, entity, point).or(configured);
            (SurfaceImpact::Metal, material.unwrap_or(MaterialType::METAL))
        }
        EntityKind::Generic if world.destroyable(entity).is_none() => (
            SurfaceImpact::Indestructible,
            configured.unwrap_or(MaterialType::METAL),
        ),
        EntityKind::LooseDebris | EntityKind::Generic => {
            (SurfaceImpact::Metal, configured.unwrap_or(MaterialType::METAL))
        }
    }
}

/// Material of the grid block nearest to the hit point.
fn cell_material<W>(world: &W, grid: Entity, point: Vec3) -> Option<MaterialType>
where
    W: BallisticsWorld + ?Sized,
{
    let info = world.grid(grid)?;
    let local = info.world_to_local.transform_point3(point);
    let cell = nearest_occupied_cell(local, info.cell_size, |cell| world.grid_cell(grid, cell).is_some())?;
    let block = world.grid_cell(grid, cell)?;
    world.surface_material(block, point)
}

/// Acoustic family of a shot, first half of the impact audio key.
pub fn ammo_sound_type<W>(world: &W, ammo: &AmmoDefinition, weapon: Option<Entity>) -> AmmoSoundType
where
    W: BallisticsWorld + ?Sized,
{
    if ammo.is_explosive {
        return AmmoSoundType::ExplosiveBullet;
    }
    match ammo.projectile_type {
        ProjectileType::Bolt => AmmoSoundType::Bolt,
        ProjectileType::Bullet if weapon.is_some_and(|w| world.is_handheld_rifle(w)) => {
            AmmoSoundType::RifleBullet
        }
        ProjectileType::Bullet => AmmoSoundType::GunBullet,
    }
}

/// Sends the audio, particle and decal requests for a consumed hit.
pub(crate) fn dispatch_hit_effects<W, E>(
    world: &W,
    effects: &mut E,
    hit: &HitInfo,
    ammo: &AmmoDefinition,
    weapon: Option<Entity>,
    owner: Option<Entity>,
    direction: Vec3,
) where
    W: BallisticsWorld + ?Sized,
    E: BallisticsEffects + ?Sized,
{
    let (surface, material) = classify_surface(world, hit.entity, hit.position);

    let silent = owner.is_some_and(|owner| world.suppresses_impact_audio(owner));
    if !silent {
        let fallback = (world.entity_kind(hit.entity) == EntityKind::TerrainVoxel)
            .then_some(MaterialType::ROCK);
        effects.play_impact_audio(ImpactSound {
            ammo: ammo_sound_type(world, ammo, weapon),
            material: material.clone(),
            fallback,
            position: hit.position,
        });
    }

    // Characters use their own collision effect keyed by material.
    let effect = if surface == SurfaceImpact::Character {
        None
    } else {
        ammo.on_hit_particles.clone()
    };
    effects.emit_impact_particles(ImpactParticles {
        surface,
        material: material.clone(),
        position: hit.position,
        normal: hit.normal,
        direction,
        effect,
    });

    effects.place_decal(DecalRequest {
        target: hit.entity,
        material,
        position: hit.position,
        normal: hit.normal,
    });
}

/// Turns the effects recorded this tick into messages.
#[allow(clippy::too_many_arguments)]
pub fn dispatch_effects(
    mut queue: ResMut<EffectQueue>,
    grids: Query<&CellGrid>,
    mut hits: MessageWriter<HitEvent>,
    mut damage: MessageWriter<ProjectileDamageEvent>,
    mut impulses: MessageWriter<ProjectileImpulseEvent>,
    mut deformations: MessageWriter<StructuralDeformationEvent>,
    mut sounds: MessageWriter<ImpactSoundEvent>,
    mut particles: MessageWriter<ImpactParticlesEvent>,
    mut decals: MessageWriter<DecalEvent>,
    mut interrupts: MessageWriter<InterruptShootingEvent>,
) {
    for effect in queue.drain() {
        match effect {
            BallisticEffect::Damage {
                target,
                amount,
                kind,
                attacker,
            } => {
                damage.write(ProjectileDamageEvent {
                    target,
                    amount,
                    kind,
                    attacker,
                });
            }
            BallisticEffect::Impulse {
                entity,
                point,
                direction,
                magnitude,
            } => {
                impulses.write(ProjectileImpulseEvent {
                    entity,
                    point,
                    direction,
                    magnitude,
                });
            }
            BallisticEffect::Deformation {
                structure,
                point,
                direction,
                damage,
            } => {
                let Ok(grid) = grids.get(structure) else {
                    continue;
                };
                deformations.write(StructuralDeformationEvent {
                    structure,
                    point,
                    direction,
                    damage,
                    profile: DeformationProfile::for_damage(damage, grid.cell_size),
                });
            }
            BallisticEffect::Sound(sound) => {
                sounds.write(ImpactSoundEvent(sound));
            }
            BallisticEffect::Particles(request) => {
                particles.write(ImpactParticlesEvent(request));
            }
            BallisticEffect::Decal(request) => {
                decals.write(DecalEvent(request));
            }
            BallisticEffect::InterruptShooting(actor) => {
                interrupts.write(InterruptShootingEvent { actor });
            }
            BallisticEffect::Hit(report) => {
                hits.write(HitEvent::from(report));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::test_world::{grid_at, TestWorld};
    use crate::types::DestroyableStats;

    fn hit_on(entity: Entity) -> HitInfo {
        HitInfo {
            entity,
            destroyable: None,
            position: Vec3::new(1.0, 0.0, 0.0),
            normal: Vec3::NEG_X,
            headshot: false,
            distance_sq: 1.0,
        }
    }

    #[test]
    fn test_classification_table() {
        let mut world = TestWorld::new();
        let terrain = world.add_wall(1.0);
        world.body_mut(terrain).kind = EntityKind::TerrainVoxel;
        let actor = world.add_wall(2.0);
        world.body_mut(actor).kind = EntityKind::ArticulatedActor;
        let tree = world.add_wall(3.0);
        world.body_mut(tree).kind = EntityKind::Vegetation;
        let debris = world.add_wall(4.0);
        world.body_mut(debris).kind = EntityKind::LooseDebris;
        world.materials.insert(debris, MaterialType::ROCK);
        let prop = world.add_destroyable_wall(5.0, DestroyableStats::new(50.0, 0.0));
        let bedrock = world.add_wall(6.0);
        world.materials.insert(bedrock, MaterialType::ROCK);

        assert_eq!(
            classify_surface(&world, terrain, Vec3::ZERO),
            (SurfaceImpact::Destructible, MaterialType::ROCK)
        );
        assert_eq!(
            classify_surface(&world, actor, Vec3::ZERO),
            (SurfaceImpact::Character, MaterialType::CHARACTER)
        );
        assert_eq!(
            classify_surface(&world, tree, Vec3::ZERO),
            (SurfaceImpact::Destructible, MaterialType::WOOD)
        );
        assert_eq!(
            classify_surface(&world, debris, Vec3::ZERO),
            (SurfaceImpact::Metal, MaterialType::ROCK)
        );
        assert_eq!(
            classify_surface(&world, prop, Vec3::ZERO),
            (SurfaceImpact::Metal, MaterialType::METAL)
        );
        assert_eq!(
            classify_surface(&world, bedrock, Vec3::ZERO),
            (SurfaceImpact::Indestructible, MaterialType::ROCK)
        );
    }

    #[test]
    fn test_grid_uses_cell_material() {
        let mut world = TestWorld::new();
        let grid = world.add_box(Vec3::ZERO, Vec3::ONE);
        let glass = world.spawn_id();
        let mut cells = HashMap::new();
        cells.insert(IVec3::ZERO, glass);
        world.grids.insert(grid, (grid_at(Vec3::ZERO, 2.5), cells));
        world.materials.insert(glass, MaterialType::new("Glass"));

        let (surface, material) = classify_surface(&world, grid, Vec3::new(0.4, 0.2, 0.0));
        assert_eq!(surface, SurfaceImpact::Metal);
        assert_eq!(material.as_str(), "Glass");
    }

    #[test]
    fn test_ammo_sound_type() {
        let mut world = TestWorld::new();
        let rifle = world.spawn_id();
        let turret = world.spawn_id();
        world.rifles.insert(rifle);

        let explosive = AmmoDefinition {
            is_explosive: true,
            ..AmmoDefinition::rifle()
        };
        assert_eq!(ammo_sound_type(&world, &explosive, Some(rifle)), AmmoSoundType::ExplosiveBullet);
        assert_eq!(ammo_sound_type(&world, &AmmoDefinition::rifle(), Some(rifle)), AmmoSoundType::RifleBullet);
        assert_eq!(ammo_sound_type(&world, &AmmoDefinition::bolt(), Some(rifle)), AmmoSoundType::Bolt);
        assert_eq!(ammo_sound_type(&world, &AmmoDefinition::gatling(), Some(turret)), AmmoSoundType::GunBullet);
        assert_eq!(ammo_sound_type(&world, &AmmoDefinition::gatling(), None), AmmoSoundType::GunBullet);
    }

    #[test]
    fn test_dispatch_sends_audio_particles_and_decal() {
        let mut world = TestWorld::new();
        let terrain = world.add_wall(1.0);
        world.body_mut(terrain).kind = EntityKind::TerrainVoxel;
        let mut queue = EffectQueue::default();

        dispatch_hit_effects(&world, &mut queue, &hit_on(terrain), &AmmoDefinition::gatling(), None, None, Vec3::X);

        assert_eq!(queue.len(), 3);
        let effects: Vec<_> = queue.drain().collect();
        match &effects[0] {
            BallisticEffect::Sound(sound) => {
                assert_eq!(sound.fallback, Some(MaterialType::ROCK));
                assert_eq!(sound.ammo, AmmoSoundType::GunBullet);
            }
            other => panic!("expected a sound, got {other:?}"),
        }
        match &effects[1] {
            BallisticEffect::Particles(particles) => {
                assert_eq!(particles.surface, SurfaceImpact::Destructible);
                assert_eq!(particles.effect.as_deref(), Some("Hit_BasicAmmo"));
            }
            other => panic!("expected particles, got {other:?}"),
        }
        assert!(matches!(effects[2], BallisticEffect::Decal(_)));
    }

    #[test]
    fn test_silent_owner_skips_audio() {
        let mut world = TestWorld::new();
        let wall = world.add_wall(1.0);
        let warhead = world.spawn_id();
        world.silent_owners.insert(warhead);
        let mut queue = EffectQueue::default();

        dispatch_hit_effects(&world, &mut queue, &hit_on(wall), &AmmoDefinition::rifle(), None, Some(warhead), Vec3::X);

        assert_eq!(queue.len(), 2);
        assert!(!queue.effects.iter().any(|e| matches!(e, BallisticEffect::Sound(_))));
    }

    #[test]
    fn test_character_hit_uses_collision_effect() {
        let mut world = TestWorld::new();
        let actor = world.add_wall(1.0);
        world.body_mut(actor).kind = EntityKind::ArticulatedActor;
        let mut queue = EffectQueue::default();

        dispatch_hit_effects(&world, &mut queue, &hit_on(actor), &AmmoDefinition::rifle(), None, None, Vec3::X);

        let particles = queue.effects.iter().find_map(|e| match e {
            BallisticEffect::Particles(p) => Some(p),
            _ => None,
        });
        let particles = particles.unwrap();
        assert_eq!(particles.surface, SurfaceImpact::Character);
        assert!(particles.effect.is_none());
    }
}
