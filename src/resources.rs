//! Global resources for the ballistics system.

use std::sync::Arc;

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::components::Projectile;
use crate::error::{BallisticsError, Result};
use crate::types::{
    BallisticsEffects, BallisticsWorld, DamageType, DecalRequest, HitReport, ImpactParticles,
    ImpactSound, ProjectileSpawnParams, ProjectileType, SimulationContext,
};

/// Global configuration for the ballistics system.
///
/// Every tunable constant of the flight and impact model lives here. None of
/// them is a fixed contract; the defaults reproduce the classic tuning.
///
/// # Example
/// ```
/// use bevy_projectile_ballistics::resources::BallisticsConfig;
///
/// let config = BallisticsConfig {
///     joules_per_damage: 10.0,
///     debug_draw: true,
///     ..Default::default()
/// };
/// assert_eq!(config.check_intersection_interval, 5);
/// ```
#[derive(Resource, Reflect, Clone, Debug)]
#[reflect(Resource)]
pub struct BallisticsConfig {
    /// Fixed simulation step (seconds)
    pub tick_seconds: f32,
    /// Ticks of travel covered by one lookahead raycast
    pub check_intersection_interval: u32,
    /// Ticks a deflected projectile survives
    pub deflected_max_ticks: u32,
    /// Kinetic energy (J) per unit of damage
    pub joules_per_damage: f32,
    /// Projectiles slower than this are spent (m/s)
    pub min_speed: f32,
    /// Spawn offset along the launch direction (m)
    pub origin_offset: f32,
    /// Relative random spread applied to the maximum trajectory
    pub trajectory_variance: f32,
    /// Fraction of normal speed bounced back on deflection
    pub deflect_normal_restitution: f32,
    /// Fraction of tangential speed kept on deflection
    pub deflect_tangent_retention: f32,
    /// Mass used for bodies without a finite mass (static geometry)
    pub static_body_mass: f32,
    /// Upper bound on entities gathered per narrow-phase segment query
    pub max_segment_hits: u32,
    /// Debug visualization
    pub debug_draw: bool,
    /// Frames a killed projectile's path stays visible when debug drawing
    pub debug_trail_ticks: u32,
}

impl Default for BallisticsConfig {
    /// Default values:
    /// - 60 Hz tick, lookahead of 5 ticks
    /// - Deflected projectiles live 75 ticks
    /// - 15 J per damage unit, 15 m/s minimum speed
    /// - 0.1 m muzzle offset, ±20% trajectory variance
    /// - Deflection keeps 50% normal and 90% tangential speed
    /// - Static bodies weigh 1e6 kg
    /// - Debug drawing disabled, 120 frame trails when enabled
    fn default() -> Self {
        Self {
            tick_seconds: 1.0 / 60.0,
            check_intersection_interval: 5,
            deflected_max_ticks: 75,
            joules_per_damage: 15.0,
            min_speed: 15.0,
            origin_offset: 0.1,
            trajectory_variance: 0.2,
            deflect_normal_restitution: 0.5,
            deflect_tangent_retention: 0.9,
            static_body_mass: 1.0e6,
            max_segment_hits: 32,
            debug_draw: false,
            debug_trail_ticks: 120,
        }
    }
}

/// Ammunition definition driving a projectile.
///
/// Loaded from JSON through [`AmmoLibrary::from_json_str`]; any field left out
/// keeps its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmmoDefinition {
    pub name: String,
    /// Muzzle speed the ammunition was designed for (m/s)
    pub desired_speed: f32,
    /// Relative random spread of the muzzle speed
    pub speed_variance: f32,
    /// Nominal range (m)
    pub max_trajectory: f32,
    /// Damage-equivalent kinetic energy carried at `desired_speed`
    pub mass_damage: f32,
    /// Damage dealt to characters
    pub health_damage: f32,
    /// Divides a surface's projectile resistance
    pub penetration: f32,
    /// Whether precision hits count as headshots
    pub head_shot: bool,
    /// Damage replacing `mass_damage` on a headshot
    pub head_shot_damage: f32,
    pub projectile_type: ProjectileType,
    pub is_explosive: bool,
    pub hit_impulse: f32,
    /// Probability (0..1) that the projectile draws a trail
    pub trail_probability: f32,
    pub trail_scale: f32,
    /// Particle effect spawned on every non-character hit
    pub on_hit_particles: Option<String>,
    /// Material-keyed particle effect family
    pub on_hit_material_particles: Option<String>,
}

impl Default for AmmoDefinition {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            desired_speed: 400.0,
            speed_variance: 0.0,
            max_trajectory: 800.0,
            mass_damage: 10.0,
            health_damage: 10.0,
            penetration: 1.0,
            head_shot: false,
            head_shot_damage: 120.0,
            projectile_type: ProjectileType::Bullet,
            is_explosive: false,
            hit_impulse: 0.0,
            trail_probability: 0.5,
            trail_scale: 0.1,
            on_hit_particles: None,
            on_hit_material_particles: None,
        }
    }
}

impl AmmoDefinition {
    /// Pistol round: slow, short ranged, headshot capable.
    pub fn pistol() -> Self {
        Self {
            name: "Pistol".to_string(),
            desired_speed: 400.0,
            speed_variance: 0.05,
            max_trajectory: 600.0,
            mass_damage: 20.0,
            health_damage: 25.0,
            head_shot: true,
            head_shot_damage: 60.0,
            trail_probability: 0.2,
            on_hit_particles: Some("Hit_BasicAmmoSmall".to_string()),
            on_hit_material_particles: Some("MaterialHit_Small".to_string()),
            ..default()
        }
    }

    /// Hand-held rifle round.
    pub fn rifle() -> Self {
        Self {
            name: "Rifle".to_string(),
            desired_speed: 800.0,
            speed_variance: 0.02,
            max_trajectory: 1200.0,
            mass_damage: 35.0,
            health_damage: 40.0,
            penetration: 1.5,
            head_shot: true,
            head_shot_damage: 120.0,
            trail_probability: 0.5,
            on_hit_particles: Some("Hit_BasicAmmoSmall".to_string()),
            on_hit_material_particles: Some("MaterialHit_Small".to_string()),
            ..default()
        }
    }

    /// Heavy ship-mounted gatling round.
    pub fn gatling() -> Self {
        Self {
            name: "Gatling".to_string(),
            desired_speed: 400.0,
            speed_variance: 0.1,
            max_trajectory: 800.0,
            mass_damage: 150.0,
            health_damage: 33.0,
            penetration: 2.0,
            hit_impulse: 5.0,
            trail_probability: 1.0,
            trail_scale: 0.3,
            on_hit_particles: Some("Hit_BasicAmmo".to_string()),
            on_hit_material_particles: Some("MaterialHit_Large".to_string()),
            ..default()
        }
    }

    /// Crossbow-style bolt.
    pub fn bolt() -> Self {
        Self {
            name: "Bolt".to_string(),
            desired_speed: 120.0,
            max_trajectory: 300.0,
            mass_damage: 30.0,
            health_damage: 60.0,
            head_shot: true,
            head_shot_damage: 150.0,
            projectile_type: ProjectileType::Bolt,
            trail_probability: 0.0,
            ..default()
        }
    }

    /// Rejects definitions that cannot drive a projectile.
    pub fn validate(&self) -> Result<()> {
        let reason = if !(self.desired_speed > 0.0) {
            Some("desired speed must be positive")
        } else if !(self.max_trajectory > 0.0) {
            Some("max trajectory must be positive")
        } else if !(self.penetration > 0.0) {
            Some("penetration must be positive")
        } else if self.mass_damage < 0.0 {
            Some("mass damage must not be negative")
        } else if !(0.0..1.0).contains(&self.speed_variance) {
            Some("speed variance must be in [0, 1)")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(BallisticsError::InvalidAmmo {
                name: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Kinetic-energy-equivalent mass: carries `mass_damage` at `desired_speed`.
    pub fn projectile_mass(&self, joules_per_damage: f32) -> f32 {
        2.0 * self.mass_damage * joules_per_damage / (self.desired_speed * self.desired_speed)
    }

    /// Multiplier applied to damage on a headshot.
    pub fn head_shot_multiplier(&self) -> f32 {
        if self.mass_damage > f32::EPSILON {
            self.head_shot_damage / self.mass_damage
        } else {
            1.0
        }
    }
}

/// Ammunition definitions available to [`crate::events::FireEvent`]s, by index.
///
/// # Example
/// ```
/// use bevy_projectile_ballistics::resources::AmmoLibrary;
///
/// let library = AmmoLibrary::from_json_str(
///     r#"[{ "name": "Slug", "desired_speed": 300.0, "mass_damage": 80.0 }]"#,
/// ).unwrap();
/// assert_eq!(library.get(0).unwrap().name, "Slug");
/// ```
#[derive(Resource, Default, Clone, Debug)]
pub struct AmmoLibrary {
    pub definitions: Vec<Arc<AmmoDefinition>>,
}

impl AmmoLibrary {
    /// Library holding the built-in presets: pistol, rifle, gatling, bolt.
    pub fn with_defaults() -> Self {
        Self {
            definitions: vec![
                Arc::new(AmmoDefinition::pistol()),
                Arc::new(AmmoDefinition::rifle()),
                Arc::new(AmmoDefinition::gatling()),
                Arc::new(AmmoDefinition::bolt()),
            ],
        }
    }

    /// Parses a JSON array of definitions and validates each one.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let parsed: Vec<AmmoDefinition> = serde_json::from_str(json)?;
        let mut library = Self::default();
        for definition in parsed {
            library.add(definition)?;
        }
        Ok(library)
    }

    /// Adds a definition and returns its index.
    pub fn add(&mut self, definition: AmmoDefinition) -> Result<usize> {
        definition.validate()?;
        self.definitions.push(Arc::new(definition));
        Ok(self.definitions.len() - 1)
    }

    pub fn get(&self, index: usize) -> Option<&Arc<AmmoDefinition>> {
        self.definitions.get(index)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.definitions.iter().position(|d| d.name == name)
    }
}

/// Which side of a replicated session this instance is.
#[derive(Resource, Reflect, Clone, Debug)]
#[reflect(Resource)]
pub struct SimulationRole {
    /// This side commits damage.
    pub authoritative: bool,
    /// Actor controlled by the local player.
    pub controlled_entity: Option<Entity>,
}

impl Default for SimulationRole {
    /// Single-player: authoritative, nobody controlled.
    fn default() -> Self {
        Self {
            authoritative: true,
            controlled_entity: None,
        }
    }
}

/// Running totals for the local player.
#[derive(Resource, Reflect, Clone, Debug, Default)]
#[reflect(Resource)]
pub struct DamageStats {
    pub total_damage_dealt: f32,
    pub shots_rejected: u32,
}

/// Stable index of a pool slot, valid while the projectile is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProjectileHandle(pub(crate) usize);

impl ProjectileHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Fixed-capacity arena of projectile slots.
///
/// Acquiring a slot runs a full reinitialization; releasing closes it and
/// returns it to the free list. Randomness comes from a seeded generator so
/// a replay with the same seed and inputs flies identically.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use bevy::prelude::*;
/// use bevy_projectile_ballistics::prelude::*;
///
/// let config = BallisticsConfig::default();
/// let mut pool = ProjectilePool::new(1, 7);
/// let ammo = Arc::new(AmmoDefinition::rifle());
///
/// assert!(pool.fire(ProjectileSpawnParams::new(ammo.clone(), Vec3::ZERO, Vec3::X), &config).is_ok());
/// assert!(pool.fire(ProjectileSpawnParams::new(ammo, Vec3::ZERO, Vec3::X), &config).is_err());
/// ```
#[derive(Resource)]
pub struct ProjectilePool {
    slots: Vec<Projectile>,
    free: Vec<usize>,
    active: Vec<usize>,
    rng: StdRng,
}

/// Default number of slots.
pub const DEFAULT_POOL_CAPACITY: usize = 512;

impl Default for ProjectilePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, 0)
    }
}

impl ProjectilePool {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            slots: (0..capacity).map(|_| Projectile::default()).collect(),
            // Popped from the back, so slot 0 goes out first.
            free: (0..capacity).rev().collect(),
            active: Vec::with_capacity(capacity),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Acquires a free slot and starts a projectile in it.
    pub fn fire(&mut self, params: ProjectileSpawnParams, config: &BallisticsConfig) -> Result<ProjectileHandle> {
        params.ammo.validate()?;
        let Some(slot) = self.free.pop() else {
            debug!("Projectile pool exhausted, rejecting shot");
            return Err(BallisticsError::PoolExhausted {
                capacity: self.slots.len(),
            });
        };
        self.slots[slot].start(&params, &mut self.rng, config);
        self.active.push(slot);
        Ok(ProjectileHandle(slot))
    }

    pub fn get(&self, handle: ProjectileHandle) -> Option<&Projectile> {
        self.slots.get(handle.0).filter(|slot| !slot.is_closed())
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Projectile> + '_ {
        self.active.iter().map(|&slot| &self.slots[slot])
    }

    /// Advances every active projectile by one tick.
    ///
    /// Runs the update, then the draw-pass bookkeeping, and reclaims slots
    /// whose update reports they are done.
    ///
    /// # Returns
    /// Number of slots reclaimed this tick
    pub fn update_all<W, E>(
        &mut self,
        world: &W,
        effects: &mut E,
        ctx: &mut SimulationContext,
        config: &BallisticsConfig,
    ) -> usize
    where
        W: BallisticsWorld + ?Sized,
        E: BallisticsEffects + ?Sized,
    {
        let mut reclaimed = 0;
        let mut i = 0;
        while i < self.active.len() {
            let slot = self.active[i];
            let projectile = &mut self.slots[slot];
            if projectile.update(world, effects, ctx, config) {
                projectile.finish_draw_pass(config);
                i += 1;
            } else {
                projectile.close();
                self.active.swap_remove(i);
                self.free.push(slot);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Closes every slot in flight (pool teardown).
    pub fn clear(&mut self) {
        for slot in self.active.drain(..) {
            self.slots[slot].close();
            self.free.push(slot);
        }
    }
}

/// A side effect recorded by the simulation, waiting to be dispatched.
#[derive(Clone, Debug)]
pub enum BallisticEffect {
    Damage {
        target: Entity,
        amount: f32,
        kind: DamageType,
        attacker: Option<Entity>,
    },
    Impulse {
        entity: Entity,
        point: Vec3,
        direction: Vec3,
        magnitude: f32,
    },
    Deformation {
        structure: Entity,
        point: Vec3,
        direction: Vec3,
        damage: f32,
    },
    Sound(ImpactSound),
    Particles(ImpactParticles),
    Decal(DecalRequest),
    InterruptShooting(Entity),
    Hit(HitReport),
}

/// Effects collected during the projectile update, in the order they happened.
#[derive(Resource, Default, Debug)]
pub struct EffectQueue {
    pub effects: Vec<BallisticEffect>,
}

impl EffectQueue {
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, BallisticEffect> {
        self.effects.drain(..)
    }
}

impl BallisticsEffects for EffectQueue {
    fn apply_damage(&mut self, target: Entity, amount: f32, kind: DamageType, attacker: Option<Entity>) {
        self.effects.push(BallisticEffect::Damage {
            target,
            amount,
            kind,
            attacker,
        });
    }

    fn apply_impulse(&mut self, entity: Entity, point: Vec3, direction: Vec3, magnitude: f32) {
        self.effects.push(BallisticEffect::Impulse {
            entity,
            point,
            direction,
            magnitude,
        });
    }

    fn apply_structural_deformation(&mut self, structure: Entity, point: Vec3, direction: Vec3, damage: f32) {
        self.effects.push(BallisticEffect::Deformation {
            structure,
            point,
            direction,
            damage,
        });
    }

    fn play_impact_audio(&mut self, sound: ImpactSound) {
        self.effects.push(BallisticEffect::Sound(sound));
    }

    fn emit_impact_particles(&mut self, particles: ImpactParticles) {
        self.effects.push(BallisticEffect::Particles(particles));
    }

    fn place_decal(&mut self, decal: DecalRequest) {
        self.effects.push(BallisticEffect::Decal(decal));
    }

    fn interrupt_shooting(&mut self, actor: Entity) {
        self.effects.push(BallisticEffect::InterruptShooting(actor));
    }

    fn record_hit(&mut self, report: HitReport) {
        self.effects.push(BallisticEffect::Hit(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        let library = AmmoLibrary::with_defaults();
        assert_eq!(library.definitions.len(), 4);
        for definition in &library.definitions {
            assert!(definition.validate().is_ok(), "{} should be valid", definition.name);
        }
        assert_eq!(library.find("Bolt"), Some(3));
        assert_eq!(library.find("Railgun"), None);
    }

    #[test]
    fn test_projectile_mass_carries_mass_damage() {
        let ammo = AmmoDefinition {
            desired_speed: 10.0,
            mass_damage: 50.0,
            ..Default::default()
        };
        let mass = ammo.projectile_mass(1.0);
        assert!((mass - 1.0).abs() < 1e-6);
        // 0.5 * m * v^2 / J gives back the mass damage.
        assert!((0.5 * mass * 100.0 - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_validate_rejects_bad_definitions() {
        let zero_speed = AmmoDefinition {
            desired_speed: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            zero_speed.validate(),
            Err(BallisticsError::InvalidAmmo { .. })
        ));

        let no_penetration = AmmoDefinition {
            penetration: 0.0,
            ..Default::default()
        };
        assert!(no_penetration.validate().is_err());

        let wild_variance = AmmoDefinition {
            speed_variance: 1.5,
            ..Default::default()
        };
        assert!(wild_variance.validate().is_err());
    }

    #[test]
    fn test_library_from_json() {
        let json = r#"[
            { "name": "Slug", "desired_speed": 300.0, "mass_damage": 80.0, "projectile_type": "Bolt" },
            { "name": "Needle", "desired_speed": 900.0, "head_shot": true }
        ]"#;
        let library = AmmoLibrary::from_json_str(json).unwrap();
        assert_eq!(library.definitions.len(), 2);

        let slug = library.get(0).unwrap();
        assert_eq!(slug.projectile_type, ProjectileType::Bolt);
        // Omitted fields keep their defaults.
        assert_eq!(slug.penetration, 1.0);
        assert_eq!(slug.head_shot_damage, 120.0);
        assert!(library.get(1).unwrap().head_shot);
    }

    #[test]
    fn test_library_from_json_errors() {
        assert!(matches!(
            AmmoLibrary::from_json_str("not json"),
            Err(BallisticsError::Parse(_))
        ));
        assert!(matches!(
            AmmoLibrary::from_json_str(r#"[{ "desired_speed": -1.0 }]"#),
            Err(BallisticsError::InvalidAmmo { .. })
        ));
    }

    #[test]
    fn test_head_shot_multiplier() {
        let ammo = AmmoDefinition {
            mass_damage: 40.0,
            head_shot_damage: 120.0,
            ..Default::default()
        };
        assert_eq!(ammo.head_shot_multiplier(), 3.0);

        let massless = AmmoDefinition {
            mass_damage: 0.0,
            ..Default::default()
        };
        assert_eq!(massless.head_shot_multiplier(), 1.0);
    }

    #[test]
    fn test_effect_queue_records_in_order() {
        let mut queue = EffectQueue::default();
        queue.apply_damage(Entity::PLACEHOLDER, 5.0, DamageType::Bullet, None);
        queue.interrupt_shooting(Entity::PLACEHOLDER);
        assert_eq!(queue.len(), 2);

        let drained: Vec<_> = queue.drain().collect();
        assert!(matches!(drained[0], BallisticEffect::Damage { amount, .. } if amount == 5.0));
        assert!(matches!(drained[1], BallisticEffect::InterruptShooting(_)));
        assert!(queue.is_empty());
    }
}
