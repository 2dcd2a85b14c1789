//! Surface interaction - penetration, deflection and absorption.
//!
//! The impact model works in the target's rest frame. Each axis of the
//! relative velocity (along the hit normal and across it) is exchanged
//! between projectile and target with a signed retention factor `r`:
//!
//! ```text
//! projectile_after = v * (m + r * M) / (m + M)
//! target_delta     = v * m * (1 - r) / (m + M)
//! ```
//!
//! `r = 1` leaves the axis untouched, `r = 0` is perfectly inelastic and
//! `r = -e` bounces with restitution `e`. Momentum is conserved for any `r`,
//! and for `r` in `[-1, 1]` the projectile never speeds up.

use bevy::ecs::message::MessageReader;
use bevy::prelude::*;

#[cfg(feature = "dim3")]
use avian3d::prelude::*;

use crate::components::{CellGrid, Destroyable, StructuralCell};
use crate::events::ProjectileDamageEvent;
#[cfg(feature = "dim3")]
use crate::events::ProjectileImpulseEvent;
use crate::resources::BallisticsConfig;
use crate::types::{DestroyableStats, HitOutcome};

/// Everything the impact model needs to know about one hit.
///
/// # Fields
/// * `normal` - Surface normal at the hit point
/// * `projectile_velocity` - Projectile velocity before the hit
/// * `target_velocity` - Linear velocity of the target's body
/// * `projectile_mass` - Kinetic-energy-equivalent projectile mass
/// * `target_mass` - Physical mass of the target's body
/// * `target` - Damage-model view of the destroyable
/// * `ammo_penetration` - Penetration rating of the ammunition
#[derive(Clone, Copy, Debug)]
pub struct ImpactInput {
    pub normal: Vec3,
    pub projectile_velocity: Vec3,
    pub target_velocity: Vec3,
    pub projectile_mass: f32,
    pub target_mass: f32,
    pub target: DestroyableStats,
    pub ammo_penetration: f32,
}

/// Outcome of the impact model.
#[derive(Clone, Copy, Debug)]
pub struct ImpactResult {
    pub outcome: HitOutcome,
    /// Damage units delivered to the target, before headshot scaling.
    pub damage: f32,
    /// Projectile velocity after the hit (world frame).
    pub velocity: Vec3,
    /// Velocity change of the target's body.
    pub target_delta_velocity: Vec3,
    /// Magnitude of the impulse delivered to the target.
    pub impulse: f32,
}

/// Resolves a hit into deflection, stop or penetration.
///
/// 1. Energy invested along the normal is compared with what the surface can
///    turn away (`projectile_resistance / ammo_penetration`, scaled by the
///    integrity fraction of a damaged cell). Ties deflect.
/// 2. Otherwise the remaining relative energy is compared with the target's
///    resistance-adjusted integrity: at or below it the target absorbs the
///    projectile, above it the projectile punches through.
///
/// # Arguments
/// * `input` - Hit geometry, velocities, masses and target stats
/// * `config` - Supplies energy-per-damage and deflection coefficients
///
/// # Returns
/// Outcome, damage, new projectile velocity and impulse on the target
pub fn resolve_impact(input: &ImpactInput, config: &BallisticsConfig) -> ImpactResult {
    let m = input.projectile_mass.max(0.0);
    let big_m = if input.target_mass.is_finite() && input.target_mass > 0.0 {
        input.target_mass
    } else {
        config.static_body_mass
    };
    let joules_per_damage = config.joules_per_damage.max(f32::EPSILON);

    let relative = input.projectile_velocity - input.target_velocity;
    let mut normal = input.normal.normalize_or_zero();
    let mut normal_speed = relative.dot(normal);
    if normal_speed > 0.0 {
        warn!("Hit normal faces along the projectile's travel; flipping it");
        normal = -normal;
        normal_speed = -normal_speed;
    }
    let normal_velocity = normal * normal_speed;
    let tangent_velocity = relative - normal_velocity;

    let invested = 0.5 * m * normal_speed * normal_speed / joules_per_damage;
    let penetration = if input.ammo_penetration > 0.0 {
        input.ammo_penetration
    } else {
        1.0
    };
    let mut max_deflectable = input.target.projectile_resistance.max(0.0) / penetration;
    let target = &input.target;
    if target.is_structural_cell() && target.max_integrity > 0.0 && target.integrity < target.max_integrity {
        max_deflectable *= (target.integrity / target.max_integrity).max(0.0);
    }
    let deflected = invested.min(max_deflectable);

    let (outcome, damage, normal_retention, tangent_retention) = if invested <= deflected {
        (
            HitOutcome::Deflected,
            0.0,
            -config.deflect_normal_restitution,
            config.deflect_tangent_retention,
        )
    } else {
        let total = 0.5 * m * relative.length_squared() / joules_per_damage;
        let remaining = total - deflected;
        let integrity = target.resistance_adjusted_integrity().max(0.0);
        if remaining <= integrity {
            (HitOutcome::Stopped, remaining, 0.0, 0.0)
        } else {
            let consumed = if total > 0.0 { integrity / total } else { 1.0 };
            (
                HitOutcome::Penetrated,
                integrity,
                1.0 - consumed,
                1.0 - consumed * 0.5,
            )
        }
    };

    let (normal_after, normal_delta) = exchange(normal_velocity, normal_retention, m, big_m);
    let (tangent_after, tangent_delta) = exchange(tangent_velocity, tangent_retention, m, big_m);
    let target_delta_velocity = normal_delta + tangent_delta;

    let mut velocity = normal_after + tangent_after + input.target_velocity;
    let speed_before = input.projectile_velocity.length();
    let speed_after = velocity.length();
    if speed_after > speed_before {
        if speed_after - speed_before > 1e-3 * speed_before.max(1.0) {
            warn!(
                "Impact would speed a projectile up ({speed_before} -> {speed_after} m/s); clamping"
            );
        }
        velocity *= speed_before / speed_after;
    }

    ImpactResult {
        outcome,
        damage,
        velocity,
        target_delta_velocity,
        impulse: target_delta_velocity.length() * big_m,
    }
}

/// Momentum exchange along one axis; see the module docs.
fn exchange(v: Vec3, retention: f32, m: f32, big_m: f32) -> (Vec3, Vec3) {
    let total = m + big_m;
    if total <= 0.0 {
        return (v, Vec3::ZERO);
    }
    let retention = retention.clamp(-1.0, 1.0);
    (v * ((m + retention * big_m) / total), v * (m * (1.0 - retention) / total))
}

/// Soft-area dent applied to a structure around a projectile hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeformationProfile {
    pub offset: f32,
    pub soft_area_planar: f32,
    pub soft_area_vertical: f32,
}

impl DeformationProfile {
    /// Dent size for a hit of `damage` on a grid of `cell_size` cells.
    pub fn for_damage(damage: f32, cell_size: f32) -> Self {
        let cell_size = cell_size.max(0.0);
        Self {
            offset: 0.000664 * damage,
            soft_area_planar: (0.011904 * damage).clamp(0.75 * cell_size, 1.3 * cell_size),
            soft_area_vertical: (0.008928 * damage).clamp(0.9 * cell_size, 1.3 * cell_size),
        }
    }
}

/// Applies projectile damage to [`Destroyable`] components.
///
/// Cells take damage scaled by their damage and deformation ratios. A target
/// whose integrity runs out is despawned and removed from its grid.
pub fn apply_projectile_damage(
    mut commands: Commands,
    mut damage_events: MessageReader<ProjectileDamageEvent>,
    mut destroyables: Query<(&mut Destroyable, Option<&StructuralCell>)>,
    mut grids: Query<&mut CellGrid>,
) {
    for event in damage_events.read() {
        let Ok((mut destroyable, cell)) = destroyables.get_mut(event.target) else {
            continue;
        };
        // Already destroyed earlier this tick.
        if destroyable.integrity <= 0.0 {
            continue;
        }

        let amount = if cell.is_some() {
            event.amount * destroyable.damage_ratio * destroyable.deformation_ratio
        } else {
            event.amount
        };
        destroyable.integrity -= amount;

        if destroyable.integrity <= 0.0 {
            if let Some(cell) = cell {
                if let Ok(mut grid) = grids.get_mut(cell.grid) {
                    grid.remove_block(event.target);
                }
            }
            debug!("Projectile destroyed {:?}", event.target);
            commands.entity(event.target).despawn();
        }
    }
}

/// Pushes dynamic bodies hit by projectiles.
#[cfg(feature = "dim3")]
pub fn apply_projectile_impulses(
    mut impulses: MessageReader<ProjectileImpulseEvent>,
    mut bodies: Query<(&RigidBody, &mut LinearVelocity, Option<&ComputedMass>)>,
) {
    for event in impulses.read() {
        let Ok((body, mut velocity, mass)) = bodies.get_mut(event.entity) else {
            continue;
        };
        if !body.is_dynamic() {
            continue;
        }
        let mass = mass.map_or(0.0, |m| m.value());
        if !(mass.is_finite() && mass > 0.0) {
            continue;
        }
        velocity.0 += event.direction * (event.magnitude / mass);
    }
}
