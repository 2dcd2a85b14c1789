use bevy::prelude::*;

use crate::resources::{BallisticsConfig, ProjectilePool};
use crate::types::ProjectileState;

/// Draw debug gizmos for pooled projectiles.
///
/// Draws each flight path from the current position back to the muzzle
/// through every consumed hit. Killed projectiles keep their path for
/// `debug_trail_ticks` frames.
pub fn draw_projectile_debug(
    mut gizmos: Gizmos,
    pool: Res<ProjectilePool>,
    config: Res<BallisticsConfig>,
) {
    if !config.debug_draw {
        return;
    }

    for projectile in pool.iter_active() {
        let color = match projectile.state() {
            ProjectileState::Active => Color::srgb(1.0, 0.0, 0.0),
            ProjectileState::Deflected => Color::srgb(1.0, 0.6, 0.0),
            _ => Color::srgb(0.5, 0.5, 0.5),
        };
        gizmos.linestrip(projectile.path_points(), color);

        for hit in projectile.hits() {
            gizmos.sphere(hit.position, 0.05, Color::srgb(1.0, 1.0, 0.0));
        }

        if projectile.state().is_flying() {
            // Velocity, scaled down for visibility
            let end = projectile.position() + projectile.velocity() * 0.01;
            gizmos.line(projectile.position(), end, Color::srgb(0.0, 1.0, 0.0));
        }
    }
}
