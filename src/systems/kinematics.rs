//! Kinematics - clearance-gated straight-line travel.
//!
//! A projectile does not raycast every tick. It looks ahead
//! `check_intersection_interval` ticks of travel at once and caches how far
//! ahead is known to be clear, plus the hit found at the end of that window.
//! The hit is consumed only once the projectile has actually run out of
//! clearance, one lookahead later than it was found at worst, so destruction
//! from earlier ticks is already visible to the query that produced it.

use bevy::prelude::*;

#[cfg(feature = "dim3")]
use avian3d::prelude::*;

use crate::components::Projectile;
use crate::resources::BallisticsConfig;
#[cfg(feature = "dim3")]
use crate::resources::{DamageStats, EffectQueue, ProjectilePool, SimulationRole};
#[cfg(feature = "dim3")]
use crate::systems::collision::{BodyQueryData, PhysicsWorldView, TargetQueryData};
use crate::types::{BallisticsEffects, BallisticsWorld, HitInfo, SimulationContext};

impl Projectile {
    /// Moves the projectile one tick, consuming the pending hit if it is reached.
    pub(crate) fn update_travel<W, E>(
        &mut self,
        world: &W,
        effects: &mut E,
        ctx: &mut SimulationContext,
        config: &BallisticsConfig,
    ) where
        W: BallisticsWorld + ?Sized,
        E: BallisticsEffects + ?Sized,
    {
        let desired = self.speed * config.tick_seconds;

        // The cached hit may be several ticks old; its target can be gone.
        if self.known_clearance < desired
            && self
                .next_hit
                .as_ref()
                .is_some_and(|hit| !pending_hit_holds(world, hit))
        {
            debug!("Pending hit target vanished; querying the path again");
            self.next_hit = None;
            self.known_clearance = 0.0;
        }

        if self.known_clearance < desired && self.next_hit.is_none() {
            self.update_clearance(world, config);
        }

        if self.known_clearance >= desired {
            self.advance(desired);
            self.known_clearance -= desired;
            return;
        }

        // Partial move up to the obstacle, then its consequences.
        self.advance(self.known_clearance.max(0.0));
        self.known_clearance = 0.0;
        if let Some(hit) = self.next_hit.take() {
            self.consume_hit(hit, world, effects, ctx, config);
        }
    }

    /// Raycasts the next lookahead window and refreshes the cache.
    fn update_clearance<W>(&mut self, world: &W, config: &BallisticsConfig)
    where
        W: BallisticsWorld + ?Sized,
    {
        let window = self.speed * config.tick_seconds * config.check_intersection_interval.max(1) as f32;
        let from = self.position;
        let to = from + self.direction * window;

        if self.distance_traveled <= 0.0 && self.hits.is_empty() {
            world.prefetch_ray(from, from + self.direction * self.max_trajectory);
        }

        match self.find_hit(world, from, to) {
            Some(hit) => {
                self.known_clearance = hit.distance_sq.sqrt();
                self.next_hit = Some(hit);
            }
            None => self.known_clearance = window,
        }
    }

    fn advance(&mut self, distance: f32) {
        self.position += self.direction * distance;
        self.distance_traveled += distance;
    }
}

/// Whether a cached hit still points at something physical and, if it was
/// resolved to a damageable target, that target still exists.
fn pending_hit_holds<W>(world: &W, hit: &HitInfo) -> bool
where
    W: BallisticsWorld + ?Sized,
{
    world.has_physics(hit.entity)
        && hit
            .destroyable
            .is_none_or(|target| world.destroyable(target).is_some())
}

/// Advances every pooled projectile against the avian3d world.
///
/// Runs in FixedUpdate once the spatial query pipeline exists. Effects are
/// queued and turned into messages by the dispatch system that follows.
#[cfg(feature = "dim3")]
#[allow(clippy::too_many_arguments)]
pub fn update_projectiles(
    spatial_query: SpatialQuery,
    targets: Query<TargetQueryData>,
    bodies: Query<BodyQueryData>,
    config: Res<BallisticsConfig>,
    role: Res<SimulationRole>,
    mut stats: ResMut<DamageStats>,
    mut pool: ResMut<ProjectilePool>,
    mut queue: ResMut<EffectQueue>,
    mut segment_buffer: Local<Vec<RayHitData>>,
) {
    if pool.active_count() == 0 {
        return;
    }

    let world = PhysicsWorldView::new(&spatial_query, &targets, &bodies, &config)
        .with_segment_buffer(std::mem::take(&mut *segment_buffer));
    let mut ctx = SimulationContext::new(role.authoritative, role.controlled_entity);

    let reclaimed = pool.update_all(&world, &mut *queue, &mut ctx, &config);
    *segment_buffer = world.into_segment_buffer();
    stats.total_damage_dealt += ctx.damage_dealt;

    if reclaimed > 0 {
        debug!(
            "Reclaimed {} projectile slots, {} still in flight",
            reclaimed,
            pool.active_count()
        );
    }
}
