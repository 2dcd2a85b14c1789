//! Projectile lifecycle - start, per-tick state machine, draw pass and close.

use bevy::ecs::message::{MessageReader, MessageWriter};
use bevy::prelude::*;
use rand::Rng;

use crate::components::Projectile;
use crate::error::BallisticsError;
use crate::events::{FireEvent, ShotRejected};
use crate::resources::{AmmoLibrary, BallisticsConfig, DamageStats, ProjectilePool};
use crate::types::{
    BallisticsEffects, BallisticsWorld, ProjectileSpawnParams, ProjectileState, SimulationContext,
};

impl Projectile {
    /// (Re)initializes the slot for a new flight.
    ///
    /// Every field is assigned here. A slot that was started and never
    /// closed is force-closed first.
    ///
    /// # Arguments
    /// * `params` - Launch parameters
    /// * `rng` - Source of the speed, range and trail randomness
    /// * `config` - Ballistics configuration
    pub fn start<R: Rng>(&mut self, params: &ProjectileSpawnParams, rng: &mut R, config: &BallisticsConfig) {
        if self.started && !self.closed {
            warn!("Restarting a projectile slot that was never closed; closing it first");
            self.close();
        }

        let ammo = params.ammo.as_ref();
        let launch_direction = params.direction.try_normalize().unwrap_or(Vec3::NEG_Z);
        let speed_factor = spread(rng, ammo.speed_variance);
        let trajectory_factor = spread(rng, config.trajectory_variance);

        self.state = ProjectileState::Active;
        self.ammo = Some(params.ammo.clone());

        self.origin = params.origin + launch_direction * config.origin_offset;
        self.position = self.origin;
        self.velocity = params.initial_velocity + launch_direction * ammo.desired_speed * speed_factor;
        self.speed = self.velocity.length();
        self.direction = if self.speed > f32::EPSILON {
            self.velocity / self.speed
        } else {
            launch_direction
        };
        self.desired_speed = ammo.desired_speed;
        self.mass = ammo.projectile_mass(config.joules_per_damage);
        self.max_trajectory = ammo.max_trajectory * trajectory_factor;
        self.distance_traveled = 0.0;

        self.known_clearance = 0.0;
        self.next_hit = None;
        self.hits.clear();
        self.penetrated.clear();
        self.segment_scratch.clear();

        self.ignore_entity = params.ignore_entity;
        self.weapon = params.weapon;
        self.owner = params.owner;
        self.owner_absolute = params.owner_absolute;

        self.deflected_ticks = 0;
        self.killed_extra_frames = 0;
        self.draw_trail = ammo.trail_probability >= rng.random::<f32>();

        self.started = true;
        self.closed = false;
    }

    /// Advances the projectile by one tick.
    ///
    /// # Returns
    /// `false` once the slot may be reclaimed
    pub fn update<W, E>(
        &mut self,
        world: &W,
        effects: &mut E,
        ctx: &mut SimulationContext,
        config: &BallisticsConfig,
    ) -> bool
    where
        W: BallisticsWorld + ?Sized,
        E: BallisticsEffects + ?Sized,
    {
        match self.state {
            ProjectileState::KilledAndDrawn => return false,
            ProjectileState::Killed => return true,
            ProjectileState::Deflected => {
                self.deflected_ticks += 1;
                if self.deflected_ticks >= config.deflected_max_ticks {
                    self.transition(ProjectileState::Killed);
                    return true;
                }
            }
            ProjectileState::Active => {}
        }

        if self.is_spent(config) {
            self.transition(ProjectileState::Killed);
            return true;
        }

        self.update_travel(world, effects, ctx, config);

        if self.state.is_flying() && self.distance_traveled >= self.max_trajectory {
            self.transition(ProjectileState::Killed);
        }
        true
    }

    fn is_spent(&self, config: &BallisticsConfig) -> bool {
        self.distance_traveled >= self.max_trajectory || self.speed < config.min_speed
    }

    /// Releases every reference and clears the buffers. Idempotent.
    pub fn close(&mut self) {
        self.state = ProjectileState::KilledAndDrawn;
        self.ammo = None;
        self.ignore_entity = None;
        self.weapon = None;
        self.owner = None;
        self.owner_absolute = None;
        self.next_hit = None;
        self.hits.clear();
        self.penetrated.clear();
        self.segment_scratch.clear();
        self.closed = true;
    }

    /// Moves the state machine forward. Backward moves are refused.
    pub(crate) fn transition(&mut self, next: ProjectileState) {
        if next < self.state {
            warn!(
                "Refusing projectile state change {:?} -> {:?}",
                self.state, next
            );
            return;
        }
        self.state = next;
    }

    /// Bookkeeping after the frame has been drawn.
    ///
    /// A killed projectile stays visible for `debug_trail_ticks` frames when
    /// debug drawing is on, and for no extra frame otherwise.
    pub fn finish_draw_pass(&mut self, config: &BallisticsConfig) {
        if self.state != ProjectileState::Killed {
            return;
        }
        self.killed_extra_frames += 1;
        if !config.debug_draw || self.killed_extra_frames >= config.debug_trail_ticks {
            self.transition(ProjectileState::KilledAndDrawn);
        }
    }
}

/// Uniform factor in `[1 - variance, 1 + variance]`.
fn spread<R: Rng>(rng: &mut R, variance: f32) -> f32 {
    if variance > 0.0 {
        rng.random_range(1.0 - variance..=1.0 + variance)
    } else {
        1.0
    }
}

/// Starts a pooled projectile for every [`FireEvent`].
///
/// Shots naming an unknown ammunition index, or arriving while the pool is
/// full, are rejected and reported.
pub fn spawn_projectiles(
    mut fire_events: MessageReader<FireEvent>,
    mut rejected: MessageWriter<ShotRejected>,
    library: Res<AmmoLibrary>,
    config: Res<BallisticsConfig>,
    mut pool: ResMut<ProjectilePool>,
    mut stats: ResMut<DamageStats>,
) {
    for event in fire_events.read() {
        let result = library
            .get(event.ammo)
            .cloned()
            .ok_or(BallisticsError::UnknownAmmo(event.ammo))
            .and_then(|ammo| pool.fire(event.to_spawn_params(ammo), &config));

        if let Err(error) = result {
            if matches!(error, BallisticsError::UnknownAmmo(_)) {
                warn!("Rejecting shot from {:?}: {}", event.shooter, error);
            }
            stats.shots_rejected += 1;
            rejected.write(ShotRejected {
                shooter: event.shooter,
                reason: error.to_string(),
            });
        }
    }
}
