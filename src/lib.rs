//! # Bevy Projectile Ballistics
//!
//! Pooled per-tick projectile simulation for Bevy 0.18.
//!
//! ## Features
//! - Fixed-capacity projectile pool with full reinitialization on reuse
//! - Clearance-gated raycasting: one lookahead query covers several ticks
//! - Two-tier hit detection so animated actors are never tunnelled through
//! - Momentum-conserving penetrate / deflect / stop model
//! - Damage, impulse, deformation, audio, particle and decal requests as messages
//! - avian3d world adapter behind the `dim3` feature
//!
//! The simulation itself is plain Rust over two collaborator traits,
//! [`types::BallisticsWorld`] and [`types::BallisticsEffects`], so it runs
//! without an `App` as well.
//!
//! ## Quick Start
//! ```rust,no_run
//! use avian3d::prelude::*;
//! use bevy::prelude::*;
//! use bevy_projectile_ballistics::prelude::*;
//!
//! fn fire(mut shots: MessageWriter<FireEvent>) {
//!     shots.write(FireEvent::new(1, Vec3::new(0.0, 1.5, 0.0), Vec3::NEG_Z));
//! }
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(PhysicsPlugins::default())
//!         .add_plugins(BallisticsPluginGroup)
//!         .add_systems(Startup, fire)
//!         .run();
//! }
//! ```

pub mod components;
pub mod error;
pub mod events;
pub mod resources;
pub mod systems;
pub mod types;

#[cfg(test)]
mod test_world;


pub mod prelude {
    pub use crate::components::*;
    pub use crate::error::BallisticsError;
    pub use crate::events::*;
    pub use crate::resources::*;
    pub use crate::types::*;
    pub use crate::BallisticsPluginGroup;
    pub use crate::{BallisticsCorePlugin, BallisticsDebugPlugin, BallisticsSurfacePlugin};
    pub use bevy::ecs::message::MessageWriter;
}

use bevy::prelude::*;

/// Main plugin group that includes all ballistics subsystems.
///
/// This plugin group bundles together:
/// - The pooled simulation and effect dispatch
/// - Damage and impulse application to world components
/// - Debug path drawing
///
/// # Example
/// ```no_run
/// use bevy::prelude::*;
/// use bevy_projectile_ballistics::prelude::*;
///
/// fn main() {
///     App::new()
///         .add_plugins(DefaultPlugins)
///         .add_plugins(BallisticsPluginGroup)
///         .run();
/// }
/// ```
#[derive(Default)]
pub struct BallisticsPluginGroup;

impl PluginGroup for BallisticsPluginGroup {
    fn build(self) -> bevy::app::PluginGroupBuilder {
        bevy::app::PluginGroupBuilder::start::<Self>()
            .add(BallisticsCorePlugin)
            .add(BallisticsSurfacePlugin)
            .add(BallisticsDebugPlugin)
    }
}

/// Core simulation plugin.
///
/// Resources inserted before the plugin (a seeded pool, a custom ammunition
/// library, a client-side role) are kept.
///
/// # Systems (FixedUpdate, chained)
/// - `spawn_projectiles` - Starts a pooled projectile per [`events::FireEvent`]
/// - `update_projectiles` - Advances the pool against avian3d (needs a `SpatialQueryPipeline`)
/// - `dispatch_effects` - Turns the tick's effects into messages
pub struct BallisticsCorePlugin;

impl Plugin for BallisticsCorePlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<resources::AmmoLibrary>() {
            app.insert_resource(resources::AmmoLibrary::with_defaults());
        }

        app.register_type::<resources::BallisticsConfig>()
            .register_type::<resources::SimulationRole>()
            .register_type::<resources::DamageStats>()
            .init_resource::<resources::BallisticsConfig>()
            .init_resource::<resources::SimulationRole>()
            .init_resource::<resources::DamageStats>()
            .init_resource::<resources::ProjectilePool>()
            .init_resource::<resources::EffectQueue>()
            .add_message::<events::FireEvent>()
            .add_message::<events::ShotRejected>()
            .add_message::<events::HitEvent>()
            .add_message::<events::ProjectileDamageEvent>()
            .add_message::<events::ProjectileImpulseEvent>()
            .add_message::<events::StructuralDeformationEvent>()
            .add_message::<events::ImpactSoundEvent>()
            .add_message::<events::ImpactParticlesEvent>()
            .add_message::<events::DecalEvent>()
            .add_message::<events::InterruptShootingEvent>();

        #[cfg(feature = "dim3")]
        {
            use avian3d::prelude::SpatialQueryPipeline;
            app.add_systems(
                FixedUpdate,
                (
                    systems::logic::spawn_projectiles,
                    systems::kinematics::update_projectiles
                        .run_if(resource_exists::<SpatialQueryPipeline>),
                    systems::vfx::dispatch_effects,
                )
                    .chain(),
            );
        }

        #[cfg(not(feature = "dim3"))]
        app.add_systems(
            FixedUpdate,
            (
                systems::logic::spawn_projectiles,
                systems::vfx::dispatch_effects,
            )
                .chain(),
        );
    }
}

/// Applies projectile consequences to world components.
///
/// # Systems
/// - `apply_projectile_damage` - Lowers [`components::Destroyable`] integrity, despawning destroyed targets
/// - `apply_projectile_impulses` - Pushes dynamic avian bodies (`dim3`)
pub struct BallisticsSurfacePlugin;

impl Plugin for BallisticsSurfacePlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<components::TargetKind>()
            .register_type::<components::Destroyable>()
            .register_type::<components::StructuralCell>()
            .register_type::<components::ArticulatedActor>()
            .register_type::<components::Subpart>()
            .register_type::<components::SurfaceMaterial>()
            .register_type::<components::GunOwner>()
            .register_type::<components::HandheldRifle>()
            .register_type::<components::SuppressImpactAudio>()
            .add_systems(
                FixedUpdate,
                systems::surface::apply_projectile_damage.after(systems::vfx::dispatch_effects),
            );

        #[cfg(feature = "dim3")]
        app.add_systems(
            FixedUpdate,
            systems::surface::apply_projectile_impulses.after(systems::vfx::dispatch_effects),
        );
    }
}

/// Debug plugin for ballistics visualization.
pub struct BallisticsDebugPlugin;

impl Plugin for BallisticsDebugPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, systems::debug::draw_projectile_debug);
    }
}
