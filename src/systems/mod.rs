//! Systems module - all ECS systems for the ballistics simulation.
//!
//! Each module also extends [`crate::components::Projectile`] with the part
//! of the per-tick algorithm it owns.

pub mod collision;
pub mod kinematics;
pub mod logic;
pub mod surface;
pub mod vfx;
pub mod debug;
