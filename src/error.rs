//! Error type for the ballistics crate.
//!
//! Only failures the caller can act on live here. Per-tick outcomes such as
//! "no hit" or "deflected" are ordinary values, never errors.

use thiserror::Error;

/// Errors reported by the projectile pool and the ammunition library.
#[derive(Debug, Error)]
pub enum BallisticsError {
    /// Every pooled slot is in flight; the shot is rejected.
    #[error("projectile pool exhausted ({capacity} slots in flight)")]
    PoolExhausted { capacity: usize },

    /// A fire request referenced an ammunition index the library does not hold.
    #[error("unknown ammunition index {0}")]
    UnknownAmmo(usize),

    /// An ammunition definition cannot drive a projectile.
    #[error("invalid ammunition definition `{name}`: {reason}")]
    InvalidAmmo { name: String, reason: &'static str },

    /// Ammunition library JSON could not be parsed.
    #[error("failed to parse ammunition library: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BallisticsError>;
