//! Error kinds for the simulation core, one variant per row of the error
//! table in the specification's error-handling section.

use thiserror::Error;

/// A fatal or recoverable error raised by the simulation substrate.
///
/// The collider and physics hot path never construct this type directly —
/// they use `debug_assert!` and return codes, per the "never throw across
/// the tick boundary" policy. `SimError` surfaces at crate boundaries:
/// asset loading, save/restore, and the Lua call boundary.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("asset malformed: {0}")]
    AssetMalformed(String),

    #[error("capacity exceeded: {kind} is full (cap {cap})")]
    CapacityExceeded { kind: &'static str, cap: u32 },

    #[error("save incompatible: expected build tag {expected}, found {found}")]
    SaveIncompatible { expected: String, found: String },

    #[error("lua script error: {0}")]
    LuaScriptError(String),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("platform error: {0}")]
    PlatformError(String),
}

pub type SimResult<T> = Result<T, SimError>;
