//! Simulation systems layered over `oz-core`'s data model: the swept-AABB
//! collider, the physics integrator, the save/restore codec, and the
//! two-thread fixed-step tick pipeline (§4).
//!
//! `oz-core` owns state and invariants; this crate owns *how a tick moves
//! that state forward*, mirroring the split between `naive-core` (ECS
//! components) and `naive-client`'s systems in the teacher repo.

pub mod collider;
pub mod physics;
pub mod pipeline;
pub mod save;

#[cfg(feature = "lua")]
pub mod lua_api;

pub use collider::{Collider, EntityColliderView, Hit, Mask};
pub use pipeline::{Pipeline, PipelineHandle};
pub use save::{restore, save};
