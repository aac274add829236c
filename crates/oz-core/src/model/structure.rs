//! Placed structure instances: a [`BspModel`] at a position/heading, with
//! its own entities, health, and bound objects.
//!
//! Grounded on `matrix/Struct.hh`/`Struct.cc`: `DEMOLISH_SPEED = 8.0`,
//! `DESTRUCT_FRAG_VELOCITY = (0, 0, 2)` are carried verbatim as tuning
//! constants (§2).

use glam::{Mat4, Vec3};
use std::sync::Arc;

use crate::geom::Bounds;
use crate::heading::Heading;
use crate::ids::ObjectId;
use crate::model::bsp::BspModel;
use crate::model::entity::Entity;

/// World-space z-velocity given to fragments spawned on structure
/// destruction.
pub const DESTRUCT_FRAG_VELOCITY: Vec3 = Vec3::new(0.0, 0.0, 2.0);

/// World units per second a demolished structure sinks while its frags
/// spawn in (§4.B).
pub const DEMOLISH_SPEED: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructLifecycle {
    Standing,
    /// Destroyed but still sinking/spawning fragments; `ratio` in `[0, 1)`.
    Demolishing,
    Gone,
}

/// A structure placed in the world: a [`BspModel`] instanced at a position
/// and heading, with mutable per-instance state (health, entity states,
/// objects bound to it).
#[derive(Debug, Clone)]
pub struct Struct {
    pub bsp: Arc<BspModel>,
    pub position: Vec3,
    pub heading: Heading,
    pub life: f32,
    pub resistance: f32,
    pub demolish_ratio: f32,
    pub lifecycle: StructLifecycle,
    pub entities: Vec<Entity>,
    pub bound_objects: Vec<ObjectId>,
}

impl Struct {
    pub fn new(bsp: Arc<BspModel>, position: Vec3, heading: Heading, life: f32) -> Self {
        let entities = bsp
            .entity_classes
            .iter()
            .cloned()
            .map(Entity::new)
            .collect();
        Self {
            bsp,
            position,
            heading,
            life,
            resistance: life,
            demolish_ratio: 0.0,
            lifecycle: StructLifecycle::Standing,
            entities,
            bound_objects: Vec::new(),
        }
    }

    /// World-to-local transform for this placement.
    pub fn transform(&self) -> Mat4 {
        self.heading.transform(self.position)
    }

    /// Local-to-world transform for this placement.
    pub fn inverse_transform(&self) -> Mat4 {
        self.transform().inverse()
    }

    /// Convert a world-space point into this structure's local coordinate
    /// system (`Struct::toStructCS`).
    pub fn to_struct_cs(&self, world_point: Vec3) -> Vec3 {
        self.inverse_transform().transform_point3(world_point)
    }

    /// Convert a local-space vector (not point — no translation) into world
    /// space (`Struct::toAbsoluteCS`).
    pub fn to_absolute_cs(&self, local_vec: Vec3) -> Vec3 {
        self.transform().transform_vector3(local_vec)
    }

    /// World-space AABB of the placed structure, accounting for the heading
    /// swapping the model's x/y half-extents (§2).
    pub fn world_bounds(&self) -> Bounds {
        let half = self.heading.swap_xy(self.bsp.bounds.half_extents());
        Bounds::from_center_half_extents(self.position, half)
    }

    /// World-space AABB of `self.entities[index]` at its current `offset`.
    pub fn entity_world_bounds(&self, index: usize) -> Bounds {
        let entity = &self.entities[index];
        let local_center = entity.class.local_position + entity.offset;
        let world_center = self.transform().transform_point3(local_center);
        let half = self.heading.swap_xy(entity.class.local_half_extents);
        Bounds::from_center_half_extents(world_center, half)
    }

    /// Apply `damage`, returning `true` the instant it transitions this
    /// structure into `Demolishing`.
    pub fn hit(&mut self, damage: f32) -> bool {
        if self.lifecycle != StructLifecycle::Standing {
            return false;
        }
        self.resistance -= damage;
        if self.resistance <= 0.0 {
            self.lifecycle = StructLifecycle::Demolishing;
            self.demolish_ratio = 0.0;
            true
        } else {
            false
        }
    }

    /// Advance the demolition sink by one tick. Returns `true` once fully
    /// gone (`demolish_ratio` has reached `1.0`), at which point the caller
    /// should despawn this structure and finish spawning `bsp.n_frags`
    /// fragments at the mid-z slab.
    pub fn tick_demolish(&mut self, tick: f32) -> bool {
        if self.lifecycle != StructLifecycle::Demolishing {
            return false;
        }
        let height = self.bsp.bounds.maxs.z - self.bsp.bounds.mins.z;
        let delta_height = DEMOLISH_SPEED * tick;
        self.demolish_ratio += delta_height / height.max(f32::EPSILON);
        self.position.z -= delta_height;

        if self.demolish_ratio >= 1.0 {
            self.lifecycle = StructLifecycle::Gone;
            true
        } else {
            false
        }
    }
}
