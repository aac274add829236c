//! The static geometry of a placed [`crate::model::Struct`]: planes, convex
//! brushes, and the entity-class table for its animated sub-models.
//!
//! Full BSP leaf/tree traversal and the binary mesh decoder are out of
//! scope (§1: "texture/mesh decoding" is an external collaborator); a
//! `BspModel` here is already-decoded brush data, flat rather than tree-
//! structured, since the collider only needs "which brushes touch this
//! cell", not leaf-node traversal order.

use crate::geom::{Bounds, Plane};
use crate::model::entity::EntityClass;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Surface material, used to pick footstep/impact sound classes and to
/// distinguish slick (low-friction) brushes for the physics friction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Material {
    Stone,
    Wood,
    Metal,
    Dirt,
    Ice,
    Slick,
    Water,
    Lava,
}

/// A convex region defined by the intersection of half-spaces. `planes`
/// indexes into the owning [`BspModel`]'s `planes` vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brush {
    pub planes: Vec<usize>,
    pub material: Material,
    /// Whether this brush blocks movement (a "solid" brush in the
    /// collider's terms) as opposed to e.g. a trigger volume.
    pub solid: bool,
}

/// Decoded static geometry shared by every [`crate::model::Struct`]
/// instance that uses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BspModel {
    pub name: String,
    pub planes: Vec<Plane>,
    pub brushes: Vec<Brush>,
    /// Model-space bounding box (before placement transform).
    pub bounds: Bounds,
    /// Number of fragments to spawn at the mid-z slab on destruction (§4.B).
    pub n_frags: u32,
    /// Animated sub-model classes, indexed the same way the `Struct`'s
    /// `entities` vector is indexed.
    pub entity_classes: Vec<Arc<EntityClass>>,
}

impl BspModel {
    pub fn new(name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            name: name.into(),
            planes: Vec::new(),
            brushes: Vec::new(),
            bounds,
            n_frags: 0,
            entity_classes: Vec::new(),
        }
    }

    pub fn with_brush(mut self, brush: Brush) -> Self {
        self.brushes.push(brush);
        self
    }

    pub fn with_entity_class(mut self, class: EntityClass) -> Self {
        self.entity_classes.push(Arc::new(class));
        self
    }
}
