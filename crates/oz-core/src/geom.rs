//! Geometry primitives shared by the data model and the collider: planes,
//! axis-aligned bounds, and the world-scale tuning constants.
//!
//! Grounded on `oz::Bounds` / `oz::Plane` (original_source/src/oz/Plane.hpp),
//! carried forward per SPEC_FULL.md §2 as plain value types.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Half-extent of the world cube: the world spans `[-DIM, +DIM]` on every axis.
pub const DIM: f32 = 2048.0;

/// Collision margin used throughout the collider to avoid float-precision
/// false negatives/positives at brush boundaries.
pub const EPSILON: f32 = DIM * 4.0 * f32::EPSILON;

/// Side length of one world-grid cell (§4.A).
pub const CELL_SIZE: f32 = 8.0;

/// Terrain heightmap resolution (`VERTS x VERTS` cells), §3.
pub const VERTS: usize = 128;

/// Fixed simulation step, §4.D. 60 Hz, not configurable — variable
/// timestep is an explicit non-goal.
pub const TICK: f32 = 1.0 / 60.0;

pub const TICK_MICROS: u64 = 16_667;

/// A half-space: points `p` with `normal.dot(p) - distance <= 0` are inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from `point` to the plane (positive = outside).
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }
}

/// Axis-aligned bounding box, stored as world-space min/max corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl Bounds {
    pub fn new(mins: Vec3, maxs: Vec3) -> Self {
        Self { mins, maxs }
    }

    /// An AABB centred on `center` with half-dimensions `half_extents`.
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            mins: center - half_extents,
            maxs: center + half_extents,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.mins + self.maxs) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.maxs - self.mins) * 0.5
    }

    /// Expand the bounds outward by `margin` on every axis.
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            mins: self.mins - Vec3::splat(margin),
            maxs: self.maxs + Vec3::splat(margin),
        }
    }

    /// The bounds swept from the current position along `move_vec`.
    pub fn swept(&self, move_vec: Vec3) -> Self {
        let end = Self {
            mins: self.mins + move_vec,
            maxs: self.maxs + move_vec,
        };
        Self {
            mins: self.mins.min(end.mins),
            maxs: self.maxs.max(end.maxs),
        }
    }

    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.mins.x <= other.maxs.x
            && self.maxs.x >= other.mins.x
            && self.mins.y <= other.maxs.y
            && self.maxs.y >= other.mins.y
            && self.mins.z <= other.maxs.z
            && self.maxs.z >= other.mins.z
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.mins.x
            && p.x <= self.maxs.x
            && p.y >= self.mins.y
            && p.y <= self.maxs.y
            && p.z >= self.mins.z
            && p.z <= self.maxs.z
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            mins: self.mins + offset,
            maxs: self.maxs + offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_overlap_detects_touching_boxes() {
        let a = Bounds::from_center_half_extents(Vec3::ZERO, Vec3::splat(1.0));
        let b = Bounds::from_center_half_extents(Vec3::new(2.0, 0.0, 0.0), Vec3::splat(1.0));
        assert!(a.overlaps(&b));
        let c = Bounds::from_center_half_extents(Vec3::new(2.01, 0.0, 0.0), Vec3::splat(0.99));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn swept_bounds_covers_both_endpoints() {
        let a = Bounds::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5));
        let swept = a.swept(Vec3::new(10.0, 0.0, 0.0));
        assert!(swept.contains_point(Vec3::new(0.0, 0.0, 0.0)));
        assert!(swept.contains_point(Vec3::new(10.0, 0.0, 0.0)));
    }
}
