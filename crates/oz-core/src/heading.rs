//! Cardinal heading for placed structures.
//!
//! Grounded on `matrix/common.hh`'s `Heading` enum: the original encodes
//! `NORTH=0, WEST=1, SOUTH=2, EAST=3` with a `WEST_EAST_MASK=1` so that
//! "is this heading on the west-east axis" is a single bitwise AND. That
//! encoding is kept verbatim rather than flattened into an opaque 4-variant
//! enum, since `to_struct_cs`/`to_absolute_cs` rely on the axis swap it
//! implies (see SPEC_FULL.md §2).

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Heading {
    North = 0x00,
    West = 0x01,
    South = 0x02,
    East = 0x03,
}

const WEST_EAST_MASK: u8 = 0x01;

impl Heading {
    pub fn from_index(i: u8) -> Self {
        match i & 0x03 {
            0x00 => Heading::North,
            0x01 => Heading::West,
            0x02 => Heading::South,
            _ => Heading::East,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// True for `West`/`East`: the structure's local x/y axes are swapped
    /// relative to world space.
    pub fn is_west_east_axis(self) -> bool {
        self.index() & WEST_EAST_MASK != 0
    }

    /// Rotation angle in radians for this heading, increasing clockwise
    /// in 90-degree steps starting at North = 0.
    pub fn angle_radians(self) -> f32 {
        self.index() as f32 * std::f32::consts::FRAC_PI_2
    }

    /// The affine transform taking structure-local coordinates to world
    /// coordinates for a structure placed at `position` with this heading.
    pub fn transform(self, position: Vec3) -> Mat4 {
        Mat4::from_rotation_translation(
            glam::Quat::from_rotation_z(self.angle_radians()),
            position,
        )
    }

    /// Swap x/y half-extents when the heading is on the west-east axis.
    /// Used to derive a structure's world-space AABB from its model-space
    /// bounds without re-deriving the full rotation matrix.
    pub fn swap_xy(self, v: Vec3) -> Vec3 {
        if self.is_west_east_axis() {
            Vec3::new(v.y, v.x, v.z)
        } else {
            v
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn west_east_mask_matches_original_encoding() {
        assert!(!Heading::North.is_west_east_axis());
        assert!(Heading::West.is_west_east_axis());
        assert!(!Heading::South.is_west_east_axis());
        assert!(Heading::East.is_west_east_axis());
    }

    #[test]
    fn from_index_round_trips() {
        for i in 0..4u8 {
            assert_eq!(Heading::from_index(i).index(), i);
        }
    }

    #[test]
    fn swap_xy_only_on_west_east() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(Heading::North.swap_xy(v), v);
        assert_eq!(Heading::West.swap_xy(v), Vec3::new(2.0, 1.0, 3.0));
    }
}
