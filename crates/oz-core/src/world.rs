//! The top-level simulation state: id pools, the spatial grid, terrain and
//! the deterministic RNG seed, plus the invariant checks of §3.

use glam::Vec3;

use crate::error::SimError;
use crate::geom::Bounds;
use crate::grid::Grid;
use crate::ids::{FragId, ObjectId, Pool, StructId};
use crate::model::{Fragment, Object, Struct, Terrain};
use crate::rng::Rng;

pub struct World {
    pub structs: Pool<crate::ids::StructTag, Struct>,
    pub objects: Pool<crate::ids::ObjectTag, Object>,
    pub frags: Pool<crate::ids::FragTag, Fragment>,
    pub grid: Grid,
    pub terrain: Terrain,
    pub rng: Rng,
}

/// Compile-time caps a struct/object/frag pool refuses to grow past
/// (§4.A: "Failure: attempting to allocate beyond a compile-time cap fails
/// with CapacityExceeded").
#[derive(Clone, Copy)]
pub struct WorldCaps {
    pub max_structs: u32,
    pub max_objects: u32,
    pub max_frags: u32,
}

impl Default for WorldCaps {
    fn default() -> Self {
        Self {
            max_structs: 1 << 12,
            max_objects: 1 << 16,
            max_frags: 1 << 14,
        }
    }
}

impl World {
    pub fn new(seed: u64, caps: WorldCaps, terrain: Terrain) -> Self {
        Self {
            structs: Pool::new(caps.max_structs, "struct"),
            objects: Pool::new(caps.max_objects, "object"),
            frags: Pool::new(caps.max_frags, "frag"),
            grid: Grid::new(),
            terrain,
            rng: Rng::new(seed),
        }
    }

    pub fn spawn_struct(&mut self, s: Struct) -> Result<StructId, SimError> {
        let bounds = s.world_bounds();
        let id = self.structs.alloc(s)?;
        self.grid.insert_struct(id, bounds);
        Ok(id)
    }

    pub fn despawn_struct(&mut self, id: StructId) {
        if let Some(s) = self.structs.get(id) {
            let bounds = s.world_bounds();
            self.grid.erase_struct(id, bounds);
        }
        self.structs.free(id);
    }

    pub fn spawn_object(&mut self, o: Object) -> Result<ObjectId, SimError> {
        let position = o.base.position;
        let id = self.objects.alloc(o)?;
        self.grid.insert_object(id, position);
        Ok(id)
    }

    pub fn despawn_object(&mut self, id: ObjectId) {
        if let Some(o) = self.objects.get(id) {
            let position = o.base.position;
            self.grid.erase_object(id, position);
        }
        self.objects.free(id);
    }

    pub fn move_object(&mut self, id: ObjectId, from: Vec3, to: Vec3) {
        self.grid.move_object(id, from, to);
    }

    pub fn spawn_frag(&mut self, f: Fragment) -> Result<FragId, SimError> {
        let position = f.position;
        let id = self.frags.alloc(f)?;
        self.grid.insert_frag(id, position);
        Ok(id)
    }

    pub fn despawn_frag(&mut self, id: FragId) {
        if let Some(f) = self.frags.get(id) {
            let position = f.position;
            self.grid.erase_frag(id, position);
        }
        self.frags.free(id);
    }

    /// Check the §3 invariants that are cheap enough to run every tick in
    /// debug builds. Returns the first violated invariant's description.
    #[cfg(debug_assertions)]
    pub fn check_invariants(&self) -> Result<(), SimError> {
        for (_, dyn_obj) in self.objects.iter() {
            if let Some(dynamic) = dyn_obj.kind.dynamic() {
                if let Some(lower) = dynamic.lower {
                    let still_valid = self
                        .objects
                        .get(lower)
                        .map(|other| Self::overlaps_vertically(dyn_obj, other))
                        .unwrap_or(false);
                    if !still_valid {
                        return Err(SimError::InvariantViolated(
                            "dynamic.lower references a non-overlapping or freed object".into(),
                        ));
                    }
                }
            }
        }

        for (_, s) in self.structs.iter() {
            for entity in &s.entities {
                if !(0.0..=1.0).contains(&entity.ratio) {
                    return Err(SimError::InvariantViolated(format!(
                        "entity ratio {} out of [0,1]",
                        entity.ratio
                    )));
                }
                let expected = entity.ratio * entity.class.move_offset;
                if entity.offset.distance(expected) > crate::geom::EPSILON {
                    return Err(SimError::InvariantViolated(
                        "entity offset does not equal ratio * class.move".into(),
                    ));
                }
            }
            for &bound in &s.bound_objects {
                if !self.objects.contains(bound) {
                    return Err(SimError::InvariantViolated(
                        "struct.bound_objects references a freed object".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    fn overlaps_vertically(a: &Object, b: &Object) -> bool {
        let ab = Bounds::from_center_half_extents(a.base.position, a.base.half_extents);
        let bb = Bounds::from_center_half_extents(b.base.position, b.base.half_extents);
        ab.mins.z <= bb.maxs.z && ab.maxs.z >= bb.mins.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heading::Heading;
    use crate::model::{BspModel, ObjectClass, ObjectKind};
    use std::sync::Arc;

    fn world() -> World {
        World::new(1, WorldCaps::default(), Terrain::flat(0.0))
    }

    #[test]
    fn spawn_and_despawn_struct_updates_grid() {
        let mut w = world();
        let bsp = Arc::new(BspModel::new(
            "test",
            Bounds::from_center_half_extents(Vec3::ZERO, Vec3::splat(2.0)),
        ));
        let s = Struct::new(bsp, Vec3::ZERO, Heading::North, 100.0);
        let id = w.spawn_struct(s).unwrap();
        assert!(w.structs.contains(id));
        w.despawn_struct(id);
        assert!(!w.structs.contains(id));
    }

    #[test]
    fn spawn_object_registers_in_grid() {
        let mut w = world();
        let obj = Object::new(Arc::new(ObjectClass::default()), Vec3::new(3.0, 3.0, 0.0), ObjectKind::Static);
        let id = w.spawn_object(obj).unwrap();
        let bounds = Bounds::from_center_half_extents(Vec3::new(3.0, 3.0, 0.0), Vec3::splat(0.1));
        assert!(w.grid.objects_near(bounds, 0.0).contains(&id));
    }

    #[test]
    fn invariants_hold_on_an_empty_world() {
        let w = world();
        assert!(w.check_invariants().is_ok());
    }
}
