//! Swept-AABB / BSP collider (§4.C).
//!
//! The core primitive is the classic convex-polyhedron sweep test: clip the
//! segment `start -> start + move` against each half-space of a brush,
//! tracking the running `[entry, exit]` window; a brush is hit iff
//! `entry <= exit`. Dynamic objects are treated as a single six-plane brush
//! (their AABB expanded by the Minkowski sum with the moving box), so the
//! same routine covers both "candidate solid brush" and "candidate solid
//! dynamic object" from §4.C's algorithm sketch.

use glam::Vec3;

use oz_core::geom::{Bounds, Plane, EPSILON};
use oz_core::ids::{ObjectId, StructId};
use oz_core::model::{Entity, EntityCollider, Material, PushOutcome};
use oz_core::world::World;

/// Which object flags the collider treats as solid. Defaults to
/// `SOLID_BIT`; the crushing-block handler temporarily widens this to `~0`
/// so it can find and destroy anything in its path (§4.C).
#[derive(Debug, Clone, Copy)]
pub struct Mask(pub oz_core::model::ObjectFlags);

impl Default for Mask {
    fn default() -> Self {
        Mask(oz_core::model::ObjectFlags::SOLID)
    }
}

/// What a [`Collider::translate`] swept move struck, if anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hit {
    /// Fraction of `move` that is free, in `[0, 1]`. `1.0` means no hit.
    pub ratio: f32,
    pub normal: Vec3,
    pub material: Option<Material>,
    pub obj: Option<ObjectId>,
    pub str: Option<StructId>,
    pub entity: Option<usize>,
}

impl Hit {
    fn clear() -> Self {
        Self {
            ratio: 1.0,
            normal: Vec3::ZERO,
            material: None,
            obj: None,
            str: None,
            entity: None,
        }
    }
}

/// Clip the segment `start -> start + move_vec` (a swept point, already
/// Minkowski-summed against the moving box) against a convex set of
/// half-spaces. Returns `(entry_ratio, entry_normal)` if the segment enters
/// the region at all within `[0, 1]`.
fn sweep_vs_halfspaces<'a>(
    start: Vec3,
    move_vec: Vec3,
    planes: impl Iterator<Item = &'a Plane>,
) -> Option<(f32, Vec3)> {
    let mut entry = 0.0f32;
    let mut exit = 1.0f32;
    let mut entry_normal = Vec3::ZERO;

    for plane in planes {
        let num = plane.distance - plane.normal.dot(start);
        let denom = plane.normal.dot(move_vec);

        if denom.abs() < f32::EPSILON {
            if num < 0.0 {
                return None;
            }
            continue;
        }

        let t = num / denom;
        if denom < 0.0 {
            if t > entry {
                entry = t;
                entry_normal = plane.normal;
            }
        } else if t < exit {
            exit = t;
        }
    }

    if entry <= exit {
        Some((entry, entry_normal))
    } else {
        None
    }
}

/// Expand a static brush's planes by the swept box's support distance along
/// each plane's normal, turning a box-vs-brush sweep into a point-vs-brush
/// sweep (the standard Minkowski-sum trick).
fn expand_planes_for_box<'a>(
    planes: &'a [Plane],
    half_extents: Vec3,
) -> impl Iterator<Item = Plane> + 'a {
    planes.iter().map(move |p| {
        let support = half_extents.x * p.normal.x.abs()
            + half_extents.y * p.normal.y.abs()
            + half_extents.z * p.normal.z.abs();
        Plane::new(p.normal, p.distance + support)
    })
}

/// Six axis-aligned half-spaces bounding `bounds`, already expanded by
/// `half_extents` (so a swept point test against these is equivalent to a
/// swept-box-vs-box test).
fn aabb_as_planes(bounds: Bounds, half_extents: Vec3) -> [Plane; 6] {
    let expand = bounds.half_extents() + half_extents;
    let c = bounds.center();
    [
        Plane::new(Vec3::X, c.x + expand.x),
        Plane::new(-Vec3::X, -(c.x - expand.x)),
        Plane::new(Vec3::Y, c.y + expand.y),
        Plane::new(-Vec3::Y, -(c.y - expand.y)),
        Plane::new(Vec3::Z, c.z + expand.z),
        Plane::new(-Vec3::Z, -(c.z - expand.z)),
    ]
}

pub struct Collider<'w> {
    world: &'w World,
    pub mask: Mask,
    /// A `(struct, entity index)` pair `sweep_structs` never tests as an
    /// obstacle — set by [`EntityColliderView::push_overlapping`] so a
    /// crusher/elevator's own entity does not collide with the dynamics it
    /// is in the middle of pushing out of its own way.
    pub ignore_entity: Option<(StructId, usize)>,
}

impl<'w> Collider<'w> {
    pub fn new(world: &'w World) -> Self {
        Self {
            world,
            mask: Mask::default(),
            ignore_entity: None,
        }
    }

    /// Any solid brush or solid object intersects `aabb`, ignoring `ignore`.
    pub fn overlaps(&self, aabb: Bounds, ignore: Option<ObjectId>) -> bool {
        for id in self.world.grid.structs_near(aabb, 0.0) {
            let Some(s) = self.world.structs.get(id) else {
                continue;
            };
            if !s.world_bounds().overlaps(&aabb) {
                continue;
            }
            for brush in &s.bsp.brushes {
                if !brush.solid {
                    continue;
                }
                if self.point_in_brush_local(s, &brush.planes, aabb.center(), aabb.half_extents()) {
                    return true;
                }
            }
        }

        for id in self.world.grid.objects_near(aabb, 0.0) {
            if Some(id) == ignore {
                continue;
            }
            let Some(obj) = self.world.objects.get(id) else {
                continue;
            };
            if !obj.base.flags.contains(self.mask.0) {
                continue;
            }
            let obj_bounds = Bounds::from_center_half_extents(obj.base.position, obj.base.half_extents);
            if obj_bounds.overlaps(&aabb) {
                return true;
            }
        }

        false
    }

    /// §4.C operation 2: does `aabb` intersect entity `entity_index` of
    /// `struct_id` at its current offset. A missing struct/entity index is
    /// simply "no overlap" rather than an error, matching `overlaps`' own
    /// treatment of ids that no longer resolve.
    pub fn overlaps_entity(&self, aabb: Bounds, struct_id: StructId, entity_index: usize) -> bool {
        self.world
            .structs
            .get(struct_id)
            .filter(|s| entity_index < s.entities.len())
            .map(|s| s.entity_world_bounds(entity_index).overlaps(&aabb))
            .unwrap_or(false)
    }

    fn point_in_brush_local(&self, s: &oz_core::model::Struct, brush_planes: &[usize], world_center: Vec3, half_extents: Vec3) -> bool {
        let local = s.to_struct_cs(world_center);
        brush_planes.iter().all(|&pi| {
            let plane = &s.bsp.planes[pi];
            let support = half_extents.x * plane.normal.x.abs()
                + half_extents.y * plane.normal.y.abs()
                + half_extents.z * plane.normal.z.abs();
            plane.signed_distance(local) - support <= EPSILON
        })
    }

    /// The struct-brush half of a swept move, shared by [`Self::translate`]
    /// and [`Self::translate_static`] (fragments only ever need this half —
    /// see `model::fragment`'s doc comment on why frags skip dynamics).
    ///
    /// Also sweeps against every struct's [`Entity`] sub-parts (§4.C: "for
    /// moving entities ... test against the entity's brushes"). An entity
    /// has no brush list of its own (`model::entity`'s doc comment — only a
    /// single AABB at its current offset), so it is tested the same way a
    /// dynamic object is: as a six-plane Minkowski-summed box, always solid
    /// regardless of its `EntityState` (a fully open door's AABB has simply
    /// moved out of the doorway, so it naturally stops blocking without any
    /// special-casing here).
    fn sweep_structs(&self, start: Vec3, half_extents: Vec3, move_vec: Vec3, swept_bounds: Bounds) -> Hit {
        let mut best = Hit::clear();

        for id in self.world.grid.structs_near(swept_bounds, 0.0) {
            let Some(s) = self.world.structs.get(id) else {
                continue;
            };
            if !s.world_bounds().expanded(EPSILON).overlaps(&swept_bounds) {
                continue;
            }
            let local_start = s.to_struct_cs(start);
            let local_move = s.inverse_transform().transform_vector3(move_vec);

            for brush in &s.bsp.brushes {
                if !brush.solid {
                    continue;
                }
                let brush_planes: Vec<Plane> = brush.planes.iter().map(|&pi| s.bsp.planes[pi]).collect();
                let expanded: Vec<Plane> = expand_planes_for_box(&brush_planes, half_extents).collect();
                if let Some((ratio, local_normal)) = sweep_vs_halfspaces(local_start, local_move, expanded.iter()) {
                    if ratio < best.ratio || (ratio == best.ratio && Self::lower_struct_id(Some(id), best.str)) {
                        best.ratio = ratio;
                        best.normal = s.transform().transform_vector3(local_normal).normalize_or_zero();
                        best.material = Some(brush.material);
                        best.str = Some(id);
                        best.obj = None;
                        best.entity = None;
                    }
                }
            }

            for entity_index in 0..s.entities.len() {
                if self.ignore_entity == Some((id, entity_index)) {
                    continue;
                }
                let entity_bounds = s.entity_world_bounds(entity_index);
                if !entity_bounds.expanded(EPSILON).overlaps(&swept_bounds) {
                    continue;
                }
                let planes = aabb_as_planes(entity_bounds, half_extents);
                if let Some((ratio, normal)) = sweep_vs_halfspaces(start, move_vec, planes.iter()) {
                    if ratio < best.ratio || (ratio == best.ratio && Self::lower_struct_id(Some(id), best.str)) {
                        best.ratio = ratio;
                        best.normal = normal;
                        best.material = None;
                        best.str = Some(id);
                        best.obj = None;
                        best.entity = Some(entity_index);
                    }
                }
            }
        }

        best
    }

    fn lower_struct_id(a: Option<StructId>, b: Option<StructId>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.slot < b.slot,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Swept move of a point/box against static brushes only, ignoring
    /// every dynamic object. Used for fragments, which never collide with
    /// each other or with dynamics.
    pub fn translate_static(&self, start: Vec3, half_extents: Vec3, move_vec: Vec3) -> Hit {
        let swept_bounds = Bounds::from_center_half_extents(start, half_extents).swept(move_vec);
        self.sweep_structs(start, half_extents, move_vec, swept_bounds)
    }

    /// Swept move of a box with `half_extents` from `start` by `move_vec`,
    /// ignoring `ignore`. Ties resolve to the lowest id, matching §4.C.
    pub fn translate(
        &self,
        start: Vec3,
        half_extents: Vec3,
        move_vec: Vec3,
        ignore: Option<ObjectId>,
    ) -> Hit {
        let swept_bounds = Bounds::from_center_half_extents(start, half_extents).swept(move_vec);
        let mut best = self.sweep_structs(start, half_extents, move_vec, swept_bounds);

        for id in self.world.grid.objects_near(swept_bounds, 0.0) {
            if Some(id) == ignore {
                continue;
            }
            let Some(obj) = self.world.objects.get(id) else {
                continue;
            };
            if !obj.base.flags.contains(self.mask.0) {
                continue;
            }
            let obj_bounds = Bounds::from_center_half_extents(obj.base.position, obj.base.half_extents);
            let planes = aabb_as_planes(obj_bounds, half_extents);
            if let Some((ratio, normal)) = sweep_vs_halfspaces(start, move_vec, planes.iter()) {
                if ratio < best.ratio || (ratio == best.ratio && Self::lower_id(Some(id), best.obj)) {
                    best.ratio = ratio;
                    best.normal = normal;
                    best.material = None;
                    best.obj = Some(id);
                    best.str = None;
                    best.entity = None;
                }
            }
        }

        best
    }

    fn lower_id(a: Option<ObjectId>, b: Option<ObjectId>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.slot < b.slot,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Every struct/object id touched by `aabb` expanded by `margin`.
    pub fn get_overlaps(&self, aabb: Bounds, margin: f32) -> (Vec<StructId>, Vec<ObjectId>) {
        (
            self.world.grid.structs_near(aabb, margin),
            self.world.grid.objects_near(aabb, margin),
        )
    }
}

/// Binds a specific `(StructId, entity index)` to the [`EntityCollider`]
/// trait so `oz_core::model::Entity::tick` can query/push overlaps without
/// oz-core depending on this crate's collider type.
pub struct EntityColliderView<'w> {
    pub world: &'w mut World,
    pub struct_id: StructId,
    pub entity_index: usize,
}

impl<'w> EntityCollider for EntityColliderView<'w> {
    fn overlaps(&mut self, margin: f32) -> bool {
        let Some(s) = self.world.structs.get(self.struct_id) else {
            return false;
        };
        let bounds = s.entity_world_bounds(self.entity_index).expanded(margin);
        Collider::new(&*self.world).overlaps(bounds, None)
    }

    fn push_overlapping(&mut self, delta: Vec3, destroy_stuck: bool) -> PushOutcome {
        let Some(s) = self.world.structs.get(self.struct_id) else {
            return PushOutcome::default();
        };
        let bounds = s.entity_world_bounds(self.entity_index).expanded(2.0 * EPSILON);
        let overlapping = self.world.grid.objects_near(bounds, 2.0 * EPSILON);

        let mut blocked = false;
        for id in overlapping {
            // Copy the scalars we need out of `obj` up front so the
            // immutable borrow doesn't outlive the mutable one below.
            let Some((old_position, half_extents)) = self.world.objects.get(id).and_then(|obj| {
                (obj.kind.dynamic().is_some()).then_some((obj.base.position, obj.base.half_extents))
            }) else {
                continue;
            };
            let obj_bounds = Bounds::from_center_half_extents(old_position, half_extents);
            if !obj_bounds.overlaps(&bounds) {
                continue;
            }

            let mut collider = Collider::new(&*self.world);
            collider.ignore_entity = Some((self.struct_id, self.entity_index));
            let hit = collider.translate(old_position, half_extents, delta, Some(id));
            let new_position = old_position + delta * hit.ratio;

            if let Some(obj_mut) = self.world.objects.get_mut(id) {
                obj_mut.base.flags.remove(oz_core::model::ObjectFlags::DISABLED);
                obj_mut.base.flags.insert(oz_core::model::ObjectFlags::ENABLE);
                obj_mut.base.position = new_position;
            }
            self.world.grid.move_object(id, old_position, new_position);

            if hit.ratio < 1.0 {
                let new_bounds = Bounds::from_center_half_extents(new_position, half_extents);
                let still_overlapping = self
                    .world
                    .structs
                    .get(self.struct_id)
                    .map(|s| s.entity_world_bounds(self.entity_index).overlaps(&new_bounds))
                    .unwrap_or(false);
                if still_overlapping {
                    if destroy_stuck {
                        tracing::debug!(object = ?id, struct_id = ?self.struct_id, "crusher destroyed an object it could not push clear");
                        self.world.despawn_object(id);
                    } else {
                        blocked = true;
                    }
                }
            }
        }

        PushOutcome { blocked }
    }
}

/// Helper for the crusher/elevator handlers, matching [`Entity::tick`]'s
/// signature requirement while carrying the struct/entity index alongside
/// the mutable world reference.
pub fn tick_entity(world: &mut World, struct_id: StructId, entity_index: usize) {
    let Some(mut entity): Option<Entity> = world
        .structs
        .get(struct_id)
        .map(|s| s.entities[entity_index].clone())
    else {
        return;
    };

    // `tick` only reaches back into the world through the `EntityCollider`
    // trait, never through `entity` itself, so cloning it out and writing
    // it back afterwards cannot observe a stale view.
    let mut view = EntityColliderView {
        world,
        struct_id,
        entity_index,
    };
    entity.tick(&mut view);

    if let Some(s) = view.world.structs.get_mut(struct_id) {
        s.entities[entity_index] = entity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oz_core::heading::Heading;
    use oz_core::model::{Brush, BspModel};
    use oz_core::world::WorldCaps;
    use std::sync::Arc;

    fn floor_world() -> World {
        let mut w = World::new(1, WorldCaps::default(), oz_core::model::Terrain::flat(0.0));
        let mut bsp = BspModel::new(
            "floor",
            Bounds::from_center_half_extents(Vec3::new(0.0, 0.0, -1.0), Vec3::new(50.0, 50.0, 1.0)),
        );
        bsp.planes.push(Plane::new(Vec3::Z, -1.0));
        bsp = bsp.with_brush(Brush {
            planes: vec![0],
            material: Material::Stone,
            solid: true,
        });
        let s = oz_core::model::Struct::new(Arc::new(bsp), Vec3::ZERO, Heading::North, 1000.0);
        w.spawn_struct(s).unwrap();
        w
    }

    #[test]
    fn falling_box_stops_at_the_floor() {
        let w = floor_world();
        let collider = Collider::new(&w);
        let hit = collider.translate(Vec3::new(0.0, 0.0, 2.0), Vec3::splat(0.5), Vec3::new(0.0, 0.0, -5.0), None);
        assert!(hit.ratio < 1.0);
        assert!(hit.ratio > 0.0);
    }

    #[test]
    fn unobstructed_move_never_hits() {
        let w = floor_world();
        let collider = Collider::new(&w);
        let hit = collider.translate(Vec3::new(0.0, 0.0, 10.0), Vec3::splat(0.5), Vec3::new(1.0, 0.0, 0.0), None);
        assert_eq!(hit.ratio, 1.0);
    }

    #[test]
    fn crushing_block_destroys_a_crate_wedged_against_a_wall() {
        use oz_core::model::{EntityClass, EntityType, Object, ObjectClass, ObjectFlags, ObjectKind};

        let mut w = World::new(1, WorldCaps::default(), oz_core::model::Terrain::flat(-1000.0));

        // Solid wall occupying x >= 3.
        let mut wall = BspModel::new(
            "wall",
            Bounds::from_center_half_extents(Vec3::new(4.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 2.0)),
        );
        wall.planes.push(Plane::new(Vec3::new(-1.0, 0.0, 0.0), -3.0));
        wall = wall.with_brush(Brush {
            planes: vec![0],
            material: Material::Stone,
            solid: true,
        });
        w.spawn_struct(oz_core::model::Struct::new(Arc::new(wall), Vec3::ZERO, Heading::North, 1000.0))
            .unwrap();

        // The crusher itself: a big, slow-moving block whose footprint
        // spans far enough in x to still cover a crate stopped at the wall.
        let mut crusher = BspModel::new(
            "crusher",
            Bounds::from_center_half_extents(Vec3::ZERO, Vec3::splat(5.0)),
        );
        crusher = crusher.with_entity_class(EntityClass {
            ty: EntityType::CrushingBlock,
            local_half_extents: Vec3::splat(5.0),
            move_offset: Vec3::new(10.0, 0.0, 0.0),
            ratio_inc: 1.0,
            ..Default::default()
        });
        let struct_id = w
            .spawn_struct(oz_core::model::Struct::new(Arc::new(crusher), Vec3::ZERO, Heading::North, 1000.0))
            .unwrap();
        w.structs.get_mut(struct_id).unwrap().entities[0].state = oz_core::model::EntityState::Opening;

        let class = Arc::new(ObjectClass {
            half_extents: Vec3::splat(0.5),
            ..Default::default()
        });
        let mut obj = Object::new(class, Vec3::new(1.0, 0.0, 0.0), ObjectKind::Dynamic(Default::default()));
        obj.base.flags.insert(ObjectFlags::SOLID);
        let crate_id = w.spawn_object(obj).unwrap();

        tick_entity(&mut w, struct_id, 0);

        assert!(!w.objects.contains(crate_id), "crate wedged against the wall should be destroyed");
        assert_eq!(
            w.structs.get(struct_id).unwrap().entities[0].state,
            oz_core::model::EntityState::Opened
        );
    }
}
