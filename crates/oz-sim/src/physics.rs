//! Deterministic physics integrator (§4.D): gravity, buoyancy, friction,
//! swept-move collision response, object stacking, and a simplified
//! gravity/bounce loop for loose fragments.
//!
//! Grounded on `naive-client::physics`'s shape — a single entry point that
//! walks every live body once per tick and collects collision events — with
//! its actual `rapier3d` integration replaced end to end by the swept-AABB
//! collider in [`crate::collider`], since the substrate's determinism
//! property (§8) rules out depending on an upstream physics engine's
//! internal solver order.

use glam::Vec3;

use oz_core::events::EventBus;
use oz_core::geom::{DIM, EPSILON, TICK, VERTS};
use oz_core::ids::{FragId, ObjectId};
use oz_core::model::{FrictionMode, Material, ObjectEvent, ObjectFlags};
use oz_core::world::World;

use crate::collider::Collider;

/// World units/s^2 of downward acceleration.
pub const GRAVITY: f32 = 14.0;

/// Hard speed cap; keeps repeated impulses (stacking, crushers) from
/// building an unbounded velocity across ticks.
pub const MAX_VELOCITY: f32 = 60.0;

/// Below this speed a resting body snaps to exactly zero instead of decaying
/// asymptotically forever under friction.
pub const STICK_VELOCITY: f32 = 0.05;

/// Slick surfaces (ice) use a lower snap threshold so bodies keep sliding at
/// low speed instead of sticking early.
pub const SLICK_STICK_VELOCITY: f32 = 0.01;

/// Minimum `mass * closing speed` for a collision to raise a `Hit` event.
pub const HIT_MOMENTUM: f32 = 2.0;

/// Distance a clipped move backs off from the surface it slid along, so the
/// next sweep in the same tick starts clear of the plane.
pub const CLIP_BACKOFF: f32 = EPSILON * 4.0;

/// Residual-move sweep iterations per body per tick (clip-and-slide,
/// bounded so one tick can never loop forever against concave geometry).
pub const MAX_TRACE_SPLITS: u32 = 4;

/// Minimum `normal.z` for a collision to count as "standing on" rather than
/// a wall or ceiling hit.
pub const FLOOR_NORMAL_Z: f32 = 0.7;

/// Velocity fraction kept along the impact normal for dynamics (as opposed
/// to fragments, which use their class's own `restitution`). Dynamics stop
/// dead on impact; bounce is a fragment-only behavior.
pub const DEFAULT_RESTITUTION: f32 = 0.0;

pub const AIR_FRICTION: f32 = 0.05;
pub const LADDER_FRICTION: f32 = 6.0;
pub const WATER_FRICTION: f32 = 3.0;
pub const FLOOR_FRICTION: f32 = 8.0;
pub const SLICK_FRICTION: f32 = 0.4;
pub const OBJ_FRICTION: f32 = 6.0;

fn friction_coefficient(mode: FrictionMode) -> f32 {
    match mode {
        FrictionMode::Air => AIR_FRICTION,
        FrictionMode::Ladder => LADDER_FRICTION,
        FrictionMode::Water => WATER_FRICTION,
        FrictionMode::Floor => FLOOR_FRICTION,
        FrictionMode::Slick => SLICK_FRICTION,
        FrictionMode::Obj => OBJ_FRICTION,
    }
}

fn is_slick(material: Option<Material>) -> bool {
    matches!(material, Some(Material::Slick) | Some(Material::Ice))
}

/// Nearest terrain height under world-space `(x, y)`.
fn terrain_height_at(world: &World, x: f32, y: f32) -> f32 {
    let cell = 2.0 * DIM / VERTS as f32;
    let tx = (((x + DIM) / cell).floor() as i32).clamp(0, VERTS as i32 - 1) as usize;
    let ty = (((y + DIM) / cell).floor() as i32).clamp(0, VERTS as i32 - 1) as usize;
    world.terrain.height_at(tx, ty)
}

/// Advance every dynamic object and fragment by one tick (§4.D), then drain
/// each live object's accumulated events into `bus` for the audio
/// presenter (§4.B).
pub fn tick(world: &mut World, bus: &mut EventBus) {
    let dynamic_ids: Vec<ObjectId> = world
        .objects
        .iter()
        .filter(|(_, o)| o.is_dynamic())
        .map(|(id, _)| id)
        .collect();

    for &id in &dynamic_ids {
        tick_dynamic(world, id);
    }

    tick_fragments(world);

    let all_ids: Vec<ObjectId> = world.objects.iter().map(|(id, _)| id).collect();
    for id in all_ids {
        if let Some(obj) = world.objects.get_mut(id) {
            for event in obj.base.drain_events() {
                bus.emit(id, event);
            }
        }
    }
}

fn tick_dynamic(world: &mut World, id: ObjectId) {
    let Some(obj) = world.objects.get(id) else {
        return;
    };
    if obj.base.flags.contains(ObjectFlags::DISABLED) {
        return;
    }
    let Some(dyn_state) = obj.kind.dynamic() else {
        return;
    };

    let old_position = obj.base.position;
    let half_extents = obj.base.half_extents;
    let mass = dyn_state.mass.max(f32::EPSILON);
    let mut velocity = dyn_state.velocity;
    let mut friction_mode = dyn_state.friction;
    let prior_lower = dyn_state.lower;
    drop(obj);

    // A body resting on another dynamic inherits its horizontal velocity,
    // so standing on a moving platform carries you along with it.
    if let Some(lower_id) = prior_lower {
        if let Some(lower_velocity) = world
            .objects
            .get(lower_id)
            .and_then(|o| o.kind.dynamic())
            .map(|d| d.velocity)
        {
            velocity.x = lower_velocity.x;
            velocity.y = lower_velocity.y;
        }
    }

    let depth_before = world.terrain.liquid_depth(old_position.z);
    let submersion = if depth_before > 0.0 {
        (depth_before / (2.0 * half_extents.z.max(f32::EPSILON))).clamp(0.0, 1.0)
    } else {
        0.0
    };
    // Buoyancy cancels gravity in proportion to how submerged the body is.
    velocity.z -= GRAVITY * TICK * (1.0 - submersion);

    if submersion > 0.0 {
        friction_mode = FrictionMode::Water;
    } else if friction_mode == FrictionMode::Water {
        friction_mode = FrictionMode::Air;
    }

    let damp = (1.0 - friction_coefficient(friction_mode) * TICK).max(0.0);
    velocity.x *= damp;
    velocity.y *= damp;
    if matches!(friction_mode, FrictionMode::Water | FrictionMode::Ladder) {
        velocity.z *= damp;
    }

    if velocity.length_squared() > MAX_VELOCITY * MAX_VELOCITY {
        velocity = velocity.normalize() * MAX_VELOCITY;
    }

    let mut position = old_position;
    let mut move_vec = velocity * TICK;
    let mut landed_normal: Option<Vec3> = None;
    let mut landed_on: Option<ObjectId> = None;
    let mut landed_material: Option<Material> = None;
    let mut raised_events: Vec<ObjectEvent> = Vec::new();

    for _ in 0..MAX_TRACE_SPLITS {
        if move_vec.length_squared() < (STICK_VELOCITY * TICK) * (STICK_VELOCITY * TICK) {
            break;
        }

        let hit = Collider::new(&*world).translate(position, half_extents, move_vec, Some(id));
        position += move_vec * hit.ratio;

        if hit.ratio >= 1.0 {
            break;
        }

        let closing_speed = -velocity.dot(hit.normal);
        if closing_speed * mass > HIT_MOMENTUM {
            raised_events.push(ObjectEvent::Hit {
                intensity: closing_speed * mass,
            });
        }

        if hit.normal.z >= FLOOR_NORMAL_Z {
            landed_normal = Some(hit.normal);
            landed_on = hit.obj;
            landed_material = hit.material;
        }

        // Reflect-and-damp: remove the normal component of velocity
        // entirely (dynamics don't bounce, only fragments do).
        velocity -= hit.normal * (velocity.dot(hit.normal) * (1.0 + DEFAULT_RESTITUTION));

        let remaining_frac = 1.0 - hit.ratio;
        move_vec = velocity * TICK * remaining_frac + hit.normal * CLIP_BACKOFF;
    }

    // The collider only knows about structs/objects; clip against the
    // terrain heightmap separately so bodies never sink through the floor.
    let ground = terrain_height_at(&*world, position.x, position.y) + half_extents.z;
    if position.z < ground {
        position.z = ground;
        if velocity.z < 0.0 {
            velocity.z = 0.0;
        }
        landed_normal.get_or_insert(Vec3::Z);
    }

    let depth_after = world.terrain.liquid_depth(position.z);
    if (depth_before > 0.0) != (depth_after > 0.0) {
        raised_events.push(ObjectEvent::Splash {
            intensity: velocity.z.abs(),
        });
    }

    let stick_threshold = if is_slick(landed_material) {
        SLICK_STICK_VELOCITY
    } else {
        STICK_VELOCITY
    };
    if velocity.length_squared() < stick_threshold * stick_threshold {
        velocity = Vec3::ZERO;
    }

    if landed_normal.is_some() && prior_lower.is_none() {
        raised_events.push(ObjectEvent::Land);
    }
    if landed_normal.is_some() && velocity.length_squared() > stick_threshold * stick_threshold {
        raised_events.push(ObjectEvent::Fricting {
            intensity: velocity.length() * friction_coefficient(friction_mode),
        });
    }

    let new_friction = if landed_normal.is_some() {
        if is_slick(landed_material) {
            FrictionMode::Slick
        } else if landed_on.is_some() {
            FrictionMode::Obj
        } else {
            FrictionMode::Floor
        }
    } else if submersion > 0.0 {
        FrictionMode::Water
    } else {
        FrictionMode::Air
    };
    let new_lower = landed_on;

    world.grid.move_object(id, old_position, position);
    if let Some(obj_mut) = world.objects.get_mut(id) {
        obj_mut.base.position = position;
        obj_mut.base.flags.remove(ObjectFlags::ENABLE);
        for event in raised_events {
            obj_mut.base.push_event(event);
        }
        if let Some(d) = obj_mut.kind.dynamic_mut() {
            d.velocity = velocity;
            d.momentum = velocity * mass;
            d.depth = depth_after;
            d.friction = new_friction;
            d.lower = new_lower;
        }
        if landed_normal.is_some() && velocity == Vec3::ZERO {
            obj_mut.base.flags.insert(ObjectFlags::DISABLED);
        }
    }
}

/// Fragments ignore dynamics and each other (`model::fragment`'s doc
/// comment): gravity, a static-only sweep, then bounce per
/// `class.restitution` or expire on the first solid hit.
fn tick_fragments(world: &mut World) {
    let ids: Vec<FragId> = world.frags.iter().map(|(id, _)| id).collect();

    for id in ids {
        let Some(frag) = world.frags.get(id) else {
            continue;
        };
        let old_position = frag.position;
        let mut velocity = frag.velocity;
        let class = frag.class.clone();
        drop(frag);

        velocity.z -= GRAVITY * TICK;
        let move_vec = velocity * TICK;

        let hit = Collider::new(&*world).translate_static(old_position, Vec3::ZERO, move_vec);
        let mut position = old_position + move_vec * hit.ratio;
        let mut expired = false;

        if hit.ratio < 1.0 {
            if class.restitution > 0.0 {
                velocity -= hit.normal * (velocity.dot(hit.normal) * (1.0 + class.restitution));
            } else {
                expired = true;
            }
        }

        let ground = terrain_height_at(&*world, position.x, position.y);
        if position.z < ground {
            position.z = ground;
            if class.restitution > 0.0 && velocity.z < 0.0 {
                velocity.z = -velocity.z * class.restitution;
            } else {
                expired = true;
            }
        }

        let Some(frag_mut) = world.frags.get_mut(id) else {
            continue;
        };
        frag_mut.position = position;
        frag_mut.velocity = velocity;
        let lifetime_expired = frag_mut.tick_expired(TICK);

        if expired || lifetime_expired {
            world.despawn_frag(id);
        } else {
            world.grid.erase_frag(id, old_position);
            world.grid.insert_frag(id, position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oz_core::heading::Heading;
    use oz_core::model::{Brush, BspModel, FragClass, Fragment, Object, ObjectClass, ObjectKind};
    use oz_core::world::WorldCaps;
    use std::sync::Arc;

    fn floor_world() -> World {
        let mut w = World::new(1, WorldCaps::default(), oz_core::model::Terrain::flat(-1000.0));
        let mut bsp = BspModel::new(
            "floor",
            oz_core::geom::Bounds::from_center_half_extents(Vec3::new(0.0, 0.0, -1.0), Vec3::new(50.0, 50.0, 1.0)),
        );
        bsp.planes.push(oz_core::geom::Plane::new(Vec3::Z, -1.0));
        bsp = bsp.with_brush(Brush {
            planes: vec![0],
            material: Material::Stone,
            solid: true,
        });
        let s = oz_core::model::Struct::new(Arc::new(bsp), Vec3::ZERO, Heading::North, 1000.0);
        w.spawn_struct(s).unwrap();
        w
    }

    fn falling_box(w: &mut World, z: f32) -> ObjectId {
        let class = Arc::new(ObjectClass {
            half_extents: Vec3::splat(0.5),
            ..Default::default()
        });
        let mut obj = Object::new(class, Vec3::new(0.0, 0.0, z), ObjectKind::Dynamic(Default::default()));
        obj.base.flags.insert(ObjectFlags::SOLID);
        w.spawn_object(obj).unwrap()
    }

    #[test]
    fn a_falling_box_comes_to_rest_on_the_floor() {
        let mut w = floor_world();
        let mut bus = EventBus::new(16);
        let id = falling_box(&mut w, 3.0);

        for _ in 0..240 {
            tick(&mut w, &mut bus);
        }

        // The floor brush's top plane sits at z == -1 (see `floor_world`),
        // so a 1x1x1 box rests with its center at z == -0.5.
        let obj = w.objects.get(id).unwrap();
        assert!((obj.base.position.z - (-0.5)).abs() < 0.05);
        let dyn_state = obj.kind.dynamic().unwrap();
        assert!(dyn_state.velocity.length() < STICK_VELOCITY + 1e-3);
    }

    #[test]
    fn a_resting_box_eventually_goes_disabled() {
        let mut w = floor_world();
        let mut bus = EventBus::new(16);
        let id = falling_box(&mut w, 1.0);

        for _ in 0..300 {
            tick(&mut w, &mut bus);
        }

        let obj = w.objects.get(id).unwrap();
        assert!(obj.base.flags.contains(ObjectFlags::DISABLED));
    }

    #[test]
    fn a_non_bouncy_fragment_expires_on_its_first_solid_hit() {
        let mut w = floor_world();
        let class = Arc::new(FragClass {
            name: "chip".into(),
            lifetime: 10.0,
            mass: 0.1,
            restitution: 0.0,
        });
        let frag = Fragment::new(class, Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, -5.0));
        let id = w.spawn_frag(frag).unwrap();

        for _ in 0..120 {
            tick_fragments(&mut w);
        }

        assert!(!w.frags.contains(id));
    }

    #[test]
    fn a_bouncy_fragment_survives_a_solid_hit() {
        let mut w = floor_world();
        let class = Arc::new(FragClass {
            name: "spark".into(),
            lifetime: 10.0,
            mass: 0.1,
            restitution: 0.6,
        });
        // Close enough to the floor (plane at z == -1) that the very next
        // tick's sweep crosses it, so this is deterministically a bounce,
        // not several ticks of freefall first.
        let frag = Fragment::new(class, Vec3::new(0.0, 0.0, -0.95), Vec3::new(0.0, 0.0, -5.0));
        let id = w.spawn_frag(frag).unwrap();

        tick_fragments(&mut w);

        assert!(w.frags.contains(id));
        assert!(w.frags.get(id).unwrap().velocity.z > 0.0);
    }
}
