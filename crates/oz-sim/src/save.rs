//! Hand-rolled little-endian save/restore codec (§4.F, §6).
//!
//! Not serde-derived: the wire format must stay byte-stable across a
//! build-tag check rather than drift with whatever `serde`'s derive happens
//! to produce for a given struct's current field order. Mirrors
//! `naive-client::project_config`'s "own the format, don't outsource it"
//! stance, just for the binary save stream instead of the YAML mission
//! config.
//!
//! Entities reference each other by id (`struct.bound_objects`,
//! `object.parent`/`inventory`, `Dynamic.lower`, `Bot.weapon`/`cargo`,
//! `Vehicle.pilot`). A restored `World`'s pools don't promise the same slot
//! numbers the saved `World` had — a save file only contains *live* entries,
//! so a freed slot from the original session leaves no gap to reproduce.
//! Restore therefore runs in two passes: spawn every struct/object first
//! while recording `old (slot, generation) -> new id`, then rewrite every
//! cross-reference through that map.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use glam::{Quat, Vec3};

use oz_core::error::{SimError, SimResult};
use oz_core::ids::{Index, ObjectId, StructId};
use oz_core::model::{
    Bot, BotState, Dynamic, EntityState, FrictionMode, Object, ObjectFlags, ObjectKind, Struct,
    StructLifecycle, Vehicle, VehicleWeaponSlot, Weapon,
};
use oz_core::library::ClassLibrary;
use oz_core::model::Terrain;
use oz_core::world::{World, WorldCaps};

/// Bumped whenever the binary layout below changes. Old saves are rejected
/// rather than guessed at (§4.F: "Restore ... rejects ... an incompatible
/// build tag").
pub const BUILD_TAG: &str = concat!("oz-save-v1-", env!("CARGO_PKG_VERSION"));

const MAGIC: &[u8; 4] = b"OZSV";

/// A save file's struct/object id as written on disk: the original
/// `(slot, generation)` pair, meaningless on its own until remapped against
/// a freshly restored pool.
type RawId = (u32, u32);

/// Write `world`'s full state to `writer` in the save format.
pub fn save(world: &World, writer: &mut impl Write) -> SimResult<()> {
    write_body(world, writer).map_err(|e| SimError::PlatformError(format!("save: {e}")))
}

/// Internal error while walking a restore: an I/O failure (truncated
/// stream, bad UTF-8 string), or a `SimError` raised by a class lookup or
/// header check. Kept distinct from `SimError` so `?` can thread ordinary
/// `io::Error`s through `read_body` without repeating the `AssetMalformed`
/// wrapping at every call site.
enum RestoreErr {
    Io(io::Error),
    Sim(SimError),
}

impl From<io::Error> for RestoreErr {
    fn from(e: io::Error) -> Self {
        RestoreErr::Io(e)
    }
}

impl From<SimError> for RestoreErr {
    fn from(e: SimError) -> Self {
        RestoreErr::Sim(e)
    }
}

/// Rebuild a `World` from a save stream written by [`save`]. Structs and
/// objects are spawned by looking their class up in `library`, which fails
/// with `AssetNotFound` the same way a fresh spawn would (§4.F).
pub fn restore(
    reader: &mut impl Read,
    library: &ClassLibrary,
    terrain: Terrain,
    caps: WorldCaps,
) -> SimResult<World> {
    read_body(reader, library, terrain, caps).map_err(|e| match e {
        RestoreErr::Io(e) => SimError::AssetMalformed(format!("save stream: {e}")),
        RestoreErr::Sim(e) => e,
    })
}

fn write_str(w: &mut impl Write, s: &str) -> io::Result<()> {
    w.write_u16::<LE>(s.len() as u16)?;
    w.write_all(s.as_bytes())
}

fn read_str(r: &mut impl Read) -> io::Result<String> {
    let len = r.read_u16::<LE>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_vec3(w: &mut impl Write, v: Vec3) -> io::Result<()> {
    w.write_f32::<LE>(v.x)?;
    w.write_f32::<LE>(v.y)?;
    w.write_f32::<LE>(v.z)
}

fn read_vec3(r: &mut impl Read) -> io::Result<Vec3> {
    Ok(Vec3::new(r.read_f32::<LE>()?, r.read_f32::<LE>()?, r.read_f32::<LE>()?))
}

fn write_quat(w: &mut impl Write, q: Quat) -> io::Result<()> {
    w.write_f32::<LE>(q.x)?;
    w.write_f32::<LE>(q.y)?;
    w.write_f32::<LE>(q.z)?;
    w.write_f32::<LE>(q.w)
}

fn read_quat(r: &mut impl Read) -> io::Result<Quat> {
    Ok(Quat::from_xyzw(
        r.read_f32::<LE>()?,
        r.read_f32::<LE>()?,
        r.read_f32::<LE>()?,
        r.read_f32::<LE>()?,
    ))
}

/// Write a real, resolved id (used for the *saving* side — by the time we
/// serialize, every id is a live `Index<Tag>`).
fn write_opt_id<Tag>(w: &mut impl Write, id: Option<Index<Tag>>) -> io::Result<()> {
    match id {
        Some(id) => {
            w.write_u8(1)?;
            w.write_u32::<LE>(id.slot)?;
            w.write_u32::<LE>(id.generation)
        }
        None => w.write_u8(0),
    }
}

/// Read an optional id as the raw `(slot, generation)` pair it was saved
/// under (the *restoring* side — these only become real ids once resolved
/// against the remap tables built while spawning).
fn read_opt_raw_id(r: &mut impl Read) -> io::Result<Option<RawId>> {
    if r.read_u8()? == 0 {
        Ok(None)
    } else {
        Ok(Some((r.read_u32::<LE>()?, r.read_u32::<LE>()?)))
    }
}

fn lifecycle_tag(l: StructLifecycle) -> u8 {
    match l {
        StructLifecycle::Standing => 0,
        StructLifecycle::Demolishing => 1,
        StructLifecycle::Gone => 2,
    }
}

fn tag_to_lifecycle(tag: u8) -> Result<StructLifecycle, RestoreErr> {
    match tag {
        0 => Ok(StructLifecycle::Standing),
        1 => Ok(StructLifecycle::Demolishing),
        2 => Ok(StructLifecycle::Gone),
        other => Err(RestoreErr::Sim(SimError::AssetMalformed(format!(
            "bad struct lifecycle tag {other}"
        )))),
    }
}

fn entity_state_tag(s: EntityState) -> u8 {
    match s {
        EntityState::Closed => 0,
        EntityState::Opening => 1,
        EntityState::Opened => 2,
        EntityState::Closing => 3,
    }
}

fn tag_to_entity_state(tag: u8) -> Result<EntityState, RestoreErr> {
    match tag {
        0 => Ok(EntityState::Closed),
        1 => Ok(EntityState::Opening),
        2 => Ok(EntityState::Opened),
        3 => Ok(EntityState::Closing),
        other => Err(RestoreErr::Sim(SimError::AssetMalformed(format!(
            "bad entity state tag {other}"
        )))),
    }
}

fn friction_tag(f: FrictionMode) -> u8 {
    match f {
        FrictionMode::Air => 0,
        FrictionMode::Ladder => 1,
        FrictionMode::Water => 2,
        FrictionMode::Floor => 3,
        FrictionMode::Slick => 4,
        FrictionMode::Obj => 5,
    }
}

fn tag_to_friction(tag: u8) -> Result<FrictionMode, RestoreErr> {
    match tag {
        0 => Ok(FrictionMode::Air),
        1 => Ok(FrictionMode::Ladder),
        2 => Ok(FrictionMode::Water),
        3 => Ok(FrictionMode::Floor),
        4 => Ok(FrictionMode::Slick),
        5 => Ok(FrictionMode::Obj),
        other => Err(RestoreErr::Sim(SimError::AssetMalformed(format!(
            "bad friction mode tag {other}"
        )))),
    }
}

fn kind_tag(kind: &ObjectKind) -> u8 {
    match kind {
        ObjectKind::Static => 0,
        ObjectKind::Dynamic(_) => 1,
        ObjectKind::Weapon(..) => 2,
        ObjectKind::Bot(..) => 3,
        ObjectKind::Vehicle(..) => 4,
    }
}

fn write_dynamic(w: &mut impl Write, d: &Dynamic) -> io::Result<()> {
    write_vec3(w, d.velocity)?;
    write_vec3(w, d.momentum)?;
    w.write_f32::<LE>(d.mass)?;
    w.write_f32::<LE>(d.lift)?;
    w.write_f32::<LE>(d.depth)?;
    write_opt_id(w, d.lower)?;
    w.write_u8(friction_tag(d.friction))
}

fn read_dynamic(r: &mut impl Read) -> Result<(Dynamic, Option<RawId>), RestoreErr> {
    let velocity = read_vec3(r)?;
    let momentum = read_vec3(r)?;
    let mass = r.read_f32::<LE>()?;
    let lift = r.read_f32::<LE>()?;
    let depth = r.read_f32::<LE>()?;
    let lower_raw = read_opt_raw_id(r)?;
    let friction = tag_to_friction(r.read_u8()?)?;
    Ok((
        Dynamic {
            velocity,
            momentum,
            mass,
            lift,
            depth,
            lower: None,
            friction,
        },
        lower_raw,
    ))
}

fn write_weapon(w: &mut impl Write, weapon: &Weapon) -> io::Result<()> {
    w.write_u32::<LE>(weapon.ammo)?;
    w.write_f32::<LE>(weapon.shot_timer)?;
    w.write_f32::<LE>(weapon.cooldown)
}

fn read_weapon(r: &mut impl Read) -> io::Result<Weapon> {
    Ok(Weapon {
        ammo: r.read_u32::<LE>()?,
        shot_timer: r.read_f32::<LE>()?,
        cooldown: r.read_f32::<LE>()?,
    })
}

fn write_bot(w: &mut impl Write, bot: &Bot) -> io::Result<()> {
    w.write_f32::<LE>(bot.view_h)?;
    w.write_f32::<LE>(bot.view_v)?;
    w.write_f32::<LE>(bot.stamina)?;
    w.write_u32::<LE>(bot.state.bits())?;
    write_opt_id(w, bot.weapon)?;
    write_opt_id(w, bot.cargo)?;
    w.write_u32::<LE>(bot.animation)
}

fn read_bot(r: &mut impl Read) -> Result<(Bot, Option<RawId>, Option<RawId>), RestoreErr> {
    let view_h = r.read_f32::<LE>()?;
    let view_v = r.read_f32::<LE>()?;
    let stamina = r.read_f32::<LE>()?;
    let state = BotState::from_bits(r.read_u32::<LE>()?);
    let weapon_raw = read_opt_raw_id(r)?;
    let cargo_raw = read_opt_raw_id(r)?;
    let animation = r.read_u32::<LE>()?;
    Ok((
        Bot {
            view_h,
            view_v,
            stamina,
            state,
            weapon: None,
            cargo: None,
            animation,
        },
        weapon_raw,
        cargo_raw,
    ))
}

fn write_vehicle(w: &mut impl Write, vehicle: &Vehicle) -> io::Result<()> {
    write_quat(w, vehicle.rotation)?;
    w.write_u32::<LE>(vehicle.weapons.len() as u32)?;
    for slot in &vehicle.weapons {
        w.write_u32::<LE>(slot.rounds)?;
        w.write_f32::<LE>(slot.timer)?;
    }
    write_opt_id(w, vehicle.pilot)?;
    w.write_u32::<LE>(vehicle.vehicle_type)
}

fn read_vehicle(r: &mut impl Read) -> Result<(Vehicle, Option<RawId>), RestoreErr> {
    let rotation = read_quat(r)?;
    let slot_count = r.read_u32::<LE>()?;
    let mut weapons = Vec::with_capacity(slot_count as usize);
    for _ in 0..slot_count {
        weapons.push(VehicleWeaponSlot {
            rounds: r.read_u32::<LE>()?,
            timer: r.read_f32::<LE>()?,
        });
    }
    let pilot_raw = read_opt_raw_id(r)?;
    let vehicle_type = r.read_u32::<LE>()?;
    Ok((
        Vehicle {
            rotation,
            weapons,
            pilot: None,
            vehicle_type,
        },
        pilot_raw,
    ))
}

fn write_body(world: &World, w: &mut impl Write) -> io::Result<()> {
    w.write_all(MAGIC)?;
    write_str(w, BUILD_TAG)?;
    w.write_u64::<LE>(world.rng.raw_state())?;

    let structs: Vec<_> = world.structs.iter().collect();
    let objects: Vec<_> = world.objects.iter().collect();
    let frags: Vec<_> = world.frags.iter().collect();

    w.write_u32::<LE>(structs.len() as u32)?;
    w.write_u32::<LE>(objects.len() as u32)?;
    w.write_u32::<LE>(frags.len() as u32)?;

    for (id, s) in &structs {
        write_str(w, &s.bsp.name)?;
        w.write_u32::<LE>(id.slot)?;
        w.write_u32::<LE>(id.generation)?;
        write_vec3(w, s.position)?;
        w.write_u8(s.heading.index())?;
        w.write_f32::<LE>(s.life)?;
        w.write_f32::<LE>(s.resistance)?;
        w.write_f32::<LE>(s.demolish_ratio)?;
        w.write_u8(lifecycle_tag(s.lifecycle))?;

        w.write_u32::<LE>(s.entities.len() as u32)?;
        for e in &s.entities {
            w.write_u8(entity_state_tag(e.state))?;
            w.write_f32::<LE>(e.ratio)?;
            w.write_f32::<LE>(e.time)?;
            write_vec3(w, e.offset)?;
            write_vec3(w, e.velocity)?;
            w.write_i32::<LE>(e.key)?;
        }

        w.write_u32::<LE>(s.bound_objects.len() as u32)?;
        for obj_id in &s.bound_objects {
            w.write_u32::<LE>(obj_id.slot)?;
            w.write_u32::<LE>(obj_id.generation)?;
        }
    }

    for (id, o) in &objects {
        write_str(w, &o.base.class.name)?;
        w.write_u32::<LE>(id.slot)?;
        w.write_u32::<LE>(id.generation)?;
        write_vec3(w, o.base.position)?;
        write_vec3(w, o.base.half_extents)?;
        w.write_f32::<LE>(o.base.life)?;
        w.write_u32::<LE>(o.base.flags.bits())?;

        w.write_u8(kind_tag(&o.kind))?;
        match &o.kind {
            ObjectKind::Static => {}
            ObjectKind::Dynamic(d) => write_dynamic(w, d)?,
            ObjectKind::Weapon(d, weapon) => {
                write_dynamic(w, d)?;
                write_weapon(w, weapon)?;
            }
            ObjectKind::Bot(d, bot) => {
                write_dynamic(w, d)?;
                write_bot(w, bot)?;
            }
            ObjectKind::Vehicle(d, vehicle) => {
                write_dynamic(w, d)?;
                write_vehicle(w, vehicle)?;
            }
        }

        w.write_u32::<LE>(o.base.inventory.len() as u32)?;
        for item in &o.base.inventory {
            w.write_u32::<LE>(item.slot)?;
            w.write_u32::<LE>(item.generation)?;
        }
        write_opt_id(w, o.base.parent)?;
    }

    for (_, f) in &frags {
        write_str(w, &f.class.name)?;
        write_vec3(w, f.position)?;
        write_vec3(w, f.velocity)?;
        w.write_f32::<LE>(f.life)?;
    }

    Ok(())
}

/// A deferred cross-reference fix-up, applied once every struct/object has
/// been spawned and both remap tables are complete.
enum Fixup {
    StructBound(StructId, Vec<RawId>),
    ObjectParent(ObjectId, RawId),
    ObjectInventory(ObjectId, Vec<RawId>),
    DynamicLower(ObjectId, RawId),
    BotWeapon(ObjectId, RawId),
    BotCargo(ObjectId, RawId),
    VehiclePilot(ObjectId, RawId),
}

fn read_body(
    r: &mut impl Read,
    library: &ClassLibrary,
    terrain: Terrain,
    caps: WorldCaps,
) -> Result<World, RestoreErr> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(RestoreErr::Sim(SimError::SaveIncompatible {
            expected: BUILD_TAG.to_string(),
            found: "not an oz save stream".to_string(),
        }));
    }

    let build_tag = read_str(r)?;
    if build_tag != BUILD_TAG {
        return Err(RestoreErr::Sim(SimError::SaveIncompatible {
            expected: BUILD_TAG.to_string(),
            found: build_tag,
        }));
    }

    let seed_state = r.read_u64::<LE>()?;
    let struct_count = r.read_u32::<LE>()?;
    let object_count = r.read_u32::<LE>()?;
    let frag_count = r.read_u32::<LE>()?;

    let mut world = World::new(0, caps, terrain);
    world.rng = oz_core::rng::Rng::from_raw_state(seed_state);

    let mut struct_ids: HashMap<RawId, StructId> = HashMap::new();
    let mut object_ids: HashMap<RawId, ObjectId> = HashMap::new();
    let mut fixups: Vec<Fixup> = Vec::new();

    for _ in 0..struct_count {
        let class_name = read_str(r)?;
        let old_id: RawId = (r.read_u32::<LE>()?, r.read_u32::<LE>()?);
        let position = read_vec3(r)?;
        let heading = oz_core::heading::Heading::from_index(r.read_u8()?);
        let life = r.read_f32::<LE>()?;
        let resistance = r.read_f32::<LE>()?;
        let demolish_ratio = r.read_f32::<LE>()?;
        let lifecycle = tag_to_lifecycle(r.read_u8()?)?;

        let entity_count = r.read_u32::<LE>()?;
        let mut entity_states = Vec::with_capacity(entity_count as usize);
        for _ in 0..entity_count {
            let state = tag_to_entity_state(r.read_u8()?)?;
            let ratio = r.read_f32::<LE>()?;
            let time = r.read_f32::<LE>()?;
            let offset = read_vec3(r)?;
            let velocity = read_vec3(r)?;
            let key = r.read_i32::<LE>()?;
            entity_states.push((state, ratio, time, offset, velocity, key));
        }

        let bound_count = r.read_u32::<LE>()?;
        let mut bound_raw = Vec::with_capacity(bound_count as usize);
        for _ in 0..bound_count {
            bound_raw.push((r.read_u32::<LE>()?, r.read_u32::<LE>()?));
        }

        let bsp = library.bsp(&class_name)?;
        let mut s = Struct::new(bsp, position, heading, life);
        s.resistance = resistance;
        s.demolish_ratio = demolish_ratio;
        s.lifecycle = lifecycle;
        for (entity, (state, ratio, time, offset, velocity, key)) in
            s.entities.iter_mut().zip(entity_states)
        {
            entity.state = state;
            entity.ratio = ratio;
            entity.time = time;
            entity.offset = offset;
            entity.velocity = velocity;
            entity.key = key;
        }

        let new_id = world.spawn_struct(s)?;
        struct_ids.insert(old_id, new_id);
        if !bound_raw.is_empty() {
            fixups.push(Fixup::StructBound(new_id, bound_raw));
        }
    }

    for _ in 0..object_count {
        let class_name = read_str(r)?;
        let old_id: RawId = (r.read_u32::<LE>()?, r.read_u32::<LE>()?);
        let position = read_vec3(r)?;
        let half_extents = read_vec3(r)?;
        let life = r.read_f32::<LE>()?;
        let flags = ObjectFlags::from_bits(r.read_u32::<LE>()?);

        let kind_tag_byte = r.read_u8()?;
        let mut lower_raw = None;
        let mut weapon_raw = None;
        let mut cargo_raw = None;
        let mut pilot_raw = None;
        let kind = match kind_tag_byte {
            0 => ObjectKind::Static,
            1 => {
                let (d, lower) = read_dynamic(r)?;
                lower_raw = lower;
                ObjectKind::Dynamic(d)
            }
            2 => {
                let (d, lower) = read_dynamic(r)?;
                lower_raw = lower;
                let weapon = read_weapon(r)?;
                ObjectKind::Weapon(d, weapon)
            }
            3 => {
                let (d, lower) = read_dynamic(r)?;
                lower_raw = lower;
                let (bot, weapon, cargo) = read_bot(r)?;
                weapon_raw = weapon;
                cargo_raw = cargo;
                ObjectKind::Bot(d, bot)
            }
            4 => {
                let (d, lower) = read_dynamic(r)?;
                lower_raw = lower;
                let (vehicle, pilot) = read_vehicle(r)?;
                pilot_raw = pilot;
                ObjectKind::Vehicle(d, vehicle)
            }
            other => {
                return Err(RestoreErr::Sim(SimError::AssetMalformed(format!(
                    "bad object kind tag {other}"
                ))))
            }
        };

        let inventory_count = r.read_u32::<LE>()?;
        let mut inventory_raw = Vec::with_capacity(inventory_count as usize);
        for _ in 0..inventory_count {
            inventory_raw.push((r.read_u32::<LE>()?, r.read_u32::<LE>()?));
        }
        let parent_raw = read_opt_raw_id(r)?;

        let class = library.object_class(&class_name)?;
        let mut obj = Object::new(class, position, kind);
        obj.base.half_extents = half_extents;
        obj.base.life = life;
        obj.base.flags = flags;

        let new_id = world.spawn_object(obj)?;
        object_ids.insert(old_id, new_id);

        if let Some(raw) = lower_raw {
            fixups.push(Fixup::DynamicLower(new_id, raw));
        }
        if let Some(raw) = weapon_raw {
            fixups.push(Fixup::BotWeapon(new_id, raw));
        }
        if let Some(raw) = cargo_raw {
            fixups.push(Fixup::BotCargo(new_id, raw));
        }
        if let Some(raw) = pilot_raw {
            fixups.push(Fixup::VehiclePilot(new_id, raw));
        }
        if !inventory_raw.is_empty() {
            fixups.push(Fixup::ObjectInventory(new_id, inventory_raw));
        }
        if let Some(raw) = parent_raw {
            fixups.push(Fixup::ObjectParent(new_id, raw));
        }
    }

    for _ in 0..frag_count {
        let class_name = read_str(r)?;
        let position = read_vec3(r)?;
        let velocity = read_vec3(r)?;
        let life = r.read_f32::<LE>()?;

        let class = library.frag_class(&class_name)?;
        let mut frag = oz_core::model::Fragment::new(class, position, velocity);
        frag.life = life;
        world.spawn_frag(frag)?;
    }

    for fixup in fixups {
        match fixup {
            Fixup::StructBound(sid, raws) => {
                let resolved: Vec<ObjectId> =
                    raws.iter().filter_map(|raw| object_ids.get(raw).copied()).collect();
                if let Some(s) = world.structs.get_mut(sid) {
                    s.bound_objects = resolved;
                }
            }
            Fixup::ObjectParent(oid, raw) => {
                if let Some(&parent_id) = object_ids.get(&raw) {
                    if let Some(o) = world.objects.get_mut(oid) {
                        o.base.parent = Some(parent_id);
                    }
                }
            }
            Fixup::ObjectInventory(oid, raws) => {
                let resolved: Vec<ObjectId> =
                    raws.iter().filter_map(|raw| object_ids.get(raw).copied()).collect();
                if let Some(o) = world.objects.get_mut(oid) {
                    o.base.inventory = resolved;
                }
            }
            Fixup::DynamicLower(oid, raw) => {
                if let Some(&lower_id) = object_ids.get(&raw) {
                    if let Some(o) = world.objects.get_mut(oid) {
                        if let Some(d) = o.kind.dynamic_mut() {
                            d.lower = Some(lower_id);
                        }
                    }
                }
            }
            Fixup::BotWeapon(oid, raw) => {
                if let Some(&weapon_id) = object_ids.get(&raw) {
                    if let Some(o) = world.objects.get_mut(oid) {
                        if let ObjectKind::Bot(_, bot) = &mut o.kind {
                            bot.weapon = Some(weapon_id);
                        }
                    }
                }
            }
            Fixup::BotCargo(oid, raw) => {
                if let Some(&cargo_id) = object_ids.get(&raw) {
                    if let Some(o) = world.objects.get_mut(oid) {
                        if let ObjectKind::Bot(_, bot) = &mut o.kind {
                            bot.cargo = Some(cargo_id);
                        }
                    }
                }
            }
            Fixup::VehiclePilot(oid, raw) => {
                if let Some(&pilot_id) = object_ids.get(&raw) {
                    if let Some(o) = world.objects.get_mut(oid) {
                        if let ObjectKind::Vehicle(_, vehicle) = &mut o.kind {
                            vehicle.pilot = Some(pilot_id);
                        }
                    }
                }
            }
        }
    }

    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oz_core::geom::{Bounds, Plane};
    use oz_core::heading::Heading;
    use oz_core::model::{
        Brush, BspModel, EntityClass, EntityType, FragClass, Fragment, Material, Object,
        ObjectClass,
    };

    fn library() -> ClassLibrary {
        let mut lib = ClassLibrary::new();

        let mut bsp = BspModel::new(
            "bunker",
            Bounds::from_center_half_extents(Vec3::ZERO, Vec3::splat(4.0)),
        );
        bsp.planes.push(Plane::new(Vec3::Z, -2.0));
        let bsp = bsp
            .with_brush(Brush {
                planes: vec![0],
                material: Material::Stone,
                solid: true,
            })
            .with_entity_class(EntityClass {
                name: "door".into(),
                ty: EntityType::ManualDoor,
                move_offset: Vec3::new(0.0, 0.0, 2.0),
                key: 7,
                ..Default::default()
            });
        lib.register_bsp("bunker", bsp);

        lib.register_object_class(
            "crate",
            ObjectClass {
                name: "crate".into(),
                ..Default::default()
            },
        );
        lib.register_object_class(
            "rifle",
            ObjectClass {
                name: "rifle".into(),
                ..Default::default()
            },
        );
        lib.register_object_class(
            "grunt",
            ObjectClass {
                name: "grunt".into(),
                ..Default::default()
            },
        );
        lib.register_frag_class(
            "chip",
            FragClass {
                name: "chip".into(),
                lifetime: 5.0,
                mass: 0.1,
                restitution: 0.3,
            },
        );

        lib
    }

    fn populated_world(lib: &ClassLibrary) -> World {
        let mut w = World::new(777, WorldCaps::default(), Terrain::flat(-10.0));

        let mut s = Struct::new(
            lib.bsp("bunker").unwrap(),
            Vec3::new(10.0, 0.0, 0.0),
            Heading::West,
            500.0,
        );
        s.entities[0].state = EntityState::Opening;
        s.entities[0].ratio = 0.5;
        s.entities[0].offset = Vec3::new(0.0, 0.0, 1.0);
        s.entities[0].key = -7;
        let struct_id = w.spawn_struct(s).unwrap();

        let crate_obj = Object::new(
            lib.object_class("crate").unwrap(),
            Vec3::new(1.0, 2.0, 3.0),
            ObjectKind::Static,
        );
        let crate_id = w.spawn_object(crate_obj).unwrap();

        if let Some(s) = w.structs.get_mut(struct_id) {
            s.bound_objects.push(crate_id);
        }

        let rifle = Object::new(
            lib.object_class("rifle").unwrap(),
            Vec3::new(5.0, 5.0, 0.0),
            ObjectKind::Static,
        );
        let rifle_id = w.spawn_object(rifle).unwrap();

        let grunt_dynamic = Dynamic {
            mass: 80.0,
            ..Default::default()
        };
        let mut bot = Bot::default();
        bot.weapon = Some(rifle_id);
        bot.state = BotState::RUNNING;
        let mut grunt = Object::new(
            lib.object_class("grunt").unwrap(),
            Vec3::new(1.0, 2.0, 3.5),
            ObjectKind::Bot(grunt_dynamic, bot),
        );
        grunt.base.inventory.push(rifle_id);
        grunt.base.parent = Some(crate_id);
        let grunt_id = w.spawn_object(grunt).unwrap();

        if let Some(o) = w.objects.get_mut(rifle_id) {
            o.base.parent = Some(grunt_id);
        }

        let frag = Fragment::new(
            lib.frag_class("chip").unwrap(),
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(0.0, 0.0, -1.0),
        );
        w.spawn_frag(frag).unwrap();

        w
    }

    #[test]
    fn save_then_restore_reproduces_world_state() {
        let lib = library();
        let world = populated_world(&lib);

        let mut bytes = Vec::new();
        save(&world, &mut bytes).unwrap();

        let restored = restore(
            &mut bytes.as_slice(),
            &lib,
            Terrain::flat(-10.0),
            WorldCaps::default(),
        )
        .unwrap();

        assert_eq!(restored.rng.raw_state(), world.rng.raw_state());
        assert_eq!(restored.structs.live_count(), 1);
        assert_eq!(restored.objects.live_count(), 3);
        assert_eq!(restored.frags.live_count(), 1);

        let (_, restored_struct) = restored.structs.iter().next().unwrap();
        assert_eq!(restored_struct.entities[0].state, EntityState::Opening);
        assert_eq!(restored_struct.entities[0].key, -7);
        assert_eq!(restored_struct.bound_objects.len(), 1);

        let bound_id = restored_struct.bound_objects[0];
        let bound_obj = restored.objects.get(bound_id).unwrap();
        assert_eq!(bound_obj.base.position, Vec3::new(1.0, 2.0, 3.0));

        let (_, grunt) = restored
            .objects
            .iter()
            .find(|(_, o)| matches!(o.kind, ObjectKind::Bot(..)))
            .unwrap();
        assert_eq!(grunt.base.inventory.len(), 1);
        assert_eq!(grunt.base.parent, Some(bound_id));
        match &grunt.kind {
            ObjectKind::Bot(_, bot) => {
                assert!(bot.state.contains(BotState::RUNNING));
                assert_eq!(bot.weapon, Some(grunt.base.inventory[0]));
            }
            _ => panic!("expected Bot kind"),
        }
    }

    #[test]
    fn bad_magic_is_save_incompatible() {
        let lib = library();
        let err = restore(
            &mut &b"nope"[..],
            &lib,
            Terrain::flat(0.0),
            WorldCaps::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SimError::SaveIncompatible { .. }));
    }
}
