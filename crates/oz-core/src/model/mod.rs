//! The data model of §3: structures, their animated sub-parts, objects,
//! fragments and terrain.

pub mod bsp;
pub mod entity;
pub mod fragment;
pub mod object;
pub mod structure;
pub mod terrain;

pub use bsp::{Brush, BspModel, Material};
pub use entity::{Entity, EntityClass, EntityCollider, EntityRef, EntityState, EntityType, PushOutcome};
pub use fragment::{FragClass, Fragment};
pub use object::{
    Bot, BotState, Dynamic, FrictionMode, Object, ObjectBase, ObjectClass, ObjectEvent,
    ObjectFlags, ObjectKind, Vehicle, VehicleWeaponSlot, Weapon,
};
pub use structure::{Struct, StructLifecycle, DEMOLISH_SPEED, DESTRUCT_FRAG_VELOCITY};
pub use terrain::{CellNormals, Terrain};
