//! Non-animated world entities: the `Object -> Dynamic -> Bot / Vehicle`
//! hierarchy of §3, folded into a tagged sum per §9's mapping notes
//! ("virtual inheritance becomes a tagged sum wrapping variant-specific
//! extension structs over a shared base prefix").

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ids::ObjectId;

/// Object flags gating collider/physics behaviour. Named after the
/// original's `Object::*_BIT` constants; a small hand-rolled bitset
/// rather than pulling in the `bitflags` crate for one flag set. The
/// Lua boundary must see the same integer values across saves (§6), so
/// this is `#[serde(transparent)]` over the raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectFlags(u32);

impl ObjectFlags {
    pub const SOLID: Self = Self(1 << 0);
    pub const DYNAMIC: Self = Self(1 << 1);
    pub const DISABLED: Self = Self(1 << 2);
    pub const ENABLE: Self = Self(1 << 3);
    pub const CYLINDER: Self = Self(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Raw bit pattern, for the save codec (oz-sim's binary format stores
    /// these bits directly rather than going through serde).
    pub const fn bits(self) -> u32 {
        self.0
    }
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl std::ops::BitOr for ObjectFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Intensity-scaled lifecycle event, consumed once per tick by the audio
/// presenter (§4.B).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectEvent {
    Create,
    Destroy,
    Damage(f32),
    Hit { intensity: f32 },
    Splash { intensity: f32 },
    Fricting { intensity: f32 },
    Use,
    Jump,
    Land,
    Step,
    Shot,
    ShotEmpty,
    Engine,
}

impl ObjectEvent {
    /// Stable integer id for this event kind, independent of declaration
    /// order (§6: "Lua-visible constants enumerate event ids ... a
    /// reimplementation must preserve the same integer values for
    /// save-file and script compatibility").
    pub const fn id(self) -> u32 {
        match self {
            ObjectEvent::Create => 0,
            ObjectEvent::Destroy => 1,
            ObjectEvent::Damage(_) => 2,
            ObjectEvent::Hit { .. } => 3,
            ObjectEvent::Splash { .. } => 4,
            ObjectEvent::Fricting { .. } => 5,
            ObjectEvent::Use => 6,
            ObjectEvent::Jump => 7,
            ObjectEvent::Land => 8,
            ObjectEvent::Step => 9,
            ObjectEvent::Shot => 10,
            ObjectEvent::ShotEmpty => 11,
            ObjectEvent::Engine => 12,
        }
    }
}

/// Immutable class data shared by every instance of an object class.
/// Loaded from a mission's class asset file, same as [`super::EntityClass`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectClass {
    pub name: String,
    #[serde(default = "default_half_extents")]
    pub half_extents: Vec3,
    #[serde(default = "default_life")]
    pub life: f32,
    #[serde(default)]
    pub flags: ObjectFlags,
    /// Name of the Lua chunk (under the mission's script directory) that
    /// defines this class's `onDestroy`/`onDamage`/`onHit`/`onUse`/
    /// `onShot[weapon]` handlers (§6). `None` means the class has no
    /// script-driven behaviour.
    #[serde(default)]
    pub script: Option<String>,
}

fn default_half_extents() -> Vec3 {
    Vec3::splat(0.5)
}

fn default_life() -> f32 {
    100.0
}

impl Default for ObjectClass {
    fn default() -> Self {
        Self {
            name: String::new(),
            half_extents: Vec3::splat(0.5),
            life: 100.0,
            flags: ObjectFlags::SOLID,
            script: None,
        }
    }
}

/// Fields shared by every object variant (§3: "base fields").
#[derive(Debug, Clone)]
pub struct ObjectBase {
    pub class: Arc<ObjectClass>,
    pub position: Vec3,
    pub half_extents: Vec3,
    pub life: f32,
    pub flags: ObjectFlags,
    pub events: Vec<ObjectEvent>,
    pub inventory: Vec<ObjectId>,
    pub parent: Option<ObjectId>,
}

impl ObjectBase {
    pub fn new(class: Arc<ObjectClass>, position: Vec3) -> Self {
        let half_extents = class.half_extents;
        let life = class.life;
        let flags = class.flags;
        Self {
            class,
            position,
            half_extents,
            life,
            flags,
            events: Vec::new(),
            inventory: Vec::new(),
            parent: None,
        }
    }

    pub fn push_event(&mut self, event: ObjectEvent) {
        self.events.push(event);
    }

    /// Drain this tick's events for the audio presenter (§4.B: "consumed
    /// once per tick").
    pub fn drain_events(&mut self) -> Vec<ObjectEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Friction regime a `Dynamic` is currently subject to (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrictionMode {
    Air,
    Ladder,
    Water,
    Floor,
    Slick,
    Obj,
}

/// Extension fields for objects that move under physics (§3: "Dynamic").
#[derive(Debug, Clone)]
pub struct Dynamic {
    pub velocity: Vec3,
    /// `velocity * mass`, recomputed every tick after `velocity` settles.
    /// §4.D.4 ("stacked over a dynamic presses down on it") is not wired up:
    /// there is no pass that reads one object's `momentum` to perturb
    /// another's `velocity`, so weight only transfers through a stack down
    /// to whatever static floor or struct brush is underneath it. Tracked
    /// as an open gap rather than a silent drop (DESIGN.md).
    pub momentum: Vec3,
    pub mass: f32,
    pub lift: f32,
    pub depth: f32,
    /// Object this one rests on, if any (§3 invariant: must overlap
    /// vertically or be cleared).
    pub lower: Option<ObjectId>,
    pub friction: FrictionMode,
}

impl Default for Dynamic {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            momentum: Vec3::ZERO,
            mass: 1.0,
            lift: 0.0,
            depth: 0.0,
            lower: None,
            friction: FrictionMode::Air,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Weapon {
    pub ammo: u32,
    pub shot_timer: f32,
    pub cooldown: f32,
}

/// Bot state bits (§3: "dead/crouching/running/swimming/climbing/…").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotState(u32);

impl BotState {
    pub const DEAD: Self = Self(1 << 0);
    pub const CROUCHING: Self = Self(1 << 1);
    pub const RUNNING: Self = Self(1 << 2);
    pub const SWIMMING: Self = Self(1 << 3);
    pub const CLIMBING: Self = Self(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bot {
    pub view_h: f32,
    pub view_v: f32,
    pub stamina: f32,
    pub state: BotState,
    pub weapon: Option<ObjectId>,
    pub cargo: Option<ObjectId>,
    pub animation: u32,
}

#[derive(Debug, Clone)]
pub struct VehicleWeaponSlot {
    pub rounds: u32,
    pub timer: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Vehicle {
    pub rotation: Quat,
    pub weapons: Vec<VehicleWeaponSlot>,
    pub pilot: Option<ObjectId>,
    pub vehicle_type: u32,
}

/// The polymorphic part of an object: `Object` itself, or one of the three
/// `Dynamic` specializations (§3, §9 mapping notes).
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Static,
    Dynamic(Dynamic),
    Weapon(Dynamic, Weapon),
    Bot(Dynamic, Bot),
    Vehicle(Dynamic, Vehicle),
}

impl ObjectKind {
    pub fn dynamic(&self) -> Option<&Dynamic> {
        match self {
            ObjectKind::Static => None,
            ObjectKind::Dynamic(d) | ObjectKind::Weapon(d, _) | ObjectKind::Bot(d, _) | ObjectKind::Vehicle(d, _) => {
                Some(d)
            }
        }
    }

    pub fn dynamic_mut(&mut self) -> Option<&mut Dynamic> {
        match self {
            ObjectKind::Static => None,
            ObjectKind::Dynamic(d) | ObjectKind::Weapon(d, _) | ObjectKind::Bot(d, _) | ObjectKind::Vehicle(d, _) => {
                Some(d)
            }
        }
    }
}

/// A full object in the world: shared base plus the variant's extension
/// fields.
#[derive(Debug, Clone)]
pub struct Object {
    pub base: ObjectBase,
    pub kind: ObjectKind,
}

impl Object {
    pub fn new(class: Arc<ObjectClass>, position: Vec3, kind: ObjectKind) -> Self {
        Self {
            base: ObjectBase::new(class, position),
            kind,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind.dynamic().is_some()
    }
}
