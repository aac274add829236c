//! Animated structure sub-parts: doors, elevators, crushers (§4.E).
//!
//! Grounded on `matrix/Struct.cc`'s `Entity` class. The original dispatches
//! through a `Handler` function-pointer table indexed by `EntityClass::Type`;
//! this module keeps that shape as a `match` in [`Entity::tick`]. Collider
//! interaction (overlap tests, pushing dynamics, one-body translate) is not
//! something oz-core owns (§1: the collider lives in oz-sim), so handlers
//! that need it take a `&mut dyn EntityCollider` rather than calling a
//! concrete collider type directly.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ids::StructId;

/// The six entity behaviors named in §4.E, plus the original's redundant
/// 7th `HANDLERS` slot (which also maps to `staticHandler`) folded into
/// `Static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Static,
    ManualDoor,
    AutoDoor,
    IgnoringBlock,
    CrushingBlock,
    Elevator,
}

/// Immutable per-class parameters shared by every [`Entity`] of this class.
///
/// Loaded from a mission's class asset file (`serde_yaml`, matching
/// `naive-client::project_config`'s load pattern) by
/// [`crate::library::ClassLibrary::load_entity_classes_yaml`]; `target` is
/// resolved from a name into an [`EntityRef`] only once the whole mission's
/// structs exist, so it is left unresolved (`None`) straight out of
/// deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityClass {
    pub name: String,
    pub ty: EntityType,
    /// Struct-local anchor position of this sub-model at `ratio == 0`.
    #[serde(default)]
    pub local_position: Vec3,
    /// Offset reached at `ratio == 1.0`, in the owning structure's local
    /// coordinate system.
    pub move_offset: Vec3,
    /// Half-extents of this sub-model's own AABB (in its closed, `ratio ==
    /// 0` pose), centred on the struct-local position the entity sits at.
    /// The original resolves entity overlap against the sub-model's own
    /// decoded brushes; oz-sim's collider instead tests a single AABB here,
    /// since per-entity brush geometry is out of scope (see `model::bsp`'s
    /// doc comment — `BspModel` carries the structure's own brushes only).
    #[serde(default = "default_local_half_extents")]
    pub local_half_extents: Vec3,
    /// Seconds an auto-door stays `Opened`, or a crusher stays in one
    /// resting state, before its timer-gated transition fires.
    #[serde(default)]
    pub timeout: f32,
    /// Ratio advanced per tick while `Opening`/`Closing` (so the full
    /// traversal takes `1.0 / ratio_inc` ticks).
    #[serde(default = "default_ratio_inc")]
    pub ratio_inc: f32,
    /// Lock key; `0` means unlocked, matching `Entity::lock`'s fast path.
    #[serde(default)]
    pub key: i32,
    /// Proximity margin an auto-door polls within while `Closed`.
    #[serde(default)]
    pub margin: f32,
    /// The entity this one triggers, if any. Not present in the asset file
    /// itself (see struct doc comment); resolved after mission load, so it
    /// is never (de)serialized directly.
    #[serde(skip)]
    pub target: Option<EntityRef>,
}

fn default_ratio_inc() -> f32 {
    1.0
}

fn default_local_half_extents() -> Vec3 {
    Vec3::splat(0.5)
}

impl Default for EntityClass {
    fn default() -> Self {
        Self {
            name: String::new(),
            ty: EntityType::Static,
            local_position: Vec3::ZERO,
            move_offset: Vec3::ZERO,
            timeout: 0.0,
            ratio_inc: 1.0,
            key: 0,
            margin: 0.0,
            local_half_extents: default_local_half_extents(),
            target: None,
        }
    }
}

/// A reference to another structure's entity, resolved through its
/// generational [`StructId`] rather than the original's bit-packed
/// `structIndex << MAX_ENT_SHIFT | entIndex` integer (§9 mapping notes:
/// typed handles replace packed/raw indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef {
    pub struct_id: StructId,
    pub entity_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Closed,
    Opening,
    Opened,
    Closing,
}

/// Outcome of pushing a `Closing`/`Opening` entity's overlap set out of the
/// way, reported back to the handler so it can decide whether to revert.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushOutcome {
    /// At least one dynamic object could not be pushed clear and still
    /// overlaps the entity at its new offset.
    pub blocked: bool,
}

/// The collider-facing operations an [`Entity`] handler needs. Implemented
/// by oz-sim's collider over the live world; oz-core only depends on this
/// trait, never a concrete collision type.
pub trait EntityCollider {
    /// True if anything solid overlaps this entity at its current placement.
    fn overlaps(&mut self, margin: f32) -> bool;

    /// Push every dynamic object overlapping this entity by `delta` (in
    /// world space), re-enabling any that were pushed. When `destroy_stuck`
    /// is set, an object that still overlaps after being pushed as far as
    /// it can go is despawned outright instead of being reported as
    /// `blocked` (the crusher's "destroys anything left stuck" behavior);
    /// otherwise it is left in place and reported via `PushOutcome::blocked`
    /// (the elevator's "revert rather than crush" behavior).
    fn push_overlapping(&mut self, delta: Vec3, destroy_stuck: bool) -> PushOutcome;
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub class: Arc<EntityClass>,
    pub state: EntityState,
    pub ratio: f32,
    pub time: f32,
    pub offset: Vec3,
    pub velocity: Vec3,
    /// Copied from `class.key` at construction, then independently flipped
    /// (`key = !key`) per instance on a successful unlock (§3: "Entity.key
    /// is per-instance, seeded from its class, and negated on unlock").
    pub key: i32,
}

impl Entity {
    pub fn new(class: Arc<EntityClass>) -> Self {
        let key = class.key;
        Self {
            class,
            state: EntityState::Closed,
            ratio: 0.0,
            time: 0.0,
            offset: Vec3::ZERO,
            velocity: Vec3::ZERO,
            key,
        }
    }

    /// Trigger this entity's target (a door linked to a switch, say).
    /// `target` is the resolved [`Entity`] `self.class.target` points at.
    /// Returns `false` if this entity has no target or is itself locked out.
    pub fn trigger(&self, target: &mut Entity) -> bool {
        if self.class.target.is_none() || self.key < 0 {
            return false;
        }

        match target.state {
            EntityState::Opened | EntityState::Opening => {
                target.state = EntityState::Closing;
                target.time = 0.0;
                target.velocity = -target.class.move_offset * target.class.ratio_inc / crate::geom::TICK;
            }
            EntityState::Closed | EntityState::Closing => {
                target.state = EntityState::Opening;
                target.time = 0.0;
                target.velocity = target.class.move_offset * target.class.ratio_inc / crate::geom::TICK;
            }
        }

        true
    }

    /// Attempt to unlock this entity for `user_key`, trying `user_key`
    /// itself and then every key in `carried_keys` (a user's inventory).
    /// Mirrors `Entity::lock(Bot*)`'s `key == ~key` equivalence, which lets
    /// an already-unlocked entity re-match the same keyring.
    pub fn lock(&mut self, user_key: i32, carried_keys: impl IntoIterator<Item = i32>) -> bool {
        if self.key == 0 {
            return true;
        }
        if user_key == self.key || user_key == !self.key {
            self.key = !self.key;
            return true;
        }
        for k in carried_keys {
            if k == self.key || k == !self.key {
                self.key = !self.key;
                return true;
            }
        }
        false
    }

    /// Advance this entity's state machine by one tick.
    pub fn tick(&mut self, collider: &mut dyn EntityCollider) {
        match self.class.ty {
            EntityType::Static => self.static_handler(),
            EntityType::ManualDoor => self.manual_door_handler(collider),
            EntityType::AutoDoor => self.auto_door_handler(collider),
            EntityType::IgnoringBlock => self.ignoring_block_handler(),
            EntityType::CrushingBlock => self.crushing_block_handler(collider),
            EntityType::Elevator => self.elevator_handler(collider),
        }
    }

    fn static_handler(&mut self) {
        self.state = EntityState::Closed;
    }

    fn manual_door_handler(&mut self, collider: &mut dyn EntityCollider) {
        match self.state {
            EntityState::Closed | EntityState::Opened => {}
            EntityState::Opening => {
                self.ratio = (self.ratio + self.class.ratio_inc).min(1.0);
                self.time += crate::geom::TICK;
                self.offset = self.ratio * self.class.move_offset;

                if self.ratio == 1.0 {
                    self.state = EntityState::Opened;
                    self.time = 0.0;
                    self.velocity = Vec3::ZERO;
                }
            }
            EntityState::Closing => {
                let original_ratio = self.ratio;
                let original_offset = self.offset;

                self.ratio = (self.ratio - self.class.ratio_inc).max(0.0);
                self.time += crate::geom::TICK;
                self.offset = self.ratio * self.class.move_offset;

                if collider.overlaps(0.0) {
                    self.ratio = original_ratio;
                    self.offset = original_offset;
                    self.state = EntityState::Opening;
                    self.time = 0.0;
                    self.velocity = Vec3::ZERO;
                    return;
                }

                if self.ratio == 0.0 {
                    self.state = EntityState::Closed;
                    self.time = 0.0;
                    self.velocity = Vec3::ZERO;
                }
            }
        }
    }

    fn auto_door_handler(&mut self, collider: &mut dyn EntityCollider) {
        match self.state {
            EntityState::Closed => {
                if collider.overlaps(self.class.margin) {
                    self.state = EntityState::Opening;
                    self.time = 0.0;
                }
            }
            EntityState::Opening => {
                self.ratio = (self.ratio + self.class.ratio_inc).min(1.0);
                self.time += crate::geom::TICK;
                self.offset = self.ratio * self.class.move_offset;

                if self.ratio == 1.0 {
                    self.state = EntityState::Opened;
                    self.time = 0.0;
                }
            }
            EntityState::Opened => {
                self.time += crate::geom::TICK;
                if self.time > self.class.timeout && !collider.overlaps(self.class.margin) {
                    self.state = EntityState::Closing;
                    self.time = 0.0;
                }
            }
            EntityState::Closing => {
                let original_ratio = self.ratio;
                let original_offset = self.offset;

                self.ratio = (self.ratio - self.class.ratio_inc).max(0.0);
                self.time += crate::geom::TICK;
                self.offset = self.ratio * self.class.move_offset;

                if collider.overlaps(self.class.margin) {
                    self.ratio = original_ratio;
                    self.offset = original_offset;
                    self.state = EntityState::Opening;
                    self.time = 0.0;
                    return;
                }

                if self.ratio == 0.0 {
                    self.state = EntityState::Closed;
                    self.time = 0.0;
                }
            }
        }
    }

    fn ignoring_block_handler(&mut self) {
        match self.state {
            EntityState::Closed => {}
            EntityState::Opening => {
                self.ratio = (self.ratio + self.class.ratio_inc).min(1.0);
                self.time += crate::geom::TICK;
                self.offset = self.ratio * self.class.move_offset;
                if self.ratio == 1.0 {
                    self.state = EntityState::Opened;
                    self.time = 0.0;
                }
            }
            EntityState::Opened => {
                self.time += crate::geom::TICK;
                if self.time > self.class.timeout {
                    self.state = EntityState::Closing;
                    self.time = 0.0;
                }
            }
            EntityState::Closing => {
                self.ratio = (self.ratio - self.class.ratio_inc).max(0.0);
                self.time += crate::geom::TICK;
                self.offset = self.ratio * self.class.move_offset;
                if self.ratio == 0.0 {
                    self.state = EntityState::Closed;
                    self.time = 0.0;
                }
            }
        }
    }

    /// Timer-gated variant (§9 Open Question, resolved): transitions happen
    /// purely on `time > timeout`, never reverting on obstruction — instead
    /// it pushes whatever is in the way, destroying anything left stuck.
    fn crushing_block_handler(&mut self, collider: &mut dyn EntityCollider) {
        match self.state {
            EntityState::Closed => {
                self.time += crate::geom::TICK;
                if self.time > self.class.timeout {
                    self.state = EntityState::Opening;
                    self.time = 0.0;
                }
            }
            EntityState::Opening => {
                let prev_offset = self.offset;
                self.ratio = (self.ratio + self.class.ratio_inc).min(1.0);
                self.offset = self.ratio * self.class.move_offset;
                collider.push_overlapping(self.offset - prev_offset, true);

                if self.ratio == 1.0 {
                    self.state = EntityState::Opened;
                    self.time = 0.0;
                }
            }
            EntityState::Opened => {
                self.time += crate::geom::TICK;
                if self.time > self.class.timeout {
                    self.state = EntityState::Closing;
                    self.time = 0.0;
                }
            }
            EntityState::Closing => {
                let prev_offset = self.offset;
                self.ratio = (self.ratio - self.class.ratio_inc).max(0.0);
                self.offset = self.ratio * self.class.move_offset;
                collider.push_overlapping(self.offset - prev_offset, true);

                if self.ratio == 0.0 {
                    self.state = EntityState::Closed;
                    self.time = 0.0;
                }
            }
        }
    }

    /// Platform behavior: like a crusher, but reverts to its prior offset
    /// (rather than crushing through) if a pushed dynamic is still stuck
    /// after being translated.
    fn elevator_handler(&mut self, collider: &mut dyn EntityCollider) {
        match self.state {
            EntityState::Closed | EntityState::Opened => {}
            EntityState::Opening => {
                let original_ratio = self.ratio;
                let original_offset = self.offset;
                let prev_offset = self.offset;

                self.ratio = (self.ratio + self.class.ratio_inc).min(1.0);
                self.time += crate::geom::TICK;
                self.offset = self.ratio * self.class.move_offset;

                if collider.push_overlapping(self.offset - prev_offset, false).blocked {
                    self.ratio = original_ratio;
                    self.offset = original_offset;
                    self.state = if self.ratio == 0.0 {
                        EntityState::Closed
                    } else {
                        EntityState::Opened
                    };
                    self.time = 0.0;
                    self.velocity = Vec3::ZERO;
                    return;
                }

                if self.ratio == 1.0 {
                    self.state = EntityState::Opened;
                    self.time = 0.0;
                    self.velocity = Vec3::ZERO;
                }
            }
            EntityState::Closing => {
                let original_ratio = self.ratio;
                let original_offset = self.offset;
                let prev_offset = self.offset;

                self.ratio = (self.ratio - self.class.ratio_inc).max(0.0);
                self.time += crate::geom::TICK;
                self.offset = self.ratio * self.class.move_offset;

                if collider.push_overlapping(self.offset - prev_offset, false).blocked {
                    self.ratio = original_ratio;
                    self.offset = original_offset;
                    self.state = if self.ratio == 1.0 {
                        EntityState::Opened
                    } else {
                        EntityState::Closed
                    };
                    self.time = 0.0;
                    self.velocity = Vec3::ZERO;
                    return;
                }

                if self.ratio == 0.0 {
                    self.state = EntityState::Closed;
                    self.time = 0.0;
                    self.velocity = Vec3::ZERO;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverBlocked;
    impl EntityCollider for NeverBlocked {
        fn overlaps(&mut self, _margin: f32) -> bool {
            false
        }
        fn push_overlapping(&mut self, _delta: Vec3, _destroy_stuck: bool) -> PushOutcome {
            PushOutcome::default()
        }
    }

    struct AlwaysBlocked;
    impl EntityCollider for AlwaysBlocked {
        fn overlaps(&mut self, _margin: f32) -> bool {
            true
        }
        fn push_overlapping(&mut self, _delta: Vec3, _destroy_stuck: bool) -> PushOutcome {
            PushOutcome { blocked: true }
        }
    }

    fn door_class(ty: EntityType) -> Arc<EntityClass> {
        Arc::new(EntityClass {
            ty,
            move_offset: Vec3::new(0.0, 0.0, 2.0),
            ratio_inc: 0.5,
            timeout: 2.0,
            margin: 1.0,
            ..Default::default()
        })
    }

    #[test]
    fn manual_door_opens_over_two_ticks() {
        let mut e = Entity::new(door_class(EntityType::ManualDoor));
        e.state = EntityState::Opening;
        let mut c = NeverBlocked;
        e.tick(&mut c);
        assert_eq!(e.ratio, 0.5);
        e.tick(&mut c);
        assert_eq!(e.ratio, 1.0);
        assert_eq!(e.state, EntityState::Opened);
    }

    #[test]
    fn manual_door_closing_reverts_on_obstruction() {
        let mut e = Entity::new(door_class(EntityType::ManualDoor));
        e.state = EntityState::Closing;
        e.ratio = 1.0;
        e.offset = e.class.move_offset;
        let mut c = AlwaysBlocked;
        e.tick(&mut c);
        assert_eq!(e.ratio, 1.0);
        assert_eq!(e.state, EntityState::Opening);
    }

    #[test]
    fn auto_door_opens_on_proximity() {
        let mut e = Entity::new(door_class(EntityType::AutoDoor));
        let mut c = AlwaysBlocked;
        e.tick(&mut c);
        assert_eq!(e.state, EntityState::Opening);
    }

    #[test]
    fn crushing_block_ignores_obstruction_and_pushes_through() {
        let mut e = Entity::new(door_class(EntityType::CrushingBlock));
        e.state = EntityState::Opening;
        let mut c = AlwaysBlocked;
        e.tick(&mut c);
        e.tick(&mut c);
        assert_eq!(e.ratio, 1.0);
        assert_eq!(e.state, EntityState::Opened);
    }

    #[test]
    fn elevator_reverts_when_push_leaves_something_stuck() {
        let mut e = Entity::new(door_class(EntityType::Elevator));
        e.state = EntityState::Opening;
        let mut c = AlwaysBlocked;
        e.tick(&mut c);
        assert_eq!(e.ratio, 0.0);
        assert_eq!(e.state, EntityState::Closed);
    }

    #[test]
    fn lock_accepts_matching_key_and_negates_on_success() {
        let mut e = Entity::new(Arc::new(EntityClass {
            key: 7,
            ..Default::default()
        }));
        assert!(e.lock(7, std::iter::empty()));
        assert_eq!(e.key, !7);
        // re-locking with the original key still matches via `== !key`.
        assert!(e.lock(7, std::iter::empty()));
    }

    #[test]
    fn lock_rejects_unrelated_key() {
        let mut e = Entity::new(Arc::new(EntityClass {
            key: 7,
            ..Default::default()
        }));
        assert!(!e.lock(3, [9, 2]));
    }
}
