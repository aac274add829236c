//! Two-thread fixed-step tick pipeline (§4.F, §5).
//!
//! Grounded on `naive-engine::command::CommandServer`'s shape — a
//! background thread, an `mpsc` channel carrying work back to the owner,
//! `Drop` cleaning up on the way out — generalized from "one background
//! thread talking to the main thread over a channel" to the spec's literal
//! two-OS-thread handshake. The teacher has no blocking counting semaphore
//! anywhere in its own sources (its only cross-thread primitives are
//! `std::thread::spawn` and `std::sync::mpsc`), so [`Semaphore`] here is
//! built directly on `std::sync::{Mutex, Condvar}` rather than bent out of
//! a crate that doesn't fit — there is no ecosystem crate in this pack for
//! a blocking OS-thread counting semaphore either.
//!
//! The aux thread is the only one that ever mutates [`World`] (phase 2,
//! "matrix update": collider-driven entity state machines, then physics).
//! Main only reads during phase 1 and may spawn/destroy through a command
//! queue that aux drains as part of phase 3. `World` still sits behind a
//! `Mutex` purely so the type system accepts it crossing the thread
//! boundary — by the semaphore handshake's construction the lock is never
//! contended, since the two threads' accesses never overlap in time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use glam::Vec3;

use oz_core::error::SimResult;
use oz_core::events::{EventBus, TickEvent};
use oz_core::geom::{TICK, TICK_MICROS};
use oz_core::ids::{ObjectId, StructId};
use oz_core::library::ClassLibrary;
use oz_core::model::{Fragment, Object, Struct, DESTRUCT_FRAG_VELOCITY};
use oz_core::world::World;

use crate::collider::tick_entity;
use crate::physics;
use crate::save;

/// A classic blocking counting semaphore over `Mutex` + `Condvar`. `post`
/// never blocks; `wait` blocks until the count is positive, then consumes
/// one count.
struct Semaphore {
    count: Mutex<u32>,
    cv: Condvar,
}

impl Semaphore {
    fn new(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cv.notify_one();
    }

    fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.cv.wait(count).unwrap();
        }
        *count -= 1;
    }
}

/// A spawn/destroy request queued from the main thread (Lua `onUpdate`,
/// console commands, …) for aux to apply during phase 3, plus a save
/// request that aux services the same way since it already holds the
/// world mutably there.
enum Command {
    SpawnObject(Object),
    SpawnStruct(Struct),
    DestroyObject(ObjectId),
    DestroyStruct(StructId),
    DamageObject(ObjectId, f32),
    Save(mpsc::Sender<SimResult<Vec<u8>>>),
}

fn apply_command(world: &mut World, cmd: Command) {
    match cmd {
        Command::SpawnObject(o) => {
            if let Err(e) = world.spawn_object(o) {
                tracing::warn!(error = %e, "queued spawn_object failed");
            }
        }
        Command::SpawnStruct(s) => {
            if let Err(e) = world.spawn_struct(s) {
                tracing::warn!(error = %e, "queued spawn_struct failed");
            }
        }
        Command::DestroyObject(id) => world.despawn_object(id),
        Command::DestroyStruct(id) => world.despawn_struct(id),
        Command::DamageObject(id, amount) => {
            // Life reaching zero only raises `Destroy` for the `onDestroy`
            // hook to react to; the object itself is freed by a later
            // `queue_destroy_object` once the hook (and any drop-item
            // spawn it does) has run, not implicitly here.
            let dead = if let Some(obj) = world.objects.get_mut(id) {
                obj.base.life -= amount;
                obj.base.push_event(oz_core::model::ObjectEvent::Damage(amount));
                obj.base.life <= 0.0
            } else {
                false
            };
            if dead {
                if let Some(obj) = world.objects.get_mut(id) {
                    obj.base.push_event(oz_core::model::ObjectEvent::Destroy);
                }
            }
        }
        Command::Save(responder) => {
            let mut buf = Vec::new();
            let result = save::save(world, &mut buf).map(|_| buf);
            let _ = responder.send(result);
        }
    }
}

/// Phase 2's "matrix update": entity finite-state-machines, structure
/// demolition, then the physics integrator. The only place per tick where
/// the world's grid, objects and structs are mutated (§4.F).
fn tick_matrix(world: &mut World, library: &ClassLibrary, bus: &mut EventBus) {
    let struct_ids: Vec<StructId> = world.structs.iter().map(|(id, _)| id).collect();

    for &sid in &struct_ids {
        let entity_count = world.structs.get(sid).map(|s| s.entities.len()).unwrap_or(0);
        for idx in 0..entity_count {
            tick_entity(world, sid, idx);
        }
    }

    for &sid in &struct_ids {
        let fully_gone = world
            .structs
            .get_mut(sid)
            .map(|s| s.tick_demolish(TICK))
            .unwrap_or(false);
        if fully_gone {
            finish_demolition(world, library, sid);
        }
    }

    physics::tick(world, bus);
}

/// A structure just finished sinking (§4.B): spawn its debris fragments at
/// the model's mid-z slab and free the structure. Missions that never
/// register a `<bsp-name>_debris` frag class simply get no debris — not an
/// error, since plenty of static geometry is never meant to be destroyed.
fn finish_demolition(world: &mut World, library: &ClassLibrary, sid: StructId) {
    let Some(s) = world.structs.get(sid) else {
        return;
    };
    let mid_z = (s.bsp.bounds.mins.z + s.bsp.bounds.maxs.z) * 0.5;
    let world_center = s.transform().transform_point3(Vec3::new(0.0, 0.0, mid_z));
    let n_frags = s.bsp.n_frags;
    let debris_name = format!("{}_debris", s.bsp.name);

    if let Ok(class) = library.frag_class(&debris_name) {
        for _ in 0..n_frags {
            let jitter = Vec3::new(
                world.rng.range_f32(-1.0, 1.0),
                world.rng.range_f32(-1.0, 1.0),
                0.0,
            );
            let frag = Fragment::new(class.clone(), world_center + jitter, DESTRUCT_FRAG_VELOCITY);
            let _ = world.spawn_frag(frag);
        }
    } else {
        tracing::debug!(bsp = %s.bsp.name, "no debris frag class registered for demolished structure");
    }

    world.despawn_struct(sid);
}

/// Lightweight, cloneable front end for the main thread (input, UI, the
/// Lua `onUpdate` hook, the console command handler) to read world state
/// and queue spawn/destroy/save requests without touching the pipeline's
/// thread machinery directly.
#[derive(Clone)]
pub struct PipelineHandle {
    world: Arc<Mutex<World>>,
    commands: mpsc::Sender<Command>,
}

impl PipelineHandle {
    /// Read-only access to the world. Valid to call during phase 1 (the
    /// window between `Pipeline::tick`'s phase-1 callback and the next
    /// `aux_sem` post) — calling it from anywhere else still works because
    /// of the `Mutex`, but would block until aux's current phase finishes.
    pub fn with_world<R>(&self, f: impl FnOnce(&World) -> R) -> R {
        let world = self.world.lock().unwrap();
        f(&world)
    }

    pub fn queue_spawn_object(&self, object: Object) {
        let _ = self.commands.send(Command::SpawnObject(object));
    }

    pub fn queue_spawn_struct(&self, s: Struct) {
        let _ = self.commands.send(Command::SpawnStruct(s));
    }

    pub fn queue_destroy_object(&self, id: ObjectId) {
        let _ = self.commands.send(Command::DestroyObject(id));
    }

    pub fn queue_destroy_struct(&self, id: StructId) {
        let _ = self.commands.send(Command::DestroyStruct(id));
    }

    pub fn queue_damage_object(&self, id: ObjectId, amount: f32) {
        let _ = self.commands.send(Command::DamageObject(id, amount));
    }

    /// Request a save, blocking until aux services it in its next phase 3.
    /// Returns the encoded save-file bytes (§4.F/§6).
    pub fn save_blocking(&self) -> SimResult<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        if self.commands.send(Command::Save(tx)).is_err() {
            let world = self.world.lock().unwrap();
            let mut buf = Vec::new();
            return save::save(&world, &mut buf).map(|_| buf);
        }
        rx.recv().unwrap_or_else(|_| {
            let world = self.world.lock().unwrap();
            let mut buf = Vec::new();
            save::save(&world, &mut buf).map(|_| buf)
        })
    }
}

/// Tracks wall-clock frame pacing (§4.F): sleep the remainder of a tick
/// budget when the frame finished early, and record (rather than try to
/// catch up for) time dropped past the 100ms hang threshold.
pub struct FramePacer {
    tick_budget: Duration,
    hang_threshold: Duration,
    dropped: Duration,
}

impl Default for FramePacer {
    fn default() -> Self {
        Self {
            tick_budget: Duration::from_micros(TICK_MICROS),
            hang_threshold: Duration::from_millis(100),
            dropped: Duration::ZERO,
        }
    }
}

impl FramePacer {
    /// Consume one frame's measured wall time: sleep the remainder if the
    /// frame finished under budget, or record the excess as dropped time
    /// without sleeping (the simulation clock never chases the wall clock).
    pub fn pace(&mut self, elapsed: Duration) {
        if elapsed < self.tick_budget {
            std::thread::sleep(self.tick_budget - elapsed);
        } else if elapsed > self.hang_threshold {
            self.dropped += elapsed - self.tick_budget.min(elapsed);
        }
    }

    /// Cumulative wall time dropped by the 100ms excess rule, for
    /// diagnostics (§1.1 log context).
    pub fn dropped(&self) -> Duration {
        self.dropped
    }
}

/// Owns the aux thread and the semaphore handshake driving it. Created
/// with a [`World`] and a [`ClassLibrary`]; [`Self::tick`] drives one full
/// three-phase cycle from the main thread.
pub struct Pipeline {
    world: Arc<Mutex<World>>,
    events: Arc<Mutex<EventBus>>,
    main_sem: Arc<Semaphore>,
    aux_sem: Arc<Semaphore>,
    is_aux_alive: Arc<AtomicBool>,
    commands: mpsc::Sender<Command>,
    aux_thread: Option<JoinHandle<()>>,
    pacer: FramePacer,
}

impl Pipeline {
    pub fn spawn(world: World, library: Arc<ClassLibrary>, log_capacity: usize) -> Self {
        let world = Arc::new(Mutex::new(world));
        let events = Arc::new(Mutex::new(EventBus::new(log_capacity)));
        let main_sem = Arc::new(Semaphore::new(0));
        let aux_sem = Arc::new(Semaphore::new(0));
        let is_aux_alive = Arc::new(AtomicBool::new(true));
        let (commands_tx, commands_rx) = mpsc::channel();

        let aux_thread = {
            let world = world.clone();
            let events = events.clone();
            let main_sem = main_sem.clone();
            let aux_sem = aux_sem.clone();
            let is_aux_alive = is_aux_alive.clone();

            std::thread::spawn(move || {
                // Prime the handshake: the first couple of main-thread
                // ticks must not block on a phase 2 that hasn't run yet.
                main_sem.post();
                main_sem.post();

                loop {
                    aux_sem.wait();
                    if !is_aux_alive.load(Ordering::Acquire) {
                        // Drain and service whatever is still queued
                        // (including a pending save) before exiting.
                        let mut w = world.lock().unwrap();
                        while let Ok(cmd) = commands_rx.try_recv() {
                            apply_command(&mut w, cmd);
                        }
                        break;
                    }

                    {
                        let mut w = world.lock().unwrap();
                        let mut bus = events.lock().unwrap();
                        tick_matrix(&mut w, &library, &mut bus);
                    }

                    // Phase 3: flush queued spawn/destroy/save commands.
                    // There is no network layer and no separate AI-on-
                    // snapshot pass in this substrate (§1 Non-goals), so
                    // phase 3 here is exactly the command-queue drain.
                    {
                        let mut w = world.lock().unwrap();
                        while let Ok(cmd) = commands_rx.try_recv() {
                            apply_command(&mut w, cmd);
                        }
                    }

                    main_sem.post();
                }
            })
        };

        Self {
            world,
            events,
            main_sem,
            aux_sem,
            is_aux_alive,
            commands: commands_tx,
            aux_thread: Some(aux_thread),
            pacer: FramePacer::default(),
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            world: self.world.clone(),
            commands: self.commands.clone(),
        }
    }

    /// Drive one full tick: phase 1 (`read_only`, read-only access to the
    /// world — input/UI/Lua `onUpdate`/camera, per §4.F), hand off to aux
    /// for phase 2+3, then return this tick's events (flushed from the
    /// *previous* phase 2, per §4.F's one-tick audio latency) and pace the
    /// frame to `TICK_MICROS`.
    pub fn tick<F>(&mut self, read_only: F) -> Vec<TickEvent>
    where
        F: FnOnce(&World),
    {
        let started = Instant::now();

        {
            let world = self.world.lock().unwrap();
            read_only(&world);
        }

        let events = {
            let mut bus = self.events.lock().unwrap();
            bus.flush()
        };

        self.aux_sem.post();
        self.main_sem.wait();

        self.pacer.pace(started.elapsed());
        events
    }

    pub fn dropped_time(&self) -> Duration {
        self.pacer.dropped()
    }

    /// Cancel the aux thread (§4.F: flip `isAuxAlive`, post `auxSem` so it
    /// exits at its next wait, join it), then encode a final save.
    pub fn shutdown(mut self, sink: &mut impl std::io::Write) -> SimResult<()> {
        self.is_aux_alive.store(false, Ordering::Release);
        self.aux_sem.post();
        if let Some(handle) = self.aux_thread.take() {
            let _ = handle.join();
        }
        let world = self.world.lock().unwrap();
        save::save(&world, sink)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.aux_thread.is_some() {
            self.is_aux_alive.store(false, Ordering::Release);
            self.aux_sem.post();
            if let Some(handle) = self.aux_thread.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oz_core::geom::Bounds;
    use oz_core::heading::Heading;
    use oz_core::model::{Brush, BspModel, EntityClass, EntityType, Material, ObjectClass, ObjectKind};
    use oz_core::world::WorldCaps;
    use std::sync::atomic::{AtomicU32, Ordering as AOrd};

    fn door_world() -> (World, Arc<ClassLibrary>) {
        let mut w = World::new(1, WorldCaps::default(), oz_core::model::Terrain::flat(-1000.0));
        let mut bsp = BspModel::new(
            "bunker",
            Bounds::from_center_half_extents(Vec3::ZERO, Vec3::splat(2.0)),
        );
        bsp.planes.push(oz_core::geom::Plane::new(Vec3::Z, -1.0));
        bsp = bsp.with_brush(Brush {
            planes: vec![0],
            material: Material::Stone,
            solid: true,
        });
        bsp = bsp.with_entity_class(EntityClass {
            ty: EntityType::ManualDoor,
            move_offset: Vec3::new(0.0, 0.0, 2.0),
            ratio_inc: 1.0,
            ..Default::default()
        });
        let s = Struct::new(Arc::new(bsp), Vec3::ZERO, Heading::North, 100.0);
        w.spawn_struct(s).unwrap();
        (w, Arc::new(ClassLibrary::new()))
    }

    #[test]
    fn semaphore_wait_blocks_until_posted() {
        let sem = Arc::new(Semaphore::new(0));
        let waited = Arc::new(AtomicU32::new(0));

        let sem2 = sem.clone();
        let waited2 = waited.clone();
        let handle = std::thread::spawn(move || {
            sem2.wait();
            waited2.store(1, AOrd::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(waited.load(AOrd::SeqCst), 0);

        sem.post();
        handle.join().unwrap();
        assert_eq!(waited.load(AOrd::SeqCst), 1);
    }

    #[test]
    fn matrix_tick_advances_an_opening_door() {
        let (mut w, library) = door_world();
        if let Some(s) = w.structs.iter().next().map(|(id, _)| id) {
            let sid = s;
            w.structs.get_mut(sid).unwrap().entities[0].state =
                oz_core::model::EntityState::Opening;
        }

        let mut bus = EventBus::new(16);
        tick_matrix(&mut w, &library, &mut bus);

        let sid = w.structs.iter().next().unwrap().0;
        assert_eq!(
            w.structs.get(sid).unwrap().entities[0].state,
            oz_core::model::EntityState::Opened
        );
    }

    #[test]
    fn pipeline_tick_runs_physics_through_the_aux_thread() {
        let mut w = World::new(1, WorldCaps::default(), oz_core::model::Terrain::flat(-1000.0));
        let mut bsp = BspModel::new(
            "floor",
            Bounds::from_center_half_extents(Vec3::new(0.0, 0.0, -1.0), Vec3::new(50.0, 50.0, 1.0)),
        );
        bsp.planes.push(oz_core::geom::Plane::new(Vec3::Z, -1.0));
        bsp = bsp.with_brush(Brush {
            planes: vec![0],
            material: Material::Stone,
            solid: true,
        });
        w.spawn_struct(Struct::new(Arc::new(bsp), Vec3::ZERO, Heading::North, 1000.0))
            .unwrap();

        let class = Arc::new(ObjectClass {
            half_extents: Vec3::splat(0.5),
            ..Default::default()
        });
        let mut obj = Object::new(class, Vec3::new(0.0, 0.0, 3.0), ObjectKind::Dynamic(Default::default()));
        obj.base.flags.insert(oz_core::model::ObjectFlags::SOLID);
        let id = w.spawn_object(obj).unwrap();

        let mut pipeline = Pipeline::spawn(w, Arc::new(ClassLibrary::new()), 16);
        for _ in 0..240 {
            pipeline.tick(|_world| {});
        }

        let settled = pipeline.handle().with_world(|world| {
            world.objects.get(id).unwrap().base.position.z
        });
        assert!((settled - (-0.5)).abs() < 0.2);
    }

    #[test]
    fn queued_spawn_is_applied_by_the_next_tick() {
        let w = World::new(1, WorldCaps::default(), oz_core::model::Terrain::flat(-1000.0));
        let mut pipeline = Pipeline::spawn(w, Arc::new(ClassLibrary::new()), 16);
        let handle = pipeline.handle();

        let class = Arc::new(ObjectClass::default());
        handle.queue_spawn_object(Object::new(class, Vec3::ZERO, ObjectKind::Static));

        // The startup handshake primes `mainSem` with two free credits
        // (see `Pipeline::spawn`'s doc comment), so main can run up to two
        // ticks ahead of aux's first real command drain; a few extra ticks
        // gives aux room to catch up deterministically.
        for _ in 0..6 {
            pipeline.tick(|_world| {});
        }

        let count = handle.with_world(|world| world.objects.iter().count());
        assert_eq!(count, 1);
    }
}
