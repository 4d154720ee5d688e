//! The per-world stepping engine.
//!
//! A [`WorldRunner`] owns one world's entity-component store and its loaded
//! systems. All of its methods take `&self` so a runner can be shared behind
//! an `Arc` between the thread that steps it and any number of threads that
//! issue commands or read its state.
//!
//! The store is only ever touched by whoever holds the core lock, which the
//! step loop takes once per step. Cross-thread queries such as
//! [`WorldRunner::iteration_count`] and [`WorldRunner::entity_by_name`] never
//! take that lock; they read a snapshot the loop republishes after each step.
//!
//! Step lifecycle:
//!
//! 1. Apply a pending reset.
//! 2. Process queued entity removals.
//! 3. Run pre-update, update and post-update across all systems.
//! 4. Advance the iteration counter and simulation time.
//! 5. Publish the query snapshot and clear the change-set.
//! 6. Sleep out the remainder of the update period, if one is set.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use parking_lot::{Condvar, Mutex};
use sim_component::components::{Name, ParentEntity, WorldRoot};
use sim_component::{ComponentTypeId, Entity, EntityComponentManager};
use sim_system::{PluginConfig, System, SystemLoader, SystemManager, UpdateInfo};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::description::{EntityDescription, PluginDescription, WorldDescription};
use crate::error::{RunnerError, WorldError};
use crate::stopwatch::Stopwatch;

/// How long an idle loop waits before rechecking its flags.
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Observable run state of a [`WorldRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerState {
    /// No run loop is active.
    Stopped,
    /// A run loop is active and stepping.
    Running,
    /// A run loop is active but holding at a step boundary.
    Paused,
}

/// Target of a queued removal request.
#[derive(Debug, Clone)]
enum RemovalTarget {
    Name(String),
    Id(Entity),
}

#[derive(Debug, Clone)]
struct RemovalRequest {
    target: RemovalTarget,
    recursive: bool,
}

/// State only the lock holder may touch.
#[derive(Debug)]
struct RunnerCore {
    ecm: EntityComponentManager,
    systems: SystemManager,
    /// Store contents restored by a reset.
    initial: EntityComponentManager,
    world_entity: Entity,
    step_size: Duration,
    sim_time: Duration,
    iterations: u64,
}

/// Values readable from any thread without the core lock.
#[derive(Debug, Default)]
struct Snapshot {
    iterations: AtomicU64,
    sim_time_ns: AtomicU64,
    entity_count: AtomicUsize,
    system_count: AtomicUsize,
    /// Every holder of each name; lookups return the lowest id.
    names: DashMap<String, BTreeSet<Entity>>,
    entity_names: DashMap<Entity, String>,
    entities: DashSet<Entity>,
}

/// How much of the snapshot a publish refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Publish {
    /// Counters plus whatever the pending change-set touched.
    Changes,
    /// Counters plus a rebuild from the whole store.
    Full,
}

/// Steps a single world.
#[derive(Debug)]
pub struct WorldRunner {
    name: String,
    loader: Arc<SystemLoader>,
    core: Mutex<RunnerCore>,
    clock: Mutex<Stopwatch>,
    running: AtomicBool,
    paused: AtomicBool,
    stop_requested: AtomicBool,
    reset_requested: AtomicBool,
    fetched_all_includes: AtomicBool,
    forced_steps: AtomicU64,
    update_period_ns: AtomicU64,
    removals: Mutex<Vec<RemovalRequest>>,
    wake_lock: Mutex<()>,
    wake: Condvar,
    snapshot: Snapshot,
}

impl WorldRunner {
    /// Build a runner from a world description.
    ///
    /// Creates the world entity and the entity tree, then loads world-level
    /// plugins followed by each entity's plugins. A plugin that is unknown to
    /// `loader` or fails to configure is logged and skipped; the world still
    /// loads.
    ///
    /// # Errors
    ///
    /// Returns an error if the description itself is invalid (empty name,
    /// zero or negative step size).
    pub fn new(description: &WorldDescription, loader: Arc<SystemLoader>) -> Result<Self, WorldError> {
        description.validate()?;
        let step_size = description.step_duration()?;

        let mut ecm = EntityComponentManager::new();
        let world_entity = ecm.create_entity();
        ecm.set_component(world_entity, Name::new(description.name.clone()));
        ecm.set_component(world_entity, WorldRoot);

        let mut core = RunnerCore {
            initial: EntityComponentManager::new(),
            ecm,
            systems: SystemManager::new(),
            world_entity,
            step_size,
            sim_time: Duration::ZERO,
            iterations: 0,
        };
        load_world(&description.name, &loader, &mut core, description);
        core.initial = core.ecm.clone();

        let runner = Self {
            name: description.name.clone(),
            loader,
            core: Mutex::new(RunnerCore::placeholder()),
            clock: Mutex::new(Stopwatch::new()),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            reset_requested: AtomicBool::new(false),
            fetched_all_includes: AtomicBool::new(true),
            forced_steps: AtomicU64::new(0),
            update_period_ns: AtomicU64::new(duration_to_ns(description.update_period())),
            removals: Mutex::new(Vec::new()),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            snapshot: Snapshot::default(),
        };
        runner.publish(&core, Publish::Full);
        *runner.core.lock() = core;

        info!(
            world = %runner.name,
            entities = runner.entity_count(),
            systems = runner.system_count(),
            step_size_s = step_size.as_secs_f64(),
            "created world runner"
        );
        Ok(runner)
    }

    /// The world name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The loader used to instantiate plugins by name.
    #[must_use]
    pub fn loader(&self) -> &Arc<SystemLoader> {
        &self.loader
    }

    /// Step until `iterations` steps have executed (`0` = until stopped).
    ///
    /// Blocks the calling thread. While paused, or while the world's
    /// includes are still being fetched, the loop idles at a step boundary
    /// without invoking systems or counting iterations.
    ///
    /// A [`WorldRunner::stop`] issued before the loop starts ends it before
    /// the first step. Returns `false` without stepping if another thread is
    /// already running this world.
    pub fn run(&self, iterations: u64) -> bool {
        self.run_until(iterations, &AtomicBool::new(false))
    }

    /// As [`WorldRunner::run`], but the loop also ends once `cancel` is set.
    ///
    /// An owner that stops many runners sets `cancel` first, so a runner
    /// whose loop has not started yet still observes the stop.
    pub fn run_until(&self, iterations: u64, cancel: &AtomicBool) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(world = %self.name, "world is already running");
            return false;
        }
        self.notify();

        info!(world = %self.name, iterations, paused = self.paused(), "world run started");
        let mut executed = 0u64;

        while !self.stop_requested.load(Ordering::SeqCst) && !cancel.load(Ordering::SeqCst) {
            if !self.fetched_all_includes.load(Ordering::SeqCst) {
                self.clock.lock().stop();
                self.idle(IDLE_WAIT);
                continue;
            }

            let paused = self.paused();
            let forced = paused && self.take_forced_step();
            if paused && !forced {
                self.clock.lock().stop();
                self.idle(IDLE_WAIT);
                continue;
            }
            if !paused {
                self.clock.lock().start(false);
            }

            let started = Instant::now();
            self.step(paused);
            executed += 1;

            if iterations > 0 && executed >= iterations {
                break;
            }
            self.throttle(started);
        }

        self.clock.lock().stop();
        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.notify();
        info!(
            world = %self.name,
            executed,
            iterations = self.iteration_count(),
            "world run finished"
        );
        true
    }

    /// Execute exactly one step on the calling thread, regardless of the
    /// paused flag. With `paused` the step runs with zero `dt` and reports
    /// itself as paused to the systems.
    ///
    /// Returns `false` if a run loop is active.
    pub fn step_once(&self, paused: bool) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(world = %self.name, "cannot single-step a running world");
            return false;
        }
        self.step(paused);
        self.running.store(false, Ordering::SeqCst);
        self.notify();
        true
    }

    fn step(&self, paused: bool) {
        let mut guard = self.core.lock();
        let core = &mut *guard;

        if self.reset_requested.swap(false, Ordering::SeqCst) {
            self.apply_reset(core);
        }
        self.apply_removals(core);

        let dt = if paused { Duration::ZERO } else { core.step_size };
        let info = UpdateInfo {
            iterations: core.iterations,
            sim_time: core.sim_time,
            real_time: self.real_time(),
            dt,
            paused,
        };

        let report = core.systems.run_step(&info, &mut core.ecm);
        core.iterations += 1;
        core.sim_time += dt;

        self.publish(core, Publish::Changes);
        core.ecm.clear_changes();

        debug!(
            world = %self.name,
            iteration = core.iterations,
            sim_time_s = core.sim_time.as_secs_f64(),
            failed = report.failed,
            "world step complete"
        );
    }

    fn throttle(&self, started: Instant) {
        let period = self.update_period();
        if period.is_zero() {
            return;
        }
        let elapsed = started.elapsed();
        if elapsed < period {
            let deadline = started + period;
            let mut guard = self.wake_lock.lock();
            while !self.stop_requested.load(Ordering::SeqCst) {
                if self.wake.wait_until(&mut guard, deadline).timed_out() {
                    break;
                }
            }
        } else {
            warn!(
                world = %self.name,
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = period.as_micros() as u64,
                "step exceeded update period"
            );
        }
    }

    fn idle(&self, timeout: Duration) {
        let mut guard = self.wake_lock.lock();
        if self.stop_requested.load(Ordering::SeqCst) {
            return;
        }
        self.wake.wait_for(&mut guard, timeout);
    }

    fn notify(&self) {
        let _guard = self.wake_lock.lock();
        self.wake.notify_all();
    }

    fn take_forced_step(&self) -> bool {
        self.forced_steps
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Pause or resume stepping. Takes effect at the next step boundary.
    pub fn set_paused(&self, paused: bool) {
        let was = self.paused.swap(paused, Ordering::SeqCst);
        if was != paused {
            info!(world = %self.name, paused, "world pause state changed");
        }
        self.notify();
    }

    /// Let the next step run even though the runner is paused. The runner
    /// stays paused, so the step after that blocks until resumed.
    pub fn queue_paused_step(&self) {
        self.forced_steps.fetch_add(1, Ordering::SeqCst);
        self.notify();
    }

    /// Ask the run loop to exit after the in-flight step. If no loop is
    /// active the next [`WorldRunner::run`] returns without stepping.
    pub fn stop(&self) {
        if self.running() {
            info!(world = %self.name, "stop requested");
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        self.notify();
    }

    /// Drop a stop request that no run loop consumed.
    pub fn clear_stop_request(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Mark whether every include of the world has been fetched. Until this
    /// is `true` the run loop idles without stepping.
    pub fn set_fetched_all_includes(&self, fetched: bool) {
        self.fetched_all_includes.store(fetched, Ordering::SeqCst);
        self.notify();
    }

    /// Whether every include of the world has been fetched.
    #[must_use]
    pub fn fetched_all_includes(&self) -> bool {
        self.fetched_all_includes.load(Ordering::SeqCst)
    }

    /// Set the wall-clock period per step. Zero runs unthrottled.
    /// Applies to subsequent steps only.
    pub fn set_update_period(&self, period: Duration) {
        self.update_period_ns.store(duration_to_ns(period), Ordering::SeqCst);
        debug!(world = %self.name, period_us = period.as_micros() as u64, "update period changed");
    }

    /// The wall-clock period per step.
    #[must_use]
    pub fn update_period(&self) -> Duration {
        Duration::from_nanos(self.update_period_ns.load(Ordering::SeqCst))
    }

    /// Change the simulated duration of subsequent steps.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidStepSize`] for zero or negative sizes.
    pub fn set_step_size(&self, seconds: f64) -> Result<(), WorldError> {
        let step = WorldDescription::new(self.name.clone())
            .with_step_size(seconds)
            .step_duration()?;
        self.core.lock().step_size = step;
        Ok(())
    }

    /// The simulated duration of one step.
    #[must_use]
    pub fn step_size(&self) -> Duration {
        self.core.lock().step_size
    }

    /// Restore the world to its initial state.
    ///
    /// Applied immediately when the runner is stopped, otherwise at the next
    /// step boundary.
    pub fn reset(&self) {
        if self.running() {
            self.reset_requested.store(true, Ordering::SeqCst);
            self.notify();
            return;
        }
        let mut core = self.core.lock();
        self.apply_reset(&mut core);
    }

    fn apply_reset(&self, core: &mut RunnerCore) {
        core.ecm = core.initial.clone();
        core.iterations = 0;
        core.sim_time = Duration::ZERO;
        self.removals.lock().clear();

        let info = UpdateInfo {
            real_time: self.real_time(),
            paused: self.paused(),
            ..UpdateInfo::default()
        };
        let report = core.systems.reset(&info, &mut core.ecm);
        self.publish(core, Publish::Full);
        info!(world = %self.name, systems = report.invoked, failed = report.failed, "world reset");
    }

    /// Queue removal of the entity named `name` for the next step boundary.
    ///
    /// Returns `false` if no entity has that name.
    pub fn request_remove_entity(&self, name: &str, recursive: bool) -> bool {
        if !self.has_entity(name) {
            return false;
        }
        self.removals.lock().push(RemovalRequest {
            target: RemovalTarget::Name(name.to_string()),
            recursive,
        });
        true
    }

    /// Queue removal of `entity` for the next step boundary.
    ///
    /// Returns `false` if the entity does not exist.
    pub fn request_remove_entity_by_id(&self, entity: Entity, recursive: bool) -> bool {
        if !self.contains_entity(entity) {
            return false;
        }
        self.removals.lock().push(RemovalRequest {
            target: RemovalTarget::Id(entity),
            recursive,
        });
        true
    }

    fn apply_removals(&self, core: &mut RunnerCore) {
        let requests = std::mem::take(&mut *self.removals.lock());
        for request in requests {
            let entity = match &request.target {
                RemovalTarget::Name(name) => core.ecm.entity_by_name(name),
                RemovalTarget::Id(entity) => Some(*entity),
            };
            match entity {
                Some(entity) if entity != core.world_entity => {
                    core.ecm.request_remove_entity(entity, request.recursive);
                }
                Some(_) => warn!(world = %self.name, "refusing to remove the world entity"),
                None => debug!(world = %self.name, target = ?request.target, "removal target vanished"),
            }
        }
        let removed = core.ecm.process_remove_entity_requests();
        if removed > 0 {
            debug!(world = %self.name, removed, "processed entity removals");
        }
    }

    /// Register a system instance. `entity` defaults to the world entity.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Running`] while a run loop is active, or the system's
    /// configure error.
    pub fn add_system(
        &self,
        system: Box<dyn System>,
        entity: Option<Entity>,
        config: &PluginConfig,
    ) -> Result<Uuid, RunnerError> {
        if self.running() {
            warn!(world = %self.name, system = system.name(), "cannot add system while running");
            return Err(RunnerError::Running(self.name.clone()));
        }
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let target = entity.unwrap_or(core.world_entity);
        let id = core.systems.add(system, target, config, &mut core.ecm)?;
        self.publish(core, Publish::Changes);
        Ok(id)
    }

    /// Instantiate a plugin from the loader by name and register it.
    ///
    /// # Errors
    ///
    /// As [`WorldRunner::add_system`], plus an unknown-plugin error.
    pub fn add_plugin(
        &self,
        plugin: &PluginDescription,
        entity: Option<Entity>,
    ) -> Result<Uuid, RunnerError> {
        let system = self.loader.instantiate(&plugin.name)?;
        self.add_system(system, entity, &plugin.config)
    }

    /// Unregister every system named `name`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Running`] while a run loop is active.
    pub fn remove_system(&self, name: &str) -> Result<usize, RunnerError> {
        if self.running() {
            return Err(RunnerError::Running(self.name.clone()));
        }
        let mut core = self.core.lock();
        let removed = core.systems.remove(name);
        self.snapshot
            .system_count
            .store(core.systems.count(), Ordering::SeqCst);
        Ok(removed)
    }

    /// Add the entities and plugins of `description` to this world.
    ///
    /// Used once a world's includes have been fetched. If no step has run
    /// yet, the attached content becomes part of the state a reset restores.
    /// Returns the number of systems loaded.
    pub fn attach_world(&self, description: &WorldDescription) -> usize {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let before = core.systems.count();
        load_world(&self.name, &self.loader, core, description);
        if core.iterations == 0 {
            core.initial = core.ecm.clone();
        }
        self.publish(core, Publish::Changes);
        let loaded = core.systems.count() - before;
        info!(
            world = %self.name,
            entities = description.entity_count(),
            systems = loaded,
            "attached world content"
        );
        loaded
    }

    /// Run `f` with shared access to the store.
    ///
    /// Blocks until any in-flight step completes.
    pub fn with_ecm<R>(&self, f: impl FnOnce(&EntityComponentManager) -> R) -> R {
        let core = self.core.lock();
        f(&core.ecm)
    }

    /// Run `f` with exclusive access to the store between steps.
    ///
    /// # Errors
    ///
    /// [`RunnerError::Running`] while a run loop is active.
    pub fn with_ecm_mut<R>(
        &self,
        f: impl FnOnce(&mut EntityComponentManager) -> R,
    ) -> Result<R, RunnerError> {
        if self.running() {
            return Err(RunnerError::Running(self.name.clone()));
        }
        let mut guard = self.core.lock();
        let core = &mut *guard;
        let out = f(&mut core.ecm);
        self.publish(core, Publish::Changes);
        Ok(out)
    }

    /// The world's root entity.
    #[must_use]
    pub fn world_entity(&self) -> Entity {
        self.core.lock().world_entity
    }

    /// Number of steps executed since construction or the last reset.
    #[must_use]
    pub fn iteration_count(&self) -> u64 {
        self.snapshot.iterations.load(Ordering::SeqCst)
    }

    /// Simulation time reached by the last step.
    #[must_use]
    pub fn sim_time(&self) -> Duration {
        Duration::from_nanos(self.snapshot.sim_time_ns.load(Ordering::SeqCst))
    }

    /// Number of live entities, including the world entity.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.snapshot.entity_count.load(Ordering::SeqCst)
    }

    /// Number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.snapshot.system_count.load(Ordering::SeqCst)
    }

    /// Whether an entity called `name` exists.
    #[must_use]
    pub fn has_entity(&self, name: &str) -> bool {
        self.snapshot.names.contains_key(name)
    }

    /// The entity called `name`, if any. When several share a name the one
    /// created first is returned.
    #[must_use]
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.snapshot
            .names
            .get(name)
            .and_then(|holders| holders.first().copied())
    }

    /// Whether `entity` exists in the world.
    #[must_use]
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.snapshot.entities.contains(&entity)
    }

    /// Whether a run loop is active.
    #[must_use]
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the runner is paused.
    #[must_use]
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        match (self.running(), self.paused()) {
            (false, _) => RunnerState::Stopped,
            (true, true) => RunnerState::Paused,
            (true, false) => RunnerState::Running,
        }
    }

    /// Wall-clock time spent stepping.
    #[must_use]
    pub fn real_time(&self) -> Duration {
        self.clock.lock().elapsed_run_time()
    }

    /// Wall-clock time spent stopped or paused since the first run.
    #[must_use]
    pub fn stop_time(&self) -> Duration {
        self.clock.lock().elapsed_stop_time()
    }

    /// Block until the run loop is observed active, or `timeout` elapses.
    /// Returns whether it is running.
    pub fn wait_until_running(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.wake_lock.lock();
        while !self.running() {
            if self.wake.wait_until(&mut guard, deadline).timed_out() {
                return self.running();
            }
        }
        true
    }

    fn publish(&self, core: &RunnerCore, scope: Publish) {
        let snap = &self.snapshot;
        snap.iterations.store(core.iterations, Ordering::SeqCst);
        snap.sim_time_ns
            .store(duration_to_ns(core.sim_time), Ordering::SeqCst);
        snap.entity_count
            .store(core.ecm.entity_count(), Ordering::SeqCst);
        snap.system_count
            .store(core.systems.count(), Ordering::SeqCst);

        match scope {
            Publish::Changes => snap.apply_changes(&core.ecm),
            Publish::Full => snap.rebuild(&core.ecm),
        }
    }
}

impl Snapshot {
    /// Apply the store's pending change-set: created and removed entities,
    /// and added, renamed or removed names.
    fn apply_changes(&self, ecm: &EntityComponentManager) {
        let changes = ecm.changes();
        for entity in changes.removed_entities() {
            self.entities.remove(&entity);
        }
        for entity in changes.new_entities() {
            if ecm.has_entity(entity) {
                self.entities.insert(entity);
            }
        }

        let name = ComponentTypeId::of::<Name>();
        let touched = changes
            .added(name)
            .chain(changes.modified(name))
            .chain(changes.removed(name))
            .chain(changes.removed_entities());
        for entity in touched {
            self.forget(entity);
            if let Some(current) = ecm.component::<Name>(entity) {
                self.remember(entity, current.as_str());
            }
        }
    }

    fn rebuild(&self, ecm: &EntityComponentManager) {
        self.names.clear();
        self.entity_names.clear();
        self.entities.clear();
        for entity in ecm.entities() {
            self.entities.insert(entity);
        }
        for (entity, name) in ecm.each::<Name>() {
            self.remember(entity, name.as_str());
        }
    }

    fn remember(&self, entity: Entity, name: &str) {
        self.entity_names.insert(entity, name.to_string());
        self.names.entry(name.to_string()).or_default().insert(entity);
    }

    fn forget(&self, entity: Entity) {
        let Some((_, name)) = self.entity_names.remove(&entity) else {
            return;
        };
        let emptied = self.names.get_mut(&name).is_some_and(|mut holders| {
            holders.remove(&entity);
            holders.is_empty()
        });
        if emptied {
            self.names.remove_if(&name, |_, holders| holders.is_empty());
        }
    }
}

impl RunnerCore {
    fn placeholder() -> Self {
        Self {
            ecm: EntityComponentManager::new(),
            systems: SystemManager::new(),
            initial: EntityComponentManager::new(),
            world_entity: Entity::NULL,
            step_size: Duration::ZERO,
            sim_time: Duration::ZERO,
            iterations: 0,
        }
    }
}

fn duration_to_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Load the plugins and entity tree of `description` into `core`.
fn load_world(
    world: &str,
    loader: &SystemLoader,
    core: &mut RunnerCore,
    description: &WorldDescription,
) {
    let root = core.world_entity;
    for plugin in &description.plugins {
        load_plugin(world, loader, core, plugin, root);
    }

    let mut stack: Vec<(&EntityDescription, Entity)> =
        description.entities.iter().rev().map(|e| (e, root)).collect();
    let mut pending_plugins = Vec::new();
    while let Some((desc, parent)) = stack.pop() {
        let entity = core.ecm.create_entity();
        core.ecm.set_component(entity, Name::new(desc.name.clone()));
        core.ecm.set_component(entity, ParentEntity(parent));
        for plugin in &desc.plugins {
            pending_plugins.push((plugin, entity));
        }
        stack.extend(desc.children.iter().rev().map(|c| (c, entity)));
    }

    for (plugin, entity) in pending_plugins {
        load_plugin(world, loader, core, plugin, entity);
    }
}

fn load_plugin(
    world: &str,
    loader: &SystemLoader,
    core: &mut RunnerCore,
    plugin: &PluginDescription,
    entity: Entity,
) {
    let system = match loader.instantiate(&plugin.name) {
        Ok(system) => system,
        Err(err) => {
            error!(world, plugin = %plugin.name, %entity, error = %err, "failed to load plugin");
            return;
        }
    };
    if let Err(err) = core.systems.add(system, entity, &plugin.config, &mut core.ecm) {
        error!(world, plugin = %plugin.name, %entity, error = %err, "plugin rejected its configuration");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64;
    use std::thread;

    use serde_json::json;
    use sim_system::{Capabilities, SystemError};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Counter(u64);

    impl sim_component::Component for Counter {
        fn type_name() -> &'static str {
            "Counter"
        }
    }

    /// Increments a counter component on its entity every update.
    struct Increment {
        entity: Entity,
        updates: Arc<AtomicU64>,
        resets: Arc<AtomicU64>,
        paused_seen: Arc<AtomicU64>,
    }

    impl Increment {
        fn new() -> Self {
            Self {
                entity: Entity::NULL,
                updates: Arc::default(),
                resets: Arc::default(),
                paused_seen: Arc::default(),
            }
        }
    }

    impl System for Increment {
        fn name(&self) -> &str {
            "increment"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE.with_configure().with_update().with_reset()
        }

        fn configure(
            &mut self,
            entity: Entity,
            config: &PluginConfig,
            ecm: &mut EntityComponentManager,
        ) -> Result<(), SystemError> {
            let start = config.get_as::<u64>("start")?.unwrap_or(0);
            self.entity = entity;
            ecm.set_component(entity, Counter(start));
            Ok(())
        }

        fn update(
            &mut self,
            info: &UpdateInfo,
            ecm: &mut EntityComponentManager,
        ) -> Result<(), SystemError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if info.paused {
                self.paused_seen.fetch_add(1, Ordering::SeqCst);
                return Ok(());
            }
            if let Some(c) = ecm.component_mut::<Counter>(self.entity) {
                c.0 += 1;
            }
            Ok(())
        }

        fn reset(
            &mut self,
            _info: &UpdateInfo,
            _ecm: &mut EntityComponentManager,
        ) -> Result<(), SystemError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn description() -> WorldDescription {
        WorldDescription::new("default")
            .with_real_time_factor(0.0)
            .with_entity(
                EntityDescription::new("box")
                    .with_child(EntityDescription::new("link"))
                    .with_plugin(PluginDescription::new("increment").with_config(json!({"start": 10}))),
            )
            .with_entity(EntityDescription::new("sphere"))
    }

    fn loader() -> Arc<SystemLoader> {
        Arc::new(SystemLoader::new().with("increment", || Box::new(Increment::new())))
    }

    fn counter(runner: &WorldRunner, name: &str) -> Option<u64> {
        let entity = runner.entity_by_name(name)?;
        runner.with_ecm(|ecm| ecm.get_component::<Counter>(entity).map(|c| c.0))
    }

    #[test]
    fn test_new_builds_entity_tree() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        assert_eq!(runner.entity_count(), 4);
        assert_eq!(runner.system_count(), 1);
        assert!(runner.has_entity("default"));
        assert!(runner.has_entity("link"));
        assert_eq!(runner.entity_by_name("absent"), None);
        assert_eq!(runner.state(), RunnerState::Stopped);

        let link = runner.entity_by_name("link").unwrap();
        let parent = runner.with_ecm(|ecm| ecm.parent(link));
        assert_eq!(parent, runner.entity_by_name("box"));
        assert_eq!(counter(&runner, "box"), Some(10));
    }

    #[test]
    fn test_unknown_plugin_skipped() {
        let desc = description().with_plugin(PluginDescription::new("does_not_exist"));
        let runner = WorldRunner::new(&desc, loader()).unwrap();
        assert_eq!(runner.system_count(), 1);
    }

    #[test]
    fn test_invalid_step_size_rejected() {
        let desc = description().with_step_size(-0.01);
        assert!(matches!(
            WorldRunner::new(&desc, loader()),
            Err(WorldError::InvalidStepSize { .. })
        ));
    }

    #[test]
    fn test_run_fixed_iterations() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        assert!(runner.run(5));
        assert_eq!(runner.iteration_count(), 5);
        assert_eq!(runner.sim_time(), Duration::from_millis(5));
        assert_eq!(counter(&runner, "box"), Some(15));
        assert!(!runner.running());

        assert!(runner.run(3));
        assert_eq!(runner.iteration_count(), 8);
    }

    #[test]
    fn test_step_size_change_applies_forward() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        runner.run(2);
        runner.set_step_size(0.01).unwrap();
        runner.run(1);
        assert_eq!(runner.iteration_count(), 3);
        assert_eq!(runner.sim_time(), Duration::from_millis(12));
        assert!(runner.set_step_size(0.0).is_err());
    }

    #[test]
    fn test_paused_step_does_not_advance_time() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        runner.set_paused(true);
        runner.queue_paused_step();
        assert!(runner.run(1));
        assert_eq!(runner.iteration_count(), 1);
        assert_eq!(runner.sim_time(), Duration::ZERO);
        assert_eq!(counter(&runner, "box"), Some(10));
        assert!(runner.paused());
    }

    #[test]
    fn test_paused_runner_idles_until_resumed() {
        let runner = Arc::new(WorldRunner::new(&description(), loader()).unwrap());
        runner.set_paused(true);

        let handle = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.run(3))
        };
        assert!(runner.wait_until_running(Duration::from_secs(5)));
        assert_eq!(runner.state(), RunnerState::Paused);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(runner.iteration_count(), 0);

        runner.set_paused(false);
        assert!(handle.join().unwrap());
        assert_eq!(runner.iteration_count(), 3);
        assert!(runner.real_time() > Duration::ZERO || runner.sim_time() > Duration::ZERO);
    }

    #[test]
    fn test_second_run_rejected() {
        let runner = Arc::new(WorldRunner::new(&description(), loader()).unwrap());
        let handle = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.run(0))
        };
        assert!(runner.wait_until_running(Duration::from_secs(5)));
        assert!(!runner.run(1));
        assert!(!runner.step_once(false));
        runner.stop();
        assert!(handle.join().unwrap());
        assert!(!runner.running());
    }

    #[test]
    fn test_add_system_rejected_while_running() {
        let runner = Arc::new(WorldRunner::new(&description(), loader()).unwrap());
        let handle = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.run(0))
        };
        assert!(runner.wait_until_running(Duration::from_secs(5)));
        let result = runner.add_system(Box::new(Increment::new()), None, &PluginConfig::default());
        assert!(matches!(result, Err(RunnerError::Running(_))));
        assert_eq!(runner.system_count(), 1);
        runner.stop();
        handle.join().unwrap();

        runner
            .add_system(Box::new(Increment::new()), None, &PluginConfig::default())
            .unwrap();
        assert_eq!(runner.system_count(), 2);
        assert_eq!(runner.remove_system("increment").unwrap(), 2);
        assert_eq!(runner.system_count(), 0);
    }

    #[test]
    fn test_removal_applied_at_step_boundary() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        assert!(runner.request_remove_entity("box", true));
        assert!(!runner.request_remove_entity("absent", true));
        assert!(runner.has_entity("box"));

        runner.step_once(false);
        assert!(!runner.has_entity("box"));
        assert!(!runner.has_entity("link"));
        assert!(runner.has_entity("sphere"));
        assert_eq!(runner.entity_count(), 2);

        let sphere = runner.entity_by_name("sphere").unwrap();
        assert!(runner.request_remove_entity_by_id(sphere, false));
        assert!(!runner.request_remove_entity_by_id(Entity::from_raw(999), false));
        runner.step_once(false);
        assert!(!runner.contains_entity(sphere));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        runner.request_remove_entity("sphere", false);
        runner.run(4);
        assert_eq!(counter(&runner, "box"), Some(14));
        assert!(!runner.has_entity("sphere"));

        runner.reset();
        assert_eq!(runner.iteration_count(), 0);
        assert_eq!(runner.sim_time(), Duration::ZERO);
        assert_eq!(counter(&runner, "box"), Some(10));
        assert!(runner.has_entity("sphere"));
    }

    #[test]
    fn test_waits_for_includes() {
        let runner = Arc::new(WorldRunner::new(&WorldDescription::new("remote"), loader()).unwrap());
        runner.set_fetched_all_includes(false);
        let handle = {
            let runner = Arc::clone(&runner);
            thread::spawn(move || runner.run(2))
        };
        assert!(runner.wait_until_running(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(runner.iteration_count(), 0);

        let include = WorldDescription::new("remote").with_entity(
            EntityDescription::new("model")
                .with_plugin(PluginDescription::new("increment")),
        );
        assert_eq!(runner.attach_world(&include), 1);
        runner.set_fetched_all_includes(true);
        handle.join().unwrap();

        assert_eq!(runner.iteration_count(), 2);
        assert_eq!(counter(&runner, "model"), Some(2));
    }

    #[test]
    fn test_throttled_run_takes_wall_time() {
        let desc = WorldDescription::new("slow").with_step_size(0.01);
        let runner = WorldRunner::new(&desc, loader()).unwrap();
        assert_eq!(runner.update_period(), Duration::from_millis(10));
        let started = Instant::now();
        runner.run(3);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_name_lookup_follows_changes() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        let boxed = runner.entity_by_name("box").unwrap();
        let sphere = runner.entity_by_name("sphere").unwrap();

        runner
            .with_ecm_mut(|ecm| ecm.set_component(sphere, Name::new("box")))
            .unwrap();
        assert!(!runner.has_entity("sphere"));
        assert_eq!(runner.entity_by_name("box"), Some(boxed));

        assert!(runner.request_remove_entity_by_id(boxed, true));
        assert!(runner.run(1));
        assert_eq!(runner.entity_by_name("box"), Some(sphere));
        assert!(!runner.has_entity("link"));
        assert!(!runner.contains_entity(boxed));
        assert!(runner.contains_entity(sphere));
    }

    #[test]
    fn test_run_until_honors_cancel_flag() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        let cancel = AtomicBool::new(true);
        assert!(runner.run_until(0, &cancel));
        assert_eq!(runner.iteration_count(), 0);

        cancel.store(false, Ordering::SeqCst);
        assert!(runner.run_until(2, &cancel));
        assert_eq!(runner.iteration_count(), 2);
    }

    #[test]
    fn test_cleared_stop_request_is_dropped() {
        let runner = WorldRunner::new(&description(), loader()).unwrap();
        runner.stop();
        runner.clear_stop_request();
        assert!(runner.run(3));
        assert_eq!(runner.iteration_count(), 3);
    }
}
