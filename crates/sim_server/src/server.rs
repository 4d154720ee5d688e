//! The host controller.
//!
//! Startup resolves the configured [`WorldSource`] into a scene, builds one
//! [`WorldRunner`] per world, and fetches each world's includes. With
//! download-in-parallel the includes (and, for a remote world file, the
//! whole scene) are fetched on a background thread; runners whose includes
//! are still pending idle without stepping, and callers poll
//! [`Server::worlds_ready`] or [`Server::wait_until_ready`].
//!
//! Running is either blocking, on the caller's thread, or non-blocking, on a
//! background thread the caller hands off to through a one-shot "started"
//! channel. With several worlds each runner steps on its own scoped thread.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use sim_component::Entity;
use sim_system::{PluginConfig, System, SystemLoader};
use sim_world::{EntityDescription, SceneDescription, WorldDescription, WorldRunner};
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, WorldSource};
use crate::error::ServerError;
use crate::fetch::{self, CacheFetcher, ResourceFetcher};
use crate::resources::ResourcePaths;
use crate::signal::SignalHandler;

/// Name of the built-in world loaded when no source is configured.
pub const DEFAULT_WORLD_NAME: &str = "default";

/// How often a run waiting for worlds to load rechecks.
const LOAD_POLL: Duration = Duration::from_millis(10);

/// Thread bookkeeping guarded by the run mutex.
#[derive(Debug, Default)]
struct RunState {
    thread: Option<JoinHandle<bool>>,
    /// A run thread was spawned but has not marked the server running yet.
    starting: bool,
}

#[derive(Debug)]
struct ServerShared {
    config: ServerConfig,
    loader: Arc<SystemLoader>,
    fetcher: Arc<dyn ResourceFetcher>,
    resource_paths: RwLock<ResourcePaths>,
    runners: RwLock<Vec<Arc<WorldRunner>>>,
    run_state: Mutex<RunState>,
    running: AtomicBool,
    loading: AtomicBool,
    stop_requested: AtomicBool,
}

/// Owns every world runner and the run-control contract.
#[derive(Debug)]
pub struct Server {
    shared: Arc<ServerShared>,
    download_thread: Mutex<Option<JoinHandle<()>>>,
    signals: SignalHandler,
}

impl Server {
    /// Create a server and load its worlds.
    ///
    /// Load failures are logged and leave the affected worlds unconstructed;
    /// per-world accessors then return `None`.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let fetcher: Arc<dyn ResourceFetcher> = match config.fetcher() {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(
                config
                    .resource_cache()
                    .map(CacheFetcher::new)
                    .unwrap_or_default(),
            ),
        };
        let mut resource_paths = ResourcePaths::new();
        resource_paths.add_paths(config.resource_paths().iter().cloned());
        resource_paths.extend(ResourcePaths::from_env());

        let shared = Arc::new(ServerShared {
            loader: Arc::new(config.loader().clone()),
            fetcher,
            resource_paths: RwLock::new(resource_paths),
            runners: RwLock::new(Vec::new()),
            run_state: Mutex::new(RunState::default()),
            running: AtomicBool::new(false),
            loading: AtomicBool::new(true),
            stop_requested: AtomicBool::new(false),
            config,
        });

        let weak: Weak<ServerShared> = Arc::downgrade(&shared);
        let signals = SignalHandler::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.stop();
            }
        });

        let server = Self {
            shared,
            download_thread: Mutex::new(None),
            signals,
        };
        server.init();
        server
    }

    fn init(&self) {
        let shared = &self.shared;
        info!(source = %shared.config.source(), "loading worlds");

        if !shared.config.download_in_parallel() {
            if let Err(err) = shared.load_all() {
                error!(error = %err, "failed to load worlds");
            }
            shared.loading.store(false, Ordering::SeqCst);
            return;
        }

        // A remote world file must be fetched before its worlds are known;
        // otherwise the runners exist now and only the includes wait.
        let background: Box<dyn FnOnce(&ServerShared) + Send> = match shared.config.source() {
            WorldSource::File(uri) if fetch::is_remote(uri) => Box::new(|shared: &ServerShared| {
                if let Err(err) = shared.load_all() {
                    error!(error = %err, "failed to load worlds");
                }
            }),
            _ => match shared.resolve_scene() {
                Ok(scene) => {
                    shared.create_runners(&scene);
                    Box::new(move |shared: &ServerShared| shared.attach_includes(&scene))
                }
                Err(err) => {
                    error!(error = %err, "failed to load worlds");
                    shared.loading.store(false, Ordering::SeqCst);
                    return;
                }
            },
        };

        let task = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name("sim-download".into())
            .spawn(move || {
                background(&task);
                task.loading.store(false, Ordering::SeqCst);
                info!("download in parallel has finished; the simulation can start");
            });
        match spawned {
            Ok(handle) => *self.download_thread.lock() = Some(handle),
            Err(err) => {
                error!(error = %ServerError::Spawn(err), "failed to start download thread");
                shared.loading.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Run every world.
    ///
    /// `iterations` of `0` runs until [`Server::stop`]. Every runner is first
    /// set to `paused`. A blocking run returns once all worlds finish. A
    /// non-blocking run returns `true` once the background thread has
    /// marked the server running; it is rejected while an earlier background
    /// run is still alive.
    pub fn run(&self, blocking: bool, iterations: u64, paused: bool) -> bool {
        for runner in self.shared.runners() {
            runner.set_paused(paused);
        }

        {
            let _state = self.shared.run_state.lock();
            if !self.signals.initialized() {
                error!("signal handlers were not created; the server won't run");
                return false;
            }
            if self.shared.running() {
                warn!("the server is already running");
                return false;
            }
        }

        if blocking {
            return self.shared.run(iterations, None);
        }

        let mut state = self.shared.run_state.lock();
        if state.starting || self.shared.running() {
            warn!("a background run thread is still alive");
            return false;
        }
        // Not running, so any previous thread has left its run loop.
        if let Some(handle) = state.thread.take() {
            let _ = handle.join();
        }

        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("sim-run".into())
            .spawn(move || shared.run(iterations, Some(started_tx)));
        match spawned {
            Ok(handle) => {
                state.thread = Some(handle);
                state.starting = true;
            }
            Err(err) => {
                error!(error = %ServerError::Spawn(err), "failed to start run thread");
                return false;
            }
        }
        drop(state);

        started_rx.recv().unwrap_or(false)
    }

    /// Run exactly one step of every world, blocking.
    ///
    /// With `paused` the step runs as a paused step and the worlds stay
    /// paused afterwards, so a later run holds at its first step until
    /// released with [`Server::set_paused`].
    pub fn run_once(&self, paused: bool) -> bool {
        if paused {
            for runner in self.shared.runners() {
                runner.queue_paused_step();
            }
        }
        self.run(true, 1, paused)
    }

    /// Stop every world after its in-flight step.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn running(&self) -> bool {
        self.shared.running()
    }

    /// Number of constructed worlds.
    #[must_use]
    pub fn world_count(&self) -> usize {
        self.shared.runners.read().len()
    }

    /// Names of all constructed worlds, in index order.
    #[must_use]
    pub fn world_names(&self) -> Vec<String> {
        self.shared
            .runners
            .read()
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    /// The runner at `world`.
    #[must_use]
    pub fn runner(&self, world: usize) -> Option<Arc<WorldRunner>> {
        self.shared.runners.read().get(world).cloned()
    }

    /// Whether the world at `world` is stepping.
    #[must_use]
    pub fn world_running(&self, world: usize) -> Option<bool> {
        self.runner(world).map(|r| r.running())
    }

    /// Pause or resume one world. Returns `false` for an unknown index.
    pub fn set_paused(&self, paused: bool, world: usize) -> bool {
        self.runner(world).map(|r| r.set_paused(paused)).is_some()
    }

    /// Whether one world is paused.
    #[must_use]
    pub fn paused(&self, world: usize) -> Option<bool> {
        self.runner(world).map(|r| r.paused())
    }

    /// Steps executed by one world.
    #[must_use]
    pub fn iteration_count(&self, world: usize) -> Option<u64> {
        self.runner(world).map(|r| r.iteration_count())
    }

    /// Simulation time reached by one world.
    #[must_use]
    pub fn sim_time(&self, world: usize) -> Option<Duration> {
        self.runner(world).map(|r| r.sim_time())
    }

    /// Entities in one world.
    #[must_use]
    pub fn entity_count(&self, world: usize) -> Option<usize> {
        self.runner(world).map(|r| r.entity_count())
    }

    /// Systems loaded into one world.
    #[must_use]
    pub fn system_count(&self, world: usize) -> Option<usize> {
        self.runner(world).map(|r| r.system_count())
    }

    /// Whether one world has an entity named `name`.
    #[must_use]
    pub fn has_entity(&self, name: &str, world: usize) -> Option<bool> {
        self.runner(world).map(|r| r.has_entity(name))
    }

    /// The entity named `name`. `None` if the world or the entity is absent.
    #[must_use]
    pub fn entity_by_name(&self, name: &str, world: usize) -> Option<Entity> {
        self.runner(world).and_then(|r| r.entity_by_name(name))
    }

    /// Queue removal of the entity named `name` for the next step boundary.
    pub fn request_remove_entity(&self, name: &str, recursive: bool, world: usize) -> Option<bool> {
        self.runner(world)
            .map(|r| r.request_remove_entity(name, recursive))
    }

    /// Queue removal of `entity` for the next step boundary.
    pub fn request_remove_entity_by_id(
        &self,
        entity: Entity,
        recursive: bool,
        world: usize,
    ) -> Option<bool> {
        self.runner(world)
            .map(|r| r.request_remove_entity_by_id(entity, recursive))
    }

    /// Add a system to one world, attached to the world entity.
    ///
    /// Returns `Some(false)` while the server is running or if the system
    /// rejects its configuration, and `None` for an unknown index.
    pub fn add_system(&self, system: Box<dyn System>, world: usize) -> Option<bool> {
        self.add_system_with(system, None, &PluginConfig::default(), world)
    }

    /// Add a system to one world, attached to `entity` (the world entity when
    /// `None`) and configured with `config`.
    pub fn add_system_with(
        &self,
        system: Box<dyn System>,
        entity: Option<Entity>,
        config: &PluginConfig,
        world: usize,
    ) -> Option<bool> {
        let _state = self.shared.run_state.lock();
        if self.shared.running() {
            error!(system = system.name(), "cannot add system while the server is running");
            return Some(false);
        }
        let runner = self.runner(world)?;
        match runner.add_system(system, entity, config) {
            Ok(_) => Some(true),
            Err(err) => {
                error!(world = runner.name(), error = %err, "failed to add system");
                Some(false)
            }
        }
    }

    /// Set the wall-clock period per step of one world.
    pub fn set_update_period(&self, period: Duration, world: usize) -> bool {
        self.runner(world)
            .map(|r| r.set_update_period(period))
            .is_some()
    }

    /// Reset one world to its initial state.
    pub fn reset(&self, world: usize) -> bool {
        self.runner(world).map(|r| r.reset()).is_some()
    }

    /// Current resource search directories.
    #[must_use]
    pub fn resource_paths(&self) -> Vec<PathBuf> {
        self.shared.resource_paths.read().paths()
    }

    /// Add resource search directories, ahead of the install directory.
    pub fn add_resource_paths<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.shared.resource_paths.write().add_paths(paths);
    }

    /// `true` once loading has finished, at least one world exists, and every
    /// world has its includes attached.
    #[must_use]
    pub fn worlds_ready(&self) -> bool {
        let runners = self.shared.runners.read();
        !self.shared.loading.load(Ordering::SeqCst)
            && !runners.is_empty()
            && runners.iter().all(|r| r.fetched_all_includes())
    }

    /// Poll [`Server::worlds_ready`] up to `retries` times, sleeping
    /// `interval` between attempts.
    pub fn wait_until_ready(&self, retries: u32, interval: Duration) -> bool {
        for attempt in 0..=retries {
            if self.worlds_ready() {
                return true;
            }
            if attempt < retries {
                debug!(attempt, "worlds not ready yet");
                thread::sleep(interval);
            }
        }
        self.worlds_ready()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shared.stop();
        if let Some(handle) = self.shared.run_state.lock().thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.download_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl ServerShared {
    fn runners(&self) -> Vec<Arc<WorldRunner>> {
        self.runners.read().clone()
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.running() {
            return;
        }
        info!("stopping server");
        self.stop_requested.store(true, Ordering::SeqCst);
        // Runners not yet stepping see `stop_requested` through `run_until`;
        // a finished runner must not keep a stop for its next run.
        for runner in self.runners() {
            if runner.running() {
                runner.stop();
            }
        }
    }

    /// Mark the server running, signal `started`, and step every world.
    fn run(&self, iterations: u64, started: Option<crossbeam_channel::Sender<bool>>) -> bool {
        let began = {
            let mut state = self.run_state.lock();
            state.starting = false;
            let began = !self.running.swap(true, Ordering::SeqCst);
            if began {
                self.stop_requested.store(false, Ordering::SeqCst);
                for runner in self.runners.read().iter() {
                    runner.clear_stop_request();
                }
            }
            began
        };
        if let Some(tx) = started {
            let _ = tx.send(began);
        }
        if !began {
            warn!("the server is already running");
            return false;
        }

        while self.runners.read().is_empty()
            && self.loading.load(Ordering::SeqCst)
            && !self.stop_requested.load(Ordering::SeqCst)
        {
            thread::sleep(LOAD_POLL);
        }

        let runners = self.runners();
        let ok = match runners.as_slice() {
            [] => {
                error!("no worlds to run");
                false
            }
            [runner] => runner.run_until(iterations, &self.stop_requested),
            many => thread::scope(|scope| {
                let handles: Vec<_> = many
                    .iter()
                    .map(|runner| {
                        let cancel = &self.stop_requested;
                        scope.spawn(move || runner.run_until(iterations, cancel))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or(false))
                    .fold(true, |acc, ok| acc && ok)
            }),
        };

        let _state = self.run_state.lock();
        self.running.store(false, Ordering::SeqCst);
        ok
    }

    /// Resolve, construct and attach includes in one pass.
    fn load_all(&self) -> Result<(), ServerError> {
        let scene = self.resolve_scene()?;
        self.create_runners(&scene);
        self.attach_includes(&scene);
        Ok(())
    }

    fn resolve_scene(&self) -> Result<SceneDescription, ServerError> {
        let scene = match self.config.source() {
            WorldSource::None => {
                info!("loading default world");
                SceneDescription::default_world(DEFAULT_WORLD_NAME)
            }
            WorldSource::Description(scene) => {
                info!("loading worlds from in-memory description");
                scene.validate()?;
                scene.clone()
            }
            WorldSource::Literal(text) => {
                info!("loading worlds from literal description");
                SceneDescription::from_json(text)?
            }
            WorldSource::File(file) => {
                let path = self.resolve_world_file(file)?;
                info!(path = %path.display(), "loading world file");
                SceneDescription::from_file(&path)?
            }
        };
        if scene.worlds.is_empty() {
            return Err(ServerError::NoWorlds);
        }
        Ok(scene)
    }

    fn resolve_world_file(&self, file: &str) -> Result<PathBuf, ServerError> {
        if fetch::is_remote(file) {
            let fetched = self.fetcher.fetch(file)?;
            return fetch::description_file(&fetched);
        }
        self.resource_paths
            .read()
            .find_file(file)
            .ok_or_else(|| ServerError::WorldNotFound(file.to_string()))
    }

    fn create_runners(&self, scene: &SceneDescription) {
        let mut created = Vec::with_capacity(scene.worlds.len());
        for world in &scene.worlds {
            match WorldRunner::new(world, Arc::clone(&self.loader)) {
                Ok(runner) => {
                    if let Some(period) = self.config.update_period() {
                        runner.set_update_period(period);
                    }
                    runner.set_fetched_all_includes(world.includes.is_empty());
                    created.push(Arc::new(runner));
                }
                Err(err) => error!(world = %world.name, error = %err, "failed to create world"),
            }
        }
        self.runners.write().extend(created);
    }

    /// Fetch each world's includes and attach them to its runner.
    fn attach_includes(&self, scene: &SceneDescription) {
        for world in &scene.worlds {
            if world.includes.is_empty() {
                continue;
            }
            let Some(runner) = self.runners().into_iter().find(|r| r.name() == world.name) else {
                continue;
            };

            let mut content = WorldDescription::new(world.name.clone());
            for uri in &world.includes {
                match self.fetch_include(uri) {
                    Ok(entity) => content.entities.push(entity),
                    Err(err) => error!(world = %world.name, uri, error = %err, "failed to include resource"),
                }
            }
            runner.attach_world(&content);
            runner.set_fetched_all_includes(true);
        }
    }

    fn fetch_include(&self, uri: &str) -> Result<EntityDescription, ServerError> {
        let location = if fetch::is_remote(uri) {
            self.fetcher.fetch(uri)?
        } else {
            self.resource_paths
                .read()
                .find_file(uri)
                .ok_or_else(|| ServerError::WorldNotFound(uri.to_string()))?
        };
        let path = fetch::description_file(&location)?;
        let text = std::fs::read_to_string(&path).map_err(|source| ServerError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ServerError::Include { path, source })
    }
}
