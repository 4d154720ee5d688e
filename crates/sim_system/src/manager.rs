//! System scheduler: registration and the fixed per-step phase order.
//!
//! The manager keeps systems in registration order and, for every phase, the
//! list of systems that implement it. A step runs three passes:
//!
//! 1. `pre_update` on every pre-update system, in registration order.
//! 2. `update` on every update system, in registration order.
//! 3. `post_update` on every post-update system, in registration order.
//!
//! Each pass finishes for all systems before the next begins. A callback that
//! returns an error or panics is logged and skipped; the rest of the pass
//! still runs.

use std::panic::{self, AssertUnwindSafe};

use sim_component::{Entity, EntityComponentManager};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::PluginConfig;
use crate::info::UpdateInfo;
use crate::system::{Capabilities, Phase, System, SystemError};

/// A system that has been configured and registered.
pub struct LoadedSystem {
    /// Unique instance identifier.
    pub id: Uuid,
    /// Name used in logs.
    pub name: String,
    /// The entity the system is attached to.
    pub entity: Entity,
    /// Capabilities captured at registration.
    pub capabilities: Capabilities,
    system: Box<dyn System>,
}

impl std::fmt::Debug for LoadedSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSystem")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Outcome of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Callbacks invoked.
    pub invoked: usize,
    /// Callbacks that failed or panicked.
    pub failed: usize,
}

impl StepReport {
    fn record(&mut self, ok: bool) {
        self.invoked += 1;
        if !ok {
            self.failed += 1;
        }
    }
}

/// Registered systems plus per-phase dispatch lists.
#[derive(Debug, Default)]
pub struct SystemManager {
    systems: Vec<LoadedSystem>,
    pre_update: Vec<usize>,
    update: Vec<usize>,
    post_update: Vec<usize>,
    reset: Vec<usize>,
    failures: u64,
}

impl SystemManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `system` against `entity` and register it.
    ///
    /// # Errors
    ///
    /// Returns the configure error (or panic) if configuration fails; the
    /// system is dropped and not registered.
    pub fn add(
        &mut self,
        mut system: Box<dyn System>,
        entity: Entity,
        config: &PluginConfig,
        ecm: &mut EntityComponentManager,
    ) -> Result<Uuid, SystemError> {
        let capabilities = system.capabilities();
        let name = system.name().to_string();

        if capabilities.configure {
            guarded(|| system.configure(entity, config, ecm)).inspect_err(|err| {
                error!(system = %name, %entity, error = %err, "failed to configure system");
            })?;
        }

        let id = Uuid::new_v4();
        let index = self.systems.len();
        self.systems.push(LoadedSystem {
            id,
            name: name.clone(),
            entity,
            capabilities,
            system,
        });
        self.index(index);

        info!(system = %name, %entity, count = self.systems.len(), "registered system");
        Ok(id)
    }

    /// Remove every system with the given name. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.systems.len();
        self.systems.retain(|s| s.name != name);
        let removed = before - self.systems.len();
        if removed > 0 {
            self.rebuild_indices();
            info!(system = name, removed, "removed system");
        }
        removed
    }

    /// Number of registered systems.
    #[must_use]
    pub fn count(&self) -> usize {
        self.systems.len()
    }

    /// Registered systems in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &LoadedSystem> {
        self.systems.iter()
    }

    /// Number of systems that take part in `phase`.
    #[must_use]
    pub fn phase_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Configure => self.systems.iter().filter(|s| s.capabilities.configure).count(),
            Phase::PreUpdate => self.pre_update.len(),
            Phase::Update => self.update.len(),
            Phase::PostUpdate => self.post_update.len(),
            Phase::Reset => self.reset.len(),
        }
    }

    /// Total callback failures since the manager was created.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures
    }

    /// Run one step: pre-update, update, then post-update.
    pub fn run_step(&mut self, info: &UpdateInfo, ecm: &mut EntityComponentManager) -> StepReport {
        let mut report = StepReport::default();

        for &i in &self.pre_update {
            let sys = &mut self.systems[i];
            let result = guarded(|| sys.system.pre_update(info, ecm));
            report.record(report_outcome(sys, Phase::PreUpdate, result));
        }

        for &i in &self.update {
            let sys = &mut self.systems[i];
            let result = guarded(|| sys.system.update(info, ecm));
            report.record(report_outcome(sys, Phase::Update, result));
        }

        let ecm: &EntityComponentManager = ecm;
        for &i in &self.post_update {
            let sys = &mut self.systems[i];
            let result = guarded(|| sys.system.post_update(info, ecm));
            report.record(report_outcome(sys, Phase::PostUpdate, result));
        }

        self.failures += report.failed as u64;
        debug!(
            iteration = info.iterations,
            invoked = report.invoked,
            failed = report.failed,
            "scheduler step complete"
        );
        report
    }

    /// Call `reset` on every system that implements it.
    pub fn reset(&mut self, info: &UpdateInfo, ecm: &mut EntityComponentManager) -> StepReport {
        let mut report = StepReport::default();
        for &i in &self.reset {
            let sys = &mut self.systems[i];
            let result = guarded(|| sys.system.reset(info, ecm));
            report.record(report_outcome(sys, Phase::Reset, result));
        }
        self.failures += report.failed as u64;
        report
    }

    fn index(&mut self, i: usize) {
        let caps = self.systems[i].capabilities;
        if caps.pre_update {
            self.pre_update.push(i);
        }
        if caps.update {
            self.update.push(i);
        }
        if caps.post_update {
            self.post_update.push(i);
        }
        if caps.reset {
            self.reset.push(i);
        }
    }

    fn rebuild_indices(&mut self) {
        self.pre_update.clear();
        self.update.clear();
        self.post_update.clear();
        self.reset.clear();
        for i in 0..self.systems.len() {
            self.index(i);
        }
    }
}

/// Run a callback, turning a panic into [`SystemError::Panicked`].
fn guarded<F>(f: F) -> Result<(), SystemError>
where
    F: FnOnce() -> Result<(), SystemError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(SystemError::Panicked(message))
        }
    }
}

fn report_outcome(sys: &LoadedSystem, phase: Phase, result: Result<(), SystemError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            error!(system = %sys.name, %phase, error = %err, "system callback failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use sim_component::Component;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Command(u64);

    impl Component for Command {
        fn type_name() -> &'static str {
            "Command"
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every callback it receives.
    struct Probe {
        label: &'static str,
        caps: Capabilities,
        log: Log,
        fail_update: bool,
    }

    impl Probe {
        fn boxed(label: &'static str, caps: Capabilities, log: &Log) -> Box<dyn System> {
            Box::new(Self {
                label,
                caps,
                log: Arc::clone(log),
                fail_update: false,
            })
        }

        fn push(&self, phase: Phase) {
            self.log.lock().unwrap().push(format!("{}:{}", self.label, phase));
        }
    }

    impl System for Probe {
        fn name(&self) -> &str {
            self.label
        }

        fn capabilities(&self) -> Capabilities {
            self.caps
        }

        fn pre_update(&mut self, _: &UpdateInfo, _: &mut EntityComponentManager) -> Result<(), SystemError> {
            self.push(Phase::PreUpdate);
            Ok(())
        }

        fn update(&mut self, _: &UpdateInfo, _: &mut EntityComponentManager) -> Result<(), SystemError> {
            self.push(Phase::Update);
            if self.fail_update {
                return Err(SystemError::Failed("boom".into()));
            }
            Ok(())
        }

        fn post_update(&mut self, _: &UpdateInfo, _: &EntityComponentManager) -> Result<(), SystemError> {
            self.push(Phase::PostUpdate);
            Ok(())
        }

        fn reset(&mut self, _: &UpdateInfo, _: &mut EntityComponentManager) -> Result<(), SystemError> {
            self.push(Phase::Reset);
            Ok(())
        }
    }

    /// Writes a command in pre-update.
    struct Writer(Entity);

    impl System for Writer {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE.with_pre_update()
        }

        fn pre_update(&mut self, info: &UpdateInfo, ecm: &mut EntityComponentManager) -> Result<(), SystemError> {
            ecm.set_component(self.0, Command(info.iterations));
            Ok(())
        }
    }

    /// Consumes the command in update.
    struct Reader {
        entity: Entity,
        seen: Arc<Mutex<Vec<Option<u64>>>>,
    }

    impl System for Reader {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE.with_update()
        }

        fn update(&mut self, _: &UpdateInfo, ecm: &mut EntityComponentManager) -> Result<(), SystemError> {
            let cmd = ecm.remove_component::<Command>(self.entity).map(|c| c.0);
            self.seen.lock().unwrap().push(cmd);
            Ok(())
        }
    }

    struct Panicker;

    impl System for Panicker {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE.with_update()
        }

        fn update(&mut self, _: &UpdateInfo, _: &mut EntityComponentManager) -> Result<(), SystemError> {
            panic!("plugin bug");
        }
    }

    struct Picky;

    impl System for Picky {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE.with_configure().with_update()
        }

        fn configure(
            &mut self,
            entity: Entity,
            _: &PluginConfig,
            ecm: &mut EntityComponentManager,
        ) -> Result<(), SystemError> {
            if ecm.has_entity(entity) {
                Ok(())
            } else {
                Err(SystemError::InvalidEntity(entity))
            }
        }
    }

    fn setup() -> (EntityComponentManager, Entity, SystemManager) {
        let mut ecm = EntityComponentManager::new();
        let world = ecm.create_entity();
        (ecm, world, SystemManager::new())
    }

    #[test]
    fn test_phases_run_in_fixed_order() {
        let (mut ecm, world, mut mgr) = setup();
        let log = Log::default();
        let all = Capabilities::NONE.with_pre_update().with_update().with_post_update();
        mgr.add(Probe::boxed("a", all, &log), world, &PluginConfig::default(), &mut ecm).unwrap();
        mgr.add(Probe::boxed("b", all, &log), world, &PluginConfig::default(), &mut ecm).unwrap();

        mgr.run_step(&UpdateInfo::default(), &mut ecm);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:pre_update", "b:pre_update", "a:update", "b:update", "a:post_update",
                "b:post_update"
            ]
        );
    }

    #[test]
    fn test_update_only_system_skips_other_phases() {
        let (mut ecm, world, mut mgr) = setup();
        let log = Log::default();
        mgr.add(Probe::boxed("u", Capabilities::NONE.with_update(), &log), world, &PluginConfig::default(), &mut ecm)
            .unwrap();
        mgr.run_step(&UpdateInfo::default(), &mut ecm);
        mgr.reset(&UpdateInfo::default(), &mut ecm);
        assert_eq!(*log.lock().unwrap(), vec!["u:update"]);
        assert_eq!(mgr.phase_count(Phase::PreUpdate), 0);
        assert_eq!(mgr.phase_count(Phase::Update), 1);
    }

    #[test]
    fn test_pre_update_write_visible_in_update() {
        let (mut ecm, world, mut mgr) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        mgr.add(Box::new(Writer(world)), world, &PluginConfig::default(), &mut ecm).unwrap();
        mgr.add(
            Box::new(Reader { entity: world, seen: Arc::clone(&seen) }),
            world,
            &PluginConfig::default(),
            &mut ecm,
        )
        .unwrap();

        for i in 0..3 {
            let info = UpdateInfo { iterations: i, ..Default::default() };
            mgr.run_step(&info, &mut ecm);
        }
        assert_eq!(*seen.lock().unwrap(), vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_failing_update_does_not_stop_others() {
        let (mut ecm, world, mut mgr) = setup();
        let log = Log::default();
        let all = Capabilities::NONE.with_update().with_post_update();
        let failing = Box::new(Probe {
            label: "bad",
            caps: all,
            log: Arc::clone(&log),
            fail_update: true,
        });
        mgr.add(failing, world, &PluginConfig::default(), &mut ecm).unwrap();
        mgr.add(Box::new(Panicker), world, &PluginConfig::default(), &mut ecm).unwrap();
        mgr.add(Probe::boxed("good", all, &log), world, &PluginConfig::default(), &mut ecm).unwrap();

        let report = mgr.run_step(&UpdateInfo::default(), &mut ecm);
        assert_eq!(report.failed, 2);
        assert_eq!(mgr.failure_count(), 2);
        let log = log.lock().unwrap();
        assert!(log.contains(&"good:update".to_string()));
        assert!(log.contains(&"good:post_update".to_string()));
        assert!(log.contains(&"bad:post_update".to_string()));
    }

    #[test]
    fn test_configure_failure_rejects_system() {
        let (mut ecm, _world, mut mgr) = setup();
        let result = mgr.add(Box::new(Picky), Entity(42), &PluginConfig::default(), &mut ecm);
        assert!(matches!(result, Err(SystemError::InvalidEntity(Entity(42)))));
        assert_eq!(mgr.count(), 0);
    }

    #[test]
    fn test_remove_by_name_rebuilds_dispatch() {
        let (mut ecm, world, mut mgr) = setup();
        let log = Log::default();
        let caps = Capabilities::NONE.with_update();
        mgr.add(Probe::boxed("a", caps, &log), world, &PluginConfig::default(), &mut ecm).unwrap();
        mgr.add(Probe::boxed("b", caps, &log), world, &PluginConfig::default(), &mut ecm).unwrap();
        assert_eq!(mgr.remove("a"), 1);
        assert_eq!(mgr.remove("missing"), 0);
        mgr.run_step(&UpdateInfo::default(), &mut ecm);
        assert_eq!(*log.lock().unwrap(), vec!["b:update"]);
        assert_eq!(mgr.count(), 1);
    }
}
