//! The [`System`] trait and its capability flags.

use sim_component::{Entity, EntityComponentManager};

use crate::config::PluginConfig;
use crate::info::UpdateInfo;

/// Errors raised by system callbacks.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// The plugin's configuration block is malformed.
    #[error("invalid plugin configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// A precondition checked during `configure` does not hold.
    #[error("configuration rejected: {0}")]
    Rejected(String),

    /// The entity the plugin was attached to is missing or of the wrong kind.
    #[error("invalid attachment entity {0}")]
    InvalidEntity(Entity),

    /// No factory is registered under this plugin name.
    #[error("unknown plugin [{0}]")]
    UnknownPlugin(String),

    /// A per-step callback failed.
    #[error("{0}")]
    Failed(String),

    /// A callback panicked; the payload message is preserved.
    #[error("panicked: {0}")]
    Panicked(String),
}

/// One of the scheduler's invocation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// One-time setup after load.
    Configure,
    /// First per-step phase.
    PreUpdate,
    /// Second per-step phase.
    Update,
    /// Third, read-only per-step phase.
    PostUpdate,
    /// World rewind / reinitialisation.
    Reset,
}

impl Phase {
    /// Lower-case phase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::PreUpdate => "pre_update",
            Self::Update => "update",
            Self::PostUpdate => "post_update",
            Self::Reset => "reset",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which callbacks a system implements.
///
/// Read once when the system is added; a phase whose flag is clear is never
/// called for that system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Implements [`System::configure`].
    pub configure: bool,
    /// Implements [`System::pre_update`].
    pub pre_update: bool,
    /// Implements [`System::update`].
    pub update: bool,
    /// Implements [`System::post_update`].
    pub post_update: bool,
    /// Implements [`System::reset`].
    pub reset: bool,
}

impl Capabilities {
    /// No capabilities.
    pub const NONE: Self = Self {
        configure: false,
        pre_update: false,
        update: false,
        post_update: false,
        reset: false,
    };

    /// Add [`Phase::Configure`].
    #[must_use]
    pub const fn with_configure(mut self) -> Self {
        self.configure = true;
        self
    }

    /// Add [`Phase::PreUpdate`].
    #[must_use]
    pub const fn with_pre_update(mut self) -> Self {
        self.pre_update = true;
        self
    }

    /// Add [`Phase::Update`].
    #[must_use]
    pub const fn with_update(mut self) -> Self {
        self.update = true;
        self
    }

    /// Add [`Phase::PostUpdate`].
    #[must_use]
    pub const fn with_post_update(mut self) -> Self {
        self.post_update = true;
        self
    }

    /// Add [`Phase::Reset`].
    #[must_use]
    pub const fn with_reset(mut self) -> Self {
        self.reset = true;
        self
    }

    /// Returns `true` if the given phase is implemented.
    #[must_use]
    pub const fn has(self, phase: Phase) -> bool {
        match phase {
            Phase::Configure => self.configure,
            Phase::PreUpdate => self.pre_update,
            Phase::Update => self.update,
            Phase::PostUpdate => self.post_update,
            Phase::Reset => self.reset,
        }
    }
}

/// A behavior plugin bound to one world.
///
/// Persistent simulation state belongs in components; a system may keep
/// private bookkeeping such as cached entity handles. Only the callbacks named
/// by [`System::capabilities`] are ever invoked.
pub trait System: Send {
    /// Name used in logs. Defaults to the Rust type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// The callbacks this system implements.
    fn capabilities(&self) -> Capabilities;

    /// Called once after load with the entity the plugin is attached to and
    /// its configuration block.
    ///
    /// # Errors
    ///
    /// An error rejects the system; it is not registered.
    fn configure(
        &mut self,
        _entity: Entity,
        _config: &PluginConfig,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        Ok(())
    }

    /// First per-step callback. Commands written here are visible to every
    /// system's [`System::update`] in the same step.
    ///
    /// # Errors
    ///
    /// Errors are logged; other systems still run.
    fn pre_update(
        &mut self,
        _info: &UpdateInfo,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        Ok(())
    }

    /// Second per-step callback.
    ///
    /// # Errors
    ///
    /// Errors are logged; other systems still run.
    fn update(
        &mut self,
        _info: &UpdateInfo,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        Ok(())
    }

    /// Last per-step callback, with read-only access to the store.
    ///
    /// # Errors
    ///
    /// Errors are logged; other systems still run.
    fn post_update(
        &mut self,
        _info: &UpdateInfo,
        _ecm: &EntityComponentManager,
    ) -> Result<(), SystemError> {
        Ok(())
    }

    /// Called when the world is reset to its initial state.
    ///
    /// # Errors
    ///
    /// Errors are logged; other systems still reset.
    fn reset(
        &mut self,
        _info: &UpdateInfo,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_builders() {
        let caps = Capabilities::NONE.with_pre_update().with_reset();
        assert!(caps.has(Phase::PreUpdate));
        assert!(caps.has(Phase::Reset));
        assert!(!caps.has(Phase::Update));
        assert!(!caps.has(Phase::Configure));
        assert_eq!(Capabilities::default(), Capabilities::NONE);
    }

    #[test]
    fn test_default_name_is_type_name() {
        struct Idle;
        impl System for Idle {
            fn capabilities(&self) -> Capabilities {
                Capabilities::NONE
            }
        }
        assert!(Idle.name().ends_with("Idle"));
    }
}
