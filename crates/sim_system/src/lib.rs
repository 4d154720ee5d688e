//! # sim_system
//!
//! Behavior plugins ("systems") and the scheduler that invokes them.
//!
//! A system implements any subset of five capabilities: `configure` (once,
//! after load), `pre_update`, `update`, `post_update` (every step, in that
//! order) and `reset`. The [`SystemManager`] records which capabilities each
//! system declared when it is added, so unimplemented phases cost nothing at
//! step time.
//!
//! ## Usage
//!
//! ```rust
//! use sim_component::EntityComponentManager;
//! use sim_system::{Capabilities, System, SystemError, SystemManager, UpdateInfo};
//!
//! struct Counter(u64);
//!
//! impl System for Counter {
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::NONE.with_update()
//!     }
//!
//!     fn update(
//!         &mut self,
//!         _info: &UpdateInfo,
//!         _ecm: &mut EntityComponentManager,
//!     ) -> Result<(), SystemError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! let mut ecm = EntityComponentManager::new();
//! let mut systems = SystemManager::new();
//! let world = ecm.create_entity();
//! systems
//!     .add(Box::new(Counter(0)), world, &Default::default(), &mut ecm)
//!     .unwrap();
//! systems.run_step(&UpdateInfo::default(), &mut ecm);
//! ```

pub mod config;
pub mod info;
pub mod loader;
pub mod manager;
pub mod system;

pub use config::PluginConfig;
pub use info::UpdateInfo;
pub use loader::{SystemFactory, SystemLoader};
pub use manager::{StepReport, SystemManager};
pub use system::{Capabilities, Phase, System, SystemError};
