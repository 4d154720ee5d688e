//! # sim_server
//!
//! The host controller. A [`Server`] resolves a world source into one
//! [`sim_world::WorldRunner`] per world, owns the blocking and non-blocking
//! run contract, and forwards per-world commands to runners by index.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sim_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::new().with_file("shapes.json");
//! let server = Server::new(config);
//! server.run(true, 100, false);
//! assert_eq!(server.iteration_count(0), Some(100));
//! ```
//!
//! Every per-world accessor takes a world index (`0` is the first world) and
//! returns `None` when the index is out of range.

pub mod config;
pub mod error;
pub mod fetch;
pub mod resources;
pub mod server;
pub mod signal;

pub use config::{ServerConfig, WorldSource};
pub use error::ServerError;
pub use fetch::{CacheFetcher, ResourceFetcher};
pub use resources::{RESOURCE_PATH_ENV, ResourcePaths, WORLD_INSTALL_DIR};
pub use server::{DEFAULT_WORLD_NAME, Server};
pub use signal::SignalHandler;
