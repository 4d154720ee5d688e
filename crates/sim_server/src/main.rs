//! # sim_server
//!
//! Command-line host for the simulation.
//!
//! ```text
//! sim_server [OPTIONS] [FILE]
//! ```
//!
//! Loads `FILE` (or the built-in empty world), then runs every world on the
//! calling thread until the iteration budget is spent or Ctrl-C is pressed.
//! Without `-r` the worlds start paused.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sim_server::{Server, ServerConfig};

/// Run a simulation server.
#[derive(Debug, Parser)]
#[command(name = "sim_server", version, about)]
struct Cli {
    /// World file, resource-path-relative name, or http(s) URI.
    file: Option<String>,

    /// Start running immediately instead of paused.
    #[arg(short = 'r', long)]
    run: bool,

    /// Update rate in Hz. Overrides each world's real-time factor.
    #[arg(short = 'z', long)]
    rate: Option<f64>,

    /// Number of iterations to run; 0 runs until interrupted.
    #[arg(long, default_value_t = 0)]
    iterations: u64,

    /// Fetch world includes on a background thread.
    #[arg(long)]
    download_in_parallel: bool,

    /// Extra resource search directories.
    #[arg(long = "resource-path", value_name = "DIR")]
    resource_paths: Vec<PathBuf>,

    /// Directory fetched resources are cached in.
    #[arg(long, value_name = "DIR")]
    resource_cache: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sim_server=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::new()
        .with_download_in_parallel(cli.download_in_parallel)
        .with_resource_paths(cli.resource_paths.iter().cloned());
    if let Some(file) = &cli.file {
        config = config.with_file(file.clone());
    }
    if let Some(rate) = cli.rate {
        config = config.with_update_rate(rate);
    }
    if let Some(cache) = &cli.resource_cache {
        config = config.with_resource_cache(cache.clone());
    }

    let server = Server::new(config);
    serve(&server, &cli)
}

/// Wait for the worlds, then run them to completion on this thread.
fn serve(server: &Server, cli: &Cli) -> Result<()> {
    if cli.download_in_parallel {
        if !server.wait_until_ready(600, Duration::from_millis(100)) {
            bail!("worlds did not finish downloading");
        }
    } else if server.world_count() == 0 {
        bail!("no worlds were loaded");
    }

    info!(worlds = ?server.world_names(), paused = !cli.run, "simulation server starting");
    if !server.run(true, cli.iterations, !cli.run) {
        bail!("the server refused to run");
    }

    for (index, name) in server.world_names().iter().enumerate() {
        info!(
            world = %name,
            iterations = server.iteration_count(index).unwrap_or_default(),
            "world finished"
        );
    }
    Ok(())
}
