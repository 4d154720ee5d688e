//! # demo_world
//!
//! Runs the demo plugins in a server. Without a file argument the built-in
//! arm-and-ball scene is used.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use components::{JointPosition, Pose};
use sim_component::components::Name;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sim_server::{Server, ServerConfig};

/// Run the demo world.
#[derive(Debug, Parser)]
#[command(name = "demo_world", about)]
struct Cli {
    /// World file to load instead of the built-in scene.
    file: Option<String>,

    /// Number of iterations to run.
    #[arg(long, default_value_t = 2000)]
    iterations: u64,

    /// Update rate in Hz; omitted runs at the worlds' real-time factor.
    #[arg(short = 'z', long)]
    rate: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("demo_world=info".parse()?)
                .add_directive("demo_systems=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::new().with_loader(demo_systems::loader());
    config = match &cli.file {
        Some(file) => config.with_file(file.clone()),
        None => config.with_description(demo_systems::demo_scene()),
    };
    if let Some(rate) = cli.rate {
        config = config.with_update_rate(rate);
    }

    let server = Server::new(config);
    if !server.wait_until_ready(100, Duration::from_millis(50)) {
        bail!("no worlds were loaded");
    }

    info!(worlds = ?server.world_names(), iterations = cli.iterations, "running demo");
    if !server.run(true, cli.iterations, false) {
        bail!("server refused to run");
    }

    let runner = server.runner(0).context("world 0 disappeared")?;
    runner.with_ecm(|ecm| {
        for (joint, position) in ecm.each::<JointPosition>() {
            let name = ecm.component::<Name>(joint).map(Name::as_str).unwrap_or("?");
            info!(joint = name, position = ?position.0, "final joint position");
        }
        for (model, pose) in ecm.each::<Pose>() {
            let name = ecm.component::<Name>(model).map(Name::as_str).unwrap_or("?");
            info!(model = name, position = %pose.position, "final pose");
        }
    });
    info!(
        iterations = server.iteration_count(0).unwrap_or_default(),
        sim_time_s = server.sim_time(0).unwrap_or_default().as_secs_f64(),
        "demo finished"
    );
    Ok(())
}
