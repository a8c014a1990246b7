//! hydro-sim - command-line driver for the water-exchange simulator
//!
//! Runs a JSON-configured scenario or a generated random topology and
//! prints the run summary as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hydro_simulator_core_rs::topology::{random_topology, RandomTopologyConfig};
use hydro_simulator_core_rs::{
    ExecutionMode, HostId, Orchestrator, OrchestratorConfig, PhysicsConfig, RunSummary,
};

#[derive(Parser)]
#[command(
    name = "hydro-sim",
    about = "Distributed water-exchange simulation with asynchronous element clocks",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write the final state snapshot to this file
    #[arg(long, global = true)]
    checkpoint: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and run a random topology
    Random {
        /// Number of elements
        #[arg(short = 'n', long, default_value = "100")]
        size: usize,

        #[arg(short, long, default_value = "12345")]
        seed: u64,

        /// Simulation end time
        #[arg(short, long, default_value = "1000")]
        end: f64,

        #[arg(long, default_value = "1")]
        hosts: usize,

        /// Run each host on its own thread
        #[arg(long)]
        threaded: bool,

        /// Spacing of global sync points
        #[arg(long)]
        sync_interval: Option<f64>,

        /// Move one element to another host every N ticks
        #[arg(long)]
        migrate_every: Option<u64>,

        #[arg(long, default_value = "100000")]
        max_ticks: u64,
    },

    /// Run an OrchestratorConfig from a JSON file
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let (mut orchestrator, migrate_every) = match cli.command {
        Commands::Random {
            size,
            seed,
            end,
            hosts,
            threaded,
            sync_interval,
            migrate_every,
            max_ticks,
        } => {
            let topology = random_topology(&RandomTopologyConfig {
                num_elements: size,
                seed,
                ..Default::default()
            })?;
            let config = OrchestratorConfig {
                simulation_end_time: end,
                sync_interval,
                num_hosts: hosts,
                execution: if threaded {
                    ExecutionMode::Threaded
                } else {
                    ExecutionMode::Inline
                },
                violation_policy: None,
                max_ticks: Some(max_ticks),
                topology,
                physics: PhysicsConfig::Random {
                    seed,
                    max_rate: 1.0,
                    min_duration: 1.0,
                    max_duration: 10.0,
                },
            };
            (Orchestrator::new(config)?, migrate_every)
        }
        Commands::Run { config } => {
            let raw = fs::read_to_string(&config)
                .with_context(|| format!("reading {}", config.display()))?;
            let config: OrchestratorConfig = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", config.display()))?;
            (Orchestrator::new(config)?, None)
        }
    };

    let summary = match migrate_every {
        Some(every) if every > 0 && orchestrator.num_hosts() > 1 => {
            run_with_migration(&mut orchestrator, every)?
        }
        _ => orchestrator.run()?,
    };

    if let Some(path) = &cli.checkpoint {
        write_checkpoint(&mut orchestrator, path)?;
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.mass_balance.is_conserved() {
        bail!(
            "mass not conserved (discrepancy {})",
            summary.mass_balance.discrepancy()
        );
    }
    Ok(())
}

/// Tick to convergence, moving one element round-robin every `every` ticks
fn run_with_migration(orchestrator: &mut Orchestrator, every: u64) -> anyhow::Result<RunSummary> {
    let ids: Vec<_> = orchestrator.directory().iter().map(|(id, _)| id).collect();
    let num_hosts = orchestrator.num_hosts();
    let limit = orchestrator.config().max_ticks;
    let mut cursor = 0usize;

    while !orchestrator.is_converged() {
        let tick = orchestrator.current_tick();
        if limit.is_some_and(|limit| tick >= limit) {
            bail!(
                "no convergence after {} ticks; blocked: {:?}",
                tick,
                orchestrator.blocked_elements()
            );
        }
        if tick > 0 && tick % every == 0 && !ids.is_empty() {
            let id = ids[cursor % ids.len()];
            cursor += 1;
            if let Some(from) = orchestrator.directory().host_of(id) {
                orchestrator.migrate(id, HostId((from.0 + 1) % num_hosts))?;
            }
        }
        orchestrator.tick()?;
    }
    Ok(orchestrator.summary()?)
}

fn write_checkpoint(orchestrator: &mut Orchestrator, path: &Path) -> anyhow::Result<()> {
    let state = orchestrator.save_state()?;
    fs::write(path, state).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "checkpoint written");
    Ok(())
}
