//! # leakprobe
//!
//! Runs memory-leak profiling scenarios against containerized applications
//! on remote devices.
//!
//! ## Commands
//!
//! - `run`: Run every selected scenario and write the consolidated report
//! - `list`: Show the devices and scenarios a config describes
//! - `discover`: Find the target container and its managed processes
//! - `check`: Connect to a device and print system information
//!
//! ## Example
//!
//! ```bash
//! # See what would run
//! leakprobe run --config lab.toml --dry-run
//!
//! # Run one scenario on one device
//! leakprobe run --config lab.toml --device router-1 --scenario ui-valgrind
//!
//! # Inspect a device before writing scenarios for it
//! leakprobe discover --config lab.toml --device router-1
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use probe_runner::{Config, RunFilter};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{check, discover, list, run};

/// Memory-leak test runner for containerized device software.
#[derive(Parser, Debug)]
#[command(name = "leakprobe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scenarios and write the consolidated report
    Run {
        /// Run description (TOML)
        #[arg(long, short)]
        config: PathBuf,

        /// Only run this device
        #[arg(long, short)]
        device: Option<String>,

        /// Only run this scenario of the selected device
        #[arg(long, short, requires = "device")]
        scenario: Option<String>,

        /// Print the plan without connecting to anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List devices and scenarios
    List {
        /// Run description (TOML)
        #[arg(long, short)]
        config: PathBuf,
    },

    /// Find target containers and their managed processes
    Discover {
        /// Run description (TOML)
        #[arg(long, short)]
        config: PathBuf,

        /// Only this device
        #[arg(long, short)]
        device: Option<String>,
    },

    /// Connect to a device and print system information
    Check {
        /// Run description (TOML)
        #[arg(long, short)]
        config: PathBuf,

        /// Device to check
        #[arg(long, short)]
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Run {
            config,
            device,
            scenario,
            dry_run,
        } => {
            let settings = load_config(&config)?;
            let filter = RunFilter { device, scenario };
            if dry_run {
                run::dry_run(settings, &filter)?;
            } else {
                run::run(settings, &config, &filter, interrupt_token()).await?;
            }
        }
        Commands::List { config } => {
            list::run(&load_config(&config)?);
        }
        Commands::Discover { config, device } => {
            discover::run(load_config(&config)?, device.as_deref(), interrupt_token()).await?;
        }
        Commands::Check { config, device } => {
            check::run(load_config(&config)?, &device, interrupt_token()).await?;
        }
    }

    Ok(())
}

/// Log to stderr so command output on stdout stays clean.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config {}", path.display()))
}

/// Token cancelled by the first Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling; cleanup still runs");
            trigger.cancel();
        }
    });
    cancel
}
