//! Battle runner binary for the Lockstep kernel.
//!
//! Reads a battle package, runs it on the naval content and writes the
//! battle outcome, or verifies a recorded replay against a fresh run.
//!
//! # Startup Sequence
//!
//! 1. Parse the command line
//! 2. Load configuration (`config/lockstep.yaml` unless `--config` is given)
//! 3. Initialize structured logging (tracing)
//! 4. Read the battle package
//! 5. Create operator state and install the Ctrl-C handler
//! 6. Run the battle (or verify the replay)
//! 7. Log the result

mod battle;
mod callback;
mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lockstep_core::config::KernelConfig;
use lockstep_core::operator::OperatorState;
use lockstep_persist::ReplayVerdict;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

const DEFAULT_CONFIG: &str = "config/lockstep.yaml";

#[derive(Parser)]
#[command(name = "lockstep-engine", version, about = "Deterministic naval battle runner")]
struct Cli {
    /// Kernel configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a battle package and write its outcome.
    Run {
        /// Battle package (JSON).
        package: PathBuf,
        /// Outcome file (default: next to the saves).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Replay log (default: from the configuration).
        #[arg(long)]
        replay: Option<PathBuf>,
    },
    /// Replay a recorded battle and check every state hash.
    Verify {
        /// Battle package (JSON) the replay was recorded from.
        package: PathBuf,
        /// Replay log to check.
        replay: PathBuf,
        /// Start from this save instead of tick 0.
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse the command line.
    let cli = Cli::parse();

    // 2. Load configuration.
    let config = load_config(cli.config.as_deref())?;

    // 3. Initialize structured logging.
    init_logging(&config);
    info!(
        root_seed = config.simulation.root_seed,
        parallel = config.scheduler.parallel,
        phases = config.phases.len(),
        snapshot_dir = %config.persistence.snapshot_dir.display(),
        "lockstep-engine starting"
    );

    match cli.command {
        Command::Run {
            package,
            out,
            replay,
        } => run(&config, &package, out, replay).await,
        Command::Verify {
            package,
            replay,
            save,
        } => verify(&config, &package, &replay, save.as_deref()),
    }
}

async fn run(
    config: &KernelConfig,
    package_path: &Path,
    out: Option<PathBuf>,
    replay: Option<PathBuf>,
) -> anyhow::Result<()> {
    // 4. Read the battle package.
    let package = battle::read_package(package_path)?;
    let outcome_path = out.unwrap_or_else(|| battle::default_outcome_path(config, &package));
    let replay_log = replay.unwrap_or_else(|| config.persistence.replay_log.clone());

    // 5. Operator state; Ctrl-C requests a clean stop between frames.
    let operator = Arc::new(OperatorState::new(
        config.simulation.tick_interval_ms,
        battle::tick_limit(config, &package),
    ));
    let signal_operator = Arc::clone(&operator);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping after the current frame");
                signal_operator.request_stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
    info!(
        max_ticks = operator.max_ticks(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Operator state initialized"
    );

    // 6. Run the battle.
    let outcome = battle::run_battle(config, &package, &replay_log, &outcome_path, &operator)
        .await
        .with_context(|| format!("battle {} failed", package.name))?;

    // 7. Log the result.
    info!(
        battle = %outcome.name,
        ticks = outcome.ticks,
        winner = outcome.winner.as_deref().unwrap_or("none"),
        final_hash = %outcome.replay.final_hash,
        "lockstep-engine shutdown complete"
    );
    Ok(())
}

fn verify(
    config: &KernelConfig,
    package_path: &Path,
    replay_log: &Path,
    save: Option<&Path>,
) -> anyhow::Result<()> {
    let package = battle::read_package(package_path)?;
    match battle::verify_battle(config, &package, replay_log, save)? {
        ReplayVerdict::Verified { frames, final_hash } => {
            info!(
                frames,
                final_hash = final_hash.map(|h| h.to_hex()).as_deref().unwrap_or("none"),
                "Replay reproduced every frame"
            );
            Ok(())
        }
        ReplayVerdict::Diverged(divergence) => {
            error!(
                tick = divergence.tick,
                expected = %divergence.expected,
                actual = %divergence.actual,
                "Replay diverged"
            );
            anyhow::bail!("replay diverged at tick {}", divergence.tick)
        }
    }
}

/// Load configuration from `path`, or from [`DEFAULT_CONFIG`] when it
/// exists. Without a file the defaults apply, with the phases the naval
/// content is declared in.
fn load_config(path: Option<&Path>) -> Result<KernelConfig, EngineError> {
    if let Some(path) = path {
        return Ok(KernelConfig::from_file(path)?);
    }
    let default_path = Path::new(DEFAULT_CONFIG);
    if default_path.exists() {
        Ok(KernelConfig::from_file(default_path)?)
    } else {
        let mut config = KernelConfig::parse("")?;
        config.phases = lockstep_content::phases();
        Ok(config)
    }
}

/// Install the tracing subscriber: `RUST_LOG` wins over the configured
/// level, JSON lines when configured.
fn init_logging(config: &KernelConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
