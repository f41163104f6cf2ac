use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use auroc_supervisor::checkpoint::{CheckpointPaths, SupervisorState};
use auroc_supervisor::config::{AppConfig, Phase};

/// Inspect and validate AUROC supervisor configuration and training state.
#[derive(Parser)]
#[command(name = "auroc-supervisor", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the default configuration as TOML
    DefaultConfig,

    /// Load and validate a configuration file
    CheckConfig {
        /// Path to TOML configuration file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// Training set size, used to resolve `auto` step counts
        #[arg(long)]
        train_samples: Option<usize>,

        /// Validation set size, used to resolve `auto` step counts
        #[arg(long)]
        validation_samples: Option<usize>,
    },

    /// Show the best-model snapshot and audit log for a run
    Status {
        /// Path to TOML configuration file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Command::DefaultConfig => {
            print!("{}", AppConfig::default_toml());
            Ok(())
        }
        Command::CheckConfig {
            config,
            train_samples,
            validation_samples,
        } => check_config(config, train_samples, validation_samples),
        Command::Status { config } => status(config),
    }
}

fn check_config(
    path: PathBuf,
    train_samples: Option<usize>,
    validation_samples: Option<usize>,
) -> Result<()> {
    let config = AppConfig::load(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;

    let batch_size = config.train.batch_size;
    let train = config.train_steps()?;
    let validation = config.validation_steps()?;

    println!("config ok: {}", path.display());
    println!("  classes:            {}", config.supervisor.class_names.len());
    println!("  epochs:             {}", config.train.epochs);
    println!("  batch size:         {batch_size}");
    match train_samples {
        Some(n) => println!("  train steps:        {}", train.steps_for(n, batch_size)),
        None => println!("  train steps:        {train}"),
    }
    match validation_samples {
        Some(n) => println!("  validation steps:   {}", validation.steps_for(n, batch_size)),
        None => println!("  validation steps:   {validation}"),
    }
    println!(
        "  progress verbosity: train={} test={}",
        config.progress_verbosity(Phase::Train),
        config.progress_verbosity(Phase::Test)
    );
    println!("  resume mode:        {}", config.is_resume_mode());
    println!(
        "  periodic checkpoint: {}",
        if config.checkpoint.enabled {
            config.periodic_checkpoint().filepath
        } else {
            "disabled".to_string()
        }
    );
    Ok(())
}

fn status(path: PathBuf) -> Result<()> {
    let config = AppConfig::load(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    let paths = CheckpointPaths::from_weights_path(&config.weights_path())?;

    println!("resume mode: {}", config.is_resume_mode());

    if paths.stats.exists() {
        let state = SupervisorState::load(&paths.stats)?;
        println!("best mean auroc: {}", state.best_mean_auroc);
        println!("learning rate:   {}", state.lr);
        for (key, value) in &state.extra {
            println!("{key}: {value}");
        }
    } else {
        println!("no training stats at {}", paths.stats.display());
    }

    if paths.audit_log.exists() {
        let log = fs::read_to_string(&paths.audit_log)
            .with_context(|| format!("reading {}", paths.audit_log.display()))?;
        println!("improvements ({}):", paths.audit_log.display());
        for line in log.lines() {
            println!("  {line}");
        }
    }
    if paths.best_weights.exists() {
        println!("best weights: {}", paths.best_weights.display());
    }
    Ok(())
}
