// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! tsload CLI
//!
//! Replicates observation rows into a time-series store, one window per cycle.
//!
//! # Usage
//!
//! ```bash
//! # Run until Ctrl+C
//! tsload --config tsload.toml
//!
//! # Run a single cycle
//! tsload --config tsload.toml --once
//!
//! # Show stored checkpoints
//! tsload --config tsload.toml status
//!
//! # Write an example configuration
//! tsload gen-config --output tsload.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tsload::{CheckpointStore, Loader, LoaderConfig, Scheduler, SqliteCheckpointStore};

/// tsload - incremental observation loader
#[derive(Parser, Debug)]
#[command(name = "tsload")]
#[command(about = "Incremental checkpointed loader into time-series stores")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "tsload.toml")]
    config: PathBuf,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print stored checkpoints
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "tsload.toml")]
        output: PathBuf,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        init_logging(args.log_level.as_deref().unwrap_or("info"));
        return match cmd {
            Commands::Status { json } => cmd_status(&args.config, json),
            Commands::Validate => cmd_validate(&args.config),
            Commands::GenConfig { output } => cmd_gen_config(output),
        };
    }

    let config = LoaderConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    init_logging(args.log_level.as_deref().unwrap_or(&config.loader.log_level));

    let loader = Loader::from_config(&config)?;

    tracing::info!("tsload v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Source: {}", config.source.path.display());
    tracing::info!("  Checkpoints: {}", config.checkpoint_path().display());
    tracing::info!("  Destination: {}", loader.sink().describe());
    for job in loader.jobs() {
        tracing::info!("  Job: {} -> {}", job.table, job.entity);
    }

    let mut scheduler = Scheduler::new(loader, config.interval())
        .with_max_idle_interval(config.max_idle_interval());

    if args.once {
        let reports = scheduler.run_once()?;
        for r in &reports {
            println!(
                "{} {}: {} rows, {} points, {} discarded, {} partial errors",
                r.table, r.window, r.rows, r.kept, r.discarded, r.partial_errors
            );
        }
        return Ok(());
    }

    let shutdown = scheduler.shutdown_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown requested");
        shutdown.trigger();
    })
    .context("Failed to install Ctrl+C handler")?;

    let stats = scheduler.run()?;
    let sink = scheduler.loader().sink().stats();
    println!("\nFinal Statistics:");
    println!("  Cycles:         {}", stats.cycles);
    println!("  Rows seen:      {}", stats.rows_seen);
    println!("  Points written: {}", stats.points_written);
    println!("  Discarded:      {}", stats.rows_discarded);
    println!("  Pushes:         {}", sink.pushes);
    println!("  Partial errors: {}", sink.partial_errors);

    Ok(())
}

fn cmd_status(config_path: &Path, json: bool) -> Result<()> {
    let config = LoaderConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let store = SqliteCheckpointStore::open(config.checkpoint_path(), config.checkpoint.schema())?;
    let checkpoints = store.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!("No checkpoints stored in {}", config.checkpoint_path().display());
        return Ok(());
    }

    println!("{:<32} {:>16} {:>10}", "TABLE", "LAST ID", "INCREMENT");
    for cp in &checkpoints {
        println!("{:<32} {:>16} {:>10}", cp.table, cp.last_id, cp.increment_size);
    }
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    match LoaderConfig::from_file(config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Source: {}", config.source.path.display());
            println!("Destination: {:?}", config.destination.kind);
            println!("Jobs: {}", config.jobs.len());
            for (i, job) in config.jobs.iter().enumerate() {
                println!(
                    "  [{}] {} -> {} (increment {})",
                    i, job.table, job.entity, job.increment_size
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_gen_config(output: PathBuf) -> Result<()> {
    std::fs::write(&output, tsload::config::EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Example configuration written to {}", output.display());
    Ok(())
}
