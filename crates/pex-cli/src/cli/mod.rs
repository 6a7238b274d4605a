//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pex_core::{config, logging};

mod commands;

#[derive(Parser)]
#[command(name = "pex")]
#[command(version = "0.1")]
#[command(about = "Build shell pipelines interactively with live output from every stage")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Files to read as the pipeline input (default: stdin)
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Write debug logs to this file (filtered by RUST_LOG)
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Maximum number of panes shown side by side (overrides config)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    panes: Option<u16>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Held until exit so buffered log lines are flushed.
    let _log_guard = cli.log.as_deref().map(logging::init).transpose()?;

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    let result = rt.block_on(async move { dispatch(cli).await });
    // A read parked on stdin would otherwise hold up runtime shutdown.
    rt.shutdown_background();
    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        command,
        files,
        log: _,
        panes,
    } = cli;

    if let Some(Commands::Config { command }) = command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        };
    }

    let mut config = config::Config::load().context("load config")?;
    if let Some(panes) = panes {
        config.max_panes = usize::from(panes);
    }

    commands::view::run(&files, config).await
}
