//! predex - pre-dex cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use predex::cli::{Cli, Commands};
use predex::config::ConfigManager;
use predex::error::PredexResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> PredexResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load()?;

    // 0 = warn, 1 = info (cache hit/miss totals), 2+ = debug
    let verbosity = cli.verbose.max(u8::from(config.general.verbose));
    let filter = match verbosity {
        0 => EnvFilter::new("predex=warn"),
        1 => EnvFilter::new("predex=info"),
        _ => EnvFilter::new("predex=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    match cli.command {
        Commands::Dex(args) => predex::cli::commands::dex(args, &config),
        Commands::Cache(args) => predex::cli::commands::cache(args, &config),
        Commands::Config(args) => predex::cli::commands::config(args, &config, &config_manager),
    }
}
