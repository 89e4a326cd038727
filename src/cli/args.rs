//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// predex - cache for pre-dexed Android libraries
///
/// Runs dx once per library and reuses the output across parallel tasks
/// and across builds.
#[derive(Parser, Debug)]
#[command(name = "predex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PREDEX_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pre-dex libraries, reusing cached output
    Dex(DexArgs),

    /// Inspect or maintain the cache store
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the dex command
#[derive(Parser, Debug)]
pub struct DexArgs {
    /// Libraries to pre-dex
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory receiving the dexed output
    #[arg(short, long)]
    pub out_dir: PathBuf,

    /// Produce a directory of dex files per library
    #[arg(long)]
    pub multi_dex: bool,

    /// Force jumbo mode (overrides config)
    #[arg(long)]
    pub jumbo: bool,

    /// Parallel dex tasks (default: number of CPUs)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Do not read or write the store file for this run
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List stored entries
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Drop entries whose library or outputs changed or disappeared
    Prune {
        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete the store file
    Clear,

    /// Show the store file path
    Path,
}
