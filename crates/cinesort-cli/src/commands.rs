use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cinesort")]
#[command(about = "Sort loosely named videos into a symlinked genre archive", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Discover, resolve and link new videos from the search directory
    Process(ProcessArgs),
    /// Remove dangling symlinks from the archive
    PruneLinks {
        /// List broken links without removing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show recorded hashes per category, cache size and last run
    Stats,
    /// Delete cached provider responses
    ClearCache {
        /// Only clear one provider (tmdb or tvdb)
        #[arg(long)]
        provider: Option<String>,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Run the whole pipeline without linking or recording anything
    #[arg(long)]
    pub dry_run: bool,

    /// Process files again even when their content is already known
    #[arg(long)]
    pub force: bool,

    /// Only files changed in the last N days
    #[arg(long, conflicts_with = "since_last_run")]
    pub days: Option<f64>,

    /// Only files changed since the last completed run
    #[arg(long)]
    pub since_last_run: bool,

    /// Never prompt: settle ambiguous files with this policy
    #[arg(long, value_enum)]
    pub auto: Option<AutoMode>,

    /// Write one CSV row per file to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AutoMode {
    /// Leave ambiguous files for the next run
    Skip,
    /// Take the best ranked candidate
    PickTop,
}
