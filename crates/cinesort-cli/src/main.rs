mod commands;
mod logging;
mod progress;
mod prompter;

use std::io::{self, Write};
use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use cinesort_core::linker::prune_broken_links;
use cinesort_core::pipeline::hash_counts;
use cinesort_core::prompt::{AutoPolicy, AutoPrompter, Prompter};
use cinesort_core::storage::{MetadataCache, RunState, SqliteHashStore, SqliteMetadataCache};
use cinesort_core::{AppConfig, FileAge, Pipeline, RunOptions, RunReport};
use colored::*;
use commands::{AutoMode, Cli, Commands, ProcessArgs};
use dotenv::dotenv;
use progress::CliReporter;
use prompter::TerminalPrompter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match cinesort_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Process(process_args)) => run_process(config, &process_args),
        Some(Commands::PruneLinks { dry_run }) => run_prune(&config, dry_run),
        Some(Commands::Stats) => run_stats(&config),
        Some(Commands::ClearCache { provider }) => run_clear_cache(&config, provider.as_deref()),
        Some(Commands::PrintConfig) => config
            .to_toml_string()
            .map(|text| println!("{}", text))
            .map_err(anyhow::Error::from),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run_process(config: AppConfig, args: &ProcessArgs) -> anyhow::Result<()> {
    let file_age = match (args.days, args.since_last_run) {
        (Some(days), _) => FileAge::Days(days),
        (None, true) => FileAge::SinceLastRun,
        (None, false) => FileAge::All,
    };
    let options = RunOptions {
        dry_run: args.dry_run,
        force: args.force,
        file_age,
    };
    config.validate(options.dry_run)?;

    let prompter: Box<dyn Prompter> = match args.auto {
        Some(AutoMode::Skip) => Box::new(AutoPrompter::new(AutoPolicy::SkipAmbiguous)),
        Some(AutoMode::PickTop) => Box::new(AutoPrompter::new(AutoPolicy::PickTop)),
        None => Box::new(TerminalPrompter::new()),
    };

    let mut pipeline = Pipeline::new(config, options).with_prompter(prompter);
    let reporter = CliReporter::new();
    let report = pipeline.run(&reporter)?;

    print_summary(&report);

    if let Some(path) = &args.report {
        report
            .write_csv(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if let Some(reason) = &report.aborted {
        anyhow::bail!("run stopped early: {}", reason);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!();
    if report.dry_run {
        println!("{}", "Dry run, nothing was linked or recorded".yellow());
    }
    info!(
        "Discover: {}, Hash: {}, Total: {}",
        format!("{:.2}s", report.discover_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.hash_duration.as_secs_f64()).green(),
        format!("{:.2}s", report.total_duration.as_secs_f64()).green(),
    );
    info!(
        "{} discovered, {} processed, {} duplicates, {} skipped, {} failed",
        format!("{}", report.discovered).cyan(),
        format!("{}", report.processed).green(),
        format!("{}", report.duplicates).yellow(),
        format!("{}", report.skipped).yellow(),
        format!("{}", report.failed).red(),
    );
    for (category, count) in &report.per_category {
        info!("  {}: {}", category.dir_name(), count);
    }
    if report.provider_degraded {
        warn!("Catalog was unreachable, only cached answers were used");
    }
    if report.probe_degraded {
        warn!("Technical probe unavailable, filename tags were used");
    }
    for failure in report.failures() {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.source.display(),
            failure.reason
        );
    }
}

fn run_prune(config: &AppConfig, dry_run: bool) -> anyhow::Result<()> {
    let removed = prune_broken_links(&config.archive_dir, dry_run)?;
    for link in &removed {
        println!("  {}", link.display());
    }
    if dry_run {
        info!("{} broken links found", removed.len());
    } else {
        info!("{} broken links removed", removed.len());
    }
    Ok(())
}

fn run_stats(config: &AppConfig) -> anyhow::Result<()> {
    let mut store = SqliteHashStore::open(&config.state_dir);
    for (category, count) in hash_counts(&mut store)? {
        println!(
            "{:<20} {}",
            category.dir_name(),
            format!("{}", count).cyan()
        );
    }

    let mut cache = SqliteMetadataCache::open(&config.cache_db_path());
    println!("{:<20} {}", "cached responses", format!("{}", cache.len()).cyan());

    let last_run = RunState::open(&config.cache_db_path())?.last_run()?;
    match last_run {
        Some(at) => println!("{:<20} {}", "last run", at.to_rfc3339()),
        None => println!("{:<20} {}", "last run", "never".dimmed()),
    }
    Ok(())
}

fn run_clear_cache(config: &AppConfig, provider: Option<&str>) -> anyhow::Result<()> {
    let prompt = match provider {
        Some(name) => format!("Delete every cached {} response?", name),
        None => "Delete the whole metadata cache?".to_string(),
    };
    if !prompt_confirm(&prompt, Some(false))? {
        return Ok(());
    }
    let mut cache = SqliteMetadataCache::open(&config.cache_db_path());
    let removed = cache.clear(provider)?;
    println!("{} cached responses deleted", removed);
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
