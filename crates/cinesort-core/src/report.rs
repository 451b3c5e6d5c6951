use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::model::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    Processed,
    Duplicate,
    Skipped,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Processed => "processed",
            Outcome::Duplicate => "duplicate",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub source: PathBuf,
    pub category: Category,
    pub outcome: Outcome,
    /// Failure or skip reason, empty otherwise.
    pub reason: String,
    /// Archive links created (or that would be, in a dry run).
    pub links: Vec<PathBuf>,
}

/// End-of-run summary returned by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub dry_run: bool,
    pub discovered: usize,
    pub processed: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
    pub per_category: BTreeMap<Category, usize>,
    /// Set when the run stopped early, with the reason.
    pub aborted: Option<String>,
    pub provider_degraded: bool,
    pub probe_degraded: bool,
    pub discover_duration: Duration,
    pub hash_duration: Duration,
    pub total_duration: Duration,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        RunReport {
            dry_run,
            ..Default::default()
        }
    }

    pub fn record(
        &mut self,
        source: &Path,
        category: Category,
        outcome: Outcome,
        reason: impl Into<String>,
        links: Vec<PathBuf>,
    ) {
        match outcome {
            Outcome::Processed => {
                self.processed += 1;
                *self.per_category.entry(category).or_insert(0) += 1;
            }
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
        self.files.push(FileReport {
            source: source.to_path_buf(),
            category,
            outcome,
            reason: reason.into(),
            links,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.outcome == Outcome::Failed)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// One row per file: source, category, outcome, reason, links.
    pub fn write_csv(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["source", "category", "outcome", "reason", "links"])?;
        for file in &self.files {
            let links = file
                .links
                .iter()
                .map(|l| l.display().to_string())
                .collect::<Vec<_>>()
                .join(" | ");
            wtr.write_record([
                file.source.display().to_string(),
                file.category.to_string(),
                file.outcome.to_string(),
                file.reason.clone(),
                links,
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}
