use ahash::AHashSet;
use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

use crate::classifier::classify;
use crate::config::{AppConfig, FileAge, RunOptions};
use crate::error::Error;
use crate::hasher;
use crate::linker::{create_link, remove_link};
use crate::model::{Category, ContentHash, MediaKind, Video};
use crate::placement::{LinkAction, PlacementEngine, PlacementOutcome};
use crate::probe::{FfprobeProbe, ProbeError, TechnicalProbe};
use crate::progress::{CancelFlag, ProgressReporter};
use crate::prompt::{AutoPrompter, Prompter};
use crate::provider::{MetadataProvider, OfflineProvider};
use crate::report::{Outcome, RunReport};
use crate::resolver::{range_confirmed, Resolution, Resolver, ResolverSettings};
use crate::scanner::{self, DiscoveredFile};
use crate::storage::{
    HashStore, MemoryHashStore, MemoryMetadataCache, MetadataCache, RunState, SqliteHashStore,
    SqliteMetadataCache,
};

/// Drives every discovered file through
/// discover → hash → duplicate check → classify → resolve → probe → place → link → record.
///
/// Only hashing runs in parallel. Everything after it is single-threaded so
/// that one file's cache writes and links are visible to the next.
pub struct Pipeline {
    config: AppConfig,
    options: RunOptions,
    hash_store: Box<dyn HashStore>,
    cache: Box<dyn MetadataCache>,
    provider: Box<dyn MetadataProvider>,
    probe: Box<dyn TechnicalProbe>,
    prompter: Box<dyn Prompter>,
    run_state: Option<RunState>,
    cancel: CancelFlag,
}

/// State that lives for one run only.
struct RunContext {
    resolver: Resolver,
    placement: PlacementEngine,
    seen: AHashSet<(Category, ContentHash)>,
    probe_down: bool,
}

struct FileResult {
    outcome: Outcome,
    reason: String,
    links: Vec<PathBuf>,
}

impl FileResult {
    fn new(outcome: Outcome, reason: impl Into<String>) -> Self {
        FileResult {
            outcome,
            reason: reason.into(),
            links: Vec::new(),
        }
    }
}

impl Pipeline {
    /// Default collaborators: SQLite stores under `state_dir`, no catalog
    /// client, `ffprobe`, and a prompter that skips ambiguous files.
    /// A dry run against a missing state directory uses in-memory stores.
    pub fn new(config: AppConfig, options: RunOptions) -> Self {
        let ephemeral = options.dry_run && !config.state_dir.is_dir();
        let (hash_store, cache, run_state): (Box<dyn HashStore>, Box<dyn MetadataCache>, _) =
            if ephemeral {
                debug!("State directory missing, dry run uses in-memory stores");
                (
                    Box::new(MemoryHashStore::new()),
                    Box::new(MemoryMetadataCache::new()),
                    None,
                )
            } else {
                let run_state = match RunState::open(&config.cache_db_path()) {
                    Ok(state) => Some(state),
                    Err(e) => {
                        warn!("Run state unavailable: {}", e);
                        None
                    }
                };
                (
                    Box::new(SqliteHashStore::open(&config.state_dir)),
                    Box::new(SqliteMetadataCache::open(&config.cache_db_path())),
                    run_state,
                )
            };

        Pipeline {
            config,
            options,
            hash_store,
            cache,
            provider: Box::new(OfflineProvider),
            probe: Box::new(FfprobeProbe::default()),
            prompter: Box::new(AutoPrompter::default()),
            run_state,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_hash_store(mut self, store: Box<dyn HashStore>) -> Self {
        self.hash_store = store;
        self
    }

    pub fn with_cache(mut self, cache: Box<dyn MetadataCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_provider(mut self, provider: Box<dyn MetadataProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn TechnicalProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_run_state(mut self, run_state: Option<RunState>) -> Self {
        self.run_state = run_state;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn hash_store(&mut self) -> &mut dyn HashStore {
        self.hash_store.as_mut()
    }

    pub fn cache(&mut self) -> &mut dyn MetadataCache {
        self.cache.as_mut()
    }

    /// Process every file under the search directory.
    ///
    /// Per-file problems end up in the report. The report is also returned
    /// when the operator aborts or the run is cancelled, with `aborted` set.
    /// Only discovery and worker-pool failures are returned as errors.
    pub fn run(&mut self, reporter: &dyn ProgressReporter) -> Result<RunReport, Error> {
        let started_at = Utc::now();
        let run_start = Instant::now();
        let mut report = RunReport::new(self.options.dry_run);
        if self.options.dry_run {
            info!("Dry run: nothing will be linked or recorded");
        }
        if self.options.force {
            info!("Force mode: known files are processed again");
        }

        info!("Discovering videos in {}", self.config.search_dir.display());
        let discover_start = Instant::now();
        let modified_after = self.modified_after()?;
        let files = scanner::discover_videos(&self.config, modified_after)?;
        report.discover_duration = discover_start.elapsed();
        report.discovered = files.len();
        reporter.on_discover_complete(files.len(), report.discover_duration.as_secs_f64());
        info!("{} videos to process", files.len());

        let hash_start = Instant::now();
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let mut hashes = match hasher::hash_files(
            &paths,
            self.config.parallel_hash_threshold,
            self.config.hash_workers,
            &self.cancel,
            reporter,
        ) {
            Ok(hashes) => hashes,
            Err(Error::Cancelled) => {
                warn!("Run cancelled during hashing, nothing was recorded");
                report.aborted = Some(Error::Cancelled.to_string());
                report.total_duration = run_start.elapsed();
                return Ok(report);
            }
            Err(e) => return Err(e),
        };
        report.hash_duration = hash_start.elapsed();
        reporter.on_hash_complete(paths.len(), report.hash_duration.as_secs_f64());

        let mut ctx = RunContext {
            resolver: Resolver::new(ResolverSettings {
                auto_accept_score: self.config.auto_accept_score,
                ambiguity_margin: self.config.ambiguity_margin,
                year_tolerance: self.config.year_tolerance,
            }),
            placement: PlacementEngine::from_config(&self.config),
            seen: AHashSet::new(),
            probe_down: false,
        };

        let total = files.len();
        for (index, file) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Run cancelled after {} of {} files", index, total);
                report.aborted = Some(Error::Cancelled.to_string());
                break;
            }
            reporter.on_file_start(index, total, &file.path);

            let hash = hashes
                .remove(&file.path)
                .unwrap_or_else(|| Err("no hash computed".to_string()));
            match self.process_file(file, hash, &mut ctx) {
                Ok(result) => {
                    debug!("{}: {} {}", file.path.display(), result.outcome, result.reason);
                    report.record(&file.path, file.category, result.outcome, result.reason, result.links);
                }
                Err(e) if e.is_run_fatal() => {
                    error!("Stopping run at {}: {}", file.path.display(), e);
                    report.aborted = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    error!("Failed {}: {}", file.path.display(), e);
                    report.record(&file.path, file.category, Outcome::Failed, e.to_string(), Vec::new());
                }
            }
            reporter.on_file_complete(index, total);
        }

        if let Err(e) = self.hash_store.flush() {
            warn!("Hash store flush failed: {}", e);
        }
        if !self.options.dry_run && !report.is_aborted() {
            if let Some(state) = &self.run_state {
                if let Err(e) = state.set_last_run(started_at) {
                    warn!("Could not save run time: {}", e);
                }
            }
        }

        report.provider_degraded = ctx.resolver.provider_down();
        report.probe_degraded = ctx.probe_down;
        report.total_duration = run_start.elapsed();
        info!(
            "Run finished: {} processed, {} duplicates, {} skipped, {} failed",
            report.processed, report.duplicates, report.skipped, report.failed
        );
        Ok(report)
    }

    fn modified_after(&self) -> Result<Option<SystemTime>, Error> {
        match self.options.file_age {
            FileAge::All => Ok(None),
            FileAge::Days(days) => {
                let window = Duration::from_secs_f64((days * 86_400.0).max(0.0));
                Ok(SystemTime::now().checked_sub(window))
            }
            FileAge::SinceLastRun => {
                let last_run = match &self.run_state {
                    Some(state) => state.last_run()?,
                    None => None,
                };
                if last_run.is_none() {
                    info!("No previous run recorded, processing every file");
                }
                Ok(last_run.map(SystemTime::from))
            }
        }
    }

    fn process_file(
        &mut self,
        file: &DiscoveredFile,
        hash: Result<ContentHash, String>,
        ctx: &mut RunContext,
    ) -> Result<FileResult, Error> {
        let hash = match hash {
            Ok(hash) => hash,
            Err(reason) => return Ok(FileResult::new(Outcome::Failed, reason)),
        };
        let mut video = Video::new(&file.path, file.category);
        video.content_hash = Some(hash.clone());
        let key = (file.category, hash.clone());

        if !self.options.force {
            if ctx.seen.contains(&key) {
                return Ok(FileResult::new(Outcome::Duplicate, "same content earlier in this run"));
            }
            if self.hash_store.is_known(file.category, &hash)? {
                info!("Duplicate skipped: {}", video.file_name());
                return Ok(FileResult::new(Outcome::Duplicate, "already processed"));
            }
        }

        let file_name = video.file_name();
        let guess = classify(&file_name, Some(file.category));
        video.apply_guess(&guess);

        let metadata = match ctx.resolver.resolve(
            &guess,
            &file_name,
            self.provider.as_mut(),
            self.cache.as_mut(),
            self.prompter.as_mut(),
        )? {
            Resolution::Resolved { metadata, .. } => metadata,
            Resolution::Skipped => {
                return Ok(FileResult::new(Outcome::Skipped, "no match selected"));
            }
        };
        video.apply_resolution(&metadata);
        if !video.is_resolved() {
            return Ok(FileResult::new(Outcome::Skipped, "resolved title is empty"));
        }

        if video.media_kind == MediaKind::Series {
            self.attach_episodes(&mut video, ctx);
        }
        self.probe_technical(&mut video, ctx);

        let placement = match ctx.placement.place(&video, self.prompter.as_mut())? {
            PlacementOutcome::Placed(placement) => placement,
            PlacementOutcome::Skipped(reason) => {
                return Ok(FileResult::new(Outcome::Skipped, reason));
            }
        };
        if let Some(first) = placement.entries.first() {
            video.renamed_filename = Some(first.renamed_filename.clone());
            video.symlink_path = Some(first.link_path.clone());
        }
        video.destination_path = Some(placement.directory.clone());
        let links: Vec<PathBuf> = placement.entries.iter().map(|e| e.link_path.clone()).collect();

        if self.options.dry_run {
            for entry in &placement.entries {
                info!(
                    "SIMULATION - link {} -> {}",
                    entry.link_path.display(),
                    file.path.display()
                );
            }
            ctx.seen.insert(key);
            return Ok(FileResult {
                outcome: Outcome::Processed,
                reason: String::new(),
                links,
            });
        }

        for entry in &placement.entries {
            match entry.action {
                LinkAction::Create => {
                    create_link(video.source_path(), &entry.link_path, false)?;
                }
                LinkAction::Replace => {
                    create_link(video.source_path(), &entry.link_path, true)?;
                }
                LinkAction::AlreadyLinked => {
                    debug!("{} already in place", entry.link_path.display());
                }
            }
            if let Some(old) = &entry.retire {
                if let Err(e) = remove_link(old) {
                    warn!("Could not remove replaced entry {}: {}", old.display(), e);
                }
            }
        }
        info!("Placed {} -> {}", file_name, placement.directory.display());

        self.hash_store.record(file.category, &hash, video.source_path())?;
        ctx.seen.insert(key);
        Ok(FileResult {
            outcome: Outcome::Processed,
            reason: String::new(),
            links,
        })
    }

    fn attach_episodes(&mut self, video: &mut Video, ctx: &mut RunContext) {
        let (Some(series_id), Some(season)) = (video.provider_id.clone(), video.effective_season()) else {
            return;
        };
        let titles = ctx.resolver.episode_titles(
            &series_id,
            season,
            self.provider.as_mut(),
            self.cache.as_mut(),
        );
        if let Some(span) = video.episodes {
            video.range_confirmed = range_confirmed(span, &titles);
            if span.is_range() && !video.range_confirmed {
                debug!("Episode range of {} not confirmed, kept as one entry", video.file_name());
            }
        }
        video.episode_titles = titles;
    }

    /// Fill technical tags the filename did not give. Without a probe, the
    /// filename tags are used as they are.
    fn probe_technical(&mut self, video: &mut Video, ctx: &mut RunContext) {
        if video.technical.is_complete() || ctx.probe_down {
            return;
        }
        match self.probe.inspect(video.source_path()) {
            Ok(info) => video.technical.fill_missing(info),
            Err(ProbeError::Unavailable(reason)) => {
                warn!("{}. Using filename tags only", Error::ProbeUnavailable(reason));
                ctx.probe_down = true;
            }
            Err(ProbeError::Failed(reason)) => {
                warn!("Could not inspect {}: {}", video.file_name(), reason);
            }
        }
    }
}

/// Counts of recorded hashes per category.
pub fn hash_counts(store: &mut dyn HashStore) -> Result<Vec<(Category, usize)>, Error> {
    Category::ALL
        .iter()
        .map(|category| Ok((*category, store.count(*category)?)))
        .collect()
}

