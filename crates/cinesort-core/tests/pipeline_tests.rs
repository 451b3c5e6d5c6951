#![cfg(unix)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::{tempdir, TempDir};

use cinesort_core::model::Candidate;
use cinesort_core::probe::NoProbe;
use cinesort_core::prompt::{
    AmbiguityReason, AutoPolicy, AutoPrompter, Choice, Decision, DisambiguationRequest, Prompter,
};
use cinesort_core::provider::{MetadataProvider, ProviderError};
use cinesort_core::storage::{HashStore, RunState, SqliteHashStore, SqliteMetadataCache};
use cinesort_core::text::comparable;
use cinesort_core::{
    AppConfig, CancelFlag, Category, FileAge, Outcome, Pipeline, RunOptions, RunReport,
    SilentReporter,
};

const AMELIE_FILE: &str = "Le.Fabuleux.Destin.d.Amelie.Poulain.2001.1080p.FRENCH.x264.mkv";

fn candidate(id: &str, title: &str, year: u16, genre_ids: &[u32]) -> Candidate {
    Candidate {
        id: id.to_string(),
        title: title.to_string(),
        original_title: None,
        year: Some(year),
        genre_ids: genre_ids.to_vec(),
    }
}

/// In-memory catalog. Matches on the normalised title and counts every call.
#[derive(Clone, Default)]
struct Catalog {
    movies: Vec<Candidate>,
    series: Vec<Candidate>,
    episodes: Vec<String>,
    calls: Rc<Cell<usize>>,
}

impl Catalog {
    fn with_movies(movies: Vec<Candidate>) -> Self {
        Catalog {
            movies,
            ..Catalog::default()
        }
    }

    fn matching(list: &[Candidate], title: &str) -> Vec<Candidate> {
        let wanted = comparable(title);
        list.iter()
            .filter(|c| comparable(&c.title) == wanted)
            .cloned()
            .collect()
    }
}

impl MetadataProvider for Catalog {
    fn search_movie(&mut self, title: &str, _year: Option<u16>) -> Result<Vec<Candidate>, ProviderError> {
        self.calls.set(self.calls.get() + 1);
        Ok(Self::matching(&self.movies, title))
    }

    fn search_series(&mut self, title: &str) -> Result<Vec<Candidate>, ProviderError> {
        self.calls.set(self.calls.get() + 1);
        Ok(Self::matching(&self.series, title))
    }

    fn episode_titles(&mut self, _series_id: &str, _season: u16) -> Result<Vec<String>, ProviderError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.episodes.clone())
    }
}

/// Answers from a script and keeps a log of what was asked.
#[derive(Default)]
struct ScriptedPrompter {
    choices: VecDeque<Choice>,
    decisions: VecDeque<Decision>,
    asked: Rc<RefCell<Vec<AmbiguityReason>>>,
    similar: Rc<Cell<usize>>,
}

impl Prompter for ScriptedPrompter {
    fn disambiguate(&mut self, request: &DisambiguationRequest<'_>) -> Choice {
        self.asked.borrow_mut().push(request.reason);
        self.choices.pop_front().unwrap_or(Choice::Skip)
    }

    fn confirm_similar(&mut self, _new_file: &Path, _existing: &Path) -> Decision {
        self.similar.set(self.similar.get() + 1);
        self.decisions.pop_front().unwrap_or(Decision::KeepBoth)
    }
}

struct Fixture {
    _tmp: TempDir,
    config: AppConfig,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempdir().unwrap();
        let config = AppConfig {
            search_dir: tmp.path().join("incoming"),
            archive_dir: tmp.path().join("archive"),
            state_dir: tmp.path().join("state"),
            ..AppConfig::default()
        };
        fs::create_dir_all(&config.search_dir).unwrap();
        config.validate(false).unwrap();
        Fixture { _tmp: tmp, config }
    }

    fn add_video(&self, category: Category, name: &str, content: &str) -> PathBuf {
        let path = self.config.search_dir.join(category.dir_name()).join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn run(&self, options: RunOptions, catalog: &Catalog, prompter: Box<dyn Prompter>) -> RunReport {
        let mut pipeline = Pipeline::new(self.config.clone(), options)
            .with_provider(Box::new(catalog.clone()))
            .with_probe(Box::new(NoProbe))
            .with_prompter(prompter);
        pipeline.run(&SilentReporter).unwrap()
    }

    fn run_default(&self, catalog: &Catalog) -> RunReport {
        self.run(RunOptions::default(), catalog, Box::new(ScriptedPrompter::default()))
    }

    fn archive(&self) -> &Path {
        &self.config.archive_dir
    }

    fn links(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_links(self.archive(), self.archive(), &mut found);
        found.sort();
        found
    }

    fn recorded(&self, category: Category) -> usize {
        let mut pipeline = Pipeline::new(self.config.clone(), RunOptions::default());
        pipeline.hash_store().count(category).unwrap()
    }
}

fn collect_links(root: &Path, dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).unwrap();
        if meta.file_type().is_symlink() {
            found.push(path.strip_prefix(root).unwrap().to_path_buf());
        } else if meta.is_dir() {
            collect_links(root, &path, found);
        }
    }
}

fn amelie_catalog() -> Catalog {
    Catalog::with_movies(vec![candidate(
        "194",
        "Le Fabuleux Destin d'Amélie Poulain",
        2001,
        &[35, 10749],
    )])
}

#[test]
fn test_film_lands_under_genre_and_band() {
    let fx = Fixture::new();
    let source = fx.add_video(Category::Films, AMELIE_FILE, "amelie");
    let catalog = amelie_catalog();

    let report = fx.run_default(&catalog);

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    let link = fx
        .archive()
        .join("Films/Comédie/F/Le Fabuleux Destin d'Amélie Poulain (2001) FR x264 1080p.mkv");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), fs::canonicalize(&source).unwrap());
    assert_eq!(report.files[0].links, vec![link]);
    assert_eq!(fx.recorded(Category::Films), 1);
}

#[test]
fn test_second_run_reports_duplicates_and_changes_nothing() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, AMELIE_FILE, "amelie");
    fx.add_video(Category::Films, "Heat.1995.FRENCH.1080p.x264.mkv", "heat");
    let catalog = Catalog::with_movies(vec![
        candidate("194", "Le Fabuleux Destin d'Amélie Poulain", 2001, &[35]),
        candidate("949", "Heat", 1995, &[80]),
    ]);

    let first = fx.run_default(&catalog);
    assert_eq!(first.processed, 2);
    let links_after_first = fx.links();
    let calls_after_first = catalog.calls.get();

    let second = fx.run_default(&catalog);
    assert_eq!(second.processed, 0);
    assert_eq!(second.duplicates, 2);
    assert!(second.files.iter().all(|f| f.outcome == Outcome::Duplicate));
    assert_eq!(fx.links(), links_after_first);
    assert_eq!(catalog.calls.get(), calls_after_first);
    assert_eq!(fx.recorded(Category::Films), 2);
}

#[test]
fn test_same_input_gives_same_archive() {
    let first = Fixture::new();
    let second = Fixture::new();
    for fx in [&first, &second] {
        fx.add_video(Category::Films, AMELIE_FILE, "amelie");
        fx.add_video(Category::Films, "nested/Heat (1995) 720p.mkv", "heat");
    }
    let catalog = Catalog::with_movies(vec![
        candidate("194", "Le Fabuleux Destin d'Amélie Poulain", 2001, &[35]),
        candidate("949", "Heat", 1995, &[80]),
    ]);

    first.run_default(&catalog);
    second.run_default(&catalog);

    assert_eq!(first.links().len(), 2);
    assert_eq!(first.links(), second.links());
}

#[test]
fn test_identical_copies_are_linked_once() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, AMELIE_FILE, "same bytes");
    fx.add_video(Category::Films, "copy/Amelie.Copy.2001.mkv", "same bytes");
    let catalog = amelie_catalog();

    let report = fx.run_default(&catalog);

    assert_eq!(report.processed, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(fx.links().len(), 1);
    assert_eq!(fx.recorded(Category::Films), 1);
}

#[test]
fn test_cached_resolution_skips_provider() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, "Heat.1995.FRENCH.1080p.x264.mkv", "heat hd");
    fx.add_video(Category::Films, "Heat.1995.FRENCH.720p.x264.mkv", "heat sd");
    let catalog = Catalog::with_movies(vec![candidate("949", "Heat", 1995, &[80])]);
    let prompter = ScriptedPrompter::default();
    let similar = prompter.similar.clone();

    let report = fx.run(RunOptions::default(), &catalog, Box::new(prompter));

    assert_eq!(report.processed, 2);
    assert_eq!(catalog.calls.get(), 1);
    // The second file sits next to a film with the same title and year.
    assert_eq!(similar.get(), 1);
    assert_eq!(
        fx.links(),
        vec![
            PathBuf::from("Films/Policier/H/Heat (1995) FR x264 1080p.mkv"),
            PathBuf::from("Films/Policier/H/Heat (1995) FR x264 720p.mkv"),
        ]
    );
}

#[test]
fn test_same_name_collision_keeps_existing_link() {
    let fx = Fixture::new();
    let first = fx.add_video(Category::Films, "Heat.1995.FRENCH.1080p.x264.mkv", "heat one");
    let second = fx.add_video(Category::Films, "extra/Heat (1995) FRENCH 1080p x264.mkv", "heat two");
    let catalog = Catalog::with_movies(vec![candidate("949", "Heat", 1995, &[80])]);

    let report = fx.run_default(&catalog);

    assert_eq!(report.processed, 2);
    let base = fx.archive().join("Films/Policier/H/Heat (1995) FR x264 1080p.mkv");
    let variant = fx
        .archive()
        .join("Films/Policier/H/Heat (1995) FR x264 1080p [1080p x264].mkv");
    assert_eq!(fs::read_link(&base).unwrap(), fs::canonicalize(&first).unwrap());
    assert_eq!(fs::read_link(&variant).unwrap(), fs::canonicalize(&second).unwrap());
}

fn heat_catalog() -> Catalog {
    Catalog::with_movies(vec![candidate("949", "Heat", 1995, &[80])])
}

const HEAT_DIR: &str = "Films/Policier/H";

/// Base name and `[res codec]` variant are both linked by a first run.
fn fixture_with_heat_variant() -> (Fixture, PathBuf, PathBuf) {
    let fx = Fixture::new();
    let first = fx.add_video(Category::Films, "Heat.1995.FRENCH.1080p.x264.mkv", "heat one");
    let second = fx.add_video(Category::Films, "extra/Heat (1995) FRENCH 1080p x264.mkv", "heat two");
    let report = fx.run_default(&heat_catalog());
    assert_eq!(report.processed, 2);
    (fx, first, second)
}

fn run_third_heat(fx: &Fixture, decision: Decision) -> (RunReport, PathBuf, usize) {
    let third = fx.add_video(Category::Films, "more/Heat.1995.FRENCH.x264.1080p.mkv", "heat three");
    let prompter = ScriptedPrompter {
        decisions: VecDeque::from([decision]),
        ..ScriptedPrompter::default()
    };
    let similar = prompter.similar.clone();
    let report = fx.run(RunOptions::default(), &heat_catalog(), Box::new(prompter));
    (report, third, similar.get())
}

#[test]
fn test_taken_variant_keep_both_numbers_the_link() {
    let (fx, _, _) = fixture_with_heat_variant();

    let (report, third, asked) = run_third_heat(&fx, Decision::KeepBoth);

    assert_eq!(asked, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(report.duplicates, 2);
    let numbered = fx
        .archive()
        .join(HEAT_DIR)
        .join("Heat (1995) FR x264 1080p (2).mkv");
    assert_eq!(fs::read_link(&numbered).unwrap(), fs::canonicalize(&third).unwrap());
    assert_eq!(fx.links().len(), 3);
    assert_eq!(fx.recorded(Category::Films), 3);
}

#[test]
fn test_taken_variant_skip_leaves_archive_alone() {
    let (fx, _, _) = fixture_with_heat_variant();
    let before = fx.links();

    let (report, _, _) = run_third_heat(&fx, Decision::Skip);

    assert_eq!(report.skipped, 1);
    let skipped = report
        .files
        .iter()
        .find(|f| f.outcome == Outcome::Skipped)
        .unwrap();
    assert!(skipped.links.is_empty());
    assert_eq!(fx.links(), before);
    assert_eq!(fx.recorded(Category::Films), 2);
}

#[test]
fn test_taken_variant_replace_repoints_base_link() {
    let (fx, _, second) = fixture_with_heat_variant();

    let (report, third, _) = run_third_heat(&fx, Decision::Replace);

    assert_eq!(report.processed, 1);
    let base = fx.archive().join(HEAT_DIR).join("Heat (1995) FR x264 1080p.mkv");
    let variant = fx
        .archive()
        .join(HEAT_DIR)
        .join("Heat (1995) FR x264 1080p [1080p x264].mkv");
    assert_eq!(fs::read_link(&base).unwrap(), fs::canonicalize(&third).unwrap());
    assert_eq!(fs::read_link(&variant).unwrap(), fs::canonicalize(&second).unwrap());
    assert_eq!(fx.links().len(), 2);
}

#[test]
fn test_regular_file_is_never_replaced() {
    let fx = Fixture::new();
    let source = fx.add_video(Category::Films, "Heat.1995.FRENCH.1080p.x264.mkv", "heat");
    let dir = fx.archive().join(HEAT_DIR);
    fs::create_dir_all(&dir).unwrap();
    let base = dir.join("Heat (1995) FR x264 1080p.mkv");
    let variant = dir.join("Heat (1995) FR x264 1080p [1080p x264].mkv");
    fs::write(&base, "kept by hand").unwrap();
    fs::write(&variant, "also kept").unwrap();
    let prompter = ScriptedPrompter {
        decisions: VecDeque::from([Decision::Replace]),
        ..ScriptedPrompter::default()
    };

    let report = fx.run(RunOptions::default(), &heat_catalog(), Box::new(prompter));

    assert_eq!(report.processed, 1);
    assert_eq!(fs::read_to_string(&base).unwrap(), "kept by hand");
    assert_eq!(fs::read_to_string(&variant).unwrap(), "also kept");
    let numbered = dir.join("Heat (1995) FR x264 1080p (2).mkv");
    assert_eq!(fs::read_link(&numbered).unwrap(), fs::canonicalize(&source).unwrap());
    assert_eq!(fx.links(), vec![PathBuf::from(HEAT_DIR).join("Heat (1995) FR x264 1080p (2).mkv")]);
}

#[test]
fn test_similar_replace_retires_old_link() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, "Heat.1995.FRENCH.1080p.x264.mkv", "heat hd");
    let sd = fx.add_video(Category::Films, "Heat.1995.FRENCH.720p.x264.mkv", "heat sd");
    let prompter = ScriptedPrompter {
        decisions: VecDeque::from([Decision::Replace]),
        ..ScriptedPrompter::default()
    };
    let similar = prompter.similar.clone();

    let report = fx.run(RunOptions::default(), &heat_catalog(), Box::new(prompter));

    assert_eq!(report.processed, 2);
    assert_eq!(similar.get(), 1);
    let kept = PathBuf::from(HEAT_DIR).join("Heat (1995) FR x264 720p.mkv");
    assert_eq!(fx.links(), vec![kept.clone()]);
    assert_eq!(
        fs::read_link(fx.archive().join(&kept)).unwrap(),
        fs::canonicalize(&sd).unwrap()
    );
    assert_eq!(fx.recorded(Category::Films), 2);
}

#[test]
fn test_broken_hash_store_fails_only_its_category() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, "Heat.1995.FRENCH.1080p.x264.mkv", "heat");
    fx.add_video(Category::Series, "Kaamelott.S01E01.mkv", "episode");
    fs::write(
        SqliteHashStore::store_path(&fx.config.state_dir, Category::Films),
        vec![0x42u8; 4096],
    )
    .unwrap();
    let catalog = Catalog {
        movies: vec![candidate("949", "Heat", 1995, &[80])],
        series: vec![candidate("79175", "Kaamelott", 2005, &[35])],
        episodes: vec!["Heat".to_string()],
        ..Catalog::default()
    };

    let report = fx.run_default(&catalog);

    assert!(!report.is_aborted());
    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 1);
    let failed = report
        .files
        .iter()
        .find(|f| f.outcome == Outcome::Failed)
        .unwrap();
    assert!(failed.source.ends_with("Heat.1995.FRENCH.1080p.x264.mkv"));
    assert_eq!(
        fx.links(),
        vec![PathBuf::from(
            "Séries/Kaamelott (2005)/Saison 01/Kaamelott (2005) - S01E01 - Heat.mkv"
        )]
    );
    assert_eq!(fx.recorded(Category::Series), 1);
}

#[test]
fn test_operator_picks_second_candidate() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, "Heat.1995.FRENCH.1080p.x264.mkv", "heat");
    let catalog = Catalog::with_movies(vec![
        candidate("949", "Heat", 1995, &[80]),
        candidate("950", "Heat", 1995, &[37]),
    ]);
    let prompter = ScriptedPrompter {
        choices: VecDeque::from([Choice::Candidate(1)]),
        ..ScriptedPrompter::default()
    };
    let asked = prompter.asked.clone();

    let report = fx.run(RunOptions::default(), &catalog, Box::new(prompter));

    assert_eq!(report.processed, 1);
    assert_eq!(*asked.borrow(), vec![AmbiguityReason::CloseScores]);
    assert_eq!(
        fx.links(),
        vec![PathBuf::from("Films/Western/H/Heat (1995) FR x264 1080p.mkv")]
    );

    // Forced re-run: the choice comes from the cache and nothing is relinked.
    let again = ScriptedPrompter::default();
    let asked_again = again.asked.clone();
    let forced = RunOptions {
        force: true,
        ..RunOptions::default()
    };
    let report = fx.run(forced, &catalog, Box::new(again));

    assert_eq!(report.processed, 1);
    assert_eq!(report.duplicates, 0);
    assert!(asked_again.borrow().is_empty());
    assert_eq!(catalog.calls.get(), 1);
    assert_eq!(fx.links().len(), 1);
    assert_eq!(fx.recorded(Category::Films), 1);
}

#[test]
fn test_series_episode_gets_title_and_season_folder() {
    let fx = Fixture::new();
    fx.add_video(Category::Series, "Kaamelott.S02E05.MULTi.HEVC-GRP.mkv", "episode");
    let catalog = Catalog {
        series: vec![candidate("79175", "Kaamelott", 2005, &[35])],
        episodes: ["Le Chevalier Mystère", "Le Dialogue de Paix", "Les Tourelles", "La Joute", "Le Sixième Sens"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ..Catalog::default()
    };

    let report = fx.run_default(&catalog);

    assert_eq!(report.processed, 1);
    assert!(report.probe_degraded);
    assert_eq!(
        fx.links(),
        vec![PathBuf::from(
            "Séries/Kaamelott (2005)/Saison 02/Kaamelott (2005) - S02E05 - Le Sixième Sens - MULTi HEVC.mkv"
        )]
    );
    assert_eq!(fx.recorded(Category::Series), 1);
}

#[test]
fn test_dry_run_links_and_records_nothing() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, AMELIE_FILE, "amelie");
    let catalog = amelie_catalog();
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };

    let report = fx.run(options, &catalog, Box::new(ScriptedPrompter::default()));

    assert!(report.dry_run);
    assert_eq!(report.processed, 1);
    assert_eq!(report.files[0].links.len(), 1);
    assert!(fx.links().is_empty());
    assert_eq!(fx.recorded(Category::Films), 0);
    let state = RunState::open(&fx.config.cache_db_path()).unwrap();
    assert_eq!(state.last_run().unwrap(), None);
}

#[test]
fn test_completed_run_saves_last_run() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, AMELIE_FILE, "amelie");

    fx.run_default(&amelie_catalog());

    let state = RunState::open(&fx.config.cache_db_path()).unwrap();
    assert!(state.last_run().unwrap().is_some());

    let options = RunOptions {
        file_age: FileAge::SinceLastRun,
        ..RunOptions::default()
    };
    let report = fx.run(options, &amelie_catalog(), Box::new(ScriptedPrompter::default()));
    assert_eq!(report.discovered, 0);
}

#[test]
fn test_offline_provider_skips_unknown_titles() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, AMELIE_FILE, "amelie");

    let mut pipeline = Pipeline::new(fx.config.clone(), RunOptions::default())
        .with_probe(Box::new(NoProbe))
        .with_prompter(Box::new(AutoPrompter::new(AutoPolicy::SkipAmbiguous)));
    let report = pipeline.run(&SilentReporter).unwrap();

    assert_eq!(report.skipped, 1);
    assert!(report.provider_degraded);
    assert!(fx.links().is_empty());
    assert_eq!(fx.recorded(Category::Films), 0);
}

#[test]
fn test_operator_abort_stops_the_batch() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, "Heat.1995.mkv", "heat");
    fx.add_video(Category::Films, "Ronin.1998.mkv", "ronin");
    let catalog = Catalog::default();
    let prompter = ScriptedPrompter {
        choices: VecDeque::from([Choice::Abort]),
        ..ScriptedPrompter::default()
    };

    let report = fx.run(RunOptions::default(), &catalog, Box::new(prompter));

    assert!(report.is_aborted());
    assert!(report.files.is_empty());
    let state = RunState::open(&fx.config.cache_db_path()).unwrap();
    assert_eq!(state.last_run().unwrap(), None);
}

#[test]
fn test_cancelled_run_records_nothing() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, AMELIE_FILE, "amelie");
    let cancel = CancelFlag::new();
    cancel.cancel();

    let mut pipeline = Pipeline::new(fx.config.clone(), RunOptions::default())
        .with_provider(Box::new(amelie_catalog()))
        .with_probe(Box::new(NoProbe))
        .with_cancel_flag(cancel);
    let report = pipeline.run(&SilentReporter).unwrap();

    assert!(report.is_aborted());
    assert_eq!(report.processed, 0);
    assert!(fx.links().is_empty());
    assert_eq!(fx.recorded(Category::Films), 0);
}

#[test]
fn test_no_cache_and_no_provider_fails_the_run() {
    let fx = Fixture::new();
    fx.add_video(Category::Films, AMELIE_FILE, "amelie");

    let mut pipeline = Pipeline::new(fx.config.clone(), RunOptions::default())
        .with_cache(Box::new(SqliteMetadataCache::disabled()))
        .with_probe(Box::new(NoProbe));
    let report = pipeline.run(&SilentReporter).unwrap();

    assert_eq!(
        report.aborted.as_deref(),
        Some("No metadata cache and no provider available")
    );
    assert!(fx.links().is_empty());
}
