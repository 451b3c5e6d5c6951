//! Where a resolved video goes in the archive, and under which name.
//!
//! The layout is a pure function of the resolved metadata:
//!
//! ```text
//! Films/<genre>/<band>/Title (Year) TAGS.ext
//! Animation/<genre>/<band>/Title (Year) TAGS.ext
//! Docs/<band>/Title (Year) TAGS.ext
//! Séries/Title (Year)/Saison NN/Title (Year) - S01E05 - Episode - TAGS.ext
//! ```
//!
//! Collisions with entries already in the archive are settled here: a link to
//! the same source is left alone, a different entry gets a technical-tag
//! suffix, and a remaining clash goes to the operator.

use ahash::AHashMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use strsim::normalized_levenshtein;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::Error;
use crate::linker::links_to;
use crate::model::{Category, EpisodeSpan, MediaKind, Video};
use crate::platform::is_symlink;
use crate::prompt::{Decision, Prompter};
use crate::text::{sanitize_filename, sort_key};

lazy_static! {
    static ref TITLE_YEAR: Regex = Regex::new(r"^(.+?)\s*\((\d{4})\)").unwrap();
}

/// Directory part of a placement, before the filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementRule {
    /// Category root plus genre folders, relative to the archive.
    pub bucket: PathBuf,
    /// Alphabetical band for films, the series folder for series.
    pub subfolder: String,
    pub season_folder: Option<String>,
}

impl PlacementRule {
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = self.bucket.join(&self.subfolder);
        if let Some(season) = &self.season_folder {
            dir.push(season);
        }
        dir
    }
}

/// Alphabetical band of a title: `A`..`Z`, `0-9`, or `#`.
pub fn alpha_band(title: &str) -> String {
    match sort_key(title).chars().find(|c| !c.is_whitespace()) {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_uppercase().to_string(),
        Some(c) if c.is_ascii_digit() => "0-9".to_string(),
        _ => "#".to_string(),
    }
}

fn series_folder(title: &str, year: Option<u16>) -> String {
    match year {
        Some(year) => format!("{} ({})", sanitize_filename(title), year),
        None => sanitize_filename(title),
    }
}

pub fn season_folder(season: u16) -> String {
    format!("Saison {:02}", season)
}

/// Directory layout for a resolved title.
pub fn placement_rule(
    media_kind: MediaKind,
    genre: &str,
    canonical_title: &str,
    year: Option<u16>,
    season: Option<u16>,
) -> PlacementRule {
    let genre_path: PathBuf = genre
        .split('/')
        .map(sanitize_filename)
        .filter(|part| !part.is_empty())
        .collect();
    match media_kind {
        MediaKind::Series => PlacementRule {
            bucket: PathBuf::from(Category::Series.dir_name()),
            subfolder: series_folder(canonical_title, year),
            season_folder: season.map(season_folder),
        },
        MediaKind::Doc => PlacementRule {
            bucket: PathBuf::from(Category::Docs.dir_name()),
            subfolder: alpha_band(canonical_title),
            season_folder: None,
        },
        MediaKind::Animation => PlacementRule {
            bucket: Path::new(Category::Animation.dir_name()).join(genre_path),
            subfolder: alpha_band(canonical_title),
            season_folder: None,
        },
        MediaKind::Movie | MediaKind::Unknown => PlacementRule {
            bucket: Path::new(Category::Films.dir_name()).join(genre_path),
            subfolder: alpha_band(canonical_title),
            season_folder: None,
        },
    }
}

fn episode_code(season: u16, span: EpisodeSpan) -> String {
    match span {
        EpisodeSpan::Single(e) => format!("S{:02}E{:02}", season, e),
        EpisodeSpan::Range(first, last) => format!("S{:02}E{:02}-E{:02}", season, first, last),
    }
}

/// Renamed filename for a film-like title, e.g. `Heat (1995) FR x264 1080p.mkv`.
pub fn film_filename(title: &str, year: Option<u16>, spec: &str, ext: &str) -> String {
    let mut name = sanitize_filename(title);
    if let Some(year) = year {
        name.push_str(&format!(" ({})", year));
    }
    if !spec.is_empty() {
        name.push(' ');
        name.push_str(spec);
    }
    with_extension(name, ext)
}

/// Renamed filename for an episode: segments joined with ` - `.
pub fn episode_filename(
    title: &str,
    year: Option<u16>,
    season: Option<u16>,
    span: Option<EpisodeSpan>,
    episode_title: Option<&str>,
    spec: &str,
    ext: &str,
) -> String {
    let mut parts = vec![series_folder(title, year)];
    if let Some(span) = span {
        parts.push(episode_code(season.unwrap_or(1), span));
    }
    if let Some(episode_title) = episode_title.map(sanitize_filename).filter(|t| !t.is_empty()) {
        parts.push(episode_title);
    }
    if !spec.is_empty() {
        parts.push(spec.to_string());
    }
    with_extension(parts.join(" - "), ext)
}

fn with_extension(name: String, ext: &str) -> String {
    if ext.is_empty() {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}

fn insert_before_extension(filename: &str, suffix: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}{}.{}", stem, suffix, ext),
        _ => format!("{}{}", filename, suffix),
    }
}

/// How the linker should materialize an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    Create,
    /// Swap an existing symlink at the same path.
    Replace,
    /// The path already links to this source.
    AlreadyLinked,
}

/// One logical archive entry. A confirmed multi-episode file has several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementEntry {
    pub episode: Option<u16>,
    pub renamed_filename: String,
    pub link_path: PathBuf,
    pub action: LinkAction,
    /// A similar entry the operator chose to replace.
    pub retire: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub rule: PlacementRule,
    pub directory: PathBuf,
    pub entries: Vec<PlacementEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    Placed(Placement),
    /// The operator declined; the file is left for the next run.
    Skipped(String),
}

enum Occupancy {
    Free,
    SameSource,
    Taken { replaceable: bool },
}

/// Computes placements and settles conflicts against the archive and against
/// what this run has already claimed.
pub struct PlacementEngine {
    archive_dir: PathBuf,
    similarity_threshold: f64,
    year_tolerance: u16,
    /// Link paths claimed during this run, with the source they point to.
    claimed: AHashMap<PathBuf, PathBuf>,
}

impl PlacementEngine {
    pub fn new(archive_dir: impl Into<PathBuf>, similarity_threshold: f64, year_tolerance: u16) -> Self {
        PlacementEngine {
            archive_dir: archive_dir.into(),
            similarity_threshold,
            year_tolerance,
            claimed: AHashMap::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.archive_dir,
            config.similarity_threshold,
            config.year_tolerance,
        )
    }

    /// Deterministic layout for a resolved video. Does not look at the disk.
    pub fn plan(&self, video: &Video) -> Result<Placement, Error> {
        let (title, genre) = match (video.canonical_title(), video.genre()) {
            (Some(title), Some(genre)) if video.is_resolved() => (title, genre),
            _ => {
                return Err(Error::Other(format!(
                    "{} is not resolved and cannot be placed",
                    video.file_name()
                )))
            }
        };

        let season = video.effective_season();
        let rule = placement_rule(video.media_kind, genre, title, video.year, season);
        let directory = self.archive_dir.join(rule.relative_dir());
        let spec = video.technical.spec_tag();
        let ext = video.container_extension.as_str();

        let names: Vec<(Option<u16>, String)> = if video.media_kind == MediaKind::Series {
            match video.episodes {
                Some(span) if span.is_range() && video.range_confirmed => span
                    .episodes()
                    .map(|e| {
                        let name = episode_filename(
                            title,
                            video.year,
                            season,
                            Some(EpisodeSpan::Single(e)),
                            episode_title(video, e),
                            &spec,
                            ext,
                        );
                        (Some(e), name)
                    })
                    .collect(),
                span => {
                    let episode_title = match span {
                        Some(EpisodeSpan::Single(e)) => episode_title(video, e),
                        _ => None,
                    };
                    let name =
                        episode_filename(title, video.year, season, span, episode_title, &spec, ext);
                    vec![(span.map(|s| s.first()), name)]
                }
            }
        } else {
            vec![(None, film_filename(title, video.year, &spec, ext))]
        };

        let entries = names
            .into_iter()
            .map(|(episode, renamed_filename)| PlacementEntry {
                episode,
                link_path: directory.join(&renamed_filename),
                renamed_filename,
                action: LinkAction::Create,
                retire: None,
            })
            .collect();

        Ok(Placement {
            rule,
            directory,
            entries,
        })
    }

    /// Plan the video, then settle every entry against existing archive
    /// content. Only an operator abort is an error here.
    pub fn place(&mut self, video: &Video, prompter: &mut dyn Prompter) -> Result<PlacementOutcome, Error> {
        let mut placement = self.plan(video)?;
        let source = video.source_path();

        // Claims are committed only once every entry has settled, so a
        // skipped fan-out leaves nothing behind.
        let mut claims = Vec::with_capacity(placement.entries.len());
        for entry in placement.entries.iter_mut() {
            if let Some(reason) = self.settle(entry, video, prompter)? {
                return Ok(PlacementOutcome::Skipped(reason));
            }
            claims.push(entry.link_path.clone());
        }
        for path in claims {
            self.claimed.insert(path, source.to_path_buf());
        }
        debug!("Placement for {}: {:?}", video.file_name(), placement);
        Ok(PlacementOutcome::Placed(placement))
    }

    /// Returns a skip reason, or `None` once the entry has a usable path.
    fn settle(
        &self,
        entry: &mut PlacementEntry,
        video: &Video,
        prompter: &mut dyn Prompter,
    ) -> Result<Option<String>, Error> {
        let source = video.source_path();
        match self.occupancy(&entry.link_path, source) {
            Occupancy::Free => return self.check_similar(entry, video, prompter),
            Occupancy::SameSource => {
                entry.action = LinkAction::AlreadyLinked;
                return Ok(None);
            }
            Occupancy::Taken { .. } => {}
        }

        // Same-title variant: try the technical-tag disambiguator.
        let base_path = entry.link_path.clone();
        let base_replaceable = matches!(
            self.occupancy(&base_path, source),
            Occupancy::Taken { replaceable: true }
        );
        if let Some(suffix) = disambiguator(video) {
            let name = insert_before_extension(&entry.renamed_filename, &suffix);
            let path = base_path.with_file_name(&name);
            match self.occupancy(&path, source) {
                Occupancy::Free => {
                    info!("{} exists, placing variant as {}", base_path.display(), name);
                    entry.renamed_filename = name;
                    entry.link_path = path;
                    return Ok(None);
                }
                Occupancy::SameSource => {
                    entry.renamed_filename = name;
                    entry.link_path = path;
                    entry.action = LinkAction::AlreadyLinked;
                    return Ok(None);
                }
                Occupancy::Taken { .. } => {}
            }
        }

        warn!("{}", Error::PlacementCollision(base_path.clone()));
        match prompter.confirm_similar(source, &base_path) {
            Decision::KeepBoth => {
                self.number_entry(entry, source);
                Ok(None)
            }
            Decision::Replace if base_replaceable => {
                entry.action = LinkAction::Replace;
                Ok(None)
            }
            Decision::Replace => {
                warn!(
                    "{} is not a link and will not be replaced, keeping both",
                    base_path.display()
                );
                self.number_entry(entry, source);
                Ok(None)
            }
            Decision::Skip => Ok(Some(format!(
                "destination {} already taken",
                base_path.display()
            ))),
            Decision::Abort => Err(Error::OperatorAbort),
        }
    }

    fn number_entry(&self, entry: &mut PlacementEntry, source: &Path) {
        let base = entry.renamed_filename.clone();
        for n in 2.. {
            let name = insert_before_extension(&base, &format!(" ({})", n));
            let path = entry.link_path.with_file_name(&name);
            match self.occupancy(&path, source) {
                Occupancy::Free => {
                    entry.renamed_filename = name;
                    entry.link_path = path;
                    return;
                }
                Occupancy::SameSource => {
                    entry.renamed_filename = name;
                    entry.link_path = path;
                    entry.action = LinkAction::AlreadyLinked;
                    return;
                }
                Occupancy::Taken { .. } => continue,
            }
        }
    }

    /// Fuzzy `Title (Year)` match against the target folder, for film-like
    /// placements only. Distinct from an exact-hash duplicate.
    fn check_similar(
        &self,
        entry: &mut PlacementEntry,
        video: &Video,
        prompter: &mut dyn Prompter,
    ) -> Result<Option<String>, Error> {
        if !video.media_kind.is_film_like() {
            return Ok(None);
        }
        let Some(similar) = self.find_similar(video, &entry.link_path) else {
            return Ok(None);
        };
        info!(
            "Similar entry found for {}: {}",
            video.file_name(),
            similar.display()
        );
        match prompter.confirm_similar(video.source_path(), &similar) {
            Decision::KeepBoth => Ok(None),
            Decision::Replace if is_symlink(&similar) => {
                entry.retire = Some(similar);
                Ok(None)
            }
            Decision::Replace => {
                warn!("{} is not a link and will not be replaced", similar.display());
                Ok(None)
            }
            Decision::Skip => Ok(Some(format!("similar to {}", similar.display()))),
            Decision::Abort => Err(Error::OperatorAbort),
        }
    }

    fn find_similar(&self, video: &Video, link_path: &Path) -> Option<PathBuf> {
        let title = video.canonical_title()?.to_lowercase();
        let year = video.year?;
        let dir = link_path.parent()?;
        let entries = fs::read_dir(dir).ok()?;

        let mut best: Option<(f64, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if path == link_path || links_to(&path, video.source_path()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = TITLE_YEAR.captures(&name) else {
                continue;
            };
            let other_title = caps[1].trim().to_lowercase();
            let Ok(other_year) = caps[2].parse::<u16>() else {
                continue;
            };
            if other_year.abs_diff(year) > self.year_tolerance {
                continue;
            }
            let similarity = normalized_levenshtein(&title, &other_title);
            if similarity < self.similarity_threshold {
                continue;
            }
            if best.as_ref().map(|(s, _)| similarity > *s).unwrap_or(true) {
                best = Some((similarity, path));
            }
        }
        best.map(|(_, path)| path)
    }

    fn occupancy(&self, path: &Path, source: &Path) -> Occupancy {
        if let Some(claimed_by) = self.claimed.get(path) {
            return if claimed_by == source {
                Occupancy::SameSource
            } else {
                Occupancy::Taken { replaceable: false }
            };
        }
        match path.symlink_metadata() {
            Err(_) => Occupancy::Free,
            Ok(_) if links_to(path, source) => Occupancy::SameSource,
            Ok(meta) => Occupancy::Taken {
                replaceable: meta.file_type().is_symlink(),
            },
        }
    }
}

fn episode_title(video: &Video, episode: u16) -> Option<&str> {
    video
        .episode_titles
        .get(usize::from(episode).checked_sub(1)?)
        .map(String::as_str)
}

/// ` [resolution codec]`, when either is known.
fn disambiguator(video: &Video) -> Option<String> {
    let tags: Vec<&str> = video
        .technical
        .resolution
        .iter()
        .chain(video.technical.codec.iter())
        .map(String::as_str)
        .collect();
    (!tags.is_empty()).then(|| format!(" [{}]", tags.join(" ")))
}
