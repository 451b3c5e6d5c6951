use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level archive roots. Discovery only looks inside these folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Films,
    Series,
    Animation,
    Docs,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Films,
        Category::Series,
        Category::Animation,
        Category::Docs,
    ];

    /// Folder name used both in the search directory and in the archive.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Films => "Films",
            Category::Series => "Séries",
            Category::Animation => "Animation",
            Category::Docs => "Docs",
        }
    }

    /// Accepts the archive folder names, including the legacy `Docs#1` alias.
    pub fn from_dir_name(name: &str) -> Option<Category> {
        match name {
            "Films" => Some(Category::Films),
            "Séries" | "Series" => Some(Category::Series),
            "Animation" => Some(Category::Animation),
            "Docs" | "Docs#1" => Some(Category::Docs),
            _ => None,
        }
    }

    /// Folder names to look for under the search directory.
    pub fn search_dir_names(&self) -> &'static [&'static str] {
        match self {
            Category::Films => &["Films"],
            Category::Series => &["Séries"],
            Category::Animation => &["Animation"],
            Category::Docs => &["Docs", "Docs#1"],
        }
    }

    /// Short ASCII key used for store file names.
    pub fn key(&self) -> &'static str {
        match self {
            Category::Films => "films",
            Category::Series => "series",
            Category::Animation => "animation",
            Category::Docs => "docs",
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        match self {
            Category::Films => MediaKind::Movie,
            Category::Series => MediaKind::Series,
            Category::Animation => MediaKind::Animation,
            Category::Docs => MediaKind::Doc,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Movie,
    Series,
    Animation,
    Doc,
    Unknown,
}

impl MediaKind {
    /// Movies, animation and documentaries are looked up as films.
    pub fn is_film_like(&self) -> bool {
        matches!(self, MediaKind::Movie | MediaKind::Animation | MediaKind::Doc)
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            MediaKind::Movie => Some(Category::Films),
            MediaKind::Series => Some(Category::Series),
            MediaKind::Animation => Some(Category::Animation),
            MediaKind::Doc => Some(Category::Docs),
            MediaKind::Unknown => None,
        }
    }
}

/// Hex encoded sampled content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_u64(value: u64) -> Self {
        ContentHash(format!("{:016x}", value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl From<&str> for ContentHash {
    fn from(value: &str) -> Self {
        ContentHash(value.to_string())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Episode numbering found in a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeSpan {
    Single(u16),
    /// Inclusive range, e.g. `S01E01-E03`.
    Range(u16, u16),
}

impl EpisodeSpan {
    pub fn first(&self) -> u16 {
        match *self {
            EpisodeSpan::Single(e) => e,
            EpisodeSpan::Range(first, _) => first,
        }
    }

    pub fn last(&self) -> u16 {
        match *self {
            EpisodeSpan::Single(e) => e,
            EpisodeSpan::Range(_, last) => last,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, EpisodeSpan::Range(..))
    }

    pub fn episodes(&self) -> impl Iterator<Item = u16> {
        self.first()..=self.last()
    }
}

/// Language / codec / resolution tags, from the filename or from a probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalInfo {
    pub audio_language: Option<String>,
    pub codec: Option<String>,
    pub resolution: Option<String>,
}

impl TechnicalInfo {
    pub fn is_complete(&self) -> bool {
        self.audio_language.is_some() && self.codec.is_some() && self.resolution.is_some()
    }

    /// Fill only the fields still missing from `other`.
    pub fn fill_missing(&mut self, other: TechnicalInfo) {
        if self.audio_language.is_none() {
            self.audio_language = other.audio_language;
        }
        if self.codec.is_none() {
            self.codec = other.codec;
        }
        if self.resolution.is_none() {
            self.resolution = other.resolution;
        }
    }

    /// Space separated tag, e.g. `FR x264 1080p`.
    pub fn spec_tag(&self) -> String {
        [&self.audio_language, &self.codec, &self.resolution]
            .iter()
            .filter_map(|v| v.as_deref())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// No usable title was extracted.
    Empty,
    Low,
    High,
}

/// Structured guess produced from a raw filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationGuess {
    pub media_kind: MediaKind,
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u16>,
    pub episodes: Option<EpisodeSpan>,
    pub technical: TechnicalInfo,
    pub confidence: Confidence,
}

impl ClassificationGuess {
    pub fn is_multi_episode(&self) -> bool {
        self.episodes.map(|e| e.is_range()).unwrap_or(false)
    }
}

/// One search hit returned by a metadata provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
}

/// A candidate with its match score, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

/// Canonical metadata chosen for a query, either automatically or by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub canonical_title: String,
    pub year: Option<u16>,
    pub genre: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// A title counts as unset when missing or only whitespace.
pub fn is_unset_title(title: Option<&str>) -> bool {
    title.map(|t| t.trim().is_empty()).unwrap_or(true)
}

/// Mutable record threaded through the pipeline for one source file.
#[derive(Debug, Clone)]
pub struct Video {
    source_path: PathBuf,
    pub category: Category,
    pub content_hash: Option<ContentHash>,

    pub media_kind: MediaKind,
    pub raw_title: String,
    pub year: Option<u16>,
    pub season: Option<u16>,
    pub episodes: Option<EpisodeSpan>,

    canonical_title: Option<String>,
    genre: Option<String>,
    pub provider_id: Option<String>,
    pub episode_titles: Vec<String>,
    /// Set when the provider confirmed every episode of a multi-episode file.
    pub range_confirmed: bool,

    pub technical: TechnicalInfo,
    pub container_extension: String,

    pub renamed_filename: Option<String>,
    pub destination_path: Option<PathBuf>,
    pub symlink_path: Option<PathBuf>,
}

impl Video {
    pub fn new(source_path: impl Into<PathBuf>, category: Category) -> Self {
        let source_path = source_path.into();
        let container_extension = source_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Video {
            source_path,
            category,
            content_hash: None,
            media_kind: category.media_kind(),
            raw_title: String::new(),
            year: None,
            season: None,
            episodes: None,
            canonical_title: None,
            genre: None,
            provider_id: None,
            episode_titles: Vec::new(),
            range_confirmed: false,
            technical: TechnicalInfo::default(),
            container_extension,
            renamed_filename: None,
            destination_path: None,
            symlink_path: None,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn apply_guess(&mut self, guess: &ClassificationGuess) {
        self.media_kind = guess.media_kind;
        self.raw_title = guess.title.clone();
        self.year = guess.year;
        self.season = guess.season;
        self.episodes = guess.episodes;
        self.technical = guess.technical.clone();
    }

    /// Title and genre are always set together.
    pub fn apply_resolution(&mut self, resolved: &ResolvedMetadata) {
        if is_unset_title(Some(&resolved.canonical_title)) {
            return;
        }
        self.canonical_title = Some(resolved.canonical_title.clone());
        self.genre = Some(resolved.genre.clone());
        self.provider_id = resolved.provider_id.clone();
        if resolved.year.is_some() {
            self.year = resolved.year;
        }
    }

    pub fn canonical_title(&self) -> Option<&str> {
        self.canonical_title.as_deref()
    }

    pub fn genre(&self) -> Option<&str> {
        self.genre.as_deref()
    }

    pub fn title_unset(&self) -> bool {
        is_unset_title(self.canonical_title.as_deref())
    }

    /// An episode number without a season belongs to season 1.
    pub fn effective_season(&self) -> Option<u16> {
        self.season.or(self.episodes.map(|_| 1))
    }

    pub fn is_resolved(&self) -> bool {
        !self.title_unset() && self.genre.is_some()
    }
}
